use tracing::info;

use crate::model::*;

use super::conflict::{check_capacity, validate_range};
use super::{Engine, EngineError};

impl Engine {
    /// Check availability and create the reservation in one serialized step,
    /// so two concurrent bookings cannot both see the last free unit.
    pub async fn book(&self, new: NewReservation) -> Result<Reservation, EngineError> {
        if new.quantity == 0 {
            return Err(EngineError::InvalidInput("quantity must be positive"));
        }
        let range = validate_range(new.range.start, new.range.end)?;
        let tool_id = new.tool_id;
        let quantity = new.quantity;

        let gate = move |stock: u32, existing: &[Reservation]| {
            check_capacity(tool_id, stock, &range, quantity, existing)
        };
        let created = self.store.insert_reservation_checked(new, &gate).await?;

        info!(
            "reservation {} booked: tool {tool_id} x{quantity} {}..{}",
            created.id, range.start, range.end
        );
        self.publish(Event::ReservationCreated {
            id: created.id,
            tool_id,
            range,
            quantity,
        });
        Ok(created)
    }

    /// Physically delete an archived or cancelled reservation.
    pub async fn purge(&self, id: ReservationId) -> Result<(), EngineError> {
        let current = self.store.get_reservation(id).await?;
        if !current.status.is_purgeable() {
            return Err(EngineError::NotPurgeable {
                id,
                status: current.status,
            });
        }

        if !self.store.delete_reservation(id, current.status).await? {
            let now = self.store.get_reservation(id).await?;
            return Err(EngineError::NotPurgeable {
                id,
                status: now.status,
            });
        }

        info!("reservation {id} purged ({})", current.status);
        self.publish(Event::ReservationPurged {
            id,
            tool_id: current.tool_id,
        });
        Ok(())
    }
}
