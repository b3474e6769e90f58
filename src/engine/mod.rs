mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod transitions;
#[cfg(test)]
mod tests;

pub use availability::{
    availability, compute_overcommitments, current_availability, occupies_on, occupies_range,
    reserved_for_range, reserved_on,
};
pub use error::{EngineError, EntityRef};
pub use transitions::{is_overdue_on, next_status};

pub(crate) use conflict::today;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::*;
use crate::notify::NotifyHub;
use crate::store::Store;

/// Availability and status engine over one injected store.
pub struct Engine {
    store: Arc<dyn Store>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, notify: Arc<NotifyHub>) -> Self {
        Self { store, notify }
    }

    pub async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.store.get_reservation(id).await
    }

    fn publish(&self, event: Event) {
        debug!("event {}", event.to_payload());
        self.notify.send(event.tool_id(), &event);
    }
}

/// Reserved quantity above stock means committed bookings were not
/// serialized or the data was edited by hand. Logged and counted only; the
/// result is still returned to the caller.
fn report_overcommitment(tool_id: ToolId, result: &AvailabilityResult) {
    warn!(
        "tool {tool_id} over-committed: {} reserved against stock {}",
        result.reserved_quantity, result.total_stock
    );
    metrics::counter!(crate::observability::OVERCOMMITMENTS_DETECTED_TOTAL, "source" => "check")
        .increment(1);
}
