mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use schema::SCHEMA;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::engine::EngineError;
use crate::model::*;

/// Admission check run by the store while it holds its write serialization.
/// Receives the tool's stock and every reservation of the tool that starts on
/// or before the requested end date.
pub type AvailabilityGate<'a> =
    &'a (dyn Fn(u32, &[Reservation]) -> Result<(), EngineError> + Send + Sync);

/// Outcome of a compare-and-set status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Applied(Reservation),
    /// Row exists but its status was no longer the expected one.
    Stale { current: ReservationStatus },
}

/// Storage collaborator consumed by the engine.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_tool_stock(&self, tool_id: ToolId) -> Result<u32, EngineError>;

    async fn list_reservations_for_tool(
        &self,
        tool_id: ToolId,
    ) -> Result<Vec<Reservation>, EngineError>;

    async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError>;

    /// Single atomic update guarded by `expected`.
    async fn update_reservation_status(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        status: ReservationStatus,
        previous_status: Option<ReservationStatus>,
    ) -> Result<StatusUpdate, EngineError>;

    /// Active or delivered reservations whose end date is before `reference_date`.
    async fn list_sweep_candidates(
        &self,
        reference_date: NaiveDate,
    ) -> Result<Vec<Reservation>, EngineError>;

    /// Run `gate` and insert `new` as one serialized step.
    async fn insert_reservation_checked(
        &self,
        new: NewReservation,
        gate: AvailabilityGate<'_>,
    ) -> Result<Reservation, EngineError>;

    /// Delete the row if its status is still `expected`. Returns `false`
    /// when the status moved on first.
    async fn delete_reservation(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
    ) -> Result<bool, EngineError>;
}
