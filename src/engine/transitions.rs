use chrono::NaiveDate;
use tracing::{debug, info};

use crate::model::*;
use crate::store::StatusUpdate;

use super::{Engine, EngineError};

/// Status (and previous status) produced by applying `action` to a
/// reservation currently in `current`. `None` when the action is not
/// permitted from that state.
///
/// ```text
/// active ──deliver──▶ delivered ──return──▶ returned
///   │                    │
///   ├──cancel──▶ cancelled
///   │                    │
///   └──(sweep)──▶ overdue ◀──(sweep)
///                  └──return──▶ returned
///
/// any but archived ──archive──▶ archived ──restore──▶ previous
/// ```
pub fn next_status(
    current: ReservationStatus,
    previous: Option<ReservationStatus>,
    action: Action,
) -> Option<(ReservationStatus, Option<ReservationStatus>)> {
    use ReservationStatus::*;
    match (action, current) {
        (Action::Deliver, Active) => Some((Delivered, None)),
        (Action::Cancel, Active) => Some((Cancelled, None)),
        (Action::Return, Delivered | Overdue) => Some((Returned, None)),
        (Action::Archive, s) if s != Archived => Some((Archived, Some(s))),
        (Action::Restore, Archived) => previous.filter(|p| *p != Archived).map(|p| (p, None)),
        _ => None,
    }
}

/// Should the sweep move `r` to overdue on `reference_date`?
pub fn is_overdue_on(r: &Reservation, reference_date: NaiveDate) -> bool {
    r.status.is_sweepable() && r.range.end < reference_date
}

impl Engine {
    /// Apply an administrative action. Either the whole status change lands
    /// or nothing does.
    pub async fn transition(
        &self,
        id: ReservationId,
        action: Action,
    ) -> Result<Reservation, EngineError> {
        let current = self.store.get_reservation(id).await?;
        let outcome = self.apply_action(&current, action).await;
        metrics::counter!(
            crate::observability::TRANSITIONS_TOTAL,
            "action" => action.as_str(),
            "outcome" => if outcome.is_ok() { "ok" } else { "rejected" }
        )
        .increment(1);
        outcome
    }

    async fn apply_action(
        &self,
        current: &Reservation,
        action: Action,
    ) -> Result<Reservation, EngineError> {
        let invalid = |from| EngineError::InvalidTransition {
            id: current.id,
            from,
            action,
        };
        let (status, previous_status) =
            next_status(current.status, current.previous_status, action)
                .ok_or_else(|| invalid(current.status))?;

        match self
            .store
            .update_reservation_status(current.id, current.status, status, previous_status)
            .await?
        {
            StatusUpdate::Applied(updated) => {
                info!(
                    "reservation {} {action}: {} -> {}",
                    updated.id, current.status, updated.status
                );
                self.publish(Event::StatusChanged {
                    id: updated.id,
                    tool_id: updated.tool_id,
                    from: current.status,
                    to: updated.status,
                });
                Ok(updated)
            }
            StatusUpdate::Stale { current: now } => Err(invalid(now)),
        }
    }

    /// Move every active or delivered reservation whose end date is before
    /// `reference_date` to overdue. Returns how many rows changed; running it
    /// again with the same date changes nothing.
    pub async fn sweep_overdue(&self, reference_date: NaiveDate) -> Result<usize, EngineError> {
        metrics::counter!(crate::observability::SWEEP_RUNS_TOTAL).increment(1);
        let candidates = self.store.list_sweep_candidates(reference_date).await?;

        let mut updated = 0usize;
        for r in candidates.iter().filter(|r| is_overdue_on(r, reference_date)) {
            match self
                .store
                .update_reservation_status(r.id, r.status, ReservationStatus::Overdue, None)
                .await?
            {
                StatusUpdate::Applied(_) => {
                    updated += 1;
                    self.publish(Event::StatusChanged {
                        id: r.id,
                        tool_id: r.tool_id,
                        from: r.status,
                        to: ReservationStatus::Overdue,
                    });
                }
                // Changed by someone else since the candidate list was read.
                StatusUpdate::Stale { current } => {
                    debug!("sweep skip reservation {}: now {current}", r.id);
                }
            }
        }

        if updated > 0 {
            info!("marked {updated} reservation(s) overdue as of {reference_date}");
        }
        metrics::counter!(crate::observability::RESERVATIONS_MARKED_OVERDUE_TOTAL)
            .increment(updated as u64);
        Ok(updated)
    }
}
