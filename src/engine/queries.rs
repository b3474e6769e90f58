use std::time::Instant;

use chrono::NaiveDate;
use tracing::warn;

use crate::model::*;

use super::availability::{availability, compute_overcommitments, current_availability};
use super::conflict::{today, validate_range};
use super::{report_overcommitment, Engine, EngineError};

impl Engine {
    /// Availability for a future booking of `requested` units over
    /// `[start, end]`.
    pub async fn check_availability(
        &self,
        tool_id: ToolId,
        start: NaiveDate,
        end: NaiveDate,
        requested: u32,
    ) -> Result<AvailabilityResult, EngineError> {
        let candidate = validate_range(start, end)?;
        let started = Instant::now();

        let stock = self.store.get_tool_stock(tool_id).await?;
        let reservations = self.store.list_reservations_for_tool(tool_id).await?;
        let result = availability(stock, &candidate, requested, &reservations);

        record_check("range", started);
        if result.over_committed {
            report_overcommitment(tool_id, &result);
        }
        Ok(result)
    }

    /// Units free on `reference_date`. Runs the overdue sweep first, since
    /// overdue status decides which units are still out. The sweep never
    /// looks past today, so a future reference date changes no stored rows.
    pub async fn check_current_availability(
        &self,
        tool_id: ToolId,
        reference_date: NaiveDate,
    ) -> Result<AvailabilityResult, EngineError> {
        let stock = self.store.get_tool_stock(tool_id).await?;
        self.sweep_overdue(reference_date.min(today())).await?;
        let started = Instant::now();

        let reservations = self.store.list_reservations_for_tool(tool_id).await?;
        let result = current_availability(stock, reference_date, &reservations);

        record_check("current", started);
        if result.over_committed {
            report_overcommitment(tool_id, &result);
        }
        Ok(result)
    }

    /// Find every run of days in `[from, to]` on which the tool is booked
    /// beyond its stock.
    pub async fn audit_tool(
        &self,
        tool_id: ToolId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<OverCommitment>, EngineError> {
        let window = validate_range(from, to)?;
        let stock = self.store.get_tool_stock(tool_id).await?;
        let reservations = self.store.list_reservations_for_tool(tool_id).await?;

        let found = compute_overcommitments(tool_id, stock, &window, &reservations);
        for oc in &found {
            warn!(
                "tool {tool_id} over-committed {}..{}: {} reserved, stock {}",
                oc.range.start, oc.range.end, oc.peak_reserved, oc.stock
            );
        }
        metrics::counter!(crate::observability::OVERCOMMITMENTS_DETECTED_TOTAL, "source" => "audit")
            .increment(found.len() as u64);
        Ok(found)
    }
}

fn record_check(mode: &'static str, started: Instant) {
    metrics::counter!(crate::observability::AVAILABILITY_CHECKS_TOTAL, "mode" => mode).increment(1);
    metrics::histogram!(crate::observability::AVAILABILITY_CHECK_DURATION_SECONDS, "mode" => mode)
        .record(started.elapsed().as_secs_f64());
}
