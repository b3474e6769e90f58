use chrono::NaiveDate;

use crate::model::*;

use super::availability::availability;
use super::EngineError;

/// Calendar date used as "today" by the daemon.
pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub(crate) fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<DateRange, EngineError> {
    DateRange::checked(start, end).ok_or(EngineError::InvalidInput("start date after end date"))
}

/// Admission rule for a new booking: the requested quantity must fit in
/// what is left over the whole range.
pub(crate) fn check_capacity(
    tool_id: ToolId,
    stock: u32,
    range: &DateRange,
    quantity: u32,
    existing: &[Reservation],
) -> Result<(), EngineError> {
    let result = availability(stock, range, quantity, existing);
    if result.over_committed {
        super::report_overcommitment(tool_id, &result);
    }
    if !result.can_satisfy {
        return Err(EngineError::InsufficientStock {
            tool_id,
            available: result.available_quantity,
            requested: quantity,
        });
    }
    Ok(())
}
