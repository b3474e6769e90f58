use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::*;

// ── Occupancy rules ───────────────────────────────────────────────

/// Does `r` hold a unit that conflicts with a booking over `candidate`?
///
/// Active reservations conflict on date overlap. Delivered and overdue
/// reservations hold their unit from start date onward until returned, so
/// they conflict with anything ending on or after their start.
pub fn occupies_range(r: &Reservation, candidate: &DateRange) -> bool {
    match r.status {
        ReservationStatus::Active => r.range.overlaps(candidate),
        ReservationStatus::Delivered | ReservationStatus::Overdue => r.range.start <= candidate.end,
        ReservationStatus::Returned
        | ReservationStatus::Cancelled
        | ReservationStatus::Completed
        | ReservationStatus::Archived => false,
    }
}

/// Does `r` hold a unit on the reference date `today`?
pub fn occupies_on(r: &Reservation, today: NaiveDate) -> bool {
    match r.status {
        ReservationStatus::Active => r.range.contains(today),
        ReservationStatus::Delivered | ReservationStatus::Overdue => r.range.start <= today,
        _ => false,
    }
}

pub fn reserved_for_range(reservations: &[Reservation], candidate: &DateRange) -> u32 {
    reservations
        .iter()
        .filter(|r| occupies_range(r, candidate))
        .fold(0u32, |acc, r| acc.saturating_add(r.quantity))
}

pub fn reserved_on(reservations: &[Reservation], today: NaiveDate) -> u32 {
    reservations
        .iter()
        .filter(|r| occupies_on(r, today))
        .fold(0u32, |acc, r| acc.saturating_add(r.quantity))
}

fn summarize(stock: u32, reserved: u32, requested: u32) -> AvailabilityResult {
    let available = stock.saturating_sub(reserved);
    AvailabilityResult {
        total_stock: stock,
        reserved_quantity: reserved,
        available_quantity: available,
        can_satisfy: available >= requested,
        over_committed: reserved > stock,
    }
}

// ── Availability Algorithm ────────────────────────────────────────

/// Free units for a future booking over `candidate`.
///
/// Caller guarantees `candidate.start <= candidate.end` and that every
/// reservation belongs to the same tool.
pub fn availability(
    stock: u32,
    candidate: &DateRange,
    requested: u32,
    reservations: &[Reservation],
) -> AvailabilityResult {
    summarize(stock, reserved_for_range(reservations, candidate), requested)
}

/// Free units right now, with `today` as the reference date. A single unit
/// is the implied request.
pub fn current_availability(
    stock: u32,
    today: NaiveDate,
    reservations: &[Reservation],
) -> AvailabilityResult {
    summarize(stock, reserved_on(reservations, today), DEFAULT_QUANTITY)
}

// ── Over-commitment audit ─────────────────────────────────────────

/// Day-granular sweep line: find runs of days inside `window` where the
/// occupying quantity exceeds `stock`. Units held by delivered or overdue
/// reservations stay occupied through the end of the window.
pub fn compute_overcommitments(
    tool_id: ToolId,
    stock: u32,
    window: &DateRange,
    reservations: &[Reservation],
) -> Vec<OverCommitment> {
    // Net quantity change taking effect on each day.
    let mut deltas: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for r in reservations {
        let end = match r.status {
            ReservationStatus::Active => r.range.end,
            s if s.holds_unit() => window.end,
            _ => continue,
        };
        let start = r.range.start.max(window.start);
        let end = end.min(window.end);
        if start > end {
            continue;
        }
        let q = i64::from(r.quantity);
        *deltas.entry(start).or_default() += q;
        if let Some(after) = end.succ_opt() {
            *deltas.entry(after).or_default() -= q;
        }
    }

    let mut result = Vec::new();
    let mut count: i64 = 0;
    // (run start, peak so far)
    let mut open: Option<(NaiveDate, i64)> = None;
    let limit = i64::from(stock);

    for (&day, &delta) in &deltas {
        count += delta;
        if count > limit {
            open = match open {
                Some((start, peak)) => Some((start, peak.max(count))),
                None => Some((day, count)),
            };
        } else if let Some((start, peak)) = open.take()
            && let Some(last) = day.pred_opt()
        {
            result.push(OverCommitment {
                tool_id,
                range: DateRange::new(start, last),
                stock,
                peak_reserved: u32::try_from(peak).unwrap_or(u32::MAX),
            });
        }
    }
    if let Some((start, peak)) = open {
        result.push(OverCommitment {
            tool_id,
            range: DateRange::new(start, window.end),
            stock,
            peak_reserved: u32::try_from(peak).unwrap_or(u32::MAX),
        });
    }

    result
}
