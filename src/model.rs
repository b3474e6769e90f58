use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type ToolId = i64;
pub type ReservationId = i64;
pub type UserId = i64;

/// Inclusive calendar-date range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start <= end, "DateRange start must not be after end");
        Self { start, end }
    }

    /// Build a range, returning `None` when `start > end`.
    pub fn checked(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Single-day range.
    pub fn day(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    /// Inclusive-inclusive overlap: touching boundaries count.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Lifecycle state of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Delivered,
    Overdue,
    Returned,
    Cancelled,
    Completed,
    Archived,
}

impl ReservationStatus {
    pub const ALL: [ReservationStatus; 7] = [
        ReservationStatus::Active,
        ReservationStatus::Delivered,
        ReservationStatus::Overdue,
        ReservationStatus::Returned,
        ReservationStatus::Cancelled,
        ReservationStatus::Completed,
        ReservationStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Delivered => "delivered",
            ReservationStatus::Overdue => "overdue",
            ReservationStatus::Returned => "returned",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Archived => "archived",
        }
    }

    /// Unit is physically with the renter until returned.
    pub fn holds_unit(&self) -> bool {
        matches!(self, ReservationStatus::Delivered | ReservationStatus::Overdue)
    }

    /// Statuses the overdue sweep may pick up.
    pub fn is_sweepable(&self) -> bool {
        matches!(self, ReservationStatus::Active | ReservationStatus::Delivered)
    }

    /// Only archived and cancelled rows may be physically purged.
    pub fn is_purgeable(&self) -> bool {
        matches!(self, ReservationStatus::Archived | ReservationStatus::Cancelled)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown reservation status {:?}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for ReservationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReservationStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Administrative actions on a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Deliver,
    Cancel,
    Return,
    Archive,
    Restore,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Deliver => "deliver",
            Action::Cancel => "cancel",
            Action::Return => "return",
            Action::Archive => "archive",
            Action::Restore => "restore",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub id: ToolId,
    pub name: Option<String>,
    pub stock: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub tool_id: ToolId,
    pub user_id: UserId,
    pub range: DateRange,
    pub quantity: u32,
    pub status: ReservationStatus,
    pub previous_status: Option<ReservationStatus>,
    pub created_at: DateTime<Utc>,
}

/// Quantity used when a stored row has none.
pub const DEFAULT_QUANTITY: u32 = 1;

/// A booking request, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub tool_id: ToolId,
    pub user_id: UserId,
    pub range: DateRange,
    pub quantity: u32,
}

/// Result of an availability query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResult {
    pub total_stock: u32,
    pub reserved_quantity: u32,
    /// Never negative; see `over_committed`.
    pub available_quantity: u32,
    pub can_satisfy: bool,
    /// Reserved quantity exceeds stock.
    pub over_committed: bool,
}

/// A run of days on which a tool is booked beyond its stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverCommitment {
    pub tool_id: ToolId,
    pub range: DateRange,
    pub stock: u32,
    /// Highest occupying quantity seen inside `range`.
    pub peak_reserved: u32,
}

/// Status changes broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    ReservationCreated {
        id: ReservationId,
        tool_id: ToolId,
        range: DateRange,
        quantity: u32,
    },
    StatusChanged {
        id: ReservationId,
        tool_id: ToolId,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    ReservationPurged {
        id: ReservationId,
        tool_id: ToolId,
    },
}

impl Event {
    pub fn tool_id(&self) -> ToolId {
        match self {
            Event::ReservationCreated { tool_id, .. }
            | Event::StatusChanged { tool_id, .. }
            | Event::ReservationPurged { tool_id, .. } => *tool_id,
        }
    }

    /// JSON payload handed to external listeners.
    pub fn to_payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
