use crate::model::{Action, ReservationId, ReservationStatus, ToolId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Tool(ToolId),
    Reservation(ReservationId),
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityRef::Tool(id) => write!(f, "tool {id}"),
            EntityRef::Reservation(id) => write!(f, "reservation {id}"),
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    NotFound(EntityRef),
    InvalidTransition {
        id: ReservationId,
        from: ReservationStatus,
        action: Action,
    },
    InsufficientStock {
        tool_id: ToolId,
        available: u32,
        requested: u32,
    },
    NotPurgeable {
        id: ReservationId,
        status: ReservationStatus,
    },
    HasDependents(ReservationId),
    InvalidInput(&'static str),
    CorruptRecord(String),
    StoreUnavailable(String),
}

impl EngineError {
    /// Store failures may succeed on retry; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StoreUnavailable(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(entity) => write!(f, "not found: {entity}"),
            EngineError::InvalidTransition { id, from, action } => {
                write!(f, "reservation {id}: cannot {action} from status {from}")
            }
            EngineError::InsufficientStock {
                tool_id,
                available,
                requested,
            } => write!(
                f,
                "tool {tool_id}: requested {requested} but only {available} available"
            ),
            EngineError::NotPurgeable { id, status } => {
                write!(f, "reservation {id} in status {status} cannot be purged")
            }
            EngineError::HasDependents(id) => {
                write!(f, "cannot purge reservation {id}: other records reference it")
            }
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::CorruptRecord(msg) => write!(f, "corrupt record: {msg}"),
            EngineError::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                EngineError::CorruptRecord(e.to_string())
            }
            other => EngineError::StoreUnavailable(other.to_string()),
        }
    }
}
