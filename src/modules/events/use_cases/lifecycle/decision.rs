use crate::modules::events::core::events::LifecycleEvent;
use crate::modules::events::core::state::EventStatus;
use crate::shared::core::errors::ApplicationError;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecideError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Permission(String),

    #[error("{message}")]
    Conflict {
        message: String,
        current: EventStatus,
    },
}

impl DecideError {
    pub fn conflict(message: impl Into<String>, current: EventStatus) -> Self {
        Self::Conflict {
            message: message.into(),
            current,
        }
    }
}

impl From<DecideError> for ApplicationError {
    fn from(error: DecideError) -> Self {
        match error {
            DecideError::Validation(message) => Self::Validation(message),
            DecideError::Permission(message) => Self::Permission(message),
            DecideError::Conflict { message, current } => {
                Self::conflict(message, Some(current.as_str().to_string()))
            }
        }
    }
}

/// Outcome of a decider. `Unchanged` is the idempotent no-op (e.g. deleting a deleted event).
#[derive(Debug, PartialEq)]
pub enum Decision {
    Accepted { event: LifecycleEvent },
    Unchanged,
    Rejected { reason: DecideError },
}
