use thiserror::Error;

use crate::domain::session_service::SessionState;

/// Failure taxonomy of the coordinator. Nothing here is fatal to the
/// hosting process; every variant degrades one request.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("{0}")]
    Invalid(String),

    #[error("child not found: {0}")]
    ChildNotFound(String),

    #[error("activity not found: {0}")]
    ActivityNotFound(i64),

    #[error("no session recorded for child {child_id} on activity {activity_id}")]
    SessionNotFound { child_id: String, activity_id: i64 },

    #[error("cannot {operation} while the session is {state:?}")]
    IllegalTransition {
        operation: &'static str,
        state: SessionState,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoordinatorError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CoordinatorError::Invalid(message.into())
    }
}
