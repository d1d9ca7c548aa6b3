use thiserror::Error;

use crate::script_error::ScriptError;

/// Hard failures surfaced to the queue engine.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// The checkout fell behind tip while landing.
    #[error("checkout needs update: {0}")]
    CheckoutNeedsUpdate(ScriptError),

    /// Stop the whole process with `exit_code` once the stop is recorded.
    #[error("{reason}")]
    Terminate { exit_code: i32, reason: String },

    #[error("User declined.")]
    Declined,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QueueError {
    pub fn script_error(&self) -> Option<&ScriptError> {
        match self {
            QueueError::Script(e) | QueueError::CheckoutNeedsUpdate(e) => Some(e),
            _ => None,
        }
    }
}
