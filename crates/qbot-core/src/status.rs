//! Status strings written to the status server and their classification.

pub const PASS_STATUS: &str = "Pass";
pub const FAIL_STATUS: &str = "Fail";
pub const RETRY_STATUS: &str = "Retry";
pub const ERROR_STATUS: &str = "Error";

/// Final classification of one processed work item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Fail,
    Retry,
    Error(String),
}

impl Outcome {
    pub fn status_message(&self) -> String {
        match self {
            Outcome::Pass => PASS_STATUS.to_string(),
            Outcome::Fail => FAIL_STATUS.to_string(),
            Outcome::Retry => RETRY_STATUS.to_string(),
            Outcome::Error(reason) => format!("{}: {}", ERROR_STATUS, reason),
        }
    }

    pub fn is_terminal(&self) -> bool {
        is_terminal_status(&self.status_message())
    }
}

/// Terminal statuses take an item out of active consideration.
pub fn is_terminal_status(status: &str) -> bool {
    status == PASS_STATUS || status == FAIL_STATUS || status.starts_with("Error:")
}
