//! Retry presets, classification and cancellation.

mod cancellation;
mod classification;
mod presets;

use bulwark_retry::FailureDetails;
use std::fmt;

/// Error shaped like a database driver or HTTP client error.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ServiceError {
    Sql(&'static str),
    Http(u16),
    Message(&'static str),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Sql(code) => write!(f, "database error {code}"),
            ServiceError::Http(status) => write!(f, "request failed with status {status}"),
            ServiceError::Message(message) => f.write_str(message),
        }
    }
}

impl FailureDetails for ServiceError {
    fn sql_state(&self) -> Option<&str> {
        match self {
            ServiceError::Sql(code) => Some(*code),
            _ => None,
        }
    }

    fn http_status(&self) -> Option<u16> {
        match self {
            ServiceError::Http(status) => Some(*status),
            _ => None,
        }
    }
}
