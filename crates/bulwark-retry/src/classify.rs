//! Retryable-or-fatal classification by resource kind.
//!
//! Error types describe themselves through [`FailureDetails`]: a SQLSTATE
//! code, an HTTP status, or coarse timeout/connection flags. When none of
//! those are available the classifiers fall back to keywords in the error
//! message. Cancellation is fatal for every kind.
//!
//! ```rust
//! use bulwark_retry::{FailureDetails, ResourceKind};
//! use std::fmt;
//!
//! #[derive(Debug)]
//! struct PgError {
//!     code: &'static str,
//! }
//!
//! impl fmt::Display for PgError {
//!     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
//!         write!(f, "postgres error {}", self.code)
//!     }
//! }
//!
//! impl FailureDetails for PgError {
//!     fn sql_state(&self) -> Option<&str> {
//!         Some(self.code)
//!     }
//! }
//!
//! assert!(ResourceKind::Database.is_retryable(&PgError { code: "40P01" }));
//! assert!(!ResourceKind::Database.is_retryable(&PgError { code: "23505" }));
//! ```

use std::fmt;
use std::io;

/// Structured facts about a failure, used to decide whether to retry it.
///
/// Every method has a conservative default, so implementing only
/// `Display` plus whichever accessor the error can answer is enough.
pub trait FailureDetails: fmt::Display {
    /// Five-character SQLSTATE code reported by a database driver.
    fn sql_state(&self) -> Option<&str> {
        None
    }

    /// HTTP status returned by a remote service.
    fn http_status(&self) -> Option<u16> {
        None
    }

    /// The operation timed out.
    fn is_timeout(&self) -> bool {
        false
    }

    /// The connection could not be established or was lost.
    fn is_connection(&self) -> bool {
        false
    }

    /// The caller aborted the operation.
    fn is_cancellation(&self) -> bool {
        false
    }
}

impl FailureDetails for io::Error {
    fn is_timeout(&self) -> bool {
        self.kind() == io::ErrorKind::TimedOut
    }

    fn is_connection(&self) -> bool {
        matches!(
            self.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
        )
    }
}

impl FailureDetails for String {}

impl FailureDetails for &str {}

impl FailureDetails for Box<dyn std::error::Error + Send + Sync> {}

impl<T: FailureDetails + ?Sized> FailureDetails for std::sync::Arc<T> {
    fn sql_state(&self) -> Option<&str> {
        (**self).sql_state()
    }

    fn http_status(&self) -> Option<u16> {
        (**self).http_status()
    }

    fn is_timeout(&self) -> bool {
        (**self).is_timeout()
    }

    fn is_connection(&self) -> bool {
        (**self).is_connection()
    }

    fn is_cancellation(&self) -> bool {
        (**self).is_cancellation()
    }
}

/// What kind of resource an operation talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ResourceKind {
    /// SQL database.
    Database,
    /// Third-party HTTP API.
    ExternalService,
    /// Cache or counter store.
    Cache,
}

impl ResourceKind {
    /// Lowercase label used in logs and operation names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Database => "database",
            ResourceKind::ExternalService => "external-service",
            ResourceKind::Cache => "cache",
        }
    }

    /// True when `error` is transient for this kind of resource.
    pub fn is_retryable<E>(&self, error: &E) -> bool
    where
        E: FailureDetails + ?Sized,
    {
        if error.is_cancellation() {
            return false;
        }

        match self {
            ResourceKind::Database => database_retryable(error),
            ResourceKind::ExternalService => service_retryable(error),
            ResourceKind::Cache => error.is_timeout() || error.is_connection() || {
                let message = error.to_string().to_lowercase();
                contains_any(&message, &["connection", "timeout", "timed out"])
            },
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn database_retryable<E: FailureDetails + ?Sized>(error: &E) -> bool {
    if let Some(state) = error.sql_state() {
        match state {
            // deadlock, serialization failure, statement timeout
            "40P01" | "40001" | "57014" => return true,
            // connection exceptions, insufficient resources
            s if s.starts_with("08") || s.starts_with("53") => return true,
            // integrity, data and syntax/permission errors
            s if s.starts_with("23") || s.starts_with("22") || s.starts_with("42") => {
                return false
            }
            _ => {}
        }
    }

    if error.is_timeout() || error.is_connection() {
        return true;
    }

    let message = error.to_string().to_lowercase();
    contains_any(&message, &["connection", "deadlock", "timeout", "timed out"])
}

fn service_retryable<E: FailureDetails + ?Sized>(error: &E) -> bool {
    match error.http_status() {
        Some(429) => return true,
        Some(status) if (400..500).contains(&status) => return false,
        Some(status) if status >= 500 => return true,
        _ => {}
    }

    if error.is_timeout() || error.is_connection() {
        return true;
    }

    let message = error.to_string().to_lowercase();
    contains_any(&message, &["timeout", "network", "connection", "fetch"])
}

fn contains_any(message: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| message.contains(keyword))
}
