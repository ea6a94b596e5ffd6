//! Fire-and-forget tasks.
//!
//! Some side effects (admin notifications, cache warm-ups, audit pings) must
//! never fail the request that triggered them. [`spawn_detached`] runs such a
//! future as its own task and reduces its `Result` to a log line: the returned
//! handle yields `()` so there is nothing for the caller to propagate.
//!
//! ```rust
//! use bulwark_core::spawn_detached;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let handle = spawn_detached("notify-admins", async {
//!     Err::<(), _>("mail relay refused connection")
//! });
//! // Awaiting is optional; the error has already been logged.
//! handle.await.ok();
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Spawns `future` on the current runtime, logging and discarding its error.
///
/// # Panics
///
/// Panics when called outside a Tokio runtime, like [`tokio::spawn`].
pub fn spawn_detached<F, E>(operation: impl Into<String>, future: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(swallow(operation.into(), future))
}

/// Like [`spawn_detached`], on an explicit runtime handle.
pub fn spawn_detached_on<F, E>(
    handle: &Handle,
    operation: impl Into<String>,
    future: F,
) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    handle.spawn(swallow(operation.into(), future))
}

async fn swallow<F, E>(operation: String, future: F)
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    if let Err(error) = future.await {
        tracing::error!(operation = %operation, error = %error, "detached task failed");

        #[cfg(feature = "metrics")]
        metrics::counter!("detached_task_failures_total", "operation" => operation).increment(1);
    }
}
