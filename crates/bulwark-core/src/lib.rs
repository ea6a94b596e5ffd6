//! Shared infrastructure for bulwark.
//!
//! Every pattern crate in the workspace builds on the pieces here:
//! - [`events`]: listener registry used by breakers, retries and limiters
//! - [`error`]: the unified [`ResilienceError`] taxonomy and its user-facing mapping
//! - [`detached`]: fire-and-forget tasks whose failures are logged, never propagated

pub mod detached;
pub mod error;
pub mod events;

pub use detached::spawn_detached;
pub use error::{ResilienceError, UserFacing};
pub use events::{EventListener, EventListeners, FnListener, ResilienceEvent};
