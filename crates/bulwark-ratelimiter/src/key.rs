//! Counter keys and actor identification.

use http::request::Parts;
use http::HeaderMap;
use std::fmt;
use std::sync::Arc;

/// Actor identifier used when no user is authenticated and no client
/// address header is present.
pub const UNKNOWN_ACTOR: &str = "unknown";

/// Request extension naming the authenticated user.
///
/// Authentication middleware inserts it; the default key generator prefers
/// it over the client address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedActor(pub String);

/// Request extension naming the action being limited.
///
/// Without it the default key generator uses the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionName(pub String);

/// Counter key for `actor` performing `action`: `rate_limit:{actor}:{action}`.
///
/// ```rust
/// assert_eq!(
///     bulwark_ratelimiter::rate_limit_key("user_42", "create-comment"),
///     "rate_limit:user_42:create-comment"
/// );
/// ```
pub fn rate_limit_key(actor: &str, action: &str) -> String {
    format!("rate_limit:{}:{}", actor, action)
}

/// Best-effort client address.
///
/// The first entry of `x-forwarded-for`, then `x-real-ip`, then
/// [`UNKNOWN_ACTOR`].
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_ACTOR)
        .to_string()
}

/// Derives the counter key from a request.
#[derive(Clone)]
pub struct KeyGenerator {
    f: Arc<dyn Fn(&Parts) -> String + Send + Sync>,
}

impl KeyGenerator {
    /// Authenticated actor, falling back to the client address, plus the
    /// [`ActionName`] extension or the request path.
    pub fn actor() -> Self {
        Self::from_fn(|parts| {
            let actor = match parts.extensions.get::<AuthenticatedActor>() {
                Some(AuthenticatedActor(id)) => id.clone(),
                None => client_ip(&parts.headers),
            };
            rate_limit_key(&actor, &action_of(parts))
        })
    }

    /// Client address and a fixed action name, for public routes.
    pub fn client_ip(action: impl Into<String>) -> Self {
        let action = action.into();
        Self::from_fn(move |parts| rate_limit_key(&client_ip(&parts.headers), &action))
    }

    /// Custom key derivation.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Parts) -> String + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// Key for the request described by `parts`.
    pub fn key(&self, parts: &Parts) -> String {
        (self.f)(parts)
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::actor()
    }
}

impl fmt::Debug for KeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGenerator").finish_non_exhaustive()
    }
}

fn action_of(parts: &Parts) -> String {
    match parts.extensions.get::<ActionName>() {
        Some(ActionName(name)) => name.clone(),
        None => parts.uri.path().to_string(),
    }
}
