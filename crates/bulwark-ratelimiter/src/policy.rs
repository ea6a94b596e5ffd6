use std::time::Duration;

/// How many requests an actor may make per window.
///
/// The window opens on the first counted request and lasts `window`;
/// the counter then expires and the next request opens a fresh window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RateLimitPolicy {
    /// Requests allowed per window.
    pub requests: u64,
    /// Window length, read as whole seconds when deserialized.
    #[cfg_attr(feature = "serde", serde(rename = "window_seconds", with = "seconds"))]
    pub window: Duration,
}

impl RateLimitPolicy {
    /// `requests` per `window`.
    pub fn new(requests: u64, window: Duration) -> Self {
        Self { requests, window }
    }

    /// `requests` per `window_seconds` seconds.
    pub fn per_seconds(requests: u64, window_seconds: u64) -> Self {
        Self::new(requests, Duration::from_secs(window_seconds))
    }
}

#[cfg(feature = "serde")]
mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(window: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(window.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
