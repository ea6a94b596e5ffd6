use std::time::Duration;

/// Computes the delay between attempts.
///
/// `retry` is zero-based: `next_interval(0)` is the wait before the second
/// attempt, `next_interval(1)` the wait before the third, and so on.
pub trait IntervalFunction: Send + Sync {
    /// Delay before retry number `retry + 1`.
    fn next_interval(&self, retry: usize) -> Duration;
}

/// Same delay before every retry.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    duration: Duration,
}

impl FixedInterval {
    /// Waits `duration` before each retry.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl IntervalFunction for FixedInterval {
    fn next_interval(&self, _retry: usize) -> Duration {
        self.duration
    }
}

/// `initial * multiplier^retry`, optionally capped.
///
/// With the default multiplier of 2 the delay before attempt `k` is
/// `initial * 2^(k-2)`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Option<Duration>,
}

impl ExponentialBackoff {
    /// Doubles `initial_interval` on each retry.
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            multiplier: 2.0,
            max_interval: None,
        }
    }

    /// Growth factor per retry.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Upper bound on any single delay.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    fn capped(&self, retry: usize) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let factor = self.multiplier.powi(exponent);
        // mul_f64 panics on overflow or non-finite input.
        let secs = self.initial_interval.as_secs_f64() * factor;
        let interval = if secs.is_finite() && secs < u64::MAX as f64 {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            Duration::MAX
        };

        match self.max_interval {
            Some(max) => interval.min(max),
            None => interval,
        }
    }
}

impl IntervalFunction for ExponentialBackoff {
    fn next_interval(&self, retry: usize) -> Duration {
        self.capped(retry)
    }
}

/// Exponential backoff with full jitter.
///
/// Each delay is drawn uniformly from `[0, capped exponential delay]`, which
/// spreads concurrent callers retrying against the same resource.
#[derive(Debug, Clone)]
pub struct ExponentialRandomBackoff {
    inner: ExponentialBackoff,
}

impl ExponentialRandomBackoff {
    /// Jittered doubling from `initial_interval`.
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            inner: ExponentialBackoff::new(initial_interval),
        }
    }

    /// Growth factor per retry.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.inner = self.inner.multiplier(multiplier);
        self
    }

    /// Upper bound before jitter is applied.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.inner = self.inner.max_interval(max_interval);
        self
    }
}

impl IntervalFunction for ExponentialRandomBackoff {
    fn next_interval(&self, retry: usize) -> Duration {
        use rand::Rng;

        let ceiling = self.inner.capped(retry);
        if ceiling.is_zero() {
            return ceiling;
        }
        let millis = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(0..=millis))
    }
}

/// Delay computed by a closure.
pub struct FnInterval<F> {
    f: F,
}

impl<F> FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    /// Wraps `f`, which receives the zero-based retry index.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> IntervalFunction for FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn next_interval(&self, retry: usize) -> Duration {
        (self.f)(retry)
    }
}
