//! Decides which outcomes count against a breaker.
//!
//! By default every `Err` is a failure and every `Ok` a success. A custom
//! [`FailureClassifier`] can exempt errors that say nothing about the
//! resource's health (a validation error, a 404), or count an `Ok` as a
//! failure (a 503 response body). Exempted errors are neither successes nor
//! failures: they leave the consecutive-failure count untouched.

use std::sync::Arc;

/// Classifies an outcome as a failure for breaker purposes.
pub trait FailureClassifier<Res, Err>: Send + Sync {
    /// Returns `true` when `result` should count as a failure.
    fn classify(&self, result: &Result<Res, Err>) -> bool;
}

/// Every error is a failure.
///
/// ```rust
/// use bulwark_circuitbreaker::classifier::{DefaultClassifier, FailureClassifier};
///
/// let classifier = DefaultClassifier;
/// assert!(!FailureClassifier::<u64, std::io::Error>::classify(&classifier, &Ok(1)));
/// assert!(FailureClassifier::<u64, std::io::Error>::classify(
///     &classifier,
///     &Err(std::io::Error::other("connection refused"))
/// ));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl<Res, Err> FailureClassifier<Res, Err> for DefaultClassifier {
    fn classify(&self, result: &Result<Res, Err>) -> bool {
        result.is_err()
    }
}

/// Classifier backed by a closure.
///
/// ```rust
/// use bulwark_circuitbreaker::classifier::{FailureClassifier, FnClassifier};
///
/// #[derive(Debug)]
/// enum QueryError {
///     UniqueViolation,
///     ConnectionReset,
/// }
///
/// // Constraint violations are the caller's fault, not the database's.
/// let classifier = FnClassifier::new(|result: &Result<(), QueryError>| {
///     matches!(result, Err(QueryError::ConnectionReset))
/// });
///
/// assert!(!classifier.classify(&Err(QueryError::UniqueViolation)));
/// assert!(classifier.classify(&Err(QueryError::ConnectionReset)));
/// ```
#[derive(Clone)]
pub struct FnClassifier<F> {
    f: Arc<F>,
}

impl<F> FnClassifier<F> {
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F, Res, Err> FailureClassifier<Res, Err> for FnClassifier<F>
where
    F: Fn(&Result<Res, Err>) -> bool + Send + Sync,
{
    fn classify(&self, result: &Result<Res, Err>) -> bool {
        (self.f)(result)
    }
}

impl<F> std::fmt::Debug for FnClassifier<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnClassifier").finish_non_exhaustive()
    }
}

/// What a finished call does to the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Success,
    Failure,
    Ignored,
}

pub(crate) fn verdict<C, Res, Err>(classifier: &C, result: &Result<Res, Err>) -> Verdict
where
    C: FailureClassifier<Res, Err> + ?Sized,
{
    match (classifier.classify(result), result.is_ok()) {
        (true, _) => Verdict::Failure,
        (false, true) => Verdict::Success,
        (false, false) => Verdict::Ignored,
    }
}
