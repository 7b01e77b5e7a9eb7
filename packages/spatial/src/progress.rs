//! Progress reporting for the cone join.
//!
//! [`ProgressCallback`] keeps the join independent of how progress is
//! rendered. The CLI supplies `indicatif` bars; tests and library callers
//! use [`NullProgress`].

/// Observer of the cone join. One unit is one observation.
///
/// `inc` is called from rayon workers when the `parallel` feature is on.
pub trait ProgressCallback: Send + Sync {
    /// Number of observations about to be matched.
    fn set_total(&self, total: u64);

    fn inc(&self, delta: u64);

    fn set_message(&self, msg: String);

    /// Called once with the pair count after the last observation.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}
