//! Harness error type

use thiserror::Error;

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, Error>;

/// Harness error
///
/// A scenario's pass/fail is the conjunction of every control plane
/// call succeeding and every explicit post-condition holding; the two
/// failure kinds stay distinguishable here.
#[derive(Debug, Error)]
pub enum Error {
    /// A control plane operation failed
    #[error(transparent)]
    Control(#[from] nexio_control::Error),

    /// The build spec itself is inconsistent
    #[error("invalid build spec: {0}")]
    Spec(String),

    /// A post-condition assertion on cluster state failed
    #[error("verification failed: {0}")]
    Verification(String),
}
