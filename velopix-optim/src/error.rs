//! Error types for velopix-optim.

use thiserror::Error;

/// Result type alias for optimizer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Optimizer error types.
///
/// `ExhaustedSearchSpace` and `OptimizerTerminated` are terminal signals
/// rather than failures: the caller should stop its loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A finite strategy has proposed every point of its space.
    #[error("search space exhausted")]
    ExhaustedSearchSpace,

    /// The optimizer reached a stopping criterion.
    #[error("optimizer terminated")]
    OptimizerTerminated,

    /// `update` was called with parameters that were not proposed.
    #[error("update does not match the outstanding proposal")]
    UnexpectedTrial,

    /// The search space definition is inconsistent.
    #[error("invalid search space: {0}")]
    InvalidSearchSpace(String),

    /// Error raised by a pipeline or the core types.
    #[error(transparent)]
    Core(#[from] velopix_core::Error),
}

impl Error {
    /// True for the signals that end an optimization loop normally.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ExhaustedSearchSpace | Self::OptimizerTerminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_signals() {
        assert!(Error::ExhaustedSearchSpace.is_terminal());
        assert!(Error::OptimizerTerminated.is_terminal());
        assert!(!Error::UnexpectedTrial.is_terminal());
        let core: Error = velopix_core::Error::MissingGroundTruth.into();
        assert!(!core.is_terminal());
        assert_eq!(core.to_string(), velopix_core::Error::MissingGroundTruth.to_string());
    }
}
