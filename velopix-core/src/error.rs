//! Error types for velopix-core.

use thiserror::Error;

/// Result type alias for velopix operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for reconstruction and evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A parameter set violates the algorithm's declared schema.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// The event carries fewer hits than the algorithm requires.
    #[error("event has {hits} hit(s), algorithm requires at least {required}")]
    EmptyEvent { hits: usize, required: usize },

    /// Evaluation was requested on an event without truth associations.
    #[error("event carries no ground-truth tracks")]
    MissingGroundTruth,

    /// An algorithm's internal search exceeded a safety bound.
    #[error("{algorithm} did not converge: {reason}")]
    AlgorithmConvergence {
        algorithm: &'static str,
        reason: String,
    },

    /// Event data violates hit invariants.
    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

impl Error {
    /// Creates an invalid parameter error.
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors that fail a single trial without aborting
    /// an optimization run.
    #[must_use]
    pub fn is_trial_failure(&self) -> bool {
        matches!(
            self,
            Self::AlgorithmConvergence { .. } | Self::EmptyEvent { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trial_failure_classification() {
        assert!(Error::EmptyEvent {
            hits: 0,
            required: 3
        }
        .is_trial_failure());
        assert!(Error::AlgorithmConvergence {
            algorithm: "GraphDFS",
            reason: "too deep".into()
        }
        .is_trial_failure());
        assert!(!Error::MissingGroundTruth.is_trial_failure());
        assert!(!Error::invalid_parameter("max_scatter", "out of range").is_trial_failure());
    }

    #[test]
    fn test_error_display() {
        let err = Error::invalid_parameter("max_scatter", "must be finite");
        assert_eq!(
            err.to_string(),
            "invalid parameter `max_scatter`: must be finite"
        );
    }
}
