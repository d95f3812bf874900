//! Error types for prism-optimizer

use thiserror::Error;

use prism_search::SearchError;

/// Pipeline phase in which an optimizer error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Intent,
    Score,
    Allocate,
    Select,
    Compress,
    Reconstruct,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Intent => "intent",
            Phase::Score => "score",
            Phase::Allocate => "allocate",
            Phase::Select => "select",
            Phase::Compress => "compress",
            Phase::Reconstruct => "reconstruct",
        };
        write!(f, "{}", s)
    }
}

/// Errors surfaced by the token optimizer, tagged with the failing phase.
///
/// No partial results accompany an error; the pipeline either completes or
/// fails whole.
#[derive(Error, Debug)]
pub enum OptimizerError {
    /// A pipeline phase failed
    #[error("Optimizer failed in {phase} phase: {message}")]
    Phase {
        phase: Phase,
        message: String,
        /// Whether the caller may retry without correcting input
        retryable: bool,
    },

    /// External cancellation; not logged as an error
    #[error("Operation cancelled")]
    Cancelled,
}

impl OptimizerError {
    /// Wrap a message in a phase-tagged error.
    pub fn in_phase(phase: Phase, message: impl Into<String>) -> Self {
        Self::Phase {
            phase,
            message: message.into(),
            retryable: false,
        }
    }

    /// Lift a search-layer error into a phase-tagged error, preserving the
    /// cancellation and retryable classification.
    pub fn from_search(phase: Phase, error: SearchError) -> Self {
        match error {
            SearchError::Cancelled => Self::Cancelled,
            other => Self::Phase {
                phase,
                retryable: other.retryable(),
                message: other.to_string(),
            },
        }
    }

    /// The failing phase, when the error carries one.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Phase { phase, .. } => Some(*phase),
            Self::Cancelled => None,
        }
    }

    /// Whether the caller may retry the operation unchanged.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Phase { retryable: true, .. })
    }
}

/// Result type for prism-optimizer operations
pub type Result<T> = std::result::Result<T, OptimizerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_tag_preserved() {
        let err = OptimizerError::in_phase(Phase::Select, "no budget");
        assert_eq!(err.phase(), Some(Phase::Select));
        assert!(!err.retryable());
        assert!(err.to_string().contains("select"));
    }

    #[test]
    fn test_cancellation_passes_through() {
        let err = OptimizerError::from_search(Phase::Score, SearchError::Cancelled);
        assert!(matches!(err, OptimizerError::Cancelled));
    }

    #[test]
    fn test_retryable_classification_lifted() {
        let err = OptimizerError::from_search(
            Phase::Score,
            SearchError::ProviderUnavailable("timeout".into()),
        );
        assert!(err.retryable());

        let err = OptimizerError::from_search(
            Phase::Score,
            SearchError::EmbeddingFailed("quota".into()),
        );
        assert!(!err.retryable());
    }
}
