//! Failures of a verification stage.

use thiserror::Error;

use super::session::State;
use crate::property::DriftError;

/// A stage failure.
///
/// `Display` of a recoverable variant is the diagnostic handed to the generator that
/// has to fix it.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The mission answer held no usable XML.
    #[error("{0}")]
    GenerationFailure(String),

    #[error("{0}")]
    SchemaViolation(String),

    /// The mission tree cannot be modeled. Not recoverable.
    #[error("mission cannot be compiled: {0}")]
    StructuralCompile(String),

    #[error(transparent)]
    Drift(#[from] DriftError),

    #[error("{0}")]
    ModelCheckerExecution(String),

    #[error("{0}")]
    PropertySyntax(String),

    /// Counterexample trail from the model checker.
    #[error("{0}")]
    PropertyViolated(String),

    #[error("{0}")]
    ArbiterRejection(String),

    /// Missing tools, unreadable configured files, LLM errors after client retries.
    #[error("{0}")]
    Fatal(String),
}

impl PipelineError {
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::StructuralCompile(_) | PipelineError::Fatal(_)
        )
    }

    /// Stage that has to run again to recover.
    ///
    /// Mission-side problems regenerate the mission; everything the property generator
    /// can fix regenerates the property. A trail is blamed on the mission.
    pub fn retry_state(&self) -> State {
        match self {
            PipelineError::GenerationFailure(_)
            | PipelineError::SchemaViolation(_)
            | PipelineError::PropertyViolated(_) => State::NeedXml,
            PipelineError::Drift(_)
            | PipelineError::ModelCheckerExecution(_)
            | PipelineError::PropertySyntax(_)
            | PipelineError::ArbiterRejection(_) => State::NeedLtl,
            PipelineError::StructuralCompile(_) | PipelineError::Fatal(_) => State::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::reconcile;

    #[test]
    fn test_retryable_classification() {
        assert!(PipelineError::SchemaViolation("bad".into()).is_retryable());
        assert!(PipelineError::PropertyViolated("trail".into()).is_retryable());
        assert!(!PipelineError::StructuralCompile("dangling".into()).is_retryable());
        assert!(!PipelineError::Fatal("no spin".into()).is_retryable());
    }

    #[test]
    fn test_retry_routing() {
        assert_eq!(
            PipelineError::PropertyViolated("trail".into()).retry_state(),
            State::NeedXml
        );
        let drift = PipelineError::from(reconcile(4, 6).unwrap_err());
        assert_eq!(drift.retry_state(), State::NeedLtl);
        assert_eq!(drift.to_string(), "property describes 2 more tasks than the mission");
        assert_eq!(
            PipelineError::ModelCheckerExecution("exit 1".into()).retry_state(),
            State::NeedLtl
        );
        assert_eq!(PipelineError::Fatal("x".into()).retry_state(), State::Failed);
    }
}
