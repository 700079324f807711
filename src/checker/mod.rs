//! Model checking of compiled missions against generated properties.

mod spin;

pub use spin::SpinModelChecker;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Result of one exhaustive search.
///
/// # Invariants
/// - `ok == true` ⇒ `trail.is_none()`
/// - `ok == false` ⇒ `trail` holds the counterexample replay output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyResult {
    pub ok: bool,
    pub trail: Option<String>,
}

impl VerifyResult {
    pub fn pass() -> Self {
        Self { ok: true, trail: None }
    }

    pub fn violated(trail: impl Into<String>) -> Self {
        Self {
            ok: false,
            trail: Some(trail.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckerError {
    /// The checker binary could not be started at all.
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The checker ran and exited nonzero; `output` is what it printed.
    #[error("model checker exited with status {status}: {output}")]
    Execution { status: i32, output: String },

    #[error("model checker timed out after {0:?}")]
    Timeout(Duration),

    #[error("work file error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckerError {
    /// Whether regenerating the property can fix this.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CheckerError::Execution { .. } | CheckerError::Timeout(_))
    }
}

#[async_trait]
pub trait ModelChecker: Send + Sync {
    /// Check `program` against `property`, writing work files under `work_dir`.
    async fn verify(
        &self,
        program: &str,
        property: &str,
        work_dir: &Path,
    ) -> Result<VerifyResult, CheckerError>;
}
