//! Verification loop: turns a mission request into a checked mission plan.
//!
//! The [`Orchestrator`] owns the collaborators (generators, validator, translator,
//! model checker, arbiter) and runs one [`VerificationSession`] per request under a
//! shared retry budget.

pub mod arbiter;
pub mod error;
pub mod orchestrator;
pub mod prompts;
pub mod session;

pub use arbiter::{Arbiter, ConsoleArbiter, Judgment, LineSource, LlmArbiter, Stdin};
pub use error::PipelineError;
pub use orchestrator::{Collaborators, MissionOutcome, Orchestrator, OrchestratorSettings};
pub use session::{State, VerificationSession};
