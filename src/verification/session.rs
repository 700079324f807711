//! Per-request verification state.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::PipelineError;
use crate::automaton::Automaton;
use crate::checker::VerifyResult;
use crate::llm::Conversation;
use crate::mission::BehaviorNode;
use crate::promela::CompiledProgram;

/// Where a session is in the verification loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NeedXml,
    NeedLtl,
    NeedReconcile,
    NeedModelCheck,
    NeedArbiter,
    NeedTrailCheck,
    Done,
    Failed,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Done | State::Failed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::NeedXml => "need_xml",
            State::NeedLtl => "need_ltl",
            State::NeedReconcile => "need_reconcile",
            State::NeedModelCheck => "need_model_check",
            State::NeedArbiter => "need_arbiter",
            State::NeedTrailCheck => "need_trail_check",
            State::Done => "done",
            State::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Everything one mission request accumulates on its way to a verdict.
///
/// # Invariants
/// - `retry_count <= max_retries`
/// - `state == Failed` ⇒ `last_diagnostic.is_some()`
/// - `compiled_program.is_some()` ⇒ `behavior_tree.is_some()`
#[derive(Debug)]
pub struct VerificationSession {
    pub id: Uuid,
    pub request: String,
    pub started_at: DateTime<Utc>,
    pub state: State,
    pub retry_count: u32,
    pub max_retries: u32,
    pub xml_valid: bool,
    pub ltl_valid: bool,
    pub mission_text: Option<String>,
    pub property_text: Option<String>,
    pub behavior_tree: Option<BehaviorNode>,
    pub compiled_program: Option<CompiledProgram>,
    pub automaton: Option<Automaton>,
    pub verify_result: Option<VerifyResult>,
    pub last_diagnostic: Option<String>,
    /// Next prompt for the mission role
    pub mission_prompt: String,
    /// Next prompt for the property role
    pub property_prompt: String,
    pub mission_conversation: Conversation,
    pub property_conversation: Conversation,
}

impl VerificationSession {
    /// Start a session with freshly framed conversations.
    pub fn new(
        request: impl Into<String>,
        max_retries: u32,
        mission_conversation: Conversation,
        property_conversation: Conversation,
    ) -> Self {
        let request = request.into();
        Self {
            id: Uuid::new_v4(),
            mission_prompt: request.clone(),
            property_prompt: String::new(),
            request,
            started_at: Utc::now(),
            state: State::NeedXml,
            retry_count: 0,
            max_retries,
            xml_valid: false,
            ltl_valid: false,
            mission_text: None,
            property_text: None,
            behavior_tree: None,
            compiled_program: None,
            automaton: None,
            verify_result: None,
            last_diagnostic: None,
            mission_conversation,
            property_conversation,
        }
    }

    /// Work directory of this session under `base`.
    pub fn work_dir(&self, base: &Path) -> PathBuf {
        base.join(self.id.to_string())
    }

    pub fn advance(&mut self, next: State) {
        tracing::info!("Session {}: {} -> {}", self.id, self.state, next);
        self.state = next;
    }

    /// Spend one retry on `error`, or fail the session.
    ///
    /// Returns the state the session moved to.
    pub fn record_failure(&mut self, error: &PipelineError) -> State {
        self.last_diagnostic = Some(error.to_string());

        let next = if !error.is_retryable() {
            tracing::error!("Session {}: unrecoverable failure: {}", self.id, error);
            State::Failed
        } else if self.retry_count < self.max_retries {
            self.retry_count += 1;
            tracing::warn!(
                "Session {}: retry {}/{} after {}: {}",
                self.id,
                self.retry_count,
                self.max_retries,
                self.state,
                crate::util::preview(&error.to_string(), 200)
            );
            error.retry_state()
        } else {
            tracing::error!(
                "Session {}: retry budget of {} exhausted",
                self.id,
                self.max_retries
            );
            State::Failed
        };

        self.advance(next);
        next
    }

    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}
