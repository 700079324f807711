//! Cross-check between a mission tree and the property generated for it.
//!
//! Both artifacts come from the same request, so they should describe the same number of
//! steps. The mission counts leaves plus condition gates; the property counts the
//! automaton's non-self-loop transitions. A mismatch is blamed on the property: the
//! mission has already passed schema validation and compilation.

use std::fmt;

use thiserror::Error;

/// Which side has more steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftDirection {
    /// The property describes more steps than the mission.
    More,
    /// The property describes fewer steps than the mission.
    Fewer,
}

impl fmt::Display for DriftDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftDirection::More => write!(f, "more"),
            DriftDirection::Fewer => write!(f, "fewer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("property describes {delta} {direction} tasks than the mission")]
pub struct DriftError {
    pub direction: DriftDirection,
    pub delta: usize,
}

impl DriftError {
    /// Prompt text asking the property generator to fix the mismatch.
    pub fn feedback(&self) -> String {
        format!(
            "The LTL you generated has {} {} tasks than the mission plan. \
             Regenerate the LTL so that it describes exactly the tasks of the mission plan.",
            self.delta, self.direction
        )
    }
}

/// Compare mission and property task counts.
pub fn reconcile(mission_task_count: usize, property_task_count: usize) -> Result<(), DriftError> {
    if property_task_count > mission_task_count {
        Err(DriftError {
            direction: DriftDirection::More,
            delta: property_task_count - mission_task_count,
        })
    } else if property_task_count < mission_task_count {
        Err(DriftError {
            direction: DriftDirection::Fewer,
            delta: mission_task_count - property_task_count,
        })
    } else {
        tracing::debug!("Mission and property agree on {} tasks", mission_task_count);
        Ok(())
    }
}
