//! Büchi automata for temporal properties.
//!
//! Properties are translated by an external tool into HOA text, parsed into an
//! [`Automaton`], and sampled for accepting runs that a reviewer can read.

pub mod hoa;
pub mod sample;
pub mod translate;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub use hoa::{parse_hoa, HoaError};
pub use sample::{sample_accepting_run, sample_runs, AcceptingRun, SampleError, DEFAULT_MAX_STEPS};
pub use translate::{AutomatonTranslator, Ltl2TgbaTranslator, TranslateError};

/// A labeled transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub src: usize,
    pub dst: usize,
    /// Guard rendered over proposition names, e.g. `done & !"temp > 30"`
    pub label: String,
}

impl Edge {
    pub fn is_self_loop(&self) -> bool {
        self.src == self.dst
    }
}

/// State-based Büchi automaton.
///
/// # Invariants
/// - `initial < states`
/// - every edge endpoint and accepting state is `< states`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Automaton {
    pub states: usize,
    pub initial: usize,
    pub accepting: BTreeSet<usize>,
    pub edges: Vec<Edge>,
    pub atomic_propositions: Vec<String>,
}

impl Automaton {
    pub fn is_accepting(&self, state: usize) -> bool {
        self.accepting.contains(&state)
    }

    /// Outgoing edges of `state`, in declaration order.
    pub fn out(&self, state: usize) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.src == state)
    }

    /// Number of transitions that change state.
    ///
    /// Used as the step count of the property when reconciling it with the mission.
    pub fn transition_count(&self) -> usize {
        self.edges.iter().filter(|e| !e.is_self_loop()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_count_ignores_self_loops() {
        let automaton = Automaton {
            states: 3,
            initial: 0,
            accepting: BTreeSet::from([2]),
            edges: vec![
                Edge { src: 0, dst: 0, label: "!a".into() },
                Edge { src: 0, dst: 1, label: "a".into() },
                Edge { src: 1, dst: 2, label: "b".into() },
                Edge { src: 2, dst: 2, label: "1".into() },
            ],
            atomic_propositions: vec!["a".into(), "b".into()],
        };
        assert_eq!(automaton.transition_count(), 2);
        assert_eq!(automaton.out(0).count(), 2);
        assert!(automaton.is_accepting(2));
        assert!(!automaton.is_accepting(0));
    }
}
