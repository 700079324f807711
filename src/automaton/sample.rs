//! Random accepting runs through an automaton.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use super::{Automaton, Edge};

/// Walk length after which sampling gives up.
pub const DEFAULT_MAX_STEPS: usize = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SampleError {
    #[error("state {0} has no transition to another state")]
    NoProgress(usize),

    #[error("no accepting state reached within {0} steps")]
    StepLimit(usize),
}

/// Edge labels from the initial state to an accepting state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptingRun(pub Vec<String>);

impl AcceptingRun {
    pub fn labels(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for AcceptingRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

/// Draw one accepting run.
///
/// Each step picks uniformly among the current state's edges that lead elsewhere. The
/// walk always takes at least one step, so an accepting initial state still yields a
/// non-empty run, and stops on the first accepting state after that.
pub fn sample_accepting_run<R: Rng + ?Sized>(
    automaton: &Automaton,
    rng: &mut R,
    max_steps: usize,
) -> Result<AcceptingRun, SampleError> {
    let mut current = automaton.initial;
    let mut labels = Vec::new();

    loop {
        if labels.len() >= max_steps {
            return Err(SampleError::StepLimit(max_steps));
        }

        let moves: Vec<&Edge> = automaton.out(current).filter(|e| !e.is_self_loop()).collect();
        let edge = moves
            .choose(rng)
            .ok_or(SampleError::NoProgress(current))?;

        labels.push(edge.label.clone());
        current = edge.dst;

        if automaton.is_accepting(current) {
            return Ok(AcceptingRun(labels));
        }
    }
}

/// Draw `count` independent runs.
pub fn sample_runs<R: Rng + ?Sized>(
    automaton: &Automaton,
    rng: &mut R,
    count: usize,
    max_steps: usize,
) -> Result<Vec<AcceptingRun>, SampleError> {
    (0..count)
        .map(|_| sample_accepting_run(automaton, rng, max_steps))
        .collect()
}
