//! Property → automaton translation through Spot's `ltl2tgba`.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use super::{parse_hoa, Automaton, HoaError};
use crate::property::translator_formula;
use crate::util::sanitize_output;

#[derive(Debug, Error)]
pub enum TranslateError {
    /// The formula was rejected or the automaton could not be read. Recoverable by
    /// regenerating the property.
    #[error("property syntax error: {0}")]
    Syntax(String),

    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<HoaError> for TranslateError {
    fn from(err: HoaError) -> Self {
        TranslateError::Syntax(format!("unreadable automaton: {}", err))
    }
}

#[async_trait]
pub trait AutomatonTranslator: Send + Sync {
    /// Translate property text (Spin syntax, wrapper allowed) into a Büchi automaton.
    async fn translate(&self, property: &str) -> Result<Automaton, TranslateError>;
}

pub struct Ltl2TgbaTranslator {
    binary: PathBuf,
    initial: Option<String>,
}

impl Ltl2TgbaTranslator {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            initial: None,
        }
    }

    /// Conjoin every formula with an initial-state clause.
    pub fn with_initial(mut self, initial: impl Into<String>) -> Self {
        self.initial = Some(initial.into());
        self
    }
}

#[async_trait]
impl AutomatonTranslator for Ltl2TgbaTranslator {
    async fn translate(&self, property: &str) -> Result<Automaton, TranslateError> {
        let formula = translator_formula(property, self.initial.as_deref());
        tracing::debug!("Translating formula: {}", formula);

        let output = Command::new(&self.binary)
            .args(["-B", "-H", "-f"])
            .arg(&formula)
            .output()
            .await
            .map_err(|source| TranslateError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = sanitize_output(&output.stderr);
            return Err(TranslateError::Syntax(format!(
                "{} rejected '{}': {}",
                self.binary.display(),
                formula,
                stderr.trim()
            )));
        }

        let automaton = parse_hoa(&sanitize_output(&output.stdout))?;
        tracing::debug!(
            "Automaton has {} states and {} transitions",
            automaton.states,
            automaton.transition_count()
        );
        Ok(automaton)
    }
}
