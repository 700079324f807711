//! Acceptance of sampled runs by a second opinion.
//!
//! Model checking proves the mission satisfies the property; the arbiter checks that
//! the property says what the user asked for, by looking at example executions.

use std::sync::Arc;

use async_trait::async_trait;

use super::prompts;
use crate::automaton::AcceptingRun;
use crate::llm::{Conversation, TextGenerator};

const ARBITER_FRAMING: &str = "You review robot mission plans for faithfulness to the request.";

/// Verdict on a set of sampled runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgment {
    pub approved: bool,
    /// Explanation fed back to the property generator on rejection
    pub rationale: String,
}

#[async_trait]
pub trait Arbiter: Send + Sync {
    async fn judge(&self, request: &str, runs: &[AcceptingRun]) -> anyhow::Result<Judgment>;
}

/// Asks a secondary model; any answer containing "yes" approves.
pub struct LlmArbiter {
    generator: Arc<dyn TextGenerator>,
}

impl LlmArbiter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Arbiter for LlmArbiter {
    async fn judge(&self, request: &str, runs: &[AcceptingRun]) -> anyhow::Result<Judgment> {
        let question = prompts::arbiter_question(request, runs);
        tracing::debug!("Asking arbiter: {}", question);

        let mut conversation = Conversation::new(ARBITER_FRAMING);
        let answer = self.generator.generate(&question, &mut conversation).await?;
        tracing::debug!("Arbiter says {}", answer);

        if answer.to_lowercase().contains("yes") {
            tracing::info!("Arbiter approves. Mission proceeding...");
            Ok(Judgment {
                approved: true,
                rationale: answer,
            })
        } else {
            tracing::warn!("Arbiter disapproves of {} example runs", runs.len());
            Ok(Judgment {
                approved: false,
                rationale: format!(
                    "A reviewer judged these example executions unfaithful to the request \"{}\":\n{}",
                    request,
                    prompts::render_runs(runs)
                ),
            })
        }
    }
}

/// Interactive line input.
#[async_trait]
pub trait LineSource: Send + Sync {
    /// Show `prompt` and read one line; `None` at end of input.
    async fn read_line(&self, prompt: &str) -> anyhow::Result<Option<String>>;
}

/// The process's stdin/stdout.
///
/// Reads go through the standard library's shared stdin buffer, so the same source
/// can serve both mission requests and review answers.
pub struct Stdin;

#[async_trait]
impl LineSource for Stdin {
    async fn read_line(&self, prompt: &str) -> anyhow::Result<Option<String>> {
        let prompt = prompt.to_string();
        let line = tokio::task::spawn_blocking(move || -> std::io::Result<Option<String>> {
            use std::io::Write;
            let mut stdout = std::io::stdout();
            write!(stdout, "{}", prompt)?;
            stdout.flush()?;

            let mut line = String::new();
            let read = std::io::stdin().read_line(&mut line)?;
            Ok((read > 0).then(|| line.trim_end_matches(['\r', '\n']).to_string()))
        })
        .await??;
        Ok(line)
    }
}

/// A person approves or rejects the runs.
pub struct ConsoleArbiter<S: LineSource = Stdin> {
    source: S,
}

impl ConsoleArbiter<Stdin> {
    pub fn stdin() -> Self {
        Self { source: Stdin }
    }
}

impl<S: LineSource> ConsoleArbiter<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: LineSource> Arbiter for ConsoleArbiter<S> {
    async fn judge(&self, request: &str, runs: &[AcceptingRun]) -> anyhow::Result<Judgment> {
        let prompt = format!(
            "Here are {} example executions of your mission:\n{}\nNote, these are just several possible runs.\n\nType y/n: ",
            runs.len(),
            prompts::render_runs(runs)
        );

        loop {
            let Some(answer) = self.source.read_line(&prompt).await? else {
                anyhow::bail!("input closed while waiting for mission review");
            };
            match answer.trim() {
                "y" => {
                    tracing::info!("Mission proceeding...");
                    return Ok(Judgment {
                        approved: true,
                        rationale: "approved by reviewer".to_string(),
                    });
                }
                "n" => {
                    tracing::info!("Conflict between mission and reviewer... Let's try again.");
                    return Ok(Judgment {
                        approved: false,
                        rationale: format!(
                            "The operator rejected these example executions of \"{}\":\n{}",
                            request,
                            prompts::render_runs(runs)
                        ),
                    });
                }
                _ => continue,
            }
        }
    }
}
