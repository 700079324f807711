//! The verification loop.
//!
//! ```text
//! NeedXml ──▶ NeedLtl ──▶ NeedReconcile ──▶ NeedModelCheck ──▶ NeedArbiter ──▶ NeedTrailCheck ──▶ Done
//!    ▲           ▲              │                  │                 │                 │
//!    │           └──── drift ───┘◀── tool error ───┘◀── rejected ────┘                 │
//!    └────────────────────────────────────── trail ─────────────────────────────────────┘
//! ```
//!
//! Every recoverable failure spends one unit of a single retry budget shared by all
//! stages. Without formal verification the loop ends after the mission validates.

use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::arbiter::Arbiter;
use super::error::PipelineError;
use super::prompts;
use super::session::{State, VerificationSession};
use crate::automaton::{sample_runs, AutomatonTranslator, DEFAULT_MAX_STEPS};
use crate::checker::{CheckerError, ModelChecker};
use crate::llm::{Conversation, TextGenerator};
use crate::mission::{parse_mission, schema_location, select_schema, SchemaValidator};
use crate::promela::ModelCompiler;
use crate::property::{extract_property, reconcile};
use crate::util::{extract_code_block, preview};

/// Terminal result of one mission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissionOutcome {
    /// The accepted mission was written to `artifact`.
    Verified { artifact: PathBuf, retries: u32 },
    Failed { diagnostic: String, retries: u32 },
}

/// Loop limits and locations.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_retries: u32,
    /// Run property generation and model checking after the mission validates
    pub verify: bool,
    /// Accepting runs shown to the arbiter per round
    pub example_runs: usize,
    pub max_sample_steps: usize,
    pub schemas: Vec<PathBuf>,
    /// Sessions get `<work_dir>/<session id>/`
    pub work_dir: PathBuf,
    /// Accepted missions land here
    pub artifact_dir: PathBuf,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            verify: true,
            example_runs: 5,
            max_sample_steps: DEFAULT_MAX_STEPS,
            schemas: Vec::new(),
            work_dir: PathBuf::from("./work"),
            artifact_dir: PathBuf::from("./missions"),
        }
    }
}

/// External collaborators of the loop.
pub struct Collaborators {
    pub mission_generator: Arc<dyn TextGenerator>,
    pub property_generator: Arc<dyn TextGenerator>,
    pub validator: Arc<dyn SchemaValidator>,
    pub translator: Arc<dyn AutomatonTranslator>,
    pub checker: Arc<dyn ModelChecker>,
    pub arbiter: Arc<dyn Arbiter>,
}

/// Drives sessions from a request to a verdict.
///
/// Holds only read-only state; each call to [`Orchestrator::run`] works on its own
/// session and conversations.
pub struct Orchestrator {
    collaborators: Collaborators,
    compiler: ModelCompiler,
    settings: OrchestratorSettings,
    mission_framing: Conversation,
    property_framing: Conversation,
}

impl Orchestrator {
    pub fn new(
        collaborators: Collaborators,
        compiler: ModelCompiler,
        settings: OrchestratorSettings,
        mission_framing: Conversation,
        property_framing: Conversation,
    ) -> Self {
        Self {
            collaborators,
            compiler,
            settings,
            mission_framing,
            property_framing,
        }
    }

    /// Run one mission request to a terminal state.
    pub async fn run(&self, request: &str) -> MissionOutcome {
        let mut session = VerificationSession::new(
            request,
            self.settings.max_retries,
            self.mission_framing.clone(),
            self.property_framing.clone(),
        );
        tracing::info!("Session {} started: {}", session.id, preview(request, 120));

        while !session.state.is_terminal() {
            match self.step(&mut session).await {
                Ok(next) => session.advance(next),
                Err(error) => {
                    if session.record_failure(&error) == State::NeedXml {
                        session.mission_prompt = match &error {
                            PipelineError::PropertyViolated(trail) => prompts::mission_violation(trail),
                            other => prompts::mission_retry(&other.to_string()),
                        };
                    } else if session.state == State::NeedLtl {
                        session.property_prompt = match &error {
                            PipelineError::Drift(drift) => drift.feedback(),
                            other => prompts::property_retry(&other.to_string()),
                        };
                    }
                }
            }
        }

        let outcome = match session.state {
            State::Done => match self.write_artifact(&session).await {
                Ok(artifact) => MissionOutcome::Verified {
                    artifact,
                    retries: session.retry_count,
                },
                Err(error) => MissionOutcome::Failed {
                    diagnostic: error.to_string(),
                    retries: session.retry_count,
                },
            },
            _ => MissionOutcome::Failed {
                diagnostic: session
                    .last_diagnostic
                    .clone()
                    .unwrap_or_else(|| "verification failed".to_string()),
                retries: session.retry_count,
            },
        };

        tracing::info!(
            "Session {} finished in {}s after {} retries",
            session.id,
            session.elapsed().num_seconds(),
            session.retry_count
        );
        outcome
    }

    async fn step(&self, session: &mut VerificationSession) -> Result<State, PipelineError> {
        match session.state {
            State::NeedXml => self.generate_mission(session).await,
            State::NeedLtl => self.generate_property(session).await,
            State::NeedReconcile => self.check_drift(session),
            State::NeedModelCheck => self.model_check(session).await,
            State::NeedArbiter => self.arbitrate(session).await,
            State::NeedTrailCheck => Self::check_trail(session),
            State::Done | State::Failed => Ok(session.state),
        }
    }

    /// Generate, validate, parse and compile a mission.
    async fn generate_mission(&self, session: &mut VerificationSession) -> Result<State, PipelineError> {
        session.xml_valid = false;
        let answer = self
            .collaborators
            .mission_generator
            .generate(&session.mission_prompt, &mut session.mission_conversation)
            .await
            .map_err(|e| PipelineError::Fatal(format!("mission generation failed: {}", e)))?;

        let xml = extract_code_block(&answer, "xml").ok_or_else(|| {
            PipelineError::GenerationFailure(
                "The answer did not contain a ```xml fenced mission plan.".to_string(),
            )
        })?;
        session.mission_text = Some(xml.clone());

        let hint = schema_location(&xml);
        tracing::debug!("Schema selected by generator: {:?}", hint);
        let schema = select_schema(&self.settings.schemas, hint.as_deref())
            .ok_or_else(|| PipelineError::Fatal("no mission schema configured".to_string()))?;

        let verdict = self
            .collaborators
            .validator
            .validate(schema, &xml)
            .await
            .map_err(|e| PipelineError::Fatal(format!("schema validation could not run: {}", e)))?;
        if !verdict.valid {
            return Err(PipelineError::SchemaViolation(verdict.message));
        }
        session.xml_valid = true;
        tracing::info!("Mission validated against {}", schema.display());

        if !self.settings.verify {
            return Ok(State::Done);
        }

        let tree = parse_mission(&xml).map_err(|e| {
            if e.is_structural() {
                PipelineError::StructuralCompile(e.to_string())
            } else {
                PipelineError::SchemaViolation(e.to_string())
            }
        })?;
        let program = self
            .compiler
            .compile(&tree)
            .map_err(|e| PipelineError::StructuralCompile(e.to_string()))?;
        tracing::debug!(
            "Compiled mission: {} tasks, {} sensor readings",
            program.task_declarations.len(),
            program.global_declarations.len()
        );

        // A new mission starts a new property conversation.
        session.property_conversation.reset();
        session.property_conversation.push_note(prompts::property_seed(&program));
        session.property_prompt = prompts::property_request(&session.request);
        session.property_text = None;
        session.automaton = None;
        session.verify_result = None;
        session.ltl_valid = false;

        session.behavior_tree = Some(tree);
        session.compiled_program = Some(program);
        Ok(State::NeedLtl)
    }

    /// Generate a property and translate it to an automaton.
    async fn generate_property(&self, session: &mut VerificationSession) -> Result<State, PipelineError> {
        session.ltl_valid = false;
        let answer = self
            .collaborators
            .property_generator
            .generate(&session.property_prompt, &mut session.property_conversation)
            .await
            .map_err(|e| PipelineError::Fatal(format!("property generation failed: {}", e)))?;

        let property = extract_property(&answer).ok_or_else(|| {
            PipelineError::PropertySyntax("The answer did not contain a ```ltl fenced property.".to_string())
        })?;

        let automaton = self
            .collaborators
            .translator
            .translate(&property)
            .await
            .map_err(|e| match e {
                crate::automaton::TranslateError::Syntax(message) => PipelineError::PropertySyntax(message),
                other => PipelineError::Fatal(other.to_string()),
            })?;

        session.ltl_valid = true;
        session.property_text = Some(property);
        session.automaton = Some(automaton);
        Ok(State::NeedReconcile)
    }

    fn check_drift(&self, session: &mut VerificationSession) -> Result<State, PipelineError> {
        let (Some(tree), Some(automaton)) = (&session.behavior_tree, &session.automaton) else {
            return Err(PipelineError::Fatal("reconcile without mission and property".to_string()));
        };
        reconcile(tree.task_count(), automaton.transition_count())?;
        Ok(State::NeedModelCheck)
    }

    async fn model_check(&self, session: &mut VerificationSession) -> Result<State, PipelineError> {
        let (Some(program), Some(property)) = (&session.compiled_program, &session.property_text) else {
            return Err(PipelineError::Fatal("model check without program and property".to_string()));
        };

        let work_dir = session.work_dir(&self.settings.work_dir);
        let result = self
            .collaborators
            .checker
            .verify(&program.render(), property, &work_dir)
            .await
            .map_err(|e| match e {
                CheckerError::Execution { output, .. } => PipelineError::ModelCheckerExecution(output),
                other if other.is_recoverable() => PipelineError::ModelCheckerExecution(other.to_string()),
                other => PipelineError::Fatal(other.to_string()),
            })?;

        session.verify_result = Some(result);
        Ok(State::NeedArbiter)
    }

    async fn arbitrate(&self, session: &mut VerificationSession) -> Result<State, PipelineError> {
        let Some(automaton) = &session.automaton else {
            return Err(PipelineError::Fatal("arbiter without automaton".to_string()));
        };

        let runs = {
            let mut rng = StdRng::from_entropy();
            sample_runs(
                automaton,
                &mut rng,
                self.settings.example_runs,
                self.settings.max_sample_steps,
            )
            .map_err(|e| PipelineError::PropertySyntax(format!("property has no usable accepting run: {}", e)))?
        };

        let judgment = self
            .collaborators
            .arbiter
            .judge(&session.request, &runs)
            .await
            .map_err(|e| PipelineError::Fatal(format!("arbiter failed: {}", e)))?;

        if judgment.approved {
            Ok(State::NeedTrailCheck)
        } else {
            Err(PipelineError::ArbiterRejection(judgment.rationale))
        }
    }

    fn check_trail(session: &mut VerificationSession) -> Result<State, PipelineError> {
        match session.verify_result.as_ref().and_then(|r| r.trail.as_ref()) {
            Some(trail) => Err(PipelineError::PropertyViolated(trail.clone())),
            None => Ok(State::Done),
        }
    }

    async fn write_artifact(&self, session: &VerificationSession) -> std::io::Result<PathBuf> {
        let mission = session.mission_text.as_deref().unwrap_or_default();
        tokio::fs::create_dir_all(&self.settings.artifact_dir).await?;
        let path = self
            .settings
            .artifact_dir
            .join(format!("mission-{}.xml", session.id));
        tokio::fs::write(&path, mission).await?;
        tracing::info!("Mission written to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::{parse_hoa, Automaton, TranslateError};
    use crate::checker::VerifyResult;
    use crate::mission::SchemaVerdict;
    use crate::mission::xml::tests::ORCHARD_MISSION;
    use crate::verification::Judgment;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    /// Hands out canned answers in order and remembers the prompts it saw.
    struct ScriptedGenerator {
        answers: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
        history_sizes: Mutex<Vec<usize>>,
    }

    impl ScriptedGenerator {
        fn new(answers: &[String]) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.iter().cloned().collect()),
                prompts: Mutex::new(Vec::new()),
                history_sizes: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str, conversation: &mut Conversation) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.history_sizes.lock().unwrap().push(conversation.messages().len());
            let answer = self
                .answers
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))?;
            conversation.push_turn(prompt, answer.clone());
            Ok(answer)
        }
    }

    /// Valid unless the document contains "INVALID".
    struct MarkerValidator;

    #[async_trait]
    impl SchemaValidator for MarkerValidator {
        async fn validate(&self, _schema: &Path, document: &str) -> anyhow::Result<SchemaVerdict> {
            if document.contains("INVALID") {
                Ok(SchemaVerdict::invalid("XML is invalid: element INVALID not expected"))
            } else {
                Ok(SchemaVerdict::valid())
            }
        }
    }

    /// Chain automaton with as many steps as the property has `->` arrows + 1,
    /// or a syntax error for properties containing "BROKEN".
    struct ChainTranslator;

    #[async_trait]
    impl AutomatonTranslator for ChainTranslator {
        async fn translate(&self, property: &str) -> Result<Automaton, TranslateError> {
            if property.contains("BROKEN") {
                return Err(TranslateError::Syntax("syntax error near BROKEN".to_string()));
            }
            let steps = property.matches("->").count() + 1;
            let mut text = format!("HOA: v1\nStates: {}\nStart: 0\nAP: 1 \"p\"\n--BODY--\n", steps + 1);
            for state in 0..steps {
                text.push_str(&format!("State: {}\n[0] {}\n", state, state + 1));
            }
            text.push_str(&format!("State: {} {{0}}\n[t] {}\n--END--\n", steps, steps));
            Ok(parse_hoa(&text).unwrap())
        }
    }

    /// Replays scripted checker results.
    struct ScriptedChecker {
        results: Mutex<VecDeque<Result<VerifyResult, CheckerError>>>,
        work_dirs: Mutex<Vec<PathBuf>>,
    }

    impl ScriptedChecker {
        fn new(results: Vec<Result<VerifyResult, CheckerError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                work_dirs: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ModelChecker for ScriptedChecker {
        async fn verify(&self, program: &str, _property: &str, work_dir: &Path) -> Result<VerifyResult, CheckerError> {
            assert!(program.contains("init {"));
            self.work_dirs.lock().unwrap().push(work_dir.to_path_buf());
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(VerifyResult::pass()))
        }
    }

    struct ScriptedArbiter(Mutex<VecDeque<bool>>);

    #[async_trait]
    impl Arbiter for ScriptedArbiter {
        async fn judge(&self, _request: &str, runs: &[crate::automaton::AcceptingRun]) -> anyhow::Result<Judgment> {
            assert!(runs.iter().all(|r| !r.is_empty()));
            let approved = self.0.lock().unwrap().pop_front().unwrap_or(true);
            Ok(Judgment {
                approved,
                rationale: if approved { "ok".into() } else { "runs skip T3".into() },
            })
        }
    }

    fn xml_answer(body: &str) -> String {
        format!("Here is the plan:\n```xml\n{}\n```\n", body)
    }

    /// Four steps, matching T1, the temp gate, T2 and T3.
    fn property_answer() -> String {
        "```ltl\nltl mission { T1 -> temp -> T2 -> T3 }\n```".to_string()
    }

    struct Harness {
        mission: Arc<ScriptedGenerator>,
        property: Arc<ScriptedGenerator>,
        checker: Arc<ScriptedChecker>,
        orchestrator: Orchestrator,
        _dir: tempfile::TempDir,
    }

    fn harness(
        max_retries: u32,
        verify: bool,
        missions: &[String],
        properties: &[String],
        checks: Vec<Result<VerifyResult, CheckerError>>,
        verdicts: &[bool],
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mission = ScriptedGenerator::new(missions);
        let property = ScriptedGenerator::new(properties);
        let checker = ScriptedChecker::new(checks);
        let collaborators = Collaborators {
            mission_generator: mission.clone(),
            property_generator: property.clone(),
            validator: Arc::new(MarkerValidator),
            translator: Arc::new(ChainTranslator),
            checker: checker.clone(),
            arbiter: Arc::new(ScriptedArbiter(Mutex::new(verdicts.iter().copied().collect()))),
        };
        let settings = OrchestratorSettings {
            max_retries,
            verify,
            schemas: vec![PathBuf::from("/schemas/wheeled_bot.xsd")],
            work_dir: dir.path().join("work"),
            artifact_dir: dir.path().join("missions"),
            ..OrchestratorSettings::default()
        };
        let orchestrator = Orchestrator::new(
            collaborators,
            ModelCompiler::new("typedef Task { mtype actionType };"),
            settings,
            Conversation::new(prompts::MISSION_FRAMING),
            Conversation::new(prompts::PROPERTY_FRAMING),
        );
        Harness {
            mission,
            property,
            checker,
            orchestrator,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_happy_path_writes_artifact() {
        let h = harness(3, true, &[xml_answer(ORCHARD_MISSION)], &[property_answer()], vec![], &[true]);
        let outcome = h.orchestrator.run("check the tree, go elsewhere if it is hot").await;

        let MissionOutcome::Verified { artifact, retries } = outcome else {
            panic!("expected a verified mission");
        };
        assert_eq!(retries, 0);
        assert!(artifact.file_name().unwrap().to_string_lossy().starts_with("mission-"));
        assert_eq!(std::fs::read_to_string(&artifact).unwrap().trim(), ORCHARD_MISSION.trim());

        // the property role is seeded with the compiled names before its first prompt
        assert_eq!(h.property.history_sizes.lock().unwrap()[0], 2);
        assert!(h.property.prompts()[0].contains("check the tree"));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_after_schema_failures() {
        let bad = xml_answer("<TaskTemplate>INVALID</TaskTemplate>");
        let h = harness(2, true, &[bad.clone(), bad.clone(), bad], &[], vec![], &[]);
        let outcome = h.orchestrator.run("inspect row 3").await;

        assert_eq!(
            outcome,
            MissionOutcome::Failed {
                diagnostic: "XML is invalid: element INVALID not expected".to_string(),
                retries: 2,
            }
        );
        let prompts = h.mission.prompts();
        assert_eq!(prompts.len(), 3);
        assert_eq!(prompts[0], "inspect row 3");
        assert!(prompts[1].contains("element INVALID not expected"));
    }

    #[tokio::test]
    async fn test_trail_routes_back_to_mission() {
        let h = harness(
            3,
            true,
            &[xml_answer(ORCHARD_MISSION), xml_answer(ORCHARD_MISSION)],
            &[property_answer(), property_answer()],
            vec![
                Ok(VerifyResult::violated("spin: trail ends after 7 steps")),
                Ok(VerifyResult::pass()),
            ],
            &[true, true],
        );
        let outcome = h.orchestrator.run("check the tree").await;

        assert!(matches!(outcome, MissionOutcome::Verified { retries: 1, .. }));
        let prompts = h.mission.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("trail ends after 7 steps"));

        // the second mission resets the property conversation and reseeds it
        let sizes = h.property.history_sizes.lock().unwrap().clone();
        assert_eq!(sizes, vec![2, 2]);

        // every check of the session shares one work dir
        let dirs = h.checker.work_dirs.lock().unwrap().clone();
        assert_eq!(dirs.len(), 2);
        assert_eq!(dirs[0], dirs[1]);
    }

    #[tokio::test]
    async fn test_property_failures_stay_on_property_side() {
        let drifting = "```ltl\nltl mission { T1 -> T3 }\n```".to_string();
        let broken = "```ltl\nltl mission { BROKEN }\n```".to_string();
        let h = harness(
            5,
            true,
            &[xml_answer(ORCHARD_MISSION)],
            &[drifting, broken, property_answer(), property_answer(), property_answer()],
            vec![
                Err(CheckerError::Execution {
                    status: 1,
                    output: "spin: line 40, Error: undeclared variable".to_string(),
                }),
                Ok(VerifyResult::pass()),
            ],
            &[false, true],
        );
        let outcome = h.orchestrator.run("check the tree").await;

        assert!(matches!(outcome, MissionOutcome::Verified { retries: 4, .. }));
        assert_eq!(h.mission.prompts().len(), 1);

        let prompts = h.property.prompts();
        assert_eq!(prompts.len(), 5);
        assert!(prompts[1].contains("2 fewer tasks"));
        assert!(prompts[2].contains("syntax error near BROKEN"));
        assert!(prompts[3].contains("undeclared variable"));
        assert!(prompts[4].contains("runs skip T3"));
    }

    #[tokio::test]
    async fn test_checker_timeout_retries_property_and_spawn_failure_is_fatal() {
        let h = harness(
            3,
            true,
            &[xml_answer(ORCHARD_MISSION)],
            &[property_answer(), property_answer()],
            vec![
                Err(CheckerError::Timeout(std::time::Duration::from_millis(500))),
                Err(CheckerError::Spawn {
                    binary: "spin".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                }),
            ],
            &[],
        );
        let outcome = h.orchestrator.run("check the tree").await;

        let MissionOutcome::Failed { diagnostic, retries } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(retries, 1);
        assert!(diagnostic.contains("failed to run spin"));
        let prompts = h.property.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("timed out after 500ms"));
    }

    #[tokio::test]
    async fn test_structural_error_is_not_retried() {
        let dangling = ORCHARD_MISSION.replace("<TaskID>T3</TaskID>\n      </Fallback>", "</Fallback>");
        let dangling = dangling.replace(
            "<TaskID>T2</TaskID>\n        </ConditionalActions>",
            "</ConditionalActions>",
        );
        let h = harness(5, true, &[xml_answer(&dangling)], &[], vec![], &[]);
        let outcome = h.orchestrator.run("check the tree").await;

        let MissionOutcome::Failed { diagnostic, retries } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(retries, 0);
        assert!(diagnostic.starts_with("mission cannot be compiled"));
    }

    #[tokio::test]
    async fn test_verification_disabled_stops_after_schema() {
        let h = harness(1, false, &[xml_answer(ORCHARD_MISSION)], &[], vec![], &[]);
        let outcome = h.orchestrator.run("check the tree").await;

        assert!(matches!(outcome, MissionOutcome::Verified { retries: 0, .. }));
        assert!(h.property.prompts().is_empty());
        assert!(h.checker.work_dirs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_fence_is_generation_failure() {
        let h = harness(
            1,
            false,
            &["I cannot plan this mission.".to_string(), xml_answer(ORCHARD_MISSION)],
            &[],
            vec![],
            &[],
        );
        let outcome = h.orchestrator.run("fly to the moon").await;
        assert!(matches!(outcome, MissionOutcome::Verified { retries: 1, .. }));
        assert!(h.mission.prompts()[1].contains("```xml"));
    }
}
