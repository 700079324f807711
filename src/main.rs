//! mission-planner - interactive entry point
//!
//! Reads mission requests from stdin and prints the path of each accepted mission.
//!
//! Usage: `mission-planner [config.yaml]` (default `./config/localhost.yaml`)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mission_planner::automaton::Ltl2TgbaTranslator;
use mission_planner::checker::SpinModelChecker;
use mission_planner::config::Config;
use mission_planner::llm::{ChatCompletionsClient, ChatOptions, Conversation, LlmClient, LlmGenerator};
use mission_planner::mission::XmllintValidator;
use mission_planner::promela::ModelCompiler;
use mission_planner::verification::prompts;
use mission_planner::verification::{
    Arbiter, Collaborators, ConsoleArbiter, LineSource, LlmArbiter, MissionOutcome, Orchestrator,
    OrchestratorSettings, Stdin,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "./config/localhost.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_directive().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Loaded configuration: mission={} property={} verification={}",
        config.models.mission, config.models.property, config.ltl
    );
    if !config.ltl {
        info!("Formal verification is disabled; missions are accepted once they validate");
    }

    let orchestrator = build_orchestrator(&config)?;

    let input = Stdin;
    loop {
        let Some(request) = input
            .read_line("Enter the specifications for your mission plan: ")
            .await?
        else {
            break;
        };
        let request = request.trim();
        if request.is_empty() {
            continue;
        }

        match orchestrator.run(request).await {
            MissionOutcome::Verified { artifact, retries } => {
                println!("Mission plan written to {} ({} retries)", artifact.display(), retries);
            }
            MissionOutcome::Failed { diagnostic, retries } => {
                println!("No mission plan after {} retries: {}", retries, diagnostic);
            }
        }
    }

    Ok(())
}

fn build_orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let mut mission_framing = Conversation::new(prompts::MISSION_FRAMING);
    for schema in &config.schema {
        mission_framing =
            mission_framing.with_context(prompts::schema_context(&Config::read_file(schema)?));
    }
    for file in &config.context_files {
        mission_framing = mission_framing.with_context(prompts::context_file(&Config::read_file(file)?));
    }

    let mut property_framing = Conversation::new(prompts::PROPERTY_FRAMING);
    let mut preamble = String::new();
    if config.ltl {
        if let Some(template) = &config.promela_template {
            preamble = Config::read_file(template)?;
            property_framing = property_framing.with_context(prompts::promela_context(&preamble));
        }
    }

    let client: Arc<dyn LlmClient> = Arc::new(ChatCompletionsClient::new(
        &config.base_url,
        config.api_key.clone(),
    ));
    let options = ChatOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
    };
    let generator = |model: &str| Arc::new(LlmGenerator::new(client.clone(), model, options.clone()));

    let mut translator = Ltl2TgbaTranslator::new(&config.ltl2tgba_path);
    if let Some(initial) = &config.initial_condition {
        translator = translator.with_initial(initial);
    }

    let mut checker = SpinModelChecker::new(
        config
            .spin_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("spin")),
    );
    if let Some(dir) = &config.checker.search_dir {
        checker = checker.with_search_dir(dir);
    }
    if let Some(secs) = config.checker.timeout_secs {
        checker = checker.with_timeout(Duration::from_secs(secs));
    }

    let arbiter: Arc<dyn Arbiter> = if config.human_review {
        Arc::new(ConsoleArbiter::stdin())
    } else {
        Arc::new(LlmArbiter::new(generator(&config.models.arbiter)))
    };

    let collaborators = Collaborators {
        mission_generator: generator(&config.models.mission),
        property_generator: generator(&config.models.property),
        validator: Arc::new(XmllintValidator::new(&config.xmllint_path)),
        translator: Arc::new(translator),
        checker: Arc::new(checker),
        arbiter,
    };

    let settings = OrchestratorSettings {
        max_retries: config.max_retries,
        verify: config.ltl,
        example_runs: config.example_runs,
        schemas: config.schema.clone(),
        work_dir: config.work_dir.clone(),
        artifact_dir: config.log_directory.clone(),
        ..OrchestratorSettings::default()
    };

    Ok(Orchestrator::new(
        collaborators,
        ModelCompiler::new(preamble),
        settings,
        mission_framing,
        property_framing,
    ))
}
