//! CLI entry point (§6 Control surface): `run` starts the Engine and
//! blocks until a shutdown signal; `once [agent]` executes a single
//! iteration outside the periodic loop and prints its report; `status`
//! prints the live per-agent metrics snapshot. Grounded on the
//! teacher's `src/main.rs` subcommand dispatch, adapted from
//! `clap::Command` builders to `clap::Parser` derive since this
//! binary's surface is small and flat.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use pipeline_engine::agents::conflict::ConflictAgent;
use pipeline_engine::agents::extraction::ExtractionAgent;
use pipeline_engine::agents::knowledge_base::KnowledgeBaseAgent;
use pipeline_engine::agents::prompt_engineering::PromptEngineeringAgent;
use pipeline_engine::agents::research::ResearchAgent;
use pipeline_engine::agents::validation::ValidationAgent;
use pipeline_engine::agents::Agent;
use pipeline_engine::alerting::webhook::WebhookAlertService;
use pipeline_engine::alerting::{AlertService, NullAlertService};
use pipeline_engine::config::AgentSchedule;
use pipeline_engine::llm::production::ProductionLlm;
use pipeline_engine::llm::test_double::StubLlm;
use pipeline_engine::llm::LlmCapability;
use pipeline_engine::llm::{chat::ChatLlm, embedding::EmbeddingLlm};
use pipeline_engine::resilience::{BackoffStrategy, DeadLetterQueue, Jitter, ResilienceHandles, RetryBudget, RetryPolicy};
use pipeline_engine::sources::{crossref::CrossrefSource, feeds, perplexity::PerplexitySource, pubmed::PubmedSource, scraper};
use pipeline_engine::store::mock::InMemoryStore;
use pipeline_engine::store::Store;
use pipeline_engine::{Engine, PipelineConfig};

#[derive(Parser)]
#[command(name = "pipeline-cli", version, about = "Evidence-curation pipeline for an exercise-science coaching assistant")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Engine and run every enabled agent on its schedule until shutdown.
    Run,
    /// Execute exactly one iteration of the named agent (or every enabled agent) and print its report.
    Once {
        /// Agent name: research, extraction, validation, knowledge_base, conflict, prompt_engineering.
        agent: Option<String>,
    },
    /// Print the live per-agent metrics snapshot.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PipelineConfig::from_env()?;

    let filter = tracing_subscriber::EnvFilter::try_new(config.log_level.to_lowercase())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let cancellation = tokio_util::sync::CancellationToken::new();
    let resilience = build_resilience(&config, cancellation.clone());
    let llm = build_llm(&config, resilience.clone());
    let alert_service = build_alert_service(&config);

    let engine = build_engine(&config, store, llm, alert_service, resilience, cancellation);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            engine.start()?;
            tracing::info!("pipeline engine started, awaiting shutdown signal");
            let reason = wait_for_shutdown_signal().await;
            engine.stop(Some(reason)).await;
        }
        Commands::Once { agent } => {
            let results = engine.run_once(agent.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Status => {
            let metrics = engine.metrics();
            let snapshot: std::collections::HashMap<String, _> =
                metrics.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}

/// Blocks until either Ctrl-C or SIGTERM arrives, returning a short
/// reason string for the shutdown alert. SIGTERM is what container
/// orchestrators send on a graceful stop, so both must be honored for
/// `engine.stop()`'s shutdown budget to actually get exercised in
/// production rather than only under an interactive terminal.
async fn wait_for_shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "received Ctrl-C",
            _ = sigterm.recv() => "received SIGTERM",
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "received Ctrl-C"
    }
}

/// Builds the process-wide retry policy, budget, and dead-letter queue
/// (§5) shared by every source adapter and LLM transport, so one budget
/// governs retries across the whole pipeline rather than per call site.
/// `cancellation` is the engine's own shutdown token, cloned in so every
/// adapter's in-flight HTTP call is interrupted the moment the engine
/// stops rather than abandoned to finish on its own (§9).
fn build_resilience(config: &PipelineConfig, cancellation: tokio_util::sync::CancellationToken) -> ResilienceHandles {
    let retry_policy = RetryPolicy {
        max_attempts: config.retry.max_attempts,
        strategy: BackoffStrategy::Exponential { base: config.retry.backoff_base },
        base_delay: std::time::Duration::from_millis(500),
        max_delay: config.retry.max_delay,
        jitter: Jitter::Full,
    };
    ResilienceHandles::new(retry_policy, Arc::new(RetryBudget::new(100, 10.0)), Arc::new(DeadLetterQueue::new(256)), cancellation)
}

/// Chooses the production chat/embedding transport when an API key is
/// configured, falling back to the deterministic [`StubLlm`] test
/// double otherwise so `run`/`once`/`status` work out of the box
/// against a freshly cloned repo with no credentials set.
fn build_llm(config: &PipelineConfig, resilience: ResilienceHandles) -> Arc<dyn LlmCapability> {
    if config.llm.api_key.is_empty() {
        tracing::warn!("LLM_API_KEY not set, using deterministic stub LLM capability");
        Arc::new(StubLlm::new(config.llm.embedding_dimension))
    } else {
        let chat = ChatLlm::new(
            config.llm.base_url.clone(),
            config.llm.api_key.clone(),
            config.llm.chat_model.clone(),
            config.circuit_breaker.clone(),
            resilience.clone(),
        );
        let embedding = EmbeddingLlm::new(
            config.llm.base_url.clone(),
            config.llm.api_key.clone(),
            config.llm.embedding_model.clone(),
            config.llm.embedding_dimension,
            config.circuit_breaker.clone(),
            resilience,
        );
        Arc::new(ProductionLlm::new(chat, embedding))
    }
}

fn build_alert_service(config: &PipelineConfig) -> Arc<dyn AlertService> {
    if config.alerts.webhook_urls.is_empty() {
        Arc::new(NullAlertService)
    } else {
        Arc::new(WebhookAlertService::new(
            config.alerts.webhook_urls.clone(),
            config.alerts.min_severity,
            config.alerts.dedup_window,
        ))
    }
}

fn build_engine(
    config: &PipelineConfig,
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmCapability>,
    alert_service: Arc<dyn AlertService>,
    resilience: ResilienceHandles,
    cancellation: tokio_util::sync::CancellationToken,
) -> Engine {
    let pubmed = PubmedSource::new(None, config.rate_limits.pubmed, config.circuit_breaker.clone(), resilience.clone());
    let crossref = CrossrefSource::new(
        Some(config.contact_email.as_str()),
        config.rate_limits.crossref,
        config.circuit_breaker.clone(),
        resilience.clone(),
    );
    let feeds_source = feeds::FeedsSource::new(
        feeds::default_feeds(),
        config.rate_limits.rss,
        config.circuit_breaker.clone(),
        resilience.clone(),
    );
    let scraper_source = scraper::ScraperSource::new(
        if config.research.enable_web_scraping { scraper::default_sites() } else { Vec::new() },
        config.rate_limits.rss,
        config.circuit_breaker.clone(),
        resilience.clone(),
    );
    let perplexity = if config.research.enable_perplexity {
        config.perplexity_api_key.clone().map(|key| {
            PerplexitySource::new(key, config.rate_limits.llm, config.circuit_breaker.clone(), resilience.clone())
        })
    } else {
        None
    };

    let research = Arc::new(ResearchAgent::new(
        config.research.clone(),
        store.clone(),
        pubmed,
        crossref,
        feeds_source,
        scraper_source,
        perplexity,
    ));
    let extraction = Arc::new(ExtractionAgent::new(config.extraction.clone(), store.clone(), llm.clone()));
    let validation = Arc::new(ValidationAgent::new(config.validation.clone(), store.clone(), llm.clone()));
    let knowledge_base = Arc::new(KnowledgeBaseAgent::new(config.knowledge_base.clone(), store.clone(), llm.clone()));
    let conflict = Arc::new(ConflictAgent::new(config.conflict.clone(), store.clone(), llm.clone()));
    let prompt_engineering = Arc::new(PromptEngineeringAgent::new(config.prompt_engineering.clone(), store.clone()));

    let entries: Vec<(Arc<dyn Agent>, AgentSchedule)> = vec![
        (research, config.research.schedule.clone()),
        (extraction, config.extraction.clone()),
        (validation, config.validation.schedule.clone()),
        (knowledge_base, config.knowledge_base.clone()),
        (conflict, config.conflict.schedule.clone()),
        (prompt_engineering, config.prompt_engineering.clone()),
    ];

    Engine::new(
        entries,
        alert_service,
        config.health_check_interval,
        config.alerts.error_rate_threshold,
        config.shutdown_timeout,
        cancellation,
    )
}
