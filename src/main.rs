use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use appointflow_agent::{
    build_graph, GraphExecutor, ReviewDecision, ReviewMode, Reviewer, RunCoordinator, RunLogger,
};
use appointflow_core::config::AppConfig;
use appointflow_core::error::{AppointflowError, Result as EngineResult};
use appointflow_core::event::EventBus;
use appointflow_core::redact::{mask_pii, MASK};
use appointflow_core::types::{RunContext, MODEL_PROVIDER_KEY};
use appointflow_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "appointflow", version, about = "Appointment request triage with human review")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "appointflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Triage one request in the terminal, reviewing the draft inline
    Run {
        /// The request text (prompted for when omitted)
        #[arg(trailing_var_arg = true)]
        input: Vec<String>,
    },
    /// Start the HTTP gateway
    Serve,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Asks the operator at the terminal to approve or rewrite a draft.
struct TerminalReviewer;

impl Reviewer for TerminalReviewer {
    fn review(&self, _ctx: &RunContext, draft: &str) -> EngineResult<ReviewDecision> {
        println!("\nDraft response:\n{draft}\n");
        let choice = dialoguer::Select::new()
            .with_prompt("Review the draft")
            .items(&["Approve", "Edit"])
            .default(0)
            .interact()
            .map_err(|e| AppointflowError::Review(e.to_string()))?;

        if choice == 0 {
            return Ok(ReviewDecision::Approve);
        }

        let edited: String = dialoguer::Input::new()
            .with_prompt("Edited response (empty keeps the draft)")
            .allow_empty(true)
            .interact_text()
            .map_err(|e| AppointflowError::Review(e.to_string()))?;
        Ok(ReviewDecision::Edit(edited))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("appointflow=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "appointflow", &mut std::io::stdout());
        return Ok(());
    }

    let config = AppConfig::discover(&cli.config)?;
    let model_provider = std::env::var("MODEL_PROVIDER").unwrap_or_else(|_| "rules".to_string());

    match cli.command {
        Some(Commands::Config) => {
            let mut shown = config.clone();
            if shown.gateway.token.is_some() {
                shown.gateway.token = Some(MASK.to_string());
            }
            println!("{}", toml::to_string_pretty(&shown)?);
        }
        Some(Commands::Serve) => serve(config, model_provider).await?,
        Some(Commands::Run { input }) => run_once(&config, &model_provider, input.join(" ")).await?,
        None => run_once(&config, &model_provider, String::new()).await?,
        Some(Commands::Completions { .. }) => unreachable!("handled before config load"),
    }

    Ok(())
}

/// Start the JSONL run logger when `[log] enabled = true`.
fn spawn_logger(
    config: &AppConfig,
    event_bus: &Arc<EventBus>,
    cancel: &CancellationToken,
) -> Option<JoinHandle<()>> {
    if !config.log.enabled {
        return None;
    }
    let logger = RunLogger::new(config.log_dir(), config.log.level);
    info!(level = config.log.level, path = %logger.current_path().display(), "Run logging enabled");
    Some(tokio::spawn(logger.run(event_bus.clone(), cancel.clone())))
}

async fn run_once(config: &AppConfig, model_provider: &str, input: String) -> anyhow::Result<()> {
    let input = if input.trim().is_empty() {
        tokio::task::spawn_blocking(|| {
            dialoguer::Input::<String>::new()
                .with_prompt("How can we help with your appointment?")
                .interact_text()
        })
        .await??
    } else {
        input
    };

    let event_bus = Arc::new(EventBus::default());
    let cancel = CancellationToken::new();
    let logger = spawn_logger(config, &event_bus, &cancel);

    let graph = build_graph(ReviewMode::Blocking(Arc::new(TerminalReviewer)), &config.engine)?;
    let executor = GraphExecutor::new(Arc::new(graph)).with_events(event_bus.clone());

    let mut ctx = RunContext::new(input);
    ctx.set_meta_str(MODEL_PROVIDER_KEY, model_provider);

    let ctx = tokio::task::spawn_blocking(move || executor.run(ctx)).await?;

    cancel.cancel();
    if let Some(handle) = logger {
        handle.await.ok();
    }

    print_summary(&ctx);
    Ok(())
}

fn print_summary(ctx: &RunContext) {
    let status = ctx
        .terminal_status
        .map(|s| s.as_str())
        .unwrap_or("NONE");
    let response = ctx.final_response.as_deref().map(mask_pii).unwrap_or_default();

    println!("\nExecution summary");
    println!("=================");
    println!("run_id:          {}", ctx.run_id());
    println!("terminal_status: {status}");
    println!("route_trace:     {}", ctx.route_trace().join(" -> "));
    println!("final_response:  {response}");
}

async fn serve(config: AppConfig, model_provider: String) -> anyhow::Result<()> {
    let event_bus = Arc::new(EventBus::default());
    let cancel = CancellationToken::new();
    let logger = spawn_logger(&config, &event_bus, &cancel);

    let graph = build_graph(ReviewMode::Pause, &config.engine)?;
    let executor = Arc::new(GraphExecutor::new(Arc::new(graph)).with_events(event_bus));
    let coordinator = Arc::new(RunCoordinator::in_memory());

    info!(bind = %config.gateway.bind, provider = %model_provider, "Starting gateway");
    let server = GatewayServer::new(config, executor, coordinator, model_provider);

    // Graceful shutdown on Ctrl-C
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down gateway...");
        cancel_clone.cancel();
    });

    server.run(cancel).await?;
    if let Some(handle) = logger {
        handle.await.ok();
    }
    Ok(())
}
