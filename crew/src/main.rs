//! Event planner CLI
//!
//! Runs the event planning crew once and prints the venue record and the
//! marketing report.
//!
//! Usage:
//!   event-planner
//!   event-planner --non-interactive --output-dir out
//!   event-planner --inputs berlin.toml -vv
//!   event-planner roles

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crew::config::{load_dotenv, Credentials, Settings};
use crew::events::{event_channel, EventReceiver, PipelineEvent};
use crew::{
    event_crew, render_report, AgentExecutor, AutoApproveConfirmation, ConfirmationGate,
    InteractiveConfirmation, PipelineRunner, RunnerConfig, ToolRegistry,
};

#[derive(Parser)]
#[command(name = "event-planner")]
#[command(about = "Plan an event with a crew of venue, logistics and marketing agents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Model to use (overrides config and OPENAI_MODEL_NAME)
    #[arg(short = 'm', long, global = true)]
    model: Option<String>,

    /// Directory the output files are written to
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// TOML file with event inputs (missing keys keep their defaults)
    #[arg(long)]
    inputs: Option<PathBuf>,

    /// Maximum number of concurrent tasks in flight
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Approve every confirmation without prompting
    #[arg(long)]
    non_interactive: bool,

    /// Increase verbosity (-v info, -vv debug, -vvv trace). Default is warn.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List the crew's roles and their capabilities
    Roles,
}

/// Initialize tracing with the given verbosity level
///
/// - 0: warn (default)
/// - 1: info (-v)
/// - 2: debug (-vv)
/// - 3+: trace (-vvv)
///
/// Logs go to stderr; set `LOG_FORMAT=json` for JSON lines.
fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    // Allow RUST_LOG to override if set
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if use_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so its values are visible to everything below
    let dotenv_path = load_dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(path) = dotenv_path {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    match cli.command {
        Some(Commands::Roles) => list_roles(),
        None => run_planner(cli).await,
    }
}

fn list_roles() -> Result<()> {
    let roles = event_crew::roles()?;

    println!("Crew Roles:\n");
    for role in roles.iter() {
        let capabilities: Vec<String> = role.capabilities().iter().map(ToString::to_string).collect();
        println!("  {}", role.id());
        println!("    Goal: {}", role.objective());
        println!("    Capabilities: {}", capabilities.join(", "));
    }
    Ok(())
}

async fn run_planner(cli: Cli) -> Result<()> {
    let mut settings = Settings::load()?;
    if let Some(model) = cli.model {
        settings.llm.model = model;
    }
    if let Some(dir) = cli.output_dir {
        settings.pipeline.output_dir = dir;
    }
    if let Some(max) = cli.max_concurrency {
        settings.pipeline.max_concurrency = max;
    }
    settings.validate()?;

    // Fail before any task runs
    let credentials = Credentials::from_env()?;

    let inputs = match &cli.inputs {
        Some(path) => event_crew::load_inputs(path)?,
        None => event_crew::EventDetails::default().into_inputs(),
    };
    let pipeline = event_crew::pipeline()?;

    let tools = ToolRegistry::web(&settings, &credentials)?;
    let executor = AgentExecutor::new(&settings.llm, credentials.openai_api_key.clone(), tools)?;
    tracing::info!(
        model = executor.model(),
        base_url = %settings.llm.base_url,
        "Using language model"
    );

    let gate: Arc<dyn ConfirmationGate> = if cli.non_interactive {
        Arc::new(AutoApproveConfirmation)
    } else {
        Arc::new(InteractiveConfirmation::new()?)
    };

    let config = RunnerConfig::from_settings(&settings.pipeline);
    let (events_tx, events_rx) = event_channel();
    let progress = tokio::spawn(print_progress(events_rx));

    println!("Starting Event Planning Automation...");

    let runner = PipelineRunner::new(Arc::new(executor), gate, config).with_event_sender(events_tx);
    let output_dir = runner.config().output_dir.clone();
    let outcome = runner.run(&pipeline, &inputs).await;

    // Closing the sender ends the progress printer
    drop(runner);
    let _ = progress.await;

    let report = outcome?;
    println!("\nEvent planning completed!");

    if cli.verbose >= 1 {
        for task in &report.tasks {
            eprintln!(
                "  task {} ({}): {}ms, {} revision(s)",
                task.index + 1,
                task.role,
                task.duration().as_millis(),
                task.revisions
            );
        }
        eprintln!("  total: {}ms", report.duration.as_millis());
    }

    let sections = render_report(&output_dir, &event_crew::artifacts()).await?;
    print!("{}", sections);

    Ok(())
}

/// Print one progress line per event to stderr
async fn print_progress(mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        match event {
            PipelineEvent::TaskDispatched { task_index, role, mode } => {
                eprintln!("[task {}] {} started ({:?})", task_index + 1, role, mode);
            }
            PipelineEvent::AwaitingConfirmation { task_index, .. } => {
                eprintln!("[task {}] waiting for confirmation", task_index + 1);
            }
            PipelineEvent::TaskRevised { task_index, revision, .. } => {
                eprintln!("[task {}] revising (round {})", task_index + 1, revision);
            }
            PipelineEvent::ArtifactWritten { task_index, path } => {
                eprintln!("[task {}] wrote {}", task_index + 1, path.display());
            }
            PipelineEvent::TaskCompleted { task_index, role, duration } => {
                eprintln!("[task {}] {} finished in {}ms", task_index + 1, role, duration.as_millis());
            }
            PipelineEvent::TaskFailed { task_index, error } => {
                eprintln!("[task {}] failed: {}", task_index + 1, error);
            }
            PipelineEvent::PipelineCompleted { .. } => {}
        }
    }
}
