use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use pipeflow_notify::{Notifier, NotifyRouter};
use pipeflow_runner::{DailyLog, JobRunner};
use pipeflow_scheduler::{Dispatcher, SchedulerEngine};
use pipeflow_store::{Schedule, ScheduleStore};

#[derive(Parser)]
#[command(name = "pipeflowd", about = "Workflow schedule daemon", version)]
struct Cli {
    /// Path to pipeflow.toml (defaults to ./pipeflow.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler loop until SIGINT/SIGTERM (the default).
    Serve,
    /// Execute one schedule immediately, bypassing its timing rules.
    Run {
        /// Schedule ID.
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pipeflowd=info,pipeflow_scheduler=info,pipeflow_runner=info,pipeflow_store=info"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: explicit flag > PIPEFLOW_CONFIG env > ./pipeflow.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("PIPEFLOW_CONFIG").ok());
    let config = pipeflow_core::PipeflowConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        pipeflow_core::PipeflowConfig::default()
    });

    // fail fast on anything the loop depends on
    config.validate()?;
    ensure_parent_dir(&config.database.path);
    info!(path = %config.database.path, "opening schedule store");
    let store = ScheduleStore::open(&config.database.path)?;
    let log = Arc::new(DailyLog::new(&config.logs.dir)?);
    info!(
        kitchen = %config.tools.kitchen,
        pan = %config.tools.pan,
        hop_run = %config.tools.hop_run,
        needs_shell = config.tools.needs_shell,
        "tool paths"
    );

    let notifier: Arc<dyn Notifier> = Arc::new(NotifyRouter::from_config(&config.notify));
    let runner = Arc::new(JobRunner::new(
        store.clone(),
        Arc::clone(&notifier),
        Arc::clone(&log),
        config.tools.clone(),
    ));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Run { id } => {
            let result = runner.run_by_id(id).await?;
            if result.outcome.is_success() {
                info!(schedule_id = id, "manual run succeeded");
                Ok(())
            } else {
                anyhow::bail!(
                    "schedule {id} {}: exit code {:?}",
                    result.outcome,
                    result.exit_code
                );
            }
        }
        Command::Serve => serve(store, runner, config).await,
    }
}

async fn serve(
    store: ScheduleStore,
    runner: Arc<JobRunner>,
    config: pipeflow_core::PipeflowConfig,
) -> anyhow::Result<()> {
    let grace_secs = config.scheduler.shutdown_grace_secs;
    let engine = Arc::new(SchedulerEngine::new(
        store,
        Arc::new(RunnerDispatcher { runner }),
        config.scheduler,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(shutdown_rx).await })
    };

    shutdown_signal().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    // the engine drains in-flight jobs itself; allow it the grace
    // period plus a moment for the loop to notice the signal
    match tokio::time::timeout(Duration::from_secs(grace_secs + 2), engine_task).await {
        Ok(_) => info!("scheduler stopped"),
        Err(_) => warn!("scheduler did not stop within the grace period"),
    }
    Ok(())
}

/// Bridges the engine to the job runner: each due schedule becomes one
/// detached task whose handle the engine tracks.
struct RunnerDispatcher {
    runner: Arc<JobRunner>,
}

impl Dispatcher for RunnerDispatcher {
    fn dispatch(&self, schedule: Schedule) -> JoinHandle<()> {
        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            runner.run(&schedule).await;
        })
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> anyhow::Result<()> {
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
