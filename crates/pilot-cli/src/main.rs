//! Pilot CLI - oracle-driven browser agent
//!
//! Usage:
//!   pilot init [PATH]              Write default `.pilot/config.toml`
//!   pilot run <TASK>               Run the agent loop on a task
//!   pilot act <ACTION> -p k=v ...  Execute a single action
//!   pilot snapshot [--url URL]     Print the current browser snapshot

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pilot_agent::OracleClient;
use pilot_browser::{BrowserDriver, BrowserSession, GuardedDriver, SnapshotProducer};
use pilot_core::{CallRepetitionGuard, Params, PilotConfig, Task};
use pilot_orchestrator::{Executor, FlowController};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pilot")]
#[command(author, version, about = "Oracle-driven browser automation agent")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that needs a browser
#[derive(Args)]
struct SessionArgs {
    /// Config file (defaults to .pilot/config.toml when present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Attach to a browser started with --remote-debugging-port
    #[arg(long, value_name = "PORT")]
    connect: Option<u16>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Run the agent on a task until it is done or a limit is hit
    Run {
        /// What the agent should accomplish
        task: String,

        /// Maximum iterations (overrides the config file)
        #[arg(short = 'n', long)]
        max_iterations: Option<usize>,

        /// Directory for activity.md
        #[arg(long, value_name = "DIR", default_value = ".pilot")]
        activity_dir: PathBuf,

        /// Print the run outcome as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Execute one action and print its result as JSON
    Act {
        /// Action name, e.g. go_to_url
        action: String,

        /// Action parameter as key=value (repeatable; values are parsed as YAML scalars)
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Print the current environment snapshot as YAML
    Snapshot {
        /// Navigate here first
        #[arg(long)]
        url: Option<String>,

        #[command(flatten)]
        session: SessionArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init { path } => cmd_init(&path),
        Commands::Run {
            task,
            max_iterations,
            activity_dir,
            json,
            session,
        } => cmd_run(task, max_iterations, activity_dir, json, &session).await,
        Commands::Act {
            action,
            params,
            session,
        } => cmd_act(&action, &params, &session).await,
        Commands::Snapshot { url, session } => cmd_snapshot(url, &session).await,
    }
}

fn cmd_init(path: &Path) -> Result<()> {
    info!("Initializing Pilot in {:?}", path);
    PilotConfig::write_default(path).context("Failed to write default config")?;

    println!("Initialized Pilot in {:?}", path);
    println!("Created:");
    println!("  .pilot/config.toml");
    println!();
    println!("Set LLM_API_KEY (and optionally LLM_BASE_URL, LLM_MODEL) before `pilot run`.");
    Ok(())
}

fn load_config(session: &SessionArgs) -> Result<PilotConfig> {
    let mut config = match &session.config {
        Some(path) => PilotConfig::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => PilotConfig::load_or_default(Path::new(".")).context("Failed to load config")?,
    };
    if let Some(port) = session.connect {
        config.browser.debug_port = Some(port);
    }
    if session.headed {
        config.browser.headless = false;
    }
    Ok(config)
}

async fn open_driver(config: &PilotConfig) -> Result<Arc<GuardedDriver<BrowserSession>>> {
    let session = BrowserSession::from_settings(&config.browser)
        .await
        .context("Failed to start browser session")?;
    Ok(Arc::new(GuardedDriver::new(
        Arc::new(session),
        CallRepetitionGuard::from_settings(&config.guard),
    )))
}

async fn cmd_run(
    task: String,
    max_iterations: Option<usize>,
    activity_dir: PathBuf,
    json: bool,
    session: &SessionArgs,
) -> Result<()> {
    let mut config = load_config(session)?;
    if let Some(n) = max_iterations {
        config.run.max_iterations = n;
    }

    let oracle = Arc::new(
        OracleClient::from_settings(&config.oracle).context("Failed to configure oracle")?,
    );
    let driver = open_driver(&config).await?;

    let controller =
        FlowController::new(oracle, driver, &config).with_activity_logging(activity_dir.clone());
    let outcome = controller
        .run(Task::new(task))
        .await
        .context("Run aborted")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("{}", outcome.final_message);
    println!();
    println!("{}", outcome.summary);
    println!();
    println!(
        "Run {} ({} iterations, {} operations). Activity log: {:?}",
        outcome.run_id,
        outcome.iterations,
        outcome.history.len(),
        activity_dir.join("activity.md")
    );
    Ok(())
}

async fn cmd_act(action: &str, raw_params: &[String], session: &SessionArgs) -> Result<()> {
    let params = parse_params(raw_params)?;
    let config = load_config(session)?;
    let driver = open_driver(&config).await?;

    let result = Executor::new(driver).execute_raw(action, params).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_snapshot(url: Option<String>, session: &SessionArgs) -> Result<()> {
    let config = load_config(session)?;
    let driver = open_driver(&config).await?;

    if let Some(url) = url {
        driver
            .go_to_url(&url)
            .await
            .with_context(|| format!("Failed to open {}", url))?;
    }

    let producer = SnapshotProducer::new(
        driver,
        Duration::from_millis(config.browser.highlight_settle_ms),
    );
    let snapshot = producer.snapshot().await.context("Failed to capture snapshot")?;
    print!("{}", serde_yaml::to_string(&snapshot)?);
    Ok(())
}

/// Parse `key=value` pairs; values are read as YAML so numbers and lists keep their type
fn parse_params(raw: &[String]) -> Result<Params> {
    let mut params = Params::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid parameter {:?}: expected key=value", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid parameter {:?}: empty key", pair);
        }
        let value = serde_yaml::from_str::<Value>(value)
            .ok()
            .filter(|v| !v.is_object())
            .unwrap_or_else(|| Value::String(value.to_string()));
        params.insert(key.to_string(), value);
    }
    Ok(params)
}
