//! Autorun: agent rotation daemon.
//!
//! Usage:
//!   autorun init               Write a default autorun.toml
//!   autorun run                Run the scheduler until Ctrl+C
//!   autorun status             Show rotation set and eligibility
//!   autorun enable | disable   Toggle auto-run
//!   autorun include <agent>    Append an agent to the rotation
//!   autorun exclude <agent>    Remove an agent from the rotation
//!   autorun log [--limit N]    Show recent audit lines

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use autorun::config::{self, AutoRunConfig};
use autorun::eligibility::EligibilityView;
use autorun::lifecycle::Collaborators;
use autorun::middleware::MiddlewareClient;
use autorun::notify::{AuditLog, DbNotifier};
use autorun::scheduler::{AutoRunDaemon, Commands};
use autorun::signals::HttpSignalSource;
use autorun::state::{AutoRunStore, Database, SqliteStore};
use autorun::types::{AgentType, Eligibility};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "autorun")]
#[command(version = "0.1.0")]
#[command(about = "Rotates staked agents so exactly one runs at a time")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to autorun home directory (defaults to ~/.autorun).
    #[arg(long)]
    home: Option<String>,

    /// Log level (debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default autorun.toml into the home directory.
    Init,

    /// Run the rotation scheduler until Ctrl+C.
    Run,

    /// Show enabled state, rotation order and eligibility.
    Status,

    /// Turn auto-run on.
    Enable,

    /// Turn auto-run off (membership is kept).
    Disable,

    /// Append an agent to the end of the rotation.
    Include { agent: String },

    /// Remove an agent from the rotation.
    Exclude { agent: String },

    /// Show recent audit log lines.
    Log {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let home_dir = cli
        .home
        .map(|h| PathBuf::from(shellexpand::tilde(&h).into_owned()))
        .unwrap_or_else(config::default_home_dir);

    if let Command::Init = cli.command {
        return cmd_init(&home_dir);
    }
    let runtime = bootstrap(&home_dir)?;

    match cli.command {
        Command::Init => Ok(()),
        Command::Run => cmd_run(runtime).await,
        Command::Status => cmd_status(runtime).await,
        Command::Enable => runtime.commands().set_enabled(true).await,
        Command::Disable => runtime.commands().set_enabled(false).await,
        Command::Include { agent } => cmd_include(runtime, AgentType::new(agent)).await,
        Command::Exclude { agent } => cmd_exclude(runtime, AgentType::new(agent)).await,
        Command::Log { limit } => cmd_log(runtime, limit).await,
    }
}

// ---------------------------------------------------------------------------
// Runtime wiring
// ---------------------------------------------------------------------------

struct Runtime {
    config: AutoRunConfig,
    db: Arc<Mutex<Database>>,
    store: AutoRunStore,
    deps: Collaborators,
}

impl Runtime {
    fn commands(&self) -> Commands {
        Commands::new(self.store.clone(), self.deps.audit.clone())
    }

    fn daemon(&self) -> AutoRunDaemon {
        let signals = Arc::new(HttpSignalSource::new(
            &self.config.signals_url,
            &self.config.geo_eligibility_url,
        ));
        AutoRunDaemon::new(
            self.config.clone(),
            self.store.clone(),
            self.deps.clone(),
            signals,
        )
    }

    /// One-shot eligibility view; falls back to the catalog when the middleware is down.
    async fn view(&self) -> Option<EligibilityView> {
        match self.daemon().collect_view().await {
            Ok(view) => Some(view),
            Err(e) => {
                warn!("Middleware unavailable: {e:#}");
                None
            }
        }
    }

    fn configured(&self, view: Option<&EligibilityView>) -> Vec<AgentType> {
        match view {
            Some(view) => view.agent_types(),
            None => self
                .config
                .agents
                .iter()
                .filter(|a| a.enabled)
                .map(|a| a.agent_type.clone())
                .collect(),
        }
    }
}

/// Load config and open the database.
fn bootstrap(home_dir: &Path) -> Result<Runtime> {
    if !home_dir.exists() {
        std::fs::create_dir_all(home_dir).with_context(|| {
            format!("Failed to create home directory: {}", home_dir.display())
        })?;
    }

    let config_path = home_dir.join("autorun.toml");
    let config = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if config.agents.is_empty() {
        warn!("No [[agents]] configured in {}", config_path.display());
    }

    let db_path = config.resolved_db_path();
    let db_path = Path::new(&db_path);
    let db = Database::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    let db = Arc::new(Mutex::new(db));

    let client = Arc::new(MiddlewareClient::new(
        &config.middleware_url,
        config.rpc_urls.clone(),
    ));
    let deps = Collaborators {
        deployments: client.clone(),
        custody: client,
        notifier: Arc::new(DbNotifier::new(db.clone())),
        audit: Arc::new(AuditLog::new(db.clone())),
    };
    let store = AutoRunStore::new(Arc::new(SqliteStore::new(db.clone())));

    Ok(Runtime {
        config,
        db,
        store,
        deps,
    })
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_init(home_dir: &Path) -> Result<()> {
    let config_path = home_dir.join("autorun.toml");
    if config_path.exists() {
        println!("{} already exists", config_path.display());
        return Ok(());
    }
    config::save_config(&AutoRunConfig::default(), &config_path)?;
    println!(
        "{} Wrote {}; add [[agents]] entries to build the catalog",
        ">>>".green().bold(),
        config_path.display()
    );
    Ok(())
}

async fn cmd_run(runtime: Runtime) -> Result<()> {
    println!(
        "{} Starting auto-run daemon against {}",
        ">>>".green().bold(),
        runtime.config.middleware_url,
    );

    let cancel = CancellationToken::new();
    let mut daemon = runtime.daemon();
    let daemon_cancel = cancel.clone();
    let daemon_handle = tokio::spawn(async move { daemon.run(daemon_cancel).await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    println!("\n{} Shutting down gracefully...", "<<<".red().bold());
    cancel.cancel();

    // The daemon waits for an in-flight rotation, which may take minutes.
    let shutdown_timeout = runtime.config.timing.shutdown_grace();
    match tokio::time::timeout(shutdown_timeout, daemon_handle).await {
        Ok(Ok(Err(e))) => warn!("Daemon exited with error: {e:#}"),
        Ok(Err(e)) => warn!("Daemon task join error: {e}"),
        Err(_) => warn!("Daemon did not stop within {}s", shutdown_timeout.as_secs()),
        Ok(Ok(Ok(()))) => {}
    }

    info!("Daemon shutdown complete");
    Ok(())
}

async fn cmd_status(runtime: Runtime) -> Result<()> {
    let view = runtime.view().await;
    let configured = runtime.configured(view.as_ref());
    let status = runtime.commands().status(&configured).await?;

    println!();
    println!("{}", "=== Auto-run Status ===".bold());
    println!();
    println!(
        "  {}:  {}",
        "Enabled".bold(),
        if status.enabled { "yes".green() } else { "no".yellow() }
    );
    println!(
        "  {}:  {}",
        "Current".bold(),
        status
            .current_agent
            .as_ref()
            .map_or_else(|| "none".dimmed().to_string(), |a| a.to_string())
    );
    println!();
    println!("  {}:", "Rotation".bold());
    if status.included_agents.is_empty() {
        println!("    {}", "(empty)".dimmed());
    }
    for item in &status.included_agents {
        let verdict = view
            .as_ref()
            .and_then(|v| v.get(&item.agent_type))
            .map_or_else(|| "unknown".dimmed().to_string(), colorize_eligibility);
        println!("    {:>3}  {:<24} {}", item.order, item.agent_type.to_string(), verdict);
    }
    println!();
    println!("  {}:", "Excluded".bold());
    for agent in &status.excluded_agents {
        println!("         {}", agent.to_string().dimmed());
    }
    println!();

    let recent = runtime.db.lock().await.recent_log(5)?;
    if !recent.is_empty() {
        println!("  {}:", "Recent".bold());
        for entry in recent {
            println!("    {}  {}", entry.created_at.format("%H:%M:%S"), entry.message);
        }
        println!();
    }

    Ok(())
}

async fn cmd_include(runtime: Runtime, agent: AgentType) -> Result<()> {
    let view = runtime.view().await;
    let configured = runtime.configured(view.as_ref());
    if runtime.commands().include_agent(&agent, &configured).await? {
        println!("Included {agent}");
    } else {
        println!("{agent} is already included or not configured");
    }
    Ok(())
}

async fn cmd_exclude(runtime: Runtime, agent: AgentType) -> Result<()> {
    if runtime.commands().exclude_agent(&agent).await? {
        println!("Excluded {agent}");
    } else {
        println!("{agent} is not in the rotation");
    }
    Ok(())
}

async fn cmd_log(runtime: Runtime, limit: u32) -> Result<()> {
    let entries = runtime.db.lock().await.recent_log(limit)?;
    for entry in entries {
        println!("{}  {}", entry.created_at.to_rfc3339().dimmed(), entry.message);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn colorize_eligibility(eligibility: &Eligibility) -> String {
    let rewards = match eligibility.is_eligible_for_rewards {
        Some(true) => " (rewards earned)".dimmed().to_string(),
        _ => String::new(),
    };
    match &eligibility.reason {
        None if eligibility.can_run => format!("{}{}", "runnable".green(), rewards),
        Some(reason) if autorun::types::reason::is_transient(reason) => {
            format!("{}{}", reason.yellow(), rewards)
        }
        Some(reason) => format!("{}{}", reason.red(), rewards),
        None => format!("{}{}", "blocked".red(), rewards),
    }
}
