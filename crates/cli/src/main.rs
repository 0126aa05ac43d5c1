//! apbatch - batch operations against an access-point fleet

mod app;
mod config;
mod logging;
mod render;
mod run;

use anyhow::{Context, Result};
use apbatch_core::application::strategy::PRESET_COMMANDS;
use apbatch_core::domain::{BrowserActionKind, OperationConfig, RunOutcome};
use app::{App, InventoryFile};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use config::AppConfig;
use run::RunOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "apbatch")]
#[command(about = "Batch operations across access points", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: platform config dir, apbatch/config.toml)
    #[arg(long, global = true, env = "APBATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Inventory database, overriding the configured path
    #[arg(long, global = true, env = "APBATCH_DB_PATH")]
    database: Option<PathBuf>,
}

/// Selection and confirmation flags shared by every operation
#[derive(Args)]
struct RunArgs {
    /// Search text; repeat to add more matches to the selection
    #[arg(short, long = "query", required = true)]
    queries: Vec<String>,

    /// Worker count (1-50)
    #[arg(short, long)]
    parallelism: Option<usize>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,

    /// Acknowledge high-risk operations non-interactively
    #[arg(long)]
    confirm_high_risk: bool,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn options(&self) -> RunOptions {
        RunOptions {
            yes: self.yes,
            confirm_high_risk: self.confirm_high_risk,
            json: self.json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Search the inventory by AP id, IP, MAC, store id or alias
    Search {
        query: String,

        /// Maximum rows
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Import access points and credentials from a JSON file
    Import {
        /// `{"access_points": [...], "credentials": [...]}`
        file: PathBuf,
    },

    /// Probe reachability with ping
    Ping {
        #[command(flatten)]
        run: RunArgs,

        /// Echo requests per target (1-10)
        #[arg(short, long)]
        count: Option<u32>,

        /// Per-attempt timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Run a shell command over SSH
    Ssh {
        #[command(flatten)]
        run: RunArgs,

        /// Command line to run
        #[arg(short, long, conflicts_with = "preset")]
        command: Option<String>,

        /// Quick command by label, e.g. "Uptime"
        #[arg(long)]
        preset: Option<String>,

        /// Per-target timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// List the SSH quick commands
    Presets,

    /// Drive the AP web interface
    Browser {
        #[command(flatten)]
        run: RunArgs,

        /// enable-ssh, disable-ssh, reboot, check-status or read-config
        #[arg(short, long)]
        action: BrowserActionKind,

        /// Tabs open at once
        #[arg(long)]
        tab_budget: Option<usize>,

        /// Per-target timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

fn preset_command(label: &str) -> Result<String> {
    PRESET_COMMANDS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(label))
        .map(|(_, command)| command.to_string())
        .with_context(|| format!("Unknown preset '{}'; see `apbatch presets`", label))
}

fn exit_code(outcome: &RunOutcome, failed: usize) -> i32 {
    match outcome {
        RunOutcome::Aborted { .. } => 2,
        _ if failed > 0 => 1,
        _ => 0,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    let log_dir = config.log_dir()?;
    let log_guard = logging::init(&config.log_format, log_dir.as_deref())?;
    info!(version = apbatch_core::VERSION, "apbatch starting");

    if let Commands::Presets = cli.command {
        for (label, command) in PRESET_COMMANDS {
            println!("  {:<22} {}", label.bold(), command);
        }
        return Ok(());
    }

    let app = App::open(config, cli.database.as_deref()).await?;

    let report = match cli.command {
        Commands::Presets => None,

        Commands::Search { query, limit, json } => {
            let targets = app.search(&query, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&targets)?);
            } else {
                render::print_targets(&targets);
            }
            None
        }

        Commands::Import { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Cannot read {}", file.display()))?;
            let inventory: InventoryFile =
                serde_json::from_str(&raw).context("Invalid inventory JSON")?;
            let (aps, creds) = app.import(&inventory).await?;
            println!(
                "{}",
                format!("✓ Imported {} access points and {} credentials", aps, creds)
                    .green()
                    .bold()
            );
            None
        }

        Commands::Ping {
            run: args,
            count,
            timeout_ms,
        } => {
            let ping = &app.config.ping;
            let config = OperationConfig::connectivity(count.unwrap_or(ping.count))
                .with_parallelism(args.parallelism.unwrap_or(ping.parallelism))
                .with_timeout(Duration::from_millis(timeout_ms.unwrap_or(ping.timeout_ms)));
            let selection = app.select(&args.queries).await?;
            run::execute(&selection, Arc::new(app.connectivity()), config, args.options()).await?
        }

        Commands::Ssh {
            run: args,
            command,
            preset,
            timeout_secs,
        } => {
            let command = match (command, preset) {
                (Some(command), _) => command,
                (None, Some(label)) => preset_command(&label)?,
                (None, None) => anyhow::bail!("Either --command or --preset is required"),
            };
            let ssh = &app.config.ssh;
            let config = OperationConfig::remote_command(command)
                .with_parallelism(args.parallelism.unwrap_or(ssh.parallelism))
                .with_timeout(Duration::from_secs(timeout_secs.unwrap_or(ssh.timeout_secs)));
            let selection = app.select(&args.queries).await?;
            run::execute(&selection, Arc::new(app.remote_command()), config, args.options()).await?
        }

        Commands::Browser {
            run: args,
            action,
            tab_budget,
            timeout_secs,
        } => {
            let browser = &app.config.browser;
            let tab_budget = tab_budget.unwrap_or(browser.tab_budget);
            let mut config = OperationConfig::browser(action, tab_budget)
                .with_timeout(Duration::from_secs(timeout_secs.unwrap_or(browser.timeout_secs)));
            if let Some(parallelism) = args.parallelism {
                config = config.with_parallelism(parallelism);
            }
            let selection = app.select(&args.queries).await?;
            let (strategy, driver) = app.browser();
            let report = run::execute(&selection, Arc::new(strategy), config, args.options()).await;
            if let Err(e) = driver.quit().await {
                tracing::warn!(error = %e, "Failed to close browser session");
            }
            report?
        }
    };

    if let Some(report) = report {
        let code = exit_code(&report.outcome, report.counts.failed);
        if code != 0 {
            // exit() skips destructors; flush file logs first
            drop(log_guard);
            std::process::exit(code);
        }
    }
    Ok(())
}
