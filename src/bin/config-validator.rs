//! # Relay Configuration Validator
//!
//! Command-line tool for checking relay engine configuration before deploying it.
//! Loads the same layered sources the engine does, validates them and prints the
//! effective configuration.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use relay_engine::{ConfigManager, EngineConfig, Tier};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "relay-config-validator")]
#[command(about = "Validate relay engine configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, env = "RELAY_ENV", default_value = "development")]
    environment: String,

    /// Configuration directory (default: ./config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format (table, json)
    #[arg(long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate every section (default)
    Validate,

    /// Print the effective configuration
    Show,

    /// List environment override files found in the configuration directory
    Environments,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Validate) | None => validate(&cli),
        Some(Commands::Show) => show(&cli),
        Some(Commands::Environments) => list_environments(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration check completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration check failed: {e:#}");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<std::sync::Arc<ConfigManager>> {
    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
        .with_context(|| format!("loading configuration for '{}'", cli.environment))
}

fn validate(cli: &Cli) -> anyhow::Result<()> {
    println!("🔧 Validating relay engine configuration");
    println!("Environment: {}", cli.environment);

    let manager = load(cli)?;
    println!("✅ Configuration loaded and validated");

    let config = manager.config();
    if config.dispatch.endpoints.is_empty() {
        bail!("dispatch.endpoints is empty - the engine needs at least one downstream endpoint");
    }

    match cli.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&manager.debug_config())?),
        _ => print_summary(config),
    }

    println!("\n🎉 All configuration checks passed!");
    Ok(())
}

fn show(cli: &Cli) -> anyhow::Result<()> {
    let manager = load(cli)?;
    println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
    Ok(())
}

fn print_summary(config: &EngineConfig) {
    println!("\n📬 Queues");
    for tier in Tier::ALL {
        let queue = config.queues.for_tier(tier);
        println!(
            "   {:<10} capacity {:>6}  overflow {:<12} workers {}",
            tier.to_string(),
            queue.capacity,
            queue.overflow.to_string(),
            config.workers.pool_size(tier)
        );
    }

    println!("\n📡 Dispatch");
    for (rank, endpoint) in config.dispatch.endpoints.iter().enumerate() {
        println!("   #{rank} {endpoint}");
    }
    println!(
        "   call timeout {}ms, deadline {}ms, {} attempts per endpoint",
        config.dispatch.call_timeout_ms,
        config.dispatch.deadline_ms,
        config.dispatch.max_retries_per_endpoint
    );

    println!("\n🔁 Task retry");
    println!(
        "   max {} attempts, backoff {}ms..{}ms, jitter {}",
        config.retry.max_retries,
        config.retry.base_delay_ms,
        config.retry.max_delay_ms,
        config.retry.jitter_factor
    );

    println!("\n🩺 Supervision");
    println!(
        "   check every {}ms, heartbeat timeout {}ms, {} restarts max",
        config.supervisor.check_interval_ms,
        config.supervisor.heartbeat_timeout_ms,
        config.supervisor.max_restart_attempts
    );
    println!("   shutdown budget {}ms", config.shutdown.timeout_ms);

    match &config.dead_letter.path {
        Some(path) => println!("\n🪦 Dead letters mirrored to {}", path.display()),
        None => println!("\n🪦 Dead letters kept in memory only"),
    }
}

fn list_environments(cli: &Cli) -> anyhow::Result<()> {
    let dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("config"));
    println!("📋 Environments in {}:", dir.display());

    if !dir.exists() {
        println!("   (directory not found)");
        return Ok(());
    }

    let mut environments: Vec<String> = std::fs::read_dir(&dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name.strip_prefix("relay-engine.")
                .and_then(|rest| rest.strip_suffix(".toml"))
                .map(str::to_string)
        })
        .collect();
    environments.sort();

    if environments.is_empty() {
        println!("   (no environment overrides)");
    }
    for environment in environments {
        println!("  • {environment}");
    }
    Ok(())
}
