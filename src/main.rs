use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use authguard::config::{GuardConfig, LoggingConfig};
use authguard::replay::{self, Scenario};

#[derive(Parser)]
#[command(name = "authguard", version, about = "Rate limiting, circuit breaking and audit logging for session validation")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a scripted request sequence through a fresh guard and print a JSON report
    Replay {
        /// Scenario file (YAML)
        scenario: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = GuardConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(&config.logging);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        path = cli.config.as_deref().unwrap_or("<none>"),
        max_requests = config.rate_limiting.max_requests,
        window_ms = config.rate_limiting.window_ms,
        "Configuration loaded"
    );

    match cli.command {
        Command::Replay { scenario } => {
            let scenario = Scenario::from_file(&scenario)
                .with_context(|| format!("failed to load scenario {}", scenario.display()))?;

            let report = replay::run(&config, &scenario).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
        }
    }

    Ok(())
}

/// Logs go to stderr so reports on stdout stay machine-readable.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

