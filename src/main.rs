use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trmnl_relay::{Config, FailureMode, Relay};

/// Send the photo of a Telegram message to a TRMNL plugin.
#[derive(Debug, Parser)]
#[command(name = "trmnl-relay", version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "TRMNL_RELAY_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Telegram message JSON; `-` or omitted reads stdin
    message: Option<PathBuf>,

    /// Return delivery errors instead of reporting them in the outcome
    #[arg(long)]
    strict: bool,
}

fn read_message(source: Option<&PathBuf>) -> Result<String> {
    let raw = match source {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read message file: {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read message from stdin")?;
            buf
        }
    };

    Ok(raw)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the outcome JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,trmnl_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    info!("Loading configuration from: {}", cli.config.display());
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    let mut relay = Relay::from_config(&config)?;
    if cli.strict {
        relay = relay.with_failure_mode(FailureMode::Strict);
    }

    info!("  Telegram API: {}", config.telegram.effective_api_base());
    info!("  TRMNL endpoint: {}", config.trmnl.endpoint());
    info!("  Filter user: {:?}", config.telegram.filter_user_id);
    info!("  Failure mode: {}", relay.failure_mode());

    // Decode errors go through the failure mode like any other rejection
    let raw = read_message(cli.message.as_ref())?;
    let outcome = relay.run_json(&raw).await?;

    info!("{}", outcome.summary());
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?
    );

    Ok(())
}
