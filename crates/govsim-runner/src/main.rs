//! Govsim - persona engine runner
//!
//! Usage:
//!   govsim --config sim.toml --observations ticks.jsonl --output actions.jsonl
//!
//! Reads one observation record per line, steps the addressed persona, and
//! writes one action per line. Logs go to stderr.

use clap::Parser;
use govsim_core::AgentId;
use govsim_llm::{AnthropicProvider, LlmOracle};
use govsim_runner::config::SimConfig;
use govsim_runner::driver;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "govsim", about = "Persona decision and interaction engine")]
struct Cli {
    /// Path to config file (TOML).
    #[arg(long, default_value = "govsim.toml")]
    config: PathBuf,

    /// Observation records, one JSON object per line. Default: stdin.
    #[arg(long)]
    observations: Option<PathBuf>,

    /// Where to write actions. Default: stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Anthropic API key (or set ANTHROPIC_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,

    /// Dump default config as TOML and exit.
    #[arg(long)]
    dump_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.dump_config {
        println!("{}", SimConfig::default().to_toml());
        return Ok(());
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "govsim=info".into());
    if cli.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = SimConfig::load(&cli.config);

    let api_key = cli
        .api_key
        .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
        .ok_or_else(|| {
            anyhow::anyhow!("ANTHROPIC_API_KEY not set. Pass --api-key or set the env var.")
        })?;

    let mut provider = AnthropicProvider::new(api_key);
    if let Some(url) = &config.oracle.base_url {
        provider = provider.with_base_url(url.clone());
    }
    let goals: HashMap<AgentId, String> = config
        .personas
        .iter()
        .filter(|p| !p.goals.is_empty())
        .map(|p| (AgentId(p.id), p.goals.clone()))
        .collect();
    let oracle = LlmOracle::new(
        Arc::new(provider),
        config.oracle.clone(),
        config.persona.resource_unit.clone(),
    )
    .with_goals(goals);

    let runtime = driver::build_runtime(&config, Arc::new(oracle)).await?;

    let written = match (&cli.observations, &cli.output) {
        (Some(input), Some(output)) => {
            let reader = BufReader::new(tokio::fs::File::open(input).await?);
            let writer = std::io::BufWriter::new(std::fs::File::create(output)?);
            driver::run(&runtime, reader, writer).await?
        }
        (Some(input), None) => {
            let reader = BufReader::new(tokio::fs::File::open(input).await?);
            driver::run(&runtime, reader, std::io::stdout().lock()).await?
        }
        (None, Some(output)) => {
            let writer = std::io::BufWriter::new(std::fs::File::create(output)?);
            driver::run(&runtime, BufReader::new(tokio::io::stdin()), writer).await?
        }
        (None, None) => {
            driver::run(&runtime, BufReader::new(tokio::io::stdin()), std::io::stdout().lock()).await?
        }
    };

    tracing::info!("govsim finished: {} actions", written);
    Ok(())
}
