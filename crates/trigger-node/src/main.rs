//! `lk-trigger`: runs one long-connection client and writes every
//! received event to stdout.
//!
//! Usage:
//!   LK_APP_SECRET=... lk-trigger --config trigger.toml
//!
//! Env vars:
//!   LK_CONFIG      config path (default: `config.toml`)
//!   LK_APP_SECRET  app secret when not set inline (name configurable)
//!   RUST_LOG       log filter (default: `info`)

mod cli;
mod emit;

use anyhow::Context;
use clap::Parser;
use lk_event_sdk::EventClientBuilder;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Run) => {
            init_tracing(cli.json_logs);
            let (config, path) = cli::load_config(cli.config)?;
            tracing::info!(path = %path.display(), "config loaded");
            run(config).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, path) = cli::load_config(cli.config)?;
            if !cli::validate(&config, &path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _path) = cli::load_config(cli.config)?;
            cli::show(&config)
        }
    }
}

/// Logs go to stderr so stdout carries only events.
fn init_tracing(json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(config: lk_domain::config::Config) -> anyhow::Result<()> {
    let client = EventClientBuilder::from_config(&config)
        .build()
        .context("building event client")?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let dispatcher = emit::build_dispatcher(&config.trigger, tx);
    tracing::info!(events = ?dispatcher.event_types(), all = config.trigger.accepts_all(), "event filter");

    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                break;
            }
        }
    });

    // A failed first attempt keeps retrying in the background.
    if let Err(e) = client.start(dispatcher).await {
        tracing::warn!(error = %e, "initial connection failed, retrying in background");
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutting down");
    client.stop();
    printer.abort();
    Ok(())
}
