use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lk_domain::config::{Config, ConfigSeverity};

/// Lark trigger: streams open-platform events to stdout as JSON lines.
#[derive(Debug, Parser)]
#[command(name = "lk-trigger", version, about)]
pub struct Cli {
    /// Path to the config file (overrides `LK_CONFIG`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect and emit events (default when no subcommand is given).
    Run,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Resolve the config path (`--config`, then `LK_CONFIG`, then
/// `config.toml`) and load it.  A missing file yields the defaults.
pub fn load_config(explicit: Option<PathBuf>) -> anyhow::Result<(Config, PathBuf)> {
    let path = explicit
        .or_else(|| std::env::var_os("LK_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = Config::load(&path)?;
    Ok((config, path))
}

/// Print every validation issue.  Returns `false` when any is an error.
pub fn validate(config: &Config, path: &std::path::Path) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("Config OK ({})", path.display());
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    for issue in &issues {
        println!("{issue}");
    }
    println!(
        "\n{} error(s), {} warning(s) in {}",
        error_count,
        issues.len() - error_count,
        path.display(),
    );
    error_count == 0
}

/// Dump the resolved config as TOML, with the inline secret masked.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let mut masked = config.clone();
    if masked.app.app_secret.is_some() {
        masked.app.app_secret = Some("***".into());
    }
    print!("{}", toml::to_string_pretty(&masked)?);
    Ok(())
}
