pub mod chat;
pub mod config;
pub mod run;

use clap::{Parser, Subcommand};

/// reka: a local-LLM conversational assistant.
#[derive(Debug, Parser)]
#[command(name = "reka", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Send a single message and print the reply.
    Run {
        /// The message to send.
        message: String,
        /// Platform tag attached to the message metadata.
        #[arg(long, default_value = "cli")]
        platform: String,
        /// User name attached to the message metadata.
        #[arg(long)]
        user: Option<String>,
    },
    /// Interactive chat in the terminal.
    Chat,
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `REKA_CONFIG` (or `config.toml`
/// by default). A missing file yields the defaults. Returns the parsed
/// [`Config`](rk_domain::config::Config) and the path that was used.
pub fn load_config() -> anyhow::Result<(rk_domain::config::Config, String)> {
    let config_path = std::env::var("REKA_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(path: &str) -> anyhow::Result<rk_domain::config::Config> {
    if !std::path::Path::new(path).exists() {
        return Ok(rk_domain::config::Config::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("reading {path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {path}: {e}"))
}
