//! StreamChat - Terminal Chat Client
//!
//! Interactive terminal surface for the streamchat engine. Responses stream
//! in as they are generated; conversations are saved between runs.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (http://localhost:3000/api/chat/stream)
//! streamchat
//!
//! # Another server and model
//! streamchat --base-url https://chat.example.com --model claude-3
//!
//! # With config file, starting a fresh conversation
//! streamchat --config ./streamchat.toml --new
//!
//! # Verbose logging (written to stderr)
//! RUST_LOG=debug streamchat
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl-C): cancel the response in progress, or exit when idle

mod commands;
mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use streamchat_core::config::{load_config, load_config_from_path};
use streamchat_core::{
    resolve_model, ChatOrchestrator, ConfigOverrides, ConversationStore, FileStorage,
    HttpTransport, OrchestratorConfig,
};
use tracing::info;

/// StreamChat - streaming chat client for the terminal
#[derive(Parser, Debug)]
#[command(name = "streamchat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "STREAMCHAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// API server base URL
    #[arg(short = 'u', long, value_name = "URL")]
    base_url: Option<String>,

    /// Model to use
    #[arg(short = 'm', long, value_name = "ID")]
    model: Option<String>,

    /// Directory where conversations are stored
    #[arg(long, value_name = "DIR")]
    storage_dir: Option<PathBuf>,

    /// Start with a new conversation instead of the most recent one
    #[arg(short = 'n', long)]
    new: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "STREAMCHAT_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref base_url) = self.base_url {
            overrides = overrides.with_base_url(base_url.clone());
        }
        if let Some(ref model) = self.model {
            overrides = overrides.with_default_model(model.clone());
        }
        if let Some(ref dir) = self.storage_dir {
            overrides = overrides.with_storage_dir(dir.clone());
        }
        overrides
    }
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so they do not interleave with the conversation.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "streamchat_cli={level},streamchat_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = match args.config {
        Some(ref path) => load_config_from_path(Some(path.clone())),
        None => load_config(),
    }
    .context("Failed to load configuration")?;
    args.overrides()
        .apply(&mut config)
        .context("Invalid command-line option")?;

    info!(
        endpoint = %config.stream_endpoint(),
        storage = %config.storage.dir.display(),
        source = %config.source(),
        "Configuration loaded"
    );

    let storage = Arc::new(FileStorage::new(&config.storage.dir));
    let mut store = ConversationStore::load(storage);
    store.set_selected_model(resolve_model(&config.chat.default_model));
    if args.new {
        store.create_conversation();
    }

    let transport = Arc::new(
        HttpTransport::new(config.connect_timeout()).context("Failed to create HTTP client")?,
    );
    let mut chat = ChatOrchestrator::new(store, transport, OrchestratorConfig::from_config(&config));

    repl::run(&mut chat).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_to_overrides() {
        let args = Args::try_parse_from([
            "streamchat",
            "--base-url",
            "https://chat.example.com",
            "-m",
            "claude-3",
            "--new",
        ])
        .unwrap();

        assert!(args.new);
        let overrides = args.overrides();
        assert_eq!(overrides.base_url.as_deref(), Some("https://chat.example.com"));
        assert_eq!(overrides.default_model.as_deref(), Some("claude-3"));
        assert!(overrides.storage_dir.is_none());
    }
}
