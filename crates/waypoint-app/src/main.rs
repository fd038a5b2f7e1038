//! Waypoint application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Build the conversation engine over the offline tool executor
//! 4. Answer one `--message`, or read utterances from stdin until EOF
//!
//! Every turn result is printed to stdout as JSON. Lines starting with `:`
//! are commands: `:context`, `:history`, `:capabilities`, `:quit`.

mod cli;
mod offline;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use waypoint_chat::{load_bias_table, ConversationEngine};
use waypoint_core::config::WaypointConfig;
use waypoint_geo::GeoBiasResolver;

use crate::cli::CliArgs;
use crate::offline::OfflineToolExecutor;

const HISTORY_LIMIT: usize = 20;

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => tracing::error!(error = %e, "Failed to serialize output"),
    }
}

/// Run one stdin line. Returns `false` when the session should end.
async fn handle_line(engine: &ConversationEngine, user: &str, line: &str) -> bool {
    match line {
        ":quit" | ":exit" => return false,
        ":context" => print_json(&engine.get_context(user).await),
        ":history" => print_json(&engine.history(user, HISTORY_LIMIT).await),
        ":capabilities" => print_json(&engine.capabilities()),
        cmd if cmd.starts_with(':') => {
            print_json(&Value::String(format!("unknown command {}", cmd)));
        }
        text => print_json(&engine.handle_turn(user, text).await),
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Parsed before tracing so its log level can seed the filter.
    let config_file = args.resolve_config_path();
    let config = WaypointConfig::load_or_default(&config_file);

    // Tracing goes to stderr; stdout carries turn results.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Waypoint v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Geographic bias table, loaded once and shared with the offline executor.
    let table = load_bias_table(&config)?;
    let tools = Arc::new(OfflineToolExecutor::new(GeoBiasResolver::new(Arc::clone(&table))));
    let engine = Arc::new(ConversationEngine::with_bias_table(&config, tools, table)?);
    tracing::info!(user = %args.user, "Conversation engine ready");

    // Idle context eviction.
    if let Some(ttl) = config.context.idle_ttl() {
        let engine_evict = Arc::clone(&engine);
        let period = (ttl / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let evicted = engine_evict.evict_idle();
                if evicted > 0 {
                    tracing::debug!(evicted, "Idle eviction pass");
                }
            }
        });
        tracing::info!(ttl_secs = ttl.as_secs(), "Idle context eviction enabled");
    }

    if let Some(message) = &args.message {
        print_json(&engine.handle_turn(&args.user, message).await);
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !handle_line(&engine, &args.user, line).await {
            break;
        }
    }

    tracing::info!("Waypoint shutting down");
    Ok(())
}
