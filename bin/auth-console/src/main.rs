//! Console that drives the auth session core from JSON lines on stdin.
//!
//! Each settled auth state is printed to stdout as one JSON line, followed
//! by replies to commands that produce one.

mod command;
mod config;
mod handlers;

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use workincz_session::{AuthService, DeferredActions, FileStorage, MemoryProfileStore};

use crate::command::{Command, state_json};
use crate::config::ConsoleConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,workincz_session=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match ConsoleConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "failed to load configuration");
            std::process::exit(2);
        }
    };
    tracing::info!(storage_dir = %config.storage_dir.display(), "Loaded configuration");

    let storage = match FileStorage::open(config.storage_dir.clone()).await {
        Ok(storage) => storage,
        Err(error) => {
            tracing::error!(%error, "failed to open durable storage");
            std::process::exit(1);
        }
    };

    let deferred = Arc::new(DeferredActions::new(Arc::new(storage), &config.session));
    handlers::register_all(&deferred);

    let auth = AuthService::builder(Arc::new(MemoryProfileStore::new()))
        .config(config.session.clone())
        .deferred(deferred)
        .start();

    auth.subscribe(|state| println!("{}", state_json(state)));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                tracing::error!(%error, "failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match Command::parse(&line) {
            Ok(command) => {
                if let Some(reply) = command.run(&auth).await {
                    println!("{reply}");
                }
            }
            Err(error) => tracing::warn!(%error, line = %line, "ignoring malformed command"),
        }
    }

    // Let the last provider event settle before exiting.
    tokio::time::sleep(config.session.debounce_window() * 2).await;
    tracing::info!("shutting down");
}
