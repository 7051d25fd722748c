use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use decant::aggregator::Aggregator;
use decant::config::Config;
use decant::ledger::SeenLedger;
use decant::source::{
    HackerNewsAdapter, QuotaProbe, RedditAdapter, SourceRegistry, TwitterAdapter,
};
use decant::storage::{Database, DatabaseError};

/// Get the config directory path (~/.config/decant/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("decant"))
}

#[derive(Parser, Debug)]
#[command(name = "decant", about = "Multi-source feed aggregator with seen-state tracking")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch all sources and print posts not yet seen
    Refresh {
        /// Mark the printed posts as seen
        #[arg(long)]
        ack: bool,

        /// Emit posts as a JSON array instead of text lines
        #[arg(long)]
        json: bool,
    },
    /// Show per-source seen-state counts
    Status,
    /// Forget all seen state
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    // User-only access: the ledger lives here.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    let config = Config::load(&config_dir.join("config.toml"))?;

    let db_path = config_dir.join("seen.db");
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in ledger path"))?;
    // A corrupt ledger degrades to an empty in-memory one; only a live
    // lock from another instance is fatal.
    let db = match Database::open_or_ephemeral(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of decant appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open seen ledger: {}", e)),
    };

    let ledger = SeenLedger::load(db, config.seen_strategies()).await;
    let registry = Arc::new(build_registry(&ledger)?);
    let aggregator = Aggregator::new(registry, ledger);

    match args.command {
        Command::Refresh { ack, json } => {
            let outcome = aggregator.refresh(&config.enabled_sources()).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.new_posts)?);
            } else if !outcome.has_new_content {
                println!("Nothing new. ({} posts fetched)", outcome.total_fetched);
            } else {
                for post in &outcome.new_posts {
                    let when = Utc
                        .timestamp_millis_opt(post.timestamp_ms)
                        .single()
                        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "????-??-??".to_string());
                    println!("[{}] {} {} ({})", post.source, when, post.title, post.author);
                }
                println!();
                let summary: Vec<String> = outcome
                    .sources_with_new
                    .iter()
                    .map(|s| {
                        let counts = outcome.by_source.get(s).copied().unwrap_or_default();
                        format!("{}: {}/{}", s, counts.new, counts.total)
                    })
                    .collect();
                println!(
                    "{} new of {} fetched ({})",
                    outcome.new_posts.len(),
                    outcome.total_fetched,
                    summary.join(", ")
                );
            }

            if ack {
                aggregator
                    .acknowledge(&outcome.new_posts)
                    .await
                    .context("Posts were shown but could not all be recorded as seen")?;
            }
        }
        Command::Status => {
            let stats = aggregator.ledger().stats().await;
            if stats.is_empty() {
                println!("No seen state recorded yet.");
            } else {
                for entry in stats {
                    let updated = Utc
                        .timestamp_millis_opt(entry.last_updated_ms)
                        .single()
                        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    println!(
                        "{:<12} {:?} strategy, {} ids tracked, updated {}",
                        entry.source.to_string(),
                        entry.strategy,
                        entry.seen_count,
                        updated
                    );
                }
            }
        }
        Command::Reset => {
            aggregator
                .ledger()
                .reset()
                .await
                .context("Failed to clear seen state")?;
            println!("Seen state cleared.");
        }
    }

    Ok(())
}

/// Wire up one adapter per source, sharing a single HTTP client.
///
/// Twitter sits behind the quota probe; its monthly read cap is the whole
/// reason the probe exists. The free-tier sources fetch directly.
fn build_registry(ledger: &SeenLedger) -> Result<SourceRegistry> {
    let client = reqwest::Client::builder()
        .user_agent("decant/0.1")
        .build()
        .context("Failed to build HTTP client")?;

    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(HackerNewsAdapter::new(client.clone())));
    registry.register(Arc::new(RedditAdapter::new(client.clone())));
    registry.register(Arc::new(QuotaProbe::new(
        Arc::new(TwitterAdapter::new(client)),
        ledger.clone(),
    )));

    Ok(registry)
}
