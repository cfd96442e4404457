//! chainfeed CLI — run the Cosmos event pipeline and inspect its state.
//!
//! Usage:
//! ```bash
//! chainfeed run    --config chainfeed.json
//! chainfeed status --config chainfeed.json [--json]
//! chainfeed info
//! ```

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chainfeed_core::{
    BlockSubject, CheckpointStore, EventStore, FeedConfig, LogConfig, ProjectionManager,
    StorageConfig,
};
use chainfeed_cosmos::{
    BlockProjection, CommandSubscriber, HttpTendermintClient, SyncManager, TransactionProjection,
    TxDecoder, SYNC_CONSUMER_ID,
};
use chainfeed_storage::{InMemoryStorage, SqliteStorage};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "run" => cmd_run(&args[2..]).await,
        "status" => cmd_status(&args[2..]).await,
        "info" => {
            cmd_info();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("chainfeed {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainfeed {}", env!("CARGO_PKG_VERSION"));
    println!("Event-sourcing pipeline for Cosmos/Tendermint chains\n");
    println!("USAGE:");
    println!("    chainfeed <COMMAND> [--config <FILE>]\n");
    println!("COMMANDS:");
    println!("    run      Sync blocks and run the projections until Ctrl-C");
    println!("    status   Print the event store height and sync checkpoint (--json for JSON)");
    println!("    info     Show ChainFeed defaults");
    println!("    version  Print version");
    println!("    help     Print this help");
}

fn cmd_info() {
    let defaults = FeedConfig::default();
    println!("ChainFeed v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default RPC endpoint: {}", defaults.rpc_url);
    println!("  Default fee denomination: {}", defaults.base_denom);
    println!("  Default poll interval: {} ms", defaults.poll_interval_ms);
    println!(
        "  Projection retry (init / idle / error): {} / {} / {} ms",
        defaults.projection_init_retry_ms,
        defaults.projection_idle_retry_ms,
        defaults.projection_error_retry_ms
    );
    println!("  Stall alarm after: {} consecutive failures", defaults.alert_after_failures);
    println!("  Storage backends: memory, SQLite");
    println!(
        "  Projections: {}, {}",
        BlockProjection::ID,
        TransactionProjection::ID
    );
}

// ─── run ──────────────────────────────────────────────────────────────────────

async fn cmd_run(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    init_tracing(&config.log);

    let (events, checkpoints) = open_storage(&config.storage).await?;
    let client = Arc::new(HttpTendermintClient::new(
        config.rpc_url.clone(),
        config.request_timeout(),
    )?);

    let subject = Arc::new(BlockSubject::new());
    subject.attach(Arc::new(CommandSubscriber::new(TxDecoder::new(
        config.base_denom.clone(),
    ))));

    let sync = Arc::new(
        SyncManager::new(client, subject, events.clone(), checkpoints)
            .with_retry(config.sync_retry()),
    );

    let mut projections =
        ProjectionManager::new(events).with_schedule(config.projection_schedule());
    projections.register(Arc::new(BlockProjection::new()))?;
    projections.register(Arc::new(TransactionProjection::new()))?;

    tracing::info!(
        rpc_url = %config.rpc_url,
        projections = ?projections.projection_ids(),
        "starting chainfeed"
    );

    let mut handles = projections.run();
    handles.push({
        let sync = sync.clone();
        tokio::spawn(async move { sync.run().await })
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    tracing::info!(sync = ?sync.progress(), "shutting down");
    for handle in handles {
        handle.abort();
    }
    Ok(())
}

// ─── status ───────────────────────────────────────────────────────────────────

async fn cmd_status(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    if config.storage == StorageConfig::Memory {
        anyhow::bail!("status needs persistent storage; configure the sqlite backend");
    }
    let (events, checkpoints) = open_storage(&config.storage).await?;

    let latest = events.latest_height().await?;
    let sync = checkpoints.load(SYNC_CONSUMER_ID).await?;
    let sync_height = sync.as_ref().map(|cp| cp.height);
    let updated_at = sync
        .as_ref()
        .and_then(|cp| chrono::DateTime::from_timestamp(cp.updated_at, 0))
        .map(|t| t.to_rfc3339());

    if args.iter().any(|a| a == "--json") {
        let status = serde_json::json!({
            "eventStoreLatestHeight": latest,
            "syncCheckpoint": {
                "height": sync_height,
                "updatedAt": updated_at,
            },
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Event store latest height: {}", display_height(latest));
    println!(
        "Sync checkpoint:           {}   {}",
        display_height(sync_height),
        updated_at.as_deref().unwrap_or("-"),
    );
    println!(
        "Projections ({}, {}) are rebuilt in memory from the event store on `run`.",
        BlockProjection::ID,
        TransactionProjection::ID
    );
    Ok(())
}

fn display_height(height: Option<u64>) -> String {
    height.map_or_else(|| "-".to_string(), |h| h.to_string())
}

// ─── Wiring ───────────────────────────────────────────────────────────────────

fn load_config(args: &[String]) -> anyhow::Result<FeedConfig> {
    let path = args
        .iter()
        .position(|a| a == "--config" || a == "-c")
        .map(|i| args.get(i + 1).context("--config needs a file path"))
        .transpose()?;

    match path {
        Some(path) => Ok(FeedConfig::from_file(path)?),
        None => Ok(FeedConfig::default()),
    }
}

async fn open_storage(
    config: &StorageConfig,
) -> anyhow::Result<(Arc<dyn EventStore>, Arc<dyn CheckpointStore>)> {
    match config {
        StorageConfig::Memory => {
            let storage = Arc::new(InMemoryStorage::new());
            let events: Arc<dyn EventStore> = storage.clone();
            let checkpoints: Arc<dyn CheckpointStore> = storage;
            Ok((events, checkpoints))
        }
        StorageConfig::Sqlite { path } => {
            let storage = Arc::new(
                SqliteStorage::open(path)
                    .await
                    .with_context(|| format!("opening {path}"))?,
            );
            let events: Arc<dyn EventStore> = storage.clone();
            let checkpoints: Arc<dyn CheckpointStore> = storage;
            Ok((events, checkpoints))
        }
    }
}

/// Initialise tracing from the log config. Call once at startup.
fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_new(config.directives()).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
