//! Floor Replay Binary
//!
//! Replays a JSON-lines host log through `FloorAnalytics`, posting reports to
//! the collector (or printing them with `--dry-run`).
//!
//! Each line is either an auction event (`{"kind":"auction-init",...}`) or a
//! batch of ad units to prepare (`{"prepare":[{"code":"p1","bids":[...]}]}`).
//! Prepared ad units are echoed to stdout.
//!
//! Usage:
//!   floor_replay --events auctions.jsonl --page-url "https://site.test/?utm_source=x"
//!
//! Environment:
//!   FLOOR_ENDPOINT - Collector URL
//!   FLOOR_DB_PATH - SQLite file for floors, history and attribution
//!   RUST_LOG - Log filter (default: floorwatch=debug,info)

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use floorwatch::models::{AdUnit, AuctionEvent, ReconcilePayload, ReportEnvelope};
use floorwatch::storage::{KvStore, MemoryKvStore, SqliteKvStore};
use floorwatch::transport::{HttpReportTransport, ReportTransport};
use floorwatch::{AppConfig, FloorAnalytics};

#[derive(Parser, Debug)]
#[command(name = "floor_replay")]
#[command(about = "Replay host auction events through the floor analytics pipeline")]
struct Args {
    /// JSON-lines event log ("-" reads stdin)
    #[arg(long, default_value = "-")]
    events: String,

    /// Collector endpoint (overrides FLOOR_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,

    /// SQLite file (overrides FLOOR_DB_PATH)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Keep state in memory only
    #[arg(long)]
    ephemeral: bool,

    /// Page URL used for session and campaign attribution
    #[arg(long, env = "FLOOR_PAGE_URL")]
    page_url: Option<String>,

    /// Print reports to stdout instead of posting them
    #[arg(long)]
    dry_run: bool,
}

/// One line of the replay log
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostMessage {
    Prepare { prepare: Vec<AdUnit> },
    Event(AuctionEvent),
}

/// Prints reports instead of delivering them
struct StdoutTransport;

#[async_trait::async_trait]
impl ReportTransport for StdoutTransport {
    async fn send(&self, report: &ReportEnvelope) -> Result<Option<ReconcilePayload>> {
        let line = serde_json::to_string(report).context("Failed to serialize report")?;
        println!("{}", line);
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let args = Args::parse();
    let mut config = AppConfig::from_env();
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(db_path) = &args.db_path {
        config.db_path = db_path.to_string_lossy().into_owned();
    }

    let kv: Arc<dyn KvStore> = if args.ephemeral {
        Arc::new(MemoryKvStore::new())
    } else {
        Arc::new(SqliteKvStore::new(&config.db_path)?)
    };
    let transport: Arc<dyn ReportTransport> = if args.dry_run {
        Arc::new(StdoutTransport)
    } else {
        Arc::new(HttpReportTransport::new(
            config.endpoint.clone(),
            config.http_timeout,
        )?)
    };

    info!(
        endpoint = %config.endpoint,
        db_path = %config.db_path,
        dry_run = args.dry_run,
        "🚀 Floor replay starting"
    );

    let mut analytics = FloorAnalytics::new(&config, kv, transport);
    if let Some(page_url) = &args.page_url {
        analytics.set_page_url(page_url)?;
    }

    let reader = open_events(&args.events)?;
    let mut deliveries = Vec::new();
    let (mut lines, mut reports, mut rejected) = (0usize, 0usize, 0usize);

    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        lines += 1;

        let message: HostMessage = match serde_json::from_str(&line) {
            Ok(m) => m,
            Err(e) => {
                warn!(line = idx + 1, error = %e, "Skipping unparseable line");
                rejected += 1;
                continue;
            }
        };

        match message {
            HostMessage::Prepare { prepare: mut ad_units } => {
                analytics.prepare(&mut ad_units);
                let out = serde_json::to_string(&ad_units).context("Failed to serialize ad units")?;
                println!("{}", out);
            }
            HostMessage::Event(event) => match analytics.on_event(&event) {
                Ok(Some(dispatched)) => {
                    reports += 1;
                    deliveries.push(dispatched.delivery);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(line = idx + 1, kind = event.kind(), error = %e, "Event rejected");
                    rejected += 1;
                }
            },
        }
    }

    for delivery in deliveries {
        if let Err(e) = delivery.await {
            warn!(error = %e, "Delivery task panicked");
        }
    }

    info!(lines, reports, rejected, "✅ Replay finished");
    Ok(())
}

fn open_events(path: &str) -> Result<Box<dyn BufRead>> {
    if path == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).with_context(|| format!("Failed to open event log {}", path))?;
    Ok(Box::new(BufReader::new(file)))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "floorwatch=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn load_env() {
    let _ = dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
