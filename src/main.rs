//! Adjustment Factor Rebuild CLI
//!
//! Derives split- and dividend-adjustment factors for every security with
//! price history, replacing the derived tables wholesale, then runs the
//! invariant battery and reports whether the result can be trusted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin adjust-rebuild -- --db data/market.db --output summary.json
//! ```
//!
//! # Exit Codes
//!
//! - 0: Rebuild ran and every hard check passed
//! - 1: Run completed but the derived data must not be promoted
//! - 2: Configuration error (missing database, bad arguments)
//! - 3: Runtime error (database, I/O)

use adjust_engine::derivation::rebuild::{run_rebuild, RebuildConfig};
use adjust_engine::derivation::store::MarketStore;
use clap::Parser;
use dotenv::dotenv;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "adjust-rebuild")]
#[command(about = "Rebuild daily split/dividend adjustment factors")]
struct Args {
    /// Path to the market SQLite database
    #[arg(long, env = "ADJUST_DB_PATH")]
    db: Option<String>,

    /// Write the JSON run summary to this path
    #[arg(long)]
    output: Option<String>,

    /// Bound on diagnostic sample rows per validation check
    #[arg(long)]
    max_samples: Option<usize>,

    /// Fold securities one at a time instead of on the rayon pool
    #[arg(long, default_value_t = false)]
    sequential: bool,
}

fn main() {
    let _ = dotenv();
    init_tracing();

    let args = Args::parse();

    // Environment defaults first, explicit CLI values on top.
    let mut config = RebuildConfig::from_env();
    if let Some(db) = args.db {
        config.db_path = db;
    }
    if let Some(max_samples) = args.max_samples {
        config.max_samples = max_samples;
    }
    if args.sequential {
        config.parallel = false;
    }

    if !Path::new(&config.db_path).exists() {
        eprintln!("Error: database not found at {}", config.db_path);
        eprintln!("Set --db or ADJUST_DB_PATH to an ingested market database.");
        std::process::exit(2);
    }

    let store = match MarketStore::open(&config.db_path) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open market store: {:#}", e);
            std::process::exit(3);
        }
    };

    info!(db = %config.db_path, "Starting adjustment factor rebuild");

    let summary = match run_rebuild(&store, &config) {
        Ok(s) => s,
        Err(e) => {
            error!("Rebuild failed: {:#}", e);
            std::process::exit(3);
        }
    };

    println!("{}", summary.format_summary());

    if let Some(path) = &args.output {
        let json = match serde_json::to_string_pretty(&summary) {
            Ok(j) => j,
            Err(e) => {
                error!("Failed to serialize run summary: {:#}", e);
                std::process::exit(3);
            }
        };
        if let Err(e) = std::fs::write(path, json) {
            error!(path = %path, "Failed to write run summary: {:#}", e);
            std::process::exit(3);
        }
        info!(path = %path, "Run summary written");
    }

    if summary.trusted() {
        std::process::exit(0);
    }

    if !summary.rebuild_executed {
        eprintln!("Rebuild skipped: corporate action preconditions failed.");
    } else {
        eprintln!("Derived factors failed validation and must not be promoted.");
    }
    std::process::exit(1);
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adjust_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
