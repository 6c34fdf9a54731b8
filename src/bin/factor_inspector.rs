//! Factor Inspector CLI
//!
//! Inspects a market database and reports statistics over the raw inputs
//! and the derived adjustment tables.
//!
//! Usage:
//!   cargo run --bin factor_inspector -- --db data/market.db
//!   cargo run --bin factor_inspector -- --db data/market.db --security 101

use adjust_engine::derivation::store::MarketStore;
use anyhow::Result;
use clap::Parser;
use rusqlite::{Connection, OptionalExtension};

#[derive(Parser, Debug)]
#[command(name = "factor_inspector")]
#[command(about = "Inspect derived adjustment factors and their inputs")]
struct Args {
    /// Path to the market SQLite database
    #[arg(long, env = "ADJUST_DB_PATH")]
    db: String,

    /// Specific security id to inspect (optional)
    #[arg(long)]
    security: Option<i64>,

    /// Show every factor row for the selected security
    #[arg(long, default_value = "false")]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    println!("=== Factor Inspector ===");
    println!("Database: {}", args.db);
    println!();

    let store = MarketStore::open_read_only(&args.db)?;

    store.with_connection(|conn| {
        let tables = get_tables(conn)?;
        println!("Tables found: {:?}", tables);
        println!();

        if tables.iter().any(|t| t == "securities") {
            inspect_securities(conn)?;
        }
        if tables.iter().any(|t| t == "price_bars") {
            inspect_price_bars(conn)?;
        }
        if tables.iter().any(|t| t == "corporate_actions") {
            inspect_corporate_actions(conn)?;
        }
        if tables.iter().any(|t| t == "adjustment_events") {
            inspect_events(conn)?;
        }
        if tables.iter().any(|t| t == "adjustment_factors_daily") {
            inspect_factors(conn)?;
        }

        if let Some(security_id) = args.security {
            inspect_single_security(conn, security_id, args.verbose)?;
        }

        Ok(())
    })?;

    println!("=== Inspection Complete ===");
    Ok(())
}

fn get_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
    let tables = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(tables)
}

fn inspect_securities(conn: &Connection) -> Result<()> {
    println!("--- Securities ---");

    let count: i64 = conn.query_row("SELECT COUNT(*) FROM securities", [], |row| row.get(0))?;
    println!("Total securities: {}", count);

    let mut stmt = conn.prepare(
        r#"
        SELECT s.security_id, s.ticker,
               (SELECT COUNT(*) FROM price_bars p WHERE p.security_id = s.security_id),
               (SELECT COUNT(*) FROM corporate_actions ca WHERE ca.security_id = s.security_id)
        FROM securities s
        ORDER BY s.security_id
        LIMIT 25
        "#,
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (security_id, ticker, bars, actions) in rows {
        println!(
            "  {:>8}  {:<10} bars={:<6} actions={}",
            security_id, ticker, bars, actions
        );
    }
    if count > 25 {
        println!("  ... ({} more)", count - 25);
    }
    println!();
    Ok(())
}

fn inspect_price_bars(conn: &Connection) -> Result<()> {
    println!("--- Price Bars ---");

    let count: i64 = conn.query_row("SELECT COUNT(*) FROM price_bars", [], |row| row.get(0))?;
    let securities: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT security_id) FROM price_bars",
        [],
        |row| row.get(0),
    )?;
    let (min_date, max_date): (Option<String>, Option<String>) = conn.query_row(
        "SELECT MIN(trade_date), MAX(trade_date) FROM price_bars",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    println!("Total bars: {}", count);
    println!("Securities with bars: {}", securities);
    println!(
        "Date range: {} .. {}",
        min_date.as_deref().unwrap_or("-"),
        max_date.as_deref().unwrap_or("-")
    );
    println!();
    Ok(())
}

fn inspect_corporate_actions(conn: &Connection) -> Result<()> {
    println!("--- Corporate Actions ---");

    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM corporate_actions", [], |row| row.get(0))?;
    println!("Total actions: {}", count);

    let mut stmt = conn.prepare(
        r#"
        SELECT action_type, COUNT(*)
        FROM corporate_actions
        GROUP BY action_type
        ORDER BY COUNT(*) DESC
        "#,
    )?;
    let by_type = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (action_type, n) in by_type {
        println!("  {:<12} {}", action_type, n);
    }
    println!();
    Ok(())
}

fn inspect_events(conn: &Connection) -> Result<()> {
    println!("--- Adjustment Events ---");

    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM adjustment_events", [], |row| row.get(0))?;
    println!("Total events: {}", count);

    let mut stmt = conn.prepare(
        r#"
        SELECT resolution_status, COUNT(*)
        FROM adjustment_events
        GROUP BY resolution_status
        ORDER BY COUNT(*) DESC
        "#,
    )?;
    let by_status = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (status, n) in by_status {
        println!("  {:<20} {}", status, n);
    }
    println!();
    Ok(())
}

fn inspect_factors(conn: &Connection) -> Result<()> {
    println!("--- Adjustment Factors ---");

    let count: i64 = conn.query_row("SELECT COUNT(*) FROM adjustment_factors_daily", [], |row| {
        row.get(0)
    })?;
    let securities: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT security_id) FROM adjustment_factors_daily",
        [],
        |row| row.get(0),
    )?;
    let versions: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT derivation_version) FROM adjustment_factors_daily",
        [],
        |row| row.get(0),
    )?;
    let last_derived: Option<String> = conn.query_row(
        "SELECT MAX(derived_at) FROM adjustment_factors_daily",
        [],
        |row| row.get(0),
    )?;

    println!("Total factor rows: {}", count);
    println!("Securities covered: {}", securities);
    println!("Derivation versions present: {}", versions);
    println!(
        "Last derived at: {}",
        last_derived.as_deref().unwrap_or("-")
    );

    // Securities whose factor history is not flat (at least one event hit).
    let adjusted: i64 = conn.query_row(
        r#"
        SELECT COUNT(*) FROM (
            SELECT security_id
            FROM adjustment_factors_daily
            GROUP BY security_id
            HAVING COUNT(DISTINCT split_factor) > 1
                OR COUNT(DISTINCT dividend_factor) > 1
        )
        "#,
        [],
        |row| row.get(0),
    )?;
    println!("Securities with non-flat factors: {}", adjusted);
    println!();
    Ok(())
}

fn inspect_single_security(conn: &Connection, security_id: i64, verbose: bool) -> Result<()> {
    println!("--- Security {} ---", security_id);

    let ticker: Option<String> = conn
        .query_row(
            "SELECT ticker FROM securities WHERE security_id = ?1",
            [security_id],
            |row| row.get(0),
        )
        .optional()?;
    match ticker {
        Some(t) => println!("Ticker: {}", t),
        None => println!("Ticker: (not in securities table)"),
    }

    let mut stmt = conn.prepare(
        r#"
        SELECT provider_action_id, action_type, effective_ts,
               price_mult, resolution_status
        FROM adjustment_events
        WHERE security_id = ?1
        ORDER BY effective_ts DESC
        "#,
    )?;
    let events = stmt
        .query_map([security_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    println!("Events: {}", events.len());
    for (id, action_type, ts, mult, status) in &events {
        println!(
            "  {}  {:<10} mult={:<12} {:<20} {}",
            ts, action_type, mult, status, id
        );
    }

    let limit_clause = if verbose { "" } else { " LIMIT 15" };
    let sql = format!(
        r#"
        SELECT trade_date, split_factor, dividend_factor, volume_factor
        FROM adjustment_factors_daily
        WHERE security_id = ?1
        ORDER BY trade_date DESC{}
        "#,
        limit_clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let factors = stmt
        .query_map([security_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    println!("Factor rows (newest first): {}", factors.len());
    for (date, split, dividend, volume) in &factors {
        println!(
            "  {}  split={:<12} dividend={:<12} volume={}",
            date, split, dividend, volume
        );
    }
    if !verbose {
        println!("  (pass --verbose for the full series)");
    }
    println!();
    Ok(())
}
