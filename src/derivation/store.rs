//! Market Data Store
//!
//! SQLite persistence for the raw market inputs (securities, daily price
//! bars, corporate actions) and the derived adjustment tables. Raw tables
//! are upsert-maintained and never touched by the rebuild path; the two
//! derived tables are owned exclusively by [`MarketStore::replace_derived`]
//! and only ever replaced wholesale inside one transaction.

use crate::derivation::models::{
    ActionType, AdjustmentEvent, AdjustmentFactor, CorporateAction, PriceBar, ResolutionStatus,
    Security,
};
use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

// =============================================================================
// STORAGE SCHEMA
// =============================================================================

const MARKET_STORE_SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;
PRAGMA temp_store = MEMORY;

-- Security master
CREATE TABLE IF NOT EXISTS securities (
    security_id INTEGER PRIMARY KEY,
    ticker TEXT NOT NULL,
    name TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_securities_ticker
    ON securities(ticker);

-- Raw daily price bars, one per (security_id, trade_date)
CREATE TABLE IF NOT EXISTS price_bars (
    security_id INTEGER NOT NULL,
    trade_date TEXT NOT NULL,
    open TEXT,
    high TEXT,
    low TEXT,
    close TEXT NOT NULL,
    volume INTEGER,
    PRIMARY KEY (security_id, trade_date)
) WITHOUT ROWID;

-- Raw corporate actions keyed by provider identity
CREATE TABLE IF NOT EXISTS corporate_actions (
    provider TEXT NOT NULL,
    provider_action_id TEXT NOT NULL,
    security_id INTEGER NOT NULL,
    action_type TEXT NOT NULL,
    action_date TEXT NOT NULL,
    value_num TEXT,
    value_den TEXT,
    cash_amount TEXT,
    currency TEXT,
    raw_payload TEXT,
    PRIMARY KEY (provider, provider_action_id)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_corporate_actions_security
    ON corporate_actions(security_id, action_date);

-- Derived adjustment events, truncated and rebuilt every run
CREATE TABLE IF NOT EXISTS adjustment_events (
    security_id INTEGER NOT NULL,
    provider TEXT NOT NULL,
    provider_action_id TEXT NOT NULL,
    action_type TEXT NOT NULL,
    effective_ts TEXT NOT NULL,
    split_price_mult TEXT NOT NULL,
    dividend_price_mult TEXT NOT NULL,
    price_mult TEXT NOT NULL,
    prev_close_date TEXT,
    prev_close TEXT,
    resolution_status TEXT NOT NULL,
    derivation_version TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_adjustment_events_security
    ON adjustment_events(security_id, effective_ts);

-- Derived per-trade-date factors, truncated and rebuilt every run
CREATE TABLE IF NOT EXISTS adjustment_factors_daily (
    security_id INTEGER NOT NULL,
    trade_date TEXT NOT NULL,
    split_factor TEXT NOT NULL,
    dividend_factor TEXT NOT NULL,
    volume_factor TEXT NOT NULL,
    anchor_date TEXT NOT NULL,
    derivation_version TEXT NOT NULL,
    derived_at TEXT NOT NULL,
    PRIMARY KEY (security_id, trade_date)
) WITHOUT ROWID;
"#;

// Decimals persist as canonical decimal strings so rebuilds over identical
// inputs are byte-identical; dates as ISO-8601 so lexicographic order is
// chronological order.
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// =============================================================================
// WRITE STATS
// =============================================================================

/// Outcome of a corporate-action batch write.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ActionWriteStats {
    pub written: usize,
    pub rejected: usize,
}

// =============================================================================
// MARKET STORE
// =============================================================================

/// Handle to the market database. The connection is internally
/// synchronized; callers share one store per database.
pub struct MarketStore {
    conn: Arc<Mutex<Connection>>,
}

impl MarketStore {
    /// Open or create the store at the given path.
    pub fn open(db_path: &str) -> Result<Self> {
        let path = Path::new(db_path);

        if let Some(parent) = path.parent() {
            if !parent.exists() && !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory for {}", db_path))?;
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open market database: {}", db_path))?;

        conn.execute_batch(MARKET_STORE_SCHEMA)?;

        info!(path = %db_path, "Market store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an existing store read-only (inspection tooling).
    pub fn open_read_only(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open market database read-only: {}", db_path))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(MARKET_STORE_SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run ad-hoc work against the underlying connection. Used by the
    /// validation batteries and inspection tooling for raw SQL.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    // =========================================================================
    // RAW TABLE WRITES
    // =========================================================================

    /// Insert or replace a security master row.
    pub fn upsert_security(&self, security: &Security) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO securities (security_id, ticker, name)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (security_id) DO UPDATE SET
                ticker = excluded.ticker,
                name = excluded.name
            "#,
            params![security.security_id, security.ticker, security.name],
        )
        .with_context(|| format!("Failed to upsert security {}", security.security_id))?;
        Ok(())
    }

    /// Upsert a batch of price bars keyed on `(security_id, trade_date)`.
    pub fn upsert_price_bars(&self, bars: &[PriceBar]) -> Result<usize> {
        if bars.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])?;
        match Self::upsert_price_bars_inner(&conn, bars) {
            Ok(written) => {
                conn.execute("COMMIT", [])?;
                Ok(written)
            }
            Err(e) => {
                Self::rollback(&conn);
                Err(e)
            }
        }
    }

    fn upsert_price_bars_inner(conn: &Connection, bars: &[PriceBar]) -> Result<usize> {
        let mut stmt = conn.prepare(
            r#"
            INSERT INTO price_bars (security_id, trade_date, open, high, low, close, volume)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (security_id, trade_date) DO UPDATE SET
                open = excluded.open,
                high = excluded.high,
                low = excluded.low,
                close = excluded.close,
                volume = excluded.volume
            "#,
        )?;

        for bar in bars {
            stmt.execute(params![
                bar.security_id,
                bar.trade_date.to_string(),
                bar.open.map(|d| d.to_string()),
                bar.high.map(|d| d.to_string()),
                bar.low.map(|d| d.to_string()),
                bar.close.to_string(),
                bar.volume,
            ])
            .with_context(|| {
                format!(
                    "Failed to upsert price bar {} {}",
                    bar.security_id, bar.trade_date
                )
            })?;
        }

        Ok(bars.len())
    }

    /// Upsert a batch of corporate actions keyed on
    /// `(provider, provider_action_id)`, validating each payload first.
    /// Invalid records are rejected and counted, never stored.
    pub fn upsert_corporate_actions(&self, actions: &[CorporateAction]) -> Result<ActionWriteStats> {
        if actions.is_empty() {
            return Ok(ActionWriteStats::default());
        }

        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])?;
        match Self::upsert_actions_inner(&conn, actions) {
            Ok(stats) => {
                conn.execute("COMMIT", [])?;
                if stats.rejected > 0 {
                    warn!(
                        rejected = stats.rejected,
                        written = stats.written,
                        "Rejected invalid corporate actions"
                    );
                }
                Ok(stats)
            }
            Err(e) => {
                Self::rollback(&conn);
                Err(e)
            }
        }
    }

    fn upsert_actions_inner(conn: &Connection, actions: &[CorporateAction]) -> Result<ActionWriteStats> {
        let mut stmt = conn.prepare(
            r#"
            INSERT INTO corporate_actions (
                provider, provider_action_id, security_id, action_type, action_date,
                value_num, value_den, cash_amount, currency, raw_payload
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (provider, provider_action_id) DO UPDATE SET
                security_id = excluded.security_id,
                action_type = excluded.action_type,
                action_date = excluded.action_date,
                value_num = excluded.value_num,
                value_den = excluded.value_den,
                cash_amount = excluded.cash_amount,
                currency = excluded.currency,
                raw_payload = excluded.raw_payload
            "#,
        )?;

        let mut stats = ActionWriteStats::default();

        for action in actions {
            let kind = match action.validate() {
                Ok(kind) => kind,
                Err(reason) => {
                    warn!(
                        provider = %action.provider,
                        provider_action_id = %action.provider_action_id,
                        reason = %reason,
                        "Skipping invalid corporate action"
                    );
                    stats.rejected += 1;
                    continue;
                }
            };

            stmt.execute(params![
                action.provider,
                action.provider_action_id,
                action.security_id,
                kind.as_str(),
                action.action_date.to_string(),
                action.value_num.map(|d| d.to_string()),
                action.value_den.map(|d| d.to_string()),
                action.cash_amount.map(|d| d.to_string()),
                action.currency,
                action.raw_payload,
            ])
            .with_context(|| {
                format!(
                    "Failed to upsert corporate action {}:{}",
                    action.provider, action.provider_action_id
                )
            })?;
            stats.written += 1;
        }

        Ok(stats)
    }

    // =========================================================================
    // RAW TABLE READS
    // =========================================================================

    /// Distinct security ids that have at least one price bar, ascending.
    pub fn security_ids_with_prices(&self) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT security_id FROM price_bars ORDER BY security_id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// All trade dates for a security, most recent first. The first
    /// element is the security's anchor date.
    pub fn trade_dates_desc(&self, security_id: i64) -> Result<Vec<NaiveDate>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT trade_date FROM price_bars WHERE security_id = ?1 ORDER BY trade_date DESC",
        )?;
        let raw = stmt
            .query_map(params![security_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        raw.iter().map(|s| parse_date("trade_date", s)).collect()
    }

    /// Latest trade date across all securities, if any bars exist.
    pub fn max_trade_date(&self) -> Result<Option<NaiveDate>> {
        let conn = self.conn.lock();
        let raw: Option<String> =
            conn.query_row("SELECT MAX(trade_date) FROM price_bars", [], |row| row.get(0))?;
        raw.as_deref().map(|s| parse_date("trade_date", s)).transpose()
    }

    /// All corporate actions, ordered by `(security_id, action_date)`,
    /// the order the resolver consumes them in.
    pub fn corporate_actions_ordered(&self) -> Result<Vec<CorporateAction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT provider, provider_action_id, security_id, action_type, action_date,
                   value_num, value_den, cash_amount, currency, raw_payload
            FROM corporate_actions
            ORDER BY security_id, action_date
            "#,
        )?;

        type RawAction = (
            String,
            String,
            i64,
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
        );

        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<RawAction>>>()?;

        raw.into_iter()
            .map(
                |(
                    provider,
                    provider_action_id,
                    security_id,
                    action_type,
                    action_date,
                    value_num,
                    value_den,
                    cash_amount,
                    currency,
                    raw_payload,
                )| {
                    Ok(CorporateAction {
                        security_id,
                        provider,
                        provider_action_id,
                        action_type,
                        action_date: parse_date("action_date", &action_date)?,
                        value_num: parse_opt_decimal("value_num", value_num)?,
                        value_den: parse_opt_decimal("value_den", value_den)?,
                        cash_amount: parse_opt_decimal("cash_amount", cash_amount)?,
                        currency,
                        raw_payload,
                    })
                },
            )
            .collect()
    }

    /// Most recent price bar strictly before `date` for a security.
    pub fn prev_close_before(
        &self,
        security_id: i64,
        date: NaiveDate,
    ) -> Result<Option<(NaiveDate, Decimal)>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                r#"
                SELECT trade_date, close
                FROM price_bars
                WHERE security_id = ?1
                  AND trade_date < ?2
                ORDER BY trade_date DESC
                LIMIT 1
                "#,
                params![security_id, date.to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match raw {
            Some((d, close)) => Ok(Some((
                parse_date("trade_date", &d)?,
                parse_decimal("close", &close)?,
            ))),
            None => Ok(None),
        }
    }

    /// Securities that have corporate actions on file but not a single
    /// price bar. The rebuild cannot anchor these; the caller treats any
    /// hit as fatal. Returns `(security_id, action_count)`.
    pub fn actions_without_price_history(&self) -> Result<Vec<(i64, i64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT ca.security_id, COUNT(*) AS action_count
            FROM corporate_actions ca
            LEFT JOIN (SELECT DISTINCT security_id FROM price_bars) p
              ON p.security_id = ca.security_id
            WHERE p.security_id IS NULL
            GROUP BY ca.security_id
            ORDER BY ca.security_id
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(i64, i64)>>>()?;
        Ok(rows)
    }

    // =========================================================================
    // DERIVED TABLE ACCESS
    // =========================================================================

    /// Atomically replace both derived tables with the given result sets.
    ///
    /// Either the complete rebuild commits or nothing does; any failure
    /// rolls the transaction back and leaves the previous derived state
    /// untouched. Returns `(events_written, factor_rows_written)`.
    pub fn replace_derived(
        &self,
        events: &[AdjustmentEvent],
        factors: &[AdjustmentFactor],
    ) -> Result<(usize, usize)> {
        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])?;
        match Self::replace_derived_inner(&conn, events, factors) {
            Ok(counts) => {
                conn.execute("COMMIT", [])?;
                Ok(counts)
            }
            Err(e) => {
                Self::rollback(&conn);
                Err(e)
            }
        }
    }

    fn replace_derived_inner(
        conn: &Connection,
        events: &[AdjustmentEvent],
        factors: &[AdjustmentFactor],
    ) -> Result<(usize, usize)> {
        conn.execute("DELETE FROM adjustment_events", [])?;
        conn.execute("DELETE FROM adjustment_factors_daily", [])?;

        let mut event_stmt = conn.prepare(
            r#"
            INSERT INTO adjustment_events (
                security_id, provider, provider_action_id, action_type, effective_ts,
                split_price_mult, dividend_price_mult, price_mult,
                prev_close_date, prev_close, resolution_status, derivation_version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )?;

        for event in events {
            event_stmt
                .execute(params![
                    event.security_id,
                    event.provider,
                    event.provider_action_id,
                    event.action_type.as_str(),
                    event.effective_ts.format(TS_FORMAT).to_string(),
                    event.split_price_mult.to_string(),
                    event.dividend_price_mult.to_string(),
                    event.price_mult.to_string(),
                    event.prev_close_date.map(|d| d.to_string()),
                    event.prev_close.map(|d| d.to_string()),
                    event.resolution_status.as_str(),
                    event.derivation_version,
                ])
                .with_context(|| {
                    format!(
                        "Failed to insert adjustment event {}:{}",
                        event.provider, event.provider_action_id
                    )
                })?;
        }

        let mut factor_stmt = conn.prepare(
            r#"
            INSERT INTO adjustment_factors_daily (
                security_id, trade_date, split_factor, dividend_factor, volume_factor,
                anchor_date, derivation_version, derived_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )?;

        for factor in factors {
            factor_stmt
                .execute(params![
                    factor.security_id,
                    factor.trade_date.to_string(),
                    factor.split_factor.to_string(),
                    factor.dividend_factor.to_string(),
                    factor.volume_factor.to_string(),
                    factor.anchor_date.to_string(),
                    factor.derivation_version,
                    factor.derived_at.format(TS_FORMAT).to_string(),
                ])
                .with_context(|| {
                    format!(
                        "Failed to insert factor row {} {}",
                        factor.security_id, factor.trade_date
                    )
                })?;
        }

        Ok((events.len(), factors.len()))
    }

    /// Derived events for one security, descending by `effective_ts`,
    /// the order the accumulator consumes them in.
    pub fn events_for_security(&self, security_id: i64) -> Result<Vec<AdjustmentEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT security_id, provider, provider_action_id, action_type, effective_ts,
                   split_price_mult, dividend_price_mult, price_mult,
                   prev_close_date, prev_close, resolution_status, derivation_version
            FROM adjustment_events
            WHERE security_id = ?1
            ORDER BY effective_ts DESC
            "#,
        )?;

        type RawEvent = (
            i64,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            Option<String>,
            Option<String>,
            String,
            String,
        );

        let raw = stmt
            .query_map(params![security_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                    row.get(10)?,
                    row.get(11)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<RawEvent>>>()?;

        raw.into_iter()
            .map(
                |(
                    security_id,
                    provider,
                    provider_action_id,
                    action_type,
                    effective_ts,
                    split_mult,
                    dividend_mult,
                    price_mult,
                    prev_close_date,
                    prev_close,
                    status,
                    derivation_version,
                )| {
                    Ok(AdjustmentEvent {
                        security_id,
                        provider,
                        provider_action_id,
                        action_type: ActionType::parse(&action_type).ok_or_else(|| {
                            anyhow!("unrecognized action_type in adjustment_events: {}", action_type)
                        })?,
                        effective_ts: parse_ts("effective_ts", &effective_ts)?,
                        split_price_mult: parse_decimal("split_price_mult", &split_mult)?,
                        dividend_price_mult: parse_decimal("dividend_price_mult", &dividend_mult)?,
                        price_mult: parse_decimal("price_mult", &price_mult)?,
                        prev_close_date: prev_close_date
                            .as_deref()
                            .map(|s| parse_date("prev_close_date", s))
                            .transpose()?,
                        prev_close: parse_opt_decimal("prev_close", prev_close)?,
                        resolution_status: ResolutionStatus::parse(&status).ok_or_else(|| {
                            anyhow!("unrecognized resolution_status in adjustment_events: {}", status)
                        })?,
                        derivation_version,
                    })
                },
            )
            .collect()
    }

    /// Factor rows for one security, ascending by trade date.
    pub fn factors_for_security(&self, security_id: i64) -> Result<Vec<AdjustmentFactor>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT security_id, trade_date, split_factor, dividend_factor, volume_factor,
                   anchor_date, derivation_version, derived_at
            FROM adjustment_factors_daily
            WHERE security_id = ?1
            ORDER BY trade_date
            "#,
        )?;

        type RawFactor = (i64, String, String, String, String, String, String, String);

        let raw = stmt
            .query_map(params![security_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<RawFactor>>>()?;

        raw.into_iter()
            .map(
                |(
                    security_id,
                    trade_date,
                    split_factor,
                    dividend_factor,
                    volume_factor,
                    anchor_date,
                    derivation_version,
                    derived_at,
                )| {
                    Ok(AdjustmentFactor {
                        security_id,
                        trade_date: parse_date("trade_date", &trade_date)?,
                        split_factor: parse_decimal("split_factor", &split_factor)?,
                        dividend_factor: parse_decimal("dividend_factor", &dividend_factor)?,
                        volume_factor: parse_decimal("volume_factor", &volume_factor)?,
                        anchor_date: parse_date("anchor_date", &anchor_date)?,
                        derivation_version,
                        derived_at: parse_ts("derived_at", &derived_at)?,
                    })
                },
            )
            .collect()
    }

    /// Total rows in `adjustment_events`.
    pub fn count_adjustment_events(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row("SELECT COUNT(*) FROM adjustment_events", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Total rows in `adjustment_factors_daily`.
    pub fn count_factor_rows(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM adjustment_factors_daily",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn rollback(conn: &Connection) {
        if let Err(e) = conn.execute("ROLLBACK", []) {
            warn!(error = %e, "Rollback failed");
        }
    }
}

// =============================================================================
// COLUMN PARSING
// =============================================================================

fn parse_date(column: &str, s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date in column {}: {:?}", column, s))
}

fn parse_ts(column: &str, s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .with_context(|| format!("invalid timestamp in column {}: {:?}", column, s))
}

fn parse_decimal(column: &str, s: &str) -> Result<Decimal> {
    s.parse::<Decimal>()
        .with_context(|| format!("invalid decimal in column {}: {:?}", column, s))
}

fn parse_opt_decimal(column: &str, raw: Option<String>) -> Result<Option<Decimal>> {
    raw.as_deref().map(|s| parse_decimal(column, s)).transpose()
}

// =============================================================================
// TESTS
// =============================================================================
