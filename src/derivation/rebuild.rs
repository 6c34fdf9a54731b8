//! Rebuild Orchestration
//!
//! Ties the pipeline together: precondition battery over raw actions,
//! event resolution, per-security backward folds, the atomic swap of both
//! derived tables, and the post-commit invariant battery. Produces the
//! machine-readable [`RebuildSummary`] the orchestration layer uses to
//! decide whether the derived tables may be promoted.

use crate::derivation::accumulator::accumulate_security;
use crate::derivation::models::{AdjustmentEvent, AdjustmentFactor, DERIVATION_VERSION};
use crate::derivation::resolver::resolve_actions;
use crate::derivation::store::MarketStore;
use crate::derivation::validate::{
    validate_adjustment_factors, validate_corporate_actions, ValidationReport, DEFAULT_MAX_SAMPLES,
};
use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveDateTime, Timelike, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, warn};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Rebuild settings, from the environment with defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildConfig {
    /// Path to the market database.
    pub db_path: String,
    /// Bound on diagnostic sample rows per validation check.
    pub max_samples: usize,
    /// Fold securities on the rayon pool instead of sequentially.
    pub parallel: bool,
}

impl RebuildConfig {
    pub fn from_env() -> Self {
        let db_path =
            std::env::var("ADJUST_DB_PATH").unwrap_or_else(|_| "./market.db".to_string());

        let max_samples = std::env::var("ADJUST_MAX_SAMPLES")
            .unwrap_or_else(|_| DEFAULT_MAX_SAMPLES.to_string())
            .parse()
            .unwrap_or(DEFAULT_MAX_SAMPLES);

        let parallel = std::env::var("ADJUST_PARALLEL")
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        Self {
            db_path,
            max_samples,
            parallel,
        }
    }
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            db_path: "./market.db".to_string(),
            max_samples: DEFAULT_MAX_SAMPLES,
            parallel: true,
        }
    }
}

// =============================================================================
// RUN SUMMARY
// =============================================================================

/// Machine-readable outcome of one rebuild run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildSummary {
    /// False when the precondition battery failed and the derived tables
    /// were left untouched.
    pub rebuild_executed: bool,
    pub securities_processed: u64,
    pub actions_seen: u64,
    pub events_derived: u64,
    pub events_resolved: u64,
    pub events_missing_prev_close: u64,
    pub events_bad_prev_close: u64,
    pub actions_skipped_unrecognized: u64,
    pub factor_rows_written: u64,
    /// Latest trade date across all securities at rebuild time.
    pub anchor_date_max: Option<NaiveDate>,
    pub derivation_version: String,
    pub elapsed_ms: u64,
    pub preconditions: ValidationReport,
    /// Post-commit factor battery; absent when the rebuild was skipped.
    pub validation: Option<ValidationReport>,
}

impl RebuildSummary {
    /// Whether the derived tables may be promoted: the rebuild ran and
    /// every hard check on both batteries passed.
    pub fn trusted(&self) -> bool {
        self.rebuild_executed
            && self.preconditions.passed
            && self.validation.as_ref().map(|v| v.passed).unwrap_or(false)
    }

    /// Format as compact summary.
    pub fn format_summary(&self) -> String {
        let mut out = String::new();
        out.push_str("=== ADJUSTMENT FACTOR REBUILD ===\n");
        out.push_str(&format!(
            "Status: {}\n",
            if self.trusted() { "TRUSTED" } else { "UNTRUSTED" }
        ));
        match self.anchor_date_max {
            Some(date) => out.push_str(&format!("Latest trade date: {}\n", date)),
            None => out.push_str("Latest trade date: n/a\n"),
        }
        out.push_str(&format!("Securities: {}\n", self.securities_processed));
        out.push_str(&format!(
            "Actions: {} (unrecognized skipped: {})\n",
            self.actions_seen, self.actions_skipped_unrecognized
        ));
        out.push_str(&format!(
            "Events: {} (resolved: {}, missing prev close: {}, bad prev close: {})\n",
            self.events_derived,
            self.events_resolved,
            self.events_missing_prev_close,
            self.events_bad_prev_close
        ));
        out.push_str(&format!("Factor rows: {}\n", self.factor_rows_written));
        out.push_str(&format!("Derivation version: {}\n", self.derivation_version));
        out.push_str(&format!("Elapsed: {}ms\n\n", self.elapsed_ms));
        out.push_str(&self.preconditions.format_summary());
        if let Some(validation) = &self.validation {
            out.push('\n');
            out.push_str(&validation.format_summary());
        }
        out
    }
}

// =============================================================================
// REBUILD
// =============================================================================

/// Run the full truncate-and-rebuild derivation against an open store.
///
/// Both derived tables are replaced inside one transaction; any failure
/// mid-rebuild rolls back and surfaces as an error. Data-quality
/// degradations (unresolvable dividends, unsupported action types) never
/// abort the run; they are recorded in the event rows and counted here.
pub fn run_rebuild(store: &MarketStore, config: &RebuildConfig) -> Result<RebuildSummary> {
    let started = Instant::now();

    // Raw actions must be clean before the derivation is allowed to run.
    let preconditions = validate_corporate_actions(store, config.max_samples)?;
    if !preconditions.passed {
        warn!(
            failures = preconditions.hard_failures().len(),
            "Corporate action preconditions failed; rebuild skipped"
        );
        return Ok(skipped_summary(preconditions, started));
    }

    // Structural guards: the rebuild cannot anchor without price history.
    let anchor_date_max = match store.max_trade_date()? {
        Some(date) => date,
        None => bail!("price_bars is empty; rebuild has nothing to anchor against"),
    };
    if let Some((security_id, action_count)) = store.actions_without_price_history()?.first() {
        bail!(
            "security {} has {} corporate actions but no price bars; rebuild cannot anchor it",
            security_id,
            action_count
        );
    }

    info!(anchor = %anchor_date_max, "Anchor will be based on latest trade date");

    let resolved = resolve_actions(store)?;

    // Group events per security, descending by effective_ts for the walk.
    let mut events_by_security: HashMap<i64, Vec<AdjustmentEvent>> = HashMap::new();
    for event in &resolved.events {
        events_by_security
            .entry(event.security_id)
            .or_default()
            .push(event.clone());
    }
    for events in events_by_security.values_mut() {
        events.sort_by(|a, b| b.effective_ts.cmp(&a.effective_ts));
    }

    let security_ids = store.security_ids_with_prices()?;
    let mut inputs = Vec::with_capacity(security_ids.len());
    for &security_id in &security_ids {
        let trade_dates = store.trade_dates_desc(security_id)?;
        let events = events_by_security.remove(&security_id).unwrap_or_default();
        inputs.push((security_id, trade_dates, events));
    }

    let derived_at = utc_now_seconds();

    // Securities share no accumulator state; fold them in parallel.
    let per_security: Vec<Vec<AdjustmentFactor>> = if config.parallel {
        inputs
            .par_iter()
            .map(|(security_id, trade_dates, events)| {
                accumulate_security(*security_id, trade_dates, events, derived_at)
            })
            .collect::<Result<_>>()?
    } else {
        inputs
            .iter()
            .map(|(security_id, trade_dates, events)| {
                accumulate_security(*security_id, trade_dates, events, derived_at)
            })
            .collect::<Result<_>>()?
    };

    let factors: Vec<AdjustmentFactor> = per_security.into_iter().flatten().collect();

    let (events_written, factor_rows_written) = store.replace_derived(&resolved.events, &factors)?;
    info!(
        events = events_written,
        factor_rows = factor_rows_written,
        "Derived tables rebuilt"
    );

    // The battery runs strictly after the rebuild transaction commits.
    let validation = validate_adjustment_factors(store, config.max_samples)?;
    if !validation.passed {
        warn!(
            failures = validation.hard_failures().len(),
            "Factor invariants failed; derived data must not be promoted"
        );
    }
    for advisory in validation.advisory_warnings() {
        warn!(
            check = %advisory.check_id,
            violations = advisory.violations,
            "Advisory validation finding"
        );
    }

    let stats = &resolved.stats;
    Ok(RebuildSummary {
        rebuild_executed: true,
        securities_processed: security_ids.len() as u64,
        actions_seen: stats.actions_seen,
        events_derived: events_written as u64,
        events_resolved: stats.resolved,
        events_missing_prev_close: stats.missing_prev_close,
        events_bad_prev_close: stats.bad_prev_close,
        actions_skipped_unrecognized: stats.unrecognized_skipped,
        factor_rows_written: factor_rows_written as u64,
        anchor_date_max: Some(anchor_date_max),
        derivation_version: DERIVATION_VERSION.to_string(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        preconditions,
        validation: Some(validation),
    })
}

fn skipped_summary(preconditions: ValidationReport, started: Instant) -> RebuildSummary {
    RebuildSummary {
        rebuild_executed: false,
        securities_processed: 0,
        actions_seen: 0,
        events_derived: 0,
        events_resolved: 0,
        events_missing_prev_close: 0,
        events_bad_prev_close: 0,
        actions_skipped_unrecognized: 0,
        factor_rows_written: 0,
        anchor_date_max: None,
        derivation_version: DERIVATION_VERSION.to_string(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        preconditions,
        validation: None,
    }
}

// Stored timestamps carry second precision; stamp rows the same way so
// in-memory and read-back rows compare equal.
fn utc_now_seconds() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}
