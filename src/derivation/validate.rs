//! Invariant Validation
//!
//! Read-only check batteries over the derivation's tables. Two surfaces:
//!
//! - [`validate_corporate_actions`]: preconditions over the raw action
//!   table; all hard, and a rebuild refuses to run while any fail.
//! - [`validate_adjustment_factors`]: the post-rebuild battery over
//!   `adjustment_factors_daily`; run strictly after the rebuild commits.
//!
//! Every check reports an identifier, a violation count, a bounded sample
//! of offending rows, and a remediation hint. A check fails iff its
//! violation count is nonzero. Severity is first-class: hard checks gate
//! trust, advisory checks report without blocking promotion.

use crate::derivation::store::MarketStore;
use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Bound on diagnostic sample rows per check.
pub const DEFAULT_MAX_SAMPLES: usize = 20;

// =============================================================================
// REPORT MODEL
// =============================================================================

/// Whether a failing check blocks trust or only warns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Hard,
    Advisory,
}

/// Outcome of a single check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_id: String,
    pub description: String,
    pub severity: Severity,
    pub passed: bool,
    pub violations: i64,
    /// Offending rows as column-keyed JSON objects, at most the
    /// requested sample bound. Empty when the check passes.
    pub sample_rows: Vec<serde_json::Value>,
    pub hint: String,
}

/// Full battery result. `passed` considers hard checks only; advisory
/// findings are surfaced through [`Self::advisory_warnings`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub target: String,
    pub passed: bool,
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    fn from_checks(target: &str, checks: Vec<CheckResult>) -> Self {
        let passed = checks
            .iter()
            .filter(|c| c.severity == Severity::Hard)
            .all(|c| c.passed);
        Self {
            target: target.to_string(),
            passed,
            checks,
        }
    }

    /// Hard checks that failed.
    pub fn hard_failures(&self) -> Vec<&CheckResult> {
        self.checks
            .iter()
            .filter(|c| c.severity == Severity::Hard && !c.passed)
            .collect()
    }

    /// Advisory checks that fired.
    pub fn advisory_warnings(&self) -> Vec<&CheckResult> {
        self.checks
            .iter()
            .filter(|c| c.severity == Severity::Advisory && !c.passed)
            .collect()
    }

    /// Format as compact summary.
    pub fn format_summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("=== VALIDATION: {} ===\n", self.target));
        out.push_str(&format!(
            "Status: {}\n",
            if self.passed { "PASS" } else { "FAIL" }
        ));

        for check in &self.checks {
            let status = if check.passed {
                "PASS"
            } else if check.severity == Severity::Advisory {
                "WARN"
            } else {
                "FAIL"
            };
            out.push_str(&format!(
                "[{}] {} - {}\n",
                status, check.check_id, check.description
            ));
            if !check.passed {
                out.push_str(&format!("    violations: {}\n", check.violations));
                out.push_str(&format!("    hint: {}\n", check.hint));
                if let Some(sample) = check.sample_rows.first() {
                    out.push_str(&format!("    sample: {}\n", sample));
                }
            }
        }

        out
    }
}

// =============================================================================
// CHECK RUNNER
// =============================================================================

struct CheckSpec<'a> {
    check_id: &'a str,
    description: &'a str,
    severity: Severity,
    count_sql: &'a str,
    sample_sql: &'a str,
    hint: &'a str,
}

fn run_check(conn: &Connection, spec: &CheckSpec<'_>, max_samples: usize) -> Result<CheckResult> {
    let violations: i64 = conn
        .query_row(spec.count_sql, [], |row| row.get(0))
        .with_context(|| format!("violation count query failed for {}", spec.check_id))?;

    let sample_rows = if violations > 0 {
        fetch_sample_rows(conn, spec.sample_sql, max_samples)
            .with_context(|| format!("sample query failed for {}", spec.check_id))?
    } else {
        Vec::new()
    };

    Ok(CheckResult {
        check_id: spec.check_id.to_string(),
        description: spec.description.to_string(),
        severity: spec.severity,
        passed: violations == 0,
        violations,
        sample_rows,
        hint: spec.hint.to_string(),
    })
}

fn fetch_sample_rows(
    conn: &Connection,
    sample_sql: &str,
    max_samples: usize,
) -> Result<Vec<serde_json::Value>> {
    let limited = format!("{} LIMIT {}", sample_sql, max_samples);
    let mut stmt = conn.prepare(&limited)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let rows = stmt
        .query_map([], |row| {
            let mut obj = serde_json::Map::new();
            for (i, column) in columns.iter().enumerate() {
                let value = match row.get_ref(i)? {
                    ValueRef::Null => serde_json::Value::Null,
                    ValueRef::Integer(n) => serde_json::Value::from(n),
                    ValueRef::Real(f) => serde_json::Value::from(f),
                    ValueRef::Text(t) => {
                        serde_json::Value::from(String::from_utf8_lossy(t).into_owned())
                    }
                    ValueRef::Blob(_) => serde_json::Value::from("<blob>"),
                };
                obj.insert(column.clone(), value);
            }
            Ok(serde_json::Value::Object(obj))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

// =============================================================================
// RAW CORPORATE ACTION PRECONDITIONS
// =============================================================================

/// Preconditions over raw `corporate_actions`. All hard; a rebuild must
/// not run while any fail. The store's upsert key makes duplicates
/// impossible through the write API; these guard external writers and
/// schema drift.
pub fn validate_corporate_actions(
    store: &MarketStore,
    max_samples: usize,
) -> Result<ValidationReport> {
    store.with_connection(|conn| {
        let checks = vec![
            run_check(
                conn,
                &CheckSpec {
                    check_id: "CA_01_NO_ORPHANS",
                    description: "Every corporate action's security_id exists in securities",
                    severity: Severity::Hard,
                    count_sql: r#"
                        SELECT COUNT(*)
                        FROM corporate_actions ca
                        LEFT JOIN securities s
                          ON s.security_id = ca.security_id
                        WHERE s.security_id IS NULL
                    "#,
                    sample_sql: r#"
                        SELECT ca.provider, ca.provider_action_id, ca.security_id,
                               ca.action_type, ca.action_date
                        FROM corporate_actions ca
                        LEFT JOIN securities s
                          ON s.security_id = ca.security_id
                        WHERE s.security_id IS NULL
                        ORDER BY ca.security_id, ca.action_date
                    "#,
                    hint: "An action references a security missing from the master table. Fix security universe linkage before deriving.",
                },
                max_samples,
            )?,
            run_check(
                conn,
                &CheckSpec {
                    check_id: "CA_02_PROVIDER_ID_PRESENT",
                    description: "No corporate action has a missing provider_action_id",
                    severity: Severity::Hard,
                    count_sql: r#"
                        SELECT COUNT(*)
                        FROM corporate_actions
                        WHERE provider_action_id IS NULL OR provider_action_id = ''
                    "#,
                    sample_sql: r#"
                        SELECT provider, security_id, action_type, action_date
                        FROM corporate_actions
                        WHERE provider_action_id IS NULL OR provider_action_id = ''
                        ORDER BY provider, security_id, action_date
                    "#,
                    hint: "Event identity must exist for upsert idempotency. Drop or re-key the offending rows.",
                },
                max_samples,
            )?,
            run_check(
                conn,
                &CheckSpec {
                    check_id: "CA_03_NO_DUPLICATE_PROVIDER_IDS",
                    description: "No two corporate actions share (provider, provider_action_id)",
                    severity: Severity::Hard,
                    count_sql: r#"
                        SELECT COUNT(*) FROM (
                            SELECT provider, provider_action_id
                            FROM corporate_actions
                            GROUP BY provider, provider_action_id
                            HAVING COUNT(*) > 1
                        )
                    "#,
                    sample_sql: r#"
                        SELECT provider, provider_action_id, COUNT(*) AS count_rows
                        FROM corporate_actions
                        GROUP BY provider, provider_action_id
                        HAVING COUNT(*) > 1
                        ORDER BY count_rows DESC, provider, provider_action_id
                    "#,
                    hint: "Duplicate provider identities must collapse via upsert before resolution. Enforce the (provider, provider_action_id) key.",
                },
                max_samples,
            )?,
        ];

        Ok(ValidationReport::from_checks("corporate_actions", checks))
    })
}

// =============================================================================
// FACTOR TABLE INVARIANTS
// =============================================================================

/// The post-rebuild battery over `adjustment_factors_daily`.
///
/// If the table itself is missing, that single failure is returned and
/// the remaining checks are skipped (they could only error).
pub fn validate_adjustment_factors(
    store: &MarketStore,
    max_samples: usize,
) -> Result<ValidationReport> {
    store.with_connection(|conn| {
        let table_exists = run_check(
            conn,
            &CheckSpec {
                check_id: "AFD_01_TABLE_EXISTS",
                description: "adjustment_factors_daily table exists",
                severity: Severity::Hard,
                count_sql: r#"
                    SELECT CASE WHEN EXISTS (
                        SELECT 1 FROM sqlite_master
                        WHERE type = 'table' AND name = 'adjustment_factors_daily'
                    ) THEN 0 ELSE 1 END
                "#,
                sample_sql: "SELECT 'missing_table' AS problem",
                hint: "Open the store through MarketStore::open so the schema is applied.",
            },
            max_samples,
        )?;

        if !table_exists.passed {
            return Ok(ValidationReport::from_checks(
                "adjustment_factors_daily",
                vec![table_exists],
            ));
        }

        let mut checks = vec![table_exists];

        checks.push(run_check(
            conn,
            &CheckSpec {
                check_id: "AFD_02_NO_DUPLICATES",
                description: "No duplicate rows for (security_id, trade_date)",
                severity: Severity::Hard,
                count_sql: r#"
                    SELECT COUNT(*) FROM (
                        SELECT security_id, trade_date
                        FROM adjustment_factors_daily
                        GROUP BY security_id, trade_date
                        HAVING COUNT(*) > 1
                    )
                "#,
                sample_sql: r#"
                    SELECT security_id, trade_date, COUNT(*) AS count_rows
                    FROM adjustment_factors_daily
                    GROUP BY security_id, trade_date
                    HAVING COUNT(*) > 1
                    ORDER BY count_rows DESC, security_id, trade_date
                "#,
                hint: "Enforce uniqueness with the primary key and keep the rebuild idempotent.",
            },
            max_samples,
        )?);

        checks.push(run_check(
            conn,
            &CheckSpec {
                check_id: "AFD_03_FK_SECURITIES",
                description: "All security_id in factors exist in securities",
                severity: Severity::Hard,
                count_sql: r#"
                    SELECT COUNT(*)
                    FROM adjustment_factors_daily f
                    LEFT JOIN securities s
                      ON s.security_id = f.security_id
                    WHERE s.security_id IS NULL
                "#,
                sample_sql: r#"
                    SELECT f.security_id,
                           MIN(f.trade_date) AS first_date,
                           MAX(f.trade_date) AS last_date,
                           COUNT(*) AS count_rows
                    FROM adjustment_factors_daily f
                    LEFT JOIN securities s
                      ON s.security_id = f.security_id
                    WHERE s.security_id IS NULL
                    GROUP BY f.security_id
                    ORDER BY count_rows DESC, f.security_id
                "#,
                hint: "The rebuild produced factors for a security_id missing from the master table. Fix security universe linkage.",
            },
            max_samples,
        )?);

        checks.push(run_check(
            conn,
            &CheckSpec {
                check_id: "AFD_04_SUBSET_OF_PRICES",
                description: "Every (security_id, trade_date) in factors exists in price_bars",
                severity: Severity::Hard,
                count_sql: r#"
                    SELECT COUNT(*)
                    FROM adjustment_factors_daily f
                    LEFT JOIN price_bars p
                      ON p.security_id = f.security_id
                     AND p.trade_date = f.trade_date
                    WHERE p.security_id IS NULL
                "#,
                sample_sql: r#"
                    SELECT f.security_id, f.trade_date, f.split_factor, f.dividend_factor
                    FROM adjustment_factors_daily f
                    LEFT JOIN price_bars p
                      ON p.security_id = f.security_id
                     AND p.trade_date = f.trade_date
                    WHERE p.security_id IS NULL
                    ORDER BY f.security_id, f.trade_date
                "#,
                hint: "Factor dates must come from price history (calendar mismatch or off-by-one effective date mapping).",
            },
            max_samples,
        )?);

        checks.push(run_check(
            conn,
            &CheckSpec {
                check_id: "AFD_05_COVERAGE_PARITY",
                description: "For each security, factor row count matches price bar count",
                severity: Severity::Hard,
                count_sql: r#"
                    SELECT COUNT(*) FROM (
                        SELECT p.security_id
                        FROM (
                            SELECT security_id, COUNT(*) AS n_prices
                            FROM price_bars
                            GROUP BY security_id
                        ) p
                        LEFT JOIN (
                            SELECT security_id, COUNT(*) AS n_factors
                            FROM adjustment_factors_daily
                            GROUP BY security_id
                        ) f
                          ON f.security_id = p.security_id
                        WHERE COALESCE(f.n_factors, 0) <> p.n_prices
                    )
                "#,
                sample_sql: r#"
                    SELECT p.security_id, p.n_prices, COALESCE(f.n_factors, 0) AS n_factors
                    FROM (
                        SELECT security_id, COUNT(*) AS n_prices
                        FROM price_bars
                        GROUP BY security_id
                    ) p
                    LEFT JOIN (
                        SELECT security_id, COUNT(*) AS n_factors
                        FROM adjustment_factors_daily
                        GROUP BY security_id
                    ) f
                      ON f.security_id = p.security_id
                    WHERE COALESCE(f.n_factors, 0) <> p.n_prices
                    ORDER BY p.security_id
                "#,
                hint: "Factors must cover exactly one row per trading day for every security with prices. Rebuild for the missing days.",
            },
            max_samples,
        )?);

        checks.push(run_check(
            conn,
            &CheckSpec {
                check_id: "AFD_06_FACTOR_POSITIVE",
                description: "split_factor and dividend_factor are non-null and strictly > 0",
                severity: Severity::Hard,
                count_sql: r#"
                    SELECT COUNT(*)
                    FROM adjustment_factors_daily
                    WHERE split_factor IS NULL
                       OR dividend_factor IS NULL
                       OR CAST(split_factor AS REAL) <= 0
                       OR CAST(dividend_factor AS REAL) <= 0
                "#,
                sample_sql: r#"
                    SELECT security_id, trade_date, split_factor, dividend_factor
                    FROM adjustment_factors_daily
                    WHERE split_factor IS NULL
                       OR dividend_factor IS NULL
                       OR CAST(split_factor AS REAL) <= 0
                       OR CAST(dividend_factor AS REAL) <= 0
                    ORDER BY security_id, trade_date
                "#,
                hint: "Factors must be > 0. Null/zero/negative indicates a broken event multiplier (split ratio or dividend math).",
            },
            max_samples,
        )?);

        checks.push(run_check(
            conn,
            &CheckSpec {
                check_id: "AFD_07_ANCHOR_NORMALIZED",
                description: "Latest trade date per security has all factors = 1.0 (within tolerance)",
                severity: Severity::Hard,
                count_sql: r#"
                    WITH latest AS (
                        SELECT security_id, MAX(trade_date) AS max_date
                        FROM adjustment_factors_daily
                        GROUP BY security_id
                    )
                    SELECT COUNT(*)
                    FROM latest l
                    JOIN adjustment_factors_daily f
                      ON f.security_id = l.security_id
                     AND f.trade_date = l.max_date
                    WHERE ABS(CAST(f.split_factor AS REAL) - 1.0) > 1e-12
                       OR ABS(CAST(f.dividend_factor AS REAL) - 1.0) > 1e-12
                       OR ABS(CAST(f.volume_factor AS REAL) - 1.0) > 1e-12
                "#,
                sample_sql: r#"
                    WITH latest AS (
                        SELECT security_id, MAX(trade_date) AS max_date
                        FROM adjustment_factors_daily
                        GROUP BY security_id
                    )
                    SELECT f.security_id, f.trade_date,
                           f.split_factor, f.dividend_factor, f.volume_factor
                    FROM latest l
                    JOIN adjustment_factors_daily f
                      ON f.security_id = l.security_id
                     AND f.trade_date = l.max_date
                    WHERE ABS(CAST(f.split_factor AS REAL) - 1.0) > 1e-12
                       OR ABS(CAST(f.dividend_factor AS REAL) - 1.0) > 1e-12
                       OR ABS(CAST(f.volume_factor AS REAL) - 1.0) > 1e-12
                    ORDER BY f.security_id
                "#,
                hint: "Backward adjustment anchors the latest factor at exactly 1.0. A different anchor means misordered traversal.",
            },
            max_samples,
        )?);

        checks.push(run_check(
            conn,
            &CheckSpec {
                check_id: "AFD_08_PIECEWISE_CONSTANT_HEURISTIC",
                description: "Heuristic: day-to-day factor changes should be rare (< 5% of rows)",
                severity: Severity::Advisory,
                count_sql: r#"
                    WITH deltas AS (
                        SELECT
                            security_id,
                            trade_date,
                            CAST(split_factor AS REAL) * CAST(dividend_factor AS REAL) AS price_factor,
                            LAG(CAST(split_factor AS REAL) * CAST(dividend_factor AS REAL))
                                OVER (PARTITION BY security_id ORDER BY trade_date) AS prev_factor
                        FROM adjustment_factors_daily
                    ),
                    changes AS (
                        SELECT security_id, trade_date
                        FROM deltas
                        WHERE prev_factor IS NOT NULL
                          AND ABS(price_factor - prev_factor) > 1e-12
                    ),
                    counts AS (
                        SELECT
                            (SELECT COUNT(*) FROM changes) AS n_changes,
                            (SELECT COUNT(*) FROM adjustment_factors_daily) AS n_total
                    )
                    SELECT CASE
                        WHEN (SELECT n_total FROM counts) = 0 THEN 0
                        WHEN CAST((SELECT n_changes FROM counts) AS REAL)
                             / CAST((SELECT n_total FROM counts) AS REAL) > 0.05 THEN 1
                        ELSE 0
                    END
                "#,
                sample_sql: r#"
                    WITH deltas AS (
                        SELECT
                            security_id,
                            trade_date,
                            CAST(split_factor AS REAL) * CAST(dividend_factor AS REAL) AS price_factor,
                            LAG(CAST(split_factor AS REAL) * CAST(dividend_factor AS REAL))
                                OVER (PARTITION BY security_id ORDER BY trade_date) AS prev_factor
                        FROM adjustment_factors_daily
                    )
                    SELECT security_id, trade_date, prev_factor, price_factor
                    FROM deltas
                    WHERE prev_factor IS NOT NULL
                      AND ABS(price_factor - prev_factor) > 1e-12
                    ORDER BY security_id, trade_date
                "#,
                hint: "More than 5% of rows changing factor suggests double-compounding or date misalignment. With genuinely frequent distributions, loosen the threshold.",
            },
            max_samples,
        )?);

        Ok(ValidationReport::from_checks(
            "adjustment_factors_daily",
            checks,
        ))
    })
}
