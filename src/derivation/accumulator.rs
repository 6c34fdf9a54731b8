//! Factor Accumulator
//!
//! Converts the sparse, event-dated adjustment stream into a dense
//! per-trade-date factor series for one security. The walk runs newest to
//! oldest, compounding event multipliers as it crosses their effective
//! dates; the newest date is emitted before any event is consumed, so the
//! anchor row is 1.0 by construction.
//!
//! This module is pure: no I/O, no shared state across securities, safe
//! to run one fold per security in parallel.

use crate::derivation::models::{AdjustmentEvent, AdjustmentFactor, DERIVATION_VERSION};
use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

/// Accumulation state threaded through one security's backward walk.
/// The cursor only ever advances; each event is applied exactly once.
#[derive(Debug, Clone)]
pub struct FactorAccumulator {
    pub split_factor: Decimal,
    pub dividend_factor: Decimal,
    pub volume_factor: Decimal,
    pub cursor: usize,
}

impl FactorAccumulator {
    pub fn new() -> Self {
        Self {
            split_factor: Decimal::ONE,
            dividend_factor: Decimal::ONE,
            volume_factor: Decimal::ONE,
            cursor: 0,
        }
    }

    /// Apply every not-yet-consumed event dated strictly after
    /// `trade_date`. `events_desc` must be descending by `effective_ts`.
    fn consume_events_after(
        &mut self,
        trade_date: NaiveDate,
        events_desc: &[AdjustmentEvent],
    ) -> Result<()> {
        while let Some(event) = events_desc.get(self.cursor) {
            if event.effective_ts.date() <= trade_date {
                break;
            }
            self.apply(event)?;
            self.cursor += 1;
        }
        Ok(())
    }

    fn apply(&mut self, event: &AdjustmentEvent) -> Result<()> {
        self.split_factor = self
            .split_factor
            .checked_mul(event.split_price_mult)
            .ok_or_else(|| overflow_error("split_factor", event))?;

        self.dividend_factor = self
            .dividend_factor
            .checked_mul(event.dividend_price_mult)
            .ok_or_else(|| overflow_error("dividend_factor", event))?;

        // Volume moves inversely to price splits.
        let inverse = Decimal::ONE
            .checked_div(event.split_price_mult)
            .ok_or_else(|| {
                anyhow!(
                    "split multiplier {} of event {}:{} cannot be inverted for volume",
                    event.split_price_mult,
                    event.provider,
                    event.provider_action_id
                )
            })?;
        self.volume_factor = self
            .volume_factor
            .checked_mul(inverse)
            .ok_or_else(|| overflow_error("volume_factor", event))?;

        Ok(())
    }
}

impl Default for FactorAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

fn overflow_error(factor: &str, event: &AdjustmentEvent) -> anyhow::Error {
    anyhow!(
        "{} overflowed applying event {}:{}",
        factor,
        event.provider,
        event.provider_action_id
    )
}

/// Produce the dense factor series for one security.
///
/// `trade_dates_desc` must be strictly descending (the first element is
/// the anchor date); `events_desc` must be descending by `effective_ts`.
/// A security with no trade dates yields no rows. Events dated on or
/// before the oldest trade date remain unconsumed without error.
pub fn accumulate_security(
    security_id: i64,
    trade_dates_desc: &[NaiveDate],
    events_desc: &[AdjustmentEvent],
    derived_at: NaiveDateTime,
) -> Result<Vec<AdjustmentFactor>> {
    let anchor_date = match trade_dates_desc.first() {
        Some(date) => *date,
        None => return Ok(Vec::new()),
    };

    debug_assert!(trade_dates_desc.windows(2).all(|w| w[0] > w[1]));
    debug_assert!(events_desc
        .windows(2)
        .all(|w| w[0].effective_ts >= w[1].effective_ts));

    let mut acc = FactorAccumulator::new();
    let mut rows = Vec::with_capacity(trade_dates_desc.len());

    for &trade_date in trade_dates_desc {
        acc.consume_events_after(trade_date, events_desc)
            .with_context(|| format!("factor accumulation failed for security {}", security_id))?;

        rows.push(AdjustmentFactor {
            security_id,
            trade_date,
            split_factor: acc.split_factor,
            dividend_factor: acc.dividend_factor,
            volume_factor: acc.volume_factor,
            anchor_date,
            derivation_version: DERIVATION_VERSION.to_string(),
            derived_at,
        });
    }

    Ok(rows)
}
