//! Event Resolver
//!
//! Converts each raw corporate action into a canonical adjustment event
//! carrying a per-event price multiplier and a resolution status. Every
//! action of a recognized type emits exactly one event regardless of
//! resolution outcome; failed resolution is recorded in the event row,
//! never dropped, so audits can see why a date has no adjustment effect.

use crate::derivation::models::{
    ActionType, AdjustmentEvent, CorporateAction, ResolutionStatus, DERIVATION_VERSION,
};
use crate::derivation::store::MarketStore;
use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Per-run resolution counters, surfaced in the rebuild summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverStats {
    pub actions_seen: u64,
    pub events_emitted: u64,
    pub resolved: u64,
    pub missing_prev_close: u64,
    pub bad_prev_close: u64,
    pub unrecognized_skipped: u64,
}

/// Resolver output: the full event set in `(security_id, action_date)`
/// order, plus counters.
#[derive(Debug, Clone)]
pub struct ResolvedEvents {
    pub events: Vec<AdjustmentEvent>,
    pub stats: ResolverStats,
}

/// Resolve every stored corporate action into its adjustment event.
///
/// Unrecognized action types are excluded from event generation; they are
/// counted and logged, not treated as errors. Structural failures (an
/// uncomputable split ratio, a failed lookup) abort the run.
pub fn resolve_actions(store: &MarketStore) -> Result<ResolvedEvents> {
    let actions = store.corporate_actions_ordered()?;

    let mut events = Vec::with_capacity(actions.len());
    let mut stats = ResolverStats::default();

    for action in &actions {
        stats.actions_seen += 1;

        let kind = match action.action_kind() {
            Some(kind) => kind,
            None => {
                stats.unrecognized_skipped += 1;
                warn!(
                    provider = %action.provider,
                    provider_action_id = %action.provider_action_id,
                    action_type = %action.action_type,
                    "Skipping corporate action of unsupported type"
                );
                continue;
            }
        };

        let event = resolve_action(store, action, kind)?;

        match event.resolution_status {
            ResolutionStatus::Resolved => stats.resolved += 1,
            ResolutionStatus::MissingPrevClose => {
                stats.missing_prev_close += 1;
                warn!(
                    security_id = action.security_id,
                    provider_action_id = %action.provider_action_id,
                    "Dividend has no earlier price bar; neutral multiplier recorded"
                );
            }
            ResolutionStatus::BadPrevClose => {
                stats.bad_prev_close += 1;
                warn!(
                    security_id = action.security_id,
                    provider_action_id = %action.provider_action_id,
                    "Unusable previous close for dividend; neutral multiplier recorded"
                );
            }
        }

        events.push(event);
        stats.events_emitted += 1;
    }

    debug!(
        actions = stats.actions_seen,
        events = stats.events_emitted,
        "Corporate actions resolved"
    );

    Ok(ResolvedEvents { events, stats })
}

/// Resolve a single action of a known kind.
///
/// Splits need no price data; dividends look up the most recent close
/// strictly before the ex-date for the same security.
pub fn resolve_action(
    store: &MarketStore,
    action: &CorporateAction,
    kind: ActionType,
) -> Result<AdjustmentEvent> {
    let mut split_mult = Decimal::ONE;
    let mut dividend_mult = Decimal::ONE;
    let mut prev_close_date = None;
    let mut prev_close = None;
    let mut status = ResolutionStatus::Resolved;

    match kind {
        ActionType::Split => {
            // value_num / value_den is new shares per old share; the
            // price multiplier is the inverse. A missing ratio leg leaves
            // the multiplier at 1 and the event is still emitted.
            if let (Some(num), Some(den)) = (action.value_num, action.value_den) {
                split_mult = den.checked_div(num).ok_or_else(|| {
                    anyhow!(
                        "split ratio {}:{} of action {}:{} does not yield a multiplier",
                        num,
                        den,
                        action.provider,
                        action.provider_action_id
                    )
                })?;
            }
        }
        ActionType::Dividend => {
            let lookup = store
                .prev_close_before(action.security_id, action.action_date)
                .with_context(|| {
                    format!(
                        "previous-close lookup failed for action {}:{}",
                        action.provider, action.provider_action_id
                    )
                })?;

            match lookup {
                None => status = ResolutionStatus::MissingPrevClose,
                Some((date, close)) => {
                    prev_close_date = Some(date);
                    prev_close = Some(close);
                    match action.cash_amount {
                        Some(cash) if close > Decimal::ZERO => {
                            dividend_mult = close
                                .checked_sub(cash)
                                .and_then(|net| net.checked_div(close))
                                .ok_or_else(|| {
                                    anyhow!(
                                        "dividend cash {} against close {} of action {}:{} does not yield a multiplier",
                                        cash,
                                        close,
                                        action.provider,
                                        action.provider_action_id
                                    )
                                })?;
                        }
                        _ => status = ResolutionStatus::BadPrevClose,
                    }
                }
            }
        }
    }

    Ok(AdjustmentEvent {
        security_id: action.security_id,
        provider: action.provider.clone(),
        provider_action_id: action.provider_action_id.clone(),
        action_type: kind,
        effective_ts: action.effective_ts(),
        split_price_mult: split_mult,
        dividend_price_mult: dividend_mult,
        price_mult: split_mult * dividend_mult,
        prev_close_date,
        prev_close,
        resolution_status: status,
        derivation_version: DERIVATION_VERSION.to_string(),
    })
}
