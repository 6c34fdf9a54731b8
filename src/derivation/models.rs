//! Domain records for the adjustment derivation pipeline.
//!
//! Raw inputs (securities, price bars, corporate actions) are owned by the
//! ingestion side and treated as immutable here. Derived records
//! (adjustment events, daily factors) are rebuilt wholesale on every run
//! and stamped with [`DERIVATION_VERSION`].

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tag stamped on every derived row. Bumped whenever the derivation
/// logic changes, so a full rebuild can never mix logic generations.
pub const DERIVATION_VERSION: &str = "v1";

// =============================================================================
// ACTION TYPE
// =============================================================================

/// Corporate action kinds this engine derives adjustments for.
/// Anything else is excluded from event generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Split,
    Dividend,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Split => "SPLIT",
            ActionType::Dividend => "DIVIDEND",
        }
    }

    /// Case-insensitive parse. Providers disagree on casing.
    pub fn parse(s: &str) -> Option<ActionType> {
        if s.eq_ignore_ascii_case("SPLIT") {
            Some(ActionType::Split)
        } else if s.eq_ignore_ascii_case("DIVIDEND") {
            Some(ActionType::Dividend)
        } else {
            None
        }
    }
}

// =============================================================================
// RESOLUTION STATUS
// =============================================================================

/// Outcome of computing an event's multiplier from available data.
///
/// Non-RESOLVED events carry neutral multipliers and stay in the event
/// table so audits can see why a date has no adjustment effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    Resolved,
    MissingPrevClose,
    BadPrevClose,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::Resolved => "RESOLVED",
            ResolutionStatus::MissingPrevClose => "MISSING_PREV_CLOSE",
            ResolutionStatus::BadPrevClose => "BAD_PREV_CLOSE",
        }
    }

    pub fn parse(s: &str) -> Option<ResolutionStatus> {
        match s {
            "RESOLVED" => Some(ResolutionStatus::Resolved),
            "MISSING_PREV_CLOSE" => Some(ResolutionStatus::MissingPrevClose),
            "BAD_PREV_CLOSE" => Some(ResolutionStatus::BadPrevClose),
            _ => None,
        }
    }
}

// =============================================================================
// RAW INPUT RECORDS
// =============================================================================

/// Security master row. Referenced by every other table; the engine
/// reads it for foreign-key validation only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Security {
    pub security_id: i64,
    pub ticker: String,
    pub name: Option<String>,
}

/// One daily OHLCV bar. The derivation reads only `close`; the other
/// fields round-trip so real price feeds can share the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBar {
    pub security_id: i64,
    pub trade_date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Decimal,
    pub volume: Option<i64>,
}

/// Raw corporate action as delivered by a provider.
///
/// `(provider, provider_action_id)` is the global identity; repeated
/// deliveries of the same id collapse via upsert. `action_type` is kept
/// as delivered (uppercased at the write boundary); [`Self::action_kind`]
/// classifies it against the types this engine supports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorporateAction {
    pub security_id: i64,
    pub provider: String,
    pub provider_action_id: String,
    pub action_type: String,
    pub action_date: NaiveDate,
    /// Split ratio numerator (new shares). SPLIT only.
    pub value_num: Option<Decimal>,
    /// Split ratio denominator (old shares). SPLIT only.
    pub value_den: Option<Decimal>,
    /// Cash amount per share. DIVIDEND only.
    pub cash_amount: Option<Decimal>,
    pub currency: Option<String>,
    /// Original provider JSON, kept verbatim for audit.
    pub raw_payload: Option<String>,
}

impl CorporateAction {
    /// Classify the action type, `None` for anything unsupported.
    pub fn action_kind(&self) -> Option<ActionType> {
        ActionType::parse(&self.action_type)
    }

    /// Midnight of the action date, the instant the action takes effect
    /// for the backward walk.
    pub fn effective_ts(&self) -> NaiveDateTime {
        self.action_date.and_time(NaiveTime::MIN)
    }

    /// Write-boundary validation. Returns the canonical action kind, or
    /// the reason the record must be rejected.
    pub fn validate(&self) -> Result<ActionType, String> {
        if self.provider_action_id.trim().is_empty() {
            return Err("missing provider_action_id".to_string());
        }

        match self.action_kind() {
            Some(ActionType::Split) => {
                let (num, den) = match (self.value_num, self.value_den) {
                    (Some(n), Some(d)) => (n, d),
                    _ => return Err("missing split ratio (value_num/value_den)".to_string()),
                };
                if num <= Decimal::ZERO || den <= Decimal::ZERO {
                    return Err(format!("invalid split ratio: {}:{}", num, den));
                }
                Ok(ActionType::Split)
            }
            Some(ActionType::Dividend) => {
                let cash = match self.cash_amount {
                    Some(c) => c,
                    None => return Err("missing cash_amount".to_string()),
                };
                if cash <= Decimal::ZERO {
                    return Err(format!("non-positive cash_amount: {}", cash));
                }
                match &self.currency {
                    Some(c) if !c.trim().is_empty() => Ok(ActionType::Dividend),
                    _ => Err("missing currency".to_string()),
                }
            }
            None => Err(format!("unsupported action_type: {}", self.action_type)),
        }
    }
}

// =============================================================================
// DERIVED RECORDS
// =============================================================================

/// Canonical adjustment event, one per parseable corporate action.
/// Fully rebuilt every run, never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentEvent {
    pub security_id: i64,
    pub provider: String,
    pub provider_action_id: String,
    pub action_type: ActionType,
    pub effective_ts: NaiveDateTime,
    pub split_price_mult: Decimal,
    pub dividend_price_mult: Decimal,
    /// `split_price_mult * dividend_price_mult`.
    pub price_mult: Decimal,
    pub prev_close_date: Option<NaiveDate>,
    pub prev_close: Option<Decimal>,
    pub resolution_status: ResolutionStatus,
    pub derivation_version: String,
}

/// One backward-adjustment factor row per `(security_id, trade_date)`
/// with a price bar. `adjusted_price = raw_price * split_factor *
/// dividend_factor`; `adjusted_volume = raw_volume * volume_factor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentFactor {
    pub security_id: i64,
    pub trade_date: NaiveDate,
    pub split_factor: Decimal,
    pub dividend_factor: Decimal,
    pub volume_factor: Decimal,
    /// The security's most recent trade date at rebuild time.
    pub anchor_date: NaiveDate,
    pub derivation_version: String,
    pub derived_at: NaiveDateTime,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn base_split(num: &str, den: &str) -> CorporateAction {
        CorporateAction {
            security_id: 1,
            provider: "massive".to_string(),
            provider_action_id: "sp-1".to_string(),
            action_type: "SPLIT".to_string(),
            action_date: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            value_num: Some(num.parse().unwrap()),
            value_den: Some(den.parse().unwrap()),
            cash_amount: None,
            currency: None,
            raw_payload: None,
        }
    }

    fn base_dividend(cash: &str) -> CorporateAction {
        CorporateAction {
            security_id: 1,
            provider: "massive".to_string(),
            provider_action_id: "dv-1".to_string(),
            action_type: "DIVIDEND".to_string(),
            action_date: NaiveDate::from_ymd_opt(2023, 5, 31).unwrap(),
            value_num: None,
            value_den: None,
            cash_amount: Some(cash.parse().unwrap()),
            currency: Some("USD".to_string()),
            raw_payload: None,
        }
    }

    #[test]
    fn action_type_parse_is_case_insensitive() {
        assert_eq!(ActionType::parse("split"), Some(ActionType::Split));
        assert_eq!(ActionType::parse("SPLIT"), Some(ActionType::Split));
        assert_eq!(ActionType::parse("Dividend"), Some(ActionType::Dividend));
        assert_eq!(ActionType::parse("MERGER"), None);
    }

    #[test]
    fn resolution_status_round_trips() {
        for status in [
            ResolutionStatus::Resolved,
            ResolutionStatus::MissingPrevClose,
            ResolutionStatus::BadPrevClose,
        ] {
            assert_eq!(ResolutionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ResolutionStatus::parse("resolved"), None);
    }

    #[test]
    fn valid_split_passes() {
        assert_eq!(base_split("2", "1").validate(), Ok(ActionType::Split));
    }

    #[test]
    fn split_rejects_missing_ratio() {
        let mut action = base_split("2", "1");
        action.value_den = None;
        assert!(action.validate().is_err());
    }

    #[test]
    fn split_rejects_non_positive_ratio() {
        assert!(base_split("0", "1").validate().is_err());
        assert!(base_split("2", "-1").validate().is_err());
    }

    #[test]
    fn valid_dividend_passes() {
        assert_eq!(base_dividend("0.24").validate(), Ok(ActionType::Dividend));
    }

    #[test]
    fn dividend_rejects_non_positive_cash() {
        assert!(base_dividend("0").validate().is_err());
        let mut action = base_dividend("0.24");
        action.cash_amount = None;
        assert!(action.validate().is_err());
    }

    #[test]
    fn dividend_rejects_missing_currency() {
        let mut action = base_dividend("0.24");
        action.currency = None;
        assert!(action.validate().is_err());
    }

    #[test]
    fn unsupported_type_rejected_with_reason() {
        let mut action = base_split("2", "1");
        action.action_type = "MERGER".to_string();
        let err = action.validate().unwrap_err();
        assert!(err.contains("MERGER"), "unexpected reason: {}", err);
    }

    #[test]
    fn missing_provider_id_rejected() {
        let mut action = base_split("2", "1");
        action.provider_action_id = "  ".to_string();
        assert!(action.validate().is_err());
    }

    #[test]
    fn effective_ts_is_midnight() {
        let action = base_split("2", "1");
        assert_eq!(
            action.effective_ts().to_string(),
            "2023-06-01 00:00:00".to_string()
        );
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&ResolutionStatus::MissingPrevClose).unwrap();
        assert_eq!(json, "\"MISSING_PREV_CLOSE\"");
    }
}
