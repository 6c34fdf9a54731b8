//! Adjustment Factor Derivation Engine
//!
//! Consumes raw corporate actions (splits, cash dividends) and daily price
//! history, and maintains the derived split/dividend adjustment tables:
//! one canonical adjustment event per action, and one backward-adjusted
//! factor row per trading day per security, anchored at 1.0 on the latest
//! trade date.

pub mod derivation;
