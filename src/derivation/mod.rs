//! Adjustment Factor Derivation
//!
//! Derives split- and dividend-adjustment factors from raw corporate
//! actions and daily price history. Factors are anchored at the latest
//! trade date of each security (factor 1.0 there) and walk backward in
//! time, compounding one multiplier per corporate action event.
//!
//! Components:
//! - `models`: domain records (actions, price bars, events, factor rows)
//! - `store`: SQLite-backed market store with schema and upsert/read API
//! - `resolver`: corporate action -> adjustment event resolution
//! - `accumulator`: backward per-security factor fold
//! - `validate`: SQL invariant batteries over raw and derived tables
//! - `rebuild`: orchestration, truncate-and-rebuild with run summary

pub mod accumulator;
pub mod models;
pub mod rebuild;
pub mod resolver;
pub mod store;
pub mod validate;

#[cfg(test)]
mod resolver_tests;

pub use accumulator::{accumulate_security, FactorAccumulator};
pub use models::{
    ActionType, AdjustmentEvent, AdjustmentFactor, CorporateAction, PriceBar, ResolutionStatus,
    Security, DERIVATION_VERSION,
};
pub use rebuild::{run_rebuild, RebuildConfig, RebuildSummary};
pub use resolver::{resolve_actions, ResolvedEvents, ResolverStats};
pub use store::{ActionWriteStats, MarketStore};
pub use validate::{
    validate_adjustment_factors, validate_corporate_actions, CheckResult, Severity,
    ValidationReport, DEFAULT_MAX_SAMPLES,
};
