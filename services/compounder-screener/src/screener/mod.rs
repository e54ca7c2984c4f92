//! Compounder screener module.
//!
//! Turns snapshots into scored, filtered and ranked compounder rows.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         ScreenerEngine                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  TickerUniverse ──▶ WorkerPool (W workers)                       │
//! │                        │                                         │
//! │                        ▼                                         │
//! │          SnapshotCache::get_or_fetch ──▶ RetryingFetcher         │
//! │                        │                                         │
//! │                        ▼                                         │
//! │   CompounderRow (growth, ROIC, FCF, buybacks, DCF, score)        │
//! │                        │                                         │
//! │                        ▼                                         │
//! │   FilterEvaluator ──▶ rank by score ──▶ top N                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use compounder_screener::screener::ScreenerEngine;
//!
//! let engine = ScreenerEngine::new(config.screener, config.filters, cache, fetcher, universe);
//! let result = engine.run().await?;
//! println!("{}", result.summary());
//! ```

pub mod compounder;
pub mod engine;
pub mod quantitative;

pub use compounder::CompounderRow;
pub use engine::{Diagnostic, ScreenResult, ScreenerEngine};
pub use quantitative::{
    CheckDetail, Comparison, Criterion, CriterionCheck, FilterEvaluator, FilterOutcome,
    QualityScorer, ScoreBreakdown,
};
