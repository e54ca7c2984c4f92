//! Valuation module.
//!
//! Growth statistics and the valuation engine behind each compounder row.
//!
//! # Metrics
//!
//! - **Growth**: trend consistency (share of intervals that grew) and CAGR
//! - **ROIC**: latest net income over invested capital
//! - **Free cash flow**: explicit, or operating cash flow net of capex
//! - **Share change**: three-year change in share count (negative = buybacks)
//! - **DCF**: ten-year projection at a clamped growth rate plus a Gordon
//!   terminal value, discounted at 10%
//!
//! # Usage
//!
//! ```ignore
//! use compounder_screener::valuation::ValuationEngine;
//!
//! let engine = ValuationEngine::new();
//! let fcf = engine.free_cash_flow_series(&snapshot);
//! if let Some(dcf) = engine.dcf(&snapshot, &fcf) {
//!     println!("Intrinsic value: {:.2}", dcf.intrinsic_value);
//! }
//! ```

pub mod analyzer;
pub mod growth;
pub mod types;

pub use analyzer::ValuationEngine;
pub use growth::growth_stats;
pub use types::{DcfConfig, DcfValuation, GrowthStats};
