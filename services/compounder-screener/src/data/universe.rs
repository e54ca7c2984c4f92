//! Ticker universes.
//!
//! A universe maps a market selector ("us", "th") to the ticker list a run
//! screens. Failing to resolve one is the only fatal error of a run.

use async_trait::async_trait;
use std::collections::HashMap;

use compounder_common::{Error, Result};

/// Lists the tickers of a market.
#[async_trait]
pub trait TickerUniverse: Send + Sync {
    async fn list_tickers(&self, market: &str) -> Result<Vec<String>>;
}

/// Large US compounder candidates, used when no `us` list is configured.
const DEFAULT_US: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "META", "NVDA", "V", "MA", "ADP", "ACN", "ADBE", "AVGO",
    "COST", "CTAS", "HD", "ITW", "JNJ", "KO", "LOW", "MCD", "MCO", "MMC", "MSCI", "NKE", "ORLY",
    "PEP", "PG", "ROL", "SPGI", "SYK", "TXN", "UNH", "VRSK", "WM", "ZTS",
];

/// SET-listed candidates, used when no `th` list is configured.
const DEFAULT_TH: &[&str] = &[
    "ADVANC.BK", "AOT.BK", "BDMS.BK", "BH.BK", "CPALL.BK", "CPN.BK", "GULF.BK", "HMPRO.BK",
    "KBANK.BK", "MTC.BK", "OSP.BK", "PTT.BK", "PTTEP.BK", "SCB.BK", "TISCO.BK", "TU.BK",
];

/// Universe backed by fixed per-market lists.
#[derive(Debug, Clone, Default)]
pub struct StaticUniverse {
    markets: HashMap<String, Vec<String>>,
}

impl StaticUniverse {
    pub fn new(markets: HashMap<String, Vec<String>>) -> Self {
        let markets = markets
            .into_iter()
            .map(|(market, tickers)| (market.trim().to_lowercase(), tickers))
            .collect();
        Self { markets }
    }

    /// Built-in lists overlaid with `configured` (configured lists win).
    pub fn with_defaults(configured: &HashMap<String, Vec<String>>) -> Self {
        let mut markets: HashMap<String, Vec<String>> = HashMap::new();
        markets.insert("us".into(), DEFAULT_US.iter().map(|s| s.to_string()).collect());
        markets.insert("th".into(), DEFAULT_TH.iter().map(|s| s.to_string()).collect());
        for (market, tickers) in configured {
            markets.insert(market.clone(), tickers.clone());
        }
        Self::new(markets)
    }

    pub fn markets(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.markets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl TickerUniverse for StaticUniverse {
    async fn list_tickers(&self, market: &str) -> Result<Vec<String>> {
        let key = market.trim().to_lowercase();
        let tickers = self
            .markets
            .get(&key)
            .ok_or_else(|| Error::Universe(format!("unknown market '{}'", market)))?;

        let tickers: Vec<String> = tickers
            .iter()
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        if tickers.is_empty() {
            return Err(Error::Universe(format!("market '{}' has no tickers", market)));
        }
        Ok(tickers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_cover_both_markets() {
        let universe = StaticUniverse::with_defaults(&HashMap::new());
        assert_eq!(universe.markets(), vec!["th", "us"]);
        let us = universe.list_tickers("US").await.unwrap();
        assert!(us.contains(&"AAPL".to_string()));
    }

    #[tokio::test]
    async fn test_configured_list_wins() {
        let configured = HashMap::from([("us".to_string(), vec!["ko".to_string(), " pep ".to_string()])]);
        let universe = StaticUniverse::with_defaults(&configured);
        assert_eq!(universe.list_tickers("us").await.unwrap(), vec!["KO", "PEP"]);
    }

    #[tokio::test]
    async fn test_unknown_or_empty_market_is_fatal() {
        let universe = StaticUniverse::new(HashMap::from([("jp".to_string(), vec![" ".to_string()])]));

        let err = universe.list_tickers("de").await.unwrap_err();
        assert!(err.is_universe());
        let err = universe.list_tickers("jp").await.unwrap_err();
        assert!(err.to_string().contains("no tickers"));
    }
}
