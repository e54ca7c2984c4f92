//! Integration tests for the full screening pipeline.
//!
//! Drives `ScreenerEngine` end to end through a fixture data source: cache
//! through fetch, normalization, metric derivation, filtering and ranking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};

use compounder_common::Config;
use compounder_screener::data::{
    DateInput, Frequency, FundamentalDataSource, PriceBar, ProviderError, QuoteSummary, RawRow,
    SnapshotCache, Statement, TickerSnapshot,
};
use compounder_screener::screener::{CheckDetail, Criterion};
use compounder_screener::ScreenerService;

// ============================================================================
// Fixture Source
// ============================================================================

#[derive(Clone, Default)]
struct Fixture {
    quote: QuoteSummary,
    financials: Vec<RawRow>,
    balance_sheet: Vec<RawRow>,
    cash_flow: Vec<RawRow>,
    quarterly: Vec<RawRow>,
    history: Vec<PriceBar>,
}

/// Serves fixtures by ticker; unknown tickers always fail.
struct FixtureSource {
    fixtures: HashMap<String, Fixture>,
    quote_calls: HashMap<String, AtomicU32>,
}

impl FixtureSource {
    fn new(fixtures: Vec<(&str, Fixture)>, failing: &[&str]) -> Self {
        let mut quote_calls = HashMap::new();
        for (ticker, _) in &fixtures {
            quote_calls.insert(ticker.to_string(), AtomicU32::new(0));
        }
        for ticker in failing {
            quote_calls.insert(ticker.to_string(), AtomicU32::new(0));
        }
        Self {
            fixtures: fixtures.into_iter().map(|(t, f)| (t.to_string(), f)).collect(),
            quote_calls,
        }
    }

    fn calls(&self, ticker: &str) -> u32 {
        self.quote_calls[ticker].load(Ordering::SeqCst)
    }

    fn fixture(&self, ticker: &str) -> Result<&Fixture, ProviderError> {
        self.fixtures
            .get(ticker)
            .ok_or_else(|| ProviderError::Network(format!("connection reset for {ticker}")))
    }
}

#[async_trait]
impl FundamentalDataSource for FixtureSource {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn quote_summary(&self, ticker: &str) -> Result<QuoteSummary, ProviderError> {
        if let Some(counter) = self.quote_calls.get(ticker) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(self.fixture(ticker)?.quote.clone())
    }

    async fn fundamentals_time_series(
        &self,
        ticker: &str,
        _period_start: NaiveDate,
        frequency: Frequency,
        statement: Statement,
    ) -> Result<Vec<RawRow>, ProviderError> {
        let f = self.fixture(ticker)?;
        Ok(match (frequency, statement) {
            (Frequency::Annual, Statement::Financials) => f.financials.clone(),
            (Frequency::Annual, Statement::BalanceSheet) => f.balance_sheet.clone(),
            (Frequency::Annual, Statement::CashFlow) => f.cash_flow.clone(),
            (Frequency::Quarterly, Statement::BalanceSheet) => f.quarterly.clone(),
            _ => Vec::new(),
        })
    }

    async fn daily_history(
        &self,
        ticker: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        Ok(self.fixture(ticker)?.history.clone())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn year_end(year: i32) -> DateInput {
    DateInput::Text(format!("{year}-12-31"))
}

/// Four years (2021-2024) of financials with the given revenue/net income.
fn compounder(revenue: [f64; 4], net_income: [f64; 4], operating_margin: f64) -> Fixture {
    let eps = [1.0, 1.1, 1.2, 1.5];
    let financials = (0..4)
        .map(|i| {
            RawRow::new(year_end(2021 + i as i32))
                .with("totalRevenue", revenue[i])
                .with("netIncomeCommonStockholders", net_income[i])
                .with("dilutedEPS", eps[i])
        })
        .collect();

    let balance_sheet = vec![RawRow::new(year_end(2024))
        .with("stockholdersEquity", 50.0)
        .with("longTermDebt", 20.0)
        .with("cashAndCashEquivalents", 10.0)];

    // Explicit FCF for two years, derived (negative capex) for the rest
    let cash_flow = vec![
        RawRow::new(year_end(2021)).with("freeCashFlow", 10.0),
        RawRow::new(year_end(2022)).with("freeCashFlow", 11.0),
        RawRow::new(year_end(2023))
            .with("operatingCashFlow", 15.0)
            .with("capitalExpenditure", -3.0),
        RawRow::new(year_end(2024))
            .with("operatingCashFlow", 16.0)
            .with("capitalExpenditure", -3.0),
    ];

    // 13 quarters, 1000 -> 940 shares (-6%)
    let start = NaiveDate::from_ymd_opt(2021, 9, 30).unwrap();
    let quarterly = (0..13)
        .map(|q| {
            RawRow::new(DateInput::Date(start + Duration::days(91 * q)))
                .with("ordinarySharesNumber", 1000.0 - 5.0 * q as f64)
        })
        .collect();

    Fixture {
        quote: QuoteSummary {
            operating_margin: Some(operating_margin),
            dividend_yield: Some(0.01),
            shares_outstanding: Some(940.0),
            current_price: Some(1.0),
            market_cap: Some(940.0),
        },
        financials,
        balance_sheet,
        cash_flow,
        quarterly,
        history: vec![
            PriceBar { date: DateInput::Epoch(1_704_153_600.0), close: Some(2.0), dividends: None },
            PriceBar { date: DateInput::Epoch(1_717_200_000_000.0), close: None, dividends: Some(0.02) },
        ],
    }
}

fn test_config(tickers: &[&str]) -> Config {
    let mut config = Config::default();
    config.screener.tickers = Some(tickers.iter().map(|t| t.to_string()).collect());
    config.screener.concurrency = 3;
    config.screener.include_diagnostics = true;
    config.fetch.max_retries = 1;
    config.fetch.base_delay_ms = 0;
    config.fetch.jitter_max_ms = 0;
    config
}

fn standard_source() -> Arc<FixtureSource> {
    Arc::new(FixtureSource::new(
        vec![
            ("GOOD", compounder([100.0, 110.0, 121.0, 133.0], [10.0, 11.0, 12.0, 15.0], 0.30)),
            ("MIXED", compounder([100.0, 110.0, 121.0, 133.0], [10.0, -5.0, 12.0, 15.0], 0.30)),
            ("GOOD2", compounder([100.0, 110.0, 121.0, 133.0], [10.0, 11.0, 12.0, 15.0], 0.20)),
        ],
        &["DOWN"],
    ))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_end_to_end_ranking_and_diagnostics() {
    let source = standard_source();
    let service = ScreenerService::new(test_config(&["GOOD", "MIXED", "DOWN", "GOOD2"]));
    let engine = service.engine(SnapshotCache::in_memory(Duration::days(7)), Arc::clone(&source));

    let result = engine.run().await.unwrap();

    assert_eq!(result.market, "custom");
    assert_eq!(result.scanned, 4);
    assert_eq!(result.evaluated, 3);
    assert_eq!(result.qualified, 2);

    let top: Vec<&str> = result.top.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(top, vec!["GOOD", "GOOD2"]);
    assert!(result.top[0].score > result.top[1].score);

    let good = &result.top[0];
    assert!((good.roic_percent.unwrap() - 25.0).abs() < 1e-9);
    assert!((good.share_change_3y_percent.unwrap() + 6.0).abs() < 1e-9);
    assert_eq!(good.latest_fcf, Some(13.0));
    assert!(good.intrinsic_value.is_some());
    assert!(good.upside_percent.is_some());
    assert!((good.avg_dividend_yield_5y_percent.unwrap() - 1.0).abs() < 1e-9);

    // Retry exhaustion: initial attempt + 1 retry, then skipped
    assert_eq!(source.calls("DOWN"), 2);

    let diagnostics = result.diagnostics.as_ref().unwrap();
    assert_eq!(diagnostics.len(), 3);
    let mixed = diagnostics.iter().find(|d| d.row.ticker == "MIXED").unwrap();
    assert!(!mixed.passed);
    assert_eq!(mixed.row.revenue_growth.positive_count, 3);
    assert_eq!(mixed.row.revenue_growth.intervals, 3);
    assert_eq!(mixed.row.net_income_growth.positive_count, 2);
    assert_eq!(mixed.row.net_income_growth.intervals, 3);

    let failed: Vec<_> = mixed.checks.iter().filter(|c| !c.passed).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].criterion, Criterion::NetIncomeGrowth);
    match &failed[0].detail {
        CheckDetail::Growth { positive_count, required_positive, .. } => {
            assert_eq!(*positive_count, 2);
            assert_eq!(*required_positive, 3);
        }
        other => panic!("unexpected detail {other:?}"),
    }
}

#[tokio::test]
async fn test_second_run_served_from_cache() {
    let source = standard_source();
    let service = ScreenerService::new(test_config(&["GOOD", "MIXED", "DOWN"]));
    let cache = SnapshotCache::in_memory(Duration::days(7));
    let engine = service.engine(cache.clone(), Arc::clone(&source));

    engine.run().await.unwrap();
    let second = engine.run().await.unwrap();

    assert_eq!(second.evaluated, 2);
    assert_eq!(source.calls("GOOD"), 1);
    assert_eq!(source.calls("MIXED"), 1);
    // Failures are never cached
    assert_eq!(source.calls("DOWN"), 4);
    assert_eq!(cache.len().await, 2);
}

#[tokio::test]
async fn test_stale_and_outdated_entries_are_refetched() {
    let source = standard_source();
    let service = ScreenerService::new(test_config(&["GOOD", "GOOD2"]));
    let cache = SnapshotCache::in_memory(Duration::days(7));

    let stale_at = chrono::Utc::now() - Duration::days(30);
    cache.set_at("GOOD", &TickerSnapshot::empty("GOOD"), stale_at).await;
    let mut outdated = TickerSnapshot::empty("GOOD2");
    outdated.schema_version = 1;
    cache.set("GOOD2", &outdated).await;

    let result = service
        .engine(cache.clone(), Arc::clone(&source))
        .run()
        .await
        .unwrap();

    assert_eq!(source.calls("GOOD"), 1);
    assert_eq!(source.calls("GOOD2"), 1);
    assert_eq!(result.qualified, 2);
    assert!(!cache.get("GOOD").await.unwrap().financials.is_empty());
}

#[tokio::test]
async fn test_top_n_cut_after_qualified_count() {
    let source = standard_source();
    let mut config = test_config(&["GOOD2", "GOOD", "MIXED"]);
    config.screener.top_n = 1;
    config.screener.include_diagnostics = false;

    let result = ScreenerService::new(config)
        .engine(SnapshotCache::in_memory(Duration::days(7)), source)
        .run()
        .await
        .unwrap();

    assert_eq!(result.qualified, 2);
    assert_eq!(result.top.len(), 1);
    assert_eq!(result.top[0].ticker, "GOOD");
    assert!(result.diagnostics.is_none());
}

#[tokio::test]
async fn test_thresholds_flow_from_config() {
    let source = standard_source();
    let mut config = test_config(&["GOOD", "GOOD2"]);
    config.filters.min_operating_margin = 25.0;

    let result = ScreenerService::new(config)
        .engine(SnapshotCache::in_memory(Duration::days(7)), source)
        .run()
        .await
        .unwrap();

    assert_eq!(result.thresholds.min_operating_margin, 25.0);
    let top: Vec<&str> = result.top.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(top, vec!["GOOD"]);
}

#[tokio::test]
async fn test_unknown_market_is_fatal() {
    let mut config = Config::default();
    config.screener.market = "zz".into();

    let err = ScreenerService::new(config)
        .engine(SnapshotCache::in_memory(Duration::days(7)), standard_source())
        .run()
        .await
        .unwrap_err();

    assert!(err.is_universe());
}

#[tokio::test]
async fn test_market_universe_with_cap() {
    let source = standard_source();
    let mut config = test_config(&[]);
    config.screener.tickers = None;
    config.screener.market = "watch".into();
    config.screener.max_tickers = Some(2);
    config
        .universes
        .insert("watch".into(), vec!["GOOD".into(), "GOOD2".into(), "MIXED".into()]);

    let engine = ScreenerService::new(config)
        .engine(SnapshotCache::in_memory(Duration::days(7)), Arc::clone(&source));
    assert_eq!(engine.resolve_tickers().await.unwrap(), vec!["GOOD", "GOOD2"]);

    let result = engine.run().await.unwrap();
    assert_eq!(result.market, "watch");
    assert_eq!(result.scanned, 2);
    assert_eq!(source.calls("MIXED"), 0);
}
