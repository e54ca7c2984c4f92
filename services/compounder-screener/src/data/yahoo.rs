//! Yahoo Finance data source.
//!
//! Uses the public quote-summary, fundamentals-timeseries and chart
//! endpoints. Quote summary requires a session cookie plus a "crumb" token,
//! both obtained lazily and refreshed when Yahoo rejects them.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::provider::{
    DateInput, Frequency, FundamentalDataSource, PriceBar, ProviderError, QuoteSummary, RawRow,
    Statement,
};

const QUERY_BASE: &str = "https://query2.finance.yahoo.com";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_PATH: &str = "/v1/test/getcrumb";
const QUOTE_MODULES: &str = "financialData,summaryDetail,defaultKeyStatistics,price";
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Seconds to wait after an HTTP 429 from Yahoo.
const RATE_LIMIT_RETRY_SECS: u64 = 5;

/// Yahoo Finance implementation of [`FundamentalDataSource`].
pub struct YahooFinanceSource {
    client: reqwest::Client,
    crumb: RwLock<Option<String>>,
}

impl YahooFinanceSource {
    /// Create a source whose HTTP requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            crumb: RwLock::new(None),
        })
    }

    /// Cached crumb, fetching a session cookie and a new crumb when absent.
    async fn crumb(&self) -> Result<String, ProviderError> {
        if let Some(crumb) = self.crumb.read().await.as_ref() {
            return Ok(crumb.clone());
        }

        let mut slot = self.crumb.write().await;
        if let Some(crumb) = slot.as_ref() {
            return Ok(crumb.clone());
        }

        // Only the Set-Cookie matters; the page itself is usually a 404
        let _ = self.client.get(COOKIE_URL).send().await?;

        let response = self
            .client
            .get(format!("{}{}", QUERY_BASE, CRUMB_PATH))
            .send()
            .await?;
        let response = check_status(response).await?;
        let crumb = response.text().await?.trim().to_string();
        if crumb.is_empty() || crumb.contains('<') {
            return Err(ProviderError::Internal("Yahoo returned an invalid crumb".into()));
        }

        debug!("Obtained Yahoo crumb");
        *slot = Some(crumb.clone());
        Ok(crumb)
    }

    async fn invalidate_crumb(&self) {
        *self.crumb.write().await = None;
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, ProviderError> {
        debug!(url, "Requesting Yahoo endpoint");
        let response = self.client.get(url).query(query).send().await?;
        let response = check_status(response).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::Parse(format!("Failed to parse response: {}", e)))
    }
}

/// Map HTTP status codes onto provider errors.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited {
            retry_after_secs: Some(RATE_LIMIT_RETRY_SECS),
        });
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ProviderError::DataNotAvailable(format!("HTTP {}", status)));
    }
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(200).collect();
    Err(ProviderError::Network(format!("HTTP {}: {}", status, body)))
}

#[async_trait]
impl FundamentalDataSource for YahooFinanceSource {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn quote_summary(&self, ticker: &str) -> Result<QuoteSummary, ProviderError> {
        let crumb = self.crumb().await?;
        let url = format!("{}/v10/finance/quoteSummary/{}", QUERY_BASE, ticker);
        let query = [("modules", QUOTE_MODULES.to_string()), ("crumb", crumb)];

        match self.get_json(&url, &query).await {
            Ok(body) => parse_quote_summary(&body),
            Err(ProviderError::Network(msg)) if msg.starts_with("HTTP 401") => {
                warn!(ticker, "Yahoo rejected crumb, refreshing on next attempt");
                self.invalidate_crumb().await;
                Err(ProviderError::Network(msg))
            }
            Err(e) => Err(e),
        }
    }

    async fn fundamentals_time_series(
        &self,
        ticker: &str,
        period_start: NaiveDate,
        frequency: Frequency,
        statement: Statement,
    ) -> Result<Vec<RawRow>, ProviderError> {
        let types: Vec<String> = statement
            .fields()
            .iter()
            .map(|f| format!("{}{}", frequency.prefix(), f))
            .collect();
        let url = format!(
            "{}/ws/fundamentals-timeseries/v1/finance/timeseries/{}",
            QUERY_BASE, ticker
        );
        let query = [
            ("symbol", ticker.to_string()),
            ("type", types.join(",")),
            ("period1", epoch_secs(period_start).to_string()),
            ("period2", chrono::Utc::now().timestamp().to_string()),
        ];

        let body = self.get_json(&url, &query).await?;
        let rows = parse_timeseries(&body, frequency)?;
        debug!(ticker, %statement, frequency = frequency.prefix(), rows = rows.len(), "Parsed time series");
        Ok(rows)
    }

    async fn daily_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        let url = format!("{}/v8/finance/chart/{}", QUERY_BASE, ticker);
        let query = [
            ("period1", epoch_secs(start).to_string()),
            // period2 is exclusive
            ("period2", (epoch_secs(end) + 86_400).to_string()),
            ("interval", "1d".to_string()),
            ("events", "div".to_string()),
        ];

        let body = self.get_json(&url, &query).await?;
        parse_chart(body)
    }
}

fn epoch_secs(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Unwrap Yahoo's `{"raw": 1.23, "fmt": "1.23"}` wrappers (or bare numbers).
fn raw_number(value: Option<&Value>) -> Option<f64> {
    let value = value?;
    let n = match value {
        Value::Object(map) => map.get("raw")?.as_f64()?,
        other => other.as_f64()?,
    };
    n.is_finite().then_some(n)
}

pub(crate) fn parse_quote_summary(body: &Value) -> Result<QuoteSummary, ProviderError> {
    let summary = &body["quoteSummary"];
    if let Some(err) = summary.get("error").filter(|e| !e.is_null()) {
        let msg = err["description"].as_str().unwrap_or("unknown error");
        return Err(ProviderError::DataNotAvailable(msg.to_string()));
    }
    let result = summary["result"]
        .get(0)
        .ok_or_else(|| ProviderError::DataNotAvailable("empty quote summary".into()))?;

    let financial = &result["financialData"];
    let detail = &result["summaryDetail"];
    let stats = &result["defaultKeyStatistics"];
    let price = &result["price"];

    Ok(QuoteSummary {
        operating_margin: raw_number(financial.get("operatingMargins")),
        dividend_yield: raw_number(detail.get("dividendYield"))
            .or_else(|| raw_number(detail.get("trailingAnnualDividendYield"))),
        shares_outstanding: raw_number(stats.get("sharesOutstanding")),
        current_price: raw_number(financial.get("currentPrice"))
            .or_else(|| raw_number(price.get("regularMarketPrice"))),
        market_cap: raw_number(price.get("marketCap"))
            .or_else(|| raw_number(detail.get("marketCap"))),
    })
}

/// "annualTotalRevenue" -> "totalRevenue"
fn field_key(series_type: &str, frequency: Frequency) -> Option<String> {
    let name = series_type.strip_prefix(frequency.prefix())?;
    let mut chars = name.chars();
    let first = chars.next()?;
    Some(first.to_lowercase().chain(chars).collect())
}

/// Pivot per-field series into one row per `asOfDate`.
pub(crate) fn parse_timeseries(body: &Value, frequency: Frequency) -> Result<Vec<RawRow>, ProviderError> {
    let results = body["timeseries"]["result"]
        .as_array()
        .ok_or_else(|| ProviderError::Parse("missing timeseries.result".into()))?;

    let mut by_date: BTreeMap<String, HashMap<String, f64>> = BTreeMap::new();
    for series in results {
        let Some(series_type) = series["meta"]["type"].get(0).and_then(Value::as_str) else {
            continue;
        };
        let Some(key) = field_key(series_type, frequency) else {
            continue;
        };
        let Some(points) = series.get(series_type).and_then(Value::as_array) else {
            continue;
        };

        for point in points.iter().filter(|p| !p.is_null()) {
            let Some(as_of) = point["asOfDate"].as_str() else {
                continue;
            };
            if let Some(v) = raw_number(point.get("reportedValue")) {
                by_date.entry(as_of.to_string()).or_default().insert(key.clone(), v);
            }
        }
    }

    Ok(by_date
        .into_iter()
        .map(|(date, values)| RawRow {
            date: DateInput::Text(date),
            values,
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
    #[serde(default)]
    events: Option<ChartEvents>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: HashMap<String, DividendEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

/// Daily closes plus dividend events as close-less bars.
pub(crate) fn parse_chart(body: Value) -> Result<Vec<PriceBar>, ProviderError> {
    let envelope: ChartEnvelope =
        serde_json::from_value(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    if let Some(err) = envelope.chart.error {
        return Err(ProviderError::DataNotAvailable(
            err.description.unwrap_or_else(|| "chart error".into()),
        ));
    }
    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };

    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    let mut bars: Vec<PriceBar> = result
        .timestamp
        .iter()
        .zip(closes)
        .map(|(ts, close)| PriceBar {
            date: DateInput::Epoch(*ts as f64),
            close,
            dividends: None,
        })
        .collect();

    let mut dividends: Vec<DividendEvent> = result
        .events
        .map(|e| e.dividends.into_values().collect())
        .unwrap_or_default();
    dividends.sort_by_key(|d| d.date);
    bars.extend(dividends.into_iter().map(|d| PriceBar {
        date: DateInput::Epoch(d.date as f64),
        close: None,
        dividends: Some(d.amount),
    }));

    Ok(bars)
}
