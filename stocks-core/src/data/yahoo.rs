//! Yahoo Finance data provider.
//!
//! Fetches OHLCV bars from Yahoo's v8 chart API, one request per symbol, and
//! assembles the batch into a single raw table. Handles rate limiting and
//! retries with exponential backoff.
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.

use super::dates::DateRange;
use super::provider::{DataError, MarketDataProvider};
use super::table::{IndexKind, RawResponseTable};
use crate::domain::{Interval, Symbol};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

const CHART_ENDPOINT: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
/// Upper bound on a single retry delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// One symbol's parsed chart, keyed by epoch milliseconds.
#[derive(Debug, Default)]
struct ChartSeries {
    timestamps_ms: Vec<i64>,
    quote: QuoteData,
    adj_close: Option<Vec<Option<f64>>>,
}

/// HTTP tuning for [`YahooProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderConfig {
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff before retry `n` is `base_delay * 2^(n-1)`.
    pub base_delay: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    config: ProviderConfig,
}

impl YahooProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DataError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Build the chart API URL for a symbol, range and interval.
    fn chart_url(symbol: &Symbol, range: &DateRange, interval: Interval) -> String {
        let (period1, period2) = range.epoch_bounds();
        format!(
            "{CHART_ENDPOINT}/{symbol}?period1={period1}&period2={period2}\
             &interval={interval}&includeAdjustedClose=true"
        )
    }

    /// Execute one chart request, retrying transient failures.
    fn fetch_with_retry(
        &self,
        symbol: &Symbol,
        range: &DateRange,
        interval: Interval,
    ) -> Result<ChartSeries, DataError> {
        let url = Self::chart_url(symbol, range, interval);
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = backoff(self.config.base_delay, attempt);
                tracing::debug!(%symbol, attempt, ?delay, "retrying chart request");
                std::thread::sleep(delay);
            }

            match self.request_once(&url, symbol) {
                Ok(chart) => return Ok(chart),
                Err(e) if e.is_transient() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| DataError::NetworkUnreachable("max retries exceeded".into())))
    }

    fn request_once(&self, url: &str, symbol: &Symbol) -> Result<ChartSeries, DataError> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(DataError::AuthenticationRequired(format!(
                "HTTP {status} for {symbol}"
            )));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        // Yahoo answers unknown symbols with 404 and a JSON error body.
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::NetworkUnreachable(format!(
                "HTTP {status} for {symbol}"
            )));
        }

        let body = resp
            .text()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;
        parse_chart(symbol, &body)
    }
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped.
fn backoff(base: Duration, attempt: u32) -> Duration {
    attempt
        .checked_sub(1)
        .and_then(|exp| 2u32.checked_pow(exp))
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch_batch(
        &self,
        symbols: &[Symbol],
        range: &DateRange,
        interval: Interval,
    ) -> Result<RawResponseTable, DataError> {
        let mut charts = Vec::with_capacity(symbols.len());
        let mut failures = Vec::new();
        for symbol in symbols {
            match self.fetch_with_retry(symbol, range, interval) {
                Ok(chart) => charts.push((symbol.clone(), chart)),
                Err(DataError::SymbolNotFound { .. }) => {
                    tracing::warn!(%symbol, "symbol not found at provider")
                }
                Err(e) => failures.push((symbol.clone(), e)),
            }
        }

        // Nothing usable came back: fail the batch as a whole.
        if !failures.is_empty() && failures.len() == symbols.len() {
            let (_, error) = failures.remove(0);
            return Err(error);
        }
        Ok(assemble(charts, symbols.len() > 1, interval)?.with_failures(failures))
    }
}

/// Parse a chart API body. Unknown symbols are `SymbolNotFound`.
fn parse_chart(symbol: &Symbol, body: &str) -> Result<ChartSeries, DataError> {
    let resp: ChartResponse = serde_json::from_str(body).map_err(|e| {
        DataError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
    })?;

    let result = match (resp.chart.result, resp.chart.error) {
        (Some(result), _) => result,
        (None, Some(err)) if err.code == "Not Found" => {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
        }
        (None, Some(err)) => {
            return Err(DataError::ResponseFormatChanged(format!(
                "{}: {}",
                err.code, err.description
            )))
        }
        (None, None) => {
            return Err(DataError::ResponseFormatChanged(
                "empty result with no error".into(),
            ))
        }
    };

    let data = result
        .into_iter()
        .next()
        .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;

    // A known symbol with no bars in range has no timestamp array at all.
    let Some(timestamps) = data.timestamp else {
        return Ok(ChartSeries::default());
    };

    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

    let adj_close = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);

    let timestamps_ms = timestamps
        .iter()
        .map(|&ts| {
            ts.checked_mul(1000).ok_or_else(|| {
                DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ChartSeries {
        timestamps_ms,
        quote,
        adj_close,
    })
}

/// Align per-symbol charts on the union of their timestamps.
fn assemble(
    charts: Vec<(Symbol, ChartSeries)>,
    composite: bool,
    interval: Interval,
) -> Result<RawResponseTable, DataError> {
    let index: BTreeSet<i64> = charts
        .iter()
        .flat_map(|(_, c)| c.timestamps_ms.iter().copied())
        .collect();
    if index.is_empty() {
        return Ok(RawResponseTable::empty());
    }
    let index: Vec<i64> = index.into_iter().collect();
    let kind = if interval.is_intraday() {
        IndexKind::Datetime
    } else {
        IndexKind::Date
    };

    let mut builder = RawResponseTable::builder(kind, index.clone());
    for (symbol, chart) in &charts {
        let row_of: HashMap<i64, usize> = chart
            .timestamps_ms
            .iter()
            .enumerate()
            .map(|(i, &ts)| (ts, i))
            .collect();
        let align = |values: &[Option<f64>]| -> Vec<Option<f64>> {
            index
                .iter()
                .map(|ts| row_of.get(ts).and_then(|&i| values.get(i).copied().flatten()))
                .collect()
        };

        let mut columns = vec![
            ("Open", align(&chart.quote.open)),
            ("High", align(&chart.quote.high)),
            ("Low", align(&chart.quote.low)),
            ("Close", align(&chart.quote.close)),
        ];
        if let Some(adj) = &chart.adj_close {
            columns.push(("Adj Close", align(adj)));
        }
        columns.push(("Volume", align(&chart.quote.volume)));

        for (field, values) in columns {
            builder = if composite {
                builder.pair(field, symbol, values)
            } else {
                builder.field(field, values)
            };
        }
    }
    builder.build()
}
