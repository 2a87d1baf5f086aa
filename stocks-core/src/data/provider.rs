//! Data provider trait and structured error types.
//!
//! The MarketDataProvider trait abstracts over remote sources (Yahoo Finance,
//! scripted test providers) so the batch fetcher never depends on a concrete
//! transport.

use super::dates::DateRange;
use super::table::RawResponseTable;
use crate::domain::{Interval, Symbol};
use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the ingestion pipeline.
///
/// Input-validation variants abort a run before any network or storage
/// activity. Batch and symbol variants are isolated by the orchestrator.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("invalid date expression '{expr}': {reason}")]
    InvalidDateExpression { expr: String, reason: String },

    #[error("invalid date range: start {start} is not before end {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("invalid interval '{0}' (expected one of 1d, 60m, 15m, 5m, 2m, 1m)")]
    InvalidInterval(String),

    #[error("no tickers found in '{input}'")]
    NoTickersFound { input: String },

    #[error("reference file {}: {reason}", path.display())]
    ReferenceFile { path: PathBuf, reason: String },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("batch {batch} ({size} symbols) failed: {reason}")]
    BatchFetchFailure {
        batch: usize,
        size: usize,
        reason: String,
    },

    #[error("cannot normalize response: {0}")]
    Normalize(String),

    #[error("unknown field '{field}' for {symbol}")]
    UnknownField { symbol: String, field: String },

    #[error("failed to persist {}: {reason}", path.display())]
    StorePersistFailure { path: PathBuf, reason: String },

    #[error("failed to read {}: {reason}", path.display())]
    StoreRead { path: PathBuf, reason: String },

    #[error("no stored {interval} data for '{symbol}' (run `download -t {symbol}` first)")]
    NoStoredData { symbol: String, interval: Interval },

    #[error("configuration error: {0}")]
    Config(String),
}

impl DataError {
    /// Whether a retry of the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataError::NetworkUnreachable(_) | DataError::RateLimited { .. }
        )
    }
}

/// Trait for remote market-data sources.
///
/// One call covers one batch of symbols over the closed-open date range.
/// Symbols the provider does not know are simply absent from the returned
/// table; an error means the whole batch is unusable.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch raw bars for every symbol of a batch.
    fn fetch_batch(
        &self,
        symbols: &[Symbol],
        range: &DateRange,
        interval: Interval,
    ) -> Result<RawResponseTable, DataError>;
}
