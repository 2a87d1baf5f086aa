//! Batched retrieval from a market-data provider.
//!
//! Symbols are split into consecutive batches of at most `batch_size`. Each
//! batch is one provider call; an empty or failed batch is reported and
//! skipped without affecting the others.

use super::dates::DateRange;
use super::progress::DownloadProgress;
use super::provider::{DataError, MarketDataProvider};
use super::table::RawResponseTable;
use crate::domain::{Interval, Symbol};

/// Symbols per provider request unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// A group of symbols submitted to the provider in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchBatch {
    /// Zero-based position of the batch within the run.
    pub index: usize,
    pub symbols: Vec<Symbol>,
}

impl FetchBatch {
    /// One-based batch number for messages.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    pub fn first_symbol(&self) -> &str {
        self.symbols.first().map(|s| s.as_str()).unwrap_or("")
    }

    /// Short listing for log lines: the first few symbols and a count of the rest.
    pub fn describe(&self) -> String {
        const SHOWN: usize = 5;
        let head: Vec<&str> = self.symbols.iter().take(SHOWN).map(|s| s.as_str()).collect();
        let mut text = head.join(", ");
        if self.symbols.len() > SHOWN {
            text.push_str(&format!(" (+{} more)", self.symbols.len() - SHOWN));
        }
        text
    }
}

/// Split `symbols` into consecutive batches of at most `batch_size` (min 1).
pub fn partition(symbols: &[Symbol], batch_size: usize) -> Vec<FetchBatch> {
    symbols
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, chunk)| FetchBatch {
            index,
            symbols: chunk.to_vec(),
        })
        .collect()
}

/// Issues one provider request per batch.
pub struct BatchFetcher<'a> {
    provider: &'a dyn MarketDataProvider,
    batch_size: usize,
}

impl<'a> BatchFetcher<'a> {
    pub fn new(provider: &'a dyn MarketDataProvider, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batches(&self, symbols: &[Symbol]) -> Vec<FetchBatch> {
        partition(symbols, self.batch_size)
    }

    /// Fetch one batch. `Ok(None)` means the provider returned no rows and
    /// reported no per-symbol failures.
    pub fn fetch_batch(
        &self,
        batch: &FetchBatch,
        range: &DateRange,
        interval: Interval,
    ) -> Result<Option<RawResponseTable>, DataError> {
        let table = self
            .provider
            .fetch_batch(&batch.symbols, range, interval)
            .map_err(|e| DataError::BatchFetchFailure {
                batch: batch.number(),
                size: batch.symbols.len(),
                reason: format!("{}: {e}", self.provider.name()),
            })?;
        tracing::debug!(batch = batch.number(), rows = table.height(), "batch fetched");
        Ok((!table.is_empty() || table.has_failures()).then_some(table))
    }

    /// Fetch every batch in order. Empty and failed batches are reported
    /// through `progress` and come back as `None`.
    pub fn fetch(
        &self,
        symbols: &[Symbol],
        range: &DateRange,
        interval: Interval,
        progress: &dyn DownloadProgress,
    ) -> Vec<(FetchBatch, Option<RawResponseTable>)> {
        let batches = self.batches(symbols);
        let total = batches.len();
        batches
            .into_iter()
            .map(|batch| {
                progress.on_batch_start(&batch, total);
                let table = match self.fetch_batch(&batch, range, interval) {
                    Ok(Some(table)) => Some(table),
                    Ok(None) => {
                        progress.on_batch_empty(&batch);
                        None
                    }
                    Err(e) => {
                        progress.on_batch_failed(&batch, &e);
                        None
                    }
                };
                (batch, table)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(n: usize) -> Vec<Symbol> {
        (0..n)
            .map(|i| Symbol::parse(&format!("S{i:03}")).unwrap())
            .collect()
    }

    #[test]
    fn partitions_into_fixed_size_batches() {
        let batches = partition(&symbols(250), DEFAULT_BATCH_SIZE);
        let sizes: Vec<usize> = batches.iter().map(|b| b.symbols.len()).collect();
        assert_eq!(sizes, [100, 100, 50]);
        assert_eq!(batches[2].index, 2);
        assert_eq!(batches[1].symbols[0].as_str(), "S100");
    }

    #[test]
    fn exact_multiple_has_no_trailing_batch() {
        assert_eq!(partition(&symbols(200), 100).len(), 2);
        assert!(partition(&[], 100).is_empty());
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        assert_eq!(partition(&symbols(3), 0).len(), 3);
    }

    #[test]
    fn describe_truncates_long_batches() {
        let batch = &partition(&symbols(7), 100)[0];
        assert_eq!(batch.describe(), "S000, S001, S002, S003, S004 (+2 more)");
        assert_eq!(batch.number(), 1);
    }
}
