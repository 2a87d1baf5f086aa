//! Download orchestrator: batches → provider → normalizer → merge store.
//!
//! Failures are isolated: a failed or empty batch is reported and skipped,
//! a symbol that cannot be normalized or persisted is reported and skipped,
//! and the run continues. With more than one worker, batches are processed on
//! a bounded Rayon pool; the store serializes writes per series file.

use super::dates::DateRange;
use super::fetch::{BatchFetcher, FetchBatch, DEFAULT_BATCH_SIZE};
use super::normalize::normalize;
use super::progress::DownloadProgress;
use super::provider::{DataError, MarketDataProvider};
use super::store::SeriesStore;
use crate::domain::{Interval, Symbol};
use chrono::{DateTime, Utc};
use rayon::prelude::*;

/// What to download.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub symbols: Vec<Symbol>,
    pub range: DateRange,
    pub interval: Interval,
    /// Also write a point-in-time copy of each symbol's fetched rows.
    pub snapshot: bool,
}

/// How to download it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    pub batch_size: usize,
    /// Batches processed concurrently. 1 means strictly sequential.
    pub workers: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: 1,
        }
    }
}

/// Summary of a download run.
#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub total_symbols: usize,
    pub total_batches: usize,
    pub symbols_stored: usize,
    pub empty_batches: usize,
    pub empty_symbols: Vec<Symbol>,
    /// Failed batches by one-based batch number.
    pub batch_failures: Vec<(usize, DataError)>,
    pub symbol_failures: Vec<(Symbol, DataError)>,
}

impl DownloadSummary {
    /// True when no batch and no symbol failed. Empty results are not failures.
    pub fn all_succeeded(&self) -> bool {
        self.batch_failures.is_empty() && self.symbol_failures.is_empty()
    }

    fn absorb(&mut self, report: BatchReport) {
        self.symbols_stored += report.stored;
        self.empty_batches += usize::from(report.empty);
        self.empty_symbols.extend(report.empty_symbols);
        if let Some(error) = report.failure {
            self.batch_failures.push((report.number, error));
        }
        self.symbol_failures.extend(report.symbol_failures);
    }
}

/// Outcome of a single batch.
#[derive(Debug, Default)]
struct BatchReport {
    number: usize,
    stored: usize,
    empty: bool,
    empty_symbols: Vec<Symbol>,
    failure: Option<DataError>,
    symbol_failures: Vec<(Symbol, DataError)>,
}

/// Download every requested symbol and merge it into the store.
///
/// Only a failure to set up the worker pool is returned as an error; every
/// per-batch and per-symbol problem ends up in the summary.
pub fn download_symbols(
    provider: &dyn MarketDataProvider,
    store: &SeriesStore,
    request: &DownloadRequest,
    options: DownloadOptions,
    progress: &dyn DownloadProgress,
) -> Result<DownloadSummary, DataError> {
    let fetcher = BatchFetcher::new(provider, options.batch_size);
    let batches = fetcher.batches(&request.symbols);
    let total = batches.len();
    let taken_at = Utc::now();
    progress.on_run_start(request.symbols.len(), total);

    let run = |batch: &FetchBatch| {
        process_batch(&fetcher, store, batch, total, request, taken_at, progress)
    };

    let reports: Vec<BatchReport> = if options.workers > 1 && total > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .build()
            .map_err(|e| DataError::Config(format!("failed to build worker pool: {e}")))?;
        pool.install(|| batches.par_iter().map(run).collect())
    } else {
        batches.iter().map(run).collect()
    };

    let mut summary = DownloadSummary {
        total_symbols: request.symbols.len(),
        total_batches: total,
        ..Default::default()
    };
    for report in reports {
        summary.absorb(report);
    }

    progress.on_run_complete(&summary);
    Ok(summary)
}

fn process_batch(
    fetcher: &BatchFetcher<'_>,
    store: &SeriesStore,
    batch: &FetchBatch,
    total: usize,
    request: &DownloadRequest,
    taken_at: DateTime<Utc>,
    progress: &dyn DownloadProgress,
) -> BatchReport {
    let mut report = BatchReport {
        number: batch.number(),
        ..Default::default()
    };

    progress.on_batch_start(batch, total);
    let mut table = match fetcher.fetch_batch(batch, &request.range, request.interval) {
        Ok(Some(table)) => table,
        Ok(None) => {
            progress.on_batch_empty(batch);
            report.empty = true;
            return report;
        }
        Err(e) => {
            progress.on_batch_failed(batch, &e);
            report.failure = Some(e);
            return report;
        }
    };

    // Symbols the provider failed on are reported here and skipped below.
    let mut unfetched = Vec::new();
    for (symbol, e) in table.take_failures() {
        progress.on_symbol_failed(&symbol, &e);
        unfetched.push(symbol.clone());
        report.symbol_failures.push((symbol, e));
    }

    let normalized = match normalize(table, &batch.symbols, request.interval) {
        Ok(normalized) => normalized,
        Err(e) => {
            progress.on_batch_failed(batch, &e);
            report.failure = Some(e);
            return report;
        }
    };

    for (symbol, records) in normalized {
        if unfetched.contains(&symbol) {
            continue;
        }
        let records = match records {
            Ok(records) if records.is_empty() => {
                progress.on_symbol_empty(&symbol);
                report.empty_symbols.push(symbol);
                continue;
            }
            Ok(records) => records,
            Err(e) => {
                progress.on_symbol_failed(&symbol, &e);
                report.symbol_failures.push((symbol, e));
                continue;
            }
        };

        // A failed snapshot is reported but does not hold back the merge.
        if request.snapshot {
            match store.write_snapshot(&symbol, request.interval, &records, taken_at) {
                Ok(path) => progress.on_snapshot(&symbol, &path),
                Err(e) => {
                    progress.on_symbol_failed(&symbol, &e);
                    report.symbol_failures.push((symbol.clone(), e));
                }
            }
        }

        match store.merge_and_persist(&symbol, request.interval, records) {
            Ok(outcome) => {
                progress.on_symbol_stored(&symbol, &outcome);
                report.stored += 1;
            }
            Err(e) => {
                progress.on_symbol_failed(&symbol, &e);
                report.symbol_failures.push((symbol, e));
            }
        }
    }

    report
}
