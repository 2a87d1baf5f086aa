//! Progress reporting for download runs.
//!
//! The pipeline never touches global logging configuration itself: every
//! stage reports through a [`DownloadProgress`] handed in by the caller.
//! [`TracingProgress`] forwards events to `tracing`; tests record them.

use super::download::DownloadSummary;
use super::fetch::FetchBatch;
use super::provider::DataError;
use super::store::MergeOutcome;
use crate::domain::Symbol;
use std::path::Path;

/// Callback sink for multi-batch operations.
///
/// Implementations must be `Sync`: with more than one worker, batches report
/// from several threads at once.
pub trait DownloadProgress: Send + Sync {
    /// Called once before the first batch.
    fn on_run_start(&self, symbols: usize, batches: usize);

    /// Called when a batch request is about to be issued.
    fn on_batch_start(&self, batch: &FetchBatch, batches: usize);

    /// Called when the provider returned no rows for a batch.
    fn on_batch_empty(&self, batch: &FetchBatch);

    /// Called when a batch could not be fetched or normalized.
    fn on_batch_failed(&self, batch: &FetchBatch, error: &DataError);

    /// Called when a symbol had no rows in an otherwise usable batch.
    fn on_symbol_empty(&self, symbol: &Symbol);

    /// Called after a symbol's series was merged and persisted.
    fn on_symbol_stored(&self, symbol: &Symbol, outcome: &MergeOutcome);

    /// Called when normalizing or persisting a symbol failed.
    fn on_symbol_failed(&self, symbol: &Symbol, error: &DataError);

    /// Called after a snapshot copy was written.
    fn on_snapshot(&self, symbol: &Symbol, path: &Path);

    /// Called once when every batch has been processed.
    fn on_run_complete(&self, summary: &DownloadSummary);
}

/// Progress sink that emits structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl DownloadProgress for TracingProgress {
    fn on_run_start(&self, symbols: usize, batches: usize) {
        tracing::info!(symbols, batches, "starting download");
    }

    fn on_batch_start(&self, batch: &FetchBatch, batches: usize) {
        tracing::info!(
            batch = batch.number(),
            of = batches,
            size = batch.symbols.len(),
            first = %batch.first_symbol(),
            "downloading batch"
        );
    }

    fn on_batch_empty(&self, batch: &FetchBatch) {
        tracing::warn!(
            batch = batch.number(),
            symbols = %batch.describe(),
            "no data downloaded for batch"
        );
    }

    fn on_batch_failed(&self, batch: &FetchBatch, error: &DataError) {
        tracing::error!(
            batch = batch.number(),
            symbols = %batch.describe(),
            %error,
            "skipping batch"
        );
    }

    fn on_symbol_empty(&self, symbol: &Symbol) {
        tracing::warn!(%symbol, "no rows returned");
    }

    fn on_symbol_stored(&self, symbol: &Symbol, outcome: &MergeOutcome) {
        if outcome.created {
            tracing::info!(
                %symbol,
                rows = outcome.total,
                path = %outcome.path.display(),
                "saved new series"
            );
        } else {
            tracing::info!(
                %symbol,
                added = outcome.added,
                replaced = outcome.replaced,
                rows = outcome.total,
                path = %outcome.path.display(),
                "merged into existing series"
            );
        }
    }

    fn on_symbol_failed(&self, symbol: &Symbol, error: &DataError) {
        tracing::error!(%symbol, %error, "skipping symbol");
    }

    fn on_snapshot(&self, symbol: &Symbol, path: &Path) {
        tracing::info!(%symbol, path = %path.display(), "saved snapshot");
    }

    fn on_run_complete(&self, summary: &DownloadSummary) {
        tracing::info!(
            stored = summary.symbols_stored,
            failed_symbols = summary.symbol_failures.len(),
            empty_batches = summary.empty_batches,
            failed_batches = summary.batch_failures.len(),
            "download complete"
        );
    }
}
