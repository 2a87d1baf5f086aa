//! Data ingestion: date and ticker resolution, provider access, batch
//! fetching, normalization and the merge store.

pub mod dates;
pub mod download;
pub mod fetch;
pub mod normalize;
pub mod progress;
pub mod provider;
pub mod store;
pub mod table;
pub mod tickers;
pub mod yahoo;

pub use dates::DateRange;
pub use download::{download_symbols, DownloadOptions, DownloadRequest, DownloadSummary};
pub use fetch::{partition, BatchFetcher, FetchBatch, DEFAULT_BATCH_SIZE};
pub use normalize::{normalize, NormalizedBatch};
pub use progress::{DownloadProgress, TracingProgress};
pub use provider::{DataError, MarketDataProvider};
pub use store::{merge_records, MergeOutcome, MergeStats, SeriesStore};
pub use table::{ColumnKey, IndexKind, RawResponseTable, RawTableBuilder};
pub use tickers::resolve_tickers;
pub use yahoo::{ProviderConfig, YahooProvider};
