//! Per-symbol CSV series store with merge-on-write.
//!
//! Layout: `{root}/{interval}/{SYMBOL}.csv`, snapshots under
//! `{root}/{interval}/snapshots/`.
//!
//! Every merge loads the stored series, overlays the incoming records (incoming
//! wins on equal dates), sorts by date and rewrites the whole file. Writes are
//! atomic: the series is written to `{file}.tmp`, synced, then renamed over
//! the target, so an interrupted run never leaves a half-written series.
//! Merges of the same file are serialized through a per-path lock.

use super::provider::DataError;
use crate::domain::{BarTime, Interval, PriceField, PriceRecord, SeriesColumn, Symbol};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Effect of one merge, for progress reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub path: PathBuf,
    /// True when no series existed before this merge.
    pub created: bool,
    /// Rows in the stored series before the merge.
    pub previous: usize,
    /// Rows supplied by the caller.
    pub incoming: usize,
    /// Rows in the persisted series after the merge.
    pub total: usize,
    /// Incoming dates that were not stored before.
    pub added: usize,
    /// Incoming dates that overwrote a stored row.
    pub replaced: usize,
}

/// Counts produced by [`merge_records`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub replaced: usize,
}

/// Union two record sets keyed by date, later occurrences winning, sorted ascending.
pub fn merge_records(
    existing: Vec<PriceRecord>,
    incoming: Vec<PriceRecord>,
) -> (Vec<PriceRecord>, MergeStats) {
    let mut by_date: BTreeMap<BarTime, PriceRecord> = BTreeMap::new();
    for record in existing {
        by_date.insert(record.date.clone(), record);
    }
    let stored: HashSet<BarTime> = by_date.keys().cloned().collect();

    let mut stats = MergeStats::default();
    let mut seen = HashSet::new();
    for record in incoming {
        let date = record.date.clone();
        if seen.insert(date.clone()) {
            if stored.contains(&date) {
                stats.replaced += 1;
            } else {
                stats.added += 1;
            }
        }
        by_date.insert(date, record);
    }

    (by_date.into_values().collect(), stats)
}

/// The CSV series store.
pub struct SeriesStore {
    root: PathBuf,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl SeriesStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding every series of one interval: `{root}/{interval}/`.
    pub fn interval_dir(&self, interval: Interval) -> PathBuf {
        self.root.join(interval.as_str())
    }

    /// Path of a symbol's series file.
    pub fn series_path(&self, symbol: &Symbol, interval: Interval) -> PathBuf {
        self.interval_dir(interval)
            .join(format!("{}.csv", symbol.file_stem()))
    }

    pub fn snapshot_dir(&self, interval: Interval) -> PathBuf {
        self.interval_dir(interval).join("snapshots")
    }

    pub fn exists(&self, symbol: &Symbol, interval: Interval) -> bool {
        self.series_path(symbol, interval).is_file()
    }

    /// Load a stored series in file order.
    pub fn load(&self, symbol: &Symbol, interval: Interval) -> Result<Vec<PriceRecord>, DataError> {
        if !self.exists(symbol, interval) {
            return Err(DataError::NoStoredData {
                symbol: symbol.to_string(),
                interval,
            });
        }
        read_series(&self.series_path(symbol, interval), interval)
    }

    /// Stored records whose start instant lies in `[start, end]`, ascending.
    pub fn load_range(
        &self,
        symbol: &Symbol,
        interval: Interval,
        start: &DateTime<Tz>,
        end: &DateTime<Tz>,
    ) -> Result<Vec<PriceRecord>, DataError> {
        let mut records = self.load(symbol, interval)?;
        records.retain(|r| {
            r.date
                .instant()
                .is_some_and(|at| at >= *start && at <= *end)
        });
        records.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(records)
    }

    /// Merge `incoming` into the stored series for `(symbol, interval)` and
    /// rewrite it.
    ///
    /// On error the previously persisted file is left untouched.
    pub fn merge_and_persist(
        &self,
        symbol: &Symbol,
        interval: Interval,
        incoming: Vec<PriceRecord>,
    ) -> Result<MergeOutcome, DataError> {
        let path = self.series_path(symbol, interval);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let created = !path.is_file();
        let existing = if created {
            Vec::new()
        } else {
            read_series(&path, interval)?
        };
        let previous = existing.len();
        let incoming_len = incoming.len();
        let incoming: Vec<PriceRecord> = incoming
            .into_iter()
            .filter_map(|mut r| {
                r.date = r.date.for_interval(interval)?;
                Some(r)
            })
            .collect();

        let (merged, stats) = merge_records(existing, incoming);
        write_series_atomic(&path, &merged)?;

        Ok(MergeOutcome {
            path,
            created,
            previous,
            incoming: incoming_len,
            total: merged.len(),
            added: stats.added,
            replaced: stats.replaced,
        })
    }

    /// Write a point-in-time copy of freshly fetched records.
    ///
    /// Snapshots are never merged; each call creates a new timestamped file.
    pub fn write_snapshot(
        &self,
        symbol: &Symbol,
        interval: Interval,
        records: &[PriceRecord],
        taken_at: DateTime<Utc>,
    ) -> Result<PathBuf, DataError> {
        let path = self.snapshot_dir(interval).join(format!(
            "{}_{}.csv",
            symbol.file_stem(),
            taken_at.format("%Y%m%dT%H%M%S")
        ));
        let mut sorted = records.to_vec();
        sorted.sort_by(|a, b| a.date.cmp(&b.date));
        write_series_atomic(&path, &sorted)?;
        Ok(path)
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(path.to_path_buf()).or_default().clone()
    }
}

// ── CSV I/O ─────────────────────────────────────────────────────────

/// Read a series file. Unknown columns are ignored; `Date` is required.
///
/// Dates are coerced to the variant of `interval`, so a daily file written
/// with timezone-aware midnights keys its rows by calendar date.
pub fn read_series(path: &Path, interval: Interval) -> Result<Vec<PriceRecord>, DataError> {
    let read_err = |reason: String| DataError::StoreRead {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::Reader::from_path(path).map_err(|e| read_err(format!("open: {e}")))?;
    let columns: Vec<Option<SeriesColumn>> = reader
        .headers()
        .map_err(|e| read_err(format!("header: {e}")))?
        .iter()
        .map(SeriesColumn::from_header)
        .collect();
    if !columns.contains(&Some(SeriesColumn::Date)) {
        return Err(read_err("missing 'Date' column".into()));
    }

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| read_err(format!("row {}: {e}", line + 1)))?;
        let mut date = None;
        let mut ticker = None;
        let mut values: Vec<(PriceField, f64)> = Vec::new();

        for (cell, column) in row.iter().zip(&columns) {
            let cell = cell.trim();
            match column {
                Some(SeriesColumn::Date) => {
                    date = Some(
                        BarTime::parse(cell)
                            .and_then(|t| t.for_interval(interval))
                            .ok_or_else(|| {
                                read_err(format!("row {}: unparseable date '{cell}'", line + 1))
                            })?,
                    );
                }
                Some(SeriesColumn::Ticker) => ticker = Symbol::parse(cell),
                Some(SeriesColumn::Field(field)) if !cell.is_empty() => {
                    let value = cell.parse::<f64>().map_err(|e| {
                        read_err(format!("row {}: {}: {e}", line + 1, field.canonical_name()))
                    })?;
                    values.push((*field, value));
                }
                _ => {}
            }
        }

        let date = date.ok_or_else(|| read_err(format!("row {}: empty date", line + 1)))?;
        let mut record = PriceRecord::new(date);
        record.ticker = ticker;
        for (field, value) in values {
            record.set(field, value);
        }
        records.push(record);
    }
    Ok(records)
}

/// Columns written for a series: canonical order, restricted to columns that
/// carry a value in at least one record.
fn present_columns(records: &[PriceRecord]) -> Vec<SeriesColumn> {
    SeriesColumn::CANONICAL
        .into_iter()
        .filter(|column| *column == SeriesColumn::Date || records.iter().any(|r| r.has(*column)))
        .collect()
}

fn cell(record: &PriceRecord, column: SeriesColumn) -> String {
    match column {
        SeriesColumn::Date => record.date.to_string(),
        SeriesColumn::Ticker => record
            .ticker
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_default(),
        SeriesColumn::Field(PriceField::Volume) => {
            record.volume.map(|v| v.to_string()).unwrap_or_default()
        }
        SeriesColumn::Field(field) => record.get(field).map(|v| v.to_string()).unwrap_or_default(),
    }
}

fn render_csv(records: &[PriceRecord]) -> Result<Vec<u8>, csv::Error> {
    let columns = present_columns(records);
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(columns.iter().map(|c| c.header()))?;
    for record in records {
        wtr.write_record(columns.iter().map(|c| cell(record, *c)))?;
    }
    wtr.into_inner().map_err(|e| e.into_error().into())
}

/// Write `records` to `path` via a synced temp file and an atomic rename.
pub fn write_series_atomic(path: &Path, records: &[PriceRecord]) -> Result<(), DataError> {
    let persist_err = |reason: String| DataError::StorePersistFailure {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| persist_err(format!("create dir: {e}")))?;
    }
    let bytes = render_csv(records).map_err(|e| persist_err(format!("encode: {e}")))?;

    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(persist_err(format!("write temp file: {e}")));
    }

    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        persist_err(format!("atomic rename failed: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> BarTime {
        BarTime::Day(NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
    }

    fn bar(d: u32, close: f64) -> PriceRecord {
        let mut r = PriceRecord::new(day(d)).with_ticker(Symbol::parse("SPY").unwrap());
        r.open = Some(close - 1.0);
        r.high = Some(close + 1.0);
        r.low = Some(close - 2.0);
        r.close = Some(close);
        r.adj_close = Some(close);
        r.volume = Some(1000);
        r
    }

    fn spy() -> Symbol {
        Symbol::parse("SPY").unwrap()
    }

    #[test]
    fn merge_prefers_incoming_on_overlap() {
        let (merged, stats) = merge_records(vec![bar(2, 100.0)], vec![bar(2, 105.0)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].close, Some(105.0));
        assert_eq!(stats, MergeStats { added: 0, replaced: 1 });
    }

    #[test]
    fn merge_sorts_out_of_order_input() {
        let (merged, stats) = merge_records(vec![bar(3, 3.0), bar(1, 1.0)], vec![bar(2, 2.0)]);
        let dates: Vec<String> = merged.iter().map(|r| r.date.to_string()).collect();
        assert_eq!(dates, ["2024-01-01", "2024-01-02", "2024-01-03"]);
        assert_eq!(stats.added, 1);
    }

    #[test]
    fn duplicate_incoming_dates_keep_last() {
        let (merged, stats) = merge_records(vec![], vec![bar(2, 1.0), bar(2, 2.0)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].close, Some(2.0));
        assert_eq!(stats.added, 1);
    }

    #[test]
    fn file_roundtrip_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeriesStore::new(dir.path());

        let outcome = store
            .merge_and_persist(&spy(), Interval::Daily, vec![bar(3, 470.5), bar(2, 472.65)])
            .unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.path, dir.path().join("1d").join("SPY.csv"));

        let loaded = store.load(&spy(), Interval::Daily).unwrap();
        assert_eq!(loaded, vec![bar(2, 472.65), bar(3, 470.5)]);
    }

    #[test]
    fn header_is_canonical_subset() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeriesStore::new(dir.path());
        let mut r = PriceRecord::new(day(2));
        r.close = Some(10.0);
        r.volume = Some(5);

        store.merge_and_persist(&spy(), Interval::Daily, vec![r]).unwrap();
        let text = fs::read_to_string(store.series_path(&spy(), Interval::Daily)).unwrap();
        assert_eq!(text, "Date,Close,Volume\n2024-01-02,10,5\n");
    }

    #[test]
    fn reads_files_with_float_volume_and_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.csv");
        fs::write(
            &path,
            "Date,Open,High,Low,Close,Adj Close,Volume,Note\n\
             2024-01-03,1.0,2.0,0.5,1.5,1.4,1200.0,x\n\
             2024-01-02,1.0,2.0,0.5,1.25,,,\n",
        )
        .unwrap();

        let records = read_series(&path, Interval::Daily).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].volume, Some(1200));
        assert_eq!(records[1].adj_close, None);
        assert_eq!(records[1].close, Some(1.25));
        assert_eq!(records[0].ticker, None);
    }

    #[test]
    fn timezone_aware_daily_file_merges_by_calendar_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeriesStore::new(dir.path());
        let path = store.series_path(&spy(), Interval::Daily);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "Date,Close\n2024-01-03 00:00:00-05:00,101\n2024-01-02 00:00:00-05:00,100\n",
        )
        .unwrap();

        let outcome = store
            .merge_and_persist(&spy(), Interval::Daily, vec![bar(2, 105.0)])
            .unwrap();
        assert_eq!((outcome.total, outcome.replaced, outcome.added), (2, 1, 0));

        let loaded = store.load(&spy(), Interval::Daily).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].date, day(2));
        assert_eq!(loaded[0].close, Some(105.0));
        assert_eq!(loaded[1].date, day(3));
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n2024-01-02,"));
    }

    #[test]
    fn unreadable_date_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "Date,Close\nnot-a-date,1\n").unwrap();
        assert!(matches!(read_series(&path, Interval::Daily), Err(DataError::StoreRead { .. })));
    }

    #[test]
    fn failed_persist_keeps_prior_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeriesStore::new(dir.path());
        store
            .merge_and_persist(&spy(), Interval::Daily, vec![bar(2, 100.0)])
            .unwrap();
        let path = store.series_path(&spy(), Interval::Daily);
        let before = fs::read_to_string(&path).unwrap();

        // A directory squatting on the temp path makes the write fail.
        fs::create_dir(dir.path().join("1d").join("SPY.csv.tmp")).unwrap();
        let result = store.merge_and_persist(&spy(), Interval::Daily, vec![bar(3, 101.0)]);

        assert!(matches!(result, Err(DataError::StorePersistFailure { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeriesStore::new(dir.path());
        store
            .merge_and_persist(&spy(), Interval::Daily, vec![bar(2, 100.0)])
            .unwrap();
        let names: Vec<String> = fs::read_dir(dir.path().join("1d"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["SPY.csv"]);
    }

    #[test]
    fn load_missing_series() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeriesStore::new(dir.path());
        assert!(matches!(
            store.load(&spy(), Interval::Daily),
            Err(DataError::NoStoredData { .. })
        ));
    }

    #[test]
    fn load_range_is_inclusive() {
        use crate::domain::REFERENCE_TZ;
        use chrono::TimeZone;

        let dir = tempfile::tempdir().unwrap();
        let store = SeriesStore::new(dir.path());
        store
            .merge_and_persist(
                &spy(),
                Interval::Daily,
                (1..=5).map(|d| bar(d, d as f64)).collect(),
            )
            .unwrap();

        let start = REFERENCE_TZ.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let end = REFERENCE_TZ.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap();
        let records = store.load_range(&spy(), Interval::Daily, &start, &end).unwrap();
        let closes: Vec<f64> = records.iter().filter_map(|r| r.close).collect();
        assert_eq!(closes, [2.0, 3.0, 4.0]);
    }

    #[test]
    fn snapshot_is_timestamped_and_not_merged() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeriesStore::new(dir.path());
        let taken_at = DateTime::parse_from_rfc3339("2024-01-05T21:10:03Z")
            .unwrap()
            .with_timezone(&Utc);

        let path = store
            .write_snapshot(&spy(), Interval::Daily, &[bar(2, 1.0)], taken_at)
            .unwrap();
        assert_eq!(
            path,
            dir.path().join("1d/snapshots/SPY_20240105T211003.csv")
        );
        assert!(!store.exists(&spy(), Interval::Daily));
    }
}
