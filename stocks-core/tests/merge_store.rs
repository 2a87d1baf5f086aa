//! Merge-store behavior against real files in a temporary data root.
//!
//! Covers overlap resolution, chronological re-sorting, idempotent re-merges
//! and the on-disk layout of series and snapshots.

use chrono::{TimeZone, Utc};
use stocks_core::data::{DataError, SeriesStore};
use stocks_core::domain::{BarTime, Interval, PriceField, PriceRecord, Symbol};

fn sym(s: &str) -> Symbol {
    Symbol::parse(s).unwrap()
}

fn bar(date: &str, close: f64) -> PriceRecord {
    let mut r = PriceRecord::new(BarTime::parse(date).unwrap()).with_ticker(sym("AAPL"));
    r.set(PriceField::Close, close);
    r.set(PriceField::Volume, 1_000.0);
    r
}

fn dates(records: &[PriceRecord]) -> Vec<String> {
    records.iter().map(|r| r.date.to_string()).collect()
}

#[test]
fn overlapping_dates_take_incoming_values() {
    let dir = tempfile::tempdir().unwrap();
    let store = SeriesStore::new(dir.path());
    let aapl = sym("AAPL");

    store
        .merge_and_persist(
            &aapl,
            Interval::Daily,
            vec![
                bar("2024-01-01", 100.0),
                bar("2024-01-02", 101.0),
                bar("2024-01-03", 102.0),
            ],
        )
        .unwrap();
    let outcome = store
        .merge_and_persist(
            &aapl,
            Interval::Daily,
            vec![bar("2024-01-03", 105.0), bar("2024-01-04", 106.0)],
        )
        .unwrap();

    assert!(!outcome.created);
    assert_eq!((outcome.previous, outcome.total), (3, 4));
    assert_eq!((outcome.added, outcome.replaced), (1, 1));

    let stored = store.load(&aapl, Interval::Daily).unwrap();
    assert_eq!(
        dates(&stored),
        ["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"]
    );
    assert_eq!(stored[2].close, Some(105.0));
    assert_eq!(stored[1].close, Some(101.0));
}

#[test]
fn earlier_incoming_dates_are_sorted_in() {
    let dir = tempfile::tempdir().unwrap();
    let store = SeriesStore::new(dir.path());
    let aapl = sym("AAPL");

    store
        .merge_and_persist(&aapl, Interval::Daily, vec![bar("2024-01-03", 3.0)])
        .unwrap();
    store
        .merge_and_persist(
            &aapl,
            Interval::Daily,
            vec![bar("2024-01-02", 2.0), bar("2024-01-01", 1.0)],
        )
        .unwrap();

    let stored = store.load(&aapl, Interval::Daily).unwrap();
    assert_eq!(dates(&stored), ["2024-01-01", "2024-01-02", "2024-01-03"]);
}

#[test]
fn re_merging_the_same_batch_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let store = SeriesStore::new(dir.path());
    let aapl = sym("AAPL");
    let batch = vec![bar("2024-01-02", 185.64), bar("2024-01-03", 184.25)];

    let first = store
        .merge_and_persist(&aapl, Interval::Daily, batch.clone())
        .unwrap();
    let bytes = std::fs::read(&first.path).unwrap();

    let second = store.merge_and_persist(&aapl, Interval::Daily, batch).unwrap();
    assert_eq!(second.total, 2);
    assert_eq!(second.added, 0);
    assert_eq!(std::fs::read(&second.path).unwrap(), bytes);
}

#[test]
fn series_file_layout_and_header() {
    let dir = tempfile::tempdir().unwrap();
    let store = SeriesStore::new(dir.path());
    let outcome = store
        .merge_and_persist(&sym("BRK/B"), Interval::Minutes15, vec![bar("2024-01-02", 1.0)])
        .unwrap();

    assert_eq!(outcome.path, dir.path().join("15m").join("BRK_B.csv"));
    let text = std::fs::read_to_string(&outcome.path).unwrap();
    assert_eq!(text.lines().next(), Some("Date,Ticker,Close,Volume"));
}

#[test]
fn intervals_are_stored_separately() {
    let dir = tempfile::tempdir().unwrap();
    let store = SeriesStore::new(dir.path());
    let aapl = sym("AAPL");
    store
        .merge_and_persist(&aapl, Interval::Daily, vec![bar("2024-01-02", 1.0)])
        .unwrap();

    assert!(store.exists(&aapl, Interval::Daily));
    assert!(matches!(
        store.load(&aapl, Interval::Minutes60),
        Err(DataError::NoStoredData { .. })
    ));
}

#[test]
fn concurrent_merges_into_one_series_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = SeriesStore::new(dir.path());
    let aapl = sym("AAPL");

    std::thread::scope(|scope| {
        for day in 1..=8u32 {
            let store = &store;
            let aapl = &aapl;
            scope.spawn(move || {
                let date = format!("2024-01-{day:02}");
                store
                    .merge_and_persist(aapl, Interval::Daily, vec![bar(&date, f64::from(day))])
                    .unwrap();
            });
        }
    });

    let stored = store.load(&aapl, Interval::Daily).unwrap();
    assert_eq!(stored.len(), 8);
    assert!(stored.windows(2).all(|w| w[0].date < w[1].date));
}

#[test]
fn snapshots_are_timestamped_and_never_merged() {
    let dir = tempfile::tempdir().unwrap();
    let store = SeriesStore::new(dir.path());
    let aapl = sym("AAPL");
    let taken_at = Utc.with_ymd_and_hms(2024, 1, 5, 21, 0, 0).unwrap();

    let path = store
        .write_snapshot(&aapl, Interval::Daily, &[bar("2024-01-04", 2.0), bar("2024-01-03", 1.0)], taken_at)
        .unwrap();

    assert_eq!(
        path,
        dir.path()
            .join("1d")
            .join("snapshots")
            .join("AAPL_20240105T210000.csv")
    );
    assert!(!store.exists(&aapl, Interval::Daily));
    let text = std::fs::read_to_string(path).unwrap();
    let first_row = text.lines().nth(1).unwrap();
    assert!(first_row.starts_with("2024-01-03,"));
}
