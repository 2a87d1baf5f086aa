//! Ticker set resolution.
//!
//! A ticker source is one of:
//! - a directory: every `*.csv` reference file in it contributes its `Symbol` column
//! - a single reference file with a `Symbol` column
//! - an inline comma-separated list
//!
//! The result is deduplicated in first-seen order so batching is reproducible.

use super::provider::DataError;
use crate::domain::Symbol;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the column read from reference files.
pub const SYMBOL_COLUMN: &str = "Symbol";

/// Resolve a ticker source into an ordered, deduplicated, non-empty symbol list.
pub fn resolve_tickers(source: &str) -> Result<Vec<Symbol>, DataError> {
    let path = Path::new(source);
    let symbols = if path.is_dir() {
        let mut all = Vec::new();
        for file in reference_files(path)? {
            all.extend(read_reference_file(&file)?);
        }
        all
    } else if path.is_file() {
        read_reference_file(path)?
    } else {
        source.split(',').filter_map(Symbol::parse).collect()
    };

    let symbols = dedup_first_seen(symbols);
    if symbols.is_empty() {
        return Err(DataError::NoTickersFound {
            input: source.to_string(),
        });
    }
    Ok(symbols)
}

/// CSV files directly inside `dir`, sorted by file name.
fn reference_files(dir: &Path) -> Result<Vec<PathBuf>, DataError> {
    let entries = fs::read_dir(dir).map_err(|e| DataError::ReferenceFile {
        path: dir.to_path_buf(),
        reason: format!("read dir: {e}"),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DataError::ReferenceFile {
            path: dir.to_path_buf(),
            reason: format!("dir entry: {e}"),
        })?;
        let path = entry.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read the `Symbol` column of one reference file, skipping blank cells.
pub fn read_reference_file(path: &Path) -> Result<Vec<Symbol>, DataError> {
    let file_err = |reason: String| DataError::ReferenceFile {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| file_err(format!("open: {e}")))?;

    let column = reader
        .headers()
        .map_err(|e| file_err(format!("header: {e}")))?
        .iter()
        .position(|h| h.trim() == SYMBOL_COLUMN)
        .ok_or_else(|| file_err(format!("missing '{SYMBOL_COLUMN}' column")))?;

    let mut symbols = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| file_err(format!("row: {e}")))?;
        if let Some(symbol) = row.get(column).and_then(Symbol::parse) {
            symbols.push(symbol);
        }
    }
    Ok(symbols)
}

fn dedup_first_seen(symbols: Vec<Symbol>) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    symbols
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(symbols: &[Symbol]) -> Vec<&str> {
        symbols.iter().map(|s| s.as_str()).collect()
    }

    #[test]
    fn inline_list_is_trimmed_and_uppercased() {
        let symbols = resolve_tickers("aapl, MSFT ,goog").unwrap();
        assert_eq!(names(&symbols), ["AAPL", "MSFT", "GOOG"]);
    }

    #[test]
    fn inline_list_drops_blanks_and_duplicates() {
        let symbols = resolve_tickers("spy,, qqq ,SPY,").unwrap();
        assert_eq!(names(&symbols), ["SPY", "QQQ"]);
    }

    #[test]
    fn blank_inline_list_finds_nothing() {
        assert!(matches!(
            resolve_tickers(" , ,"),
            Err(DataError::NoTickersFound { .. })
        ));
    }

    #[test]
    fn single_reference_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sp500.csv");
        fs::write(&path, "Symbol,Name\naapl,Apple\n,Blank\nmsft,Microsoft\nAAPL,Dup\n").unwrap();

        let symbols = resolve_tickers(path.to_str().unwrap()).unwrap();
        assert_eq!(names(&symbols), ["AAPL", "MSFT"]);
    }

    #[test]
    fn directory_unions_all_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "Name,Symbol\nNvidia,nvda\nApple,aapl\n").unwrap();
        fs::write(dir.path().join("a.csv"), "Symbol\nAAPL\nGOOG\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "Symbol\nIGNORED\n").unwrap();

        let symbols = resolve_tickers(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(names(&symbols), ["AAPL", "GOOG", "NVDA"]);
    }

    #[test]
    fn reference_file_without_symbol_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "Ticker\nAAPL\n").unwrap();

        assert!(matches!(
            resolve_tickers(path.to_str().unwrap()),
            Err(DataError::ReferenceFile { .. })
        ));
    }

    #[test]
    fn empty_directory_finds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_tickers(dir.path().to_str().unwrap()),
            Err(DataError::NoTickersFound { .. })
        ));
    }
}
