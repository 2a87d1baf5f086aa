//! Schema normalization: provider tables → canonical per-symbol records.
//!
//! Steps for one batch table:
//! 1. flatten composite `(field, symbol)` keys to `<Field>_<Symbol>` names
//!    (single-symbol tables are suffixed with the one requested symbol)
//! 2. rename the index column (`Date`, `Datetime` or `index`) to `Date`
//! 3. per requested symbol, take the columns carrying its suffix and map
//!    each stripped field name through [`PriceField::from_provider`]
//! 4. emit rows with a synthesized `Ticker`, dropping rows with no values
//!
//! Field names outside the known table are rejected for that symbol rather
//! than guessed at.

use super::provider::DataError;
use super::table::{ColumnKey, IndexKind, RawResponseTable};
use crate::domain::{BarTime, Interval, PriceField, PriceRecord, Symbol};
use polars::prelude::*;

const INDEX_CANDIDATES: [IndexKind; 3] = [IndexKind::Date, IndexKind::Datetime, IndexKind::Positional];

/// Normalized records for every symbol of a batch, in request order.
#[derive(Debug)]
pub struct NormalizedBatch {
    entries: Vec<(Symbol, Result<Vec<PriceRecord>, DataError>)>,
}

impl NormalizedBatch {
    pub fn get(&self, symbol: &Symbol) -> Option<&Result<Vec<PriceRecord>, DataError>> {
        self.entries
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, records)| records)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for NormalizedBatch {
    type Item = (Symbol, Result<Vec<PriceRecord>, DataError>);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

fn polars_err(e: PolarsError) -> DataError {
    DataError::Normalize(e.to_string())
}

/// Reshape a batch table into canonical records for each requested symbol.
///
/// Table-level problems (no index column, a flat table for several symbols)
/// fail the whole batch; field problems fail only the affected symbol.
pub fn normalize(
    table: RawResponseTable,
    symbols: &[Symbol],
    interval: Interval,
) -> Result<NormalizedBatch, DataError> {
    if table.is_empty() {
        let entries = symbols.iter().map(|s| (s.clone(), Ok(Vec::new()))).collect();
        return Ok(NormalizedBatch { entries });
    }

    let (mut frame, keys) = table.into_parts();
    let flat_names = flatten_names(&keys, symbols)?;
    for (key, flat) in keys.iter().zip(&flat_names) {
        frame
            .rename(&key.frame_name(), flat.as_str().into())
            .map_err(polars_err)?;
    }

    let index_name = INDEX_CANDIDATES
        .iter()
        .map(|kind| kind.column_name())
        .find(|name| frame.column(name).is_ok())
        .ok_or_else(|| DataError::Normalize("no Date, Datetime or index column".into()))?;
    if index_name != "Date" {
        frame.rename(index_name, "Date".into()).map_err(polars_err)?;
    }
    let times = bar_times(&frame, interval)?;

    let entries = symbols
        .iter()
        .map(|symbol| {
            let records = symbol_records(&frame, &flat_names, symbols, symbol, &times);
            (symbol.clone(), records)
        })
        .collect();
    Ok(NormalizedBatch { entries })
}

/// Flattened `<Field>_<Symbol>` name for every value column.
fn flatten_names(keys: &[ColumnKey], symbols: &[Symbol]) -> Result<Vec<String>, DataError> {
    keys.iter()
        .map(|key| match key {
            ColumnKey::Pair { field, symbol } => Ok(format!("{field}_{symbol}")),
            ColumnKey::Field(field) => match symbols {
                [only] => Ok(format!("{field}_{only}")),
                _ => Err(DataError::Normalize(format!(
                    "single-symbol table returned for {} requested symbols",
                    symbols.len()
                ))),
            },
        })
        .collect()
}

fn bar_times(frame: &DataFrame, interval: Interval) -> Result<Vec<BarTime>, DataError> {
    let millis = frame
        .column("Date")
        .and_then(|c| c.cast(&DataType::Int64))
        .map_err(polars_err)?;
    let millis = millis.i64().map_err(polars_err)?;

    millis
        .into_iter()
        .enumerate()
        .map(|(row, ms)| {
            ms.and_then(|ms| BarTime::from_timestamp_millis(ms, interval.is_intraday()))
                .ok_or_else(|| DataError::Normalize(format!("invalid timestamp at row {row}")))
        })
        .collect()
}

/// The requested symbol owning a flattened column: the longest `_<Symbol>`
/// suffix wins, so `Close_B_A` belongs to `B_A` rather than `A`.
fn owner<'a>(name: &str, symbols: &'a [Symbol]) -> Option<&'a Symbol> {
    symbols
        .iter()
        .filter(|s| {
            let suffix_len = s.as_str().len() + 1;
            name.len() > suffix_len
                && name.ends_with(s.as_str())
                && name.as_bytes()[name.len() - suffix_len] == b'_'
        })
        .max_by_key(|s| s.as_str().len())
}

fn symbol_records(
    frame: &DataFrame,
    flat_names: &[String],
    symbols: &[Symbol],
    symbol: &Symbol,
    times: &[BarTime],
) -> Result<Vec<PriceRecord>, DataError> {
    let mut fields: Vec<(PriceField, Vec<Option<f64>>)> = Vec::new();

    for name in flat_names {
        if owner(name, symbols) != Some(symbol) {
            continue;
        }
        let raw_field = &name[..name.len() - symbol.as_str().len() - 1];
        let field = PriceField::from_provider(raw_field).ok_or_else(|| DataError::UnknownField {
            symbol: symbol.to_string(),
            field: raw_field.to_string(),
        })?;
        if fields.iter().any(|(f, _)| *f == field) {
            return Err(DataError::Normalize(format!(
                "{symbol}: field '{}' supplied twice",
                field.canonical_name()
            )));
        }
        fields.push((field, float_values(frame, name)?));
    }

    if fields.is_empty() {
        return Ok(Vec::new());
    }

    let mut records = Vec::with_capacity(times.len());
    for (row, time) in times.iter().enumerate() {
        let mut record = PriceRecord::new(time.clone()).with_ticker(symbol.clone());
        for (field, values) in &fields {
            if let Some(value) = values[row] {
                record.set(*field, value);
            }
        }
        if !record.is_void() {
            records.push(record);
        }
    }
    Ok(records)
}

fn float_values(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, DataError> {
    let column = frame
        .column(name)
        .and_then(|c| c.cast(&DataType::Float64))
        .map_err(polars_err)?;
    let values = column.f64().map_err(polars_err)?;
    Ok(values.into_iter().collect())
}
