//! Raw provider tables.
//!
//! A [`RawResponseTable`] is what a provider hands back for one batch: a time
//! index column followed by value columns. Multi-symbol responses key their
//! value columns by `(field, symbol)`; single-symbol responses key them by
//! field alone. The frame is a polars `DataFrame` whose first column is the
//! index and whose remaining columns line up with [`RawResponseTable::keys`].

use super::provider::DataError;
use crate::domain::Symbol;
use polars::prelude::*;

/// Shape of the time index column, mirroring common provider spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Datetime-typed index named `Date` (daily responses).
    Date,
    /// Datetime-typed index named `Datetime` (intraday responses).
    Datetime,
    /// Untyped positional index named `index`, epoch milliseconds.
    Positional,
}

impl IndexKind {
    pub fn column_name(self) -> &'static str {
        match self {
            IndexKind::Date => "Date",
            IndexKind::Datetime => "Datetime",
            IndexKind::Positional => "index",
        }
    }
}

/// Key of one value column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKey {
    /// Single-symbol response: the provider field name only.
    Field(String),
    /// Multi-symbol response: composite `(field, symbol)` key.
    Pair { field: String, symbol: Symbol },
}

impl ColumnKey {
    /// Name of the column inside the raw frame.
    pub fn frame_name(&self) -> String {
        match self {
            ColumnKey::Field(field) => field.clone(),
            ColumnKey::Pair { field, symbol } => format!("('{field}', '{symbol}')"),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            ColumnKey::Field(field) | ColumnKey::Pair { field, .. } => field,
        }
    }
}

/// Tabular response for one fetch batch.
///
/// Symbols the provider failed to fetch travel alongside the rows so the
/// rest of the batch is still usable.
#[derive(Debug)]
pub struct RawResponseTable {
    frame: DataFrame,
    keys: Vec<ColumnKey>,
    failures: Vec<(Symbol, DataError)>,
}

impl RawResponseTable {
    /// A table with no rows and no value columns.
    pub fn empty() -> Self {
        Self {
            frame: DataFrame::empty(),
            keys: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn builder(index: IndexKind, timestamps_ms: Vec<i64>) -> RawTableBuilder {
        RawTableBuilder {
            index,
            timestamps_ms,
            columns: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() || self.frame.height() == 0
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Attach per-symbol fetch failures.
    pub fn with_failures(mut self, failures: Vec<(Symbol, DataError)>) -> Self {
        self.failures.extend(failures);
        self
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Remove and return the per-symbol fetch failures.
    pub fn take_failures(&mut self) -> Vec<(Symbol, DataError)> {
        std::mem::take(&mut self.failures)
    }

    /// True when value columns use composite `(field, symbol)` keys.
    #[cfg(test)]
    pub(crate) fn is_composite(&self) -> bool {
        self.keys.iter().any(|k| matches!(k, ColumnKey::Pair { .. }))
    }

    #[cfg(test)]
    pub(crate) fn keys(&self) -> &[ColumnKey] {
        &self.keys
    }

    #[cfg(test)]
    pub(crate) fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_parts(self) -> (DataFrame, Vec<ColumnKey>) {
        (self.frame, self.keys)
    }
}

/// Incremental construction of a [`RawResponseTable`].
pub struct RawTableBuilder {
    index: IndexKind,
    timestamps_ms: Vec<i64>,
    columns: Vec<(ColumnKey, Vec<Option<f64>>)>,
}

impl RawTableBuilder {
    /// Add a single-symbol value column.
    pub fn field(mut self, field: &str, values: Vec<Option<f64>>) -> Self {
        self.columns.push((ColumnKey::Field(field.to_string()), values));
        self
    }

    /// Add a composite `(field, symbol)` value column.
    pub fn pair(mut self, field: &str, symbol: &Symbol, values: Vec<Option<f64>>) -> Self {
        self.columns.push((
            ColumnKey::Pair {
                field: field.to_string(),
                symbol: symbol.clone(),
            },
            values,
        ));
        self
    }

    pub fn build(self) -> Result<RawResponseTable, DataError> {
        let format_err = |reason: String| DataError::ResponseFormatChanged(reason);

        let composite = self
            .columns
            .iter()
            .filter(|(k, _)| matches!(k, ColumnKey::Pair { .. }))
            .count();
        if composite != 0 && composite != self.columns.len() {
            return Err(format_err("mixed single and composite column keys".into()));
        }

        let height = self.timestamps_ms.len();
        let index = Column::new(self.index.column_name().into(), self.timestamps_ms);
        let index = match self.index {
            IndexKind::Positional => index,
            IndexKind::Date | IndexKind::Datetime => index
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                .map_err(|e| format_err(format!("index cast: {e}")))?,
        };

        let mut frame_columns = Vec::with_capacity(self.columns.len() + 1);
        frame_columns.push(index);
        let mut keys = Vec::with_capacity(self.columns.len());
        for (key, values) in self.columns {
            if values.len() != height {
                return Err(format_err(format!(
                    "column {} has {} rows, index has {height}",
                    key.frame_name(),
                    values.len()
                )));
            }
            frame_columns.push(Column::new(key.frame_name().into(), values));
            keys.push(key);
        }

        let frame = DataFrame::new(frame_columns)
            .map_err(|e| format_err(format!("dataframe creation: {e}")))?;
        Ok(RawResponseTable {
            frame,
            keys,
            failures: Vec::new(),
        })
    }
}
