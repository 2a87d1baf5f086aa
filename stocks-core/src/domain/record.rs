//! Canonical per-symbol price records.
//!
//! Every provider shape is reduced to [`PriceRecord`] rows keyed by a
//! [`BarTime`]. The persisted CSV columns are described by [`SeriesColumn`],
//! always in [`SeriesColumn::CANONICAL`] order.

use super::interval::Interval;
use super::symbol::Symbol;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;

/// Reference time zone for every date and instant in the pipeline.
pub const REFERENCE_TZ: Tz = chrono_tz::US::Eastern;

const DAY_FORMAT: &str = "%Y-%m-%d";
const INSTANT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// Row key of a series: a calendar date for daily bars, a US/Eastern instant
/// for intraday bars.
///
/// A series holds one variant only; [`BarTime::for_interval`] coerces parsed
/// values, since the derived ordering puts every day before every instant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BarTime {
    Day(NaiveDate),
    At(DateTime<Tz>),
}

impl BarTime {
    /// Build a bar time from a UTC epoch timestamp in milliseconds.
    ///
    /// Daily bars keep only the US/Eastern calendar date.
    pub fn from_timestamp_millis(millis: i64, intraday: bool) -> Option<Self> {
        let utc = DateTime::<Utc>::from_timestamp_millis(millis)?;
        let local = utc.with_timezone(&REFERENCE_TZ);
        Some(if intraday {
            BarTime::At(local)
        } else {
            BarTime::Day(local.date_naive())
        })
    }

    /// The instant this bar starts at. Days map to US/Eastern midnight.
    pub fn instant(&self) -> Option<DateTime<Tz>> {
        match self {
            BarTime::Day(date) => REFERENCE_TZ
                .from_local_datetime(&date.and_time(NaiveTime::MIN))
                .earliest(),
            BarTime::At(at) => Some(*at),
        }
    }

    /// The variant matching `interval`: an instant is reduced to its
    /// US/Eastern date for daily bars, a date becomes US/Eastern midnight for
    /// intraday bars.
    pub fn for_interval(self, interval: Interval) -> Option<Self> {
        match (self, interval.is_intraday()) {
            (BarTime::At(at), false) => Some(BarTime::Day(at.with_timezone(&REFERENCE_TZ).date_naive())),
            (day @ BarTime::Day(_), true) => day.instant().map(BarTime::At),
            (same, _) => Some(same),
        }
    }

    /// Parse the stored text form.
    ///
    /// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS±HH:MM`, RFC 3339, and a bare
    /// `YYYY-MM-DD HH:MM:SS` (read as US/Eastern wall time).
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(date) = NaiveDate::parse_from_str(text, DAY_FORMAT) {
            return Some(BarTime::Day(date));
        }
        if let Ok(at) = DateTime::parse_from_str(text, INSTANT_FORMAT) {
            return Some(BarTime::At(at.with_timezone(&REFERENCE_TZ)));
        }
        if let Ok(at) = DateTime::parse_from_rfc3339(text) {
            return Some(BarTime::At(at.with_timezone(&REFERENCE_TZ)));
        }
        let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").ok()?;
        REFERENCE_TZ
            .from_local_datetime(&naive)
            .earliest()
            .map(BarTime::At)
    }
}

impl fmt::Display for BarTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarTime::Day(date) => write!(f, "{}", date.format(DAY_FORMAT)),
            BarTime::At(at) => write!(f, "{}", at.format(INSTANT_FORMAT)),
        }
    }
}

/// Canonical value fields of a price record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    AdjClose,
    Volume,
}

/// Provider field spellings and the canonical field each one maps to.
const PROVIDER_SPELLINGS: [(&str, PriceField); 8] = [
    ("Open", PriceField::Open),
    ("High", PriceField::High),
    ("Low", PriceField::Low),
    ("Close", PriceField::Close),
    ("Adj Close", PriceField::AdjClose),
    ("Adj_Close", PriceField::AdjClose),
    ("AdjClose", PriceField::AdjClose),
    ("Volume", PriceField::Volume),
];

impl PriceField {
    pub const ALL: [PriceField; 6] = [
        PriceField::Open,
        PriceField::High,
        PriceField::Low,
        PriceField::Close,
        PriceField::AdjClose,
        PriceField::Volume,
    ];

    /// Map a provider column spelling to its canonical field.
    pub fn from_provider(name: &str) -> Option<Self> {
        PROVIDER_SPELLINGS
            .iter()
            .find(|(spelling, _)| *spelling == name)
            .map(|(_, field)| *field)
    }

    /// Column header used in persisted files.
    pub fn canonical_name(self) -> &'static str {
        match self {
            PriceField::Open => "Open",
            PriceField::High => "High",
            PriceField::Low => "Low",
            PriceField::Close => "Close",
            PriceField::AdjClose => "Adj Close",
            PriceField::Volume => "Volume",
        }
    }
}

/// A column of a persisted series file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesColumn {
    Date,
    Ticker,
    Field(PriceField),
}

impl SeriesColumn {
    pub const CANONICAL: [SeriesColumn; 8] = [
        SeriesColumn::Date,
        SeriesColumn::Ticker,
        SeriesColumn::Field(PriceField::Open),
        SeriesColumn::Field(PriceField::High),
        SeriesColumn::Field(PriceField::Low),
        SeriesColumn::Field(PriceField::Close),
        SeriesColumn::Field(PriceField::AdjClose),
        SeriesColumn::Field(PriceField::Volume),
    ];

    pub fn header(self) -> &'static str {
        match self {
            SeriesColumn::Date => "Date",
            SeriesColumn::Ticker => "Ticker",
            SeriesColumn::Field(field) => field.canonical_name(),
        }
    }

    pub fn from_header(header: &str) -> Option<Self> {
        Self::CANONICAL
            .into_iter()
            .find(|column| column.header() == header.trim())
    }
}

/// One row of a symbol's series.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub date: BarTime,
    pub ticker: Option<Symbol>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    pub volume: Option<u64>,
}

impl PriceRecord {
    /// An empty row for `date`; fields are filled with [`PriceRecord::set`].
    pub fn new(date: BarTime) -> Self {
        Self {
            date,
            ticker: None,
            open: None,
            high: None,
            low: None,
            close: None,
            adj_close: None,
            volume: None,
        }
    }

    pub fn with_ticker(mut self, ticker: Symbol) -> Self {
        self.ticker = Some(ticker);
        self
    }

    /// Read a field as a float (volume widened).
    pub fn get(&self, field: PriceField) -> Option<f64> {
        match field {
            PriceField::Open => self.open,
            PriceField::High => self.high,
            PriceField::Low => self.low,
            PriceField::Close => self.close,
            PriceField::AdjClose => self.adj_close,
            PriceField::Volume => self.volume.map(|v| v as f64),
        }
    }

    /// Write a field. NaN clears it; volume must be a finite non-negative number.
    pub fn set(&mut self, field: PriceField, value: f64) {
        let value = (!value.is_nan()).then_some(value);
        match field {
            PriceField::Open => self.open = value,
            PriceField::High => self.high = value,
            PriceField::Low => self.low = value,
            PriceField::Close => self.close = value,
            PriceField::AdjClose => self.adj_close = value,
            PriceField::Volume => {
                self.volume = value
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .map(|v| v.round() as u64);
            }
        }
    }

    /// Whether this row carries a value for `column`.
    pub fn has(&self, column: SeriesColumn) -> bool {
        match column {
            SeriesColumn::Date => true,
            SeriesColumn::Ticker => self.ticker.is_some(),
            SeriesColumn::Field(field) => self.get(field).is_some(),
        }
    }

    /// True when no value field is present (non-trading row).
    pub fn is_void(&self) -> bool {
        PriceField::ALL.iter().all(|f| self.get(*f).is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> BarTime {
        BarTime::Day(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn day_text_roundtrip() {
        let t = day(2024, 1, 2);
        assert_eq!(t.to_string(), "2024-01-02");
        assert_eq!(BarTime::parse("2024-01-02"), Some(t));
    }

    #[test]
    fn instant_text_is_eastern_with_offset() {
        // 2024-01-02 14:30 UTC is 09:30 EST.
        let t = BarTime::from_timestamp_millis(1_704_205_800_000, true).unwrap();
        assert_eq!(t.to_string(), "2024-01-02 09:30:00-05:00");
        assert_eq!(BarTime::parse("2024-01-02 09:30:00-05:00"), Some(t.clone()));
        assert_eq!(BarTime::parse("2024-01-02T14:30:00Z"), Some(t.clone()));
        assert_eq!(BarTime::parse("2024-01-02 09:30:00"), Some(t));
    }

    #[test]
    fn daily_timestamp_keeps_eastern_date() {
        // 2024-01-03 02:00 UTC is still Jan 2 in New York.
        let t = BarTime::from_timestamp_millis(1_704_247_200_000, false).unwrap();
        assert_eq!(t, day(2024, 1, 2));
    }

    #[test]
    fn stored_midnight_instant_becomes_a_day() {
        let t = BarTime::parse("2024-01-02 00:00:00-05:00").unwrap();
        assert!(matches!(t, BarTime::At(_)));
        assert_eq!(t.for_interval(Interval::Daily), Some(day(2024, 1, 2)));
    }

    #[test]
    fn day_becomes_eastern_midnight_for_intraday() {
        let t = day(2024, 1, 2).for_interval(Interval::Minutes15).unwrap();
        assert_eq!(t.to_string(), "2024-01-02 00:00:00-05:00");
        assert_eq!(t.clone().for_interval(Interval::Minutes1), Some(t));
    }

    #[test]
    fn garbage_does_not_parse() {
        assert_eq!(BarTime::parse("yesterday"), None);
        assert_eq!(BarTime::parse("2024-13-40"), None);
    }

    #[test]
    fn provider_spellings_map_to_canonical_fields() {
        assert_eq!(PriceField::from_provider("Adj Close"), Some(PriceField::AdjClose));
        assert_eq!(PriceField::from_provider("Adj_Close"), Some(PriceField::AdjClose));
        assert_eq!(PriceField::from_provider("Volume"), Some(PriceField::Volume));
        assert_eq!(PriceField::from_provider("Dividends"), None);
        assert_eq!(PriceField::from_provider("close"), None);
    }

    #[test]
    fn canonical_column_order() {
        let headers: Vec<&str> = SeriesColumn::CANONICAL.iter().map(|c| c.header()).collect();
        assert_eq!(
            headers,
            ["Date", "Ticker", "Open", "High", "Low", "Close", "Adj Close", "Volume"]
        );
    }

    #[test]
    fn set_handles_nan_and_volume() {
        let mut r = PriceRecord::new(day(2024, 1, 2));
        assert!(r.is_void());
        r.set(PriceField::Close, f64::NAN);
        assert!(r.is_void());
        r.set(PriceField::Volume, 1234.0);
        assert_eq!(r.volume, Some(1234));
        r.set(PriceField::Volume, -5.0);
        assert_eq!(r.volume, None);
        r.set(PriceField::Close, 101.5);
        assert!(r.has(SeriesColumn::Field(PriceField::Close)));
        assert!(!r.has(SeriesColumn::Ticker));
    }
}
