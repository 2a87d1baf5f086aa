//! Bar intervals supported by the download pipeline.

use crate::data::DataError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sampling interval of a price series.
///
/// Each interval gets its own storage directory, so daily and intraday series
/// for the same symbol never share a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "60m")]
    Minutes60,
    #[serde(rename = "15m")]
    Minutes15,
    #[serde(rename = "5m")]
    Minutes5,
    #[serde(rename = "2m")]
    Minutes2,
    #[serde(rename = "1m")]
    Minutes1,
}

impl Interval {
    pub const ALL: [Interval; 6] = [
        Interval::Daily,
        Interval::Minutes60,
        Interval::Minutes15,
        Interval::Minutes5,
        Interval::Minutes2,
        Interval::Minutes1,
    ];

    /// Wire/directory spelling (`1d`, `60m`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Daily => "1d",
            Interval::Minutes60 => "60m",
            Interval::Minutes15 => "15m",
            Interval::Minutes5 => "5m",
            Interval::Minutes2 => "2m",
            Interval::Minutes1 => "1m",
        }
    }

    pub fn is_intraday(self) -> bool {
        self != Interval::Daily
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str() == wanted)
            .ok_or_else(|| DataError::InvalidInterval(s.to_string()))
    }
}
