//! Ticker symbols.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An uppercase ticker symbol, the unit of storage and retrieval.
///
/// Symbols are only built through [`Symbol::parse`], which trims and uppercases
/// the raw text. Punctuation (`.`, `-`, `^`, `=`, `/`, `:`) is kept as-is; the
/// store maps path-hostile characters when it derives a file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize raw ticker text. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-system safe stem: path separators and colons become underscores.
    pub fn file_stem(&self) -> String {
        self.0.replace(['/', '\\', ':'], "_")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_uppercases() {
        assert_eq!(Symbol::parse("  aapl ").unwrap().as_str(), "AAPL");
        assert_eq!(Symbol::parse("brk.b").unwrap().as_str(), "BRK.B");
    }

    #[test]
    fn blank_is_rejected() {
        assert!(Symbol::parse("").is_none());
        assert!(Symbol::parse("   ").is_none());
    }

    #[test]
    fn file_stem_replaces_separators() {
        let sym = Symbol::parse("btc/usd").unwrap();
        assert_eq!(sym.file_stem(), "BTC_USD");
        let sym = Symbol::parse(r"a\b:c").unwrap();
        assert_eq!(sym.file_stem(), "A_B_C");
        assert_eq!(Symbol::parse("^gspc").unwrap().file_stem(), "^GSPC");
    }
}
