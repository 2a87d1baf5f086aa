//! Domain types shared by every pipeline stage.

pub mod interval;
pub mod record;
pub mod symbol;

pub use interval::Interval;
pub use record::{BarTime, PriceField, PriceRecord, SeriesColumn, REFERENCE_TZ};
pub use symbol::Symbol;
