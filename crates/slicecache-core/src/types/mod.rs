//! Value types shared by every planning stage: calendar days, inclusive day
//! ranges, and additive count pairs.

mod count;
mod date;
mod range;

pub use count::DayCount;
pub use date::Date;
pub use range::{DateRange, RangeError};
