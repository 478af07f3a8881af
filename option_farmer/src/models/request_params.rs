//! Vendor-agnostic request parameters for chain queries.

use chrono::{Days, NaiveDate};

/// Inclusive strike price window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrikeBounds {
    pub lower: f64,
    pub upper: f64,
}

impl StrikeBounds {
    /// Window wide enough to contain `half_width` strikes on each side of the
    /// underlying price at ten-point spacing, plus a ten-point buffer.
    pub fn around(underlying_price: f64, half_width: usize) -> Self {
        let gap = half_width as f64 * 10.0 + 10.0;
        Self {
            lower: underlying_price - gap,
            upper: underlying_price + gap,
        }
    }
}

/// Inclusive expiration date window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateBounds {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateBounds {
    /// Window spanning the shortest horizon minus 30 days to the longest
    /// horizon plus 30 days. Empty horizons yield a window of `today` only.
    pub fn for_horizons(today: NaiveDate, horizons: &[u32]) -> Self {
        let shortest = horizons.iter().copied().min().unwrap_or(0) as i64;
        let longest = horizons.iter().copied().max().unwrap_or(0) as i64;
        Self {
            start: offset(today, shortest - 30),
            end: offset(today, longest + 30),
        }
    }
}

fn offset(day: NaiveDate, days: i64) -> NaiveDate {
    let shifted = if days >= 0 {
        day.checked_add_days(Days::new(days as u64))
    } else {
        day.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted.unwrap_or(day)
}
