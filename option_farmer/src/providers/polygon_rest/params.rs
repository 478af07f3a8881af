use std::num::NonZeroU32;

use nonzero_ext::nonzero;

use crate::models::request_params::{DateBounds, StrikeBounds};

/// Largest page the reference contracts endpoint serves.
pub const REFERENCE_PAGE_LIMIT: NonZeroU32 = nonzero!(1000u32);

/// Largest page the chain snapshot endpoint serves.
pub const SNAPSHOT_PAGE_LIMIT: NonZeroU32 = nonzero!(250u32);

/// Query parameters for `/v3/reference/options/contracts`.
pub fn reference_params(
    symbol: &str,
    strikes: StrikeBounds,
    dates: DateBounds,
    limit: NonZeroU32,
) -> Vec<(String, String)> {
    vec![
        ("underlying_ticker".to_string(), symbol.to_string()),
        ("strike_price.gte".to_string(), strikes.lower.to_string()),
        ("strike_price.lte".to_string(), strikes.upper.to_string()),
        (
            "expiration_date.gte".to_string(),
            dates.start.format("%Y-%m-%d").to_string(),
        ),
        (
            "expiration_date.lte".to_string(),
            dates.end.format("%Y-%m-%d").to_string(),
        ),
        ("limit".to_string(), limit.to_string()),
    ]
}

/// Query parameters for `/v3/snapshot/options/{symbol}`.
pub fn snapshot_params(limit: NonZeroU32) -> Vec<(String, String)> {
    vec![("limit".to_string(), limit.to_string())]
}
