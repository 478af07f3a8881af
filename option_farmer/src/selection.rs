//! Pure selection logic: which expiries and which strikes of a symbol's chain
//! end up in the output.
//!
//! Nothing here performs I/O. Given the raw contracts of one symbol, its
//! underlying price and the target horizons, [`harvest_ladders`] picks the
//! expiry closest to each horizon, builds an ATM ladder from that expiry's
//! strikes and emits one [`FilteredOption`] per matching contract.

pub mod expiry;
pub mod filter;
pub mod ladder;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;

use crate::models::{contract::RawContract, option::FilteredOption};

pub use expiry::{ExpirySelection, select_nearest_expiries};
pub use filter::filter_by_ladder_and_expiry;
pub use ladder::{StrikeLadder, build_strike_ladder};

/// Per-run attributes stamped onto every emitted row.
#[derive(Clone, Copy, Debug)]
pub struct RowContext<'a> {
    pub symbol: &'a str,
    pub as_of: NaiveDateTime,
    pub today: NaiveDate,
}

/// Result of running selection over one symbol's contracts.
#[derive(Clone, Debug, Default)]
pub struct Selected {
    pub expiries: ExpirySelection,
    pub rows: Vec<FilteredOption>,
    /// Records skipped because an identifying field was missing or unusable.
    pub malformed: usize,
    /// Records that passed validation.
    pub usable: usize,
}

/// Selects expiries, builds one strike ladder per selected expiry and
/// filters the chain down to the laddered contracts.
pub fn harvest_ladders(
    contracts: &[RawContract],
    underlying_price: f64,
    horizons: &[u32],
    half_width: usize,
    ctx: RowContext<'_>,
) -> Selected {
    let mut malformed = Vec::new();
    let mut usable = 0usize;
    for contract in contracts {
        match contract.terms() {
            Ok(_) => usable += 1,
            Err(err) => malformed.push(err),
        }
    }
    if !malformed.is_empty() {
        let sample: Vec<&str> = malformed.iter().take(5).map(|e| e.ticker.as_str()).collect();
        warn!(
            symbol = ctx.symbol,
            skipped = malformed.len(),
            ?sample,
            first_problem = %malformed[0].problem,
            "skipping malformed contracts"
        );
    }

    let expiries = select_nearest_expiries(contracts, horizons, ctx.today);
    let mut rows = Vec::new();
    for (horizon, expiry) in expiries.iter() {
        let strikes = contracts
            .iter()
            .filter_map(|c| c.terms().ok())
            .filter(|t| t.expiry == expiry)
            .map(|t| t.strike);
        let ladder = build_strike_ladder(underlying_price, strikes, half_width);
        rows.extend(filter_by_ladder_and_expiry(
            contracts, &ladder, expiry, horizon, ctx,
        ));
    }

    Selected {
        expiries,
        rows,
        malformed: malformed.len(),
        usable,
    }
}
