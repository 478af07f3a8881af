use std::collections::BTreeSet;

use chrono::NaiveDate;
use indexmap::IndexMap;
use tracing::debug;

use crate::models::contract::RawContract;

/// Target horizon (days) to the chosen expiration date, ordered by horizon.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpirySelection {
    by_horizon: IndexMap<u32, NaiveDate>,
}

impl ExpirySelection {
    pub fn get(&self, horizon: u32) -> Option<NaiveDate> {
        self.by_horizon.get(&horizon).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, NaiveDate)> + '_ {
        self.by_horizon.iter().map(|(h, d)| (*h, *d))
    }

    pub fn len(&self) -> usize {
        self.by_horizon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_horizon.is_empty()
    }
}

/// For every distinct horizon, the future expiry whose distance from `today`
/// is closest to it. On a tie the earlier date wins. Expiries on or before
/// `today` never qualify.
pub fn select_nearest_expiries(
    contracts: &[RawContract],
    horizons: &[u32],
    today: NaiveDate,
) -> ExpirySelection {
    let mut expiries = BTreeSet::new();
    for contract in contracts {
        match contract.terms() {
            Ok(terms) if terms.expiry > today => {
                expiries.insert(terms.expiry);
            }
            Ok(_) => {}
            Err(err) => debug!(%err, "expiry scan skipped record"),
        }
    }

    let targets: BTreeSet<u32> = horizons.iter().copied().collect();
    let mut by_horizon = IndexMap::new();
    if expiries.is_empty() {
        return ExpirySelection { by_horizon };
    }

    for horizon in targets {
        let mut best: Option<(i64, NaiveDate)> = None;
        // Ascending iteration plus a strict comparison keeps the earliest date on ties.
        for &expiry in &expiries {
            let distance = ((expiry - today).num_days() - i64::from(horizon)).abs();
            if best.is_none_or(|(d, _)| distance < d) {
                best = Some((distance, expiry));
            }
        }
        if let Some((_, expiry)) = best {
            by_horizon.insert(horizon, expiry);
        }
    }

    ExpirySelection { by_horizon }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::test_support::{contract, today};
    use chrono::Days;

    fn day(offset: u64) -> NaiveDate {
        today().checked_add_days(Days::new(offset)).unwrap()
    }

    #[test]
    fn exact_ties_resolve_to_the_earliest_expiry() {
        let chain: Vec<_> = [25, 35, 80, 100]
            .into_iter()
            .map(|d| contract("SPY", d, 500.0, "call"))
            .collect();

        let selection = select_nearest_expiries(&chain, &[90, 30], today());
        let picked: Vec<_> = selection.iter().collect();
        assert_eq!(picked, vec![(30, day(25)), (90, day(80))]);
    }

    #[test]
    fn nearest_expiry_per_horizon() {
        let chain: Vec<_> = [6, 9, 28, 46, 71, 92]
            .into_iter()
            .map(|d| contract("SPY", d, 500.0, "put"))
            .collect();
        let selection = select_nearest_expiries(&chain, &[7, 30, 45, 75, 90], today());
        assert_eq!(selection.get(7), Some(day(6)));
        assert_eq!(selection.get(30), Some(day(28)));
        assert_eq!(selection.get(45), Some(day(46)));
        assert_eq!(selection.get(75), Some(day(71)));
        assert_eq!(selection.get(90), Some(day(92)));
    }

    #[test]
    fn expiries_today_or_earlier_are_ignored() {
        let mut chain = vec![contract("SPY", 0, 500.0, "call")];
        assert!(select_nearest_expiries(&chain, &[7], today()).is_empty());

        chain.push(contract("SPY", 40, 500.0, "call"));
        let selection = select_nearest_expiries(&chain, &[7], today());
        assert_eq!(selection.get(7), Some(day(40)));
    }

    #[test]
    fn duplicate_horizons_collapse() {
        let chain = vec![contract("SPY", 30, 500.0, "call")];
        let selection = select_nearest_expiries(&chain, &[30, 30, 30], today());
        assert_eq!(selection.len(), 1);
    }
}
