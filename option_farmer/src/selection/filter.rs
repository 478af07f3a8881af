use chrono::NaiveDate;
use tracing::debug;

use crate::{
    models::{contract::RawContract, option::FilteredOption},
    selection::{RowContext, ladder::StrikeLadder},
};

/// Rows for the contracts that expire on `expiry` and sit on a ladder rung,
/// ordered by strike with calls before puts.
pub fn filter_by_ladder_and_expiry(
    contracts: &[RawContract],
    ladder: &StrikeLadder,
    expiry: NaiveDate,
    horizon_days: u32,
    ctx: RowContext<'_>,
) -> Vec<FilteredOption> {
    let mut rows: Vec<FilteredOption> = contracts
        .iter()
        .filter_map(|contract| {
            let terms = contract
                .terms()
                .map_err(|err| debug!(%err, "filter skipped record"))
                .ok()?;
            if terms.expiry != expiry {
                return None;
            }
            let label = ladder.get(terms.strike)?;
            Some(FilteredOption {
                as_of: ctx.as_of,
                option_ticker: terms.ticker.to_string(),
                symbol: ctx.symbol.to_string(),
                contract_type: terms.contract_type,
                strike: terms.strike,
                expiry,
                horizon_days,
                atm_label: label,
                metrics: contract.metrics.clone(),
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        a.strike
            .total_cmp(&b.strike)
            .then_with(|| a.contract_type.code().cmp(&b.contract_type.code()))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{atm::AtmLabel, contract::ContractType},
        selection::{
            build_strike_ladder,
            test_support::{contract, today},
        },
    };
    use chrono::Days;

    #[test]
    fn keeps_only_laddered_strikes_on_the_expiry() {
        let chain = vec![
            contract("QQQ", 30, 100.0, "put"),
            contract("QQQ", 30, 100.0, "call"),
            contract("QQQ", 30, 120.0, "call"),
            contract("QQQ", 60, 100.0, "call"),
        ];
        let ladder = build_strike_ladder(100.0, [100.0, 120.0], 0);
        let expiry = today().checked_add_days(Days::new(30)).unwrap();
        let ctx = RowContext {
            symbol: "QQQ",
            as_of: today().and_hms_opt(9, 30, 0).unwrap(),
            today: today(),
        };

        let rows = filter_by_ladder_and_expiry(&chain, &ladder, expiry, 30, ctx);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].contract_type, ContractType::Call);
        assert_eq!(rows[1].contract_type, ContractType::Put);
        assert!(rows.iter().all(|r| r.atm_label == AtmLabel::Atm && r.horizon_days == 30));
        assert_eq!(rows[0].metrics.as_ref().and_then(|m| m.delta), Some(0.5));
    }
}
