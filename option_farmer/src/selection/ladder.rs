use crate::models::atm::AtmLabel;

/// Strikes around the underlying price, each with its ATM label, ascending by
/// strike.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StrikeLadder {
    rungs: Vec<(f64, AtmLabel)>,
}

impl StrikeLadder {
    pub fn get(&self, strike: f64) -> Option<AtmLabel> {
        self.rungs
            .iter()
            .find(|(s, _)| *s == strike)
            .map(|(_, label)| *label)
    }

    pub fn rungs(&self) -> &[(f64, AtmLabel)] {
        &self.rungs
    }

    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }
}

/// Labels the strike closest to `underlying_price` as `ATM` (lower strike on
/// a tie) and up to `half_width` strikes on each side. Indices clamp at the
/// ends of the strike list, so a short list yields fewer than
/// `2 * half_width + 1` rungs.
pub fn build_strike_ladder(
    underlying_price: f64,
    strikes: impl IntoIterator<Item = f64>,
    half_width: usize,
) -> StrikeLadder {
    let mut sorted: Vec<f64> = strikes.into_iter().filter(|s| s.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    if sorted.is_empty() {
        return StrikeLadder::default();
    }

    let mut atm = 0;
    let mut best = f64::INFINITY;
    for (i, strike) in sorted.iter().enumerate() {
        let distance = (strike - underlying_price).abs();
        if distance < best {
            best = distance;
            atm = i;
        }
    }

    let last = sorted.len() - 1;
    let mut labels: Vec<Option<AtmLabel>> = vec![None; sorted.len()];
    labels[atm] = Some(AtmLabel::Atm);
    // By `i == last` both ends are labeled.
    for i in 1..=half_width.min(last) {
        let below = atm.saturating_sub(i);
        labels[below].get_or_insert(AtmLabel::Below(i));
        let above = (atm + i).min(last);
        labels[above].get_or_insert(AtmLabel::Above(i));
    }

    StrikeLadder {
        rungs: sorted
            .into_iter()
            .zip(labels)
            .filter_map(|(strike, label)| label.map(|l| (strike, l)))
            .collect(),
    }
}
