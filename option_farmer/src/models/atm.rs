use std::{fmt, str::FromStr};

use thiserror::Error;

/// Position of a strike relative to the at-the-money strike.
///
/// Renders as `ATM`, `ATM-{i}` (i-th strike below) or `ATM{i}` (i-th strike
/// above), which is also the on-disk spelling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AtmLabel {
    Atm,
    Below(usize),
    Above(usize),
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid ATM label: {0:?}")]
pub struct AtmLabelError(pub String);

impl AtmLabel {
    /// Signed distance from the ATM strike (`ATM-2` is `-2`).
    pub fn offset(self) -> i64 {
        match self {
            Self::Atm => 0,
            Self::Below(i) => -(i as i64),
            Self::Above(i) => i as i64,
        }
    }
}

impl fmt::Display for AtmLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atm => f.write_str("ATM"),
            Self::Below(i) => write!(f, "ATM-{i}"),
            Self::Above(i) => write!(f, "ATM{i}"),
        }
    }
}

impl FromStr for AtmLabel {
    type Err = AtmLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AtmLabelError(s.to_string());
        let rest = s.trim().strip_prefix("ATM").ok_or_else(err)?;
        if rest.is_empty() {
            return Ok(Self::Atm);
        }
        let (below, digits) = match rest.strip_prefix('-') {
            Some(d) => (true, d),
            None => (false, rest),
        };
        let i: usize = digits.parse().map_err(|_| err())?;
        match (below, i) {
            (_, 0) => Ok(Self::Atm),
            (true, i) => Ok(Self::Below(i)),
            (false, i) => Ok(Self::Above(i)),
        }
    }
}
