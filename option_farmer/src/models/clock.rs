use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::{America::New_York, Tz};

/// The instant a run started, in exchange time (America/New_York).
///
/// Captured once per run so every row, file name and "today" computation of
/// that run agrees, even when a run crosses a minute or midnight boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunClock {
    now: DateTime<Tz>,
}

impl RunClock {
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            now: instant.with_timezone(&New_York),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    pub fn local(&self) -> NaiveDateTime {
        self.now.naive_local()
    }

    pub fn instant(&self) -> DateTime<Tz> {
        self.now
    }

    /// `YYYYMMDD`, used in per-day file names and cache keys.
    pub fn date_stamp(&self) -> String {
        self.now.format("%Y%m%d").to_string()
    }

    /// `YYYYMMDD_HHMM`, used in update snapshot file names.
    pub fn minute_stamp(&self) -> String {
        self.now.format("%Y%m%d_%H%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn converts_to_new_york_time() {
        // 03:30 UTC is still the previous evening in New York.
        let clock = RunClock::at(Utc.with_ymd_and_hms(2025, 9, 3, 3, 30, 0).unwrap());
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 9, 2).unwrap());
        assert_eq!(clock.date_stamp(), "20250902");
        assert_eq!(clock.minute_stamp(), "20250902_2330");
    }
}
