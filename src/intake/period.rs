//! Insurance period parsing.
//!
//! Schedules print the cover period as
//! `24 September 2018 16:26 to 23 October 2018`. Both ends are Hong Kong
//! local time.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};

use crate::error::PeriodError;

const SEPARATOR: &str = " to ";
const START_FORMAT: &str = "%d %B %Y %H:%M";
const END_FORMAT: &str = "%d %B %Y";

/// Hong Kong has kept UTC+8 without daylight saving since 1979.
pub fn hong_kong() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).expect("UTC+8 is a valid offset")
}

/// Effective and expiry timestamps of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsurancePeriod {
    pub effective: DateTime<FixedOffset>,
    pub expires: DateTime<FixedOffset>,
}

/// Split a period string on `" to "` and parse both ends.
pub fn split_effective_and_expire(src: &str) -> Result<InsurancePeriod, PeriodError> {
    let Some((start, end)) = src.split_once(SEPARATOR) else {
        return Err(PeriodError::MissingSeparator(src.to_string()));
    };
    let (start, end) = (start.trim(), end.trim());

    let start_naive = NaiveDateTime::parse_from_str(start, START_FORMAT).map_err(|source| {
        PeriodError::InvalidDate {
            side: "effective",
            value: start.to_string(),
            source,
        }
    })?;
    let end_naive = NaiveDate::parse_from_str(end, END_FORMAT)
        .map_err(|source| PeriodError::InvalidDate {
            side: "expiry",
            value: end.to_string(),
            source,
        })?
        .and_time(chrono::NaiveTime::MIN);

    Ok(InsurancePeriod {
        effective: localize(start_naive, start)?,
        expires: localize(end_naive, end)?,
    })
}

fn localize(naive: NaiveDateTime, raw: &str) -> Result<DateTime<FixedOffset>, PeriodError> {
    hong_kong()
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| PeriodError::Unrepresentable(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hk(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        hong_kong().with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn parses_schedule_period() {
        let period = split_effective_and_expire("24 September 2018 16:26 to 23 October 2018").unwrap();
        assert_eq!(period.effective, hk(2018, 9, 24, 16, 26));
        assert_eq!(period.expires, hk(2018, 10, 23, 0, 0));
        assert_eq!(period.effective.offset().local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn effective_is_utc_plus_eight() {
        let period = split_effective_and_expire("01 January 2020 00:30 to 31 December 2020").unwrap();
        assert_eq!(period.effective.naive_utc().to_string(), "2019-12-31 16:30:00");
    }

    #[test]
    fn missing_separator_is_an_error() {
        let err = split_effective_and_expire("24 September 2018 16:26").unwrap_err();
        assert!(matches!(err, PeriodError::MissingSeparator(_)));
        let err = split_effective_and_expire("").unwrap_err();
        assert!(matches!(err, PeriodError::MissingSeparator(_)));
    }

    #[test]
    fn bad_dates_name_the_side() {
        let err = split_effective_and_expire("24 September 2018 to 23 October 2018").unwrap_err();
        assert!(matches!(err, PeriodError::InvalidDate { side: "effective", .. }));
        let err = split_effective_and_expire("24 September 2018 16:26 to someday").unwrap_err();
        assert!(matches!(err, PeriodError::InvalidDate { side: "expiry", .. }));
    }
}
