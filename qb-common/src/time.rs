//! Timestamp utilities

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

/// Midnight UTC on the given calendar day
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_start_of_day_is_midnight() {
        let date = NaiveDate::from_ymd_opt(2015, 5, 5).unwrap();
        let ts = start_of_day(date);
        assert_eq!(ts.year(), 2015);
        assert_eq!(ts.month(), 5);
        assert_eq!(ts.day(), 5);
        assert_eq!(ts.hour(), 0);
        assert_eq!(ts.minute(), 0);
    }
}
