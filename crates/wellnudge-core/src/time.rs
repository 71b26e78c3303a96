//! Business-day helpers. All days are local to a fixed UTC offset.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Utc};

/// Fixed offset for `hours` east of UTC; out-of-range values fall back to UTC.
pub fn offset_hours(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

/// The local calendar day a UTC instant falls on.
pub fn local_date(ts: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    ts.with_timezone(&offset).date_naive()
}

/// UTC bounds `[start, end)` of a local day.
pub fn day_bounds(date: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let start_local = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    let start = offset
        .from_local_datetime(&start_local)
        .single()
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&start_local));
    (start, start + chrono::Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_date_crosses_midnight() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 17, 30, 0).unwrap();
        assert_eq!(local_date(ts, offset_hours(8)), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(local_date(ts, offset_hours(0)), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[test]
    fn test_day_bounds() {
        let (start, end) = day_bounds(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), offset_hours(8));
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 1, 16, 0, 0).unwrap());
        assert_eq!(end - start, chrono::Duration::days(1));
    }
}
