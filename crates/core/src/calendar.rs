//! Market session calendar.
//!
//! Pure session math over a fixed UTC offset: weekends are closed, the
//! regular session runs 14:30–21:00 UTC (NYSE hours). Deterministic, no IO,
//! no wall-clock reads.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};

/// Historical fixed-offset assumption (PST). Not DST-aware.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = -7;

/// Regular session boundaries, minutes since UTC midnight.
const OPEN_MINUTES: u32 = 14 * 60 + 30;
const CLOSE_MINUTES: u32 = 21 * 60;

/// Where a timestamp falls relative to the trading session.
///
/// When the market is closed both minute fields are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketSession {
    pub is_open: bool,
    pub minutes_since_open: u32,
    pub minutes_until_close: u32,
}

impl MarketSession {
    const CLOSED: Self = Self {
        is_open: false,
        minutes_since_open: 0,
        minutes_until_close: 0,
    };
}

/// Computes the market session state for a local wall-clock timestamp.
///
/// `ts` is interpreted as local time at the given fixed offset from UTC
/// (`utc_offset_hours`, e.g. `-7` for PST) and normalized to UTC before the
/// weekday and time-of-day checks. Both session boundaries are inclusive:
/// 14:30 and 21:00 UTC count as in-session.
#[must_use]
pub fn session_at(ts: NaiveDateTime, utc_offset_hours: i32) -> MarketSession {
    let utc = ts - chrono::Duration::hours(i64::from(utc_offset_hours));

    if matches!(utc.weekday(), Weekday::Sat | Weekday::Sun) {
        return MarketSession::CLOSED;
    }

    let clock_minutes = utc.hour() * 60 + utc.minute();
    if clock_minutes < OPEN_MINUTES || clock_minutes > CLOSE_MINUTES {
        return MarketSession::CLOSED;
    }

    MarketSession {
        is_open: true,
        minutes_since_open: clock_minutes - OPEN_MINUTES,
        minutes_until_close: CLOSE_MINUTES - clock_minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn utc(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, 0)
            .unwrap()
    }

    #[test]
    fn weekend_is_closed_all_day() {
        // 2025-03-08 is a Saturday, 2025-03-09 a Sunday.
        for day in [8, 9] {
            for hour in [0, 10, 15, 20, 23] {
                let session = session_at(utc(2025, 3, day, hour, 0), 0);
                assert_eq!(session, MarketSession::CLOSED);
            }
        }
    }

    #[test]
    fn weekday_outside_session_is_closed() {
        // 2025-03-11 is a Tuesday.
        assert!(!session_at(utc(2025, 3, 11, 14, 29), 0).is_open);
        assert!(!session_at(utc(2025, 3, 11, 21, 1), 0).is_open);
        assert!(!session_at(utc(2025, 3, 11, 3, 0), 0).is_open);
    }

    #[test]
    fn session_boundaries_are_inclusive() {
        let open = session_at(utc(2025, 3, 11, 14, 30), 0);
        assert!(open.is_open);
        assert_eq!(open.minutes_since_open, 0);
        assert_eq!(open.minutes_until_close, 390);

        let close = session_at(utc(2025, 3, 11, 21, 0), 0);
        assert!(close.is_open);
        assert_eq!(close.minutes_since_open, 390);
        assert_eq!(close.minutes_until_close, 0);
    }

    #[test]
    fn open_minutes_always_sum_to_session_length() {
        for (hh, mm) in [(14, 31), (15, 0), (17, 45), (20, 0), (20, 59)] {
            let session = session_at(utc(2025, 3, 11, hh, mm), 0);
            assert!(session.is_open);
            assert_eq!(
                session.minutes_since_open + session.minutes_until_close,
                390
            );
        }
    }

    #[test]
    fn local_timestamp_is_normalized_to_utc() {
        // 13:00 local at UTC-7 is 20:00 UTC, inside the session.
        let session = session_at(utc(2025, 3, 11, 13, 0), -7);
        assert!(session.is_open);
        assert_eq!(session.minutes_since_open, 330);

        // 15:00 local at UTC-7 is 22:00 UTC, after the close.
        assert!(!session_at(utc(2025, 3, 11, 15, 0), -7).is_open);
    }

    #[test]
    fn offset_can_push_a_friday_evening_into_saturday() {
        // Friday 2025-03-14 23:00 local at UTC-16 is Saturday 15:00 UTC.
        assert!(!session_at(utc(2025, 3, 14, 23, 0), -16).is_open);
    }
}
