//! Daily trigger math.
//!
//! A trigger is a wall-clock time of day in an IANA zone. The next fire is the
//! next occurrence of that time strictly after "now"; missed days collapse into
//! a single fire.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use daybreak_core::error::{DaybreakError, Result};

/// `HH:MM`, 24-hour clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(DaybreakError::Scheduling(format!(
                "time out of range: {hour}:{minute:02}"
            )));
        }
        Ok(Self { hour, minute })
    }

    fn naive(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl FromStr for TimeOfDay {
    type Err = DaybreakError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || DaybreakError::Scheduling(format!("invalid time '{s}', expected HH:MM"));
        let (h, m) = s.trim().split_once(':').ok_or_else(bad)?;
        let digits = |p: &str, max_len: usize| {
            !p.is_empty() && p.len() <= max_len && p.chars().all(|c| c.is_ascii_digit())
        };
        if !digits(h, 2) || !digits(m, 2) || m.len() != 2 {
            return Err(bad());
        }
        let hour = h.parse().map_err(|_| bad())?;
        let minute = m.parse().map_err(|_| bad())?;
        Self::new(hour, minute).map_err(|_| bad())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// The active daily trigger: a time of day in a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSpec {
    pub time: TimeOfDay,
    pub tz: Tz,
}

impl ScheduleSpec {
    pub fn new(time: TimeOfDay, tz: Tz) -> Self {
        Self { time, tz }
    }

    /// First fire strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.with_timezone(&self.tz).date_naive();
        let mut date = today;
        // Two days always suffice; the third covers a zone that skips a whole day.
        for _ in 0..3 {
            let candidate = self.resolve(date);
            if candidate > now {
                return candidate;
            }
            date = date.succ_opt().unwrap_or(date);
        }
        self.resolve(date)
    }

    /// The instant of `self.time` on `date`. Gaps resolve forward to the
    /// first valid local time, folds to the earliest instant.
    fn resolve(&self, date: NaiveDate) -> DateTime<Utc> {
        let mut local = NaiveDateTime::new(date, self.time.naive());
        for _ in 0..=24 * 60 {
            if let Some(dt) = self.tz.from_local_datetime(&local).earliest() {
                return dt.with_timezone(&Utc);
            }
            local += Duration::minutes(1);
        }
        Utc.from_utc_datetime(&local)
    }
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.time, self.tz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Paris;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn spec(s: &str) -> ScheduleSpec {
        ScheduleSpec::new(s.parse().unwrap(), Paris)
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!("07:30".parse::<TimeOfDay>().unwrap(), TimeOfDay::new(7, 30).unwrap());
        assert_eq!("7:05".parse::<TimeOfDay>().unwrap().to_string(), "07:05");
        assert_eq!(" 23:59 ".parse::<TimeOfDay>().unwrap().to_string(), "23:59");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "7", "24:00", "12:60", "12:5", "ab:cd", "12:30:00", "-1:30", "+7:30"] {
            let err = bad.parse::<TimeOfDay>().unwrap_err();
            assert!(matches!(err, DaybreakError::Scheduling(_)), "{bad}");
        }
    }

    #[test]
    fn test_later_today() {
        // 07:00 in Paris (CEST, UTC+2)
        let next = spec("07:30").next_after(utc(2026, 10, 18, 5, 0));
        assert_eq!(next, utc(2026, 10, 18, 5, 30));
    }

    #[test]
    fn test_already_passed_rolls_to_tomorrow() {
        let next = spec("07:30").next_after(utc(2026, 10, 18, 5, 30));
        assert_eq!(next, utc(2026, 10, 19, 5, 30));
    }

    #[test]
    fn test_missed_days_fire_once() {
        let s = spec("07:30");
        let stale = s.next_after(utc(2026, 10, 10, 0, 0));
        let now = utc(2026, 10, 18, 12, 0);
        assert!(now >= stale);
        assert_eq!(s.next_after(now), utc(2026, 10, 19, 5, 30));
    }

    #[test]
    fn test_dst_gap_resolves_forward() {
        // 2026-03-29 02:00 -> 03:00 in Paris; 02:30 does not exist.
        let next = spec("02:30").next_after(utc(2026, 3, 28, 23, 0));
        assert_eq!(next, utc(2026, 3, 29, 1, 0));
    }

    #[test]
    fn test_dst_fold_takes_earliest() {
        // 2026-10-25 03:00 -> 02:00 in Paris; 02:30 happens twice.
        let next = spec("02:30").next_after(utc(2026, 10, 24, 22, 0));
        assert_eq!(next, utc(2026, 10, 25, 0, 30));
    }
}
