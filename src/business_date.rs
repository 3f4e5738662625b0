//! Business date resolution.
//!
//! Every timestamp in the ledger is attributed to a local calendar date under one fixed UTC
//! offset (no daylight saving). The same [`BusinessCalendar`] value is used when stamping
//! events, when grouping reports by day and when auditing stored dates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use thiserror::Error;

/// Format the external HR system expects: local wall-clock time with no offset.
pub const EXTERNAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Largest offset accepted, in seconds (UTC±14:00).
const MAX_OFFSET_SECONDS: i32 = 14 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("invalid UTC offset '{0}', expected [+|-]HH:MM")]
    InvalidOffset(String),
    #[error("UTC offset '{0}' is outside ±14:00")]
    OffsetOutOfRange(String),
    #[error("invalid local time '{0}', expected HH:MM")]
    InvalidTime(String),
}

/// Fixed-offset calendar that maps UTC instants to business dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessCalendar {
    offset: FixedOffset,
}

impl BusinessCalendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Calendar from an offset string such as `+05:30` or `-03:00`.
    pub fn from_offset_str(value: &str) -> Result<Self, CalendarError> {
        parse_utc_offset(value).map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// `floor_to_date(ts + offset)`.
    pub fn business_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        self.local_naive(ts).date()
    }

    /// Local wall-clock time of day for `ts`.
    pub fn local_time(&self, ts: DateTime<Utc>) -> NaiveTime {
        self.local_naive(ts).time()
    }

    pub fn local_naive(&self, ts: DateTime<Utc>) -> NaiveDateTime {
        ts.with_timezone(&self.offset).naive_local()
    }

    /// Timestamp string sent to the external HR system.
    pub fn format_external(&self, ts: DateTime<Utc>) -> String {
        self.local_naive(ts)
            .format(EXTERNAL_TIMESTAMP_FORMAT)
            .to_string()
    }

    /// UTC instant at which `date` begins locally.
    pub fn start_of_day_utc(&self, date: NaiveDate) -> DateTime<Utc> {
        let local_midnight = date.and_time(NaiveTime::MIN);
        Utc.from_utc_datetime(&(local_midnight - self.offset_duration()))
    }

    /// Half-open UTC range `[start, end)` covering `from..=to` business dates.
    pub fn utc_range(&self, from: NaiveDate, to: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let end_date = to.succ_opt().unwrap_or(to);
        (self.start_of_day_utc(from), self.start_of_day_utc(end_date))
    }

    fn offset_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.offset.local_minus_utc()))
    }
}

impl Default for BusinessCalendar {
    /// `+05:30`, the reference deployment's offset.
    fn default() -> Self {
        Self::new(FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap_or(Utc.fix()))
    }
}

impl fmt::Display for BusinessCalendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UTC{}", self.offset)
    }
}

impl FromStr for BusinessCalendar {
    type Err = CalendarError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_offset_str(value)
    }
}

/// Parses `[+|-]HH:MM` (or `Z`) into a fixed offset.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset, CalendarError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("z") || trimmed == "00:00" {
        return Ok(Utc.fix());
    }

    let (sign, rest) = match trimmed.chars().next() {
        Some('+') => (1, &trimmed[1..]),
        Some('-') => (-1, &trimmed[1..]),
        _ => return Err(CalendarError::InvalidOffset(value.to_string())),
    };

    let (hours, minutes) = rest
        .split_once(':')
        .ok_or_else(|| CalendarError::InvalidOffset(value.to_string()))?;
    let hours: i32 = hours
        .parse()
        .map_err(|_| CalendarError::InvalidOffset(value.to_string()))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| CalendarError::InvalidOffset(value.to_string()))?;
    if !(0..60).contains(&minutes) || hours < 0 {
        return Err(CalendarError::InvalidOffset(value.to_string()));
    }

    let seconds = sign * (hours * 3600 + minutes * 60);
    if seconds.abs() > MAX_OFFSET_SECONDS {
        return Err(CalendarError::OffsetOutOfRange(value.to_string()));
    }

    FixedOffset::east_opt(seconds).ok_or_else(|| CalendarError::OffsetOutOfRange(value.to_string()))
}

/// Parses a local `HH:MM` time of day.
pub fn parse_local_time(value: &str) -> Result<NaiveTime, CalendarError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| CalendarError::InvalidTime(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ist() -> BusinessCalendar {
        BusinessCalendar::from_offset_str("+05:30").unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn midnight_crossing_instant_belongs_to_next_local_day() {
        let date = ist().business_date(utc("2025-11-25T18:30:00Z"));
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 11, 26).unwrap());
        assert_eq!(ist().local_time(utc("2025-11-25T18:30:00Z")), NaiveTime::MIN);
    }

    #[test]
    fn one_second_before_local_midnight_stays_on_same_day() {
        let date = ist().business_date(utc("2025-11-25T18:29:59Z"));
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 11, 25).unwrap());
    }

    #[test]
    fn negative_offsets_shift_backwards() {
        let calendar = BusinessCalendar::from_offset_str("-03:00").unwrap();
        let date = calendar.business_date(utc("2025-11-26T02:00:00Z"));
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 11, 25).unwrap());
    }

    #[test]
    fn default_calendar_is_plus_five_thirty() {
        assert_eq!(BusinessCalendar::default(), ist());
    }

    #[test]
    fn external_format_is_local_and_naive() {
        let formatted = ist().format_external(utc("2025-11-25T10:00:00Z"));
        assert_eq!(formatted, "2025-11-25T15:30:00");
    }

    #[test]
    fn derivation_is_stable_across_a_day_of_instants() {
        let calendar = ist();
        let start = utc("2025-03-01T00:00:00Z");
        for minutes in (0..(48 * 60)).step_by(7) {
            let ts = start + Duration::minutes(minutes);
            let date = calendar.business_date(ts);
            let day_start = calendar.start_of_day_utc(date);
            assert!(day_start <= ts && ts < day_start + Duration::days(1));
            assert_eq!(calendar.business_date(ts), date);
        }
    }

    #[test]
    fn utc_range_covers_whole_local_days() {
        let calendar = ist();
        let day = NaiveDate::from_ymd_opt(2025, 11, 26).unwrap();
        let (start, end) = calendar.utc_range(day, day);
        assert_eq!(start, utc("2025-11-25T18:30:00Z"));
        assert_eq!(end, utc("2025-11-26T18:30:00Z"));
    }

    #[test]
    fn rejects_malformed_offsets() {
        assert!(matches!(
            parse_utc_offset("0530"),
            Err(CalendarError::InvalidOffset(_))
        ));
        assert!(matches!(
            parse_utc_offset("+05:75"),
            Err(CalendarError::InvalidOffset(_))
        ));
        assert!(matches!(
            parse_utc_offset("+15:00"),
            Err(CalendarError::OffsetOutOfRange(_))
        ));
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn parses_local_times() {
        assert_eq!(
            parse_local_time("19:00").unwrap(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap()
        );
        assert!(parse_local_time("7pm").is_err());
    }
}
