//! Local wall clock seeded from an HTTP `Date` header.
//!
//! The clock is unsynced until the first usable header arrives. From then on
//! it free-runs: every tick adds the monotonic time elapsed since the anchor
//! to the anchored calendar time. The anchor only moves when the displayed
//! day changes (or on a network resync, depending on [`ResyncPolicy`]).

use std::time::Instant;

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Weekday};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

pub const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// When a server `Date` header may replace the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncPolicy {
    /// Only the first successful exchange after startup sets the clock.
    #[default]
    Once,
    /// Every successful exchange re-anchors the clock.
    EveryCycle,
}

/// Normalized local calendar time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarTime {
    pub year: i32,
    /// 1-based.
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub weekday: Weekday,
}

impl CalendarTime {
    /// Three-letter month name, `"???"` for a month outside 1..=12.
    pub fn month_name(&self) -> &'static str {
        self.month
            .checked_sub(1)
            .and_then(|i| MONTHS.get(i as usize))
            .copied()
            .unwrap_or("???")
    }

    pub fn weekday_name(&self) -> &'static str {
        WEEKDAYS[self.weekday.num_days_from_sunday() as usize]
    }
}

impl From<NaiveDateTime> for CalendarTime {
    fn from(t: NaiveDateTime) -> Self {
        Self {
            year: t.year(),
            month: t.month(),
            day: t.day(),
            hour: t.hour(),
            minute: t.minute(),
            second: t.second(),
            weekday: t.weekday(),
        }
    }
}

/// Output of one [`ClockModel::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub time: CalendarTime,
    /// The day differs from the one shown last; date fields need a refresh.
    pub rollover: bool,
}

/// Maps a three-letter month abbreviation to 1..=12.
pub fn month_from_abbrev(abbrev: &str) -> Option<u32> {
    MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(abbrev))
        .map(|i| i as u32 + 1)
}

/// Parses an IMF-fixdate value such as `Mon, 01 Jan 2024 10:00:00 GMT`.
///
/// The weekday token is not checked against the date.
pub fn parse_date_value(value: &str) -> Option<NaiveDateTime> {
    let mut parts = value.split_whitespace();

    let weekday = parts.next()?;
    if !weekday.ends_with(',') {
        return None;
    }

    let day: u32 = parts.next()?.parse().ok()?;
    let month = month_from_abbrev(parts.next()?)?;
    let year: i32 = parts.next()?.parse().ok()?;

    let mut hms = parts.next()?.split(':');
    let hour: u32 = hms.next()?.parse().ok()?;
    let minute: u32 = hms.next()?.parse().ok()?;
    let second: u32 = hms.next()?.parse().ok()?;
    if hms.next().is_some() {
        return None;
    }

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Finds the `Date` header in a raw header block and parses it as UTC.
pub fn parse_http_date(headers: &str) -> Option<NaiveDateTime> {
    headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("date") {
            parse_date_value(value.trim())
        } else {
            None
        }
    })
}

/// Converts `utc` to local time. Fractions of a second in the offset are dropped.
pub fn utc_to_local(utc: NaiveDateTime, offset_hours: f64) -> NaiveDateTime {
    let offset = TimeDelta::seconds((offset_hours * 3600.0) as i64);
    utc.checked_add_signed(offset).unwrap_or(utc)
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    local: NaiveDateTime,
    at: Instant,
}

#[derive(Debug, Clone)]
pub struct ClockModel {
    offset_hours: f64,
    policy: ResyncPolicy,
    anchor: Option<Anchor>,
    network_synced: bool,
    last_displayed_day: Option<u32>,
}

impl ClockModel {
    pub fn new(offset_hours: f64, policy: ResyncPolicy) -> Self {
        Self {
            offset_hours,
            policy,
            anchor: None,
            network_synced: false,
            last_displayed_day: None,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.anchor.is_some()
    }

    /// Anchors the clock to the `Date` header in `headers`.
    ///
    /// Returns the new local time when the anchor was replaced. With
    /// [`ResyncPolicy::Once`] every call after the first success is a no-op.
    pub fn sync_from_headers(&mut self, headers: &str, now: Instant) -> Option<CalendarTime> {
        if self.network_synced && self.policy == ResyncPolicy::Once {
            debug!("Clock already synchronized, ignoring server date");
            return None;
        }

        let Some(utc) = parse_http_date(headers) else {
            warn!("No usable Date header in response");
            return None;
        };

        let local = utc_to_local(utc, self.offset_hours);
        self.anchor_at(local, now);
        self.network_synced = true;

        info!(
            "Clock synchronized: {utc} UTC -> {local} local (offset {:+}h)",
            self.offset_hours
        );
        Some(CalendarTime::from(local))
    }

    /// Replaces the anchor with `local` observed at `at`.
    pub fn anchor_at(&mut self, local: NaiveDateTime, at: Instant) {
        self.anchor = Some(Anchor { local, at });
    }

    /// Local time at `now`, extrapolated from the anchor.
    pub fn now(&self, now: Instant) -> Option<NaiveDateTime> {
        let anchor = self.anchor?;
        let elapsed = TimeDelta::from_std(now.saturating_duration_since(anchor.at))
            .unwrap_or(TimeDelta::zero());
        anchor.local.checked_add_signed(elapsed)
    }

    /// Advances the displayed time. `None` while unsynced.
    ///
    /// On a day change the anchor moves to the extrapolated time so the next
    /// ticks measure from there.
    pub fn tick(&mut self, now: Instant) -> Option<ClockTick> {
        let local = self.now(now)?;

        let rollover = self.last_displayed_day != Some(local.day());
        if rollover {
            debug!("Date rollover to {}", local.date());
            self.last_displayed_day = Some(local.day());
            self.anchor_at(local, now);
        }

        Some(ClockTick {
            time: CalendarTime::from(local),
            rollover,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn parses_imf_fixdate() {
        let t = parse_date_value("Mon, 01 Jan 2024 10:00:00 GMT").unwrap();
        assert_eq!(t, at(2024, 1, 1, 10, 0, 0));
    }

    #[test]
    fn rejects_garbled_dates() {
        assert!(parse_date_value("Mon 01 Jan 2024 10:00:00 GMT").is_none());
        assert!(parse_date_value("Mon, 01 Foo 2024 10:00:00 GMT").is_none());
        assert!(parse_date_value("Mon, 31 Feb 2024 10:00:00 GMT").is_none());
        assert!(parse_date_value("Mon, 01 Jan 2024 10:00 GMT").is_none());
        assert!(parse_date_value("").is_none());
    }

    #[test]
    fn finds_date_header_case_insensitively() {
        let headers = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                       date: Tue, 05 Mar 2024 18:45:12 GMT\r\n";
        assert_eq!(parse_http_date(headers), Some(at(2024, 3, 5, 18, 45, 12)));
        assert_eq!(parse_http_date("HTTP/1.1 200 OK\r\n"), None);
    }

    #[test]
    fn out_of_range_month_has_no_name() {
        let mut time = CalendarTime::from(at(2024, 1, 1, 0, 0, 0));
        time.month = 0;
        assert_eq!(time.month_name(), "???");
        time.month = 13;
        assert_eq!(time.month_name(), "???");
        time.month = 12;
        assert_eq!(time.month_name(), "Dec");
    }

    #[test]
    fn month_table_covers_the_year() {
        for (i, name) in MONTHS.iter().enumerate() {
            assert_eq!(month_from_abbrev(name), Some(i as u32 + 1));
        }
        assert_eq!(month_from_abbrev("Foo"), None);
    }

    #[test]
    fn offset_carries_across_midnight() {
        let local = utc_to_local(at(2023, 12, 31, 20, 0, 0), 5.5);
        assert_eq!(local, at(2024, 1, 1, 1, 30, 0));

        let local = utc_to_local(at(2024, 3, 1, 2, 0, 0), -3.0);
        assert_eq!(local, at(2024, 2, 29, 23, 0, 0));
    }

    #[test]
    fn date_header_seeds_local_time() {
        let mut clock = ClockModel::new(5.5, ResyncPolicy::Once);
        assert!(!clock.is_synced());

        let t0 = Instant::now();
        let time = clock
            .sync_from_headers("Date: Mon, 01 Jan 2024 10:00:00 GMT\r\n", t0)
            .unwrap();

        assert!(clock.is_synced());
        assert_eq!((time.hour, time.minute, time.second), (15, 30, 0));
        assert_eq!(time.day, 1);
        assert_eq!(time.month_name(), "Jan");
        assert_eq!(time.weekday_name(), "Mon");
    }

    #[test]
    fn network_sync_is_one_shot_by_default() {
        let mut clock = ClockModel::new(0.0, ResyncPolicy::Once);
        let t0 = Instant::now();

        assert!(clock
            .sync_from_headers("Date: Mon, 01 Jan 2024 10:00:00 GMT", t0)
            .is_some());
        assert!(clock
            .sync_from_headers("Date: Mon, 01 Jan 2024 12:00:00 GMT", t0)
            .is_none());
        assert_eq!(clock.now(t0), Some(at(2024, 1, 1, 10, 0, 0)));
    }

    #[test]
    fn every_cycle_policy_resyncs() {
        let mut clock = ClockModel::new(0.0, ResyncPolicy::EveryCycle);
        let t0 = Instant::now();

        clock.sync_from_headers("Date: Mon, 01 Jan 2024 10:00:00 GMT", t0);
        clock.sync_from_headers("Date: Mon, 01 Jan 2024 12:00:00 GMT", t0);
        assert_eq!(clock.now(t0), Some(at(2024, 1, 1, 12, 0, 0)));
    }

    #[test]
    fn failed_parse_keeps_clock_unsynced() {
        let mut clock = ClockModel::new(5.5, ResyncPolicy::Once);
        assert!(clock.sync_from_headers("Date: yesterday", Instant::now()).is_none());
        assert!(!clock.is_synced());
        assert!(clock.tick(Instant::now()).is_none());
    }

    #[test]
    fn tick_is_stable_without_elapsed_time() {
        let mut clock = ClockModel::new(0.0, ResyncPolicy::Once);
        let t0 = Instant::now();
        clock.anchor_at(at(2024, 6, 10, 8, 15, 42), t0);

        let first = clock.tick(t0).unwrap();
        let second = clock.tick(t0).unwrap();

        assert_eq!(first.time, second.time);
        assert!(first.rollover);
        assert!(!second.rollover);
    }

    #[test]
    fn tick_extrapolates_elapsed_time() {
        let mut clock = ClockModel::new(0.0, ResyncPolicy::Once);
        let t0 = Instant::now();
        clock.anchor_at(at(2024, 6, 10, 8, 15, 42), t0);
        clock.tick(t0);

        let tick = clock.tick(t0 + Duration::from_secs(125)).unwrap();
        assert_eq!((tick.time.hour, tick.time.minute, tick.time.second), (8, 17, 47));
        assert!(!tick.rollover);
    }

    #[test]
    fn day_rollover_refreshes_date_and_moves_anchor() {
        let mut clock = ClockModel::new(0.0, ResyncPolicy::Once);
        let t0 = Instant::now();
        clock.anchor_at(at(2024, 3, 14, 23, 59, 50), t0);
        assert!(clock.tick(t0).unwrap().rollover);

        let t1 = t0 + Duration::from_secs(20);
        let tick = clock.tick(t1).unwrap();

        assert!(tick.rollover);
        assert_eq!(tick.time.day, 15);
        assert_eq!((tick.time.hour, tick.time.minute), (0, 0));
        assert_eq!(tick.time.month_name(), "Mar");
        assert_eq!(tick.time.weekday_name(), "Fri");

        // Anchored at the rollover: same instant, same answer, no new rollover.
        let again = clock.tick(t1).unwrap();
        assert_eq!(again.time, tick.time);
        assert!(!again.rollover);
    }

    #[test]
    fn rollover_carries_into_month_and_year() {
        let mut clock = ClockModel::new(0.0, ResyncPolicy::Once);
        let t0 = Instant::now();
        clock.anchor_at(at(2024, 12, 31, 23, 59, 59), t0);
        clock.tick(t0);

        let tick = clock.tick(t0 + Duration::from_secs(1)).unwrap();
        assert!(tick.rollover);
        assert_eq!(tick.time.year, 2025);
        assert_eq!(tick.time.month_name(), "Jan");
        assert_eq!(tick.time.day, 1);
        assert_eq!(tick.time.weekday_name(), "Wed");
    }
}
