//! Pushing extracted values and clock fields to the display.
//!
//! Weather and location values are written once per acquisition cycle,
//! guarded by [`SyncFlags`], so calling [`publish`] from a tight refresh loop
//! does not rewrite unchanged widgets.

use std::time::Instant;

use crate::{
    clock::{CalendarTime, ClockModel},
    display::{DisplaySink, Widget},
    model::ExtractedFields,
};

/// WMO weather codes meaning precipitation: drizzle, freezing drizzle, rain,
/// freezing rain, rain showers and thunderstorm/hail.
pub const RAIN_CODES: [i32; 16] = [
    51, 53, 55, 56, 57, 61, 63, 65, 66, 67, 80, 81, 82, 95, 96, 99,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Temperature,
    Humidity,
    Wind,
    Rain,
    Location,
}

impl Quantity {
    pub const ALL: [Quantity; 5] = [
        Quantity::Temperature,
        Quantity::Humidity,
        Quantity::Wind,
        Quantity::Rain,
        Quantity::Location,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Which quantities already reached the display this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFlags {
    published: [bool; 5],
}

impl SyncFlags {
    /// Starts with nothing pending; the first [`reset_cycle`](Self::reset_cycle)
    /// arms every quantity.
    pub fn new() -> Self {
        Self {
            published: [true; 5],
        }
    }

    pub fn is_published(&self, quantity: Quantity) -> bool {
        self.published[quantity.index()]
    }

    pub fn mark_published(&mut self, quantity: Quantity) {
        self.published[quantity.index()] = true;
    }

    pub fn reset_cycle(&mut self) {
        self.published = [false; 5];
    }

    pub fn pending(&self) -> impl Iterator<Item = Quantity> + '_ {
        Quantity::ALL
            .into_iter()
            .filter(|q| !self.is_published(*q))
    }
}

impl Default for SyncFlags {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_rain_code(code: i32) -> bool {
    RAIN_CODES.contains(&code)
}

/// Leading integer of `text`, 0 when there is none (`"63"` -> 63, `"80.0"` -> 80).
pub fn parse_weather_code(text: &str) -> i32 {
    let text = text.trim_start();
    let (sign, digits) = match text.as_bytes().first() {
        Some(b'-') => (-1, &text[1..]),
        Some(b'+') => (1, &text[1..]),
        _ => (1, text),
    };

    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());

    digits[..end].parse::<i32>().map(|n| sign * n).unwrap_or(0)
}

/// `"Y"` when the weather code denotes precipitation, `"N"` otherwise.
pub fn rain_indicator(code_text: &str) -> &'static str {
    if is_rain_code(parse_weather_code(code_text)) {
        "Y"
    } else {
        "N"
    }
}

/// Writes every quantity whose flag is still clear, then sets the flag.
///
/// Returns the number of display writes made.
pub fn publish(
    fields: &ExtractedFields,
    flags: &mut SyncFlags,
    display: &mut dyn DisplaySink,
) -> usize {
    let mut writes = 0;

    for quantity in Quantity::ALL {
        if flags.is_published(quantity) {
            continue;
        }

        let (widget, text) = match quantity {
            Quantity::Temperature => (Widget::Temperature, fields.weather.temperature.as_str()),
            Quantity::Humidity => (Widget::Humidity, fields.weather.humidity.as_str()),
            Quantity::Wind => (Widget::WindSpeed, fields.weather.wind_speed.as_str()),
            Quantity::Rain => (
                Widget::Rain,
                rain_indicator(fields.weather.weather_code.as_str()),
            ),
            Quantity::Location => (Widget::Location, fields.location.city.as_str()),
        };

        display.set_text(widget, text);
        flags.mark_published(quantity);
        writes += 1;
    }

    writes
}

/// Writes hour, minute, day, month and weekday.
pub fn publish_calendar(time: &CalendarTime, display: &mut dyn DisplaySink) {
    publish_date(time, display);
    publish_hour_minute(time, display);
}

fn publish_date(time: &CalendarTime, display: &mut dyn DisplaySink) {
    display.set_text(Widget::Day, &format!("{:02}", time.day));
    display.set_text(Widget::Month, time.month_name());
    display.set_text(Widget::Weekday, time.weekday_name());
}

fn publish_hour_minute(time: &CalendarTime, display: &mut dyn DisplaySink) {
    display.set_text(Widget::Hour, &format!("{:02}", time.hour));
    display.set_text(Widget::Minute, &format!("{:02}", time.minute));
}

/// Advances `clock` and shows the result. Date fields are only rewritten on
/// a day change. Does nothing while the clock is unsynced.
pub fn publish_clock(
    clock: &mut ClockModel,
    now: Instant,
    display: &mut dyn DisplaySink,
) -> bool {
    let Some(tick) = clock.tick(now) else {
        return false;
    };

    if tick.rollover {
        publish_date(&tick.time, display);
    }
    publish_hour_minute(&tick.time, display);

    true
}
