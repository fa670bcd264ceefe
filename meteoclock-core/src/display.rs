//! Display-facing side of the station.
//!
//! The core only ever pushes text into named widgets; how (and whether) that
//! text ends up on a panel is up to the [`DisplaySink`] implementation.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Widget {
    Temperature,
    Humidity,
    WindSpeed,
    Rain,
    Location,
    Hour,
    Minute,
    Day,
    Month,
    Weekday,
    /// Network association indicator.
    Link,
}

impl Widget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Widget::Temperature => "temperature",
            Widget::Humidity => "humidity",
            Widget::WindSpeed => "wind",
            Widget::Rain => "rain",
            Widget::Location => "location",
            Widget::Hour => "hour",
            Widget::Minute => "minute",
            Widget::Day => "day",
            Widget::Month => "month",
            Widget::Weekday => "weekday",
            Widget::Link => "link",
        }
    }
}

impl fmt::Display for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Fire-and-forget text output.
pub trait DisplaySink: Send {
    fn set_text(&mut self, widget: Widget, text: &str);
}

impl<T: DisplaySink + ?Sized> DisplaySink for Box<T> {
    fn set_text(&mut self, widget: Widget, text: &str) {
        (**self).set_text(widget, text);
    }
}

/// Sink that remembers every write, in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingDisplay {
    writes: Vec<(Widget, String)>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> &[(Widget, String)] {
        &self.writes
    }

    /// Last text written to `widget`.
    pub fn latest(&self, widget: Widget) -> Option<&str> {
        self.writes
            .iter()
            .rev()
            .find(|(w, _)| *w == widget)
            .map(|(_, text)| text.as_str())
    }

    pub fn count(&self, widget: Widget) -> usize {
        self.writes.iter().filter(|(w, _)| *w == widget).count()
    }

    pub fn clear(&mut self) {
        self.writes.clear();
    }
}

impl DisplaySink for RecordingDisplay {
    fn set_text(&mut self, widget: Widget, text: &str) {
        self.writes.push((widget, text.to_string()));
    }
}
