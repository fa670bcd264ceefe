use std::collections::HashMap;

use chrono::Local;
use meteoclock_core::{DisplaySink, Widget};

/// Display sink printing one line per changed widget.
#[derive(Debug, Default)]
pub struct ConsoleDisplay {
    shown: HashMap<Widget, String>,
}

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplaySink for ConsoleDisplay {
    fn set_text(&mut self, widget: Widget, text: &str) {
        if self.shown.get(&widget).is_some_and(|shown| shown == text) {
            return;
        }

        println!("[{}] {widget:<12} {text}", Local::now().format("%H:%M:%S"));
        self.shown.insert(widget, text.to_string());
    }
}
