//! The display-side owner of all published state.
//!
//! The poller never touches display state directly; it hands results over
//! a channel and the station task applies them between refresh ticks.

use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::{
    sync::mpsc,
    time::{MissedTickBehavior, interval},
};

use crate::{
    clock::{CalendarTime, ClockModel},
    display::{DisplaySink, Widget},
    model::ExtractedFields,
    pipeline::ServerHeaders,
    publish::{SyncFlags, publish, publish_calendar, publish_clock},
};

#[derive(Debug)]
pub enum StationEvent {
    /// Network association result.
    Link(bool),
    /// Header block of a successful exchange, stamped with its arrival.
    ServerDate(ServerHeaders),
    /// Fields after a successful weather stage.
    Snapshot(Box<ExtractedFields>),
}

#[derive(Debug)]
pub struct Station<D> {
    display: D,
    fields: ExtractedFields,
    flags: SyncFlags,
    clock: ClockModel,
}

impl<D: DisplaySink> Station<D> {
    pub fn new(display: D, clock: ClockModel) -> Self {
        Self {
            display,
            fields: ExtractedFields::default(),
            flags: SyncFlags::new(),
            clock,
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn fields(&self) -> &ExtractedFields {
        &self.fields
    }

    pub fn clock(&self) -> &ClockModel {
        &self.clock
    }

    pub fn handle(&mut self, event: StationEvent, now: Instant) {
        match event {
            StationEvent::Link(up) => {
                self.display
                    .set_text(Widget::Link, if up { "up" } else { "down" });
            }
            StationEvent::ServerDate(server) => {
                // Anchored at arrival; show the time as of now.
                let synced = self
                    .clock
                    .sync_from_headers(&server.headers, server.received_at)
                    .is_some();
                if let Some(local) = self.clock.now(now).filter(|_| synced) {
                    publish_calendar(&CalendarTime::from(local), &mut self.display);
                }
            }
            StationEvent::Snapshot(fields) => {
                self.fields = *fields;
                self.flags.reset_cycle();
                debug!("New snapshot, {} quantities pending", self.flags.pending().count());
            }
        }
    }

    /// One display refresh: pending quantities, then the clock.
    pub fn refresh(&mut self, now: Instant) {
        publish(&self.fields, &mut self.flags, &mut self.display);
        publish_clock(&mut self.clock, now, &mut self.display);
    }
}

/// Station loop: applies events as they arrive and refreshes every
/// `refresh` period. Returns the station once the sender side is gone.
pub async fn run_station<D: DisplaySink>(
    mut station: Station<D>,
    mut events: mpsc::Receiver<StationEvent>,
    refresh: Duration,
) -> Station<D> {
    let mut ticker = interval(refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    station.handle(event, Instant::now());
                    publish(&station.fields, &mut station.flags, &mut station.display);
                }
                None => {
                    info!("Poller gone, stopping station");
                    break;
                }
            },
            _ = ticker.tick() => station.refresh(Instant::now()),
        }
    }

    station
}
