//! Core library for the `meteoclock` station.
//!
//! This crate defines:
//! - The acquisition pipeline (geolocation, then weather) and its poll scheduler
//! - Streaming extraction of the few JSON fields the station shows
//! - The local clock seeded from the server `Date` header
//! - The display-side station that owns and publishes all shown state
//!
//! Transport, network association and the display itself sit behind traits,
//! so the same core runs against real services or scripted fakes.

pub mod clock;
pub mod config;
pub mod display;
pub mod error;
pub mod extract;
pub mod http;
pub mod model;
pub mod network;
pub mod pipeline;
pub mod publish;
pub mod scheduler;
pub mod station;

pub use clock::{CalendarTime, ClockModel, ResyncPolicy};
pub use config::Config;
pub use display::{DisplaySink, RecordingDisplay, Widget};
pub use error::{AcquireError, ParseError, TransportError};
pub use http::{HttpTransport, ReqwestTransport};
pub use model::ExtractedFields;
pub use network::{NetworkLink, ResolverLink};
pub use pipeline::{CycleReport, Pipeline, ServerHeaders};
pub use scheduler::Poller;
pub use station::{Station, StationEvent, run_station};
