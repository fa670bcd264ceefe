use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::mpsc::{self, error::SendError};

use crate::{
    network::{AssociationParams, NetworkLink, associate_with_retries},
    pipeline::{CycleReport, Pipeline},
    station::StationEvent,
};

/// Drives the acquisition pipeline on a fixed interval.
#[derive(Debug)]
pub struct Poller {
    pipeline: Pipeline,
    link: Box<dyn NetworkLink>,
    params: AssociationParams,
    max_attempts: u32,
    interval: Duration,
}

impl Poller {
    pub fn new(
        pipeline: Pipeline,
        link: Box<dyn NetworkLink>,
        params: AssociationParams,
        max_attempts: u32,
        interval: Duration,
    ) -> Self {
        Self {
            pipeline,
            link,
            params,
            max_attempts,
            interval,
        }
    }

    /// Joins the network once. Failure is reported, not fatal: later cycles
    /// simply fail at the transport.
    pub async fn associate(
        &self,
        events: &mpsc::Sender<StationEvent>,
    ) -> Result<(), SendError<StationEvent>> {
        let attempt =
            associate_with_retries(self.link.as_ref(), &self.params, self.max_attempts).await;
        let up = match attempt {
            Ok(attempts) => {
                info!("Network joined after {attempts} attempt(s)");
                true
            }
            Err(err) => {
                error!("{err}; continuing without network");
                false
            }
        };

        events.send(StationEvent::Link(up)).await
    }

    /// Runs one cycle and forwards its results to the station.
    pub async fn poll_once(
        &mut self,
        events: &mpsc::Sender<StationEvent>,
    ) -> Result<CycleReport, SendError<StationEvent>> {
        let mut report = self.pipeline.run_cycle().await;

        for headers in report.server_headers.drain(..) {
            events.send(StationEvent::ServerDate(headers)).await?;
        }
        if let Some(fields) = report.snapshot.take() {
            events.send(StationEvent::Snapshot(Box::new(fields))).await?;
        }

        if let Some(err) = &report.failure {
            warn!("Acquisition cycle aborted: {err}");
        }

        Ok(report)
    }

    /// Association, then cycle/sleep forever. Returns only once the station
    /// has gone away.
    pub async fn run(mut self, events: mpsc::Sender<StationEvent>) {
        if self.associate(&events).await.is_err() {
            return;
        }

        loop {
            if events.is_closed() || self.poll_once(&events).await.is_err() {
                info!("Station closed, stopping poller");
                return;
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
