use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use inquire::{CustomType, Password, Select, Text};
use log::{LevelFilter, error, info};
use meteoclock_core::{
    ClockModel, Config, Pipeline, Poller, ReqwestTransport, ResolverLink, Station,
    clock::{parse_http_date, utc_to_local},
    network::Security,
    run_station,
};
use tokio::sync::mpsc;

use crate::console::ConsoleDisplay;

/// Events buffered between poller and station.
const EVENT_CAPACITY: usize = 16;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "meteoclock", version, about = "Weather and clock station")]
pub struct Cli {
    /// Use this config file instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Join the network, poll forever and show updates on the console.
    Run,

    /// Run a single acquisition cycle and print what was extracted.
    Once,

    /// Interactively set network credentials and timing.
    Configure,

    /// Print the location of the config file.
    ConfigPath,
}

impl Cli {
    /// `RUST_LOG` wins over the defaults chosen here.
    pub fn init_logging(&self) {
        let level = if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };

        env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .init();
    }

    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Run => run_station_forever(&self.load_config()?).await,
            Command::Once => run_single_cycle(&self.load_config()?).await,
            Command::Configure => self.configure(),
            Command::ConfigPath => {
                println!("{}", self.config_path()?.display());
                Ok(())
            }
        }
    }

    fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Config::config_file_path(),
        }
    }

    fn load_config(&self) -> Result<Config> {
        let path = self.config_path()?;
        let config = Config::load_from(&path)?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    fn configure(&self) -> Result<()> {
        let path = self.config_path()?;
        let mut config = Config::load_from(&path)?;

        config.network.ssid = Text::new("Network SSID:")
            .with_default(&config.network.ssid)
            .prompt()?;

        config.network.security = Select::new("Security:", Security::all().to_vec())
            .with_starting_cursor(config.network.security.position())
            .prompt()?;

        if config.network.security != Security::Open {
            config.network.password = Password::new("Network password:")
                .without_confirmation()
                .prompt()?;
        }

        config.clock.utc_offset_hours = CustomType::<f64>::new("UTC offset in hours:")
            .with_default(config.clock.utc_offset_hours)
            .with_help_message("Fractions allowed, e.g. 5.5")
            .prompt()?;

        config.timing.poll_interval_secs = CustomType::<u64>::new("Poll interval in seconds:")
            .with_default(config.timing.poll_interval_secs)
            .prompt()?;

        config.validate()?;
        config.save_to(&path)?;
        println!("Saved configuration to {}", path.display());

        Ok(())
    }
}

fn build_poller(config: &Config) -> Poller {
    let transport = ReqwestTransport::new(config.max_response_bytes);
    let pipeline = Pipeline::from_config(config, Box::new(transport));

    Poller::new(
        pipeline,
        Box::new(ResolverLink::new(config.network.probe.clone())),
        config.network.association_params(),
        config.network.max_attempts,
        config.poll_interval(),
    )
}

async fn run_station_forever(config: &Config) -> Result<()> {
    let (tx, rx) = mpsc::channel(EVENT_CAPACITY);

    let clock = ClockModel::new(config.clock.utc_offset_hours, config.clock.resync);
    let station = Station::new(ConsoleDisplay::new(), clock);

    let station_task = tokio::spawn(run_station(station, rx, config.refresh_interval()));
    let poller_task = tokio::spawn(build_poller(config).run(tx));

    info!(
        "Station running, polling every {}s",
        config.timing.poll_interval_secs
    );

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, shutting down");
        }
        res = poller_task => {
            res.context("Poller task failed")?;
            error!("Poller stopped unexpectedly");
        }
        res = station_task => {
            res.context("Station task failed")?;
            error!("Station stopped unexpectedly");
        }
    }

    Ok(())
}

async fn run_single_cycle(config: &Config) -> Result<()> {
    let transport = ReqwestTransport::new(config.max_response_bytes);
    let mut pipeline = Pipeline::from_config(config, Box::new(transport));

    let report = pipeline.run_cycle().await;

    println!("{}", pipeline.fields());

    let server_date = report
        .server_headers
        .iter()
        .find_map(|server| parse_http_date(&server.headers));
    if let Some(utc) = server_date {
        let local = utc_to_local(utc, config.clock.utc_offset_hours);
        println!("Server time:  {utc} UTC, {local} local");
    }

    for warning in &report.warnings {
        println!("Warning:      {warning}");
    }

    match report.failure {
        Some(err) => Err(anyhow!(err).context("Acquisition cycle failed")),
        None => Ok(()),
    }
}
