use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    clock::ResyncPolicy,
    network::{AssociationParams, Security},
};

/// Placeholders substituted into the weather path template.
pub const LAT_PLACEHOLDER: &str = "{lat}";
pub const LON_PLACEHOLDER: &str = "{lon}";

/// One HTTP server the station talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    /// Resource path. For the weather endpoint this is a template containing
    /// `{lat}` and `{lon}`.
    pub path: String,
}

impl Endpoint {
    /// Substitutes the coordinates into the path, verbatim.
    pub fn path_with(&self, latitude: &str, longitude: &str) -> String {
        self.path
            .replace(LAT_PLACEHOLDER, latitude)
            .replace(LON_PLACEHOLDER, longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub ssid: String,
    pub password: String,
    pub security: Security,
    /// Association attempts before giving up.
    pub max_attempts: u32,
    /// `host:port` that must resolve for the network to count as joined.
    pub probe: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            security: Security::default(),
            max_attempts: 5,
            probe: "ipinfo.io:80".to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn association_params(&self) -> AssociationParams {
        AssociationParams {
            ssid: self.ssid.clone(),
            password: self.password.clone(),
            security: self.security,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub poll_interval_secs: u64,
    /// Cadence of the display refresh (clock tick + publish).
    pub refresh_interval_ms: u64,
    /// Connect/send/receive timeout handed to the HTTP client.
    pub transport_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            refresh_interval_ms: 300,
            transport_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Local offset from UTC in hours; fractions allowed (5.5 for IST).
    pub utc_offset_hours: f64,
    pub resync: ResyncPolicy,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 5.5,
            resync: ResyncPolicy::default(),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [network]
/// ssid = "home"
/// password = "..."
///
/// [clock]
/// utc_offset_hours = 1.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound for a single response body.
    pub max_response_bytes: usize,
    pub geo: Endpoint,
    pub weather: Endpoint,
    pub network: NetworkConfig,
    pub timing: TimingConfig,
    pub clock: ClockConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_response_bytes: 8 * 1024,
            geo: Endpoint {
                host: "ipinfo.io".to_string(),
                port: 80,
                tls: false,
                path: "/json".to_string(),
            },
            weather: Endpoint {
                host: "api.open-meteo.com".to_string(),
                port: 80,
                tls: false,
                path: "/v1/forecast?latitude={lat}&longitude={lon}&models=ukmo_seamless\
                       &current=temperature_2m,relative_humidity_2m,wind_speed_10m,weather_code"
                    .to_string(),
            },
            network: NetworkConfig::default(),
            timing: TimingConfig::default(),
            clock: ClockConfig::default(),
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.timing.poll_interval_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.timing.refresh_interval_ms)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.timing.transport_timeout_ms)
    }

    /// Checks values that would make the station misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.timing.poll_interval_secs == 0 {
            bail!("timing.poll_interval_secs must be greater than zero");
        }
        if self.timing.refresh_interval_ms == 0 {
            bail!("timing.refresh_interval_ms must be greater than zero");
        }
        if self.network.max_attempts == 0 {
            bail!("network.max_attempts must be at least 1");
        }
        if !(-14.0..=14.0).contains(&self.clock.utc_offset_hours) {
            bail!(
                "clock.utc_offset_hours = {} is outside -14..=14",
                self.clock.utc_offset_hours
            );
        }
        if !self.weather.path.contains(LAT_PLACEHOLDER)
            || !self.weather.path.contains(LON_PLACEHOLDER)
        {
            bail!("weather.path must contain both {LAT_PLACEHOLDER} and {LON_PLACEHOLDER}");
        }
        if self.max_response_bytes == 0 {
            bail!("max_response_bytes must be greater than zero");
        }
        Ok(())
    }

    /// Loads `path`, or defaults if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, use defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "meteoclock", "meteoclock")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
