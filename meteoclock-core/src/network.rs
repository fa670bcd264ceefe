use std::fmt;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::AcquireError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    Open,
    #[default]
    Wpa2,
    Wpa3,
}

impl Security {
    pub fn as_str(&self) -> &'static str {
        match self {
            Security::Open => "open",
            Security::Wpa2 => "wpa2",
            Security::Wpa3 => "wpa3",
        }
    }

    pub const fn all() -> &'static [Security] {
        &[Security::Open, Security::Wpa2, Security::Wpa3]
    }

    /// Index of this variant in [`Security::all`].
    pub fn position(self) -> usize {
        Self::all().iter().position(|s| *s == self).unwrap_or(0)
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationParams {
    pub ssid: String,
    pub password: String,
    pub security: Security,
}

/// Joins whatever network the station talks through.
#[async_trait]
pub trait NetworkLink: Send + Sync + fmt::Debug {
    async fn associate(&self, params: &AssociationParams) -> Result<()>;
}

/// Link for hosts whose network is managed by the OS: association succeeds
/// once the probe address resolves.
#[derive(Debug, Clone)]
pub struct ResolverLink {
    probe: String,
}

impl ResolverLink {
    /// `probe` is a `host:port` pair, e.g. `ipinfo.io:80`.
    pub fn new(probe: impl Into<String>) -> Self {
        Self {
            probe: probe.into(),
        }
    }
}

#[async_trait]
impl NetworkLink for ResolverLink {
    async fn associate(&self, params: &AssociationParams) -> Result<()> {
        if params.security != Security::Open && params.password.is_empty() {
            return Err(anyhow!(
                "Network '{}' uses {} but no password is configured",
                params.ssid,
                params.security
            ));
        }

        let addr = tokio::net::lookup_host(self.probe.as_str())
            .await
            .with_context(|| format!("Failed to resolve {}", self.probe))?
            .next()
            .ok_or_else(|| anyhow!("{} resolved to no addresses", self.probe))?;

        info!("Network reachable, {} -> {addr}", self.probe);
        Ok(())
    }
}

/// Tries to associate up to `max_attempts` times, back to back.
///
/// Returns the number of attempts used. Exhausting the attempts is reported
/// as [`AcquireError::Association`]; callers carry on regardless.
pub async fn associate_with_retries(
    link: &dyn NetworkLink,
    params: &AssociationParams,
    max_attempts: u32,
) -> Result<u32, AcquireError> {
    info!("Joining network: {}", params.ssid);

    let mut last_error = String::from("no attempt made");
    for attempt in 1..=max_attempts {
        match link.associate(params).await {
            Ok(()) => {
                info!("Successfully joined network {}", params.ssid);
                return Ok(attempt);
            }
            Err(err) => {
                warn!(
                    "Failed to join network (attempt {attempt}/{max_attempts}): {err:#}. Retrying..."
                );
                last_error = format!("{err:#}");
            }
        }
    }

    Err(AcquireError::Association {
        attempts: max_attempts,
        message: last_error,
    })
}
