use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::types::{Timeframe, WalletTag};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const CONFIG_PATH_ENV: &str = "SMART_MONEY_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: General,
    pub store: Store,
    pub upstream: Upstream,
    pub scraper: Scraper,
    pub server: Server,
    #[serde(default)]
    pub observability: Observability,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Store {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Upstream {
    pub base_url: String,
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Upstream {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_user_agent() -> String {
    crate::gmgn::DEFAULT_USER_AGENT.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scraper {
    pub timeframe: String,
    pub wallet_tag: String,
    pub min_winrate: f64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Scraper {
    pub fn timeframe(&self) -> Result<Timeframe> {
        Ok(self.timeframe.parse::<Timeframe>()?)
    }

    pub fn wallet_tag(&self) -> Result<WalletTag> {
        Ok(self.wallet_tag.parse::<WalletTag>()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

impl Server {
    /// Cert and key paths, when TLS is configured.
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Observability {
    /// Scraper-side Prometheus listener. Disabled when unset.
    pub prometheus_port: Option<u16>,
}

impl Config {
    /// Load from `path`, else `$SMART_MONEY_CONFIG`, else `config/default.toml`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = path.map_or_else(
            || std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
            str::to_string,
        );
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        Self::from_toml_str(&content).with_context(|| format!("invalid config file: {path}"))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.path.trim().is_empty() {
            bail!("store.path must not be empty");
        }
        if !(0.0..=1.0).contains(&self.scraper.min_winrate) {
            bail!(
                "scraper.min_winrate must be within [0, 1], got {}",
                self.scraper.min_winrate
            );
        }
        self.scraper.timeframe()?;
        self.scraper.wallet_tag()?;
        if self.upstream.timeout_secs == 0 {
            bail!("upstream.timeout_secs must be positive");
        }
        if self.server.tls_cert_path.is_some() != self.server.tls_key_path.is_some() {
            bail!("server.tls_cert_path and server.tls_key_path must be set together");
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}
