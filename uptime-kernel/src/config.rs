use crate::reconciler::{ReconcileConfig, DEFAULT_STALE_OFFSET_SECS};
use crate::source::SourceConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::fs;
use tracing::{info, warn};

pub const CONFIG_PATH_VAR: &str = "UPTIME_KERNEL_CONFIG";
pub const API_KEY_VAR: &str = "UPTIME_API_KEY";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct KernelConfig {
    pub server: ServerConf,
    pub store: StoreConf,
    pub source: SourceConf,
    pub poll: PollConf,
    pub backfill: BackfillConf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConf {
    pub listen: SocketAddr,
}

impl Default for ServerConf {
    fn default() -> Self {
        Self { listen: SocketAddr::from(([0, 0, 0, 0], 8080)) }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StoreConf {
    pub path: PathBuf,
}

impl Default for StoreConf {
    fn default() -> Self {
        Self { path: PathBuf::from("./data/uptime.json") }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SourceConf {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for SourceConf {
    fn default() -> Self {
        Self { endpoint: "http://127.0.0.1:9090/nodes".into(), timeout_secs: 30 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PollConf {
    pub refresh_interval_secs: u64,
    pub uptime_threshold_secs: u64, // minimum counter worth recording
    pub stale_offset_secs: u64,
}

impl Default for PollConf {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 60,
            uptime_threshold_secs: 0,
            stale_offset_secs: DEFAULT_STALE_OFFSET_SECS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct BackfillConf {
    pub enabled: bool,
    pub year: Option<i32>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("poll.refresh_interval_secs must be greater than zero")]
    ZeroInterval,
    #[error("poll.refresh_interval_secs ({interval}) must be below poll.stale_offset_secs ({offset})")]
    IntervalNotBelowOffset { interval: u64, offset: u64 },
    #[error("source.endpoint is empty")]
    EmptyEndpoint,
}

impl KernelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.refresh_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        // a session is only trusted for stale_offset_secs past its last poll
        if self.poll.refresh_interval_secs >= self.poll.stale_offset_secs {
            return Err(ConfigError::IntervalNotBelowOffset {
                interval: self.poll.refresh_interval_secs,
                offset: self.poll.stale_offset_secs,
            });
        }
        if self.source.endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.poll.refresh_interval_secs)
    }

    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            min_counter_secs: self.poll.uptime_threshold_secs,
            stale_offset_secs: self.poll.stale_offset_secs,
        }
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            endpoint: self.source.endpoint.trim().to_string(),
            timeout: Duration::from_secs(self.source.timeout_secs),
        }
    }

    /// Year to backfill at startup, or `None` when backfill is off.
    /// Defaults to the calendar year before `now`.
    pub fn backfill_year(&self, now: OffsetDateTime) -> Option<i32> {
        if !self.backfill.enabled {
            return None;
        }
        Some(self.backfill.year.unwrap_or(now.year() - 1))
    }
}

/// Parses a YAML document. Blank input yields the defaults.
pub fn parse_config(txt: &str) -> Result<KernelConfig, ConfigError> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    let cfg: KernelConfig = serde_yaml::from_str(txt)?;
    cfg.validate()?;
    Ok(cfg)
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| "uptime.yaml".into());
    load_config_from(Path::new(&path)).await
}

pub async fn load_config_from(path: &Path) -> KernelConfig {
    if !path.exists() {
        warn!(path = %path.display(), "no config file, using defaults");
        return KernelConfig::default();
    }
    let txt = match fs::read_to_string(path).await {
        Ok(txt) => txt,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read config, using defaults");
            return KernelConfig::default();
        }
    };
    match parse_config(&txt) {
        Ok(cfg) => {
            info!(path = %path.display(), "config loaded");
            cfg
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid config, using defaults");
            KernelConfig::default()
        }
    }
}

/// Key guarding the reconciliation trigger. Unset or blank means the trigger
/// is refused.
pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_VAR)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}
