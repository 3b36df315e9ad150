//! fitsched.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file) yields a
//! usable configuration. The value is immutable once loaded and handed
//! to the client and scheduler at construction time.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// How the advisory best-node ranking scores a node.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ScoringMode {
    /// Mean of free CPU (millicores) and free memory (memory units).
    #[default]
    RawMean,
    /// Mean of the free fraction of CPU and memory, in `0.0..=1.0`.
    Fractional,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Control-plane API address (`host:port`), plain HTTP.
    pub api_host: String,
    /// Namespace bindings and events are written to.
    pub namespace: String,
    /// Pods annotated with this scheduler name are ours.
    pub scheduler_name: String,
    /// `source.component` on emitted events.
    pub event_component: String,
    /// Deadline for each one-shot API call.
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
    /// Initial delay before reconnecting a failed watch.
    #[serde(with = "duration_str")]
    pub watch_backoff: Duration,
    /// Upper bound for the watch reconnect delay.
    #[serde(with = "duration_str")]
    pub max_watch_backoff: Duration,
    /// Period of the full unscheduled-pod listing.
    #[serde(with = "duration_str")]
    pub reconcile_interval: Duration,
    /// Label whose value groups pods of one job.
    pub group_label: String,
    pub scoring: ScoringMode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            api_host: "127.0.0.1:8001".to_string(),
            namespace: "default".to_string(),
            scheduler_name: "hightower".to_string(),
            event_component: "hightower-scheduler".to_string(),
            request_timeout: Duration::from_secs(10),
            watch_backoff: Duration::from_secs(5),
            max_watch_backoff: Duration::from_secs(60),
            reconcile_interval: Duration::from_secs(30),
            group_label: "job-name".to_string(),
            scoring: ScoringMode::RawMean,
        }
    }
}

impl SchedulerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Reject values that would make the daemon spin or never connect.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "api_host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.scheduler_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "scheduler_name",
                reason: "must not be empty".to_string(),
            });
        }
        for (field, value) in [
            ("request_timeout", self.request_timeout),
            ("watch_backoff", self.watch_backoff),
            ("reconcile_interval", self.reconcile_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.max_watch_backoff < self.watch_backoff {
            return Err(ConfigError::Invalid {
                field: "max_watch_backoff",
                reason: "must be at least watch_backoff".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn format_duration(d: &Duration) -> String {
    if d.subsec_millis() != 0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}s", d.as_secs())
    }
}

mod duration_str {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_duration(d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        parse_duration(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration {raw:?}")))
    }
}
