use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

/// Tunables of the prediction core. Every field has a default, so an empty JSON object
/// (or no file at all) yields the reference behaviour.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EtaConfig {
    pub refresh_interval_s: u64,
    /// predictions created earlier than this are expired
    pub staleness_s: i64,
    pub dwell_s_per_stop: f64,
    pub at_stop_threshold_m: f64,
    /// offset of the service time zone, used by the traffic model
    pub utc_offset_minutes: i32,
    pub speed: SpeedConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SpeedConfig {
    pub sample_limit: usize,
    pub lookback_s: i64,
    pub min_kph: f64,
    pub max_kph: f64,
    pub default_kph: f64,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            refresh_interval_s: 120,
            staleness_s: 5 * 60,
            dwell_s_per_stop: 60.0,
            at_stop_threshold_m: 100.0,
            utc_offset_minutes: 0,
            speed: SpeedConfig::default(),
        }
    }
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            sample_limit: 10,
            lookback_s: 2 * 60 * 60,
            min_kph: 5.0,
            max_kph: 80.0,
            default_kph: 25.0,
        }
    }
}

impl EtaConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("invalid config JSON in {}", path.display()))
    }

    /// Reads the file named by `FLEET_ETA_CONFIG`, or falls back to defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var("FLEET_ETA_CONFIG") {
            Ok(path) => Self::load(path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_s.max(1))
    }

    pub fn service_offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}
