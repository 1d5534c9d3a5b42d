use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::window_start;
use crate::config::SpeedConfig;
use crate::error::StoreError;
use crate::geo_math;
use crate::store::PositionRepository;
use crate::types::{PositionSample, VehicleId};

/// Derives a vehicle's recent average speed from its position history.
///
/// Implied speeds between consecutive samples outside the plausible band are treated as
/// sensor noise (GPS jumps, a bus parked with its tracker on) and dropped before averaging.
pub struct SpeedEstimator {
    positions: Arc<dyn PositionRepository>,
    cfg: SpeedConfig,
}

impl SpeedEstimator {
    pub fn new(positions: Arc<dyn PositionRepository>, cfg: SpeedConfig) -> Self {
        Self { positions, cfg }
    }

    pub fn default_speed(&self) -> f64 {
        self.cfg.default_kph
    }

    /// Average speed in km/h over the lookback window ending at `now`.
    pub fn average_speed(&self, vehicle_id: VehicleId, now: DateTime<Utc>) -> Result<f64, StoreError> {
        let since = window_start(now, self.cfg.lookback_s);
        let recent = self.positions.recent(vehicle_id, since, self.cfg.sample_limit)?;
        Ok(self.average_from_samples(&recent))
    }

    /// `samples` are expected newest first, as returned by the position repository.
    pub fn average_from_samples(&self, samples: &[PositionSample]) -> f64 {
        let speeds = self.pair_speeds(samples);
        if speeds.len() < 2 {
            return self.cfg.default_kph;
        }
        speeds.iter().sum::<f64>() / speeds.len() as f64
    }

    fn pair_speeds(&self, samples: &[PositionSample]) -> Vec<f64> {
        samples
            .windows(2)
            .filter_map(|pair| {
                let (newer, older) = (&pair[0], &pair[1]);
                let hours = (newer.recorded_at - older.recorded_at).num_milliseconds() as f64 / 3_600_000.0;
                // out-of-order or duplicated timestamps carry no speed information
                if hours <= 0.0 {
                    return None;
                }
                let kph = geo_math::distance(older.location, newer.location) / hours;
                (kph.is_finite() && kph >= self.cfg.min_kph && kph <= self.cfg.max_kph).then_some(kph)
            })
            .collect()
    }
}
