//! Arrival-time prediction and occupancy tracking for a vehicle fleet on fixed routes.
//!
//! The core is wired from injected repositories (see [`store`]) so any backing store can be
//! plugged in; [`memory_store::InMemoryStore`] implements all of them in process.

pub mod clock;
pub mod config;
pub mod error;
pub mod geo_math;
pub mod memory_store;
pub mod model;
pub mod occupancy;
pub mod refresher;
pub mod route_progress;
pub mod speed_estimator;
pub mod store;
pub mod traffic;
pub mod types;

pub use config::EtaConfig;
pub use error::{Missing, OccupancyError, PredictionError, StoreError};
pub use model::{EtaCalculator, PredictionResult};
pub use occupancy::{OccupancyAggregator, OccupancyStats};
pub use refresher::{PredictionRefresher, RefreshOutcome, RefreshReport};
