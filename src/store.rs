//! Collaborator interfaces the prediction core reads from and writes to.
//!
//! Implementations can be in-memory, database-backed, or remote. Each call is one unit of
//! store work; `PredictionStore::replace` must be atomic so that readers never observe a
//! (vehicle, stop) pair without a prediction while it is being refreshed.

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::{
    OccupancySample, PositionSample, Prediction, RouteId, RouteStopEntry, StopId, Vehicle, VehicleId,
};

pub trait VehicleRepository: Send + Sync {
    fn get(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError>;

    /// Most recent position sample.
    fn current_position(&self, id: VehicleId) -> Result<Option<PositionSample>, StoreError>;

    fn list_in_service(&self) -> Result<Vec<Vehicle>, StoreError>;
}

pub trait RouteRepository: Send + Sync {
    /// Stops of the route ordered by sequence index.
    fn ordered_stops(&self, route_id: RouteId) -> Result<Vec<RouteStopEntry>, StoreError>;
}

pub trait PositionRepository: Send + Sync {
    /// At most `limit` samples recorded at or after `since`, newest first.
    fn recent(
        &self,
        vehicle_id: VehicleId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PositionSample>, StoreError>;
}

pub trait PredictionStore: Send + Sync {
    /// Returns the number of rows removed.
    fn delete_older_than(&self, instant: DateTime<Utc>) -> Result<usize, StoreError>;

    fn delete_for(&self, vehicle_id: VehicleId, stop_id: StopId) -> Result<usize, StoreError>;

    fn insert(&self, prediction: Prediction) -> Result<(), StoreError>;

    /// Delete-then-insert for the prediction's (vehicle, stop) pair.
    ///
    /// A stored row created after `prediction` wins and the write is dropped. The default
    /// runs the two steps back to back and skips that check; stores with transactions should
    /// override it to do all of it at once.
    fn replace(&self, prediction: Prediction) -> Result<(), StoreError> {
        self.delete_for(prediction.vehicle_id, prediction.stop_id)?;
        self.insert(prediction)
    }

    /// Predictions for a stop created at or after `fresh_since`.
    fn query(&self, stop_id: StopId, fresh_since: DateTime<Utc>) -> Result<Vec<Prediction>, StoreError>;
}

pub trait OccupancyStore: Send + Sync {
    fn insert(&self, sample: OccupancySample) -> Result<(), StoreError>;

    /// Samples recorded at or after `since`, newest first.
    fn query(&self, vehicle_id: VehicleId, since: DateTime<Utc>) -> Result<Vec<OccupancySample>, StoreError>;

    fn latest(&self, vehicle_id: VehicleId) -> Result<Option<OccupancySample>, StoreError>;
}
