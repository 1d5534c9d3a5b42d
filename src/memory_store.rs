use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::StoreError;
use crate::store::{OccupancyStore, PositionRepository, PredictionStore, RouteRepository, VehicleRepository};
use crate::types::{
    OccupancySample, PositionSample, Prediction, RouteId, RouteStopEntry, StopId, Vehicle, VehicleId,
};

/// Process-local store backing every collaborator trait.
///
/// Used by the binary when no external database is wired in, and by tests.
#[derive(Default)]
pub struct InMemoryStore {
    vehicles: RwLock<HashMap<VehicleId, Vehicle>>,
    routes: RwLock<HashMap<RouteId, Vec<RouteStopEntry>>>,
    // per vehicle, ascending by recorded_at
    positions: RwLock<HashMap<VehicleId, Vec<PositionSample>>>,
    predictions: RwLock<Vec<Prediction>>,
    occupancy: RwLock<HashMap<VehicleId, Vec<OccupancySample>>>,
}

/// Initial contents, as read from a JSON seed file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub vehicles: Vec<Vehicle>,
    pub routes: Vec<SeedRoute>,
    pub positions: Vec<PositionSample>,
}

#[derive(Debug, Deserialize)]
pub struct SeedRoute {
    pub id: RouteId,
    pub stops: Vec<RouteStopEntry>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Seed) -> Self {
        let store = Self::new();
        for v in seed.vehicles {
            store.upsert_vehicle(v);
        }
        for r in seed.routes {
            store.set_route(r.id, r.stops);
        }
        for p in seed.positions {
            store.push_position(p);
        }
        store
    }

    pub fn upsert_vehicle(&self, vehicle: Vehicle) {
        self.vehicles.write().insert(vehicle.id, vehicle);
    }

    pub fn set_route(&self, route_id: RouteId, mut stops: Vec<RouteStopEntry>) {
        stops.sort_by_key(|s| s.sequence);
        self.routes.write().insert(route_id, stops);
    }

    /// Ingestion entry point for telemetry.
    pub fn push_position(&self, sample: PositionSample) {
        let mut positions = self.positions.write();
        let track = positions.entry(sample.vehicle_id).or_default();
        let at = track.partition_point(|s| s.recorded_at <= sample.recorded_at);
        track.insert(at, sample);
    }

    pub fn predictions_for_vehicle(&self, vehicle_id: VehicleId) -> Vec<Prediction> {
        self.predictions
            .read()
            .iter()
            .filter(|p| p.vehicle_id == vehicle_id)
            .cloned()
            .collect()
    }

    pub fn prediction_count(&self) -> usize {
        self.predictions.read().len()
    }
}

impl VehicleRepository for InMemoryStore {
    fn get(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError> {
        Ok(self.vehicles.read().get(&id).cloned())
    }

    fn current_position(&self, id: VehicleId) -> Result<Option<PositionSample>, StoreError> {
        Ok(self.positions.read().get(&id).and_then(|t| t.last().cloned()))
    }

    fn list_in_service(&self) -> Result<Vec<Vehicle>, StoreError> {
        let mut vehicles: Vec<_> = self.vehicles.read().values().filter(|v| v.in_service).cloned().collect();
        vehicles.sort_by_key(|v| v.id);
        Ok(vehicles)
    }
}

impl RouteRepository for InMemoryStore {
    fn ordered_stops(&self, route_id: RouteId) -> Result<Vec<RouteStopEntry>, StoreError> {
        Ok(self.routes.read().get(&route_id).cloned().unwrap_or_default())
    }
}

impl PositionRepository for InMemoryStore {
    fn recent(
        &self,
        vehicle_id: VehicleId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PositionSample>, StoreError> {
        let positions = self.positions.read();
        let Some(track) = positions.get(&vehicle_id) else {
            return Ok(Vec::new());
        };
        Ok(track
            .iter()
            .rev()
            .take_while(|s| s.recorded_at >= since)
            .take(limit)
            .cloned()
            .collect())
    }
}

impl PredictionStore for InMemoryStore {
    fn delete_older_than(&self, instant: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut predictions = self.predictions.write();
        let before = predictions.len();
        predictions.retain(|p| p.created_at >= instant);
        Ok(before - predictions.len())
    }

    fn delete_for(&self, vehicle_id: VehicleId, stop_id: StopId) -> Result<usize, StoreError> {
        let mut predictions = self.predictions.write();
        let before = predictions.len();
        predictions.retain(|p| !(p.vehicle_id == vehicle_id && p.stop_id == stop_id));
        Ok(before - predictions.len())
    }

    fn insert(&self, prediction: Prediction) -> Result<(), StoreError> {
        self.predictions.write().push(prediction);
        Ok(())
    }

    fn replace(&self, prediction: Prediction) -> Result<(), StoreError> {
        // one write guard for the check and both steps
        let mut predictions = self.predictions.write();
        let superseded = predictions.iter().any(|p| {
            p.vehicle_id == prediction.vehicle_id
                && p.stop_id == prediction.stop_id
                && p.created_at > prediction.created_at
        });
        if superseded {
            return Ok(());
        }
        predictions.retain(|p| !(p.vehicle_id == prediction.vehicle_id && p.stop_id == prediction.stop_id));
        predictions.push(prediction);
        Ok(())
    }

    fn query(&self, stop_id: StopId, fresh_since: DateTime<Utc>) -> Result<Vec<Prediction>, StoreError> {
        Ok(self
            .predictions
            .read()
            .iter()
            .filter(|p| p.stop_id == stop_id && p.created_at >= fresh_since)
            .cloned()
            .collect())
    }
}

impl OccupancyStore for InMemoryStore {
    fn insert(&self, sample: OccupancySample) -> Result<(), StoreError> {
        let mut occupancy = self.occupancy.write();
        let history = occupancy.entry(sample.vehicle_id).or_default();
        let at = history.partition_point(|s| s.recorded_at <= sample.recorded_at);
        history.insert(at, sample);
        Ok(())
    }

    fn query(&self, vehicle_id: VehicleId, since: DateTime<Utc>) -> Result<Vec<OccupancySample>, StoreError> {
        let occupancy = self.occupancy.read();
        Ok(occupancy
            .get(&vehicle_id)
            .map(|h| h.iter().rev().take_while(|s| s.recorded_at >= since).cloned().collect())
            .unwrap_or_default())
    }

    fn latest(&self, vehicle_id: VehicleId) -> Result<Option<OccupancySample>, StoreError> {
        Ok(self.occupancy.read().get(&vehicle_id).and_then(|h| h.last().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoPoint;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn pos(secs: i64) -> PositionSample {
        PositionSample {
            vehicle_id: VehicleId(7),
            location: GeoPoint::new(43.6, 1.44),
            speed_kph: 0.0,
            heading_deg: 0.0,
            accuracy_m: 3.0,
            recorded_at: t(secs),
        }
    }

    fn prediction(vehicle: u64, stop: u64, created: i64) -> Prediction {
        Prediction {
            vehicle_id: VehicleId(vehicle),
            stop_id: StopId(stop),
            arrival_time: t(created + 600),
            confidence: 0.8,
            created_at: t(created),
        }
    }

    #[test]
    fn test_positions_ordered_newest_first() {
        let store = InMemoryStore::new();
        for s in [30, 10, 20, 0] {
            store.push_position(pos(s));
        }
        let recent = store.recent(VehicleId(7), t(10), 10).unwrap();
        let times: Vec<_> = recent.iter().map(|p| p.recorded_at).collect();
        assert_eq!(times, vec![t(30), t(20), t(10)]);
        assert_eq!(store.recent(VehicleId(7), t(0), 2).unwrap().len(), 2);
        assert_eq!(store.current_position(VehicleId(7)).unwrap().unwrap().recorded_at, t(30));
        assert!(store.current_position(VehicleId(8)).unwrap().is_none());
    }

    #[test]
    fn test_replace_keeps_one_row_per_pair() {
        let store = InMemoryStore::new();
        store.replace(prediction(1, 1, 0)).unwrap();
        store.replace(prediction(1, 1, 60)).unwrap();
        store.replace(prediction(1, 2, 60)).unwrap();
        let rows = store.predictions_for_vehicle(VehicleId(1));
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|p| p.created_at == t(60)));
    }

    #[test]
    fn test_replace_never_overwrites_a_newer_row() {
        let store = InMemoryStore::new();
        store.replace(prediction(1, 1, 60)).unwrap();
        // a slow writer that computed its row earlier arrives last
        store.replace(prediction(1, 1, 0)).unwrap();
        let rows = store.predictions_for_vehicle(VehicleId(1));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].created_at, t(60));

        // same timestamp still replaces
        let mut again = prediction(1, 1, 60);
        again.confidence = 0.4;
        store.replace(again.clone()).unwrap();
        assert_eq!(store.predictions_for_vehicle(VehicleId(1)), vec![again]);
    }

    #[test]
    fn test_delete_older_than_and_query() {
        let store = InMemoryStore::new();
        PredictionStore::insert(&store, prediction(1, 1, 0)).unwrap();
        PredictionStore::insert(&store, prediction(2, 1, 400)).unwrap();
        PredictionStore::insert(&store, prediction(2, 3, 400)).unwrap();
        assert_eq!(store.delete_older_than(t(100)).unwrap(), 1);
        let fresh = PredictionStore::query(&store, StopId(1), t(0)).unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].vehicle_id, VehicleId(2));
        assert_eq!(store.delete_for(VehicleId(2), StopId(3)).unwrap(), 1);
        assert_eq!(store.prediction_count(), 1);
    }
}
