use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::clock::{window_start, Clock};
use crate::error::{OccupancyError, StoreError};
use crate::store::{OccupancyStore, VehicleRepository};
use crate::types::{OccupancySample, Vehicle, VehicleId};

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct OccupancyStats {
    pub current: u32,
    pub average: f64,
    pub peak: u32,
    pub total_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleLoad {
    pub vehicle_id: VehicleId,
    pub label: String,
    pub capacity: u32,
    pub passengers: u32,
    pub percent: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct FleetOccupancy {
    pub total_capacity: u64,
    pub total_passengers: u64,
    /// rounded to one decimal
    pub percent: f64,
    pub vehicles: Vec<VehicleLoad>,
}

/// Share of seats in use, capped at 100; 0 for a vehicle without declared capacity.
pub fn capacity_percentage(passengers: u32, capacity: u32) -> f64 {
    if capacity == 0 {
        return 0.0;
    }
    (passengers as f64 / capacity as f64 * 100.0).min(100.0)
}

/// Records passenger counts as an append-only history and summarises it.
pub struct OccupancyAggregator {
    vehicles: Arc<dyn VehicleRepository>,
    samples: Arc<dyn OccupancyStore>,
    clock: Arc<dyn Clock>,
}

impl OccupancyAggregator {
    pub fn new(vehicles: Arc<dyn VehicleRepository>, samples: Arc<dyn OccupancyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { vehicles, samples, clock }
    }

    /// Appends a sample. Negative counts are floored at zero; counts above capacity are
    /// stored as reported, only the percentage saturates.
    pub fn record(&self, vehicle_id: VehicleId, passenger_count: i64) -> Result<OccupancySample, OccupancyError> {
        let vehicle = self.vehicle(vehicle_id)?;
        self.append(&vehicle, passenger_count)
    }

    fn vehicle(&self, vehicle_id: VehicleId) -> Result<Vehicle, OccupancyError> {
        self.vehicles.get(vehicle_id)?.ok_or(OccupancyError::NotFound(vehicle_id))
    }

    fn append(&self, vehicle: &Vehicle, passenger_count: i64) -> Result<OccupancySample, OccupancyError> {
        let passengers = passenger_count.clamp(0, u32::MAX as i64) as u32;
        let sample = OccupancySample {
            vehicle_id: vehicle.id,
            passenger_count: passengers,
            capacity_percent: capacity_percentage(passengers, vehicle.capacity),
            recorded_at: self.clock.now(),
        };
        self.samples.insert(sample.clone())?;
        debug!(vehicle = %vehicle.id, passengers, percent = sample.capacity_percent, "occupancy recorded");
        Ok(sample)
    }

    pub fn current(&self, vehicle_id: VehicleId) -> Result<Option<OccupancySample>, StoreError> {
        self.samples.latest(vehicle_id)
    }

    /// One passenger boarding; never exceeds the seating capacity.
    pub fn board(&self, vehicle_id: VehicleId) -> Result<OccupancySample, OccupancyError> {
        let vehicle = self.vehicle(vehicle_id)?;
        let count = self.current_count(vehicle_id)?;
        let next = (count + 1).min(vehicle.capacity as i64);
        self.append(&vehicle, next)
    }

    pub fn alight(&self, vehicle_id: VehicleId) -> Result<OccupancySample, OccupancyError> {
        let vehicle = self.vehicle(vehicle_id)?;
        let count = self.current_count(vehicle_id)?;
        self.append(&vehicle, (count - 1).max(0))
    }

    pub fn reset(&self, vehicle_id: VehicleId) -> Result<OccupancySample, OccupancyError> {
        self.record(vehicle_id, 0)
    }

    fn current_count(&self, vehicle_id: VehicleId) -> Result<i64, StoreError> {
        Ok(self.samples.latest(vehicle_id)?.map_or(0, |s| s.passenger_count as i64))
    }

    pub fn stats(&self, vehicle_id: VehicleId, window_hours: u32) -> Result<OccupancyStats, StoreError> {
        let since = window_start(self.clock.now(), i64::from(window_hours) * 3600);
        let samples = self.samples.query(vehicle_id, since)?;
        let Some(latest) = samples.first() else {
            return Ok(OccupancyStats::default());
        };

        let total: u64 = samples.iter().map(|s| s.passenger_count as u64).sum();
        Ok(OccupancyStats {
            current: latest.passenger_count,
            average: total as f64 / samples.len() as f64,
            peak: samples.iter().map(|s| s.passenger_count).max().unwrap_or(0),
            total_records: samples.len(),
        })
    }

    /// Current load of every in-service vehicle and of the fleet as a whole.
    pub fn fleet_summary(&self) -> Result<FleetOccupancy, StoreError> {
        let mut summary = FleetOccupancy::default();
        for vehicle in self.vehicles.list_in_service()? {
            let passengers = self.samples.latest(vehicle.id)?.map_or(0, |s| s.passenger_count);
            summary.total_capacity += vehicle.capacity as u64;
            summary.total_passengers += passengers as u64;
            summary.vehicles.push(VehicleLoad {
                vehicle_id: vehicle.id,
                percent: capacity_percentage(passengers, vehicle.capacity),
                label: vehicle.label,
                capacity: vehicle.capacity,
                passengers,
            });
        }
        if summary.total_capacity > 0 {
            let pct = summary.total_passengers as f64 / summary.total_capacity as f64 * 100.0;
            summary.percent = (pct * 10.0).round() / 10.0;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory_store::InMemoryStore;
    use chrono::{TimeZone, Utc};

    fn vehicle(id: u64, capacity: u32, in_service: bool) -> Vehicle {
        Vehicle { id: VehicleId(id), label: format!("B{}", id), capacity, route_id: None, in_service }
    }

    fn setup() -> (Arc<InMemoryStore>, Arc<FixedClock>, OccupancyAggregator) {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_vehicle(vehicle(1, 50, true));
        store.upsert_vehicle(vehicle(2, 0, true));
        store.upsert_vehicle(vehicle(3, 40, false));
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 4, 7, 0, 0).unwrap()));
        let agg = OccupancyAggregator::new(store.clone(), store.clone(), clock.clone());
        (store, clock, agg)
    }

    #[test]
    fn test_over_capacity_percentage_saturates() {
        let (_, _, agg) = setup();
        let s = agg.record(VehicleId(1), 60).unwrap();
        assert_eq!(s.passenger_count, 60);
        assert_eq!(s.capacity_percent, 100.0);
    }

    #[test]
    fn test_negative_count_and_zero_capacity() {
        let (_, _, agg) = setup();
        assert_eq!(agg.record(VehicleId(1), -4).unwrap().passenger_count, 0);
        let s = agg.record(VehicleId(2), 12).unwrap();
        assert_eq!(s.capacity_percent, 0.0);
        assert_eq!(agg.record(VehicleId(9), 1).unwrap_err(), OccupancyError::NotFound(VehicleId(9)));
    }

    #[test]
    fn test_stats_over_window() {
        let (_, clock, agg) = setup();
        agg.record(VehicleId(1), 40).unwrap();
        clock.advance(chrono::Duration::hours(3));
        for n in [10, 30, 20] {
            agg.record(VehicleId(1), n).unwrap();
            clock.advance(chrono::Duration::minutes(10));
        }

        let stats = agg.stats(VehicleId(1), 1).unwrap();
        assert_eq!(stats, OccupancyStats { current: 20, average: 20.0, peak: 30, total_records: 3 });

        let wide = agg.stats(VehicleId(1), 24).unwrap();
        assert_eq!(wide.peak, 40);
        assert_eq!(wide.total_records, 4);

        assert_eq!(agg.stats(VehicleId(3), 24).unwrap(), OccupancyStats::default());
    }

    #[test]
    fn test_stats_with_unbounded_window() {
        let (_, clock, agg) = setup();
        agg.record(VehicleId(1), 12).unwrap();
        clock.advance(chrono::Duration::days(400));
        agg.record(VehicleId(1), 30).unwrap();

        let all = agg.stats(VehicleId(1), u32::MAX).unwrap();
        assert_eq!(all.total_records, 2);
        assert_eq!(all.peak, 30);
        assert_eq!(all.average, 21.0);
    }

    #[test]
    fn test_board_alight_reset() {
        let (_, clock, agg) = setup();
        assert_eq!(agg.alight(VehicleId(1)).unwrap().passenger_count, 0);
        agg.record(VehicleId(1), 49).unwrap();
        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(agg.board(VehicleId(1)).unwrap().passenger_count, 50);
        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(agg.board(VehicleId(1)).unwrap().passenger_count, 50);
        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(agg.alight(VehicleId(1)).unwrap().passenger_count, 49);
        clock.advance(chrono::Duration::seconds(1));
        agg.reset(VehicleId(1)).unwrap();
        assert_eq!(agg.current(VehicleId(1)).unwrap().unwrap().passenger_count, 0);
        // every change is a new sample
        assert_eq!(agg.stats(VehicleId(1), 1).unwrap().total_records, 6);
    }

    #[test]
    fn test_fleet_summary() {
        let (_, _, agg) = setup();
        agg.record(VehicleId(1), 20).unwrap();
        agg.record(VehicleId(3), 40).unwrap();
        let summary = agg.fleet_summary().unwrap();
        // vehicle 3 is out of service
        assert_eq!(summary.vehicles.len(), 2);
        assert_eq!(summary.total_capacity, 50);
        assert_eq!(summary.total_passengers, 20);
        assert_eq!(summary.percent, 40.0);
        assert_eq!(summary.vehicles[0].percent, 40.0);
        assert_eq!(summary.vehicles[1].passengers, 0);
    }
}
