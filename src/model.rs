use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::config::EtaConfig;
use crate::error::{Missing, PredictionError};
use crate::geo_math;
use crate::route_progress::{self, RouteProgress};
use crate::speed_estimator::SpeedEstimator;
use crate::store::{PositionRepository, RouteRepository, VehicleRepository};
use crate::traffic::TrafficModel;
use crate::types::{GeoPoint, Prediction, RouteId, RouteStopEntry, StopId, Vehicle, VehicleId};

/// Used when the confidence inputs are not finite numbers.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;
pub const MIN_CONFIDENCE: f64 = 0.1;
pub const MAX_CONFIDENCE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub vehicle_id: VehicleId,
    pub stop_id: StopId,
    pub arrival_time: DateTime<Utc>,
    pub confidence: f64,
    pub distance_km: f64,
    pub eta_minutes: i64,
    pub intermediate_stops: usize,
    pub speed_kph: f64,
    /// vehicle is already within the at-stop radius of the target
    pub at_stop: bool,
    pub computed_at: DateTime<Utc>,
}

impl PredictionResult {
    pub fn eta_label(&self) -> String {
        geo_math::format_eta(self.eta_minutes)
    }

    pub fn to_prediction(&self) -> Prediction {
        Prediction {
            vehicle_id: self.vehicle_id,
            stop_id: self.stop_id,
            arrival_time: self.arrival_time,
            confidence: self.confidence,
            created_at: self.computed_at,
        }
    }
}

/// Everything about a vehicle that is shared by the predictions for all stops of its route.
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub vehicle_id: VehicleId,
    pub route_id: RouteId,
    pub position: GeoPoint,
    pub stops: Vec<RouteStopEntry>,
    pub progress: RouteProgress,
    pub speed_kph: f64,
}

/// Arrival-time estimator for one (vehicle, stop) pair.
pub struct EtaCalculator {
    vehicles: Arc<dyn VehicleRepository>,
    routes: Arc<dyn RouteRepository>,
    speed: SpeedEstimator,
    traffic: TrafficModel,
    clock: Arc<dyn Clock>,
    dwell_hours_per_stop: f64,
    at_stop_threshold_m: f64,
}

impl EtaCalculator {
    pub fn new(
        vehicles: Arc<dyn VehicleRepository>,
        routes: Arc<dyn RouteRepository>,
        positions: Arc<dyn PositionRepository>,
        clock: Arc<dyn Clock>,
        cfg: &EtaConfig,
    ) -> Self {
        Self {
            vehicles,
            routes,
            speed: SpeedEstimator::new(positions, cfg.speed.clone()),
            traffic: TrafficModel::new(cfg.service_offset()),
            clock,
            dwell_hours_per_stop: cfg.dwell_s_per_stop / 3600.0,
            at_stop_threshold_m: cfg.at_stop_threshold_m,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn predict(&self, vehicle_id: VehicleId, stop_id: StopId) -> Result<PredictionResult, PredictionError> {
        let now = self.clock.now();
        let vehicle = self.vehicles.get(vehicle_id)?.ok_or(Missing::Vehicle(vehicle_id))?;
        let ctx = self.route_context(&vehicle, now)?;
        self.estimate(&ctx, stop_id, now)
    }

    /// Loads route, position and speed for a vehicle once, so a refresh can estimate every
    /// stop of the route against the same snapshot.
    pub fn route_context(&self, vehicle: &Vehicle, now: DateTime<Utc>) -> Result<RouteContext, PredictionError> {
        let route_id = vehicle.route_id.ok_or(Missing::RouteAssignment(vehicle.id))?;
        let position = self
            .vehicles
            .current_position(vehicle.id)?
            .ok_or(Missing::Position(vehicle.id))?;
        if !geo_math::is_valid(position.location) {
            return Err(PredictionError::ComputationFault(format!(
                "{} reported invalid coordinates ({}, {})",
                vehicle.id, position.location.lat, position.location.lon
            )));
        }

        let stops = self.routes.ordered_stops(route_id)?;
        let speed_kph = self.speed.average_speed(vehicle.id, now)?;
        let points: Vec<GeoPoint> = stops.iter().map(|e| e.stop.location).collect();
        let progress = route_progress::locate(position.location, &points);

        Ok(RouteContext {
            vehicle_id: vehicle.id,
            route_id,
            position: position.location,
            stops,
            progress,
            speed_kph,
        })
    }

    pub fn estimate(
        &self,
        ctx: &RouteContext,
        stop_id: StopId,
        now: DateTime<Utc>,
    ) -> Result<PredictionResult, PredictionError> {
        let target_index = ctx
            .stops
            .iter()
            .position(|e| e.stop.id == stop_id)
            .ok_or(Missing::StopNotOnRoute { stop: stop_id, route: ctx.route_id })?;
        let target = ctx.stops[target_index].stop.location;
        if !geo_math::is_valid(target) {
            return Err(PredictionError::ComputationFault(format!(
                "{} has invalid coordinates ({}, {})",
                stop_id, target.lat, target.lon
            )));
        }

        let distance_km = geo_math::distance(ctx.position, target);
        let speed_kph = if ctx.speed_kph.is_finite() && ctx.speed_kph > 0.0 {
            ctx.speed_kph
        } else {
            self.speed.default_speed()
        };

        let base_hours = distance_km / speed_kph;
        let adjusted_hours = base_hours * self.traffic.factor_at(now) * self.traffic.weather_factor();
        let stops = route_progress::intermediate_stop_count(ctx.progress.index, target_index);
        let total_hours = adjusted_hours + stops as f64 * self.dwell_hours_per_stop;

        let arrival_time = now + chrono::Duration::milliseconds((total_hours * 3_600_000.0).round() as i64);
        let eta_minutes = (total_hours * 60.0).floor().max(0.0) as i64;

        Ok(PredictionResult {
            vehicle_id: ctx.vehicle_id,
            stop_id,
            arrival_time,
            confidence: confidence(distance_km, speed_kph, stops),
            distance_km,
            eta_minutes,
            intermediate_stops: stops,
            speed_kph,
            at_stop: distance_km * 1000.0 <= self.at_stop_threshold_m,
            computed_at: now,
        })
    }
}

/// Heuristic reliability of an ETA: a tier by distance, minus penalties for intermediate
/// stops and atypical speed, clamped to [0.1, 1.0].
pub fn confidence(distance_km: f64, speed_kph: f64, intermediate_stops: usize) -> f64 {
    if !distance_km.is_finite() || !speed_kph.is_finite() {
        return DEFAULT_CONFIDENCE;
    }

    let base = if distance_km <= 1.0 {
        0.9
    } else if distance_km <= 5.0 {
        0.8
    } else if distance_km <= 10.0 {
        0.7
    } else {
        0.6
    };
    let stop_penalty = (intermediate_stops as f64 * 0.05).min(0.3);
    let speed_penalty = if speed_kph < 10.0 || speed_kph > 60.0 { 0.2 } else { 0.0 };

    (base - stop_penalty - speed_penalty).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}
