use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::window_start;
use crate::config::EtaConfig;
use crate::error::{PredictionError, StoreError};
use crate::model::{EtaCalculator, PredictionResult};
use crate::store::{PredictionStore, VehicleRepository};
use crate::types::{Prediction, StopId, VehicleId};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub vehicles: usize,
    pub written: usize,
    /// pairs (or whole vehicles) skipped for lack of data
    pub not_found: usize,
    /// pairs (or whole vehicles) skipped on computation or storage faults
    pub faults: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed(RefreshReport),
    /// another cycle was still running
    Skipped,
}

struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodically recomputes the predictions of every in-service vehicle and evicts the
/// expired ones. Also serves the on-demand publish path and the fresh-prediction reads.
pub struct PredictionRefresher {
    calculator: Arc<EtaCalculator>,
    vehicles: Arc<dyn VehicleRepository>,
    predictions: Arc<dyn PredictionStore>,
    staleness_s: i64,
    period: Duration,
    running: AtomicBool,
}

impl PredictionRefresher {
    pub fn new(
        calculator: Arc<EtaCalculator>,
        vehicles: Arc<dyn VehicleRepository>,
        predictions: Arc<dyn PredictionStore>,
        cfg: &EtaConfig,
    ) -> Self {
        Self {
            calculator,
            vehicles,
            predictions,
            staleness_s: cfg.staleness_s,
            period: cfg.refresh_interval(),
            running: AtomicBool::new(false),
        }
    }

    /// Runs one cycle unless one is already in flight.
    ///
    /// Only a failure to list the fleet is returned. A failed eviction, and per-vehicle or
    /// per-pair problems, are counted as faults in the report.
    pub fn refresh_all(&self) -> Result<RefreshOutcome, StoreError> {
        let Some(_guard) = CycleGuard::acquire(&self.running) else {
            debug!("prediction refresh already running, skipping");
            return Ok(RefreshOutcome::Skipped);
        };
        self.run_cycle().map(RefreshOutcome::Completed)
    }

    fn run_cycle(&self) -> Result<RefreshReport, StoreError> {
        let mut report = RefreshReport::default();
        let cutoff = window_start(self.calculator.now(), self.staleness_s);
        match self.predictions.delete_older_than(cutoff) {
            Ok(evicted) => report.evicted = evicted,
            Err(e) => {
                report.faults += 1;
                warn!(error = %e, "stale prediction eviction failed");
            }
        }

        let vehicles = self.vehicles.list_in_service()?;
        for vehicle in vehicles.iter().filter(|v| v.route_id.is_some()) {
            report.vehicles += 1;
            // stamp each vehicle's rows with the time they were computed
            let now = self.calculator.now();

            let ctx = match self.calculator.route_context(vehicle, now) {
                Ok(ctx) => ctx,
                Err(e) => {
                    tally(&mut report, &e);
                    debug!(vehicle = %vehicle.id, error = %e, "skipping vehicle");
                    continue;
                }
            };

            for entry in &ctx.stops {
                let result = self
                    .calculator
                    .estimate(&ctx, entry.stop.id, now)
                    .and_then(|r| self.predictions.replace(r.to_prediction()).map_err(PredictionError::from));
                match result {
                    Ok(()) => report.written += 1,
                    Err(e) => {
                        tally(&mut report, &e);
                        warn!(vehicle = %vehicle.id, stop = %entry.stop.id, error = %e, "prediction skipped");
                    }
                }
            }
        }

        info!(
            vehicles = report.vehicles,
            written = report.written,
            not_found = report.not_found,
            faults = report.faults,
            evicted = report.evicted,
            "predictions refreshed"
        );
        Ok(report)
    }

    /// On-demand prediction for one pair, stored with the same replace semantics as a cycle.
    pub fn publish(&self, vehicle_id: VehicleId, stop_id: StopId) -> Result<PredictionResult, PredictionError> {
        let result = self.calculator.predict(vehicle_id, stop_id)?;
        self.predictions.replace(result.to_prediction())?;
        Ok(result)
    }

    /// Fresh predictions for a stop whose arrival is still ahead, soonest first.
    pub fn upcoming(&self, stop_id: StopId) -> Result<Vec<Prediction>, StoreError> {
        let now = self.calculator.now();
        let mut rows = self.predictions.query(stop_id, window_start(now, self.staleness_s))?;
        rows.retain(|p| p.arrival_time >= now);
        rows.sort_by_key(|p| p.arrival_time);
        Ok(rows)
    }

    /// Refresh loop; returns once `shutdown` flips to true or its sender is dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_s = self.period.as_secs(), "prediction refresher started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let this = self.clone();
                    match tokio::task::spawn_blocking(move || this.refresh_all()).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => error!(error = %e, "prediction refresh cycle failed"),
                        Err(e) => error!(error = %e, "prediction refresh task aborted"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("prediction refresher stopped");
    }

    pub fn spawn(self: Arc<Self>) -> RefresherHandle {
        let (tx, rx) = watch::channel(false);
        let join = tokio::spawn(self.run(rx));
        RefresherHandle { shutdown: tx, join }
    }
}

fn tally(report: &mut RefreshReport, e: &PredictionError) {
    if e.is_not_found() {
        report.not_found += 1;
    } else {
        report.faults += 1;
    }
}

pub struct RefresherHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl RefresherHandle {
    /// Signals the loop and waits for the in-flight cycle, if any, to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "prediction refresher did not stop cleanly");
        }
    }
}
