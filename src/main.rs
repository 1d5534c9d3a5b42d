use std::{fs, sync::Arc};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use fleet_eta::clock::{Clock, SystemClock};
use fleet_eta::memory_store::{InMemoryStore, Seed};
use fleet_eta::{EtaCalculator, EtaConfig, OccupancyAggregator, PredictionRefresher};

fn load_store() -> anyhow::Result<InMemoryStore> {
    let Ok(path) = std::env::var("FLEET_ETA_SEED") else {
        tracing::warn!("FLEET_ETA_SEED not set; starting with an empty fleet");
        return Ok(InMemoryStore::new());
    };
    let data = fs::read_to_string(&path).with_context(|| format!("failed to read seed at {}", path))?;
    let seed: Seed = serde_json::from_str(&data).with_context(|| format!("invalid seed JSON in {}", path))?;
    tracing::info!(
        vehicles = seed.vehicles.len(),
        routes = seed.routes.len(),
        positions = seed.positions.len(),
        "loaded seed"
    );
    Ok(InMemoryStore::from_seed(seed))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = EtaConfig::from_env()?;
    tracing::info!(?cfg, "configuration loaded");

    let store = Arc::new(load_store()?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let calculator = Arc::new(EtaCalculator::new(store.clone(), store.clone(), store.clone(), clock.clone(), &cfg));
    let refresher = Arc::new(PredictionRefresher::new(calculator, store.clone(), store.clone(), &cfg));
    let occupancy = OccupancyAggregator::new(store.clone(), store.clone(), clock);

    let handle = refresher.clone().spawn();

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");
    handle.stop().await;

    let fleet = occupancy.fleet_summary()?;
    tracing::info!(
        vehicles = fleet.vehicles.len(),
        passengers = fleet.total_passengers,
        percent = fleet.percent,
        predictions = store.prediction_count(),
        "final state"
    );
    Ok(())
}
