use crate::types::{RouteId, StopId, VehicleId};
use thiserror::Error;

/// Failure reported by a backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// What was missing when a prediction could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Missing {
    #[error("unknown {0}")]
    Vehicle(VehicleId),
    #[error("{0} has no assigned route")]
    RouteAssignment(VehicleId),
    #[error("{0} has no position sample")]
    Position(VehicleId),
    #[error("{stop} is not served by {route}")]
    StopNotOnRoute { stop: StopId, route: RouteId },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionError {
    #[error("not found: {0}")]
    NotFound(#[from] Missing),
    #[error("computation fault: {0}")]
    ComputationFault(String),
    #[error("storage fault: {0}")]
    StorageFault(#[from] StoreError),
}

impl PredictionError {
    /// Absence of data, as opposed to a fault worth retrying.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PredictionError::NotFound(_))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OccupancyError {
    #[error("unknown {0}")]
    NotFound(VehicleId),
    #[error("storage fault: {0}")]
    StorageFault(#[from] StoreError),
}
