//! Geospatial helpers shared by the estimators.
//!
//! Distances and bearings are computed on the WGS-84 ellipsoid (`geo`'s geodesic
//! algorithms), which stays accurate at city scale where planar shortcuts drift.

use crate::types::{GeoPoint, PositionSample};
use geo::{GeodesicBearing, GeodesicDistance, Point};

fn to_point(p: GeoPoint) -> Point<f64> {
    Point::new(p.lon, p.lat)
}

/// Geodesic distance in kilometres.
pub fn distance(p1: GeoPoint, p2: GeoPoint) -> f64 {
    to_point(p1).geodesic_distance(&to_point(p2)) / 1000.0
}

/// Initial bearing from `p1` to `p2`, in degrees within [0, 360).
pub fn bearing(p1: GeoPoint, p2: GeoPoint) -> f64 {
    let raw = to_point(p1).geodesic_bearing(to_point(p2));
    if !raw.is_finite() {
        return 0.0;
    }
    let deg = raw.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if deg >= 360.0 {
        0.0
    } else {
        deg
    }
}

pub fn validate_coordinates(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

pub fn is_valid(p: GeoPoint) -> bool {
    validate_coordinates(p.lat, p.lon)
}

/// Moving-average smoothing over a centered window clamped at the sequence edges.
///
/// Only coordinates are replaced; speed, heading and timestamps are carried over.
/// Returns the input unchanged when it holds fewer samples than the window.
pub fn smooth(samples: &[PositionSample], window_size: usize) -> Vec<PositionSample> {
    if window_size <= 1 || samples.len() < window_size {
        return samples.to_vec();
    }

    let half = window_size / 2;
    samples
        .iter()
        .enumerate()
        .map(|(i, sample)| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(samples.len());
            let window = &samples[start..end];
            let n = window.len() as f64;

            let mut smoothed = sample.clone();
            smoothed.location = GeoPoint {
                lat: window.iter().map(|s| s.location.lat).sum::<f64>() / n,
                lon: window.iter().map(|s| s.location.lon).sum::<f64>() / n,
            };
            smoothed
        })
        .collect()
}

/// Linear interpolation; `ratio` 0.0 is `p1`, 1.0 is `p2`.
pub fn interpolate(p1: GeoPoint, p2: GeoPoint, ratio: f64) -> GeoPoint {
    let r = ratio.clamp(0.0, 1.0);
    GeoPoint {
        lat: p1.lat + (p2.lat - p1.lat) * r,
        lon: p1.lon + (p2.lon - p1.lon) * r,
    }
}

pub fn is_at_stop(vehicle: GeoPoint, stop: GeoPoint, threshold_m: f64) -> bool {
    distance(vehicle, stop) * 1000.0 <= threshold_m
}

/// Rider-facing rendering of an ETA in whole minutes.
pub fn format_eta(eta_minutes: i64) -> String {
    match eta_minutes {
        m if m < 1 => "now".to_string(),
        1 => "1 minute".to_string(),
        m if m < 60 => format!("{} minutes", m),
        m => {
            let (hours, minutes) = (m / 60, m % 60);
            match (hours, minutes) {
                (1, 0) => "1 hour".to_string(),
                (h, 0) => format!("{} hours", h),
                (h, min) => format!("{}h{:02}", h, min),
            }
        }
    }
}
