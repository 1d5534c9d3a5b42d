use crate::geo_math;
use crate::types::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteProgress {
    /// index into the ordered stop sequence
    pub index: usize,
    pub percent: f64,
}

/// Infers where along its ordered stop sequence a vehicle currently is.
///
/// Nearest stop by distance, first occurrence winning ties, then a single look-ahead: if the
/// following stop is strictly closer than the nearest one, the vehicle is taken to have just
/// passed the nearest stop. On routes with tightly spaced or looping stops this linear scan
/// can pick the wrong leg.
pub fn locate(position: GeoPoint, stops: &[GeoPoint]) -> RouteProgress {
    if stops.is_empty() {
        return RouteProgress { index: 0, percent: 0.0 };
    }

    let mut index = 0;
    let mut nearest = f64::INFINITY;
    for (i, stop) in stops.iter().enumerate() {
        let d = geo_math::distance(position, *stop);
        if d < nearest {
            nearest = d;
            index = i;
        }
    }

    // `nearest` is already the minimum, so this can only advance if the scan above changes
    if let Some(next) = stops.get(index + 1) {
        if geo_math::distance(position, *next) < nearest {
            index += 1;
        }
    }

    let percent = if stops.len() == 1 {
        0.0
    } else {
        (index as f64 / (stops.len() - 1) as f64 * 100.0).clamp(0.0, 100.0)
    };

    RouteProgress { index, percent }
}

pub fn intermediate_stop_count(current_index: usize, target_index: usize) -> usize {
    target_index.saturating_sub(current_index).saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    // stops ~1.1 km apart heading north
    fn line(n: usize) -> Vec<GeoPoint> {
        (0..n).map(|i| GeoPoint::new(43.60 + i as f64 * 0.01, 1.44)).collect()
    }

    #[test]
    fn test_at_a_stop() {
        let stops = line(5);
        let p = locate(stops[2], &stops);
        assert_eq!(p, RouteProgress { index: 2, percent: 50.0 });
    }

    #[test]
    fn test_nearest_without_lookahead() {
        let stops = line(5);
        // 30% of the way from stop 1 to stop 2: stop 1 stays nearest, stop 2 is farther
        let p = locate(GeoPoint::new(43.613, 1.44), &stops);
        assert_eq!(p.index, 1);
        assert_eq!(p.percent, 25.0);
    }

    #[test]
    fn test_lookahead_does_not_advance_on_equal_distance() {
        // the next stop shares the nearest stop's platform
        let mut stops = line(4);
        stops[2] = stops[1];
        let p = locate(GeoPoint::new(43.6105, 1.44), &stops);
        assert_eq!(p.index, 1);
    }

    #[test]
    fn test_ties_go_to_first_in_sequence() {
        // a looping route serving the same platform twice
        let stops = vec![
            GeoPoint::new(43.600, 1.440),
            GeoPoint::new(43.610, 1.440),
            GeoPoint::new(43.600, 1.440),
        ];
        let p = locate(GeoPoint::new(43.6001, 1.440), &stops);
        assert_eq!(p.index, 0);
        assert_eq!(p.percent, 0.0);

        let p = locate(GeoPoint::new(43.609, 1.440), &stops);
        assert_eq!(p.index, 1);
        assert_eq!(p.percent, 50.0);
    }

    #[test]
    fn test_single_and_empty() {
        let one = line(1);
        assert_eq!(locate(GeoPoint::new(44.0, 2.0), &one), RouteProgress { index: 0, percent: 0.0 });
        assert_eq!(locate(GeoPoint::new(44.0, 2.0), &[]), RouteProgress { index: 0, percent: 0.0 });
    }

    #[test]
    fn test_intermediate_stop_count() {
        assert_eq!(intermediate_stop_count(0, 5), 4);
        assert_eq!(intermediate_stop_count(2, 3), 0);
        assert_eq!(intermediate_stop_count(3, 3), 0);
        assert_eq!(intermediate_stop_count(4, 1), 0);
    }
}
