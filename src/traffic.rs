use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};

/// Time-of-day / day-of-week slowdown applied on top of the measured speed.
#[derive(Debug, Clone, Copy)]
pub struct TrafficModel {
    offset: FixedOffset,
}

impl TrafficModel {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// `day_of_week` counts from Monday = 0.
    pub fn factor(hour: u32, day_of_week: u32) -> f64 {
        let weekday = day_of_week < 5;
        if weekday {
            if (7..=9).contains(&hour) || (17..=19).contains(&hour) {
                1.4
            } else if (6..=22).contains(&hour) {
                1.2
            } else {
                1.0
            }
        } else if (10..=18).contains(&hour) {
            1.1
        } else {
            1.0
        }
    }

    /// Factor for an instant, evaluated in the service time zone.
    pub fn factor_at(&self, now: DateTime<Utc>) -> f64 {
        let local = now.with_timezone(&self.offset);
        Self::factor(local.hour(), local.weekday().num_days_from_monday())
    }

    // Hook for a weather signal; no feed is wired yet.
    pub fn weather_factor(&self) -> f64 {
        1.0
    }
}
