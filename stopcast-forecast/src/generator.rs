//! Synthetic passenger-demand generator
//!
//! Each stop type has a base demand and a set of peak hours. Demand for an
//! hour is the base scaled by calendar effects, plus Gaussian noise of 10%
//! of the expected value, clamped at zero and rounded.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::collections::HashMap;
use tracing::{debug, info};

use stopcast_common::stops::{StopSeed, STOPS};
use stopcast_common::StopType;

use crate::dataset::DemandRecord;
use crate::features::{CalendarFeatures, DemandHistory, FeatureVector};
use crate::{ForecastError, Result};

pub const WEEKEND_MULTIPLIER: f64 = 0.6;
pub const HOLIDAY_MULTIPLIER: f64 = 0.4;
pub const SCHOOL_MULTIPLIER: f64 = 1.5;
pub const TIDE_MULTIPLIER: f64 = 1.3;

/// Hourly demand shape of a stop type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandPattern {
    pub peak_hours: &'static [u32],
    pub base_demand: f64,
    pub peak_multiplier: f64,
}

pub fn pattern_for(stop_type: StopType) -> DemandPattern {
    let (peak_hours, base_demand, peak_multiplier): (&'static [u32], f64, f64) = match stop_type {
        StopType::Student => (&[7, 8, 16, 17], 15.0, 3.0),
        StopType::Commercial => (&[12, 13, 18, 19], 20.0, 2.5),
        StopType::University => (&[7, 8, 16, 17, 18], 25.0, 2.8),
        StopType::TransportHub => (&[7, 8, 17, 18], 30.0, 2.0),
        StopType::Medical => (&[9, 10, 14, 15], 12.0, 1.8),
        StopType::Financial => (&[8, 9, 17, 18], 10.0, 2.2),
        StopType::Recreational => (&[10, 11, 15, 16], 8.0, 2.5),
        StopType::Residential => (&[6, 7, 17, 18], 12.0, 2.0),
        StopType::Government => (&[8, 9, 16, 17], 8.0, 1.5),
        StopType::Religious => (&[6, 7, 17, 18], 5.0, 3.0),
        StopType::Mixed => (&[7, 8, 17, 18], 15.0, 2.0),
    };
    DemandPattern {
        peak_hours,
        base_demand,
        peak_multiplier,
    }
}

/// Noise-free demand for `stop` in the hour described by `calendar`
pub fn expected_demand(stop: &StopSeed, calendar: &CalendarFeatures) -> f64 {
    let pattern = pattern_for(stop.stop_type);
    let mut demand = pattern.base_demand;

    if pattern.peak_hours.contains(&calendar.hour_of_day) {
        demand *= pattern.peak_multiplier;
    }
    if calendar.is_weekend {
        demand *= WEEKEND_MULTIPLIER;
    }
    if calendar.is_public_holiday {
        demand *= HOLIDAY_MULTIPLIER;
    }
    if calendar.is_school_dismissal_time
        && matches!(stop.stop_type, StopType::Student | StopType::University)
    {
        demand *= SCHOOL_MULTIPLIER;
    }
    if calendar.is_hightide && stop.coastal {
        demand *= TIDE_MULTIPLIER;
    }

    demand
}

/// Generation window and record budget
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub start: NaiveDate,
    /// Inclusive
    pub end: NaiveDate,
    pub max_records: usize,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
            max_records: 60_000,
            seed: 42,
        }
    }
}

/// Seeded demand generator over the fixed stop list
pub struct DataGenerator {
    rng: StdRng,
    stops: Vec<StopSeed>,
}

impl DataGenerator {
    pub fn new(seed: u64) -> Self {
        Self::with_stops(seed, STOPS.to_vec())
    }

    pub fn with_stops(seed: u64, stops: Vec<StopSeed>) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            stops,
        }
    }

    /// One noisy demand sample
    pub fn sample_demand(&mut self, stop: &StopSeed, calendar: &CalendarFeatures) -> f64 {
        let expected = expected_demand(stop, calendar);
        let z: f64 = self.rng.sample(StandardNormal);
        let noise = z * 0.1 * expected;
        (expected + noise).max(0.0).round()
    }

    /// Generate records day by day, hour by hour, stop by stop
    ///
    /// Stops at the end date or once `max_records` rows exist. Lag and
    /// rolling features are filled per stop in time order afterwards.
    pub fn generate(&mut self, config: &GeneratorConfig) -> Result<Vec<DemandRecord>> {
        if config.end < config.start {
            return Err(ForecastError::InvalidParams(format!(
                "dataset end {} is before start {}",
                config.end, config.start
            )));
        }
        if self.stops.is_empty() {
            return Err(ForecastError::InvalidParams("no stops to generate for".to_string()));
        }

        info!(
            max_records = config.max_records,
            "Generating demand data from {} to {}", config.start, config.end
        );

        let stops = self.stops.clone();
        let days = (config.end - config.start).num_days() as usize + 1;
        let mut records = Vec::with_capacity(config.max_records.min(days * 24 * stops.len()));
        let mut day = config.start;

        'days: while day <= config.end {
            for hour in 0..24 {
                let datetime = day.and_hms_opt(hour, 0, 0).unwrap_or_default();
                let calendar = CalendarFeatures::at(datetime);

                for stop in &stops {
                    if records.len() >= config.max_records {
                        break 'days;
                    }
                    let count = self.sample_demand(stop, &calendar);
                    records.push(DemandRecord {
                        datetime,
                        stop_name: stop.name.to_string(),
                        latitude: stop.latitude,
                        longitude: stop.longitude,
                        stop_type: stop.stop_type.as_str().to_string(),
                        passenger_count: count,
                        features: FeatureVector::new(calendar, DemandHistory::flat(count)),
                    });
                }
            }
            day += Duration::days(1);
            debug!(records = records.len(), "Generated through {}", day);
        }

        fill_history(&mut records);

        info!(records = records.len(), "Dataset generated");
        Ok(records)
    }
}

/// Fill lag and rolling-mean features per stop in datetime order
///
/// Missing lags fall back to the row's own count; rolling means include the
/// current row and use however many rows exist (minimum one).
pub fn fill_history(records: &mut [DemandRecord]) {
    let mut by_stop: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        by_stop.entry(record.stop_name.clone()).or_default().push(idx);
    }

    for indices in by_stop.values_mut() {
        indices.sort_by_key(|&i| (records[i].datetime, i));
        let counts: Vec<f64> = indices.iter().map(|&i| records[i].passenger_count).collect();

        for (pos, &idx) in indices.iter().enumerate() {
            let own = counts[pos];
            let history = DemandHistory {
                lag_1_hour_demand: lag(&counts, pos, 1).unwrap_or(own),
                lag_24_hour_demand: lag(&counts, pos, 24).unwrap_or(own),
                rolling_3_hour_avg_demand: rolling_mean(&counts, pos, 3),
                rolling_6_hour_avg_demand: rolling_mean(&counts, pos, 6),
            };
            records[idx].features.history = history;
        }
    }
}

fn lag(counts: &[f64], pos: usize, periods: usize) -> Option<f64> {
    pos.checked_sub(periods).map(|p| counts[p])
}

fn rolling_mean(counts: &[f64], pos: usize, window: usize) -> f64 {
    let start = (pos + 1).saturating_sub(window);
    let slice = &counts[start..=pos];
    slice.iter().sum::<f64>() / slice.len() as f64
}

/// Dataset row for a materialized prediction at its peak hour
pub fn record_for_prediction(
    stop: &StopSeed,
    datetime: NaiveDateTime,
    passenger_count: f64,
) -> DemandRecord {
    DemandRecord {
        datetime,
        stop_name: stop.name.to_string(),
        latitude: stop.latitude,
        longitude: stop.longitude,
        stop_type: stop.stop_type.as_str().to_string(),
        passenger_count,
        features: FeatureVector::new(
            CalendarFeatures::at(datetime),
            DemandHistory::flat(passenger_count),
        ),
    }
}
