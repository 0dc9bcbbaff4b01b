//! Per-stop daily forecast
//!
//! The model path scores all 24 hours of the date and reports the busiest
//! one. There is no live demand history, so lag and rolling features are
//! drawn at random per hour. When no model is loaded, or the model path
//! fails, a rule-based estimate is used instead.

use chrono::NaiveDate;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::warn;

use stopcast_common::models::NewPrediction;

use crate::features::{is_weekend, CalendarFeatures, DemandHistory, FeatureVector};
use crate::model::DemandModel;
use crate::Result;

pub const MODEL_CONFIDENCE: f64 = 0.95;
pub const HEURISTIC_WEEKDAY_CONFIDENCE: f64 = 0.8;
pub const HEURISTIC_WEEKEND_CONFIDENCE: f64 = 0.7;

const WEEKDAY_PEAK_HOURS: [u32; 2] = [7, 17];
const WEEKEND_PEAK_HOURS: [u32; 2] = [15, 18];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastSource {
    Model,
    Heuristic,
}

/// Context flags reported alongside a peak
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextFlags {
    pub school_dismissal: bool,
    pub high_tide: bool,
    pub public_holiday: bool,
    pub weekend: bool,
}

impl ContextFlags {
    fn from_calendar(calendar: &CalendarFeatures) -> Self {
        Self {
            school_dismissal: calendar.is_school_dismissal_time,
            high_tide: calendar.is_hightide,
            public_holiday: calendar.is_public_holiday,
            weekend: calendar.is_weekend,
        }
    }

    /// Notes in display order
    fn notes(&self) -> Vec<&'static str> {
        [
            (self.school_dismissal, "school dismissal time"),
            (self.high_tide, "high tide"),
            (self.public_holiday, "public holiday"),
            (self.weekend, "weekend"),
        ]
        .into_iter()
        .filter_map(|(set, note)| set.then_some(note))
        .collect()
    }
}

/// Forecast for one stop on one date
#[derive(Debug, Clone, PartialEq)]
pub struct StopForecast {
    pub predicted_passengers: i64,
    pub peak_hour: u32,
    pub confidence_score: f64,
    pub flags: ContextFlags,
    pub message: String,
    pub source: ForecastSource,
}

impl StopForecast {
    pub fn into_new_prediction(self, stop_id: i64, date: NaiveDate) -> NewPrediction {
        NewPrediction {
            stop_id,
            prediction_date: date,
            predicted_passengers: self.predicted_passengers,
            peak_hour: self.peak_hour,
            confidence_score: self.confidence_score,
            is_school_dismissal: self.flags.school_dismissal,
            is_high_tide: self.flags.high_tide,
            is_public_holiday: self.flags.public_holiday,
            is_weekend: self.flags.weekend,
            message: self.message,
        }
    }
}

/// 12-hour clock label: `12:00 AM`, `1:00 AM` .. `12:00 PM`, `1:00 PM` ..
pub fn format_hour(hour: u32) -> String {
    match hour {
        0 => "12:00 AM".to_string(),
        1..=11 => format!("{}:00 AM", hour),
        12 => "12:00 PM".to_string(),
        _ => format!("{}:00 PM", hour - 12),
    }
}

pub fn format_message(
    stop_name: &str,
    peak_hour: u32,
    passengers: i64,
    flags: &ContextFlags,
) -> String {
    let mut message = format!(
        "Peak time at {}, expecting {} passengers at {}.",
        format_hour(peak_hour),
        passengers,
        stop_name
    );

    let notes = flags.notes();
    if !notes.is_empty() {
        message.push_str(&format!(" Note: {}.", notes.join(", ")));
    }
    message
}

/// Index and value of the maximum; the earliest hour wins ties
pub fn find_peak(hourly: &[i64]) -> Option<(u32, i64)> {
    let mut best: Option<(u32, i64)> = None;
    for (hour, &value) in hourly.iter().enumerate() {
        if best.map_or(true, |(_, b)| value > b) {
            best = Some((hour as u32, value));
        }
    }
    best
}

fn random_history<R: Rng + ?Sized>(rng: &mut R) -> DemandHistory {
    DemandHistory {
        lag_1_hour_demand: rng.gen_range(3..=28) as f64,
        lag_24_hour_demand: rng.gen_range(3..=28) as f64,
        rolling_3_hour_avg_demand: rng.gen_range(5..=25) as f64,
        rolling_6_hour_avg_demand: rng.gen_range(5..=25) as f64,
    }
}

/// Model-backed forecast for `stop_name` on `date`
pub fn predict_for_stop<M, R>(
    model: &M,
    stop_name: &str,
    date: NaiveDate,
    rng: &mut R,
) -> Result<StopForecast>
where
    M: DemandModel + ?Sized,
    R: Rng + ?Sized,
{
    let mut hourly = [0i64; 24];
    for (hour, slot) in hourly.iter_mut().enumerate() {
        let calendar = CalendarFeatures::for_hour(date, hour as u32);
        let features = FeatureVector::new(calendar, random_history(rng));
        let raw = model.predict_demand(&features)?;
        *slot = raw.round().max(0.0) as i64;
    }

    let (peak_hour, passengers) = find_peak(&hourly).unwrap_or((0, 0));
    let flags = ContextFlags::from_calendar(&CalendarFeatures::for_hour(date, peak_hour));

    Ok(StopForecast {
        predicted_passengers: passengers,
        peak_hour,
        confidence_score: MODEL_CONFIDENCE,
        flags,
        message: format_message(stop_name, peak_hour, passengers, &flags),
        source: ForecastSource::Model,
    })
}

/// Rule-based forecast used when the model is unavailable
pub fn heuristic_forecast<R: Rng + ?Sized>(
    stop_name: &str,
    date: NaiveDate,
    rng: &mut R,
) -> StopForecast {
    let weekend = is_weekend(date);
    let candidates = if weekend {
        &WEEKEND_PEAK_HOURS
    } else {
        &WEEKDAY_PEAK_HOURS
    };
    let peak_hour = candidates.choose(rng).copied().unwrap_or(candidates[0]);

    let base: i64 = if weekend { 14 } else { 18 };
    let passengers = (base + rng.gen_range(0..=10)).max(5);

    let flags = ContextFlags {
        school_dismissal: matches!(peak_hour, 15 | 16),
        high_tide: false,
        public_holiday: false,
        weekend,
    };

    StopForecast {
        predicted_passengers: passengers,
        peak_hour,
        confidence_score: if weekend {
            HEURISTIC_WEEKEND_CONFIDENCE
        } else {
            HEURISTIC_WEEKDAY_CONFIDENCE
        },
        flags,
        message: format_message(stop_name, peak_hour, passengers, &flags),
        source: ForecastSource::Heuristic,
    }
}

/// Model path when a model is available, heuristic otherwise
pub fn forecast_stop<R: Rng + ?Sized>(
    model: Option<&dyn DemandModel>,
    stop_name: &str,
    date: NaiveDate,
    rng: &mut R,
) -> StopForecast {
    match model {
        Some(model) => match predict_for_stop(model, stop_name, date, rng) {
            Ok(forecast) => forecast,
            Err(e) => {
                warn!(stop = stop_name, error = %e, "Model prediction failed, using heuristic");
                heuristic_forecast(stop_name, date, rng)
            }
        },
        None => heuristic_forecast(stop_name, date, rng),
    }
}
