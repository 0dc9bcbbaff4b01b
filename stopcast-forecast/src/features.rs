//! Feature engineering
//!
//! A model input is 14 values in the fixed [`FEATURE_COLUMNS`] order. The
//! calendar part is a pure function of the timestamp; the demand-history
//! part (lags and rolling means) comes either from the generated dataset or,
//! at prediction time, from random draws since no live history exists.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const FEATURE_COUNT: usize = 14;

/// Column order shared by the dataset CSV, training matrix and model artifact
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "hour_of_day",
    "day_of_week",
    "is_weekend",
    "is_public_holiday",
    "is_school_dismissal_time",
    "is_hightide",
    "lag_1_hour_demand",
    "lag_24_hour_demand",
    "rolling_3_hour_avg_demand",
    "rolling_6_hour_avg_demand",
    "hour_sin",
    "hour_cos",
    "day_of_week_sin",
    "day_of_week_cos",
];

/// Public holidays (year, month, day)
pub const PUBLIC_HOLIDAYS: [(i32, u32, u32); 9] = [
    (2024, 1, 1),
    (2024, 4, 9),
    (2024, 5, 1),
    (2024, 6, 12),
    (2024, 8, 26),
    (2024, 11, 30),
    (2024, 12, 25),
    (2024, 12, 30),
    (2024, 12, 31),
];

pub const SCHOOL_DISMISSAL_HOURS: [u32; 3] = [15, 16, 17];

/// Approximate high-tide hours (every six hours)
pub const HIGH_TIDE_HOURS: [u32; 4] = [2, 8, 14, 20];

pub fn is_public_holiday(date: NaiveDate) -> bool {
    PUBLIC_HOLIDAYS
        .iter()
        .any(|&(y, m, d)| date.year() == y && date.month() == m && date.day() == d)
}

pub fn is_weekend(date: NaiveDate) -> bool {
    date.weekday().num_days_from_monday() >= 5
}

/// Time-derived features for one hour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalendarFeatures {
    pub hour_of_day: u32,
    /// Monday = 0
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub is_public_holiday: bool,
    pub is_school_dismissal_time: bool,
    pub is_hightide: bool,
    pub hour_sin: f64,
    pub hour_cos: f64,
    pub day_of_week_sin: f64,
    pub day_of_week_cos: f64,
}

impl CalendarFeatures {
    pub fn at(datetime: NaiveDateTime) -> Self {
        let hour = datetime.hour();
        let date = datetime.date();
        let weekday = date.weekday().num_days_from_monday();

        let hour_angle = 2.0 * PI * hour as f64 / 24.0;
        let day_angle = 2.0 * PI * weekday as f64 / 7.0;

        Self {
            hour_of_day: hour,
            day_of_week: weekday,
            is_weekend: is_weekend(date),
            is_public_holiday: is_public_holiday(date),
            is_school_dismissal_time: SCHOOL_DISMISSAL_HOURS.contains(&hour),
            is_hightide: HIGH_TIDE_HOURS.contains(&hour),
            hour_sin: hour_angle.sin(),
            hour_cos: hour_angle.cos(),
            day_of_week_sin: day_angle.sin(),
            day_of_week_cos: day_angle.cos(),
        }
    }

    /// Features for `hour` on `date`; hours past 23 wrap to 23
    pub fn for_hour(date: NaiveDate, hour: u32) -> Self {
        let datetime = date
            .and_hms_opt(hour.min(23), 0, 0)
            .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN));
        Self::at(datetime)
    }
}

/// Recent-demand features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandHistory {
    pub lag_1_hour_demand: f64,
    pub lag_24_hour_demand: f64,
    pub rolling_3_hour_avg_demand: f64,
    pub rolling_6_hour_avg_demand: f64,
}

impl DemandHistory {
    /// History where every lag and mean equals `count`
    ///
    /// Used for rows that have no preceding observations.
    pub fn flat(count: f64) -> Self {
        Self {
            lag_1_hour_demand: count,
            lag_24_hour_demand: count,
            rolling_3_hour_avg_demand: count,
            rolling_6_hour_avg_demand: count,
        }
    }
}

/// Complete model input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub calendar: CalendarFeatures,
    pub history: DemandHistory,
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

impl FeatureVector {
    pub fn new(calendar: CalendarFeatures, history: DemandHistory) -> Self {
        Self { calendar, history }
    }

    /// Values in [`FEATURE_COLUMNS`] order
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        let c = &self.calendar;
        let h = &self.history;
        [
            c.hour_of_day as f64,
            c.day_of_week as f64,
            flag(c.is_weekend),
            flag(c.is_public_holiday),
            flag(c.is_school_dismissal_time),
            flag(c.is_hightide),
            h.lag_1_hour_demand,
            h.lag_24_hour_demand,
            h.rolling_3_hour_avg_demand,
            h.rolling_6_hour_avg_demand,
            c.hour_sin,
            c.hour_cos,
            c.day_of_week_sin,
            c.day_of_week_cos,
        ]
    }
}
