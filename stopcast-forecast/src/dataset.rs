//! Training dataset CSV
//!
//! Columns: `datetime, stop_name, latitude, longitude, stop_type,
//! passenger_count` followed by the 14 feature columns. Flags are written as
//! 0/1 so the file stays readable by ordinary data tooling.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::info;

use crate::features::{CalendarFeatures, DemandHistory, FeatureVector};
use crate::{ForecastError, Result};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One observed (or generated) hour of demand at one stop
#[derive(Debug, Clone, PartialEq)]
pub struct DemandRecord {
    pub datetime: NaiveDateTime,
    pub stop_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub stop_type: String,
    pub passenger_count: f64,
    pub features: FeatureVector,
}

/// Flat CSV layout
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    datetime: String,
    stop_name: String,
    latitude: f64,
    longitude: f64,
    stop_type: String,
    passenger_count: f64,
    hour_of_day: u32,
    day_of_week: u32,
    is_weekend: u8,
    is_public_holiday: u8,
    is_school_dismissal_time: u8,
    is_hightide: u8,
    lag_1_hour_demand: f64,
    lag_24_hour_demand: f64,
    rolling_3_hour_avg_demand: f64,
    rolling_6_hour_avg_demand: f64,
    hour_sin: f64,
    hour_cos: f64,
    day_of_week_sin: f64,
    day_of_week_cos: f64,
}

impl From<&DemandRecord> for CsvRow {
    fn from(record: &DemandRecord) -> Self {
        let c = &record.features.calendar;
        let h = &record.features.history;
        Self {
            datetime: record.datetime.format(DATETIME_FORMAT).to_string(),
            stop_name: record.stop_name.clone(),
            latitude: record.latitude,
            longitude: record.longitude,
            stop_type: record.stop_type.clone(),
            passenger_count: record.passenger_count,
            hour_of_day: c.hour_of_day,
            day_of_week: c.day_of_week,
            is_weekend: c.is_weekend as u8,
            is_public_holiday: c.is_public_holiday as u8,
            is_school_dismissal_time: c.is_school_dismissal_time as u8,
            is_hightide: c.is_hightide as u8,
            lag_1_hour_demand: h.lag_1_hour_demand,
            lag_24_hour_demand: h.lag_24_hour_demand,
            rolling_3_hour_avg_demand: h.rolling_3_hour_avg_demand,
            rolling_6_hour_avg_demand: h.rolling_6_hour_avg_demand,
            hour_sin: c.hour_sin,
            hour_cos: c.hour_cos,
            day_of_week_sin: c.day_of_week_sin,
            day_of_week_cos: c.day_of_week_cos,
        }
    }
}

impl TryFrom<CsvRow> for DemandRecord {
    type Error = ForecastError;

    fn try_from(row: CsvRow) -> Result<Self> {
        let datetime = parse_datetime(&row.datetime)?;
        let calendar = CalendarFeatures {
            hour_of_day: row.hour_of_day,
            day_of_week: row.day_of_week,
            is_weekend: row.is_weekend != 0,
            is_public_holiday: row.is_public_holiday != 0,
            is_school_dismissal_time: row.is_school_dismissal_time != 0,
            is_hightide: row.is_hightide != 0,
            hour_sin: row.hour_sin,
            hour_cos: row.hour_cos,
            day_of_week_sin: row.day_of_week_sin,
            day_of_week_cos: row.day_of_week_cos,
        };
        let history = DemandHistory {
            lag_1_hour_demand: row.lag_1_hour_demand,
            lag_24_hour_demand: row.lag_24_hour_demand,
            rolling_3_hour_avg_demand: row.rolling_3_hour_avg_demand,
            rolling_6_hour_avg_demand: row.rolling_6_hour_avg_demand,
        };

        Ok(Self {
            datetime,
            stop_name: row.stop_name,
            latitude: row.latitude,
            longitude: row.longitude,
            stop_type: row.stop_type,
            passenger_count: row.passenger_count,
            features: FeatureVector::new(calendar, history),
        })
    }
}

/// Accepts both `2024-03-04 07:00:00` and ISO `2024-03-04T07:00:00`
fn parse_datetime(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|_| ForecastError::InvalidDataset(format!("Bad datetime '{}'", value)))
}

/// Write `records` to `path`, replacing any existing file
pub fn save_dataset(path: &Path, records: &[DemandRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(CsvRow::from(record))?;
    }
    writer.flush()?;

    info!(records = records.len(), "Dataset saved to {}", path.display());
    Ok(())
}

/// Read every record from `path`
pub fn load_dataset(path: &Path) -> Result<Vec<DemandRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader
        .deserialize::<CsvRow>()
        .map(|row| DemandRecord::try_from(row?))
        .collect::<Result<Vec<_>>>()?;

    info!(records = records.len(), "Dataset loaded from {}", path.display());
    Ok(records)
}

/// Append one record, writing the header when the file is new or empty
///
/// Callers that may append concurrently must serialize calls themselves.
pub fn append_record(path: &Path, record: &DemandRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file: File = OpenOptions::new().create(true).append(true).open(path)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    writer.serialize(CsvRow::from(record))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record(hour: u32, count: f64) -> DemandRecord {
        let datetime = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        DemandRecord {
            datetime,
            stop_name: "Junction".to_string(),
            latitude: 16.046392,
            longitude: 120.343012,
            stop_type: "transport_hub".to_string(),
            passenger_count: count,
            features: FeatureVector::new(
                CalendarFeatures::at(datetime),
                DemandHistory::flat(count),
            ),
        }
    }

    #[test]
    fn test_append_creates_header_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");

        append_record(&path, &record(7, 60.0)).unwrap();
        append_record(&path, &record(8, 55.0)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header_lines = content
            .lines()
            .filter(|l| l.starts_with("datetime,stop_name"))
            .count();
        assert_eq!(header_lines, 1);
        assert_eq!(content.lines().count(), 3);

        let loaded = load_dataset(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1], record(8, 55.0));
    }

    #[test]
    fn test_append_after_save_extends_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");

        save_dataset(&path, &[record(6, 10.0), record(7, 30.0)]).unwrap();
        append_record(&path, &record(17, 44.0)).unwrap();

        let loaded = load_dataset(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[2].passenger_count, 44.0);
        assert!(loaded[2].features.calendar.is_school_dismissal_time);
    }

    #[test]
    fn test_header_matches_column_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        save_dataset(&path, &[record(6, 10.0)]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header = content.lines().next().unwrap();
        let mut expected = vec![
            "datetime",
            "stop_name",
            "latitude",
            "longitude",
            "stop_type",
            "passenger_count",
        ];
        expected.extend(crate::features::FEATURE_COLUMNS);
        assert_eq!(header, expected.join(","));
    }

    #[test]
    fn test_iso_datetime_accepted() {
        let dt = parse_datetime("2024-03-04T07:00:00").unwrap();
        assert_eq!(dt, record(7, 0.0).datetime);
        assert!(parse_datetime("yesterday").is_err());
    }
}
