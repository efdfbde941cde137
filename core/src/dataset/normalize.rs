//! Raw activity records to schema rows
//!
//! Activity exports report metric units: meters, seconds and meters per
//! second. Rows of the analysis table use miles, minutes and minutes per mile,
//! plus calendar fields derived from the local start time. Only activities of
//! type `Run` are kept; absent optional metrics become `0.0`.

use chrono::{Datelike, NaiveDateTime};
use serde::Deserialize;
use tracing::debug;

use super::schema::COLUMNS;
use super::{DatasetError, DatasetResult};
use crate::table::{parse_datetime, Cell, Column, DataFrame};

pub const MILES_PER_METER: f64 = 0.000621371;
pub const FEET_PER_METER: f64 = 3.28084;
/// Seconds per mile at one meter per second, divided by 60
pub const PACE_NUMERATOR: f64 = 26.822;

#[derive(Debug, Clone, Deserialize)]
pub struct RawActivity {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    /// meters
    pub distance: f64,
    /// seconds
    pub moving_time: f64,
    pub elapsed_time: f64,
    #[serde(default)]
    pub total_elevation_gain: f64,
    pub start_date: String,
    pub start_date_local: String,
    /// meters per second
    #[serde(default)]
    pub average_speed: Option<f64>,
    #[serde(default)]
    pub max_speed: Option<f64>,
    #[serde(default)]
    pub average_cadence: Option<f64>,
    #[serde(default)]
    pub average_heartrate: Option<f64>,
    #[serde(default)]
    pub max_heartrate: Option<f64>,
    #[serde(default)]
    pub suffer_score: Option<f64>,
}

/// Parse a JSON array of activity records
pub fn parse_activities(json: &str) -> DatasetResult<Vec<RawActivity>> {
    Ok(serde_json::from_str(json)?)
}

/// m/s to minutes per mile; zero and absent speeds have no pace
fn pace(speed: Option<f64>) -> f64 {
    match speed {
        Some(mps) if mps > 0.0 => PACE_NUMERATOR / mps,
        _ => 0.0,
    }
}

fn timestamp(activity: &RawActivity, value: &str) -> DatasetResult<NaiveDateTime> {
    parse_datetime(value).ok_or_else(|| DatasetError::BadTimestamp {
        id: activity.id,
        value: value.to_string(),
    })
}

fn row(activity: &RawActivity) -> DatasetResult<Vec<Cell>> {
    let start = timestamp(activity, &activity.start_date)?;
    let local = timestamp(activity, &activity.start_date_local)?;
    let metric = |value: Option<f64>| Cell::Float(value.unwrap_or(0.0));

    Ok(vec![
        Cell::Int(activity.id),
        Cell::Time(start),
        Cell::Str(activity.name.clone()),
        Cell::Float(activity.distance * MILES_PER_METER),
        Cell::Float(activity.moving_time / 60.0),
        Cell::Float(activity.elapsed_time / 60.0),
        Cell::Float(activity.total_elevation_gain * FEET_PER_METER),
        Cell::Time(local),
        Cell::Float(pace(activity.average_speed)),
        Cell::Float(pace(activity.max_speed)),
        metric(activity.average_cadence),
        metric(activity.average_heartrate),
        metric(activity.max_heartrate),
        metric(activity.suffer_score),
        Cell::Int(local.year() as i64),
        Cell::Int(local.month() as i64),
        Cell::Int(local.day() as i64),
        Cell::Str(local.format("%A").to_string()),
        Cell::Str(local.format("%H:%M:%S").to_string()),
    ])
}

/// Build the analysis table from raw records
pub fn normalize(activities: &[RawActivity]) -> DatasetResult<DataFrame> {
    let mut columns: Vec<Column> = COLUMNS
        .iter()
        .map(|c| Column::new(c.name, Vec::new()))
        .collect();

    let runs = activities.iter().filter(|a| a.activity_type == "Run");
    let mut kept = 0;
    for activity in runs {
        for (column, cell) in columns.iter_mut().zip(row(activity)?) {
            column.values.push(cell);
        }
        kept += 1;
    }
    debug!(
        total = activities.len(),
        kept,
        "Normalized activity records"
    );
    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"[
        {"id": 15225395752, "name": "Afternoon Run", "type": "Run", "sport_type": "Run",
         "distance": 4839.1, "moving_time": 1347, "elapsed_time": 1400,
         "total_elevation_gain": 40.1, "start_date": "2025-07-24T20:57:09Z",
         "start_date_local": "2025-07-24T16:57:09Z", "average_speed": 3.593,
         "max_speed": 4.825, "average_cadence": 82.9, "average_heartrate": 150.1,
         "max_heartrate": 172.0, "suffer_score": 10.0, "kudos_count": 9},
        {"id": 2, "name": "Commute", "type": "Ride", "distance": 12000.0,
         "moving_time": 1800, "elapsed_time": 1900, "start_date": "2025-07-25T12:00:00Z",
         "start_date_local": "2025-07-25T08:00:00Z"},
        {"id": 3, "name": "Treadmill", "type": "Run", "distance": 1609.34,
         "moving_time": 600, "elapsed_time": 600, "start_date": "2025-07-26T10:00:00Z",
         "start_date_local": "2025-07-26T06:00:00Z", "average_speed": 0.0}
    ]"#;

    fn float(frame: &DataFrame, column: &str, row: usize) -> f64 {
        frame.column(column).unwrap().values[row].as_f64().unwrap()
    }

    #[test]
    fn test_units_are_converted() {
        let frame = normalize(&parse_activities(EXPORT).unwrap()).unwrap();
        assert_eq!(frame.len(), 2);
        assert!((float(&frame, "distance", 0) - 3.00686).abs() < 1e-4);
        assert!((float(&frame, "moving_time", 0) - 22.45).abs() < 1e-9);
        assert!((float(&frame, "average_speed", 0) - 7.4651).abs() < 1e-3);
        assert!((float(&frame, "total_elevation_gain", 0) - 131.56).abs() < 0.01);
    }

    #[test]
    fn test_calendar_fields_come_from_local_time() {
        let frame = normalize(&parse_activities(EXPORT).unwrap()).unwrap();
        let values = |name: &str| frame.column(name).unwrap().values[0].clone();
        assert_eq!(values("year"), Cell::Int(2025));
        assert_eq!(values("month"), Cell::Int(7));
        assert_eq!(values("day"), Cell::Int(24));
        assert_eq!(values("day_of_week"), Cell::Str("Thursday".to_string()));
        assert_eq!(values("time"), Cell::Str("16:57:09".to_string()));
    }

    #[test]
    fn test_missing_metrics_are_zero() {
        let frame = normalize(&parse_activities(EXPORT).unwrap()).unwrap();
        assert_eq!(float(&frame, "average_speed", 1), 0.0);
        assert_eq!(float(&frame, "average_heartrate", 1), 0.0);
        assert_eq!(frame.column("name").unwrap().values[1], Cell::Str("Treadmill".to_string()));
        assert!(super::super::validate(&frame).is_ok());
    }

    #[test]
    fn test_bad_timestamp_is_reported() {
        let json = r#"[{"id": 9, "name": "x", "type": "Run", "distance": 1.0,
            "moving_time": 1, "elapsed_time": 1, "start_date": "yesterday",
            "start_date_local": "yesterday"}]"#;
        match normalize(&parse_activities(json).unwrap()) {
            Err(DatasetError::BadTimestamp { id, .. }) => assert_eq!(id, 9),
            other => panic!("Expected bad timestamp, got {:?}", other),
        }
    }
}
