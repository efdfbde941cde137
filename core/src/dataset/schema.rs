//! The column contract every analysis prompt describes

use super::{DatasetError, DatasetResult};
use crate::table::DataFrame;

/// One column of the analysis table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    /// Unit shown next to the name in the compact listing
    pub unit: Option<&'static str>,
    pub meaning: &'static str,
}

const fn spec(name: &'static str, unit: Option<&'static str>, meaning: &'static str) -> ColumnSpec {
    ColumnSpec { name, unit, meaning }
}

pub const COLUMNS: [ColumnSpec; 19] = [
    spec("id", None, "a unique identifier for the activity"),
    spec("start_date", None, "the UTC date and time the activity started"),
    spec("name", None, "the name of the activity"),
    spec("distance", Some("miles"), "the distance of the activity in miles"),
    spec("moving_time", Some("minutes"), "the time spent moving, in minutes"),
    spec("elapsed_time", Some("minutes"), "the total time elapsed, in minutes"),
    spec("total_elevation_gain", Some("feet"), "the total elevation gain in feet"),
    spec("start_date_local", None, "the date and time the activity started in the local timezone"),
    spec("average_speed", Some("minutes per mile"), "the average pace in minutes per mile (0 when unrecorded)"),
    spec("max_speed", Some("minutes per mile"), "the fastest pace in minutes per mile (0 when unrecorded)"),
    spec("average_cadence", None, "the average cadence in steps per minute"),
    spec("average_heartrate", None, "the average heart rate in beats per minute (0 when unrecorded)"),
    spec("max_heartrate", None, "the maximum heart rate in beats per minute (0 when unrecorded)"),
    spec("suffer_score", None, "the relative effort score of the activity"),
    spec("year", None, "the year of the activity"),
    spec("month", None, "the month of the activity (1-12)"),
    spec("day", None, "the day of the month of the activity"),
    spec("day_of_week", None, "the weekday name of the activity, e.g. Monday"),
    spec("time", None, "the local start time as hh:mm:ss text"),
];

pub fn column_names() -> Vec<&'static str> {
    COLUMNS.iter().map(|c| c.name).collect()
}

/// `id, start_date, name, distance (miles), ...`
pub fn schema_description() -> String {
    COLUMNS
        .iter()
        .map(|c| match c.unit {
            Some(unit) => format!("{} ({})", c.name, unit),
            None => c.name.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// One bullet per column with its meaning
pub fn schema_overview() -> String {
    let mut text = String::from("The dataset is a pandas DataFrame named df with the following columns:");
    for column in COLUMNS.iter() {
        text.push_str(&format!("\n- {}: {}", column.name, column.meaning));
    }
    text
}

/// Reject tables lacking any schema column; extra columns are allowed
pub fn validate(frame: &DataFrame) -> DatasetResult<()> {
    let missing: Vec<String> = COLUMNS
        .iter()
        .filter(|c| frame.column(c.name).is_none())
        .map(|c| c.name.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DatasetError::MissingColumns(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Cell, Column};

    #[test]
    fn test_description_lists_units() {
        let text = schema_description();
        assert!(text.starts_with("id, start_date, name, distance (miles), moving_time (minutes)"));
        assert!(text.contains("average_speed (minutes per mile)"));
        assert!(text.ends_with("day_of_week, time"));
    }

    #[test]
    fn test_overview_has_every_column() {
        let overview = schema_overview();
        assert_eq!(overview.lines().count(), 20);
        assert!(overview.contains("- distance: the distance of the activity in miles"));
    }

    #[test]
    fn test_validate_reports_missing_columns() {
        let frame = DataFrame::new(vec![
            Column::new("id", vec![Cell::Int(1)]),
            Column::new("distance", vec![Cell::Float(3.0)]),
        ])
        .unwrap();
        match validate(&frame) {
            Err(DatasetError::MissingColumns(missing)) => {
                assert_eq!(missing.len(), 17);
                assert_eq!(missing[0], "start_date");
            }
            other => panic!("Expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_accepts_full_schema() {
        let columns = column_names()
            .into_iter()
            .map(|name| Column::new(name, vec![Cell::Null]))
            .chain(std::iter::once(Column::new("extra", vec![Cell::Int(0)])))
            .collect();
        assert!(validate(&DataFrame::new(columns).unwrap()).is_ok());
    }
}
