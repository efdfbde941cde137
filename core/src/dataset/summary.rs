//! Aggregate statistics over the analysis table

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use crate::table::{Cell, DataFrame};

const WEEKDAYS: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRef {
    pub id: Option<i64>,
    pub name: String,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayStats {
    pub day: &'static str,
    pub runs: usize,
    pub miles: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_runs: usize,
    pub total_miles: f64,
    pub total_minutes: f64,
    pub total_elevation_feet: f64,
    pub average_distance: Option<f64>,
    /// Minutes per mile; runs without a recorded pace are skipped
    pub average_pace: Option<f64>,
    pub fastest_pace: Option<f64>,
    pub average_heartrate: Option<f64>,
    pub longest_run: Option<RunRef>,
    pub first_run: Option<NaiveDate>,
    pub last_run: Option<NaiveDate>,
    pub by_day_of_week: Vec<DayStats>,
}

fn numbers(frame: &DataFrame, name: &str) -> Vec<Option<f64>> {
    match frame.column(name) {
        Some(column) => column
            .values
            .iter()
            .map(|c| if c.is_missing() { None } else { c.as_f64() })
            .collect(),
        None => vec![None; frame.len()],
    }
}

fn total(values: &[Option<f64>]) -> f64 {
    values.iter().flatten().sum()
}

/// Mean of the positive values; zero marks an unrecorded metric
fn positive_mean(values: &[Option<f64>]) -> Option<f64> {
    let kept: Vec<f64> = values.iter().flatten().copied().filter(|v| *v > 0.0).collect();
    (!kept.is_empty()).then(|| kept.iter().sum::<f64>() / kept.len() as f64)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn summarize(frame: &DataFrame) -> Summary {
    let distance = numbers(frame, "distance");
    let moving = numbers(frame, "moving_time");
    let elevation = numbers(frame, "total_elevation_gain");
    let pace = numbers(frame, "average_speed");
    let heartrate = numbers(frame, "average_heartrate");

    let longest_run = distance
        .iter()
        .enumerate()
        .filter_map(|(row, d)| d.map(|d| (row, d)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(row, d)| RunRef {
            id: frame.column("id").and_then(|c| match c.values[row] {
                Cell::Int(id) => Some(id),
                _ => None,
            }),
            name: frame
                .column("name")
                .and_then(|c| c.values[row].as_str().map(str::to_string))
                .unwrap_or_default(),
            distance: round2(d),
        });

    let dates: Vec<NaiveDate> = frame
        .column("start_date_local")
        .map(|c| {
            c.values
                .iter()
                .filter_map(|v| match v {
                    Cell::Time(t) => Some(t.date()),
                    Cell::Date(d) => Some(*d),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let by_day_of_week = WEEKDAYS
        .iter()
        .map(|day| {
            let rows: Vec<usize> = frame
                .column("day_of_week")
                .map(|c| {
                    c.values
                        .iter()
                        .enumerate()
                        .filter(|(_, v)| v.as_str() == Some(*day))
                        .map(|(row, _)| row)
                        .collect()
                })
                .unwrap_or_default();
            DayStats {
                day,
                runs: rows.len(),
                miles: round2(rows.iter().filter_map(|row| distance[*row]).sum()),
            }
        })
        .collect();

    let recorded = distance.iter().flatten().count();
    Summary {
        total_runs: frame.len(),
        total_miles: round2(total(&distance)),
        total_minutes: round2(total(&moving)),
        total_elevation_feet: round2(total(&elevation)),
        average_distance: (recorded > 0).then(|| round2(total(&distance) / recorded as f64)),
        average_pace: positive_mean(&pace).map(round2),
        fastest_pace: pace
            .iter()
            .flatten()
            .copied()
            .filter(|p| *p > 0.0)
            .min_by(f64::total_cmp)
            .map(round2),
        average_heartrate: positive_mean(&heartrate).map(|h| (h * 10.0).round() / 10.0),
        longest_run,
        first_run: dates.iter().min().copied(),
        last_run: dates.iter().max().copied(),
        by_day_of_week,
    }
}

fn pace_text(minutes: f64) -> String {
    let total_secs = (minutes * 60.0).round() as i64;
    format!("{}:{:02}/mi", total_secs / 60, total_secs % 60)
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Runs:          {}", self.total_runs)?;
        writeln!(f, "Miles:         {:.2}", self.total_miles)?;
        writeln!(f, "Moving time:   {:.0} min", self.total_minutes)?;
        writeln!(f, "Elevation:     {:.0} ft", self.total_elevation_feet)?;
        if let Some(pace) = self.average_pace {
            writeln!(f, "Average pace:  {}", pace_text(pace))?;
        }
        if let Some(pace) = self.fastest_pace {
            writeln!(f, "Fastest pace:  {}", pace_text(pace))?;
        }
        if let Some(run) = &self.longest_run {
            writeln!(f, "Longest run:   {} ({:.2} mi)", run.name, run.distance)?;
        }
        if let (Some(first), Some(last)) = (self.first_run, self.last_run) {
            writeln!(f, "Date range:    {} to {}", first, last)?;
        }
        for day in self.by_day_of_week.iter().filter(|d| d.runs > 0) {
            writeln!(f, "  {:<10} {:>3} runs {:>8.2} mi", day.day, day.runs, day.miles)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn frame() -> DataFrame {
        let when = |d: u32| {
            Cell::Time(
                NaiveDate::from_ymd_opt(2024, 6, d)
                    .unwrap()
                    .and_hms_opt(7, 0, 0)
                    .unwrap(),
            )
        };
        let text = |values: &[&str]| -> Vec<Cell> { values.iter().map(|s| Cell::Str(s.to_string())).collect() };
        DataFrame::new(vec![
            Column::new("id", vec![Cell::Int(1), Cell::Int(2), Cell::Int(3)]),
            Column::new("name", text(&["Easy", "Long", "Tempo"])),
            Column::new("distance", vec![Cell::Float(3.0), Cell::Float(10.5), Cell::Float(4.0)]),
            Column::new("moving_time", vec![Cell::Float(30.0), Cell::Float(95.0), Cell::Float(30.0)]),
            Column::new("total_elevation_gain", vec![Cell::Float(50.0), Cell::Float(200.0), Cell::Null]),
            Column::new("average_speed", vec![Cell::Float(10.0), Cell::Float(9.0), Cell::Float(0.0)]),
            Column::new("average_heartrate", vec![Cell::Float(140.0), Cell::Float(150.0), Cell::Float(0.0)]),
            Column::new("start_date_local", vec![when(3), when(9), when(5)]),
            Column::new("day_of_week", text(&["Monday", "Sunday", "Wednesday"])),
        ])
        .unwrap()
    }

    #[test]
    fn test_totals_and_bests() {
        let summary = summarize(&frame());
        assert_eq!(summary.total_runs, 3);
        assert_eq!(summary.total_miles, 17.5);
        assert_eq!(summary.total_elevation_feet, 250.0);
        assert_eq!(summary.average_pace, Some(9.5));
        assert_eq!(summary.fastest_pace, Some(9.0));
        assert_eq!(summary.average_heartrate, Some(145.0));
        assert_eq!(
            summary.longest_run,
            Some(RunRef {
                id: Some(2),
                name: "Long".to_string(),
                distance: 10.5
            })
        );
        assert_eq!(summary.first_run, NaiveDate::from_ymd_opt(2024, 6, 3));
        assert_eq!(summary.last_run, NaiveDate::from_ymd_opt(2024, 6, 9));
        assert_eq!(summary.by_day_of_week[6].runs, 1);
        assert_eq!(summary.by_day_of_week[1].runs, 0);
    }

    #[test]
    fn test_empty_table() {
        let summary = summarize(&DataFrame::default());
        assert_eq!(summary.total_runs, 0);
        assert_eq!(summary.average_pace, None);
        assert_eq!(summary.longest_run, None);
    }

    #[test]
    fn test_display() {
        let text = summarize(&frame()).to_string();
        assert!(text.contains("Runs:          3"));
        assert!(text.contains("Average pace:  9:30/mi"));
        assert!(text.contains("Longest run:   Long (10.50 mi)"));
    }
}
