//! Shared fixtures for executor tests

use crate::sandbox::executor::{Sandbox, SandboxOptions};
use crate::sandbox::interpreter::Limits;
use crate::table::{Cell, Column, DataFrame};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

pub const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Five runs with distances summing to 24.1 miles
pub fn sample_dataset() -> Arc<DataFrame> {
    let dates: Vec<Cell> = [3, 5, 8, 10, 12]
        .iter()
        .map(|d| {
            Cell::Time(
                NaiveDate::from_ymd_opt(2024, 6, *d)
                    .unwrap()
                    .and_hms_opt(6, 45, 0)
                    .unwrap(),
            )
        })
        .collect();
    let frame = DataFrame::new(vec![
        Column::new("id", (101..106).map(Cell::Int).collect()),
        Column::new(
            "name",
            ["Morning Run", "Lunch Run", "Long Run", "Shakeout", "Tempo"]
                .iter()
                .map(|s| Cell::Str(s.to_string()))
                .collect(),
        ),
        Column::new(
            "distance",
            [3.1, 5.0, 10.0, 2.0, 4.0].into_iter().map(Cell::Float).collect(),
        ),
        Column::new(
            "moving_time",
            [27.5, 41.0, 92.0, 19.5, 30.0].into_iter().map(Cell::Float).collect(),
        ),
        Column::new("start_date_local", dates),
    ])
    .unwrap();
    Arc::new(frame)
}

pub fn sandbox() -> Sandbox {
    Sandbox::new(SandboxOptions::default())
}

pub fn sandbox_with(timeout: Duration, limits: Limits) -> Sandbox {
    Sandbox::new(SandboxOptions {
        timeout,
        max_concurrent: 2,
        limits,
    })
}
