//! Activity dataset
//!
//! Producers of the table the workflow analyses: raw activity normalization,
//! CSV persistence, schema validation, summary statistics and the per-user
//! registry.

pub mod csv_io;
pub mod normalize;
pub mod registry;
pub mod schema;
pub mod summary;

pub use csv_io::{read_csv, read_csv_from, write_csv, write_csv_to};
pub use normalize::{normalize, parse_activities, RawActivity};
pub use registry::DatasetRegistry;
pub use schema::{column_names, schema_description, schema_overview, validate, ColumnSpec, COLUMNS};
pub use summary::{summarize, Summary};

use crate::table::TableError;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("dataset is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("failed to read activities: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid timestamp '{value}' for activity {id}")]
    BadTimestamp { id: i64, value: String },

    #[error(transparent)]
    Table(#[from] TableError),
}

pub type DatasetResult<T> = Result<T, DatasetError>;
