//! CSV persistence of the analysis table
//!
//! Column types are inferred on read: integers, then floats, then timestamps,
//! falling back to text. Empty fields are missing values.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

use super::DatasetResult;
use crate::table::format::label_text;
use crate::table::{parse_datetime, Cell, Column, DataFrame};

pub fn read_csv(path: impl AsRef<Path>) -> DatasetResult<DataFrame> {
    let path = path.as_ref();
    let frame = read_csv_from(File::open(path)?)?;
    debug!(path = %path.display(), rows = frame.len(), columns = frame.width(), "Loaded CSV");
    Ok(frame)
}

pub fn read_csv_from<R: Read>(reader: R) -> DatasetResult<DataFrame> {
    let mut reader = csv::ReaderBuilder::new().flexible(false).from_reader(reader);
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (column, field) in raw.iter_mut().zip(record.iter()) {
            column.push(field.to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(raw)
        .map(|(name, fields)| Column::new(name, infer_column(&fields)))
        .collect();
    Ok(DataFrame::new(columns)?)
}

pub fn write_csv(frame: &DataFrame, path: impl AsRef<Path>) -> DatasetResult<()> {
    write_csv_to(frame, File::create(path)?)
}

pub fn write_csv_to<W: Write>(frame: &DataFrame, writer: W) -> DatasetResult<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(frame.columns.iter().map(|c| c.name.as_str()))?;
    for row in 0..frame.len() {
        writer.write_record(frame.columns.iter().map(|c| field_text(&c.values[row])))?;
    }
    writer.flush()?;
    Ok(())
}

fn field_text(cell: &Cell) -> String {
    if cell.is_missing() {
        String::new()
    } else {
        label_text(cell)
    }
}

fn infer_column(fields: &[String]) -> Vec<Cell> {
    let present = || fields.iter().map(|f| f.trim()).filter(|f| !f.is_empty());

    if present().all(|f| f.parse::<i64>().is_ok()) {
        return fields.iter().map(|f| parse_or_null(f, |t| t.parse().ok().map(Cell::Int))).collect();
    }
    if present().all(|f| f.parse::<f64>().is_ok()) {
        return fields.iter().map(|f| parse_or_null(f, |t| t.parse().ok().map(Cell::Float))).collect();
    }
    // short values like "2024" or "16:57:09" stay text
    if present().next().is_some() && present().all(|f| f.len() >= 10 && parse_datetime(f).is_some()) {
        return fields.iter().map(|f| parse_or_null(f, |t| parse_datetime(t).map(Cell::Time))).collect();
    }
    fields
        .iter()
        .map(|f| if f.is_empty() { Cell::Null } else { Cell::Str(f.clone()) })
        .collect()
}

fn parse_or_null(field: &str, parse: impl Fn(&str) -> Option<Cell>) -> Cell {
    let field = field.trim();
    if field.is_empty() {
        return Cell::Null;
    }
    parse(field).unwrap_or(Cell::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const SAMPLE: &str = "\
id,name,distance,start_date_local,time,average_heartrate
101,Morning Run,3.1,2024-06-03 06:45:00,06:45:00,150.5
102,Lunch Run,5.0,2024-06-05T12:10:00Z,12:10:00,
";

    #[test]
    fn test_types_are_inferred() {
        let frame = read_csv_from(SAMPLE.as_bytes()).unwrap();
        assert_eq!(frame.len(), 2);
        let col = |name: &str| frame.column(name).unwrap().values.clone();
        assert_eq!(col("id"), vec![Cell::Int(101), Cell::Int(102)]);
        assert_eq!(col("distance"), vec![Cell::Float(3.1), Cell::Float(5.0)]);
        assert_eq!(
            col("start_date_local")[0],
            Cell::Time(
                NaiveDate::from_ymd_opt(2024, 6, 3)
                    .unwrap()
                    .and_hms_opt(6, 45, 0)
                    .unwrap()
            )
        );
        assert_eq!(col("time")[1], Cell::Str("12:10:00".to_string()));
        assert_eq!(col("average_heartrate")[1], Cell::Null);
    }

    #[test]
    fn test_file_round_trip_keeps_values() {
        let frame = read_csv_from(SAMPLE.as_bytes()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.csv");
        write_csv(&frame, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("id,name,distance,start_date_local,time,average_heartrate\n"));
        assert!(written.contains("102,Lunch Run,5.0,2024-06-05 12:10:00,12:10:00,\n"));
        assert_eq!(read_csv(&path).unwrap(), frame);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_csv(dir.path().join("absent.csv")),
            Err(super::super::DatasetError::Io(_))
        ));
    }
}
