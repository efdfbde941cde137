use super::format::{frame_to_markdown, frame_to_string, py_float, series_to_string};
use super::*;

fn sample() -> DataFrame {
    DataFrame::new(vec![
        Column::new("name", vec![Cell::Str("Easy".into()), Cell::Str("Tempo".into())]),
        Column::new("distance", vec![Cell::Float(3.1), Cell::Float(5.0)]),
        Column::new("year", vec![Cell::Int(2023), Cell::Int(2024)]),
    ])
    .unwrap()
}

#[test]
fn test_py_float_matches_python_repr() {
    assert_eq!(py_float(24.1), "24.1");
    assert_eq!(py_float(3.1 + 5.0 + 10.0 + 2.0 + 4.0), "24.1");
    assert_eq!(py_float(5.0), "5.0");
    assert_eq!(py_float(0.1 + 0.2), "0.30000000000000004");
    assert_eq!(py_float(1e16), "1e+16");
    assert_eq!(py_float(1.5e-5), "1.5e-05");
    assert_eq!(py_float(f64::NAN), "nan");
}

#[test]
fn test_dtype_inference() {
    assert_eq!(Dtype::infer(&[Cell::Int(1), Cell::Int(2)]), Dtype::Int64);
    assert_eq!(Dtype::infer(&[Cell::Int(1), Cell::Null]), Dtype::Float64);
    assert_eq!(Dtype::infer(&[Cell::Int(1), Cell::Float(2.5)]), Dtype::Float64);
    assert_eq!(Dtype::infer(&[Cell::Str("a".into())]), Dtype::Object);
    assert_eq!(Dtype::infer(&[Cell::Bool(true)]), Dtype::Bool);
}

#[test]
fn test_series_repr() {
    let series = sample().series("distance").unwrap();
    assert_eq!(
        series_to_string(&series),
        "0    3.1\n1    5.0\nName: distance, dtype: float64"
    );
}

#[test]
fn test_series_repr_with_named_index() {
    let series = Series::with_index(
        Some("distance".into()),
        vec![Cell::Float(12.5), Cell::Float(7.25)],
        vec![Cell::Int(2023), Cell::Int(2024)],
        vec!["year".into()],
    );
    assert_eq!(
        series_to_string(&series),
        "year\n2023    12.50\n2024     7.25\nName: distance, dtype: float64"
    );
}

#[test]
fn test_frame_repr() {
    let expected = "    name  distance  year\n0   Easy       3.1  2023\n1  Tempo       5.0  2024";
    assert_eq!(frame_to_string(&sample()), expected);
}

#[test]
fn test_empty_frame_repr() {
    let frame = sample().take(&[]);
    assert_eq!(
        frame_to_string(&frame),
        "Empty DataFrame\nColumns: [name, distance, year]\nIndex: []"
    );
}

#[test]
fn test_markdown_has_header_and_rows() {
    let md = frame_to_markdown(&sample());
    let lines: Vec<&str> = md.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "|    | name | distance | year |");
    assert_eq!(lines[2], "| 0 | Easy | 3.1 | 2023 |");
}

#[test]
fn test_sort_order_places_missing_last() {
    let frame = DataFrame::new(vec![Column::new(
        "pace",
        vec![Cell::Float(9.5), Cell::Float(f64::NAN), Cell::Float(8.0)],
    )])
    .unwrap();
    assert_eq!(frame.sort_order(&[(0, true)]), vec![2, 0, 1]);
    assert_eq!(frame.sort_order(&[(0, false)]), vec![0, 2, 1]);
}

#[test]
fn test_group_rows_sorted_by_key() {
    let keys = vec![Cell::Int(2024), Cell::Int(2023), Cell::Int(2024), Cell::Null];
    let groups = group_rows(&[&keys], keys.len());
    assert_eq!(
        groups,
        vec![(Cell::Int(2023), vec![1]), (Cell::Int(2024), vec![0, 2])]
    );
}

#[test]
fn test_reset_index_splits_tuple_labels() {
    let frame = DataFrame::with_index(
        vec![Column::new("distance", vec![Cell::Float(1.0)])],
        vec![Cell::Tuple(vec![Cell::Int(2024), Cell::Int(5)])],
        vec!["year".into(), "month".into()],
    )
    .unwrap();
    let flat = frame.reset_index(false);
    assert_eq!(flat.column_names(), vec!["year", "month", "distance"]);
    assert_eq!(flat.columns[1].values, vec![Cell::Int(5)]);
}

#[test]
fn test_parse_datetime_variants() {
    let expected = parse_datetime("2024-05-01 07:30:00").unwrap();
    assert_eq!(parse_datetime("2024-05-01T07:30:00Z"), Some(expected));
    assert_eq!(parse_datetime("2024-05-01 07:30:00+00:00"), Some(expected));
    assert!(parse_datetime("not a date").is_none());
}

#[test]
fn test_set_column_length_checked() {
    let mut frame = sample();
    match frame.set_column("pace", vec![Cell::Float(1.0)]) {
        Err(TableError::LengthMismatch { expected, found, .. }) => {
            assert_eq!((expected, found), (2, 1));
        }
        other => panic!("Expected length mismatch, got {:?}", other),
    }
}
