//! Column reductions shared by Series, DataFrame, GroupBy and numpy

use crate::sandbox::types::{raise, EvalResult, ExcKind};
use crate::table::format::label_text;
use crate::table::{Cell, Column, DataFrame, Dtype, Series};
use chrono::NaiveDateTime;
use std::cmp::Ordering;

/// Reductions callable by name (`s.mean()`, `g.agg('max')`, `np.std(a)`)
pub const NAMES: [&str; 15] = [
    "sum", "mean", "median", "min", "max", "std", "var", "count", "nunique", "prod", "first",
    "last", "size", "sem", "mode",
];

pub fn is_reduction(name: &str) -> bool {
    NAMES.contains(&name)
}

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub skipna: bool,
    pub ddof: i64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            skipna: true,
            ddof: 1,
        }
    }
}

/* ===================== Reduce ===================== */

pub fn reduce(name: &str, values: &[Cell], opts: Options) -> EvalResult<Cell> {
    let present: Vec<&Cell> = values.iter().filter(|c| !c.is_missing()).collect();
    match name {
        "count" => return Ok(Cell::Int(present.len() as i64)),
        "size" => return Ok(Cell::Int(values.len() as i64)),
        "nunique" => return Ok(Cell::Int(distinct(&present).len() as i64)),
        "first" => return Ok(present.first().map(|c| (*c).clone()).unwrap_or(Cell::Null)),
        "last" => return Ok(present.last().map(|c| (*c).clone()).unwrap_or(Cell::Null)),
        "mode" => return Ok(modes(&present).into_iter().next().unwrap_or(Cell::Null)),
        _ => {}
    }
    if !opts.skipna && present.len() != values.len() {
        return Ok(Cell::Float(f64::NAN));
    }

    match name {
        "min" | "max" => extreme(name, &present),
        "sum" => sum(&present),
        "prod" => {
            let xs = numbers(name, &present)?;
            let all_int = present.iter().all(|c| matches!(c, Cell::Int(_) | Cell::Bool(_)));
            let product: f64 = xs.iter().product();
            Ok(if all_int && product.abs() < i64::MAX as f64 {
                Cell::Int(product as i64)
            } else {
                Cell::Float(product)
            })
        }
        "mean" => {
            if !present.is_empty() && present.iter().all(|c| matches!(c, Cell::Delta(_))) {
                let total: i128 = present.iter().filter_map(delta_of).map(i128::from).sum();
                return Ok(Cell::Delta(
                    (total as f64 / present.len() as f64).round() as i64,
                ));
            }
            if !present.is_empty() && present.iter().all(|c| matches!(c, Cell::Time(_))) {
                let stamps: Vec<f64> = present.iter().filter_map(|c| epoch_of(c)).collect();
                let mean = stamps.iter().sum::<f64>() / stamps.len() as f64;
                return Ok(from_epoch(mean));
            }
            let xs = numbers(name, &present)?;
            Ok(Cell::Float(mean(&xs)))
        }
        "median" => {
            if !present.is_empty() && present.iter().all(|c| matches!(c, Cell::Delta(_))) {
                let xs: Vec<f64> = present.iter().filter_map(|c| delta_of(c)).map(|s| s as f64).collect();
                return Ok(Cell::Delta(quantile(&xs, 0.5).round() as i64));
            }
            let xs = numbers(name, &present)?;
            Ok(Cell::Float(quantile(&xs, 0.5)))
        }
        "std" | "var" | "sem" => {
            let xs = numbers(name, &present)?;
            let var = variance(&xs, opts.ddof);
            Ok(Cell::Float(match name {
                "var" => var,
                "std" => var.sqrt(),
                _ => var.sqrt() / (xs.len() as f64).sqrt(),
            }))
        }
        other => raise(
            ExcKind::AttributeError,
            format!("'{}' is not a valid function for reduction", other),
        ),
    }
}

fn delta_of(cell: &&Cell) -> Option<i64> {
    match cell {
        Cell::Delta(s) => Some(*s),
        _ => None,
    }
}

fn epoch_of(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Time(t) => Some(t.and_utc().timestamp() as f64),
        Cell::Date(d) => Some(crate::table::midnight(*d).and_utc().timestamp() as f64),
        _ => None,
    }
}

fn from_epoch(seconds: f64) -> Cell {
    chrono::DateTime::from_timestamp(seconds.round() as i64, 0)
        .map(|dt| Cell::Time(dt.naive_utc()))
        .unwrap_or(Cell::Null)
}

/// Numeric view of present values; strings and timestamps refuse
fn numbers(name: &str, present: &[&Cell]) -> EvalResult<Vec<f64>> {
    let mut out = Vec::with_capacity(present.len());
    for cell in present {
        match cell.as_f64() {
            Some(x) => out.push(x),
            None => {
                return raise(
                    ExcKind::TypeError,
                    format!(
                        "Could not convert {} to numeric for '{}'",
                        label_text(cell),
                        name
                    ),
                )
            }
        }
    }
    Ok(out)
}

fn extreme(name: &str, present: &[&Cell]) -> EvalResult<Cell> {
    let Some(first) = present.first() else {
        return Ok(Cell::Float(f64::NAN));
    };
    let numeric = first.is_numeric();
    let mut best: &Cell = first;
    for cell in &present[1..] {
        if cell.is_numeric() != numeric {
            return raise(
                ExcKind::TypeError,
                "'<' not supported between instances of 'str' and 'float'",
            );
        }
        let ord = cell.sort_cmp(best);
        let better = if name == "min" {
            ord == Ordering::Less
        } else {
            ord == Ordering::Greater
        };
        if better {
            best = cell;
        }
    }
    let any_float = present.iter().any(|c| matches!(c, Cell::Float(_)));
    Ok(match best {
        Cell::Int(n) if any_float => Cell::Float(*n as f64),
        other => other.clone(),
    })
}

fn sum(present: &[&Cell]) -> EvalResult<Cell> {
    if present.is_empty() {
        return Ok(Cell::Int(0));
    }
    if present.iter().all(|c| matches!(c, Cell::Delta(_))) {
        let total = present
            .iter()
            .filter_map(delta_of)
            .try_fold(0i64, |acc, s| acc.checked_add(s));
        return match total {
            Some(total) => Ok(Cell::Delta(total)),
            None => raise(ExcKind::OverflowError, "timedelta value out of range"),
        };
    }
    if present.iter().all(|c| matches!(c, Cell::Str(_))) {
        return Ok(Cell::Str(
            present.iter().filter_map(|c| c.as_str()).collect::<String>(),
        ));
    }
    if present.iter().all(|c| matches!(c, Cell::Int(_) | Cell::Bool(_))) {
        let mut total: i64 = 0;
        for cell in present {
            let n = cell.as_f64().unwrap_or(0.0) as i64;
            match total.checked_add(n) {
                Some(t) => total = t,
                None => return Ok(Cell::Float(numbers("sum", present)?.iter().sum())),
            }
        }
        return Ok(Cell::Int(total));
    }
    Ok(Cell::Float(numbers("sum", present)?.iter().sum()))
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

pub fn variance(xs: &[f64], ddof: i64) -> f64 {
    let n = xs.len() as i64;
    if n - ddof <= 0 {
        return f64::NAN;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - ddof) as f64
}

/// Linear-interpolated quantile, as `numpy.percentile` / `Series.quantile`
pub fn quantile(xs: &[f64], q: f64) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Pearson correlation over pairs where both sides are present
pub fn correlation(xs: &[Cell], ys: &[Cell]) -> f64 {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter(|(x, y)| !x.is_missing() && !y.is_missing())
        .filter_map(|(x, y)| Some((x.as_f64()?, y.as_f64()?)))
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let cov: f64 = pairs.iter().map(|(x, y)| (x - mx) * (y - my)).sum();
    let sx: f64 = pairs.iter().map(|(x, _)| (x - mx).powi(2)).sum::<f64>().sqrt();
    let sy: f64 = pairs.iter().map(|(_, y)| (y - my).powi(2)).sum::<f64>().sqrt();
    cov / (sx * sy)
}

/// First occurrence of each distinct value, in order of appearance
pub fn distinct(values: &[&Cell]) -> Vec<Cell> {
    let mut seen: Vec<Cell> = Vec::new();
    for cell in values {
        if !seen.iter().any(|s| s.loose_eq(cell)) {
            seen.push((*cell).clone());
        }
    }
    seen
}

/// Most frequent values, sorted
pub fn modes(values: &[&Cell]) -> Vec<Cell> {
    let counts = value_counts(values);
    let Some(top) = counts.first().map(|(_, n)| *n) else {
        return Vec::new();
    };
    let mut out: Vec<Cell> = counts
        .into_iter()
        .filter(|(_, n)| *n == top)
        .map(|(c, _)| c)
        .collect();
    out.sort_by(|a, b| a.sort_cmp(b));
    out
}

/// Distinct values with their counts, most frequent first (ties keep first appearance)
pub fn value_counts(values: &[&Cell]) -> Vec<(Cell, usize)> {
    let mut counts: Vec<(Cell, usize)> = Vec::new();
    for cell in values {
        match counts.iter_mut().find(|(c, _)| c.loose_eq(cell)) {
            Some((_, n)) => *n += 1,
            None => counts.push(((*cell).clone(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/* ===================== Describe ===================== */

const NUMERIC_STATS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

fn describe_numbers(values: &[Cell]) -> Vec<Cell> {
    let xs: Vec<f64> = values
        .iter()
        .filter(|c| !c.is_missing())
        .filter_map(Cell::as_f64)
        .collect();
    let (min, max) = if xs.is_empty() {
        (f64::NAN, f64::NAN)
    } else {
        (
            xs.iter().cloned().fold(f64::INFINITY, f64::min),
            xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        )
    };
    vec![
        Cell::Float(xs.len() as f64),
        Cell::Float(mean(&xs)),
        Cell::Float(variance(&xs, 1).sqrt()),
        Cell::Float(min),
        Cell::Float(quantile(&xs, 0.25)),
        Cell::Float(quantile(&xs, 0.5)),
        Cell::Float(quantile(&xs, 0.75)),
        Cell::Float(max),
    ]
}

fn describe_times(values: &[Cell]) -> (Vec<&'static str>, Vec<Cell>) {
    let xs: Vec<f64> = values.iter().filter_map(epoch_of).collect();
    let at = |q: f64| from_epoch(quantile(&xs, q));
    let stats = vec![
        Cell::Int(xs.len() as i64),
        from_epoch(mean(&xs)),
        at(0.0),
        at(0.25),
        at(0.5),
        at(0.75),
        at(1.0),
    ];
    (vec!["count", "mean", "min", "25%", "50%", "75%", "max"], stats)
}

fn describe_objects(values: &[Cell]) -> (Vec<&'static str>, Vec<Cell>) {
    let present: Vec<&Cell> = values.iter().filter(|c| !c.is_missing()).collect();
    let counts = value_counts(&present);
    let (top, freq) = counts
        .first()
        .map(|(c, n)| (c.clone(), Cell::Int(*n as i64)))
        .unwrap_or((Cell::Null, Cell::Null));
    (
        vec!["count", "unique", "top", "freq"],
        vec![
            Cell::Int(present.len() as i64),
            Cell::Int(counts.len() as i64),
            top,
            freq,
        ],
    )
}

fn is_numeric_column(values: &[Cell]) -> bool {
    matches!(Dtype::infer(values), Dtype::Int64 | Dtype::Float64)
}

pub fn describe_series(series: &Series) -> Series {
    let (labels, stats): (Vec<&str>, Vec<Cell>) = if is_numeric_column(&series.values) {
        (NUMERIC_STATS.to_vec(), describe_numbers(&series.values))
    } else if Dtype::infer(&series.values) == Dtype::Datetime {
        describe_times(&series.values)
    } else {
        describe_objects(&series.values)
    };
    Series::with_index(
        series.name.clone(),
        stats,
        labels.into_iter().map(|l| Cell::Str(l.to_string())).collect(),
        Vec::new(),
    )
}

/// `df.describe()`: numeric columns, or every column when none are numeric
pub fn describe_frame(frame: &DataFrame) -> DataFrame {
    let numeric: Vec<&Column> = frame
        .columns
        .iter()
        .filter(|c| is_numeric_column(&c.values))
        .collect();
    let index = |labels: &[&str]| labels.iter().map(|l| Cell::Str(l.to_string())).collect();

    if !numeric.is_empty() {
        let columns = numeric
            .iter()
            .map(|c| Column::new(c.name.clone(), describe_numbers(&c.values)))
            .collect();
        return DataFrame {
            columns,
            index: index(&NUMERIC_STATS),
            index_names: Vec::new(),
        };
    }

    let columns = frame
        .columns
        .iter()
        .map(|c| Column::new(c.name.clone(), describe_objects(&c.values).1))
        .collect();
    DataFrame {
        columns,
        index: index(&["count", "unique", "top", "freq"]),
        index_names: Vec::new(),
    }
}

/// Timestamp to seconds since the epoch, for numeric plotting and fitting
pub fn time_to_number(t: &NaiveDateTime) -> f64 {
    t.and_utc().timestamp() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(xs: &[i64]) -> Vec<Cell> {
        xs.iter().map(|&n| Cell::Int(n)).collect()
    }

    #[test]
    fn test_sum_keeps_integers() {
        assert_eq!(reduce("sum", &ints(&[1, 2, 3]), Options::default()).unwrap(), Cell::Int(6));
        let mixed = vec![Cell::Int(1), Cell::Float(2.5), Cell::Null];
        assert_eq!(reduce("sum", &mixed, Options::default()).unwrap(), Cell::Float(3.5));
    }

    #[test]
    fn test_std_uses_sample_ddof() {
        let std = reduce("std", &ints(&[2, 4, 4, 4, 5, 5, 7, 9]), Options::default()).unwrap();
        match std {
            Cell::Float(x) => assert!((x - 2.138089935).abs() < 1e-6),
            other => panic!("Expected float, got {:?}", other),
        }
        let population = Options { ddof: 0, ..Options::default() };
        assert_eq!(
            reduce("std", &ints(&[2, 4, 4, 4, 5, 5, 7, 9]), population).unwrap(),
            Cell::Float(2.0)
        );
    }

    #[test]
    fn test_mean_of_strings_refuses() {
        let names = vec![Cell::Str("a".into()), Cell::Str("b".into())];
        assert!(reduce("mean", &names, Options::default()).is_err());
    }

    #[test]
    fn test_quantile_interpolates() {
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.5), 2.5);
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.25), 1.75);
    }

    #[test]
    fn test_value_counts_orders_by_frequency() {
        let cells = vec![
            Cell::Str("Run".into()),
            Cell::Str("Ride".into()),
            Cell::Str("Run".into()),
        ];
        let refs: Vec<&Cell> = cells.iter().collect();
        let counts = value_counts(&refs);
        assert_eq!(counts[0], (Cell::Str("Run".into()), 2));
        assert_eq!(counts[1], (Cell::Str("Ride".into()), 1));
    }
}
