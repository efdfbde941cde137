//! pandas subset: the `pd` module functions plus helpers shared by
//! DataFrame, Series and GroupBy methods

use super::{datetime, names, Args, KW};
use crate::sandbox::interpreter::Interpreter;
use crate::sandbox::types::errors::py_str_repr;
use crate::sandbox::types::{raise, EvalResult, ExcKind, Module, Val};
use crate::table::format::label_text;
use crate::table::{midnight, parse_datetime, range_index, Cell, Column, DataFrame, Series};

pub mod accessors;
pub mod frame;
pub mod groupby;
pub mod indexing;
pub mod reductions;
pub mod series;

use reductions::Options;

const FUNCTIONS: [&str; 22] = [
    "DataFrame",
    "Series",
    "to_datetime",
    "to_timedelta",
    "to_numeric",
    "Timestamp",
    "Timedelta",
    "isna",
    "isnull",
    "notna",
    "notnull",
    "concat",
    "date_range",
    "cut",
    "merge",
    "set_option",
    "reset_option",
    "Index",
    "DatetimeIndex",
    "Grouper",
    "unique",
    "read_csv",
];

/* ===================== Module ===================== */

pub fn module_attr(attr: &str) -> EvalResult<Val> {
    match attr {
        "NaT" | "NA" => Ok(Val::None),
        "options" | "api" | "errors" | "offsets" | "tseries" => Ok(Val::Inert),
        name if FUNCTIONS.contains(&name) => Ok(Val::method(Val::Module(Module::Pandas), name)),
        other => raise(
            ExcKind::AttributeError,
            format!("module 'pandas' has no attribute '{}'", other),
        ),
    }
}

pub fn call_function(interp: &mut Interpreter, name: &str, args: Args) -> EvalResult<Val> {
    match name {
        "DataFrame" => build_frame(interp, &args).map(Val::frame),
        "Series" | "Index" | "DatetimeIndex" => build_series(&args).map(Val::series),
        "to_datetime" => to_datetime(&args),
        "to_timedelta" => to_timedelta(&args),
        "to_numeric" => to_numeric(&args),
        "Timestamp" => {
            let value = args.required(0, "ts_input", "Timestamp")?;
            datetime::coerce_time(value).map(Val::Time)
        }
        "Timedelta" => timedelta(&args),
        "isna" | "isnull" | "notna" | "notnull" => {
            let value = args.required(0, "obj", name)?;
            let negate = name.starts_with("not");
            missing_mask(value, negate)
        }
        "concat" => concat(interp, &args),
        "date_range" => date_range(interp, &args),
        "cut" => cut(&args),
        "merge" => {
            let left = args.required(0, "left", "merge")?.clone();
            let rest = Args {
                positional: args.positional.iter().skip(1).cloned().collect(),
                keywords: args.keywords.clone(),
            };
            match left {
                Val::Frame(frame) => frame::call(interp, &frame, "merge", rest),
                other => raise(
                    ExcKind::TypeError,
                    format!("Can only merge Series or DataFrame objects, a {} was passed", other.type_name()),
                ),
            }
        }
        "unique" => {
            let cells = cells_of(args.required(0, "values", "unique")?)?;
            let refs: Vec<&Cell> = cells.iter().collect();
            Ok(Val::list(reductions::distinct(&refs).iter().map(Val::from_cell).collect()))
        }
        "set_option" | "reset_option" | "Grouper" => Ok(Val::Inert),
        "read_csv" => raise(
            ExcKind::ImportError,
            "file access is not available; the dataset is already loaded as df",
        ),
        other => raise(
            ExcKind::AttributeError,
            format!("module 'pandas' has no attribute '{}'", other),
        ),
    }
}

/* ===================== Shared Helpers ===================== */

/// Cells of a list-like value, or a single cell for a scalar
pub fn cells_of(value: &Val) -> EvalResult<Vec<Cell>> {
    match value {
        Val::Series(series) => Ok(series.values.clone()),
        Val::List(items) => items.borrow().iter().map(Val::expect_cell).collect(),
        Val::Tuple(items) => items.iter().map(Val::expect_cell).collect(),
        other => Ok(vec![other.expect_cell()?]),
    }
}

pub fn is_list_like(value: &Val) -> bool {
    matches!(value, Val::Series(_) | Val::List(_) | Val::Tuple(_))
}

/// Values for a column over `index`: series align by label, lists by position,
/// scalars repeat
pub fn broadcast(value: &Val, index: &[Cell]) -> EvalResult<Vec<Cell>> {
    match value {
        Val::Series(series) => {
            let same = series.index.len() == index.len()
                && series.index.iter().zip(index).all(|(a, b)| a == b || a.loose_eq(b));
            if same {
                return Ok(series.values.clone());
            }
            Ok(index
                .iter()
                .map(|label| {
                    series
                        .position_of(label)
                        .map(|pos| series.values[pos].clone())
                        .unwrap_or(Cell::Null)
                })
                .collect())
        }
        Val::List(_) | Val::Tuple(_) => {
            let cells = cells_of(value)?;
            if cells.len() != index.len() {
                return raise(
                    ExcKind::ValueError,
                    format!(
                        "Length of values ({}) does not match length of index ({})",
                        cells.len(),
                        index.len()
                    ),
                );
            }
            Ok(cells)
        }
        Val::Frame(_) => raise(
            ExcKind::ValueError,
            "Cannot set a DataFrame with multiple columns to the single column",
        ),
        scalar => Ok(vec![scalar.expect_cell()?; index.len()]),
    }
}

/// Row positions selected by a boolean mask
pub fn mask_positions(mask: &Val, len: usize) -> EvalResult<Option<Vec<usize>>> {
    let cells = match mask {
        Val::Series(series) if series.values.iter().all(|c| matches!(c, Cell::Bool(_))) => {
            &series.values
        }
        Val::List(items) => {
            let items = items.borrow();
            if items.is_empty() || !items.iter().all(|v| matches!(v, Val::Bool(_))) {
                return Ok(None);
            }
            let flags: Vec<Cell> = items.iter().map(|v| Cell::Bool(v.truthy().unwrap_or(false))).collect();
            return positions(&flags, len).map(Some);
        }
        _ => return Ok(None),
    };
    positions(cells, len).map(Some)
}

fn positions(flags: &[Cell], len: usize) -> EvalResult<Vec<usize>> {
    if flags.len() != len {
        return raise(
            ExcKind::IndexError,
            format!(
                "Boolean index has wrong length: {} instead of {}",
                flags.len(),
                len
            ),
        );
    }
    Ok(flags
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, Cell::Bool(true)))
        .map(|(i, _)| i)
        .collect())
}

pub fn reduce_options(args: &Args) -> EvalResult<Options> {
    Ok(Options {
        skipna: args.bool_or(KW, "skipna", true)?,
        ddof: args.int_opt(KW, "ddof")?.unwrap_or(1),
    })
}

pub fn head_rows(len: usize, n: i64) -> Vec<usize> {
    let n = if n < 0 { (len as i64 + n).max(0) } else { n } as usize;
    (0..n.min(len)).collect()
}

pub fn tail_rows(len: usize, n: i64) -> Vec<usize> {
    let n = if n < 0 { (len as i64 + n).max(0) } else { n } as usize;
    (len.saturating_sub(n)..len).collect()
}

/// `missing` replaced by `fill`, either a scalar or an aligned series
pub fn fill_missing(values: &[Cell], fill: &[Cell]) -> Vec<Cell> {
    values
        .iter()
        .zip(fill)
        .map(|(v, f)| if v.is_missing() { f.clone() } else { v.clone() })
        .collect()
}

/// Forward (or backward) fill
pub fn propagate(values: &[Cell], forward: bool) -> Vec<Cell> {
    let mut out = values.to_vec();
    let order: Vec<usize> = if forward {
        (0..out.len()).collect()
    } else {
        (0..out.len()).rev().collect()
    };
    let mut last: Option<Cell> = None;
    for i in order {
        if out[i].is_missing() {
            if let Some(fill) = &last {
                out[i] = fill.clone();
            }
        } else {
            last = Some(out[i].clone());
        }
    }
    out
}

fn missing_mask(value: &Val, negate: bool) -> EvalResult<Val> {
    let flag = |c: &Cell| Cell::Bool(c.is_missing() != negate);
    match value {
        Val::Series(series) => Ok(Val::series(series.map_values(series.values.iter().map(flag).collect()))),
        Val::Frame(frame) => Ok(Val::frame(map_columns(frame, |c| Ok(flag(c)))?)),
        Val::List(_) | Val::Tuple(_) => Ok(Val::list(
            cells_of(value)?.iter().map(|c| Val::from_cell(&flag(c))).collect(),
        )),
        scalar => Ok(Val::Bool(
            scalar.to_cell().map(|c| c.is_missing()).unwrap_or(false) != negate,
        )),
    }
}

pub fn map_columns(
    frame: &DataFrame,
    f: impl Fn(&Cell) -> EvalResult<Cell>,
) -> EvalResult<DataFrame> {
    let mut columns = Vec::with_capacity(frame.width());
    for column in &frame.columns {
        let values = column.values.iter().map(&f).collect::<EvalResult<Vec<_>>>()?;
        columns.push(Column::new(column.name.clone(), values));
    }
    Ok(DataFrame {
        columns,
        index: frame.index.clone(),
        index_names: frame.index_names.clone(),
    })
}

/* ===================== Types & Conversion ===================== */

/// Target of `astype(...)`: a dtype string, a builtin type or a numpy type
pub fn dtype_name(value: &Val) -> EvalResult<String> {
    let name = match value {
        Val::Str(s) => s.clone(),
        Val::Builtin(b) => b.to_string(),
        Val::Method(m) => m.name.clone(),
        other => {
            return raise(
                ExcKind::TypeError,
                format!("data type '{}' not understood", other.repr()),
            )
        }
    };
    Ok(match name.as_str() {
        "int" | "int64" | "int32" | "Int64" | "integer" => "int",
        "float" | "float64" | "float32" | "Float64" | "floating" | "number" => "float",
        "str" | "string" | "object" | "O" => "str",
        "bool" | "boolean" => "bool",
        "category" => "category",
        n if n.starts_with("datetime64") => "datetime",
        n if n.starts_with("timedelta64") => "timedelta",
        other => {
            return raise(
                ExcKind::TypeError,
                format!("data type {} not understood", py_str_repr(other)),
            )
        }
    }
    .to_string())
}

pub fn cast(cell: &Cell, dtype: &str) -> EvalResult<Cell> {
    if cell.is_missing() {
        return match dtype {
            "int" => raise(
                ExcKind::ValueError,
                "Cannot convert non-finite values (NA or inf) to integer",
            ),
            "str" => Ok(Cell::Str("nan".to_string())),
            _ => Ok(cell.clone()),
        };
    }
    let fail = || {
        raise(
            ExcKind::ValueError,
            format!(
                "invalid literal for {}: {}",
                dtype,
                py_str_repr(&label_text(cell))
            ),
        )
    };
    match dtype {
        "int" => match cell {
            Cell::Str(s) => s.trim().parse::<i64>().map(Cell::Int).or_else(|_| fail()),
            Cell::Delta(s) => nanoseconds(*s),
            Cell::Time(t) => nanoseconds(t.and_utc().timestamp()),
            other => match other.as_f64() {
                Some(x) => Ok(Cell::Int(x.trunc() as i64)),
                None => fail(),
            },
        },
        "float" => match cell {
            Cell::Str(s) => s.trim().parse::<f64>().map(Cell::Float).or_else(|_| fail()),
            other => match other.as_f64() {
                Some(x) => Ok(Cell::Float(x)),
                None => fail(),
            },
        },
        "str" => Ok(Cell::Str(match cell {
            Cell::Float(x) => crate::table::format::py_float(*x),
            other => label_text(other),
        })),
        "bool" => Ok(Cell::Bool(match cell {
            Cell::Str(s) => !s.is_empty(),
            Cell::Bool(b) => *b,
            other => other.as_f64().map(|x| x != 0.0).unwrap_or(true),
        })),
        "datetime" => to_datetime_cell(cell, None, None, false),
        "timedelta" => match cell {
            Cell::Delta(_) => Ok(cell.clone()),
            Cell::Str(s) => datetime::parse_timedelta(s).map(Cell::Delta).map_or_else(fail, Ok),
            other => match other.as_f64() {
                Some(x) => Ok(Cell::Delta((x / 1e9).round() as i64)),
                None => fail(),
            },
        },
        _ => Ok(cell.clone()),
    }
}

/// Seconds as an int64 nanosecond count, the way pandas stores datetimes
fn nanoseconds(seconds: i64) -> EvalResult<Cell> {
    match seconds.checked_mul(1_000_000_000) {
        Some(ns) => Ok(Cell::Int(ns)),
        None => raise(ExcKind::OverflowError, "value too large for int64 nanoseconds"),
    }
}

/// One value through `pd.to_datetime`
pub fn to_datetime_cell(
    cell: &Cell,
    format: Option<&str>,
    unit: Option<&str>,
    coerce: bool,
) -> EvalResult<Cell> {
    let failed = |text: String| {
        if coerce {
            Ok(Cell::Null)
        } else {
            raise(
                ExcKind::ValueError,
                format!("Unknown datetime string format, unable to parse: {}", text),
            )
        }
    };
    match cell {
        Cell::Null => Ok(Cell::Null),
        Cell::Float(x) if x.is_nan() => Ok(Cell::Null),
        Cell::Time(_) => Ok(cell.clone()),
        Cell::Date(d) => Ok(Cell::Time(midnight(*d))),
        Cell::Str(s) => {
            let parsed = match format {
                Some(pattern) if pattern != "mixed" && pattern != "ISO8601" => {
                    datetime::strptime(s.trim(), pattern).ok()
                }
                _ => parse_datetime(s),
            };
            match parsed {
                Some(t) => Ok(Cell::Time(t)),
                None => failed(s.clone()),
            }
        }
        other => match other.as_f64() {
            Some(x) => {
                let scale = match unit {
                    Some(u) => datetime::unit_seconds(u).unwrap_or(1.0),
                    None => 1e-9,
                };
                let seconds = (x * scale).round() as i64;
                match chrono::DateTime::from_timestamp(seconds, 0) {
                    Some(dt) => Ok(Cell::Time(dt.naive_utc())),
                    None => failed(label_text(other)),
                }
            }
            None => failed(label_text(other)),
        },
    }
}

fn map_cells(value: &Val, f: impl Fn(&Cell) -> EvalResult<Cell>) -> EvalResult<Val> {
    match value {
        Val::Series(series) => {
            let values = series.values.iter().map(&f).collect::<EvalResult<Vec<_>>>()?;
            Ok(Val::series(series.map_values(values)))
        }
        Val::List(_) | Val::Tuple(_) => {
            let values = cells_of(value)?.iter().map(&f).collect::<EvalResult<Vec<_>>>()?;
            Ok(Val::series(Series::new(None, values)))
        }
        scalar => Ok(Val::from_cell(&f(&scalar.expect_cell()?)?)),
    }
}

fn coerce_flag(args: &Args) -> EvalResult<bool> {
    match args.str_opt(KW, "errors")?.as_deref() {
        None | Some("raise") => Ok(false),
        Some("coerce") | Some("ignore") => Ok(true),
        Some(other) => raise(
            ExcKind::ValueError,
            format!("errors must be one of 'ignore', 'raise', or 'coerce', got {}", py_str_repr(other)),
        ),
    }
}

fn to_datetime(args: &Args) -> EvalResult<Val> {
    let value = args.required(0, "arg", "to_datetime")?;
    let format = args.str_opt(KW, "format")?;
    let unit = args.str_opt(KW, "unit")?;
    let coerce = coerce_flag(args)?;
    map_cells(value, |cell| {
        to_datetime_cell(cell, format.as_deref(), unit.as_deref(), coerce)
    })
}

fn to_timedelta(args: &Args) -> EvalResult<Val> {
    let value = args.required(0, "arg", "to_timedelta")?;
    let unit = args.str_opt(1, "unit")?.unwrap_or_else(|| "ns".to_string());
    let Some(scale) = datetime::unit_seconds(&unit) else {
        return raise(ExcKind::ValueError, format!("invalid unit abbreviation: {}", unit));
    };
    let coerce = coerce_flag(args)?;
    map_cells(value, |cell| match cell {
        c if c.is_missing() => Ok(Cell::Null),
        Cell::Delta(_) => Ok(cell.clone()),
        Cell::Str(s) => match datetime::parse_timedelta(s) {
            Some(seconds) => Ok(Cell::Delta(seconds)),
            None if coerce => Ok(Cell::Null),
            None => raise(
                ExcKind::ValueError,
                format!("unit abbreviation w/o a number: {}", py_str_repr(s)),
            ),
        },
        other => match other.as_f64() {
            Some(x) => Ok(Cell::Delta((x * scale).round() as i64)),
            None => raise(ExcKind::ValueError, "invalid timedelta value"),
        },
    })
}

fn to_numeric(args: &Args) -> EvalResult<Val> {
    let value = args.required(0, "arg", "to_numeric")?;
    let coerce = coerce_flag(args)?;
    map_cells(value, |cell| match cell {
        Cell::Str(s) => {
            let text = s.trim().replace(',', "");
            if let Ok(n) = text.parse::<i64>() {
                Ok(Cell::Int(n))
            } else if let Ok(x) = text.parse::<f64>() {
                Ok(Cell::Float(x))
            } else if coerce {
                Ok(Cell::Float(f64::NAN))
            } else {
                raise(
                    ExcKind::ValueError,
                    format!("Unable to parse string {}", py_str_repr(s)),
                )
            }
        }
        Cell::Null => Ok(Cell::Float(f64::NAN)),
        other if other.is_numeric() => Ok(other.clone()),
        other if coerce => Ok(Cell::Float(other.as_f64().unwrap_or(f64::NAN))),
        other => raise(
            ExcKind::TypeError,
            format!("Invalid object type: {}", label_text(other)),
        ),
    })
}

fn timedelta(args: &Args) -> EvalResult<Val> {
    if let Some(value) = args.given(0, "value") {
        return match value {
            Val::Delta(s) => Ok(Val::Delta(*s)),
            Val::Str(s) => match datetime::parse_timedelta(s) {
                Some(seconds) => Ok(Val::Delta(seconds)),
                None => raise(
                    ExcKind::ValueError,
                    format!("Could not parse timedelta {}", py_str_repr(s)),
                ),
            },
            number => {
                let unit = args.str_opt(1, "unit")?.unwrap_or_else(|| "ns".to_string());
                let scale = datetime::unit_seconds(&unit).unwrap_or(1e-9);
                match number.as_f64() {
                    Some(x) => Ok(Val::Delta((x * scale).round() as i64)),
                    None => raise(ExcKind::ValueError, "Invalid Timedelta value"),
                }
            }
        };
    }
    let mut seconds = 0f64;
    for (unit, scale) in [
        ("weeks", 604_800.0),
        ("days", 86_400.0),
        ("hours", 3_600.0),
        ("minutes", 60.0),
        ("seconds", 1.0),
        ("milliseconds", 0.001),
    ] {
        if let Some(x) = args.float_opt(KW, unit)? {
            seconds += x * scale;
        }
    }
    Ok(Val::Delta(seconds.round() as i64))
}

/* ===================== Constructors ===================== */

fn build_series(args: &Args) -> EvalResult<Series> {
    let name = args.given(KW, "name").map(Val::to_str);
    let index = match args.given(1, "index") {
        Some(index) => Some(cells_of(index)?),
        None => None,
    };
    let mut series = match args.given(0, "data") {
        None => Series::new(name.clone(), Vec::new()),
        Some(Val::Series(s)) => {
            let mut copy = s.as_ref().clone();
            if name.is_some() {
                copy.name = name.clone();
            }
            copy
        }
        Some(Val::Dict(entries)) => {
            let entries = entries.borrow();
            let labels = entries.iter().map(|(k, _)| k.expect_cell()).collect::<EvalResult<Vec<_>>>()?;
            let values = entries.iter().map(|(_, v)| v.expect_cell()).collect::<EvalResult<Vec<_>>>()?;
            Series::with_index(name.clone(), values, labels, Vec::new())
        }
        Some(value) if is_list_like(value) => Series::new(name.clone(), cells_of(value)?),
        Some(scalar) => {
            let len = index.as_ref().map(Vec::len).unwrap_or(1);
            Series::new(name.clone(), vec![scalar.expect_cell()?; len])
        }
    };
    if let Some(index) = index {
        if index.len() != series.len() {
            return raise(
                ExcKind::ValueError,
                format!(
                    "Length of values ({}) does not match length of index ({})",
                    series.len(),
                    index.len()
                ),
            );
        }
        series.index = index;
    }
    Ok(series)
}

fn build_frame(interp: &mut Interpreter, args: &Args) -> EvalResult<DataFrame> {
    let columns_arg = match args.given(KW, "columns") {
        Some(value) => Some(names(value)?),
        None => None,
    };
    let index_arg = match args.given(KW, "index") {
        Some(value) => Some(cells_of(value)?),
        None => None,
    };

    let mut frame = match args.given(0, "data") {
        None => {
            let columns = columns_arg
                .clone()
                .unwrap_or_default()
                .into_iter()
                .map(|name| Column::new(name, Vec::new()))
                .collect();
            DataFrame {
                columns,
                index: Vec::new(),
                index_names: Vec::new(),
            }
        }
        Some(Val::Frame(frame)) => frame.as_ref().clone(),
        Some(Val::Dict(entries)) => frame_from_dict(&entries.borrow(), index_arg.as_deref())?,
        Some(Val::Series(series)) => {
            let name = series.name.clone().unwrap_or_else(|| "0".to_string());
            DataFrame {
                columns: vec![Column::new(name, series.values.clone())],
                index: series.index.clone(),
                index_names: series.index_names.clone(),
            }
        }
        Some(value) => {
            let rows = interp.iterate(value)?;
            frame_from_rows(&rows, columns_arg.as_deref())?
        }
    };

    if let Some(index) = index_arg {
        if !frame.columns.is_empty() && index.len() != frame.len() {
            return raise(
                ExcKind::ValueError,
                format!(
                    "Length of values ({}) does not match length of index ({})",
                    frame.len(),
                    index.len()
                ),
            );
        }
        frame.index = index;
    }
    if let (Some(wanted), Some(Val::Dict(_))) = (columns_arg, args.given(0, "data")) {
        frame = table_result(frame.select(&wanted))?;
    }
    Ok(frame)
}

fn frame_from_dict(entries: &[(Val, Val)], index: Option<&[Cell]>) -> EvalResult<DataFrame> {
    let len = entries
        .iter()
        .find_map(|(_, v)| match v {
            Val::Series(s) => Some(s.len()),
            Val::List(items) => Some(items.borrow().len()),
            Val::Tuple(items) => Some(items.len()),
            _ => None,
        })
        .or(index.map(<[Cell]>::len))
        .unwrap_or(1);
    let row_index = match entries.iter().find_map(|(_, v)| match v {
        Val::Series(s) if index.is_none() => Some(s.index.clone()),
        _ => None,
    }) {
        Some(labels) => labels,
        None => index.map(<[Cell]>::to_vec).unwrap_or_else(|| range_index(len)),
    };

    let mut columns = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let values = broadcast(value, &row_index)?;
        columns.push(Column::new(key.to_str(), values));
    }
    Ok(DataFrame {
        columns,
        index: row_index,
        index_names: Vec::new(),
    })
}

/// Frame from a list of dicts (records) or a list of row sequences
pub fn frame_from_rows(rows: &[Val], column_names: Option<&[String]>) -> EvalResult<DataFrame> {
    let mut names: Vec<String> = column_names.map(<[String]>::to_vec).unwrap_or_default();
    let records = rows.iter().all(|r| matches!(r, Val::Dict(_)));

    if records && column_names.is_none() {
        for row in rows {
            if let Val::Dict(entries) = row {
                for (key, _) in entries.borrow().iter() {
                    let key = key.to_str();
                    if !names.contains(&key) {
                        names.push(key);
                    }
                }
            }
        }
    }

    let mut columns: Vec<Vec<Cell>> = vec![Vec::with_capacity(rows.len()); names.len()];
    for row in rows {
        match row {
            Val::Dict(entries) => {
                let entries = entries.borrow();
                for (i, name) in names.iter().enumerate() {
                    let cell = entries
                        .iter()
                        .find(|(k, _)| k.to_str() == *name)
                        .map(|(_, v)| v.expect_cell())
                        .transpose()?
                        .unwrap_or(Cell::Null);
                    columns[i].push(cell);
                }
            }
            other => {
                let cells = match super::sequence(other) {
                    Some(items) => items.iter().map(Val::expect_cell).collect::<EvalResult<Vec<_>>>()?,
                    None => vec![other.expect_cell()?],
                };
                if names.is_empty() {
                    names = (0..cells.len()).map(|i| i.to_string()).collect();
                    columns = vec![Vec::with_capacity(rows.len()); names.len()];
                }
                if cells.len() != names.len() {
                    return raise(
                        ExcKind::ValueError,
                        format!(
                            "{} columns passed, passed data had {} columns",
                            names.len(),
                            cells.len()
                        ),
                    );
                }
                for (column, cell) in columns.iter_mut().zip(cells) {
                    column.push(cell);
                }
            }
        }
    }

    let columns = names
        .into_iter()
        .zip(columns)
        .map(|(name, values)| Column::new(name, values))
        .collect();
    table_result(DataFrame::with_index(columns, range_index(rows.len()), Vec::new()))
}

/// Table errors surface as KeyError (missing column) or ValueError
pub fn table_result<T>(result: Result<T, crate::table::TableError>) -> EvalResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(crate::table::TableError::MissingColumn(name)) => {
            Err(crate::sandbox::types::Exception::key_error(&name).into())
        }
        Err(err) => raise(ExcKind::ValueError, err.to_string()),
    }
}

/* ===================== Combining ===================== */

fn concat(interp: &mut Interpreter, args: &Args) -> EvalResult<Val> {
    let items = interp.iterate(args.required(0, "objs", "concat")?)?;
    let axis = match args.given(KW, "axis") {
        Some(Val::Str(s)) if s == "columns" => 1,
        Some(value) => value.as_i64().unwrap_or(0),
        None => 0,
    };
    let ignore_index = args.bool_or(KW, "ignore_index", false)?;
    if items.is_empty() {
        return raise(ExcKind::ValueError, "No objects to concatenate");
    }

    if axis == 1 {
        let mut out = DataFrame::default();
        for item in &items {
            let part = match item {
                Val::Frame(f) => f.as_ref().clone(),
                Val::Series(s) => DataFrame {
                    columns: vec![Column::new(
                        s.name.clone().unwrap_or_else(|| out.width().to_string()),
                        s.values.clone(),
                    )],
                    index: s.index.clone(),
                    index_names: s.index_names.clone(),
                },
                other => {
                    return raise(
                        ExcKind::TypeError,
                        format!("cannot concatenate object of type '{}'", other.type_name()),
                    )
                }
            };
            if out.columns.is_empty() {
                out = part;
                continue;
            }
            let part_series: Vec<(String, Series)> = part
                .columns
                .iter()
                .map(|c| {
                    (
                        c.name.clone(),
                        Series::with_index(None, c.values.clone(), part.index.clone(), Vec::new()),
                    )
                })
                .collect();
            for (name, series) in part_series {
                let values = broadcast(&Val::series(series), &out.index)?;
                out.columns.push(Column::new(name, values));
            }
        }
        return Ok(Val::frame(out));
    }

    if items.iter().all(|v| matches!(v, Val::Series(_))) {
        let mut values = Vec::new();
        let mut index = Vec::new();
        let mut name = None;
        for item in &items {
            if let Val::Series(s) = item {
                values.extend(s.values.iter().cloned());
                index.extend(s.index.iter().cloned());
                name = name.or_else(|| s.name.clone());
            }
        }
        let index = if ignore_index { range_index(values.len()) } else { index };
        return Ok(Val::series(Series::with_index(name, values, index, Vec::new())));
    }

    let mut names: Vec<String> = Vec::new();
    for item in &items {
        match item {
            Val::Frame(f) => {
                for name in f.column_names() {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
            other => {
                return raise(
                    ExcKind::TypeError,
                    format!("cannot concatenate object of type '{}'", other.type_name()),
                )
            }
        }
    }
    let mut columns: Vec<Column> = names.iter().map(|n| Column::new(n.clone(), Vec::new())).collect();
    let mut index = Vec::new();
    let mut index_names = Vec::new();
    for item in &items {
        if let Val::Frame(f) = item {
            for column in columns.iter_mut() {
                match f.column(&column.name) {
                    Some(source) => column.values.extend(source.values.iter().cloned()),
                    None => column.values.extend(std::iter::repeat(Cell::Null).take(f.len())),
                }
            }
            index.extend(f.index.iter().cloned());
            if index_names.is_empty() {
                index_names = f.index_names.clone();
            }
        }
    }
    interp.check_len(index.len())?;
    let index = if ignore_index {
        index_names.clear();
        range_index(index.len())
    } else {
        index
    };
    Ok(Val::frame(DataFrame {
        columns,
        index,
        index_names,
    }))
}

fn date_range(interp: &mut Interpreter, args: &Args) -> EvalResult<Val> {
    let start = match args.given(0, "start") {
        Some(value) => Some(datetime::coerce_time(value)?),
        None => None,
    };
    let end = match args.given(1, "end") {
        Some(value) => Some(datetime::coerce_time(value)?),
        None => None,
    };
    let periods = args.int_opt(2, "periods")?;
    let freq = args.str_opt(3, "freq")?.unwrap_or_else(|| "D".to_string());

    let mut stamps = Vec::new();
    match (start, end, periods) {
        (Some(start), end, periods) => {
            let mut current = groupby::bin_label(&start, &freq)?;
            if current < start {
                current = groupby::next_bin(&current, &freq)?;
            }
            loop {
                if end.map(|e| current > e).unwrap_or(false)
                    || periods.map(|p| stamps.len() as i64 >= p).unwrap_or(false)
                    || (end.is_none() && periods.is_none())
                {
                    break;
                }
                stamps.push(Cell::Time(current));
                interp.check_len(stamps.len())?;
                current = groupby::next_bin(&current, &freq)?;
            }
        }
        (None, Some(end), Some(periods)) => {
            let mut current = groupby::bin_label(&end, &freq)?;
            for _ in 0..periods.max(0) {
                stamps.push(Cell::Time(current));
                interp.check_len(stamps.len())?;
                current = groupby::previous_bin(&current, &freq)?;
            }
            stamps.reverse();
        }
        _ => {
            return raise(
                ExcKind::ValueError,
                "Of the four parameters: start, end, periods, and freq, exactly three must be specified",
            )
        }
    }
    Ok(Val::series(Series::new(None, stamps)))
}

/// `pd.cut(x, bins, labels=None, right=True)`
fn cut(args: &Args) -> EvalResult<Val> {
    let source = args.required(0, "x", "cut")?;
    let cells = cells_of(source)?;
    let edges: Vec<f64> = match args.required(1, "bins", "cut")? {
        Val::Int(n) => {
            let xs: Vec<f64> = cells.iter().filter(|c| !c.is_missing()).filter_map(Cell::as_f64).collect();
            let lo = xs.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let n = (*n).max(1) as usize;
            let span = if hi > lo { hi - lo } else { 1.0 };
            let mut edges: Vec<f64> = (0..=n).map(|i| lo + span * i as f64 / n as f64).collect();
            edges[0] -= span * 0.001;
            edges
        }
        other => cells_of(other)?.iter().filter_map(Cell::as_f64).collect(),
    };
    if edges.len() < 2 {
        return raise(ExcKind::ValueError, "bins must have at least two edges");
    }
    let right = args.bool_or(KW, "right", true)?;
    let labels: Vec<Cell> = match args.given(KW, "labels") {
        Some(Val::Bool(false)) => (0..edges.len() - 1).map(|i| Cell::Int(i as i64)).collect(),
        Some(value) => cells_of(value)?,
        None => edges
            .windows(2)
            .map(|w| {
                let (a, b) = (py_edge(w[0]), py_edge(w[1]));
                Cell::Str(if right {
                    format!("({}, {}]", a, b)
                } else {
                    format!("[{}, {})", a, b)
                })
            })
            .collect(),
    };
    if labels.len() != edges.len() - 1 {
        return raise(
            ExcKind::ValueError,
            "Bin labels must be one fewer than the number of bin edges",
        );
    }
    let binned: Vec<Cell> = cells
        .iter()
        .map(|cell| {
            let Some(x) = cell.as_f64().filter(|x| !x.is_nan()) else {
                return Cell::Null;
            };
            edges
                .windows(2)
                .position(|w| if right { x > w[0] && x <= w[1] } else { x >= w[0] && x < w[1] })
                .map(|i| labels[i].clone())
                .unwrap_or(Cell::Null)
        })
        .collect();
    Ok(match source {
        Val::Series(s) => Val::series(s.map_values(binned)),
        _ => Val::series(Series::new(None, binned)),
    })
}

fn py_edge(x: f64) -> String {
    let rounded = (x * 1000.0).round() / 1000.0;
    crate::table::format::py_float(rounded)
}

/// Shift a timestamp by whole calendar months
pub fn add_months(t: &chrono::NaiveDateTime, months: i32) -> Option<chrono::NaiveDateTime> {
    use chrono::Datelike;
    let date = t.date();
    let total = date.year() * 12 + date.month0() as i32 + months;
    let (year, month0) = (total.div_euclid(12), total.rem_euclid(12));
    let mut day = date.day();
    loop {
        if let Some(d) = chrono::NaiveDate::from_ymd_opt(year, month0 as u32 + 1, day) {
            return Some(d.and_time(t.time()));
        }
        if day <= 28 {
            return None;
        }
        day -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_and_parse() {
        assert_eq!(cast(&Cell::Str("42".into()), "int").unwrap(), Cell::Int(42));
        assert_eq!(cast(&Cell::Float(3.9), "int").unwrap(), Cell::Int(3));
        assert!(cast(&Cell::Str("x".into()), "float").is_err());
        assert_eq!(cast(&Cell::Int(5), "str").unwrap(), Cell::Str("5".into()));
    }

    #[test]
    fn test_broadcast_aligns_series_by_label() {
        let series = Series::with_index(
            None,
            vec![Cell::Int(10), Cell::Int(20)],
            vec![Cell::Int(1), Cell::Int(0)],
            Vec::new(),
        );
        let values = broadcast(&Val::series(series), &range_index(3)).unwrap();
        assert_eq!(values[0], Cell::Int(20));
        assert_eq!(values[1], Cell::Int(10));
        assert_eq!(values[2], Cell::Null);
    }

    #[test]
    fn test_to_datetime_coerce() {
        let bad = Cell::Str("not a date".into());
        assert_eq!(to_datetime_cell(&bad, None, None, true).unwrap(), Cell::Null);
        assert!(to_datetime_cell(&bad, None, None, false).is_err());
    }

    #[test]
    fn test_add_months_clamps_day() {
        let t = parse_datetime("2024-01-31").unwrap();
        let shifted = add_months(&t, 1).unwrap();
        assert_eq!(shifted.format("%Y-%m-%d").to_string(), "2024-02-29");
    }
}
