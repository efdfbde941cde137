//! DataFrame attributes, methods and subscripts

use super::reductions::{self, Options};
use super::series::{self as series_ops, replace_cell, replacement_pairs, sort_positions};
use super::{
    broadcast, cast, cells_of, dtype_name, fill_missing, groupby, head_rows, is_list_like,
    mask_positions, propagate, reduce_options, tail_rows, table_result,
};
use crate::sandbox::interpreter::operators::abs_cell;
use crate::sandbox::interpreter::Interpreter;
use crate::sandbox::parser;
use crate::sandbox::stdlib::{names, no_attribute, plotting, Args, KW};
use crate::sandbox::types::{raise, Accessor, AccessorKind, EvalResult, ExcKind, Exception, Val};
use crate::table::format::{frame_to_markdown, frame_to_string, label_text};
use crate::table::{group_rows, Cell, Column, DataFrame, Dtype, Series};
use std::collections::HashMap;
use std::rc::Rc;

const METHODS: [&str; 89] = [
    "head", "tail", "describe", "info", "sum", "mean", "median", "min", "max", "std", "var",
    "count", "nunique", "prod", "sem", "first", "last", "mode", "quantile", "sort_values",
    "sort_index", "reset_index", "set_index", "groupby", "resample", "rename", "drop", "dropna",
    "fillna", "ffill", "bfill", "astype", "apply", "applymap", "map", "assign", "copy", "merge",
    "join", "query", "iterrows", "itertuples", "items", "to_dict", "to_string", "to_markdown",
    "to_csv", "to_numpy", "nlargest", "nsmallest", "idxmax", "idxmin", "corr", "cumsum",
    "cummax", "cummin", "cumprod", "diff", "shift", "pct_change", "rank", "rolling", "round",
    "abs", "clip", "isna", "isnull", "notna", "notnull", "any", "all", "drop_duplicates",
    "duplicated", "value_counts", "pivot_table", "pivot", "melt", "agg", "aggregate",
    "replace", "select_dtypes", "insert", "keys", "get", "equals", "transpose", "plot", "hist",
    "boxplot",
];

/* ===================== Attributes ===================== */

pub fn attr(frame: &Rc<DataFrame>, receiver: &Val, attr: &str) -> EvalResult<Val> {
    match attr {
        "columns" => Ok(Val::list(frame.columns.iter().map(|c| Val::Str(c.name.clone())).collect())),
        "index" => Ok(Val::series(series_ops::index_series(&frame.index, &frame.index_names))),
        "shape" => Ok(Val::tuple(vec![
            Val::Int(frame.len() as i64),
            Val::Int(frame.width() as i64),
        ])),
        "size" => Ok(Val::Int((frame.len() * frame.width()) as i64)),
        "ndim" => Ok(Val::Int(2)),
        "empty" => Ok(Val::Bool(frame.is_empty())),
        "dtypes" => {
            let values = frame
                .columns
                .iter()
                .map(|c| Cell::Str(Dtype::infer(&c.values).name().to_string()))
                .collect();
            let index = frame.columns.iter().map(|c| Cell::Str(c.name.clone())).collect();
            Ok(Val::series(Series::with_index(None, values, index, Vec::new())))
        }
        "values" => Ok(rows_as_lists(frame)),
        "T" => Ok(Val::frame(transpose(frame))),
        "loc" | "iloc" => {
            let kind = if attr == "loc" {
                AccessorKind::Loc
            } else {
                AccessorKind::Iloc
            };
            Ok(Val::Accessor(Rc::new(Accessor {
                kind,
                target: receiver.clone(),
            })))
        }
        name if METHODS.contains(&name) => Ok(Val::method(receiver.clone(), name)),
        column => match frame.column(column) {
            Some(_) => Ok(Val::series(table_result(frame.series(column))?)),
            None => no_attribute(receiver, column),
        },
    }
}

pub fn set_attr(frame: &mut DataFrame, attr: &str, value: Val) -> EvalResult<()> {
    match attr {
        "columns" => {
            let new_names = names(&value)?;
            if new_names.len() != frame.width() {
                return raise(
                    ExcKind::ValueError,
                    format!(
                        "Length mismatch: Expected axis has {} elements, new values have {} elements",
                        frame.width(),
                        new_names.len()
                    ),
                );
            }
            for (column, name) in frame.columns.iter_mut().zip(new_names) {
                column.name = name;
            }
            Ok(())
        }
        "index" => {
            let labels = cells_of(&value)?;
            if labels.len() != frame.len() {
                return raise(
                    ExcKind::ValueError,
                    format!(
                        "Length mismatch: Expected axis has {} elements, new values have {} elements",
                        frame.len(),
                        labels.len()
                    ),
                );
            }
            frame.index = labels;
            frame.index_names = match &value {
                Val::Series(source) => source.name.clone().into_iter().collect(),
                _ => Vec::new(),
            };
            Ok(())
        }
        column => {
            let values = broadcast(&value, &frame.index)?;
            table_result(frame.set_column(column, values))
        }
    }
}

fn rows_as_lists(frame: &DataFrame) -> Val {
    Val::list(
        (0..frame.len())
            .map(|row| {
                Val::list(
                    frame
                        .columns
                        .iter()
                        .map(|c| Val::from_cell(&c.values[row]))
                        .collect(),
                )
            })
            .collect(),
    )
}

fn transpose(frame: &DataFrame) -> DataFrame {
    let columns = (0..frame.len())
        .map(|row| {
            Column::new(
                label_text(&frame.index[row]),
                frame.columns.iter().map(|c| c.values[row].clone()).collect(),
            )
        })
        .collect();
    DataFrame {
        columns,
        index: frame.columns.iter().map(|c| Cell::Str(c.name.clone())).collect(),
        index_names: Vec::new(),
    }
}

fn column_labels(frame: &DataFrame) -> Vec<Cell> {
    frame.columns.iter().map(|c| Cell::Str(c.name.clone())).collect()
}

fn is_numeric_column(column: &Column) -> bool {
    matches!(
        Dtype::infer(&column.values),
        Dtype::Int64 | Dtype::Float64 | Dtype::Bool
    )
}

/// Columns named by `subset=` (or every column)
fn subset_positions(frame: &DataFrame, subset: Option<&Val>) -> EvalResult<Vec<usize>> {
    match subset {
        None => Ok((0..frame.width()).collect()),
        Some(value) => names(value)?
            .iter()
            .map(|name| {
                frame
                    .column_position(name)
                    .ok_or_else(|| Exception::key_error(name).into())
            })
            .collect(),
    }
}

fn row_key(frame: &DataFrame, columns: &[usize], row: usize) -> Cell {
    match columns {
        [single] => frame.columns[*single].values[row].clone(),
        _ => Cell::Tuple(columns.iter().map(|&c| frame.columns[c].values[row].clone()).collect()),
    }
}

/* ===================== Methods ===================== */

pub fn call(interp: &mut Interpreter, frame: &Rc<DataFrame>, name: &str, args: Args) -> EvalResult<Val> {
    let receiver = Val::Frame(frame.clone());
    match name {
        "head" => Ok(Val::frame(frame.take(&head_rows(frame.len(), args.int_opt(0, "n")?.unwrap_or(5))))),
        "tail" => Ok(Val::frame(frame.take(&tail_rows(frame.len(), args.int_opt(0, "n")?.unwrap_or(5))))),
        "describe" => Ok(Val::frame(reductions::describe_frame(frame))),
        "info" => {
            interp.write_stdout(&info_text(frame));
            Ok(Val::None)
        }
        "mode" => {
            let mut columns = Vec::with_capacity(frame.width());
            for column in &frame.columns {
                let present: Vec<&Cell> = column.values.iter().filter(|c| !c.is_missing()).collect();
                columns.push(Column::new(column.name.clone(), reductions::modes(&present)));
            }
            let len = columns.iter().map(|c| c.values.len()).max().unwrap_or(0);
            for column in &mut columns {
                column.values.resize(len, Cell::Null);
            }
            Ok(Val::frame(table_result(DataFrame::new(columns))?))
        }
        func if reductions::is_reduction(func) => reduce_frame(frame, func, &args),
        "quantile" => {
            let q = args.float_opt(0, "q")?.unwrap_or(0.5);
            let (index, values): (Vec<Cell>, Vec<Cell>) = frame
                .columns
                .iter()
                .filter(|c| is_numeric_column(c))
                .map(|c| {
                    let xs: Vec<f64> = c.values.iter().filter_map(Cell::as_f64).filter(|x| !x.is_nan()).collect();
                    (Cell::Str(c.name.clone()), Cell::Float(reductions::quantile(&xs, q)))
                })
                .unzip();
            Ok(Val::series(Series::with_index(Some(q.to_string()), values, index, Vec::new())))
        }
        "sort_values" => sort_values(interp, frame, &args),
        "sort_index" => {
            let ascending = args.bool_or(KW, "ascending", true)?;
            Ok(Val::frame(frame.take(&sort_positions(&frame.index, ascending))))
        }
        "reset_index" => Ok(Val::frame(frame.reset_index(args.bool_or(KW, "drop", false)?))),
        "set_index" => set_index(frame, &args),
        "groupby" => Ok(Val::GroupBy(Rc::new(groupby::group_frame(frame, &args)?))),
        "resample" => Ok(Val::GroupBy(Rc::new(groupby::resample(frame, &args)?))),
        "rename" => rename(interp, frame, &args),
        "drop" => drop(frame, &args),
        "dropna" => {
            let columns = subset_positions(frame, args.get(KW, "subset"))?;
            let all = args.str_opt(KW, "how")?.as_deref() == Some("all");
            let keep: Vec<usize> = (0..frame.len())
                .filter(|&row| {
                    let mut missing = columns.iter().map(|&c| frame.columns[c].values[row].is_missing());
                    if all {
                        !missing.all(|m| m)
                    } else {
                        !missing.any(|m| m)
                    }
                })
                .collect();
            Ok(Val::frame(frame.take(&keep)))
        }
        "fillna" => {
            if let Some(method) = args.str_opt(KW, "method")? {
                let forward = method.starts_with('f') || method == "pad";
                return Ok(Val::frame(with_columns(frame, |c| Ok(propagate(&c.values, forward)))?));
            }
            let value = args.required(0, "value", "fillna")?;
            match value {
                Val::Dict(entries) => {
                    let mut out = frame.as_ref().clone();
                    for (key, fill) in entries.borrow().iter() {
                        let name = key.to_str();
                        if let Some(pos) = out.column_position(&name) {
                            let fill = broadcast(fill, &out.index)?;
                            out.columns[pos].values = fill_missing(&out.columns[pos].values, &fill);
                        }
                    }
                    Ok(Val::frame(out))
                }
                scalar => {
                    let fill = vec![scalar.expect_cell()?; frame.len()];
                    Ok(Val::frame(with_columns(frame, |c| Ok(fill_missing(&c.values, &fill)))?))
                }
            }
        }
        "ffill" | "bfill" => {
            let forward = name == "ffill";
            Ok(Val::frame(with_columns(frame, |c| Ok(propagate(&c.values, forward)))?))
        }
        "astype" => match args.required(0, "dtype", "astype")? {
            Val::Dict(entries) => {
                let mut out = frame.as_ref().clone();
                for (key, dtype) in entries.borrow().iter() {
                    let name = key.to_str();
                    let target = dtype_name(dtype)?;
                    let pos = out
                        .column_position(&name)
                        .ok_or_else(|| Exception::key_error(&name))?;
                    out.columns[pos].values = out.columns[pos]
                        .values
                        .iter()
                        .map(|c| cast(c, &target))
                        .collect::<EvalResult<Vec<_>>>()?;
                }
                Ok(Val::frame(out))
            }
            dtype => {
                let target = dtype_name(dtype)?;
                Ok(Val::frame(with_columns(frame, |c| {
                    c.values.iter().map(|cell| cast(cell, &target)).collect()
                })?))
            }
        },
        "apply" => apply(interp, frame, &args),
        "applymap" | "map" => {
            let func = args.required(0, "func", name)?;
            let mut out = frame.as_ref().clone();
            for column in &mut out.columns {
                column.values = series_ops::map_values(interp, &column.values, func)?;
            }
            Ok(Val::frame(out))
        }
        "assign" => {
            let mut out = frame.as_ref().clone();
            for (column, value) in &args.keywords {
                let value = match value {
                    Val::Function(_) | Val::Builtin(_) | Val::Method(_) => {
                        interp.call1(value, Val::frame(out.clone()))?
                    }
                    other => other.clone(),
                };
                let values = broadcast(&value, &out.index)?;
                table_result(out.set_column(column, values))?;
            }
            Ok(Val::frame(out))
        }
        "insert" => {
            let loc = args.usize_or(0, "loc", 0)?;
            let column = args.required(1, "column", "insert")?.to_str();
            if frame.column(&column).is_some() {
                return raise(ExcKind::ValueError, format!("cannot insert {}, already exists", column));
            }
            let values = broadcast(args.required(2, "value", "insert")?, &frame.index)?;
            let mut out = frame.as_ref().clone();
            out.columns.insert(loc.min(out.width()), Column::new(column, values));
            Ok(Val::frame(out))
        }
        "copy" => Ok(Val::frame(frame.as_ref().clone())),
        "merge" => merge(frame, &args),
        "join" => {
            let mut join_args = args.clone();
            join_args.keywords.push(("left_index".to_string(), Val::Bool(true)));
            join_args.keywords.push(("right_index".to_string(), Val::Bool(true)));
            if join_args.kw("how").is_none() {
                join_args.keywords.push(("how".to_string(), Val::str("left")));
            }
            merge(frame, &join_args)
        }
        "query" => {
            let expr = args.str_opt(0, "expr")?.unwrap_or_default();
            query(interp, frame, &expr)
        }
        "iterrows" => Ok(Val::list(
            (0..frame.len())
                .map(|row| Val::tuple(vec![Val::from_cell(&frame.index[row]), Val::series(frame.row(row))]))
                .collect(),
        )),
        "itertuples" => {
            let with_index = args.bool_or(KW, "index", true)?;
            Ok(Val::list((0..frame.len()).map(|row| Val::series(row_record(frame, row, with_index))).collect()))
        }
        "items" => Ok(Val::list(
            frame
                .columns
                .iter()
                .map(|c| {
                    Val::tuple(vec![
                        Val::Str(c.name.clone()),
                        Val::series(Series::with_index(Some(c.name.clone()), c.values.clone(), frame.index.clone(), frame.index_names.clone())),
                    ])
                })
                .collect(),
        )),
        "keys" => attr(frame, &receiver, "columns"),
        "get" => {
            let key = args.required(0, "key", "get")?;
            match key {
                Val::Str(column) if frame.column(column).is_none() => {
                    Ok(args.get(1, "default").cloned().unwrap_or(Val::None))
                }
                _ => get_item(interp, frame, key),
            }
        }
        "to_dict" => to_dict(frame, args.str_opt(0, "orient")?.as_deref().unwrap_or("dict")),
        "to_string" => Ok(Val::Str(frame_to_string(frame))),
        "to_markdown" => Ok(Val::Str(frame_to_markdown(frame))),
        "to_csv" => to_csv(frame, args.bool_or(KW, "index", true)?),
        "to_numpy" => Ok(rows_as_lists(frame)),
        "nlargest" | "nsmallest" => {
            let n = args.int_opt(0, "n")?.unwrap_or(5).max(0) as usize;
            let by = names(args.required(1, "columns", name)?)?;
            let keys = by
                .iter()
                .map(|c| {
                    frame
                        .column_position(c)
                        .map(|pos| (pos, name == "nsmallest"))
                        .ok_or_else(|| Exception::key_error(c).into())
                })
                .collect::<EvalResult<Vec<_>>>()?;
            let order: Vec<usize> = frame.sort_order(&keys).into_iter().take(n).collect();
            Ok(Val::frame(frame.take(&order)))
        }
        "idxmax" | "idxmin" => {
            let mut index = Vec::new();
            let mut values = Vec::new();
            for column in frame.columns.iter().filter(|c| is_numeric_column(c)) {
                index.push(Cell::Str(column.name.clone()));
                values.push(
                    series_ops::arg_extreme(&column.values, name == "idxmax")
                        .map(|pos| frame.index[pos].clone())
                        .unwrap_or(Cell::Null),
                );
            }
            Ok(Val::series(Series::with_index(None, values, index, Vec::new())))
        }
        "corr" => Ok(Val::frame(correlation_matrix(frame))),
        "cumsum" | "cummax" | "cummin" | "cumprod" | "diff" | "pct_change" | "rank" => {
            let periods = args.int_opt(0, "periods")?.unwrap_or(1);
            let mut columns = Vec::new();
            for column in &frame.columns {
                let dtype = Dtype::infer(&column.values);
                let usable = matches!(dtype, Dtype::Int64 | Dtype::Float64 | Dtype::Bool)
                    || (matches!(dtype, Dtype::Datetime | Dtype::Timedelta) && name == "diff")
                    || (dtype == Dtype::Timedelta && name == "cumsum");
                if !usable {
                    continue;
                }
                let values = match name {
                    "diff" => series_ops::differences(&column.values, periods)?,
                    "pct_change" => series_ops::pct_change(&column.values, periods),
                    "rank" => series_ops::rank(&column.values),
                    _ => series_ops::cumulative(name, &column.values)?,
                };
                columns.push(Column::new(column.name.clone(), values));
            }
            Ok(Val::frame(table_result(DataFrame::with_index(columns, frame.index.clone(), frame.index_names.clone()))?))
        }
        "shift" => {
            let periods = args.int_opt(0, "periods")?.unwrap_or(1);
            Ok(Val::frame(with_columns(frame, |c| Ok(series_ops::shifted(&c.values, periods)))?))
        }
        "rolling" => {
            let window = args.usize_or(0, "window", 1)?.max(1);
            let min_periods = args.usize_or(KW, "min_periods", window)?;
            Ok(Val::Accessor(Rc::new(Accessor {
                kind: AccessorKind::Rolling { window, min_periods },
                target: receiver,
            })))
        }
        "round" => match args.given(0, "decimals") {
            Some(Val::Dict(entries)) => {
                let mut out = frame.as_ref().clone();
                for (key, digits) in entries.borrow().iter() {
                    if let Some(pos) = out.column_position(&key.to_str()) {
                        let digits = digits.as_i64().unwrap_or(0);
                        out.columns[pos].values = out.columns[pos]
                            .values
                            .iter()
                            .map(|c| series_ops::round_cell(c, digits))
                            .collect();
                    }
                }
                Ok(Val::frame(out))
            }
            Some(digits) => Ok(Val::frame(round(frame, digits.as_i64().unwrap_or(0)))),
            None => Ok(Val::frame(round(frame, 0))),
        },
        "abs" => Ok(Val::frame(with_columns(frame, |c| {
            c.values.iter().map(abs_cell).collect::<EvalResult<Vec<_>>>()
        })?)),
        "clip" => {
            let lower = args.float_opt(0, "lower")?;
            let upper = args.float_opt(1, "upper")?;
            Ok(Val::frame(with_columns(frame, |c| {
                Ok(c.values.iter().map(|cell| series_ops::clip_cell(cell, lower, upper)).collect())
            })?))
        }
        "isna" | "isnull" | "notna" | "notnull" => {
            let negate = name.starts_with("not");
            Ok(Val::frame(with_columns(frame, |c| {
                Ok(c.values.iter().map(|cell| Cell::Bool(cell.is_missing() != negate)).collect())
            })?))
        }
        "any" | "all" => {
            let mut values = Vec::with_capacity(frame.width());
            for column in &frame.columns {
                let mut flags = column.values.iter().filter(|c| !c.is_missing()).map(|c| Val::from_cell(c).truthy());
                let result = if name == "any" {
                    flags.try_fold(false, |acc, f| f.map(|f| acc || f))?
                } else {
                    flags.try_fold(true, |acc, f| f.map(|f| acc && f))?
                };
                values.push(Cell::Bool(result));
            }
            Ok(Val::series(Series::with_index(None, values, column_labels(frame), Vec::new())))
        }
        "drop_duplicates" | "duplicated" => {
            let columns = subset_positions(frame, args.given(0, "subset"))?;
            let keep_last = args.str_opt(KW, "keep")?.as_deref() == Some("last");
            let flags = duplicate_flags(frame, &columns, keep_last);
            if name == "duplicated" {
                let values = flags.into_iter().map(Cell::Bool).collect();
                return Ok(Val::series(Series::with_index(None, values, frame.index.clone(), frame.index_names.clone())));
            }
            let keep: Vec<usize> = (0..frame.len()).filter(|&row| !flags[row]).collect();
            Ok(Val::frame(frame.take(&keep)))
        }
        "value_counts" => {
            let columns = subset_positions(frame, args.given(0, "subset"))?;
            let keys: Vec<Cell> = (0..frame.len())
                .map(|row| {
                    Cell::Tuple(columns.iter().map(|&c| frame.columns[c].values[row].clone()).collect())
                })
                .filter(|key| match key {
                    Cell::Tuple(parts) => !parts.iter().any(Cell::is_missing),
                    _ => true,
                })
                .collect();
            let refs: Vec<&Cell> = keys.iter().collect();
            let (labels, counts): (Vec<Cell>, Vec<Cell>) = reductions::value_counts(&refs)
                .into_iter()
                .map(|(label, n)| (label, Cell::Int(n as i64)))
                .unzip();
            let level_names = columns.iter().map(|&c| frame.columns[c].name.clone()).collect();
            Ok(Val::series(Series::with_index(Some("count".to_string()), counts, labels, level_names)))
        }
        "pivot_table" => pivot_table(frame, &args, "mean"),
        "pivot" => pivot_table(frame, &args, "first"),
        "melt" => melt(frame, &args),
        "agg" | "aggregate" => aggregate(interp, frame, &args),
        "replace" => {
            let pairs = replacement_pairs(&args)?;
            Ok(Val::frame(with_columns(frame, |c| {
                Ok(c.values.iter().map(|cell| replace_cell(cell, &pairs)).collect())
            })?))
        }
        "select_dtypes" => {
            let include = args.given(0, "include").map(names).transpose()?;
            let exclude = args.given(KW, "exclude").map(names).transpose()?;
            let wanted: Vec<String> = frame
                .columns
                .iter()
                .filter(|c| {
                    let dtype = Dtype::infer(&c.values);
                    let included = include.as_ref().map(|kinds| kinds.iter().any(|k| dtype_matches(dtype, k))).unwrap_or(true);
                    let excluded = exclude.as_ref().map(|kinds| kinds.iter().any(|k| dtype_matches(dtype, k))).unwrap_or(false);
                    included && !excluded
                })
                .map(|c| c.name.clone())
                .collect();
            Ok(Val::frame(table_result(frame.select(&wanted))?))
        }
        "equals" => Ok(Val::Bool(match args.required(0, "other", "equals")? {
            Val::Frame(other) => other.as_ref() == frame.as_ref(),
            _ => false,
        })),
        "transpose" => Ok(Val::frame(transpose(frame))),
        "plot" => {
            let kind = args.str_opt(KW, "kind")?.unwrap_or_else(|| "line".to_string());
            plotting::plot_frame(interp, frame, &kind, &args)
        }
        "hist" | "boxplot" => plotting::plot_frame(interp, frame, name, &args),
        plot if plot.starts_with("plot.") => plotting::plot_frame(interp, frame, &plot[5..], &args),
        other => no_attribute(&receiver, other),
    }
}

fn dtype_matches(dtype: Dtype, kind: &str) -> bool {
    match kind {
        "number" | "numeric" => matches!(dtype, Dtype::Int64 | Dtype::Float64),
        "int" | "int64" | "integer" => dtype == Dtype::Int64,
        "float" | "float64" => dtype == Dtype::Float64,
        "bool" => dtype == Dtype::Bool,
        "object" | "str" | "string" | "category" => dtype == Dtype::Object,
        "timedelta" | "timedelta64" | "timedelta64[ns]" => dtype == Dtype::Timedelta,
        k if k.starts_with("datetime") => dtype == Dtype::Datetime,
        _ => false,
    }
}

/// Frame with every column transformed by `f`
fn with_columns(
    frame: &DataFrame,
    f: impl Fn(&Column) -> EvalResult<Vec<Cell>>,
) -> EvalResult<DataFrame> {
    let mut out = frame.clone();
    for (column, source) in out.columns.iter_mut().zip(&frame.columns) {
        column.values = f(source)?;
    }
    Ok(out)
}

pub fn round(frame: &DataFrame, digits: i64) -> DataFrame {
    let mut out = frame.clone();
    for column in &mut out.columns {
        column.values = column
            .values
            .iter()
            .map(|c| series_ops::round_cell(c, digits))
            .collect();
    }
    out
}

fn info_text(frame: &DataFrame) -> String {
    let mut out = String::from("<class 'pandas.core.frame.DataFrame'>\n");
    out.push_str(&format!("RangeIndex: {} entries\n", frame.len()));
    out.push_str(&format!("Data columns (total {} columns):\n", frame.width()));
    let width = frame.columns.iter().map(|c| c.name.len()).max().unwrap_or(6).max(6);
    out.push_str(&format!(" #   {:<width$}  Non-Null Count  Dtype\n", "Column", width = width));
    for (i, column) in frame.columns.iter().enumerate() {
        let present = column.values.iter().filter(|c| !c.is_missing()).count();
        out.push_str(&format!(
            " {:<3} {:<width$}  {} non-null  {}\n",
            i,
            column.name,
            present,
            Dtype::infer(&column.values).name(),
            width = width
        ));
    }
    out
}

fn row_record(frame: &DataFrame, row: usize, with_index: bool) -> Series {
    let mut values = Vec::with_capacity(frame.width() + 1);
    let mut index = Vec::with_capacity(frame.width() + 1);
    if with_index {
        values.push(frame.index[row].clone());
        index.push(Cell::Str("Index".to_string()));
    }
    for column in &frame.columns {
        values.push(column.values[row].clone());
        index.push(Cell::Str(column.name.clone()));
    }
    Series::with_index(None, values, index, Vec::new())
}

/* ===================== Reductions ===================== */

fn reduce_frame(frame: &DataFrame, func: &str, args: &Args) -> EvalResult<Val> {
    let opts = reduce_options(args)?;
    let numeric_only = args.given(KW, "numeric_only").map(Val::truthy).transpose()?;
    let axis = args.given(KW, "axis").map(|a| a.as_i64().unwrap_or(if a.as_str() == Some("columns") { 1 } else { 0 })).unwrap_or(0);

    if axis == 1 {
        let numeric: Vec<&Column> = frame.columns.iter().filter(|c| is_numeric_column(c)).collect();
        let mut values = Vec::with_capacity(frame.len());
        for row in 0..frame.len() {
            let cells: Vec<Cell> = numeric.iter().map(|c| c.values[row].clone()).collect();
            values.push(reductions::reduce(func, &cells, opts)?);
        }
        return Ok(Val::series(Series::with_index(None, values, frame.index.clone(), frame.index_names.clone())));
    }

    if func == "size" {
        return Ok(Val::Int((frame.len() * frame.width()) as i64));
    }
    let mut index = Vec::with_capacity(frame.width());
    let mut values = Vec::with_capacity(frame.width());
    for column in &frame.columns {
        if numeric_only == Some(true) && !is_numeric_column(column) {
            continue;
        }
        match reductions::reduce(func, &column.values, opts) {
            Ok(cell) => {
                index.push(Cell::Str(column.name.clone()));
                values.push(cell);
            }
            // mixed frames: non-numeric columns drop out unless numeric_only=False was asked for
            Err(crate::sandbox::types::Unwind::Raise(exc))
                if exc.kind == ExcKind::TypeError && numeric_only.is_none() =>
            {
                continue
            }
            Err(err) => return Err(err),
        }
    }
    Ok(Val::series(Series::with_index(None, values, index, Vec::new())))
}

fn correlation_matrix(frame: &DataFrame) -> DataFrame {
    let numeric: Vec<&Column> = frame.columns.iter().filter(|c| is_numeric_column(c)).collect();
    let columns = numeric
        .iter()
        .map(|a| {
            Column::new(
                a.name.clone(),
                numeric
                    .iter()
                    .map(|b| Cell::Float(reductions::correlation(&b.values, &a.values)))
                    .collect(),
            )
        })
        .collect();
    DataFrame {
        columns,
        index: numeric.iter().map(|c| Cell::Str(c.name.clone())).collect(),
        index_names: Vec::new(),
    }
}

/// `agg('mean')`, `agg(['min', 'max'])` or `agg({'col': 'sum', 'other': ['min', 'max']})`
fn aggregate(interp: &mut Interpreter, frame: &Rc<DataFrame>, args: &Args) -> EvalResult<Val> {
    match args.required(0, "func", "agg")? {
        Val::Str(func) => reduce_frame(frame, func, &Args::default()),
        Val::List(items) => {
            let funcs: Vec<String> = items.borrow().iter().map(Val::to_str).collect();
            let mut columns = Vec::new();
            for column in frame.columns.iter().filter(|c| is_numeric_column(c)) {
                let values = funcs
                    .iter()
                    .map(|f| reductions::reduce(f, &column.values, Options::default()))
                    .collect::<EvalResult<Vec<_>>>()?;
                columns.push(Column::new(column.name.clone(), values));
            }
            let index = funcs.into_iter().map(Cell::Str).collect();
            Ok(Val::frame(table_result(DataFrame::with_index(columns, index, Vec::new()))?))
        }
        Val::Dict(entries) => {
            let entries = entries.borrow().clone();
            let mut plan: Vec<(String, Vec<String>)> = Vec::new();
            for (key, funcs) in &entries {
                let column = key.to_str();
                if frame.column(&column).is_none() {
                    return Err(Exception::key_error(&column).into());
                }
                plan.push((column, names(funcs)?));
            }
            let mut labels: Vec<String> = Vec::new();
            for (_, funcs) in &plan {
                for f in funcs {
                    if !labels.contains(f) {
                        labels.push(f.clone());
                    }
                }
            }
            // one function per column collapses to a Series
            if plan.iter().all(|(_, funcs)| funcs.len() == 1) && entries.iter().all(|(_, f)| matches!(f, Val::Str(_))) {
                let mut index = Vec::new();
                let mut values = Vec::new();
                for (column, funcs) in &plan {
                    let source = table_result(frame.series(column))?;
                    index.push(Cell::Str(column.clone()));
                    values.push(reductions::reduce(&funcs[0], &source.values, Options::default())?);
                }
                return Ok(Val::series(Series::with_index(None, values, index, Vec::new())));
            }
            let mut columns = Vec::new();
            for (column, funcs) in &plan {
                let source = table_result(frame.series(column))?;
                let mut values = vec![Cell::Null; labels.len()];
                for f in funcs {
                    if let Some(pos) = labels.iter().position(|l| l == f) {
                        values[pos] = reductions::reduce(f, &source.values, Options::default())?;
                    }
                }
                columns.push(Column::new(column.clone(), values));
            }
            let index = labels.into_iter().map(Cell::Str).collect();
            Ok(Val::frame(table_result(DataFrame::with_index(columns, index, Vec::new()))?))
        }
        func => interp.call1(func, Val::Frame(frame.clone())),
    }
}

/* ===================== Reshaping ===================== */

fn sort_values(interp: &mut Interpreter, frame: &Rc<DataFrame>, args: &Args) -> EvalResult<Val> {
    let by = names(args.required(0, "by", "sort_values")?)?;
    let ascending: Vec<bool> = match args.given(KW, "ascending") {
        Some(Val::List(items)) => items.borrow().iter().map(Val::truthy).collect::<EvalResult<_>>()?,
        Some(flag) => vec![flag.truthy()?; by.len()],
        None => vec![true; by.len()],
    };
    let mut keys = Vec::with_capacity(by.len());
    for (i, column) in by.iter().enumerate() {
        let pos = frame
            .column_position(column)
            .ok_or_else(|| Exception::key_error(column))?;
        keys.push((pos, ascending.get(i).copied().unwrap_or(true)));
    }
    let order = match args.given(KW, "key") {
        Some(key) => {
            let mut keyed = frame.as_ref().clone();
            for &(pos, _) in &keys {
                let source = Val::series(table_result(frame.series(&frame.columns[pos].name))?);
                let mapped = interp.call1(key, source)?;
                keyed.columns[pos].values = cells_of(&mapped)?;
            }
            keyed.sort_order(&keys)
        }
        None => frame.sort_order(&keys),
    };
    Ok(Val::frame(frame.take(&order)))
}

fn set_index(frame: &Rc<DataFrame>, args: &Args) -> EvalResult<Val> {
    let drop_columns = args.bool_or(KW, "drop", true)?;
    let keys = args.required(0, "keys", "set_index")?;
    if let Val::Series(series) = keys {
        let mut out = frame.as_ref().clone();
        out.index = broadcast(keys, &frame.index)?;
        out.index_names = series.name.clone().into_iter().collect();
        return Ok(Val::frame(out));
    }
    let columns = names(keys)?;
    let positions = columns
        .iter()
        .map(|c| frame.column_position(c).ok_or_else(|| Exception::key_error(c).into()))
        .collect::<EvalResult<Vec<_>>>()?;
    let mut out = frame.as_ref().clone();
    out.index = (0..frame.len()).map(|row| row_key(frame, &positions, row)).collect();
    out.index_names = columns.clone();
    if drop_columns {
        for column in &columns {
            out.drop_column(column);
        }
    }
    Ok(Val::frame(out))
}

fn rename(interp: &mut Interpreter, frame: &Rc<DataFrame>, args: &Args) -> EvalResult<Val> {
    let mut out = frame.as_ref().clone();
    if let Some(mapping) = args.given(KW, "columns").or_else(|| args.given(0, "mapper")) {
        for column in &mut out.columns {
            column.name = match mapping {
                Val::Dict(entries) => entries
                    .borrow()
                    .iter()
                    .find(|(k, _)| k.as_str() == Some(column.name.as_str()))
                    .map(|(_, v)| v.to_str())
                    .unwrap_or_else(|| column.name.clone()),
                func => interp.call1(func, Val::Str(column.name.clone()))?.to_str(),
            };
        }
    }
    if let Some(Val::Dict(entries)) = args.given(KW, "index") {
        let entries = entries.borrow();
        for label in &mut out.index {
            if let Some((_, v)) = entries
                .iter()
                .find(|(k, _)| k.to_cell().map(|k| k.loose_eq(label)).unwrap_or(false))
            {
                *label = v.expect_cell()?;
            }
        }
    }
    Ok(Val::frame(out))
}

fn drop(frame: &Rc<DataFrame>, args: &Args) -> EvalResult<Val> {
    let axis_columns = match args.given(KW, "axis") {
        Some(Val::Str(s)) => s == "columns",
        Some(other) => other.as_i64() == Some(1),
        None => false,
    };
    let errors_ignored = args.str_opt(KW, "errors")?.as_deref() == Some("ignore");
    let mut out = frame.as_ref().clone();

    let columns = match (args.given(KW, "columns"), args.given(0, "labels")) {
        (Some(columns), _) => Some(columns),
        (None, Some(labels)) if axis_columns => Some(labels),
        _ => None,
    };
    if let Some(columns) = columns {
        for column in names(columns)? {
            if !out.drop_column(&column) && !errors_ignored {
                return raise(ExcKind::KeyError, format!("\"['{}'] not found in axis\"", column));
            }
        }
    }

    let rows = match (args.given(KW, "index"), args.given(0, "labels")) {
        (Some(index), _) => Some(index),
        (None, Some(labels)) if !axis_columns => Some(labels),
        _ => None,
    };
    if let Some(rows) = rows {
        let labels = cells_of(rows)?;
        for label in &labels {
            if !errors_ignored && !out.index.iter().any(|l| l.loose_eq(label)) {
                return raise(
                    ExcKind::KeyError,
                    format!("\"[{}] not found in axis\"", label_text(label)),
                );
            }
        }
        let keep: Vec<usize> = (0..out.len())
            .filter(|&row| !labels.iter().any(|l| l.loose_eq(&out.index[row])))
            .collect();
        out = out.take(&keep);
    }
    Ok(Val::frame(out))
}

fn duplicate_flags(frame: &DataFrame, columns: &[usize], keep_last: bool) -> Vec<bool> {
    let keys: Vec<Cell> = (0..frame.len()).map(|row| row_key(frame, columns, row)).collect();
    let mut flags = vec![false; keys.len()];
    let order: Vec<usize> = if keep_last {
        (0..keys.len()).rev().collect()
    } else {
        (0..keys.len()).collect()
    };
    let mut seen: Vec<&Cell> = Vec::new();
    for row in order {
        let key = &keys[row];
        if seen.iter().any(|s| *s == key || s.loose_eq(key)) {
            flags[row] = true;
        } else {
            seen.push(key);
        }
    }
    flags
}

/// `df.apply(f)` per column, or `df.apply(f, axis=1)` per row
fn apply(interp: &mut Interpreter, frame: &Rc<DataFrame>, args: &Args) -> EvalResult<Val> {
    let func = args.required(0, "func", "apply")?;
    let by_row = match args.given(KW, "axis") {
        Some(Val::Str(s)) => s == "columns",
        Some(other) => other.as_i64() == Some(1),
        None => false,
    };
    let (labels, inputs): (Vec<Cell>, Vec<Series>) = if by_row {
        (
            frame.index.clone(),
            (0..frame.len()).map(|row| frame.row(row)).collect(),
        )
    } else {
        (
            column_labels(frame),
            frame
                .columns
                .iter()
                .map(|c| Series::with_index(Some(c.name.clone()), c.values.clone(), frame.index.clone(), frame.index_names.clone()))
                .collect(),
        )
    };
    let mut results = Vec::with_capacity(inputs.len());
    for input in inputs {
        interp.tick()?;
        results.push(interp.call1(func, Val::series(input))?);
    }

    if results.iter().all(|r| matches!(r, Val::Series(_))) && !results.is_empty() {
        let rows: Vec<Rc<Series>> = results
            .into_iter()
            .filter_map(|r| match r {
                Val::Series(s) => Some(s),
                _ => None,
            })
            .collect();
        let mut column_names: Vec<Cell> = Vec::new();
        for row in &rows {
            for label in &row.index {
                if !column_names.iter().any(|c| c == label) {
                    column_names.push(label.clone());
                }
            }
        }
        let columns = column_names
            .iter()
            .map(|name| {
                Column::new(
                    label_text(name),
                    rows.iter()
                        .map(|row| row.position_of(name).map(|p| row.values[p].clone()).unwrap_or(Cell::Null))
                        .collect(),
                )
            })
            .collect();
        let frame_out = table_result(DataFrame::with_index(columns, labels, Vec::new()))?;
        return Ok(Val::frame(if by_row { frame_out } else { transpose(&frame_out) }));
    }

    let values = results.iter().map(Val::expect_cell).collect::<EvalResult<Vec<_>>>()?;
    let index_names = if by_row { frame.index_names.clone() } else { Vec::new() };
    Ok(Val::series(Series::with_index(None, values, labels, index_names)))
}

/// `df.query("distance > 5 and type == 'Run'")`
fn query(interp: &mut Interpreter, frame: &Rc<DataFrame>, expr: &str) -> EvalResult<Val> {
    let rewritten = format!(
        "({})",
        expr.replace('@', "")
            .replace(" and ", ") & (")
            .replace(" or ", ") | (")
    );
    let parsed = match parser::parse_expression(&rewritten) {
        Ok(parsed) => parsed,
        Err(err) => return raise(ExcKind::SyntaxError, err.to_string()),
    };
    let mut vars = HashMap::new();
    for column in &frame.columns {
        vars.insert(
            column.name.clone(),
            Val::series(Series::with_index(Some(column.name.clone()), column.values.clone(), frame.index.clone(), frame.index_names.clone())),
        );
    }
    interp.push_scope(vars, true);
    let result = interp.eval(&parsed);
    interp.pop_scope();
    match mask_positions(&result?, frame.len())? {
        Some(rows) => Ok(Val::frame(frame.take(&rows))),
        None => raise(ExcKind::ValueError, "query expression must produce a boolean mask"),
    }
}

fn merge(left: &Rc<DataFrame>, args: &Args) -> EvalResult<Val> {
    let right = match args.required(0, "right", "merge")? {
        Val::Frame(frame) => frame.clone(),
        Val::Series(series) => Rc::new(series_ops::to_frame(series, series.name.clone().unwrap_or_else(|| "0".to_string()))),
        other => {
            return raise(
                ExcKind::TypeError,
                format!("Can only merge Series or DataFrame objects, a {} was passed", other.type_name()),
            )
        }
    };
    let how = args.str_opt(KW, "how")?.unwrap_or_else(|| "inner".to_string());
    let left_index = args.bool_or(KW, "left_index", false)?;
    let right_index = args.bool_or(KW, "right_index", false)?;
    let suffixes: Vec<String> = match args.given(KW, "suffixes") {
        Some(value) => names(value)?,
        None => vec!["_x".to_string(), "_y".to_string()],
    };

    let (left_on, right_on) = match (args.given(KW, "on"), args.given(KW, "left_on"), args.given(KW, "right_on")) {
        (Some(on), _, _) => (names(on)?, names(on)?),
        (None, Some(l), Some(r)) => (names(l)?, names(r)?),
        _ if left_index || right_index => (Vec::new(), Vec::new()),
        _ => {
            let shared: Vec<String> = left
                .column_names()
                .into_iter()
                .filter(|c| right.column(c).is_some())
                .collect();
            if shared.is_empty() {
                return raise(ExcKind::ValueError, "No common columns to perform merge on");
            }
            (shared.clone(), shared)
        }
    };

    let key_cells = |frame: &DataFrame, on: &[String], by_index: bool| -> EvalResult<Vec<Cell>> {
        if by_index || on.is_empty() {
            return Ok(frame.index.clone());
        }
        let positions = on
            .iter()
            .map(|c| frame.column_position(c).ok_or_else(|| Exception::key_error(c).into()))
            .collect::<EvalResult<Vec<_>>>()?;
        Ok((0..frame.len()).map(|row| row_key(frame, &positions, row)).collect())
    };
    let left_keys = key_cells(left, &left_on, left_index)?;
    let right_keys = key_cells(&right, &right_on, right_index)?;

    let mut pairs: Vec<(Option<usize>, Option<usize>)> = Vec::new();
    let mut right_used = vec![false; right.len()];
    for (l, key) in left_keys.iter().enumerate() {
        let matches: Vec<usize> = (0..right.len())
            .filter(|&r| !key.is_missing() && right_keys[r].loose_eq(key))
            .collect();
        if matches.is_empty() {
            if how == "left" || how == "outer" {
                pairs.push((Some(l), None));
            }
        } else {
            for r in matches {
                right_used[r] = true;
                pairs.push((Some(l), Some(r)));
            }
        }
    }
    if how == "right" || how == "outer" {
        if how == "right" {
            let mut ordered = Vec::new();
            for r in 0..right.len() {
                let mut found: Vec<(Option<usize>, Option<usize>)> =
                    pairs.iter().filter(|(_, pr)| *pr == Some(r)).cloned().collect();
                if found.is_empty() {
                    found.push((None, Some(r)));
                }
                ordered.extend(found);
            }
            pairs = ordered;
        } else {
            for (r, used) in right_used.iter().enumerate() {
                if !used {
                    pairs.push((None, Some(r)));
                }
            }
        }
    }

    let shared_keys: Vec<&String> = left_on.iter().filter(|c| right_on.contains(c)).collect();
    let mut columns = Vec::new();
    for column in &left.columns {
        let is_key = shared_keys.contains(&&column.name);
        let clashes = !is_key && right.column(&column.name).is_some();
        let name = if clashes {
            format!("{}{}", column.name, suffixes.first().map(String::as_str).unwrap_or("_x"))
        } else {
            column.name.clone()
        };
        let right_pos = if is_key { right.column_position(&column.name) } else { None };
        let values = pairs
            .iter()
            .map(|(l, r)| match (l, r, right_pos) {
                (Some(l), _, _) => column.values[*l].clone(),
                (None, Some(r), Some(pos)) => right.columns[pos].values[*r].clone(),
                _ => Cell::Null,
            })
            .collect();
        columns.push(Column::new(name, values));
    }
    for column in &right.columns {
        if shared_keys.contains(&&column.name) {
            continue;
        }
        let clashes = left.column(&column.name).is_some();
        let name = if clashes {
            format!("{}{}", column.name, suffixes.get(1).map(String::as_str).unwrap_or("_y"))
        } else {
            column.name.clone()
        };
        let values = pairs
            .iter()
            .map(|(_, r)| r.map(|r| column.values[r].clone()).unwrap_or(Cell::Null))
            .collect();
        columns.push(Column::new(name, values));
    }

    if left_index && right_index {
        let index = pairs
            .iter()
            .map(|(l, r)| match (l, r) {
                (Some(l), _) => left.index[*l].clone(),
                (None, Some(r)) => right.index[*r].clone(),
                _ => Cell::Null,
            })
            .collect();
        return Ok(Val::frame(table_result(DataFrame::with_index(columns, index, left.index_names.clone()))?));
    }
    Ok(Val::frame(table_result(DataFrame::new(columns))?))
}

/// `pivot_table(values=, index=, columns=, aggfunc=)`; `pivot` aggregates with `first`
fn pivot_table(frame: &Rc<DataFrame>, args: &Args, default_agg: &str) -> EvalResult<Val> {
    let index_names = names(args.required(KW, "index", "pivot_table")?)?;
    let column_key = args.given(KW, "columns").map(names).transpose()?;
    let aggfunc = args.str_opt(KW, "aggfunc")?.unwrap_or_else(|| default_agg.to_string());
    let fill = args.given(KW, "fill_value").map(Val::expect_cell).transpose()?;

    let position = |name: &String| -> EvalResult<usize> {
        frame.column_position(name).ok_or_else(|| Exception::key_error(name).into())
    };
    let index_pos = index_names.iter().map(position).collect::<EvalResult<Vec<_>>>()?;
    let column_pos = column_key
        .as_ref()
        .map(|cols| cols.iter().map(position).collect::<EvalResult<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();
    let value_names = match args.given(KW, "values") {
        Some(values) => names(values)?,
        None => frame
            .columns
            .iter()
            .enumerate()
            .filter(|(i, c)| !index_pos.contains(i) && !column_pos.contains(i) && is_numeric_column(c))
            .map(|(_, c)| c.name.clone())
            .collect(),
    };

    let row_keys: Vec<Cell> = (0..frame.len()).map(|row| row_key(frame, &index_pos, row)).collect();
    let row_groups = group_rows(&[row_keys.as_slice()], frame.len());
    let labels: Vec<Cell> = row_groups.iter().map(|(label, _)| label.clone()).collect();

    let mut columns = Vec::new();
    let pivot_groups = if column_pos.is_empty() {
        None
    } else {
        let keys: Vec<Cell> = (0..frame.len()).map(|row| row_key(frame, &column_pos, row)).collect();
        let groups = group_rows(&[keys.as_slice()], frame.len());
        Some((keys, groups))
    };

    for value_name in &value_names {
        let source = &frame.columns[position(value_name)?];
        match &pivot_groups {
            None => {
                let mut values = Vec::with_capacity(row_groups.len());
                for (_, rows) in &row_groups {
                    let cells: Vec<Cell> = rows.iter().map(|&r| source.values[r].clone()).collect();
                    values.push(reductions::reduce(&aggfunc, &cells, Options::default())?);
                }
                columns.push(Column::new(value_name.clone(), values));
            }
            Some((keys, groups)) => {
                for (pivot_label, _) in groups {
                    let mut values = Vec::with_capacity(row_groups.len());
                    for (_, rows) in &row_groups {
                        let cells: Vec<Cell> = rows
                            .iter()
                            .filter(|&&r| keys[r].loose_eq(pivot_label))
                            .map(|&r| source.values[r].clone())
                            .collect();
                        let cell = if cells.is_empty() {
                            fill.clone().unwrap_or(Cell::Null)
                        } else {
                            reductions::reduce(&aggfunc, &cells, Options::default())?
                        };
                        values.push(cell);
                    }
                    let name = if value_names.len() == 1 {
                        label_text(pivot_label)
                    } else {
                        format!("{}_{}", value_name, label_text(pivot_label))
                    };
                    columns.push(Column::new(name, values));
                }
            }
        }
    }
    Ok(Val::frame(table_result(DataFrame::with_index(columns, labels, index_names))?))
}

fn melt(frame: &Rc<DataFrame>, args: &Args) -> EvalResult<Val> {
    let id_vars = args.given(KW, "id_vars").map(names).transpose()?.unwrap_or_default();
    let value_vars = match args.given(KW, "value_vars") {
        Some(value) => names(value)?,
        None => frame
            .column_names()
            .into_iter()
            .filter(|c| !id_vars.contains(c))
            .collect(),
    };
    let var_name = args.str_opt(KW, "var_name")?.unwrap_or_else(|| "variable".to_string());
    let value_name = args.str_opt(KW, "value_name")?.unwrap_or_else(|| "value".to_string());

    let mut id_columns: Vec<Column> = id_vars.iter().map(|c| Column::new(c.clone(), Vec::new())).collect();
    let mut variables = Vec::new();
    let mut values = Vec::new();
    for var in &value_vars {
        let source = frame.column(var).ok_or_else(|| Exception::key_error(var))?;
        for row in 0..frame.len() {
            for (column, id) in id_columns.iter_mut().zip(&id_vars) {
                let id_source = frame.column(id).ok_or_else(|| Exception::key_error(id))?;
                column.values.push(id_source.values[row].clone());
            }
            variables.push(Cell::Str(var.clone()));
            values.push(source.values[row].clone());
        }
    }
    id_columns.push(Column::new(var_name, variables));
    id_columns.push(Column::new(value_name, values));
    Ok(Val::frame(table_result(DataFrame::new(id_columns))?))
}

fn to_dict(frame: &DataFrame, orient: &str) -> EvalResult<Val> {
    let cell_dict = |labels: &[Cell], values: &[Cell]| {
        Val::dict(
            labels
                .iter()
                .zip(values)
                .map(|(k, v)| (Val::from_cell(k), Val::from_cell(v)))
                .collect(),
        )
    };
    match orient {
        "dict" => Ok(Val::dict(
            frame
                .columns
                .iter()
                .map(|c| (Val::Str(c.name.clone()), cell_dict(&frame.index, &c.values)))
                .collect(),
        )),
        "list" => Ok(Val::dict(
            frame
                .columns
                .iter()
                .map(|c| (Val::Str(c.name.clone()), Val::list(c.values.iter().map(Val::from_cell).collect())))
                .collect(),
        )),
        "records" => {
            let labels = column_labels(frame);
            Ok(Val::list(
                (0..frame.len())
                    .map(|row| {
                        let values: Vec<Cell> = frame.columns.iter().map(|c| c.values[row].clone()).collect();
                        cell_dict(&labels, &values)
                    })
                    .collect(),
            ))
        }
        "index" => {
            let labels = column_labels(frame);
            Ok(Val::dict(
                (0..frame.len())
                    .map(|row| {
                        let values: Vec<Cell> = frame.columns.iter().map(|c| c.values[row].clone()).collect();
                        (Val::from_cell(&frame.index[row]), cell_dict(&labels, &values))
                    })
                    .collect(),
            ))
        }
        other => raise(
            ExcKind::ValueError,
            format!("orient '{}' not understood", other),
        ),
    }
}

/// `df.to_csv()` without a path returns the CSV text
fn to_csv(frame: &DataFrame, with_index: bool) -> EvalResult<Val> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header: Vec<String> = Vec::with_capacity(frame.width() + 1);
    if with_index {
        header.push(frame.index_names.first().cloned().unwrap_or_default());
    }
    header.extend(frame.column_names());
    let fail = |err: csv::Error| Exception::new(ExcKind::ValueError, err.to_string());
    writer.write_record(&header).map_err(fail)?;
    for row in 0..frame.len() {
        let mut record: Vec<String> = Vec::with_capacity(header.len());
        if with_index {
            record.push(label_text(&frame.index[row]));
        }
        for column in &frame.columns {
            let cell = &column.values[row];
            record.push(if cell.is_missing() { String::new() } else { label_text(cell) });
        }
        writer.write_record(&record).map_err(fail)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| Exception::new(ExcKind::ValueError, err.to_string()))?;
    Ok(Val::Str(String::from_utf8_lossy(&bytes).into_owned()))
}

/* ===================== Subscripts ===================== */

pub fn get_item(interp: &mut Interpreter, frame: &Rc<DataFrame>, index: &Val) -> EvalResult<Val> {
    if let Some(rows) = mask_positions(index, frame.len())? {
        interp.check_len(rows.len())?;
        return Ok(Val::frame(frame.take(&rows)));
    }
    match index {
        Val::Str(column) => match frame.column(column) {
            Some(_) => Ok(Val::series(table_result(frame.series(column))?)),
            None => Err(Exception::key_error(column).into()),
        },
        Val::Slice(slice) if slice.is_positional() => Ok(Val::frame(frame.take(&slice.indices(frame.len())?))),
        Val::Slice(slice) => {
            let rows = super::indexing::label_slice(&frame.index, slice)?;
            Ok(Val::frame(frame.take(&rows)))
        }
        Val::Frame(mask) => {
            let mut out = frame.as_ref().clone();
            for column in &mut out.columns {
                let flags = mask.column(&column.name).map(|c| c.values.clone()).unwrap_or_default();
                for (row, value) in column.values.iter_mut().enumerate() {
                    if !matches!(flags.get(row), Some(Cell::Bool(true))) {
                        *value = Cell::Null;
                    }
                }
            }
            Ok(Val::frame(out))
        }
        list if is_list_like(list) => Ok(Val::frame(table_result(frame.select(&names(list)?))?)),
        other => raise(ExcKind::KeyError, other.repr()),
    }
}

pub fn set_item(interp: &mut Interpreter, frame: &mut DataFrame, index: Val, value: Val) -> EvalResult<()> {
    if let Some(rows) = mask_positions(&index, frame.len())? {
        let fill = value.expect_cell()?;
        for column in &mut frame.columns {
            for &row in &rows {
                column.values[row] = fill.clone();
            }
        }
        return Ok(());
    }
    match index {
        Val::Str(column) => {
            let values = match &value {
                Val::Frame(source) if source.width() == 1 => source.columns[0].values.clone(),
                list if frame.columns.is_empty() && frame.index.is_empty() && is_list_like(list) => cells_of(list)?,
                other => broadcast(other, &frame.index)?,
            };
            interp.check_len(values.len())?;
            table_result(frame.set_column(&column, values))
        }
        list if is_list_like(&list) => {
            let targets = names(&list)?;
            for (i, column) in targets.iter().enumerate() {
                let values = match &value {
                    Val::Frame(source) => source
                        .columns
                        .get(i)
                        .map(|c| c.values.clone())
                        .ok_or_else(|| Exception::new(ExcKind::ValueError, "Columns must be same length as key"))?,
                    other => broadcast(other, &frame.index)?,
                };
                table_result(frame.set_column(column, values))?;
            }
            Ok(())
        }
        other => raise(
            ExcKind::TypeError,
            format!("cannot set a column with a {} key", other.type_name()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;

    fn runs() -> DataFrame {
        DataFrame::new(vec![
            Column::new("type", vec![Cell::Str("Run".into()), Cell::Str("Ride".into()), Cell::Str("Run".into())]),
            Column::new("distance", vec![Cell::Float(5.0), Cell::Float(20.0), Cell::Float(10.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_flags_keep_first_and_last() {
        let frame = runs();
        assert_eq!(duplicate_flags(&frame, &[0], false), vec![false, false, true]);
        assert_eq!(duplicate_flags(&frame, &[0], true), vec![true, false, false]);
    }

    #[test]
    fn test_transpose_swaps_labels() {
        let t = transpose(&runs());
        assert_eq!(t.column_names(), vec!["0", "1", "2"]);
        assert_eq!(t.index, vec![Cell::Str("type".into()), Cell::Str("distance".into())]);
    }

    #[test]
    fn test_reduce_frame_skips_text_columns() {
        let frame = runs();
        match reduce_frame(&frame, "sum", &Args::default()).unwrap() {
            Val::Series(s) => {
                let totals: HashMap<String, Cell> = s
                    .index
                    .iter()
                    .map(label_text)
                    .zip(s.values.iter().cloned())
                    .collect();
                assert_eq!(totals.get("distance"), Some(&Cell::Float(35.0)));
            }
            other => panic!("Expected Series, got {:?}", other),
        }
        match reduce_frame(&frame, "mean", &Args::default()).unwrap() {
            Val::Series(s) => assert_eq!(s.index, vec![Cell::Str("distance".into())]),
            other => panic!("Expected Series, got {:?}", other),
        }
    }

    #[test]
    fn test_to_dict_orientations() {
        let frame = runs();
        match to_dict(&frame, "records").unwrap() {
            Val::List(items) => assert_eq!(items.borrow().len(), 3),
            other => panic!("Expected list, got {:?}", other),
        }
        let expected = hashmap! { "type" => 3usize, "distance" => 3usize };
        match to_dict(&frame, "list").unwrap() {
            Val::Dict(entries) => {
                for (key, value) in entries.borrow().iter() {
                    let len = match value {
                        Val::List(items) => items.borrow().len(),
                        other => panic!("Expected list, got {:?}", other),
                    };
                    assert_eq!(expected.get(key.to_str().as_str()), Some(&len));
                }
            }
            other => panic!("Expected dict, got {:?}", other),
        }
    }

    #[test]
    fn test_to_csv_writes_header_and_rows() {
        match to_csv(&runs(), false).unwrap() {
            Val::Str(text) => assert_eq!(text, "type,distance\nRun,5.0\nRide,20.0\nRun,10.0\n"),
            other => panic!("Expected str, got {:?}", other),
        }
    }
}
