//! Series attributes, methods and subscripts

use super::reductions::{self, Options};
use super::{
    broadcast, cast, cells_of, dtype_name, fill_missing, head_rows, mask_positions, propagate,
    reduce_options, tail_rows,
};
use crate::sandbox::interpreter::operators::{abs_cell, binary_cell, compare_cells};
use crate::sandbox::interpreter::Interpreter;
use crate::sandbox::stdlib::{datetime, no_attribute, plotting, Args, KW};
use crate::sandbox::types::ast::{BinaryOp, CompareOp};
use crate::sandbox::types::{
    raise, Accessor, AccessorKind, EvalResult, ExcKind, Exception, Selection, Val,
};
use crate::table::format::{frame_to_markdown, series_to_string};
use crate::table::{range_index, Cell, Column, DataFrame, Dtype, Series};
use std::cmp::Ordering;
use std::rc::Rc;

const METHODS: [&str; 77] = [
    "head", "tail", "describe", "sum", "mean", "median", "min", "max", "std", "var", "count",
    "nunique", "prod", "sem", "quantile", "value_counts", "unique", "tolist", "to_list",
    "to_numpy", "to_dict", "to_frame", "sort_values", "sort_index", "reset_index", "isna",
    "isnull", "notna", "notnull", "fillna", "ffill", "bfill", "dropna", "astype", "apply", "map",
    "round", "abs", "cumsum", "cummax", "cummin", "cumprod", "diff", "shift", "pct_change",
    "rolling", "idxmax", "idxmin", "nlargest", "nsmallest", "between", "isin", "clip", "copy",
    "rename", "items", "to_string", "to_markdown", "mode", "corr", "where", "replace", "any",
    "all", "drop_duplicates", "duplicated", "plot", "hist", "agg", "aggregate", "rank", "item",
    "get", "keys", "equals", "resample", "first_valid_index",
];

/* ===================== Sequential Helpers ===================== */

/// Running sum / product / extreme; missing values stay missing
pub fn cumulative(name: &str, values: &[Cell]) -> EvalResult<Vec<Cell>> {
    let mut out = Vec::with_capacity(values.len());
    let mut acc: Option<Cell> = None;
    for cell in values {
        if cell.is_missing() {
            out.push(Cell::Null);
            continue;
        }
        let next = match (&acc, name) {
            (None, _) => cell.clone(),
            (Some(a), "cumsum") => binary_cell(BinaryOp::Add, a, cell)?,
            (Some(a), "cumprod") => binary_cell(BinaryOp::Mul, a, cell)?,
            (Some(a), "cummax") if cell.sort_cmp(a) == Ordering::Greater => cell.clone(),
            (Some(a), "cummin") if cell.sort_cmp(a) == Ordering::Less => cell.clone(),
            (Some(a), _) => a.clone(),
        };
        out.push(next.clone());
        acc = Some(next);
    }
    Ok(out)
}

pub fn shifted(values: &[Cell], periods: i64) -> Vec<Cell> {
    let len = values.len() as i64;
    (0..len)
        .map(|i| {
            let source = i - periods;
            if (0..len).contains(&source) {
                values[source as usize].clone()
            } else {
                Cell::Null
            }
        })
        .collect()
}

pub fn differences(values: &[Cell], periods: i64) -> EvalResult<Vec<Cell>> {
    let previous = shifted(values, periods);
    values
        .iter()
        .zip(&previous)
        .map(|(x, y)| {
            if x.is_missing() || y.is_missing() {
                Ok(Cell::Null)
            } else {
                binary_cell(BinaryOp::Sub, x, y)
            }
        })
        .collect()
}

pub fn pct_change(values: &[Cell], periods: i64) -> Vec<Cell> {
    let previous = shifted(values, periods);
    values
        .iter()
        .zip(&previous)
        .map(|(x, y)| match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) if !x.is_nan() && !y.is_nan() => Cell::Float(x / y - 1.0),
            _ => Cell::Null,
        })
        .collect()
}

/// Position of the largest (or smallest) present value; first wins on ties
pub fn arg_extreme(values: &[Cell], max: bool) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, cell) in values.iter().enumerate() {
        if cell.is_missing() {
            continue;
        }
        best = match best {
            None => Some(i),
            Some(b) => {
                let ord = cell.sort_cmp(&values[b]);
                let better = if max {
                    ord == Ordering::Greater
                } else {
                    ord == Ordering::Less
                };
                Some(if better { i } else { b })
            }
        };
    }
    best
}

/// Average ranks starting at 1; missing values stay missing
pub fn rank(values: &[Cell]) -> Vec<Cell> {
    let mut order: Vec<usize> = (0..values.len()).filter(|&i| !values[i].is_missing()).collect();
    order.sort_by(|&a, &b| values[a].sort_cmp(&values[b]));
    let mut out = vec![Cell::Null; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len()
            && values[order[j + 1]].sort_cmp(&values[order[i]]) == Ordering::Equal
        {
            j += 1;
        }
        let average = (i + j) as f64 / 2.0 + 1.0;
        for &pos in &order[i..=j] {
            out[pos] = Cell::Float(average);
        }
        i = j + 1;
    }
    out
}

/// Stable sort positions; missing values last
pub fn sort_positions(values: &[Cell], ascending: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        let (x, y) = (&values[a], &values[b]);
        match (x.is_missing(), y.is_missing()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ if ascending => x.sort_cmp(y),
            _ => y.sort_cmp(x),
        }
    });
    order
}

pub fn round(series: &Series, digits: i64) -> Series {
    series.map_values(series.values.iter().map(|c| round_cell(c, digits)).collect())
}

pub fn round_cell(cell: &Cell, digits: i64) -> Cell {
    match cell {
        Cell::Float(x) => Cell::Float(crate::sandbox::stdlib::builtins::py_round(*x, digits)),
        other => other.clone(),
    }
}

/// `df.index` / `s.index` as a Series of labels
pub fn index_series(labels: &[Cell], names: &[String]) -> Series {
    Series::new(names.first().cloned(), labels.to_vec())
}

fn accessor(receiver: &Val, kind: AccessorKind) -> Val {
    Val::Accessor(Rc::new(Accessor {
        kind,
        target: receiver.clone(),
    }))
}

fn cell_list(values: &[Cell]) -> Val {
    Val::list(values.iter().map(Val::from_cell).collect())
}

/* ===================== Attributes ===================== */

pub fn attr(series: &Rc<Series>, receiver: &Val, attr: &str) -> EvalResult<Val> {
    let dtype = series.dtype();
    match attr {
        "name" => Ok(series.name.clone().map(Val::Str).unwrap_or(Val::None)),
        "values" | "array" => Ok(cell_list(&series.values)),
        "index" => Ok(Val::series(index_series(&series.index, &series.index_names))),
        "dtype" | "dtypes" => Ok(Val::str(dtype.name())),
        "shape" => Ok(Val::tuple(vec![Val::Int(series.len() as i64)])),
        "size" => Ok(Val::Int(series.len() as i64)),
        "ndim" => Ok(Val::Int(1)),
        "empty" => Ok(Val::Bool(series.is_empty())),
        "T" => Ok(receiver.clone()),
        "hasnans" => Ok(Val::Bool(series.values.iter().any(Cell::is_missing))),
        "is_unique" => {
            let refs: Vec<&Cell> = series.values.iter().collect();
            Ok(Val::Bool(reductions::distinct(&refs).len() == series.len()))
        }
        "is_monotonic_increasing" | "is_monotonic_decreasing" => {
            let wanted = if attr.ends_with("increasing") {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            let ok = series
                .values
                .windows(2)
                .all(|w| w[0].sort_cmp(&w[1]) != wanted);
            Ok(Val::Bool(ok))
        }
        "loc" => Ok(accessor(receiver, AccessorKind::Loc)),
        "iloc" => Ok(accessor(receiver, AccessorKind::Iloc)),
        "dt" => match dtype {
            Dtype::Datetime | Dtype::Timedelta => Ok(accessor(receiver, AccessorKind::Dt)),
            _ if series.values.iter().all(|c| c.is_missing() || matches!(c, Cell::Date(_))) => {
                Ok(accessor(receiver, AccessorKind::Dt))
            }
            _ => raise(
                ExcKind::AttributeError,
                "Can only use .dt accessor with datetimelike values",
            ),
        },
        "str" => match dtype {
            Dtype::Object | Dtype::Float64 if series.values.iter().any(|c| matches!(c, Cell::Str(_) | Cell::Tuple(_))) || series.is_empty() => {
                Ok(accessor(receiver, AccessorKind::Str))
            }
            _ => raise(
                ExcKind::AttributeError,
                "Can only use .str accessor with string values!",
            ),
        },
        name if METHODS.contains(&name) => Ok(Val::method(receiver.clone(), name)),
        // row records: `row.distance`
        label if series.index.iter().any(|l| l.as_str() == Some(label)) => {
            let pos = series
                .index
                .iter()
                .position(|l| l.as_str() == Some(label))
                .unwrap_or_default();
            Ok(Val::from_cell(&series.values[pos]))
        }
        // DatetimeIndex-style fields (`df.index.month`)
        field if dtype == Dtype::Datetime => {
            let mut values = Vec::with_capacity(series.len());
            for cell in &series.values {
                values.push(match cell {
                    Cell::Time(t) => match datetime::time_field(t, field) {
                        Some(value) => value,
                        None => return no_attribute(receiver, field),
                    },
                    _ => Cell::Null,
                });
            }
            Ok(Val::series(Series::new(series.name.clone(), values)))
        }
        other => no_attribute(receiver, other),
    }
}

pub fn set_attr(series: &mut Series, attr: &str, value: Val) -> EvalResult<()> {
    match attr {
        "name" => {
            series.name = match value {
                Val::None => None,
                other => Some(other.to_str()),
            };
            Ok(())
        }
        "index" => {
            let labels = cells_of(&value)?;
            if labels.len() != series.len() {
                return raise(
                    ExcKind::ValueError,
                    format!(
                        "Length mismatch: Expected axis has {} elements, new values have {} elements",
                        series.len(),
                        labels.len()
                    ),
                );
            }
            series.index = labels;
            if let Val::Series(source) = &value {
                series.index_names = source.name.clone().into_iter().collect();
            }
            Ok(())
        }
        other => raise(
            ExcKind::AttributeError,
            format!("cannot set attribute '{}' on a Series", other),
        ),
    }
}

/* ===================== Methods ===================== */

pub fn call(interp: &mut Interpreter, series: &Rc<Series>, name: &str, args: Args) -> EvalResult<Val> {
    let receiver = Val::Series(series.clone());
    match name {
        "head" => Ok(Val::series(series.take(&head_rows(series.len(), args.int_opt(0, "n")?.unwrap_or(5))))),
        "tail" => Ok(Val::series(series.take(&tail_rows(series.len(), args.int_opt(0, "n")?.unwrap_or(5))))),
        "describe" => Ok(Val::series(reductions::describe_series(series))),
        "mode" => {
            let present: Vec<&Cell> = series.values.iter().filter(|c| !c.is_missing()).collect();
            Ok(Val::series(Series::new(series.name.clone(), reductions::modes(&present))))
        }
        func if reductions::is_reduction(func) => {
            let opts = reduce_options(&args)?;
            let cell = reductions::reduce(func, &series.values, opts)?;
            Ok(Val::from_cell(&cell))
        }
        "quantile" => match args.given(0, "q") {
            Some(q) if super::is_list_like(q) => {
                let qs = cells_of(q)?;
                let xs = series.numbers();
                let values = qs
                    .iter()
                    .map(|q| Cell::Float(reductions::quantile(&xs, q.as_f64().unwrap_or(0.5))))
                    .collect();
                Ok(Val::series(Series::with_index(series.name.clone(), values, qs, Vec::new())))
            }
            Some(q) => Ok(Val::Float(reductions::quantile(
                &series.numbers(),
                q.as_f64().unwrap_or(0.5),
            ))),
            None => Ok(Val::Float(reductions::quantile(&series.numbers(), 0.5))),
        },
        "value_counts" => value_counts(series, &args),
        "unique" => {
            let refs: Vec<&Cell> = series.values.iter().collect();
            Ok(cell_list(&reductions::distinct(&refs)))
        }
        "tolist" | "to_list" | "to_numpy" => Ok(cell_list(&series.values)),
        "to_dict" => Ok(Val::dict(
            series
                .index
                .iter()
                .zip(&series.values)
                .map(|(k, v)| (Val::from_cell(k), Val::from_cell(v)))
                .collect(),
        )),
        "items" => Ok(Val::list(
            series
                .index
                .iter()
                .zip(&series.values)
                .map(|(k, v)| Val::tuple(vec![Val::from_cell(k), Val::from_cell(v)]))
                .collect(),
        )),
        "keys" => Ok(Val::series(index_series(&series.index, &series.index_names))),
        "to_frame" => {
            let column = args
                .str_opt(0, "name")?
                .or_else(|| series.name.clone())
                .unwrap_or_else(|| "0".to_string());
            Ok(Val::frame(to_frame(series, column)))
        }
        "sort_values" => {
            let ascending = args.bool_or(KW, "ascending", true)?;
            let keys = match args.given(KW, "key") {
                Some(key) => {
                    let mapped = interp.call1(key, receiver.clone())?;
                    cells_of(&mapped)?
                }
                None => series.values.clone(),
            };
            Ok(Val::series(series.take(&sort_positions(&keys, ascending))))
        }
        "sort_index" => {
            let ascending = args.bool_or(KW, "ascending", true)?;
            Ok(Val::series(series.take(&sort_positions(&series.index, ascending))))
        }
        "reset_index" => {
            if args.bool_or(KW, "drop", false)? {
                let mut out = series.as_ref().clone();
                out.index = range_index(out.len());
                out.index_names.clear();
                return Ok(Val::series(out));
            }
            let column = args
                .str_opt(KW, "name")?
                .or_else(|| series.name.clone())
                .unwrap_or_else(|| "0".to_string());
            Ok(Val::frame(to_frame(series, column).reset_index(false)))
        }
        "isna" | "isnull" | "notna" | "notnull" => {
            let negate = name.starts_with("not");
            let values = series.values.iter().map(|c| Cell::Bool(c.is_missing() != negate)).collect();
            Ok(Val::series(series.map_values(values)))
        }
        "fillna" => {
            if let Some(method) = args.str_opt(KW, "method")? {
                return Ok(Val::series(series.map_values(propagate(&series.values, method.starts_with('f') || method == "pad"))));
            }
            let value = args.required(0, "value", "fillna")?;
            let fill = broadcast(value, &series.index)?;
            Ok(Val::series(series.map_values(fill_missing(&series.values, &fill))))
        }
        "ffill" | "bfill" => Ok(Val::series(series.map_values(propagate(&series.values, name == "ffill")))),
        "dropna" => {
            let keep: Vec<usize> = (0..series.len()).filter(|&i| !series.values[i].is_missing()).collect();
            Ok(Val::series(series.take(&keep)))
        }
        "astype" => {
            let target = dtype_name(args.required(0, "dtype", "astype")?)?;
            let values = series.values.iter().map(|c| cast(c, &target)).collect::<EvalResult<Vec<_>>>()?;
            Ok(Val::series(series.map_values(values)))
        }
        "apply" | "map" => {
            let func = args.required(0, "func", name)?;
            let values = map_values(interp, &series.values, func)?;
            Ok(Val::series(series.map_values(values)))
        }
        "agg" | "aggregate" => match args.required(0, "func", name)? {
            Val::List(items) => {
                let funcs: Vec<String> = items.borrow().iter().map(Val::to_str).collect();
                let mut values = Vec::with_capacity(funcs.len());
                for func in &funcs {
                    values.push(reductions::reduce(func, &series.values, Options::default())?);
                }
                let index = funcs.into_iter().map(Cell::Str).collect();
                Ok(Val::series(Series::with_index(series.name.clone(), values, index, Vec::new())))
            }
            Val::Str(func) => Ok(Val::from_cell(&reductions::reduce(func, &series.values, Options::default())?)),
            func => interp.call1(func, receiver.clone()),
        },
        "round" => Ok(Val::series(round(series, args.int_opt(0, "decimals")?.unwrap_or(0)))),
        "abs" => {
            let values = series.values.iter().map(abs_cell).collect::<EvalResult<Vec<_>>>()?;
            Ok(Val::series(series.map_values(values)))
        }
        "cumsum" | "cummax" | "cummin" | "cumprod" => {
            Ok(Val::series(series.map_values(cumulative(name, &series.values)?)))
        }
        "diff" => {
            let periods = args.int_opt(0, "periods")?.unwrap_or(1);
            Ok(Val::series(series.map_values(differences(&series.values, periods)?)))
        }
        "shift" => {
            let periods = args.int_opt(0, "periods")?.unwrap_or(1);
            Ok(Val::series(series.map_values(shifted(&series.values, periods))))
        }
        "pct_change" => {
            let periods = args.int_opt(0, "periods")?.unwrap_or(1);
            Ok(Val::series(series.map_values(pct_change(&series.values, periods))))
        }
        "rank" => {
            let ranks = rank(&series.values);
            let ascending = args.bool_or(KW, "ascending", true)?;
            let present = ranks.iter().filter(|c| !c.is_missing()).count() as f64;
            let values = ranks
                .into_iter()
                .map(|c| match c {
                    Cell::Float(r) if !ascending => Cell::Float(present + 1.0 - r),
                    other => other,
                })
                .collect();
            Ok(Val::series(series.map_values(values)))
        }
        "rolling" => {
            let window = args.usize_or(0, "window", 1)?.max(1);
            let min_periods = args.usize_or(KW, "min_periods", window)?;
            Ok(accessor(&receiver, AccessorKind::Rolling { window, min_periods }))
        }
        "idxmax" | "idxmin" => match arg_extreme(&series.values, name == "idxmax") {
            Some(pos) => Ok(Val::from_cell(&series.index[pos])),
            None => raise(
                ExcKind::ValueError,
                format!("attempt to get {} of an empty sequence", &name[3..]),
            ),
        },
        "nlargest" | "nsmallest" => {
            let n = args.int_opt(0, "n")?.unwrap_or(5).max(0) as usize;
            let order: Vec<usize> = sort_positions(&series.values, name == "nsmallest")
                .into_iter()
                .filter(|&i| !series.values[i].is_missing())
                .take(n)
                .collect();
            Ok(Val::series(series.take(&order)))
        }
        "between" => {
            let left = args.required(0, "left", "between")?.expect_cell()?;
            let right = args.required(1, "right", "between")?.expect_cell()?;
            let inclusive = args.str_opt(KW, "inclusive")?.unwrap_or_else(|| "both".to_string());
            let (lo_op, hi_op) = match inclusive.as_str() {
                "both" => (CompareOp::Ge, CompareOp::Le),
                "left" => (CompareOp::Ge, CompareOp::Lt),
                "right" => (CompareOp::Gt, CompareOp::Le),
                _ => (CompareOp::Gt, CompareOp::Lt),
            };
            let mut values = Vec::with_capacity(series.len());
            for cell in &series.values {
                let inside = !cell.is_missing()
                    && compare_cells(lo_op, cell, &left)?
                    && compare_cells(hi_op, cell, &right)?;
                values.push(Cell::Bool(inside));
            }
            Ok(Val::series(series.map_values(values)))
        }
        "isin" => {
            let wanted = cells_of(args.required(0, "values", "isin")?)?;
            let values = series
                .values
                .iter()
                .map(|c| Cell::Bool(wanted.iter().any(|w| w.loose_eq(c))))
                .collect();
            Ok(Val::series(series.map_values(values)))
        }
        "clip" => {
            let lower = args.float_opt(0, "lower")?;
            let upper = args.float_opt(1, "upper")?;
            let values = series
                .values
                .iter()
                .map(|c| clip_cell(c, lower, upper))
                .collect();
            Ok(Val::series(series.map_values(values)))
        }
        "copy" => Ok(Val::series(series.as_ref().clone())),
        "rename" => match args.given(0, "index") {
            Some(Val::Dict(entries)) => {
                let entries = entries.borrow();
                let index = series
                    .index
                    .iter()
                    .map(|label| {
                        entries
                            .iter()
                            .find(|(k, _)| k.to_cell().map(|k| k.loose_eq(label)).unwrap_or(false))
                            .map(|(_, v)| v.expect_cell())
                            .transpose()
                            .map(|found| found.unwrap_or_else(|| label.clone()))
                    })
                    .collect::<EvalResult<Vec<_>>>()?;
                let mut out = series.as_ref().clone();
                out.index = index;
                Ok(Val::series(out))
            }
            Some(value) => {
                let mut out = series.as_ref().clone();
                out.name = Some(value.to_str());
                Ok(Val::series(out))
            }
            None => Ok(receiver),
        },
        "to_string" => Ok(Val::Str(series_to_string(series))),
        "to_markdown" => {
            let column = series.name.clone().unwrap_or_else(|| "0".to_string());
            Ok(Val::Str(frame_to_markdown(&to_frame(series, column))))
        }
        "corr" => {
            let other = match args.required(0, "other", "corr")? {
                Val::Series(s) => s.clone(),
                other => {
                    return raise(
                        ExcKind::TypeError,
                        format!("other must be a Series, not {}", other.type_name()),
                    )
                }
            };
            let (_, left, right) = crate::sandbox::interpreter::operators::align(series, &other);
            Ok(Val::Float(reductions::correlation(&left, &right)))
        }
        "where" => {
            let cond = args.required(0, "cond", "where")?;
            let flags = broadcast(cond, &series.index)?;
            let other = match args.given(1, "other") {
                Some(value) => broadcast(value, &series.index)?,
                None => vec![Cell::Null; series.len()],
            };
            let values = series
                .values
                .iter()
                .zip(flags.iter().zip(other))
                .map(|(v, (keep, other))| if matches!(keep, Cell::Bool(true)) { v.clone() } else { other })
                .collect();
            Ok(Val::series(series.map_values(values)))
        }
        "replace" => {
            let pairs = replacement_pairs(&args)?;
            let values = series.values.iter().map(|c| replace_cell(c, &pairs)).collect();
            Ok(Val::series(series.map_values(values)))
        }
        "any" | "all" => {
            let flags = series
                .values
                .iter()
                .filter(|c| !c.is_missing())
                .map(|c| Val::from_cell(c).truthy())
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Val::Bool(if name == "any" {
                flags.iter().any(|b| *b)
            } else {
                flags.iter().all(|b| *b)
            }))
        }
        "duplicated" => {
            let mut seen: Vec<&Cell> = Vec::new();
            let values = series
                .values
                .iter()
                .map(|c| {
                    let dup = seen.iter().any(|s| s.loose_eq(c) || (s.is_missing() && c.is_missing()));
                    seen.push(c);
                    Cell::Bool(dup)
                })
                .collect();
            Ok(Val::series(series.map_values(values)))
        }
        "drop_duplicates" => {
            let mut seen: Vec<&Cell> = Vec::new();
            let mut keep = Vec::new();
            for (i, c) in series.values.iter().enumerate() {
                if !seen.iter().any(|s| s.loose_eq(c) || (s.is_missing() && c.is_missing())) {
                    keep.push(i);
                }
                seen.push(c);
            }
            Ok(Val::series(series.take(&keep)))
        }
        "item" => match series.values.as_slice() {
            [only] => Ok(Val::from_cell(only)),
            _ => raise(ExcKind::ValueError, "can only convert an array of size 1 to a Python scalar"),
        },
        "get" => {
            let key = args.required(0, "key", "get")?.expect_cell()?;
            match series.position_of(&key) {
                Some(pos) => Ok(Val::from_cell(&series.values[pos])),
                None => Ok(args.get(1, "default").cloned().unwrap_or(Val::None)),
            }
        }
        "first_valid_index" => Ok(series
            .values
            .iter()
            .position(|c| !c.is_missing())
            .map(|pos| Val::from_cell(&series.index[pos]))
            .unwrap_or(Val::None)),
        "equals" => Ok(Val::Bool(match args.required(0, "other", "equals")? {
            Val::Series(other) => other.values == series.values && other.index == series.index,
            _ => false,
        })),
        "resample" => {
            let frame = Rc::new(to_frame(series, series.name.clone().unwrap_or_else(|| "0".to_string())));
            let mut groups = super::groupby::resample(&frame, &args)?;
            groups.selection = Some(Selection::One(frame.columns[0].name.clone()));
            Ok(Val::GroupBy(Rc::new(groups)))
        }
        "plot" => {
            let kind = args.str_opt(KW, "kind")?.unwrap_or_else(|| "line".to_string());
            plotting::plot_series(interp, series, &kind, &args)
        }
        "hist" => plotting::plot_series(interp, series, "hist", &args),
        plot if plot.starts_with("plot.") => plotting::plot_series(interp, series, &plot[5..], &args),
        other => no_attribute(&receiver, other),
    }
}

pub fn to_frame(series: &Series, column: String) -> DataFrame {
    DataFrame {
        columns: vec![Column::new(column, series.values.clone())],
        index: series.index.clone(),
        index_names: series.index_names.clone(),
    }
}

fn value_counts(series: &Series, args: &Args) -> EvalResult<Val> {
    let normalize = args.bool_or(KW, "normalize", false)?;
    let ascending = args.bool_or(KW, "ascending", false)?;
    let dropna = args.bool_or(KW, "dropna", true)?;
    let present: Vec<&Cell> = series
        .values
        .iter()
        .filter(|c| !dropna || !c.is_missing())
        .collect();
    let mut counts = reductions::value_counts(&present);
    if ascending {
        counts.reverse();
        counts.sort_by(|a, b| a.1.cmp(&b.1));
    }
    let total = present.len().max(1) as f64;
    let (labels, values): (Vec<Cell>, Vec<Cell>) = counts
        .into_iter()
        .map(|(label, n)| {
            let value = if normalize {
                Cell::Float(n as f64 / total)
            } else {
                Cell::Int(n as i64)
            };
            (label, value)
        })
        .unzip();
    let name = if normalize { "proportion" } else { "count" };
    Ok(Val::series(Series::with_index(
        Some(name.to_string()),
        values,
        labels,
        series.name.clone().into_iter().collect(),
    )))
}

/// `apply` / `map` with a callable or a dict
pub fn map_values(interp: &mut Interpreter, values: &[Cell], func: &Val) -> EvalResult<Vec<Cell>> {
    match func {
        Val::Dict(entries) => {
            let entries = entries.borrow();
            values
                .iter()
                .map(|cell| {
                    entries
                        .iter()
                        .find(|(k, _)| k.to_cell().map(|k| k.loose_eq(cell)).unwrap_or(false))
                        .map(|(_, v)| v.expect_cell())
                        .unwrap_or(Ok(Cell::Null))
                })
                .collect()
        }
        Val::Series(lookup) => Ok(values
            .iter()
            .map(|cell| {
                lookup
                    .position_of(cell)
                    .map(|pos| lookup.values[pos].clone())
                    .unwrap_or(Cell::Null)
            })
            .collect()),
        callable => {
            let mut out = Vec::with_capacity(values.len());
            for cell in values {
                out.push(interp.call1(callable, Val::from_cell(cell))?.expect_cell()?);
            }
            Ok(out)
        }
    }
}

pub fn clip_cell(cell: &Cell, lower: Option<f64>, upper: Option<f64>) -> Cell {
    match cell.as_f64() {
        Some(x) if !x.is_nan() => {
            let mut y = x;
            if let Some(lo) = lower {
                y = y.max(lo);
            }
            if let Some(hi) = upper {
                y = y.min(hi);
            }
            if y == x {
                cell.clone()
            } else {
                Cell::Float(y)
            }
        }
        _ => cell.clone(),
    }
}

/// `(to_replace, value)` pairs from `replace(a, b)`, `replace([a, b], c)` or `replace({a: b})`
pub fn replacement_pairs(args: &Args) -> EvalResult<Vec<(Cell, Cell)>> {
    match args.required(0, "to_replace", "replace")? {
        Val::Dict(entries) => entries
            .borrow()
            .iter()
            .map(|(k, v)| Ok((k.expect_cell()?, v.expect_cell()?)))
            .collect(),
        list if super::is_list_like(list) => {
            let value = args.get(1, "value").cloned().unwrap_or(Val::None).expect_cell()?;
            Ok(cells_of(list)?.into_iter().map(|k| (k, value.clone())).collect())
        }
        single => {
            let value = args.get(1, "value").cloned().unwrap_or(Val::None).expect_cell()?;
            Ok(vec![(single.expect_cell()?, value)])
        }
    }
}

pub fn replace_cell(cell: &Cell, pairs: &[(Cell, Cell)]) -> Cell {
    pairs
        .iter()
        .find(|(from, _)| from.loose_eq(cell) || (from.is_missing() && cell.is_missing()))
        .map(|(_, to)| to.clone())
        .unwrap_or_else(|| cell.clone())
}

/* ===================== Subscripts ===================== */

/// Position of `key` in the index, falling back to position for integer keys
/// on a non-integer index
fn locate(series: &Series, key: &Val) -> EvalResult<usize> {
    let cell = key.expect_cell()?;
    if let Some(pos) = series.position_of(&cell) {
        return Ok(pos);
    }
    let int_index = series.index.iter().any(|l| matches!(l, Cell::Int(_)));
    if let (Val::Int(n), false) = (key, int_index) {
        if let Some(pos) = crate::sandbox::stdlib::builtins::normalize_index(*n, series.len()) {
            return Ok(pos);
        }
        return raise(ExcKind::IndexError, "index out of bounds");
    }
    Err(Exception::new(ExcKind::KeyError, key.repr()).into())
}

pub fn get_item(series: &Rc<Series>, index: &Val) -> EvalResult<Val> {
    if let Some(rows) = mask_positions(index, series.len())? {
        return Ok(Val::series(series.take(&rows)));
    }
    match index {
        Val::Slice(slice) if slice.is_positional() => {
            Ok(Val::series(series.take(&slice.indices(series.len())?)))
        }
        Val::Slice(slice) => {
            let rows = super::indexing::label_slice(&series.index, slice)?;
            Ok(Val::series(series.take(&rows)))
        }
        Val::List(_) | Val::Tuple(_) | Val::Series(_) => {
            let mut rows = Vec::new();
            for key in cells_of(index)? {
                rows.push(locate(series, &Val::from_cell(&key))?);
            }
            Ok(Val::series(series.take(&rows)))
        }
        key => Ok(Val::from_cell(&series.values[locate(series, key)?])),
    }
}

pub fn set_item(series: &mut Series, index: Val, value: Val) -> EvalResult<()> {
    if let Some(rows) = mask_positions(&index, series.len())? {
        let fill = broadcast(&value, &series.index)?;
        for row in rows {
            series.values[row] = fill[row].clone();
        }
        return Ok(());
    }
    let cell = value.expect_cell()?;
    match &index {
        Val::Slice(slice) => {
            for row in slice.indices(series.len())? {
                series.values[row] = cell.clone();
            }
            Ok(())
        }
        key => match locate(series, key) {
            Ok(pos) => {
                series.values[pos] = cell;
                Ok(())
            }
            Err(_) => {
                series.index.push(key.expect_cell()?);
                series.values.push(cell);
                Ok(())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(xs: &[i64]) -> Vec<Cell> {
        xs.iter().map(|&n| Cell::Int(n)).collect()
    }

    #[test]
    fn test_cumulative_skips_missing() {
        let values = vec![Cell::Int(1), Cell::Null, Cell::Int(3)];
        let out = cumulative("cumsum", &values).unwrap();
        assert_eq!(out, vec![Cell::Int(1), Cell::Null, Cell::Int(4)]);
    }

    #[test]
    fn test_shift_and_diff() {
        assert_eq!(shifted(&ints(&[1, 2, 3]), 1), vec![Cell::Null, Cell::Int(1), Cell::Int(2)]);
        assert_eq!(
            differences(&ints(&[1, 4, 9]), 1).unwrap(),
            vec![Cell::Null, Cell::Int(3), Cell::Int(5)]
        );
    }

    #[test]
    fn test_rank_averages_ties() {
        let ranks = rank(&ints(&[10, 20, 10]));
        assert_eq!(ranks, vec![Cell::Float(1.5), Cell::Float(3.0), Cell::Float(1.5)]);
    }

    #[test]
    fn test_arg_extreme_ignores_missing() {
        let values = vec![Cell::Null, Cell::Float(2.0), Cell::Float(5.0), Cell::Float(5.0)];
        assert_eq!(arg_extreme(&values, true), Some(2));
        assert_eq!(arg_extreme(&values, false), Some(1));
        assert_eq!(arg_extreme(&[Cell::Null], true), None);
    }
}
