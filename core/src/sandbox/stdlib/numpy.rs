//! `numpy` and `math` subsets
//!
//! Arrays are represented as unnamed Series so arithmetic, masks and
//! reductions share the pandas machinery.

use super::pandas::reductions::{self, Options};
use super::pandas::{self, cells_of, is_list_like};
use super::{builtins, datetime, Args, KW};
use crate::sandbox::interpreter::operators::{binary_cell, checked_int, compare_cells};
use crate::sandbox::interpreter::Interpreter;
use crate::sandbox::types::ast::{BinaryOp, CompareOp};
use crate::sandbox::types::{raise, EvalResult, ExcKind, Module, Val};
use crate::table::{parse_datetime, Cell, Series};
use std::f64::consts::{E, PI, TAU};

const NUMPY_FUNCTIONS: [&str; 96] = [
    "abs", "absolute", "sqrt", "square", "cbrt", "exp", "log", "log10", "log2", "log1p", "floor",
    "ceil", "trunc", "round", "around", "sin", "cos", "tan", "arcsin", "arccos", "arctan",
    "arctan2", "radians", "deg2rad", "degrees", "rad2deg", "power", "sign", "isnan", "isfinite",
    "isinf", "hypot", "sum", "mean", "median", "std", "var", "min", "max", "amin", "amax",
    "nanmean", "nansum", "nanmax", "nanmin", "nanstd", "nanmedian", "nanvar", "prod", "cumsum",
    "cumprod", "diff", "percentile", "nanpercentile", "quantile", "argmax", "argmin", "argsort",
    "sort", "unique", "where", "select", "array", "asarray", "arange", "linspace", "zeros",
    "ones", "full", "polyfit", "polyval", "corrcoef", "clip", "maximum", "minimum",
    "concatenate", "append", "count_nonzero", "histogram", "digitize", "interp", "isclose",
    "allclose", "average", "int64", "int32", "float64", "float32", "bool_", "object_", "int_",
    "float_", "datetime64", "timedelta64", "ndarray", "floor_divide",
];

const MATH_FUNCTIONS: [&str; 27] = [
    "sqrt", "floor", "ceil", "trunc", "log", "log10", "log2", "log1p", "exp", "sin", "cos",
    "tan", "asin", "acos", "atan", "atan2", "radians", "degrees", "pow", "fabs", "isnan",
    "isinf", "isfinite", "hypot", "fsum", "isclose", "factorial",
];

/* ===================== Module ===================== */

pub fn module_attr(module: &Val, attr: &str) -> EvalResult<Val> {
    let is_math = matches!(module, Val::Module(Module::Math));
    match attr {
        "pi" => Ok(Val::Float(PI)),
        "e" => Ok(Val::Float(E)),
        "tau" if is_math => Ok(Val::Float(TAU)),
        "inf" | "Inf" | "infty" => Ok(Val::Float(f64::INFINITY)),
        "nan" | "NaN" | "NAN" => Ok(Val::Float(f64::NAN)),
        "gcd" if is_math => Ok(Val::method(module.clone(), attr)),
        "random" | "linalg" if !is_math => Ok(Val::method(module.clone(), attr)),
        name if is_math && MATH_FUNCTIONS.contains(&name) => Ok(Val::method(module.clone(), name)),
        name if !is_math && (NUMPY_FUNCTIONS.contains(&name) || name == "integer" || name == "floating" || name == "number") => {
            Ok(Val::method(module.clone(), name))
        }
        other => raise(
            ExcKind::AttributeError,
            format!(
                "module '{}' has no attribute '{}'",
                if is_math { "math" } else { "numpy" },
                other
            ),
        ),
    }
}

/* ===================== Element-wise ===================== */

fn number(value: &Val, function: &str) -> EvalResult<f64> {
    match value.as_f64() {
        Some(x) => Ok(x),
        None => raise(
            ExcKind::TypeError,
            format!("must be real number, not {} (in {})", value.type_name(), function),
        ),
    }
}

/// Apply `f` to a scalar, a list, a Series or every numeric column of a frame
fn map_numeric(value: &Val, f: impl Fn(f64) -> f64) -> EvalResult<Val> {
    let cell = |c: &Cell| match c.as_f64() {
        Some(x) if !c.is_missing() => Cell::Float(f(x)),
        _ => Cell::Null,
    };
    match value {
        Val::Series(series) => Ok(Val::series(series.map_values(series.values.iter().map(cell).collect()))),
        Val::Frame(frame) => {
            let mut out = frame.as_ref().clone();
            for column in &mut out.columns {
                if column.values.iter().all(|c| c.is_missing() || c.is_numeric()) {
                    column.values = column.values.iter().map(cell).collect();
                }
            }
            Ok(Val::frame(out))
        }
        Val::List(_) | Val::Tuple(_) => {
            let cells = cells_of(value)?;
            Ok(Val::series(Series::new(None, cells.iter().map(cell).collect())))
        }
        scalar => match scalar.as_f64() {
            Some(x) => Ok(Val::Float(f(x))),
            None => raise(
                ExcKind::TypeError,
                format!("ufunc not supported for the input type {}", scalar.type_name()),
            ),
        },
    }
}

fn map_predicate(value: &Val, f: impl Fn(f64) -> bool) -> EvalResult<Val> {
    let cell = |c: &Cell| Cell::Bool(match c {
        Cell::Null => f(f64::NAN),
        other => other.as_f64().map(&f).unwrap_or(false),
    });
    match value {
        Val::Series(series) => Ok(Val::series(series.map_values(series.values.iter().map(cell).collect()))),
        Val::List(_) | Val::Tuple(_) => {
            let cells = cells_of(value)?;
            Ok(Val::series(Series::new(None, cells.iter().map(cell).collect())))
        }
        Val::None => Ok(Val::Bool(f(f64::NAN))),
        scalar => Ok(Val::Bool(scalar.as_f64().map(&f).unwrap_or(false))),
    }
}

/// Element-wise binary op over scalars or list-likes (Series index kept)
fn zip_cells(a: &Val, b: &Val, f: impl Fn(&Cell, &Cell) -> EvalResult<Cell>) -> EvalResult<Val> {
    if !is_list_like(a) && !is_list_like(b) {
        return Ok(Val::from_cell(&f(&a.expect_cell()?, &b.expect_cell()?)?));
    }
    let template = match (a, b) {
        (Val::Series(s), _) | (_, Val::Series(s)) => Some(s.clone()),
        _ => None,
    };
    let len = [a, b]
        .iter()
        .filter(|v| is_list_like(v))
        .map(|v| cells_of(v).map(|c| c.len()))
        .collect::<EvalResult<Vec<_>>>()?
        .into_iter()
        .max()
        .unwrap_or(0);
    let expand = |v: &Val| -> EvalResult<Vec<Cell>> {
        if is_list_like(v) {
            let cells = cells_of(v)?;
            if cells.len() != len {
                return raise(
                    ExcKind::ValueError,
                    format!("operands could not be broadcast together with shapes ({},) ({},)", cells.len(), len),
                );
            }
            Ok(cells)
        } else {
            Ok(vec![v.expect_cell()?; len])
        }
    };
    let (xs, ys) = (expand(a)?, expand(b)?);
    let values = xs.iter().zip(&ys).map(|(x, y)| f(x, y)).collect::<EvalResult<Vec<_>>>()?;
    Ok(Val::series(match template {
        Some(s) => s.map_values(values),
        None => Series::new(None, values),
    }))
}

fn array(values: Vec<Cell>) -> Val {
    Val::series(Series::new(None, values))
}

fn floats(xs: impl IntoIterator<Item = f64>) -> Vec<Cell> {
    xs.into_iter().map(Cell::Float).collect()
}

fn present_numbers(cells: &[Cell]) -> Vec<f64> {
    cells
        .iter()
        .filter(|c| !c.is_missing())
        .filter_map(Cell::as_f64)
        .filter(|x| !x.is_nan())
        .collect()
}

/* ===================== Dispatch ===================== */

pub fn call_function(interp: &mut Interpreter, module: &Val, name: &str, args: Args) -> EvalResult<Val> {
    if matches!(module, Val::Module(Module::Math)) {
        return math_function(name, &args);
    }
    let first = || args.required(0, "a", name);
    match name {
        "abs" | "absolute" => map_numeric(first()?, f64::abs),
        "sqrt" => map_numeric(first()?, f64::sqrt),
        "square" => map_numeric(first()?, |x| x * x),
        "cbrt" => map_numeric(first()?, f64::cbrt),
        "exp" => map_numeric(first()?, f64::exp),
        "log" => map_numeric(first()?, f64::ln),
        "log10" => map_numeric(first()?, f64::log10),
        "log2" => map_numeric(first()?, f64::log2),
        "log1p" => map_numeric(first()?, f64::ln_1p),
        "floor" => map_numeric(first()?, f64::floor),
        "ceil" => map_numeric(first()?, f64::ceil),
        "trunc" => map_numeric(first()?, f64::trunc),
        "sin" => map_numeric(first()?, f64::sin),
        "cos" => map_numeric(first()?, f64::cos),
        "tan" => map_numeric(first()?, f64::tan),
        "arcsin" => map_numeric(first()?, f64::asin),
        "arccos" => map_numeric(first()?, f64::acos),
        "arctan" => map_numeric(first()?, f64::atan),
        "radians" | "deg2rad" => map_numeric(first()?, f64::to_radians),
        "degrees" | "rad2deg" => map_numeric(first()?, f64::to_degrees),
        "sign" => map_numeric(first()?, |x| if x == 0.0 || x.is_nan() { x } else { x.signum() }),
        "isnan" => map_predicate(first()?, f64::is_nan),
        "isfinite" => map_predicate(first()?, f64::is_finite),
        "isinf" => map_predicate(first()?, f64::is_infinite),
        "arctan2" | "hypot" | "power" => {
            let b = args.required(1, "b", name)?;
            zip_cells(first()?, b, |x, y| match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) if !x.is_nan() && !y.is_nan() => Ok(Cell::Float(match name {
                    "arctan2" => x.atan2(y),
                    "hypot" => x.hypot(y),
                    _ => x.powf(y),
                })),
                _ => Ok(Cell::Null),
            })
        }
        "floor_divide" => {
            let b = args.required(1, "b", name)?;
            zip_cells(first()?, b, |x, y| binary_cell(BinaryOp::FloorDiv, x, y))
        }
        "maximum" | "minimum" => {
            let b = args.required(1, "b", name)?;
            let want_max = name == "maximum";
            zip_cells(first()?, b, |x, y| {
                if x.is_missing() || y.is_missing() {
                    return Ok(Cell::Null);
                }
                let x_wins = compare_cells(if want_max { CompareOp::Ge } else { CompareOp::Le }, x, y)?;
                Ok(if x_wins { x.clone() } else { y.clone() })
            })
        }
        "round" | "around" => {
            let digits = args.int_opt(1, "decimals")?.unwrap_or(0);
            match first()? {
                Val::Int(n) => Ok(Val::Int(*n)),
                Val::Float(x) => Ok(Val::Float(builtins::py_round(*x, digits))),
                Val::List(_) | Val::Tuple(_) => {
                    let cells = cells_of(first()?)?;
                    let series = Series::new(None, cells);
                    Ok(Val::series(pandas::series::round(&series, digits)))
                }
                other => builtins::round_value(other, Some(digits)),
            }
        }
        "clip" => {
            let lower = args.float_opt(1, "a_min")?;
            let upper = args.float_opt(2, "a_max")?;
            match first()? {
                scalar if !is_list_like(scalar) && !matches!(scalar, Val::Frame(_)) => {
                    let cell = pandas::series::clip_cell(&scalar.expect_cell()?, lower, upper);
                    Ok(Val::from_cell(&cell))
                }
                value => {
                    let cells = cells_of(value)?;
                    let clipped = cells.iter().map(|c| pandas::series::clip_cell(c, lower, upper)).collect();
                    Ok(match value {
                        Val::Series(s) => Val::series(s.map_values(clipped)),
                        _ => array(clipped),
                    })
                }
            }
        }

        // reductions
        reduction @ ("sum" | "mean" | "median" | "std" | "var" | "min" | "max" | "amin" | "amax"
        | "prod" | "nanmean" | "nansum" | "nanmax" | "nanmin" | "nanstd" | "nanmedian"
        | "nanvar") => {
            let base = reduction.trim_start_matches("nan").trim_start_matches('a');
            let ddof = args.int_opt(KW, "ddof")?.unwrap_or(0);
            reduce_value(interp, first()?, base, reduction.starts_with("nan"), ddof)
        }
        "average" => {
            let values = cells_of(first()?)?;
            match args.given(1, "weights") {
                Some(weights) => {
                    let weights = cells_of(weights)?;
                    let (mut total, mut weight) = (0.0, 0.0);
                    for (v, w) in values.iter().zip(&weights) {
                        if let (Some(v), Some(w)) = (v.as_f64(), w.as_f64()) {
                            total += v * w;
                            weight += w;
                        }
                    }
                    if weight == 0.0 {
                        return raise(ExcKind::ZeroDivisionError, "Weights sum to zero, can't be normalized");
                    }
                    Ok(Val::Float(total / weight))
                }
                None => Ok(Val::from_cell(&reductions::reduce("mean", &values, Options { skipna: false, ddof: 0 })?)),
            }
        }
        "percentile" | "nanpercentile" | "quantile" => {
            let xs = present_numbers(&cells_of(first()?)?);
            let scale = if name == "quantile" { 1.0 } else { 100.0 };
            let q = args.required(1, "q", name)?;
            if is_list_like(q) {
                let qs = cells_of(q)?;
                let out = qs
                    .iter()
                    .map(|q| Cell::Float(reductions::quantile(&xs, q.as_f64().unwrap_or(0.0) / scale)))
                    .collect();
                return Ok(array(out));
            }
            Ok(Val::Float(reductions::quantile(&xs, number(q, name)? / scale)))
        }
        "argmax" | "argmin" => {
            let cells = cells_of(first()?)?;
            match pandas::series::arg_extreme(&cells, name == "argmax") {
                Some(pos) => Ok(Val::Int(pos as i64)),
                None => raise(ExcKind::ValueError, format!("attempt to get {} of an empty sequence", name)),
            }
        }
        "count_nonzero" => {
            let cells = cells_of(first()?)?;
            let count = cells
                .iter()
                .filter(|c| match c {
                    Cell::Bool(b) => *b,
                    other => other.as_f64().map(|x| x != 0.0).unwrap_or(!other.is_missing()),
                })
                .count();
            Ok(Val::Int(count as i64))
        }
        "allclose" | "isclose" => {
            let b = args.required(1, "b", name)?;
            let rtol = args.float_opt(KW, "rtol")?.unwrap_or(1e-5);
            let atol = args.float_opt(KW, "atol")?.unwrap_or(1e-8);
            let close = zip_cells(first()?, b, |x, y| {
                Ok(Cell::Bool(match (x.as_f64(), y.as_f64()) {
                    (Some(x), Some(y)) => (x - y).abs() <= atol + rtol * y.abs(),
                    _ => false,
                }))
            })?;
            if name == "isclose" {
                return Ok(close);
            }
            let flags = cells_of(&close)?;
            Ok(Val::Bool(flags.iter().all(|c| matches!(c, Cell::Bool(true)))))
        }

        // sequences
        "cumsum" | "cumprod" => {
            let value = first()?;
            let cells = cells_of(value)?;
            let out = pandas::series::cumulative(name, &cells)?;
            Ok(match value {
                Val::Series(s) => Val::series(s.map_values(out)),
                _ => array(out),
            })
        }
        "diff" => {
            let cells = cells_of(first()?)?;
            let n = args.int_opt(KW, "n")?.unwrap_or(1).max(1);
            let mut current = cells;
            for _ in 0..n {
                current = current
                    .windows(2)
                    .map(|w| binary_cell(BinaryOp::Sub, &w[1], &w[0]))
                    .collect::<EvalResult<Vec<_>>>()?;
            }
            Ok(array(current))
        }
        "sort" => {
            let cells = cells_of(first()?)?;
            let order = pandas::series::sort_positions(&cells, true);
            Ok(array(order.into_iter().map(|i| cells[i].clone()).collect()))
        }
        "argsort" => {
            let cells = cells_of(first()?)?;
            let order = pandas::series::sort_positions(&cells, true);
            Ok(array(order.into_iter().map(|i| Cell::Int(i as i64)).collect()))
        }
        "unique" => {
            let cells = cells_of(first()?)?;
            let refs: Vec<&Cell> = cells.iter().collect();
            let mut distinct = reductions::distinct(&refs);
            distinct.sort_by(|a, b| a.sort_cmp(b));
            Ok(array(distinct))
        }
        "concatenate" | "append" => {
            let parts: Vec<Val> = if name == "append" {
                vec![first()?.clone(), args.required(1, "values", name)?.clone()]
            } else {
                match first()? {
                    Val::List(items) => items.borrow().clone(),
                    Val::Tuple(items) => items.as_ref().clone(),
                    other => vec![other.clone()],
                }
            };
            let mut out = Vec::new();
            for part in &parts {
                out.extend(cells_of(part)?);
            }
            interp.check_len(out.len())?;
            Ok(array(out))
        }
        "where" => where_function(&args),
        "select" => select_function(&args),

        // construction
        "array" | "asarray" => {
            let value = first()?;
            match value {
                Val::Series(s) => Ok(array(s.values.clone())),
                Val::List(items) if items.borrow().iter().any(|v| matches!(v, Val::List(_))) => Ok(value.clone()),
                _ => Ok(array(cells_of(value)?)),
            }
        }
        "arange" => {
            let (start, stop) = match args.given(1, "stop") {
                Some(stop) => (number(first()?, name)?, number(stop, name)?),
                None => (0.0, number(first()?, name)?),
            };
            let step = args.float_opt(2, "step")?.unwrap_or(1.0);
            if step == 0.0 {
                return raise(ExcKind::ZeroDivisionError, "division by zero");
            }
            let count = ((stop - start) / step).ceil().max(0.0) as usize;
            interp.check_len(count)?;
            let integral = [args.get(0, "start"), args.get(1, "stop"), args.get(2, "step")]
                .iter()
                .flatten()
                .all(|v| matches!(v, Val::Int(_)));
            let values = (0..count).map(|i| {
                let x = start + step * i as f64;
                if integral {
                    Cell::Int(x as i64)
                } else {
                    Cell::Float(x)
                }
            });
            Ok(array(values.collect()))
        }
        "linspace" => {
            let start = number(first()?, name)?;
            let stop = number(args.required(1, "stop", name)?, name)?;
            let num = args.usize_or(2, "num", 50)?;
            interp.check_len(num)?;
            let step = if num > 1 { (stop - start) / (num - 1) as f64 } else { 0.0 };
            Ok(array(floats((0..num).map(|i| start + step * i as f64))))
        }
        "zeros" | "ones" | "full" => {
            let len = match first()? {
                Val::Tuple(dims) => dims.first().and_then(Val::as_i64).unwrap_or(0),
                other => other.as_i64().unwrap_or(0),
            }
            .max(0) as usize;
            interp.check_len(len)?;
            let fill = match name {
                "zeros" => Cell::Float(0.0),
                "ones" => Cell::Float(1.0),
                _ => args.required(1, "fill_value", name)?.expect_cell()?,
            };
            Ok(array(vec![fill; len]))
        }

        // fitting
        "polyfit" => {
            let xs = cells_of(first()?)?;
            let ys = cells_of(args.required(1, "y", name)?)?;
            let degree = args.usize_or(2, "deg", 1)?;
            let points: Vec<(f64, f64)> = xs
                .iter()
                .zip(&ys)
                .filter_map(|(x, y)| Some((x.as_f64()?, y.as_f64()?)))
                .filter(|(x, y)| !x.is_nan() && !y.is_nan())
                .collect();
            match polyfit(&points, degree) {
                Some(coefficients) => Ok(array(floats(coefficients))),
                None => raise(ExcKind::ValueError, "SVD did not converge in Linear Least Squares"),
            }
        }
        "polyval" => {
            let coefficients: Vec<f64> = cells_of(first()?)?.iter().filter_map(Cell::as_f64).collect();
            map_numeric(args.required(1, "x", name)?, |x| {
                coefficients.iter().fold(0.0, |acc, c| acc * x + c)
            })
        }
        "corrcoef" => {
            let xs = cells_of(first()?)?;
            let ys = cells_of(args.required(1, "y", name)?)?;
            let r = reductions::correlation(&xs, &ys);
            Ok(Val::list(vec![
                Val::list(vec![Val::Float(1.0), Val::Float(r)]),
                Val::list(vec![Val::Float(r), Val::Float(1.0)]),
            ]))
        }
        "interp" => {
            let xp: Vec<f64> = cells_of(args.required(1, "xp", name)?)?.iter().filter_map(Cell::as_f64).collect();
            let fp: Vec<f64> = cells_of(args.required(2, "fp", name)?)?.iter().filter_map(Cell::as_f64).collect();
            if xp.len() != fp.len() || xp.is_empty() {
                return raise(ExcKind::ValueError, "fp and xp are not of the same length.");
            }
            map_numeric(first()?, |x| interpolate(&xp, &fp, x))
        }
        "histogram" => {
            let xs = present_numbers(&cells_of(first()?)?);
            let bins = args.usize_or(KW, "bins", 10)?.max(1);
            let (counts, edges) = histogram(&xs, bins);
            Ok(Val::tuple(vec![
                array(counts.into_iter().map(|n| Cell::Int(n as i64)).collect()),
                array(floats(edges)),
            ]))
        }
        "digitize" => {
            let edges: Vec<f64> = cells_of(args.required(1, "bins", name)?)?.iter().filter_map(Cell::as_f64).collect();
            let cells = cells_of(first()?)?;
            let out = cells
                .iter()
                .map(|c| match c.as_f64() {
                    Some(x) => Cell::Int(edges.iter().filter(|&&e| e <= x).count() as i64),
                    None => Cell::Null,
                })
                .collect();
            Ok(array(out))
        }

        // scalar types
        "float64" | "float32" | "float_" => builtins::to_float(args.get(0, "x").unwrap_or(&Val::Float(0.0))),
        "int64" | "int32" | "int_" => builtins::to_int(args.get(0, "x").unwrap_or(&Val::Int(0))),
        "bool_" => Ok(Val::Bool(args.get(0, "x").map(Val::truthy).transpose()?.unwrap_or(false))),
        "object_" => Ok(args.get(0, "x").cloned().unwrap_or(Val::None)),
        "datetime64" => match first()? {
            Val::Str(text) => match parse_datetime(text) {
                Some(t) => Ok(Val::Time(t)),
                None => raise(ExcKind::ValueError, format!("Error parsing datetime string \"{}\"", text)),
            },
            other => datetime::coerce_time(other).map(Val::Time),
        },
        "timedelta64" => {
            let amount = number(first()?, name)?;
            let unit = args.str_opt(1, "unit")?.unwrap_or_else(|| "s".to_string());
            match datetime::unit_seconds(&unit) {
                Some(seconds) => Ok(Val::Delta((amount * seconds).round() as i64)),
                None => raise(ExcKind::ValueError, format!("Invalid datetime unit \"{}\"", unit)),
            }
        }
        "random.seed" => Ok(Val::None),
        random if random.starts_with("random.") => raise(
            ExcKind::NotImplementedError,
            "random sampling is not available in the analysis sandbox",
        ),
        other => raise(
            ExcKind::AttributeError,
            format!("module 'numpy' has no attribute '{}'", other),
        ),
    }
}

/// `np.mean(x)` and friends; pandas objects keep their own reductions
fn reduce_value(interp: &mut Interpreter, value: &Val, name: &str, skipna: bool, ddof: i64) -> EvalResult<Val> {
    match value {
        Val::Series(_) | Val::Frame(_) => {
            let mut args = Args::default();
            if matches!(name, "std" | "var") {
                args.keywords.push(("ddof".to_string(), Val::Int(ddof)));
            }
            let method = Val::method(value.clone(), name);
            interp.call_value(&method, args)
        }
        other => {
            let cells = cells_of(other)?;
            let opts = Options { skipna, ddof };
            let has_nan = cells.iter().any(|c| c.is_missing() || c.as_f64().map(f64::is_nan).unwrap_or(false));
            if has_nan && !skipna && cells.iter().all(|c| c.is_missing() || c.is_numeric()) {
                return Ok(Val::Float(f64::NAN));
            }
            if cells.is_empty() && matches!(name, "min" | "max") {
                return raise(ExcKind::ValueError, "zero-size array to reduction operation which has no identity");
            }
            Ok(Val::from_cell(&reductions::reduce(name, &cells, opts)?))
        }
    }
}

fn where_function(args: &Args) -> EvalResult<Val> {
    let condition = args.required(0, "condition", "where")?;
    let flags = cells_of(condition)?;
    let Some(when_true) = args.get(1, "x") else {
        let positions = flags
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Cell::Bool(true)))
            .map(|(i, _)| Cell::Int(i as i64))
            .collect();
        return Ok(Val::tuple(vec![array(positions)]));
    };
    let when_false = args.required(2, "y", "where")?;
    let pick = |value: &Val| -> EvalResult<Vec<Cell>> {
        if is_list_like(value) {
            let cells = cells_of(value)?;
            if cells.len() != flags.len() {
                return raise(ExcKind::ValueError, "operands could not be broadcast together");
            }
            Ok(cells)
        } else {
            Ok(vec![value.expect_cell()?; flags.len()])
        }
    };
    let (xs, ys) = (pick(when_true)?, pick(when_false)?);
    if !is_list_like(condition) {
        let chosen = if condition.truthy()? { &xs } else { &ys };
        return Ok(Val::from_cell(&chosen[0]));
    }
    let values = flags
        .iter()
        .zip(xs.into_iter().zip(ys))
        .map(|(flag, (x, y))| if matches!(flag, Cell::Bool(true)) { x } else { y })
        .collect();
    Ok(match condition {
        Val::Series(s) => Val::series(Series { name: None, ..s.map_values(values) }),
        _ => array(values),
    })
}

fn select_function(args: &Args) -> EvalResult<Val> {
    let conditions = super::sequence(args.required(0, "condlist", "select")?).unwrap_or_default();
    let choices = super::sequence(args.required(1, "choicelist", "select")?).unwrap_or_default();
    if conditions.len() != choices.len() {
        return raise(ExcKind::ValueError, "list of cases must be same length as list of conditions");
    }
    let default = args.get(2, "default").cloned().unwrap_or(Val::Int(0)).expect_cell()?;
    let Some(first) = conditions.first() else {
        return Ok(array(Vec::new()));
    };
    let len = cells_of(first)?.len();
    let mut out = vec![None; len];
    for (condition, choice) in conditions.iter().zip(&choices) {
        let flags = cells_of(condition)?;
        let values = if is_list_like(choice) {
            cells_of(choice)?
        } else {
            vec![choice.expect_cell()?; len]
        };
        for (i, slot) in out.iter_mut().enumerate() {
            if slot.is_none() && matches!(flags.get(i), Some(Cell::Bool(true))) {
                *slot = values.get(i).cloned();
            }
        }
    }
    let values: Vec<Cell> = out.into_iter().map(|v| v.unwrap_or_else(|| default.clone())).collect();
    Ok(match first {
        Val::Series(s) => Val::series(Series { name: None, ..s.map_values(values) }),
        _ => array(values),
    })
}

/* ===================== Numerics ===================== */

/// Least-squares polynomial coefficients, highest power first
pub fn polyfit(points: &[(f64, f64)], degree: usize) -> Option<Vec<f64>> {
    let n = degree + 1;
    if points.len() < n {
        return None;
    }
    // normal equations: (AᵀA) c = Aᵀy with A[i][j] = x_i^j
    let mut matrix = vec![vec![0.0; n + 1]; n];
    for &(x, y) in points {
        let powers: Vec<f64> = (0..2 * n).map(|p| x.powi(p as i32)).collect();
        for row in 0..n {
            for col in 0..n {
                matrix[row][col] += powers[row + col];
            }
            matrix[row][n] += y * powers[row];
        }
    }
    for col in 0..n {
        let pivot = (col..n).max_by(|&a, &b| matrix[a][col].abs().total_cmp(&matrix[b][col].abs()))?;
        if matrix[pivot][col].abs() < 1e-12 {
            return None;
        }
        matrix.swap(col, pivot);
        for row in 0..n {
            if row != col {
                let factor = matrix[row][col] / matrix[col][col];
                for k in col..=n {
                    matrix[row][k] -= factor * matrix[col][k];
                }
            }
        }
    }
    let ascending: Vec<f64> = (0..n).map(|i| matrix[i][n] / matrix[i][i]).collect();
    Some(ascending.into_iter().rev().collect())
}

fn interpolate(xp: &[f64], fp: &[f64], x: f64) -> f64 {
    if x <= xp[0] {
        return fp[0];
    }
    for i in 1..xp.len() {
        if x <= xp[i] {
            let t = (x - xp[i - 1]) / (xp[i] - xp[i - 1]);
            return fp[i - 1] + t * (fp[i] - fp[i - 1]);
        }
    }
    fp[fp.len() - 1]
}

pub fn histogram(xs: &[f64], bins: usize) -> (Vec<usize>, Vec<f64>) {
    let (lo, hi) = xs.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
    let (lo, hi) = if xs.is_empty() {
        (0.0, 1.0)
    } else if lo == hi {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    };
    let width = (hi - lo) / bins as f64;
    let edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();
    let mut counts = vec![0; bins];
    for &x in xs {
        let slot = (((x - lo) / width) as usize).min(bins - 1);
        counts[slot] += 1;
    }
    (counts, edges)
}

/* ===================== math ===================== */

fn math_function(name: &str, args: &Args) -> EvalResult<Val> {
    let x = || -> EvalResult<f64> { number(args.required(0, "x", name)?, name) };
    let domain = |value: f64| -> EvalResult<Val> {
        if value.is_nan() {
            raise(ExcKind::ValueError, "math domain error")
        } else {
            Ok(Val::Float(value))
        }
    };
    let to_int = |value: f64| -> EvalResult<Val> {
        if !value.is_finite() {
            return raise(ExcKind::ValueError, "cannot convert float NaN or infinity to integer");
        }
        Ok(Val::Int(value as i64))
    };
    match name {
        "sqrt" => {
            let v = x()?;
            if v < 0.0 {
                return raise(ExcKind::ValueError, "math domain error");
            }
            Ok(Val::Float(v.sqrt()))
        }
        "floor" => match args.required(0, "x", name)? {
            Val::Int(n) => Ok(Val::Int(*n)),
            _ => to_int(x()?.floor()),
        },
        "ceil" => match args.required(0, "x", name)? {
            Val::Int(n) => Ok(Val::Int(*n)),
            _ => to_int(x()?.ceil()),
        },
        "trunc" => to_int(x()?.trunc()),
        "log" => {
            let v = x()?;
            if v <= 0.0 {
                return raise(ExcKind::ValueError, "math domain error");
            }
            match args.float_opt(1, "base")? {
                Some(base) => domain(v.ln() / base.ln()),
                None => Ok(Val::Float(v.ln())),
            }
        }
        "log10" | "log2" | "log1p" => {
            let v = x()?;
            let out = match name {
                "log10" => v.log10(),
                "log2" => v.log2(),
                _ => v.ln_1p(),
            };
            if out.is_nan() || out.is_infinite() {
                return raise(ExcKind::ValueError, "math domain error");
            }
            Ok(Val::Float(out))
        }
        "exp" => Ok(Val::Float(x()?.exp())),
        "sin" => Ok(Val::Float(x()?.sin())),
        "cos" => Ok(Val::Float(x()?.cos())),
        "tan" => Ok(Val::Float(x()?.tan())),
        "asin" => domain(x()?.asin()),
        "acos" => domain(x()?.acos()),
        "atan" => Ok(Val::Float(x()?.atan())),
        "atan2" | "hypot" | "pow" => {
            let y = number(args.required(1, "y", name)?, name)?;
            let v = x()?;
            Ok(Val::Float(match name {
                "atan2" => v.atan2(y),
                "hypot" => v.hypot(y),
                _ => v.powf(y),
            }))
        }
        "radians" => Ok(Val::Float(x()?.to_radians())),
        "degrees" => Ok(Val::Float(x()?.to_degrees())),
        "fabs" => Ok(Val::Float(x()?.abs())),
        "isnan" => Ok(Val::Bool(x()?.is_nan())),
        "isinf" => Ok(Val::Bool(x()?.is_infinite())),
        "isfinite" => Ok(Val::Bool(x()?.is_finite())),
        "isclose" => {
            let a = x()?;
            let b = number(args.required(1, "b", name)?, name)?;
            let rel = args.float_opt(KW, "rel_tol")?.unwrap_or(1e-9);
            let abs = args.float_opt(KW, "abs_tol")?.unwrap_or(0.0);
            Ok(Val::Bool((a - b).abs() <= (rel * a.abs().max(b.abs())).max(abs)))
        }
        "fsum" => {
            let cells = cells_of(args.required(0, "seq", name)?)?;
            Ok(Val::Float(cells.iter().filter_map(Cell::as_f64).sum()))
        }
        "factorial" => match args.required(0, "x", name)?.as_i64() {
            Some(n) if (0..=20).contains(&n) => Ok(Val::Int((1..=n).product::<i64>().max(1))),
            Some(n) if n < 0 => raise(ExcKind::ValueError, "factorial() not defined for negative values"),
            _ => raise(ExcKind::ArithmeticError, "factorial result too large"),
        },
        "gcd" => {
            let mut a = args.int_opt(0, "a")?.unwrap_or(0).unsigned_abs();
            let mut b = args.int_opt(1, "b")?.unwrap_or(0).unsigned_abs();
            while b != 0 {
                (a, b) = (b, a % b);
            }
            checked_int(i64::try_from(a).ok()).map(Val::Int)
        }
        other => raise(
            ExcKind::AttributeError,
            format!("module 'math' has no attribute '{}'", other),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polyfit_recovers_a_line() {
        let points = vec![(0.0, 1.0), (1.0, 3.0), (2.0, 5.0), (3.0, 7.0)];
        let coefficients = polyfit(&points, 1).unwrap();
        assert!((coefficients[0] - 2.0).abs() < 1e-9);
        assert!((coefficients[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_polyfit_needs_enough_points() {
        assert!(polyfit(&[(1.0, 1.0)], 1).is_none());
    }

    #[test]
    fn test_histogram_counts_the_last_edge() {
        let (counts, edges) = histogram(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(counts, vec![1, 1, 2]);
        assert_eq!(edges.len(), 4);
    }

    #[test]
    fn test_math_floor_returns_int() {
        match math_function("floor", &Args::new(vec![Val::Float(2.7)])).unwrap() {
            Val::Int(n) => assert_eq!(n, 2),
            other => panic!("Expected int, got {:?}", other),
        }
        match math_function("sqrt", &Args::new(vec![Val::Float(-1.0)])) {
            Err(crate::sandbox::types::Unwind::Raise(exc)) => assert_eq!(exc.kind, ExcKind::ValueError),
            other => panic!("Expected ValueError, got {:?}", other),
        }
    }

    #[test]
    fn test_interpolate_clamps_at_the_ends() {
        let xp = [0.0, 10.0];
        let fp = [0.0, 100.0];
        assert_eq!(interpolate(&xp, &fp, 5.0), 50.0);
        assert_eq!(interpolate(&xp, &fp, -1.0), 0.0);
        assert_eq!(interpolate(&xp, &fp, 11.0), 100.0);
    }
}
