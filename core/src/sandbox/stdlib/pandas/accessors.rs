//! `.dt`, `.str` and `.rolling(...)` on Series and DataFrames

use super::reductions::{self, Options};
use super::table_result;
use crate::sandbox::interpreter::Interpreter;
use crate::sandbox::stdlib::{datetime, no_attribute, strings, Args, KW};
use crate::sandbox::types::{raise, Accessor, AccessorKind, EvalResult, ExcKind, Val};
use crate::table::{midnight, Cell, Column, DataFrame, Dtype, Series};
use regex::{Regex, RegexBuilder};
use std::rc::Rc;

const DT_METHODS: [&str; 12] = [
    "strftime", "day_name", "month_name", "normalize", "floor", "ceil", "round", "to_period",
    "total_seconds", "isocalendar", "tz_localize", "tz_convert",
];

const STR_METHODS: [&str; 34] = [
    "contains", "match", "fullmatch", "extract", "replace", "len", "get", "slice", "split",
    "strip", "lstrip", "rstrip", "lower", "upper", "title", "capitalize", "swapcase", "zfill",
    "startswith", "endswith", "isdigit", "isnumeric", "isalpha", "isalnum", "isspace", "find",
    "count", "pad", "center", "ljust", "rjust", "cat", "join", "casefold",
];

const ROLLING_METHODS: [&str; 9] = [
    "mean", "sum", "min", "max", "std", "var", "median", "count", "apply",
];

fn target_series(accessor: &Accessor) -> EvalResult<&Rc<Series>> {
    match &accessor.target {
        Val::Series(series) => Ok(series),
        other => raise(
            ExcKind::AttributeError,
            format!("'{}' object has no accessor here", other.type_name()),
        ),
    }
}

/* ===================== Attributes ===================== */

pub fn attr(accessor: &Rc<Accessor>, receiver: &Val, attr: &str) -> EvalResult<Val> {
    match accessor.kind {
        AccessorKind::Dt if DT_METHODS.contains(&attr) => Ok(Val::method(receiver.clone(), attr)),
        AccessorKind::Dt => {
            let series = target_series(accessor)?;
            let mut values = Vec::with_capacity(series.len());
            for cell in &series.values {
                let field = match cell {
                    Cell::Time(t) => datetime::time_field(t, attr),
                    Cell::Date(d) => datetime::time_field(&midnight(*d), attr),
                    Cell::Delta(s) => datetime::delta_field(*s, attr),
                    _ => Some(Cell::Null),
                };
                match field {
                    Some(value) => values.push(value),
                    None => return no_attribute(receiver, attr),
                }
            }
            Ok(Val::series(series.map_values(values)))
        }
        AccessorKind::Str if STR_METHODS.contains(&attr) => Ok(Val::method(receiver.clone(), attr)),
        AccessorKind::Rolling { .. } if ROLLING_METHODS.contains(&attr) => {
            Ok(Val::method(receiver.clone(), attr))
        }
        _ => no_attribute(receiver, attr),
    }
}

/* ===================== Methods ===================== */

pub fn call(interp: &mut Interpreter, accessor: &Rc<Accessor>, name: &str, args: Args) -> EvalResult<Val> {
    match accessor.kind {
        AccessorKind::Dt => dt_call(target_series(accessor)?, name, args),
        AccessorKind::Str => str_call(interp, target_series(accessor)?, name, args),
        AccessorKind::Rolling { window, min_periods } => {
            rolling_call(interp, &accessor.target, window, min_periods, name, &args)
        }
        _ => raise(ExcKind::TypeError, "'accessor' object is not callable"),
    }
}

fn dt_call(series: &Rc<Series>, name: &str, args: Args) -> EvalResult<Val> {
    match name {
        "tz_localize" | "tz_convert" => Ok(Val::Series(series.clone())),
        "isocalendar" => {
            let mut year = Vec::with_capacity(series.len());
            let mut week = Vec::with_capacity(series.len());
            let mut day = Vec::with_capacity(series.len());
            for cell in &series.values {
                match Val::from_cell(cell) {
                    value @ (Val::Time(_) | Val::Date(_)) => {
                        let parts = match datetime::call_method(&value, "isocalendar", Args::default())? {
                            Val::Tuple(parts) => parts,
                            _ => Rc::new(Vec::new()),
                        };
                        let part = |i: usize| parts.get(i).and_then(Val::to_cell).unwrap_or(Cell::Null);
                        year.push(part(0));
                        week.push(part(1));
                        day.push(part(2));
                    }
                    _ => {
                        year.push(Cell::Null);
                        week.push(Cell::Null);
                        day.push(Cell::Null);
                    }
                }
            }
            let frame = DataFrame::with_index(
                vec![
                    Column::new("year", year),
                    Column::new("week", week),
                    Column::new("day", day),
                ],
                series.index.clone(),
                series.index_names.clone(),
            );
            Ok(Val::frame(table_result(frame)?))
        }
        _ => {
            let mut values = Vec::with_capacity(series.len());
            for cell in &series.values {
                if cell.is_missing() {
                    values.push(Cell::Null);
                    continue;
                }
                let result = datetime::call_method(&Val::from_cell(cell), name, args.clone())?;
                values.push(result.expect_cell()?);
            }
            Ok(Val::series(series.map_values(values)))
        }
    }
}

/* ===================== .str ===================== */

fn pattern(args: &Args, case_default: bool) -> EvalResult<Regex> {
    let pat = args.str_opt(0, "pat")?.unwrap_or_default();
    let literal = !args.bool_or(KW, "regex", true)?;
    let source = if literal { regex::escape(&pat) } else { pat };
    let case = args.bool_or(KW, "case", case_default)?;
    RegexBuilder::new(&source)
        .case_insensitive(!case)
        .build()
        .or_else(|err| raise(ExcKind::ValueError, format!("invalid regular expression: {}", err)))
}

fn str_call(interp: &mut Interpreter, series: &Rc<Series>, name: &str, args: Args) -> EvalResult<Val> {
    let na = args.given(KW, "na").map(Val::expect_cell).transpose()?;
    let expand = name == "split" && args.bool_or(KW, "expand", false)?;
    let texts: Vec<Option<&str>> = series.values.iter().map(Cell::as_str).collect();
    let map = |f: &mut dyn FnMut(&str) -> EvalResult<Cell>| -> EvalResult<Val> {
        let mut values = Vec::with_capacity(texts.len());
        for text in &texts {
            values.push(match text {
                Some(s) => f(s)?,
                None => na.clone().unwrap_or(Cell::Null),
            });
        }
        Ok(Val::series(series.map_values(values)))
    };

    match name {
        "contains" => {
            let re = pattern(&args, true)?;
            map(&mut |s| Ok(Cell::Bool(re.is_match(s))))
        }
        "match" | "fullmatch" => {
            let re = pattern(&args, true)?;
            let full = name == "fullmatch";
            map(&mut |s| {
                Ok(Cell::Bool(match re.find(s) {
                    Some(m) => m.start() == 0 && (!full || m.end() == s.len()),
                    None => false,
                }))
            })
        }
        "extract" => {
            let re = pattern(&args, true)?;
            let groups = re.captures_len().saturating_sub(1).max(1);
            let mut columns: Vec<Vec<Cell>> = vec![Vec::with_capacity(texts.len()); groups];
            for text in &texts {
                let caps = text.and_then(|s| re.captures(s));
                for (g, column) in columns.iter_mut().enumerate() {
                    let found = caps
                        .as_ref()
                        .and_then(|c| c.get(g + 1).or_else(|| c.get(0)))
                        .map(|m| Cell::Str(m.as_str().to_string()))
                        .unwrap_or(Cell::Null);
                    column.push(found);
                }
            }
            if groups == 1 && args.bool_or(KW, "expand", true)? {
                let names: Vec<String> = re
                    .capture_names()
                    .skip(1)
                    .map(|n| n.map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .unwrap_or_else(|| vec!["0".to_string()]);
                let column = Column::new(names.into_iter().next().unwrap_or_default(), columns.remove(0));
                return Ok(Val::frame(table_result(DataFrame::with_index(vec![column], series.index.clone(), series.index_names.clone()))?));
            }
            if groups == 1 {
                return Ok(Val::series(series.map_values(columns.remove(0))));
            }
            let names: Vec<String> = re
                .capture_names()
                .skip(1)
                .enumerate()
                .map(|(i, n)| n.map(str::to_string).unwrap_or_else(|| i.to_string()))
                .collect();
            let columns = names.into_iter().zip(columns).map(|(n, v)| Column::new(n, v)).collect();
            Ok(Val::frame(table_result(DataFrame::with_index(columns, series.index.clone(), series.index_names.clone()))?))
        }
        "replace" => {
            let repl = args.str_opt(1, "repl")?.unwrap_or_default();
            let use_regex = args.bool_or(KW, "regex", false)?;
            let pat = args.str_opt(0, "pat")?.unwrap_or_default();
            if use_regex {
                let re = Regex::new(&pat)
                    .or_else(|err| raise(ExcKind::ValueError, format!("invalid regular expression: {}", err)))?;
                let repl = repl.replace("\\1", "${1}").replace("\\2", "${2}");
                map(&mut |s| Ok(Cell::Str(re.replace_all(s, repl.as_str()).into_owned())))
            } else {
                map(&mut |s| Ok(Cell::Str(s.replace(&pat, &repl))))
            }
        }
        "len" => map(&mut |s| Ok(Cell::Int(s.chars().count() as i64))),
        "get" => {
            let i = args.int_opt(0, "i")?.unwrap_or(0);
            map(&mut |s| {
                let chars: Vec<char> = s.chars().collect();
                Ok(crate::sandbox::stdlib::builtins::normalize_index(i, chars.len())
                    .map(|pos| Cell::Str(chars[pos].to_string()))
                    .unwrap_or(Cell::Null))
            })
        }
        "slice" => {
            let start = args.int_opt(0, "start")?;
            let stop = args.int_opt(1, "stop")?;
            let slice = crate::sandbox::types::SliceVal {
                lower: start.map(Val::Int).unwrap_or(Val::None),
                upper: stop.map(Val::Int).unwrap_or(Val::None),
                step: Val::None,
            };
            map(&mut |s| {
                let chars: Vec<char> = s.chars().collect();
                Ok(Cell::Str(slice.indices(chars.len())?.into_iter().map(|i| chars[i]).collect()))
            })
        }
        "split" if expand => {
            let sep = args.str_opt(0, "pat")?;
            let parts: Vec<Option<Vec<String>>> = texts
                .iter()
                .map(|t| {
                    t.map(|s| match &sep {
                        Some(sep) => s.split(sep.as_str()).map(str::to_string).collect(),
                        None => s.split_whitespace().map(str::to_string).collect(),
                    })
                })
                .collect();
            let width = parts.iter().flatten().map(Vec::len).max().unwrap_or(0);
            let columns = (0..width)
                .map(|i| {
                    Column::new(
                        i.to_string(),
                        parts
                            .iter()
                            .map(|p| {
                                p.as_ref()
                                    .and_then(|p| p.get(i))
                                    .map(|s| Cell::Str(s.clone()))
                                    .unwrap_or(Cell::Null)
                            })
                            .collect(),
                    )
                })
                .collect();
            Ok(Val::frame(table_result(DataFrame::with_index(columns, series.index.clone(), series.index_names.clone()))?))
        }
        "pad" => {
            let width = args.usize_or(0, "width", 0)?;
            let side = args.str_opt(KW, "side")?.unwrap_or_else(|| "left".to_string());
            let fill = args.str_opt(KW, "fillchar")?.and_then(|f| f.chars().next()).unwrap_or(' ');
            map(&mut |s| {
                let missing = width.saturating_sub(s.chars().count());
                let padding: String = std::iter::repeat(fill).take(missing).collect();
                Ok(Cell::Str(if side == "right" {
                    format!("{}{}", s, padding)
                } else {
                    format!("{}{}", padding, s)
                }))
            })
        }
        "cat" => {
            let sep = args.str_opt(KW, "sep")?.unwrap_or_default();
            let joined: Vec<&str> = texts.iter().flatten().copied().collect();
            Ok(Val::Str(joined.join(&sep)))
        }
        // lists out of `split` stay Python lists inside object cells
        "split" => {
            let sep = args.str_opt(0, "pat")?;
            let values = texts
                .iter()
                .map(|t| match t {
                    Some(s) => {
                        let parts: Vec<Cell> = match &sep {
                            Some(sep) => s.split(sep.as_str()).map(|p| Cell::Str(p.to_string())).collect(),
                            None => s.split_whitespace().map(|p| Cell::Str(p.to_string())).collect(),
                        };
                        Cell::Tuple(parts)
                    }
                    None => Cell::Null,
                })
                .collect();
            Ok(Val::series(series.map_values(values)))
        }
        other => {
            let mut values = Vec::with_capacity(texts.len());
            for text in &texts {
                values.push(match text {
                    Some(s) => strings::call_method(interp, s, other, args.clone())?.expect_cell()?,
                    None => na.clone().unwrap_or(Cell::Null),
                });
            }
            Ok(Val::series(series.map_values(values)))
        }
    }
}

/* ===================== Rolling ===================== */

/// Trailing windows over `values`; windows with fewer than `min_periods`
/// present values give a missing result
pub fn rolling_values(
    values: &[Cell],
    window: usize,
    min_periods: usize,
    mut f: impl FnMut(&[Cell]) -> EvalResult<Cell>,
) -> EvalResult<Vec<Cell>> {
    let mut out = Vec::with_capacity(values.len());
    for end in 0..values.len() {
        let start = (end + 1).saturating_sub(window);
        let slice = &values[start..=end];
        let present = slice.iter().filter(|c| !c.is_missing()).count();
        if present < min_periods.max(1) {
            out.push(Cell::Null);
        } else {
            out.push(f(slice)?);
        }
    }
    Ok(out)
}

fn rolling_call(
    interp: &mut Interpreter,
    target: &Val,
    window: usize,
    min_periods: usize,
    name: &str,
    args: &Args,
) -> EvalResult<Val> {
    let func = if name == "apply" {
        Some(args.required(0, "func", "apply")?.clone())
    } else {
        None
    };
    let mut apply_column = |values: &[Cell]| -> EvalResult<Vec<Cell>> {
        rolling_values(values, window, min_periods, |slice| match &func {
            Some(func) => {
                let present: Vec<Cell> = slice.iter().filter(|c| !c.is_missing()).cloned().collect();
                interp.call1(func, Val::series(Series::new(None, present)))?.expect_cell()
            }
            None => reductions::reduce(name, slice, Options::default()),
        })
    };
    match target {
        Val::Series(series) => Ok(Val::series(series.map_values(apply_column(&series.values)?))),
        Val::Frame(frame) => {
            let mut columns = Vec::with_capacity(frame.width());
            for column in &frame.columns {
                if !matches!(Dtype::infer(&column.values), Dtype::Int64 | Dtype::Float64 | Dtype::Bool) {
                    continue;
                }
                columns.push(Column::new(column.name.clone(), apply_column(&column.values)?));
            }
            Ok(Val::frame(table_result(DataFrame::with_index(columns, frame.index.clone(), frame.index_names.clone()))?))
        }
        other => raise(
            ExcKind::TypeError,
            format!("cannot roll over a {}", other.type_name()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_mean_respects_min_periods() {
        let values = vec![Cell::Float(1.0), Cell::Float(2.0), Cell::Float(3.0), Cell::Float(4.0)];
        let out = rolling_values(&values, 2, 2, |w| reductions::reduce("mean", w, Options::default())).unwrap();
        assert_eq!(out, vec![Cell::Null, Cell::Float(1.5), Cell::Float(2.5), Cell::Float(3.5)]);
    }

    #[test]
    fn test_rolling_with_short_min_periods() {
        let values = vec![Cell::Int(1), Cell::Int(2), Cell::Int(3)];
        let out = rolling_values(&values, 3, 1, |w| reductions::reduce("sum", w, Options::default())).unwrap();
        assert_eq!(out, vec![Cell::Int(1), Cell::Int(3), Cell::Int(6)]);
    }
}
