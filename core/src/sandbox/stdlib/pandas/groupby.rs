//! `groupby` and `resample`: split rows by key, apply, combine

use super::reductions::{self, Options};
use super::{add_months, names, reduce_options, series as series_ops, table_result};
use crate::sandbox::interpreter::Interpreter;
use crate::sandbox::stdlib::{no_attribute, Args, KW};
use crate::sandbox::types::{raise, EvalResult, ExcKind, Exception, GroupBy, Selection, Val};
use crate::table::format::label_text;
use crate::table::{group_rows, midnight, Cell, Column, DataFrame, Dtype, Series};
use chrono::{Datelike, Days, Duration, NaiveDate, NaiveDateTime};
use std::rc::Rc;

/// Upper bound on empty resample bins filled between the first and last row
const MAX_BINS: usize = 100_000;

const METHODS: [&str; 28] = [
    "sum", "mean", "median", "min", "max", "std", "var", "count", "nunique", "prod", "first",
    "last", "size", "sem", "agg", "aggregate", "apply", "transform", "head", "tail",
    "get_group", "cumsum", "cumcount", "shift", "diff", "idxmax", "idxmin", "quantile",
];

/* ===================== Construction ===================== */

/// `df.groupby(by)` / `df.groupby(level=0)`
pub fn group_frame(frame: &Rc<DataFrame>, args: &Args) -> EvalResult<GroupBy> {
    let flat = !args.bool_or(KW, "as_index", true)?;
    let mut keys = Vec::new();
    let mut key_names = Vec::new();

    if let Some(level) = args.given(KW, "level") {
        let level = level.as_i64().unwrap_or(0).max(0) as usize;
        keys.push(
            frame
                .index
                .iter()
                .map(|label| match label {
                    Cell::Tuple(parts) => parts.get(level).cloned().unwrap_or(Cell::Null),
                    other => other.clone(),
                })
                .collect(),
        );
        key_names.push(
            frame
                .index_names
                .get(level)
                .cloned()
                .unwrap_or_else(|| "index".to_string()),
        );
    } else {
        let by = args.required(0, "by", "groupby")?;
        let parts: Vec<Val> = match by {
            Val::List(items) => items.borrow().clone(),
            Val::Tuple(items) => items.as_ref().clone(),
            other => vec![other.clone()],
        };
        for part in parts {
            match part {
                Val::Series(series) => {
                    if series.len() != frame.len() {
                        return raise(
                            ExcKind::ValueError,
                            format!(
                                "Grouper and axis must be same length: {} vs {}",
                                series.len(),
                                frame.len()
                            ),
                        );
                    }
                    keys.push(series.values.clone());
                    key_names.push(series.name.clone().unwrap_or_else(|| "key".to_string()));
                }
                other => {
                    let name = names(&other)?.into_iter().next().unwrap_or_default();
                    match frame.column(&name) {
                        Some(column) => keys.push(column.values.clone()),
                        None if frame.index_names.first() == Some(&name) => {
                            keys.push(frame.index.clone())
                        }
                        None => return Err(Exception::key_error(&name).into()),
                    }
                    key_names.push(name);
                }
            }
        }
    }

    Ok(GroupBy {
        frame: frame.clone(),
        keys,
        names: key_names,
        selection: None,
        flat,
        bins: Vec::new(),
    })
}

/// `df.resample(rule, on=None)`: group by time bin, keeping empty bins
pub fn resample(frame: &Rc<DataFrame>, args: &Args) -> EvalResult<GroupBy> {
    let rule = args
        .str_opt(0, "rule")?
        .unwrap_or_else(|| "D".to_string());
    let on = args.str_opt(KW, "on")?;
    let (stamps, name) = match &on {
        Some(column) => match frame.column(column) {
            Some(c) => (c.values.clone(), column.clone()),
            None => return Err(Exception::key_error(column).into()),
        },
        None => (
            frame.index.clone(),
            frame.index_names.first().cloned().unwrap_or_default(),
        ),
    };

    let mut labels = Vec::with_capacity(stamps.len());
    for stamp in &stamps {
        labels.push(match stamp {
            Cell::Time(t) => Cell::Time(bin_label(t, &rule)?),
            Cell::Date(d) => Cell::Time(bin_label(&midnight(*d), &rule)?),
            c if c.is_missing() => Cell::Null,
            other => {
                return raise(
                    ExcKind::TypeError,
                    format!(
                        "Only valid with DatetimeIndex, TimedeltaIndex or PeriodIndex, but got an instance of '{}'",
                        label_text(other)
                    ),
                )
            }
        });
    }

    let mut bins = Vec::new();
    let present: Vec<NaiveDateTime> = labels
        .iter()
        .filter_map(|c| match c {
            Cell::Time(t) => Some(*t),
            _ => None,
        })
        .collect();
    if let (Some(first), Some(last)) = (present.iter().min(), present.iter().max()) {
        let mut current = *first;
        while current <= *last {
            bins.push(Cell::Time(current));
            if bins.len() >= MAX_BINS {
                break;
            }
            current = next_bin(&current, &rule)?;
        }
    }

    // the time column is the grouping key, not a value
    let source = match &on {
        Some(column) => {
            let mut copy = frame.as_ref().clone();
            copy.drop_column(column);
            Rc::new(copy)
        }
        None => frame.clone(),
    };

    Ok(GroupBy {
        frame: source,
        keys: vec![labels],
        names: vec![name],
        selection: None,
        flat: false,
        bins,
    })
}

/* ===================== Time Bins ===================== */

#[derive(Debug, Clone, Copy)]
enum Rule {
    Fixed(i64),
    /// Weeks ending on this weekday (0 = Monday)
    Week(u32),
    /// Periods of `n` months labelled by their last day
    MonthEnd(u32),
    /// Periods of `n` months labelled by their first day
    MonthStart(u32),
}

fn parse_rule(rule: &str) -> EvalResult<Rule> {
    let digits: String = rule.chars().take_while(|c| c.is_ascii_digit()).collect();
    let count: i64 = digits.parse().unwrap_or(1).max(1);
    let unit = &rule[digits.len()..];
    let weekday = |suffix: &str| -> u32 {
        match suffix.to_ascii_uppercase().as_str() {
            "MON" => 0,
            "TUE" => 1,
            "WED" => 2,
            "THU" => 3,
            "FRI" => 4,
            "SAT" => 5,
            _ => 6,
        }
    };
    let fixed = |unit_seconds: i64| match count.checked_mul(unit_seconds) {
        Some(step) => Ok(Rule::Fixed(step)),
        None => raise(ExcKind::ValueError, format!("Invalid frequency: {}", rule)),
    };
    Ok(match unit {
        "D" | "d" => fixed(86_400)?,
        "H" | "h" => fixed(3_600)?,
        "T" | "min" => fixed(60)?,
        "S" | "s" => fixed(1)?,
        "W" => Rule::Week(6),
        w if w.starts_with("W-") => Rule::Week(weekday(&w[2..])),
        "M" | "ME" | "BM" | "BME" => Rule::MonthEnd(count as u32),
        "MS" | "BMS" => Rule::MonthStart(count as u32),
        "Q" | "QE" | "Q-DEC" | "QE-DEC" => Rule::MonthEnd(3),
        "QS" | "QS-JAN" => Rule::MonthStart(3),
        "Y" | "YE" | "A" | "A-DEC" | "Y-DEC" | "YE-DEC" => Rule::MonthEnd(12),
        "YS" | "AS" | "YS-JAN" | "AS-JAN" => Rule::MonthStart(12),
        other => {
            return raise(
                ExcKind::ValueError,
                format!("Invalid frequency: {}", other),
            )
        }
    })
}

fn month_floor(date: NaiveDate, months: u32) -> NaiveDateTime {
    let months = months.max(1);
    let month0 = date.month0() / months * months;
    let first = NaiveDate::from_ymd_opt(date.year(), month0 + 1, 1).unwrap_or(date);
    midnight(first)
}

fn month_end(start: &NaiveDateTime, months: u32) -> EvalResult<NaiveDateTime> {
    match add_months(start, months as i32) {
        Some(next) => match next.checked_sub_signed(Duration::days(1)) {
            Some(end) => Ok(end),
            None => raise(ExcKind::ValueError, "date out of range"),
        },
        None => raise(ExcKind::ValueError, "date out of range"),
    }
}

/// Label of the bin containing `t`
pub fn bin_label(t: &NaiveDateTime, rule: &str) -> EvalResult<NaiveDateTime> {
    match parse_rule(rule)? {
        Rule::Fixed(step) => {
            let epoch = t.and_utc().timestamp();
            let floored = epoch - epoch.rem_euclid(step);
            match chrono::DateTime::from_timestamp(floored, 0) {
                Some(dt) => Ok(dt.naive_utc()),
                None => raise(ExcKind::ValueError, "timestamp out of range"),
            }
        }
        Rule::Week(end_day) => {
            let date = t.date();
            let today = date.weekday().num_days_from_monday();
            let ahead = (end_day + 7 - today) % 7;
            match date.checked_add_days(Days::new(ahead as u64)) {
                Some(end) => Ok(midnight(end)),
                None => raise(ExcKind::ValueError, "date out of range"),
            }
        }
        Rule::MonthEnd(n) => month_end(&month_floor(t.date(), n), n),
        Rule::MonthStart(n) => Ok(month_floor(t.date(), n)),
    }
}

pub fn next_bin(label: &NaiveDateTime, rule: &str) -> EvalResult<NaiveDateTime> {
    step_bin(label, rule, 1)
}

pub fn previous_bin(label: &NaiveDateTime, rule: &str) -> EvalResult<NaiveDateTime> {
    step_bin(label, rule, -1)
}

fn step_bin(label: &NaiveDateTime, rule: &str, direction: i32) -> EvalResult<NaiveDateTime> {
    let out_of_range = || raise(ExcKind::ValueError, "date out of range");
    match parse_rule(rule)? {
        Rule::Fixed(step) => match Duration::try_seconds(step * direction as i64)
            .and_then(|d| label.checked_add_signed(d))
        {
            Some(t) => Ok(t),
            None => out_of_range(),
        },
        Rule::Week(_) => match label.checked_add_signed(Duration::days(7 * direction as i64)) {
            Some(t) => Ok(t),
            None => out_of_range(),
        },
        Rule::MonthStart(n) => match add_months(label, n as i32 * direction) {
            Some(t) => Ok(t),
            None => out_of_range(),
        },
        Rule::MonthEnd(n) => {
            let start = month_floor(label.date(), n);
            match add_months(&start, n as i32 * direction) {
                Some(shifted) => month_end(&shifted, n),
                None => out_of_range(),
            }
        }
    }
}

/* ===================== Groups ===================== */

/// Group labels with their row positions, in key order
pub fn groups(g: &GroupBy) -> Vec<(Cell, Vec<usize>)> {
    let keys: Vec<&[Cell]> = g.keys.iter().map(Vec::as_slice).collect();
    let mut out = group_rows(&keys, g.frame.len());
    if !g.bins.is_empty() {
        for label in &g.bins {
            if !out.iter().any(|(k, _)| k.loose_eq(label)) {
                out.push((label.clone(), Vec::new()));
            }
        }
        out.sort_by(|a, b| a.0.sort_cmp(&b.0));
    }
    out
}

pub fn group_count(g: &GroupBy) -> EvalResult<usize> {
    Ok(groups(g).len())
}

/// Columns aggregated by default: the selection, or everything but the keys
fn value_columns(g: &GroupBy) -> Vec<String> {
    match &g.selection {
        Some(Selection::One(name)) => vec![name.clone()],
        Some(Selection::Many(list)) => list.clone(),
        None => g
            .frame
            .column_names()
            .into_iter()
            .filter(|c| !g.names.contains(c))
            .collect(),
    }
}

fn column_values<'a>(g: &'a GroupBy, name: &str) -> EvalResult<&'a [Cell]> {
    match g.frame.column(name) {
        Some(column) => Ok(&column.values),
        None => Err(Exception::key_error(name).into()),
    }
}

/// Row labels of the combined result
fn key_index(groups: &[(Cell, Vec<usize>)]) -> Vec<Cell> {
    groups.iter().map(|(k, _)| k.clone()).collect()
}

fn single_selection(g: &GroupBy) -> Option<&str> {
    match &g.selection {
        Some(Selection::One(name)) => Some(name),
        _ => None,
    }
}

/// Wrap per-group results as a Series (single selection) or a DataFrame,
/// then honour `as_index=False`
fn combine(g: &GroupBy, index: Vec<Cell>, columns: Vec<Column>, as_series: bool) -> EvalResult<Val> {
    if as_series && columns.len() == 1 && !g.flat {
        let column = columns.into_iter().next().unwrap_or_default();
        return Ok(Val::series(Series::with_index(
            Some(column.name),
            column.values,
            index,
            g.names.clone(),
        )));
    }
    let frame = table_result(DataFrame::with_index(columns, index, g.names.clone()))?;
    Ok(Val::frame(if g.flat { frame.reset_index(false) } else { frame }))
}

/* ===================== Attributes ===================== */

pub fn attr(g: &Rc<GroupBy>, receiver: &Val, attr: &str) -> EvalResult<Val> {
    match attr {
        "ngroups" => Ok(Val::Int(groups(g).len() as i64)),
        "groups" => {
            let entries = groups(g)
                .into_iter()
                .map(|(key, rows)| {
                    let labels = rows.iter().map(|&r| Val::from_cell(&g.frame.index[r])).collect();
                    (Val::from_cell(&key), Val::list(labels))
                })
                .collect();
            Ok(Val::dict(entries))
        }
        name if METHODS.contains(&name) => Ok(Val::method(receiver.clone(), name)),
        name if g.frame.column(name).is_some() => select(g, &Val::str(name)),
        other => no_attribute(receiver, other),
    }
}

/// `g['col']` or `g[['a', 'b']]`
pub fn select(g: &Rc<GroupBy>, index: &Val) -> EvalResult<Val> {
    let selection = match index {
        Val::Str(name) => Selection::One(name.clone()),
        other => Selection::Many(names(other)?),
    };
    let wanted = match &selection {
        Selection::One(name) => vec![name.clone()],
        Selection::Many(list) => list.clone(),
    };
    for name in &wanted {
        if g.frame.column(name).is_none() {
            return raise(ExcKind::KeyError, format!("'Column not found: {}'", name));
        }
    }
    let mut narrowed = g.as_ref().clone();
    narrowed.selection = Some(selection);
    Ok(Val::GroupBy(Rc::new(narrowed)))
}

/// `for key, group in df.groupby(...)`
pub fn iterate(g: &Rc<GroupBy>) -> EvalResult<Vec<Val>> {
    let mut out = Vec::new();
    for (key, rows) in groups(g) {
        out.push(Val::tuple(vec![Val::from_cell(&key), group_value(g, &rows)?]));
    }
    Ok(out)
}

/// The rows of one group as the object user functions receive
fn group_value(g: &GroupBy, rows: &[usize]) -> EvalResult<Val> {
    let part = g.frame.take(rows);
    match &g.selection {
        Some(Selection::One(name)) => Ok(Val::series(table_result(part.series(name))?)),
        Some(Selection::Many(list)) => Ok(Val::frame(table_result(part.select(list))?)),
        None => Ok(Val::frame(part)),
    }
}

/* ===================== Methods ===================== */

#[derive(Debug, Clone)]
enum Agg {
    Named(String),
    Quantile(f64),
    Callable(Val),
}

impl Agg {
    fn from_val(value: &Val) -> EvalResult<Agg> {
        match value {
            Val::Str(name) => Ok(Agg::Named(name.clone())),
            Val::Builtin(name) if matches!(*name, "sum" | "min" | "max" | "len") => {
                Ok(Agg::Named(if *name == "len" { "size" } else { *name }.to_string()))
            }
            Val::Method(m) if reductions::is_reduction(&m.name) => Ok(Agg::Named(m.name.clone())),
            callable => Ok(Agg::Callable(callable.clone())),
        }
    }

    fn label(&self) -> String {
        match self {
            Agg::Named(name) => name.clone(),
            Agg::Quantile(_) => "quantile".to_string(),
            Agg::Callable(Val::Function(f)) => f.name.clone(),
            Agg::Callable(_) => "<lambda>".to_string(),
        }
    }

    fn apply(
        &self,
        interp: &mut Interpreter,
        values: Vec<Cell>,
        name: &str,
        opts: Options,
    ) -> EvalResult<Cell> {
        interp.tick()?;
        match self {
            Agg::Named(func) => reductions::reduce(func, &values, opts),
            Agg::Quantile(q) => {
                let xs: Vec<f64> = values.iter().filter(|c| !c.is_missing()).filter_map(Cell::as_f64).collect();
                Ok(Cell::Float(reductions::quantile(&xs, *q)))
            }
            Agg::Callable(func) => {
                let series = Series::new(Some(name.to_string()), values);
                interp.call1(func, Val::series(series))?.expect_cell()
            }
        }
    }
}

/// (output column, source column, aggregation)
type Plan = Vec<(String, String, Agg)>;

fn run_plan(
    interp: &mut Interpreter,
    g: &GroupBy,
    plan: &Plan,
    opts: Options,
    as_series: bool,
) -> EvalResult<Val> {
    let grouped = groups(g);
    let mut columns = Vec::with_capacity(plan.len());
    for (output, source, agg) in plan {
        let values = column_values(g, source)?;
        let mut out = Vec::with_capacity(grouped.len());
        for (_, rows) in &grouped {
            let cells: Vec<Cell> = rows.iter().map(|&r| values[r].clone()).collect();
            out.push(agg.apply(interp, cells, source, opts)?);
        }
        columns.push(Column::new(output.clone(), out));
    }
    combine(g, key_index(&grouped), columns, as_series)
}

fn numeric_only(g: &GroupBy, columns: Vec<String>) -> Vec<String> {
    columns
        .into_iter()
        .filter(|name| {
            g.frame
                .column(name)
                .map(|c| matches!(Dtype::infer(&c.values), Dtype::Int64 | Dtype::Float64 | Dtype::Bool))
                .unwrap_or(false)
        })
        .collect()
}

pub fn call(interp: &mut Interpreter, g: &Rc<GroupBy>, name: &str, args: Args) -> EvalResult<Val> {
    let opts = reduce_options(&args)?;
    match name {
        "size" => {
            let grouped = groups(g);
            let counts = grouped.iter().map(|(_, rows)| Cell::Int(rows.len() as i64)).collect();
            let index = key_index(&grouped);
            if g.flat {
                let frame = table_result(DataFrame::with_index(
                    vec![Column::new("size", counts)],
                    index,
                    g.names.clone(),
                ))?;
                return Ok(Val::frame(frame.reset_index(false)));
            }
            Ok(Val::series(Series::with_index(None, counts, index, g.names.clone())))
        }
        func if reductions::is_reduction(func) => {
            let mut columns = value_columns(g);
            if args.bool_or(KW, "numeric_only", false)? {
                columns = numeric_only(g, columns);
            }
            let plan = columns
                .into_iter()
                .map(|c| (c.clone(), c, Agg::Named(func.to_string())))
                .collect();
            run_plan(interp, g, &plan, opts, single_selection(g).is_some())
        }
        "quantile" => {
            let q = args.float_opt(0, "q")?.unwrap_or(0.5);
            let plan = value_columns(g)
                .into_iter()
                .map(|c| (c.clone(), c, Agg::Quantile(q)))
                .collect();
            run_plan(interp, g, &plan, opts, single_selection(g).is_some())
        }
        "agg" | "aggregate" => aggregate(interp, g, &args, opts),
        "apply" => {
            let func = args.required(0, "func", "apply")?.clone();
            apply(interp, g, &func)
        }
        "transform" => {
            let func = Agg::from_val(args.required(0, "func", "transform")?)?;
            transform(interp, g, &func, opts)
        }
        "head" | "tail" => {
            let n = args.int_opt(0, "n")?.unwrap_or(5);
            let mut rows: Vec<usize> = Vec::new();
            for (_, members) in groups(g) {
                let picked = if name == "head" {
                    super::head_rows(members.len(), n)
                } else {
                    super::tail_rows(members.len(), n)
                };
                rows.extend(picked.into_iter().map(|i| members[i]));
            }
            rows.sort_unstable();
            group_value(g, &rows)
        }
        "get_group" => {
            let key = args.required(0, "name", "get_group")?.expect_cell()?;
            match groups(g).into_iter().find(|(k, _)| k.loose_eq(&key)) {
                Some((_, rows)) => group_value(g, &rows),
                None => Err(Exception::new(ExcKind::KeyError, Val::from_cell(&key).repr()).into()),
            }
        }
        "cumcount" => {
            let mut out = vec![Cell::Null; g.frame.len()];
            for (_, rows) in groups(g) {
                for (i, &row) in rows.iter().enumerate() {
                    out[row] = Cell::Int(i as i64);
                }
            }
            Ok(Val::series(Series::with_index(
                None,
                out,
                g.frame.index.clone(),
                g.frame.index_names.clone(),
            )))
        }
        "cumsum" | "shift" | "diff" => {
            let periods = args.int_opt(0, "periods")?.unwrap_or(1);
            per_group_rows(g, |values| match name {
                "cumsum" => series_ops::cumulative("cumsum", values),
                "shift" => Ok(series_ops::shifted(values, periods)),
                _ => series_ops::differences(values, periods),
            })
        }
        "idxmax" | "idxmin" => {
            let grouped = groups(g);
            let mut columns = Vec::new();
            for source in value_columns(g) {
                let values = column_values(g, &source)?;
                let mut out = Vec::with_capacity(grouped.len());
                for (_, rows) in &grouped {
                    let cells: Vec<Cell> = rows.iter().map(|&r| values[r].clone()).collect();
                    out.push(match series_ops::arg_extreme(&cells, name == "idxmax") {
                        Some(pos) => g.frame.index[rows[pos]].clone(),
                        None => Cell::Float(f64::NAN),
                    });
                }
                columns.push(Column::new(source, out));
            }
            combine(g, key_index(&grouped), columns, single_selection(g).is_some())
        }
        other => raise(
            ExcKind::AttributeError,
            format!("'DataFrameGroupBy' object has no attribute '{}'", other),
        ),
    }
}

fn aggregate(interp: &mut Interpreter, g: &GroupBy, args: &Args, opts: Options) -> EvalResult<Val> {
    // named aggregation: agg(total=('distance', 'sum'))
    if args.positional.is_empty() && !args.keywords.is_empty() {
        let mut plan = Vec::new();
        for (output, spec) in &args.keywords {
            match spec {
                Val::Tuple(parts) if parts.len() == 2 => {
                    plan.push((output.clone(), parts[0].to_str(), Agg::from_val(&parts[1])?));
                }
                other => {
                    let Some(source) = single_selection(g) else {
                        return raise(
                            ExcKind::TypeError,
                            "Must provide 'func' or tuples of '(column, aggfunc)'.",
                        );
                    };
                    plan.push((output.clone(), source.to_string(), Agg::from_val(other)?));
                }
            }
        }
        return run_plan(interp, g, &plan, opts, false);
    }

    let spec = args.required(0, "func", "aggregate")?;
    let columns = value_columns(g);
    match spec {
        Val::Dict(entries) => {
            let mut plan = Vec::new();
            for (column, funcs) in entries.borrow().iter() {
                let column = column.to_str();
                match funcs {
                    Val::List(items) => {
                        for func in items.borrow().iter() {
                            let agg = Agg::from_val(func)?;
                            plan.push((format!("{}_{}", column, agg.label()), column.clone(), agg));
                        }
                    }
                    single => plan.push((column.clone(), column.clone(), Agg::from_val(single)?)),
                }
            }
            run_plan(interp, g, &plan, opts, false)
        }
        Val::List(items) => {
            let aggs = items.borrow().iter().map(Agg::from_val).collect::<EvalResult<Vec<_>>>()?;
            let single = columns.len() == 1 && single_selection(g).is_some();
            let mut plan = Vec::new();
            for column in &columns {
                for agg in &aggs {
                    let output = if single {
                        agg.label()
                    } else {
                        format!("{}_{}", column, agg.label())
                    };
                    plan.push((output, column.clone(), agg.clone()));
                }
            }
            run_plan(interp, g, &plan, opts, false)
        }
        func => {
            let agg = Agg::from_val(func)?;
            let plan = columns
                .into_iter()
                .map(|c| (c.clone(), c, agg.clone()))
                .collect();
            run_plan(interp, g, &plan, opts, single_selection(g).is_some())
        }
    }
}

fn apply(interp: &mut Interpreter, g: &GroupBy, func: &Val) -> EvalResult<Val> {
    let grouped = groups(g);
    let mut results = Vec::with_capacity(grouped.len());
    for (_, rows) in &grouped {
        let part = group_value(g, rows)?;
        results.push(interp.call1(func, part)?);
    }
    let index = key_index(&grouped);

    if results.iter().all(|r| matches!(r, Val::Frame(_))) && !results.is_empty() {
        let list = Val::list(results);
        return super::call_function(interp, "concat", Args::new(vec![list]));
    }

    if results.iter().all(|r| matches!(r, Val::Series(_))) && !results.is_empty() {
        let mut names: Vec<String> = Vec::new();
        for result in &results {
            if let Val::Series(s) = result {
                for label in &s.index {
                    let label = label_text(label);
                    if !names.contains(&label) {
                        names.push(label);
                    }
                }
            }
        }
        let mut columns: Vec<Column> = names.iter().map(|n| Column::new(n.clone(), Vec::new())).collect();
        for result in &results {
            if let Val::Series(s) = result {
                for column in columns.iter_mut() {
                    let cell = s
                        .index
                        .iter()
                        .position(|l| label_text(l) == column.name)
                        .map(|pos| s.values[pos].clone())
                        .unwrap_or(Cell::Null);
                    column.values.push(cell);
                }
            }
        }
        return combine(g, index, columns, false);
    }

    let cells = results.iter().map(Val::expect_cell).collect::<EvalResult<Vec<_>>>()?;
    let name = single_selection(g).map(str::to_string);
    let series = Series::with_index(name, cells, index, g.names.clone());
    if g.flat {
        let frame = DataFrame {
            columns: vec![Column::new(series.name.clone().unwrap_or_else(|| "0".to_string()), series.values.clone())],
            index: series.index.clone(),
            index_names: series.index_names.clone(),
        };
        return Ok(Val::frame(frame.reset_index(false)));
    }
    Ok(Val::series(series))
}

fn transform(interp: &mut Interpreter, g: &GroupBy, func: &Agg, opts: Options) -> EvalResult<Val> {
    let grouped = groups(g);
    let len = g.frame.len();
    let mut columns = Vec::new();
    for source in value_columns(g) {
        let values = column_values(g, &source)?;
        let mut out = vec![Cell::Null; len];
        for (_, rows) in &grouped {
            let cells: Vec<Cell> = rows.iter().map(|&r| values[r].clone()).collect();
            let produced: Vec<Cell> = match func {
                Agg::Named(name) if !reductions::is_reduction(name) => match name.as_str() {
                    "cumsum" | "cummax" | "cummin" | "cumprod" => series_ops::cumulative(name, &cells)?,
                    "rank" => series_ops::rank(&cells),
                    other => {
                        return raise(
                            ExcKind::ValueError,
                            format!("'{}' is not a valid function name for transform", other),
                        )
                    }
                },
                Agg::Callable(callable) => {
                    interp.tick()?;
                    let part = Series::new(Some(source.clone()), cells.clone());
                    match interp.call1(callable, Val::series(part))? {
                        Val::Series(s) if s.len() == rows.len() => s.values.clone(),
                        other => vec![other.expect_cell()?; rows.len()],
                    }
                }
                agg => vec![agg.apply(interp, cells.clone(), &source, opts)?; rows.len()],
            };
            for (&row, cell) in rows.iter().zip(produced) {
                out[row] = cell;
            }
        }
        columns.push(Column::new(source, out));
    }
    rows_result(g, columns)
}

/// Per-row output in the frame's original order
fn per_group_rows(
    g: &GroupBy,
    f: impl Fn(&[Cell]) -> EvalResult<Vec<Cell>>,
) -> EvalResult<Val> {
    let grouped = groups(g);
    let mut columns = Vec::new();
    for source in value_columns(g) {
        let values = column_values(g, &source)?;
        let mut out = vec![Cell::Null; g.frame.len()];
        for (_, rows) in &grouped {
            let cells: Vec<Cell> = rows.iter().map(|&r| values[r].clone()).collect();
            for (&row, cell) in rows.iter().zip(f(&cells)?) {
                out[row] = cell;
            }
        }
        columns.push(Column::new(source, out));
    }
    rows_result(g, columns)
}

fn rows_result(g: &GroupBy, columns: Vec<Column>) -> EvalResult<Val> {
    if let (Some(name), [column]) = (single_selection(g), columns.as_slice()) {
        return Ok(Val::series(Series::with_index(
            Some(name.to_string()),
            column.values.clone(),
            g.frame.index.clone(),
            g.frame.index_names.clone(),
        )));
    }
    let frame = table_result(DataFrame::with_index(
        columns,
        g.frame.index.clone(),
        g.frame.index_names.clone(),
    ))?;
    Ok(Val::frame(frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(text: &str) -> NaiveDateTime {
        crate::table::parse_datetime(text).unwrap()
    }

    #[test]
    fn test_weekly_bins_end_on_sunday() {
        let label = bin_label(&at("2024-05-15 08:00:00"), "W").unwrap();
        assert_eq!(label, at("2024-05-19"));
        assert_eq!(next_bin(&label, "W").unwrap(), at("2024-05-26"));
    }

    #[test]
    fn test_month_end_and_start_bins() {
        assert_eq!(bin_label(&at("2024-02-10"), "ME").unwrap(), at("2024-02-29"));
        assert_eq!(bin_label(&at("2024-02-10"), "MS").unwrap(), at("2024-02-01"));
        assert_eq!(next_bin(&at("2024-01-31"), "M").unwrap(), at("2024-02-29"));
        assert_eq!(bin_label(&at("2024-05-10"), "Q").unwrap(), at("2024-06-30"));
    }

    #[test]
    fn test_fixed_bins_floor() {
        assert_eq!(bin_label(&at("2024-05-15 08:45:00"), "D").unwrap(), at("2024-05-15"));
        assert_eq!(
            bin_label(&at("2024-05-15 08:45:00"), "h").unwrap(),
            at("2024-05-15 08:00:00")
        );
        assert!(bin_label(&at("2024-05-15"), "fortnight").is_err());
    }
}
