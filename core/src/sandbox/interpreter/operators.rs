//! Arithmetic, comparison and membership with Python and pandas semantics
//!
//! Scalars follow Python (`int / int` is a float, `//` floors, `%` takes the
//! sign of the divisor, division by zero raises). Series and frames apply the
//! scalar rules element-wise, where missing values propagate as NaN and
//! division by zero yields `inf`/`NaN` instead of raising.

use crate::sandbox::stdlib::strings;
use crate::sandbox::types::ast::{BinaryOp, CompareOp, UnaryOp};
use crate::sandbox::types::{raise, EvalResult, ExcKind, Val};
use crate::table::{midnight, parse_datetime, Cell, Column, DataFrame, Series};
use chrono::{Duration, NaiveDateTime};
use std::cmp::Ordering;
use std::rc::Rc;

/* ===================== Unary ===================== */

pub fn unary(op: UnaryOp, value: &Val) -> EvalResult<Val> {
    if op == UnaryOp::Not {
        return Ok(Val::Bool(!value.truthy()?));
    }
    match value {
        Val::Series(series) => {
            let values = series
                .values
                .iter()
                .map(|cell| unary_cell(op, cell))
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Val::series(series.map_values(values)))
        }
        Val::Frame(frame) => map_frame(frame, |cell| unary_cell(op, cell)),
        scalar => unary_scalar(op, scalar),
    }
}

fn unary_scalar(op: UnaryOp, value: &Val) -> EvalResult<Val> {
    Ok(match (op, value) {
        (UnaryOp::Neg, Val::Int(n)) => Val::Int(checked_int(n.checked_neg())?),
        (UnaryOp::Neg, Val::Float(x)) => Val::Float(-x),
        (UnaryOp::Neg, Val::Bool(b)) => Val::Int(-(*b as i64)),
        (UnaryOp::Neg, Val::Delta(s)) => Val::Delta(checked_delta(s.checked_neg())?),
        (UnaryOp::Pos, Val::Bool(b)) => Val::Int(*b as i64),
        (UnaryOp::Pos, v @ (Val::Int(_) | Val::Float(_) | Val::Delta(_))) => v.clone(),
        (UnaryOp::Invert, Val::Bool(b)) => Val::Int(!(*b as i64)),
        (UnaryOp::Invert, Val::Int(n)) => Val::Int(!n),
        (op, other) => {
            let symbol = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                UnaryOp::Invert => "~",
                UnaryOp::Not => "not",
            };
            return raise(
                ExcKind::TypeError,
                format!(
                    "bad operand type for unary {}: '{}'",
                    symbol,
                    other.type_name()
                ),
            );
        }
    })
}

fn unary_cell(op: UnaryOp, cell: &Cell) -> EvalResult<Cell> {
    match (op, cell) {
        (_, Cell::Null) => Ok(Cell::Float(f64::NAN)),
        // ~ on a boolean mask is logical negation
        (UnaryOp::Invert, Cell::Bool(b)) => Ok(Cell::Bool(!b)),
        _ => unary_scalar(op, &Val::from_cell(cell))?.expect_cell(),
    }
}

/* ===================== Binary ===================== */

pub fn binary(op: BinaryOp, lhs: &Val, rhs: &Val) -> EvalResult<Val> {
    match (lhs, rhs) {
        (Val::Series(a), Val::Series(b)) => {
            let (index, left, right) = align(a, b);
            let values = left
                .iter()
                .zip(&right)
                .map(|(x, y)| binary_cell(op, x, y))
                .collect::<EvalResult<Vec<_>>>()?;
            let name = if a.name == b.name { a.name.clone() } else { None };
            Ok(Val::series(Series::with_index(
                name,
                values,
                index,
                a.index_names.clone(),
            )))
        }
        (Val::Series(a), other) => {
            let values = match sequence_cells(other, a.len())? {
                Some(cells) => a
                    .values
                    .iter()
                    .zip(&cells)
                    .map(|(x, y)| binary_cell(op, x, y))
                    .collect::<EvalResult<Vec<_>>>()?,
                None => {
                    let y = other.expect_cell()?;
                    a.values
                        .iter()
                        .map(|x| binary_cell(op, x, &y))
                        .collect::<EvalResult<Vec<_>>>()?
                }
            };
            Ok(Val::series(a.map_values(values)))
        }
        (other, Val::Series(b)) => {
            let values = match sequence_cells(other, b.len())? {
                Some(cells) => cells
                    .iter()
                    .zip(&b.values)
                    .map(|(x, y)| binary_cell(op, x, y))
                    .collect::<EvalResult<Vec<_>>>()?,
                None => {
                    let x = other.expect_cell()?;
                    b.values
                        .iter()
                        .map(|y| binary_cell(op, &x, y))
                        .collect::<EvalResult<Vec<_>>>()?
                }
            };
            Ok(Val::series(b.map_values(values)))
        }
        (Val::Frame(frame), other) if other.to_cell().is_some() => {
            let y = other.expect_cell()?;
            map_frame(frame, |x| binary_cell(op, x, &y))
        }
        (other, Val::Frame(frame)) if other.to_cell().is_some() => {
            let x = other.expect_cell()?;
            map_frame(frame, |y| binary_cell(op, &x, y))
        }
        _ => binary_scalar(op, lhs, rhs, false),
    }
}

/// A list or tuple used as the other operand of a series operation
fn sequence_cells(value: &Val, len: usize) -> EvalResult<Option<Vec<Cell>>> {
    let items: Vec<Val> = match value {
        Val::List(items) => items.borrow().clone(),
        Val::Tuple(items) => items.as_ref().clone(),
        _ => return Ok(None),
    };
    if items.len() != len {
        return raise(
            ExcKind::ValueError,
            format!(
                "Lengths must match to compare or combine: {} vs {}",
                len,
                items.len()
            ),
        );
    }
    items.iter().map(Val::expect_cell).collect::<EvalResult<Vec<_>>>().map(Some)
}

/// Pair two series by index label; identical indexes pair by position
pub fn align(a: &Series, b: &Series) -> (Vec<Cell>, Vec<Cell>, Vec<Cell>) {
    let same = a.index.len() == b.index.len()
        && a.index.iter().zip(&b.index).all(|(x, y)| x.loose_eq(y) || x == y);
    if same {
        return (a.index.clone(), a.values.clone(), b.values.clone());
    }

    let mut index = a.index.clone();
    for label in &b.index {
        if !index.iter().any(|l| l.loose_eq(label)) {
            index.push(label.clone());
        }
    }
    let lookup = |s: &Series, label: &Cell| {
        s.position_of(label)
            .map(|pos| s.values[pos].clone())
            .unwrap_or(Cell::Null)
    };
    let left = index.iter().map(|l| lookup(a, l)).collect();
    let right = index.iter().map(|l| lookup(b, l)).collect();
    (index, left, right)
}

fn map_frame(frame: &DataFrame, f: impl Fn(&Cell) -> EvalResult<Cell>) -> EvalResult<Val> {
    let mut columns = Vec::with_capacity(frame.width());
    for column in &frame.columns {
        let values = column.values.iter().map(&f).collect::<EvalResult<Vec<_>>>()?;
        columns.push(Column::new(column.name.clone(), values));
    }
    Ok(Val::Frame(Rc::new(DataFrame {
        columns,
        index: frame.index.clone(),
        index_names: frame.index_names.clone(),
    })))
}

/// Element-wise operation on two cells
pub fn binary_cell(op: BinaryOp, x: &Cell, y: &Cell) -> EvalResult<Cell> {
    if is_logical(op) {
        let truth = |c: &Cell| match c {
            Cell::Bool(b) => *b,
            c if c.is_missing() => false,
            c => c.as_f64().map(|v| v != 0.0).unwrap_or(true),
        };
        if let (Cell::Int(a), Cell::Int(b)) = (x, y) {
            return int_arith(op, *a, *b, true)?.expect_cell();
        }
        return Ok(Cell::Bool(logical(op, truth(x), truth(y))));
    }
    if x.is_missing() || y.is_missing() {
        return Ok(Cell::Float(f64::NAN));
    }
    binary_scalar(op, &Val::from_cell(x), &Val::from_cell(y), true)?.expect_cell()
}

fn binary_scalar(op: BinaryOp, lhs: &Val, rhs: &Val, elementwise: bool) -> EvalResult<Val> {
    use Val::*;
    match (lhs, rhs) {
        (Int(a), Int(b)) => int_arith(op, *a, *b, elementwise),
        (Bool(a), Bool(b)) if is_logical(op) => Ok(Bool(logical(op, *a, *b))),
        (a, b) if a.is_number() && b.is_number() => match (a, b) {
            (Float(_), _) | (_, Float(_)) => {
                float_arith(op, a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0), elementwise)
            }
            _ => int_arith(op, a.as_i64().unwrap_or(0), b.as_i64().unwrap_or(0), elementwise),
        },

        (Str(a), Str(b)) if op == BinaryOp::Add => Ok(Str(format!("{}{}", a, b))),
        (Str(s), Int(n)) | (Int(n), Str(s)) if op == BinaryOp::Mul => {
            Ok(Str(s.repeat(repeat_count(s.len(), *n)?)))
        }
        (Str(fmt), args) if op == BinaryOp::Mod => strings::percent_format(fmt, args).map(Str),
        (Str(_), other) if op == BinaryOp::Add => raise(
            ExcKind::TypeError,
            format!(
                "can only concatenate str (not \"{}\") to str",
                other.type_name()
            ),
        ),

        (List(a), List(b)) if op == BinaryOp::Add => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Val::list(items))
        }
        (List(a), Int(n)) | (Int(n), List(a)) if op == BinaryOp::Mul => {
            let items = a.borrow();
            let count = repeat_count(items.len(), *n)?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Val::list(out))
        }
        (Tuple(a), Tuple(b)) if op == BinaryOp::Add => {
            let mut items = a.as_ref().clone();
            items.extend(b.iter().cloned());
            Ok(Val::tuple(items))
        }
        (Tuple(a), Int(n)) | (Int(n), Tuple(a)) if op == BinaryOp::Mul => {
            let mut out = Vec::new();
            for _ in 0..repeat_count(a.len(), *n)? {
                out.extend(a.iter().cloned());
            }
            Ok(Val::tuple(out))
        }
        (Dict(a), Dict(b)) if op == BinaryOp::BitOr => {
            let merged = Val::dict(a.borrow().clone());
            if let Val::Dict(entries) = &merged {
                for (k, v) in b.borrow().iter() {
                    crate::sandbox::stdlib::builtins::dict_set(entries, k.clone(), v.clone())?;
                }
            }
            Ok(merged)
        }

        _ => temporal_arith(op, lhs, rhs),
    }
}

fn temporal_arith(op: BinaryOp, lhs: &Val, rhs: &Val) -> EvalResult<Val> {
    use Val::*;
    let out = match (op, lhs, rhs) {
        (BinaryOp::Add, Time(t), Delta(s)) | (BinaryOp::Add, Delta(s), Time(t)) => {
            Time(shift_time(*t, *s)?)
        }
        (BinaryOp::Sub, Time(t), Delta(s)) => Time(shift_time(*t, checked_delta(s.checked_neg())?)?),
        (BinaryOp::Add, Date(d), Delta(s)) | (BinaryOp::Add, Delta(s), Date(d)) => {
            date_shift(*d, *s)?
        }
        (BinaryOp::Sub, Date(d), Delta(s)) => date_shift(*d, checked_delta(s.checked_neg())?)?,
        (BinaryOp::Sub, Time(a), Time(b)) => Delta((*a - *b).num_seconds()),
        (BinaryOp::Sub, Date(a), Date(b)) => Delta((*a - *b).num_seconds()),
        (BinaryOp::Sub, Time(a), Date(b)) => Delta((*a - midnight(*b)).num_seconds()),
        (BinaryOp::Sub, Date(a), Time(b)) => Delta((midnight(*a) - *b).num_seconds()),
        (BinaryOp::Add, Delta(a), Delta(b)) => Delta(checked_delta(a.checked_add(*b))?),
        (BinaryOp::Sub, Delta(a), Delta(b)) => Delta(checked_delta(a.checked_sub(*b))?),
        (BinaryOp::Div, Delta(_), Delta(0)) | (BinaryOp::FloorDiv, Delta(_), Delta(0)) => {
            return raise(ExcKind::ZeroDivisionError, "division by zero")
        }
        (BinaryOp::Div, Delta(a), Delta(b)) => Float(*a as f64 / *b as f64),
        (BinaryOp::FloorDiv, Delta(a), Delta(b)) => Int(floor_div(*a, *b)?),
        (BinaryOp::Mul, Delta(s), n) | (BinaryOp::Mul, n, Delta(s)) if n.is_number() => {
            Delta(scaled_delta(*s as f64 * n.as_f64().unwrap_or(0.0))?)
        }
        (BinaryOp::Div, Delta(s), n) if n.is_number() => {
            let divisor = n.as_f64().unwrap_or(0.0);
            if divisor == 0.0 {
                return raise(ExcKind::ZeroDivisionError, "division by zero");
            }
            Delta(scaled_delta(*s as f64 / divisor)?)
        }
        _ => {
            return raise(
                ExcKind::TypeError,
                format!(
                    "unsupported operand type(s) for {}: '{}' and '{}'",
                    op.symbol(),
                    lhs.type_name(),
                    rhs.type_name()
                ),
            )
        }
    };
    Ok(out)
}

fn date_shift(date: chrono::NaiveDate, seconds: i64) -> EvalResult<Val> {
    let shifted = shift_time(midnight(date), seconds)?;
    Ok(if seconds % 86_400 == 0 {
        Val::Date(shifted.date())
    } else {
        Val::Time(shifted)
    })
}

fn scaled_delta(seconds: f64) -> EvalResult<i64> {
    let rounded = seconds.round();
    if !rounded.is_finite() || rounded.abs() >= i64::MAX as f64 {
        return raise(ExcKind::OverflowError, "timedelta value out of range");
    }
    Ok(rounded as i64)
}

/* ===================== Checked arithmetic ===================== */

/// Integer results live in i64; anything wider raises instead of wrapping
pub fn checked_int(value: Option<i64>) -> EvalResult<i64> {
    match value {
        Some(n) => Ok(n),
        None => raise(ExcKind::OverflowError, "integer result too large to represent"),
    }
}

pub fn checked_delta(value: Option<i64>) -> EvalResult<i64> {
    match value {
        Some(n) => Ok(n),
        None => raise(ExcKind::OverflowError, "timedelta value out of range"),
    }
}

/// `t + seconds`, raising when the result leaves the supported date range
pub fn shift_time(t: NaiveDateTime, seconds: i64) -> EvalResult<NaiveDateTime> {
    match Duration::try_seconds(seconds).and_then(|d| t.checked_add_signed(d)) {
        Some(shifted) => Ok(shifted),
        None => raise(ExcKind::OverflowError, "date value out of range"),
    }
}

/// `abs()` of a numeric cell; other cells pass through
pub fn abs_cell(cell: &Cell) -> EvalResult<Cell> {
    Ok(match cell {
        Cell::Int(n) => Cell::Int(checked_int(n.checked_abs())?),
        Cell::Float(x) => Cell::Float(x.abs()),
        Cell::Delta(s) => Cell::Delta(checked_delta(s.checked_abs())?),
        other => other.clone(),
    })
}

/// Python `//`: rounds toward negative infinity
fn floor_div(a: i64, b: i64) -> EvalResult<i64> {
    let q = checked_int(a.checked_div(b))?;
    Ok(if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q })
}

/// Largest string or sequence `*` may build
const MAX_REPEAT_LEN: usize = 10_000_000;

fn repeat_count(len: usize, times: i64) -> EvalResult<usize> {
    if len == 0 {
        return Ok(0);
    }
    let times = usize::try_from(times.max(0)).unwrap_or(usize::MAX);
    match len.checked_mul(times) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(times),
        _ => raise(ExcKind::OverflowError, "repeated sequence is too long"),
    }
}

fn is_logical(op: BinaryOp) -> bool {
    matches!(op, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor)
}

fn logical(op: BinaryOp, a: bool, b: bool) -> bool {
    match op {
        BinaryOp::BitAnd => a && b,
        BinaryOp::BitOr => a || b,
        _ => a != b,
    }
}

fn int_arith(op: BinaryOp, a: i64, b: i64, elementwise: bool) -> EvalResult<Val> {
    match op {
        BinaryOp::Add => checked_int(a.checked_add(b)).map(Val::Int),
        BinaryOp::Sub => checked_int(a.checked_sub(b)).map(Val::Int),
        BinaryOp::Mul => checked_int(a.checked_mul(b)).map(Val::Int),
        BinaryOp::Div if b == 0 && !elementwise => raise(ExcKind::ZeroDivisionError, "division by zero"),
        BinaryOp::Div => float_arith(op, a as f64, b as f64, elementwise),
        BinaryOp::FloorDiv | BinaryOp::Mod if b == 0 => {
            if elementwise {
                return float_arith(op, a as f64, 0.0, true);
            }
            let what = if op == BinaryOp::Mod { "modulo" } else { "division or modulo" };
            raise(
                ExcKind::ZeroDivisionError,
                format!("integer {} by zero", what),
            )
        }
        BinaryOp::FloorDiv => floor_div(a, b).map(Val::Int),
        BinaryOp::Mod => {
            // only i64::MIN % -1 has no checked result, and its remainder is 0
            let r = a.checked_rem(b).unwrap_or(0);
            Ok(Val::Int(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }))
        }
        BinaryOp::Pow if b >= 0 && matches!(a, -1..=1) => {
            Ok(Val::Int(if a == -1 && b % 2 == 0 { 1 } else if b == 0 { 1 } else { a }))
        }
        BinaryOp::Pow if b >= 0 => {
            let exponent = u32::try_from(b).ok();
            checked_int(exponent.and_then(|e| a.checked_pow(e))).map(Val::Int)
        }
        BinaryOp::Pow => Ok(Val::Float((a as f64).powf(b as f64))),
        BinaryOp::BitAnd => Ok(Val::Int(a & b)),
        BinaryOp::BitOr => Ok(Val::Int(a | b)),
        BinaryOp::BitXor => Ok(Val::Int(a ^ b)),
        BinaryOp::LShift | BinaryOp::RShift if b < 0 => raise(ExcKind::ValueError, "negative shift count"),
        BinaryOp::LShift => {
            if a == 0 {
                return Ok(Val::Int(0));
            }
            let shifted = u32::try_from(b)
                .ok()
                .filter(|&n| n < 64)
                .map(|n| a << n)
                .filter(|&r| r >> b == a);
            checked_int(shifted).map(Val::Int)
        }
        BinaryOp::RShift => Ok(Val::Int(if b >= 64 { if a < 0 { -1 } else { 0 } } else { a >> b })),
    }
}

fn float_arith(op: BinaryOp, a: f64, b: f64, elementwise: bool) -> EvalResult<Val> {
    let zero_division = |what: &str| -> EvalResult<Val> {
        if elementwise {
            let value = if a == 0.0 || a.is_nan() {
                f64::NAN
            } else {
                f64::INFINITY.copysign(a)
            };
            return Ok(Val::Float(value));
        }
        raise(ExcKind::ZeroDivisionError, what.to_string())
    };
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b == 0.0 => return zero_division("float division by zero"),
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv if b == 0.0 => return zero_division("float floor division by zero"),
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod if b == 0.0 => return zero_division("float modulo"),
        BinaryOp::Mod => {
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        BinaryOp::Pow => a.powf(b),
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::LShift | BinaryOp::RShift => {
            return raise(
                ExcKind::TypeError,
                format!(
                    "unsupported operand type(s) for {}: 'float' and 'float'",
                    op.symbol()
                ),
            )
        }
    };
    Ok(Val::Float(value))
}

/* ===================== Comparison ===================== */

pub fn compare(op: CompareOp, lhs: &Val, rhs: &Val) -> EvalResult<Val> {
    match op {
        CompareOp::In => return contains(rhs, lhs).map(Val::Bool),
        CompareOp::NotIn => return contains(rhs, lhs).map(|found| Val::Bool(!found)),
        CompareOp::Is => return Ok(Val::Bool(same_object(lhs, rhs))),
        CompareOp::IsNot => return Ok(Val::Bool(!same_object(lhs, rhs))),
        _ => {}
    }

    match (lhs, rhs) {
        (Val::Series(a), Val::Series(b)) => {
            let (index, left, right) = align(a, b);
            let values = left
                .iter()
                .zip(&right)
                .map(|(x, y)| compare_cells(op, x, y).map(Cell::Bool))
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Val::series(Series::with_index(
                None,
                values,
                index,
                a.index_names.clone(),
            )))
        }
        (Val::Series(a), other) => {
            let y = other.expect_cell()?;
            let values = a
                .values
                .iter()
                .map(|x| compare_cells(op, x, &y).map(Cell::Bool))
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Val::series(a.map_values(values)))
        }
        (other, Val::Series(b)) => {
            let x = other.expect_cell()?;
            let values = b
                .values
                .iter()
                .map(|y| compare_cells(op, &x, y).map(Cell::Bool))
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Val::series(b.map_values(values)))
        }
        (Val::Frame(frame), other) if other.to_cell().is_some() => {
            let y = other.expect_cell()?;
            map_frame(frame, |x| compare_cells(op, x, &y).map(Cell::Bool))
        }
        _ => compare_scalars(op, lhs, rhs).map(Val::Bool),
    }
}

fn compare_scalars(op: CompareOp, lhs: &Val, rhs: &Val) -> EvalResult<bool> {
    match op {
        CompareOp::Eq => return Ok(lhs.py_eq(rhs)),
        CompareOp::Ne => return Ok(!lhs.py_eq(rhs)),
        _ => {}
    }
    let ordering = match (lhs, rhs) {
        (Val::List(a), Val::List(b)) => sequence_order(&a.borrow(), &b.borrow())?,
        (Val::Tuple(a), Val::Tuple(b)) => sequence_order(a, b)?,
        _ => match (lhs.to_cell(), rhs.to_cell()) {
            (Some(x), Some(y)) => match cell_order(&x, &y) {
                Some(ordering) => ordering,
                None => return order_error(op, lhs, rhs),
            },
            _ => return order_error(op, lhs, rhs),
        },
    };
    Ok(ordering.map(|ord| ordering_matches(op, ord)).unwrap_or(false))
}

fn order_error<T>(op: CompareOp, lhs: &Val, rhs: &Val) -> EvalResult<T> {
    raise(
        ExcKind::TypeError,
        format!(
            "'{}' not supported between instances of '{}' and '{}'",
            compare_symbol(op),
            lhs.type_name(),
            rhs.type_name()
        ),
    )
}

fn sequence_order(a: &[Val], b: &[Val]) -> EvalResult<Option<Ordering>> {
    for (x, y) in a.iter().zip(b) {
        if x.py_eq(y) {
            continue;
        }
        return Ok(if compare_scalars(CompareOp::Lt, x, y)? {
            Some(Ordering::Less)
        } else {
            Some(Ordering::Greater)
        });
    }
    Ok(Some(a.len().cmp(&b.len())))
}

/// Order between two comparable cells; `Some(None)` when either is NaN,
/// `None` when the types cannot be ordered
fn cell_order(x: &Cell, y: &Cell) -> Option<Option<Ordering>> {
    use Cell::*;
    Some(match (x, y) {
        (a, b) if a.is_numeric() && b.is_numeric() => {
            a.as_f64().unwrap_or(f64::NAN).partial_cmp(&b.as_f64().unwrap_or(f64::NAN))
        }
        (Str(a), Str(b)) => Some(a.cmp(b)),
        (Time(a), Time(b)) => Some(a.cmp(b)),
        (Date(a), Date(b)) => Some(a.cmp(b)),
        (Time(a), Date(b)) => Some(a.cmp(&midnight(*b))),
        (Date(a), Time(b)) => Some(midnight(*a).cmp(b)),
        (Time(a), Str(s)) => Some(a.cmp(&parse_datetime(s)?)),
        (Str(s), Time(b)) => Some(parse_datetime(s)?.cmp(b)),
        (Date(a), Str(s)) => Some(midnight(*a).cmp(&parse_datetime(s)?)),
        (Str(s), Date(b)) => Some(parse_datetime(s)?.cmp(&midnight(*b))),
        (Delta(a), Delta(b)) => Some(a.cmp(b)),
        (Tuple(a), Tuple(b)) => {
            for (p, q) in a.iter().zip(b) {
                match cell_order(p, q)? {
                    Some(Ordering::Equal) => continue,
                    other => return Some(other),
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => return None,
    })
}

/// Element-wise comparison; missing values compare false (true for `!=`)
pub fn compare_cells(op: CompareOp, x: &Cell, y: &Cell) -> EvalResult<bool> {
    if x.is_missing() || y.is_missing() {
        return Ok(op == CompareOp::Ne);
    }
    match op {
        CompareOp::Eq => return Ok(x.loose_eq(y)),
        CompareOp::Ne => return Ok(!x.loose_eq(y)),
        _ => {}
    }
    match cell_order(x, y) {
        Some(ordering) => Ok(ordering.map(|ord| ordering_matches(op, ord)).unwrap_or(false)),
        None => order_error(op, &Val::from_cell(x), &Val::from_cell(y)),
    }
}

fn ordering_matches(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Le => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
        CompareOp::Eq => ord == Ordering::Equal,
        _ => ord != Ordering::Equal,
    }
}

fn compare_symbol(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "==",
        CompareOp::Ne => "!=",
        CompareOp::Lt => "<",
        CompareOp::Le => "<=",
        CompareOp::Gt => ">",
        CompareOp::Ge => ">=",
        CompareOp::In => "in",
        CompareOp::NotIn => "not in",
        CompareOp::Is => "is",
        CompareOp::IsNot => "is not",
    }
}

/// `needle in haystack`
pub fn contains(haystack: &Val, needle: &Val) -> EvalResult<bool> {
    Ok(match haystack {
        Val::Str(s) => match needle {
            Val::Str(n) => s.contains(n.as_str()),
            other => {
                return raise(
                    ExcKind::TypeError,
                    format!(
                        "'in <string>' requires string as left operand, not {}",
                        other.type_name()
                    ),
                )
            }
        },
        Val::List(items) => items.borrow().iter().any(|v| v.py_eq(needle)),
        Val::Tuple(items) => items.iter().any(|v| v.py_eq(needle)),
        Val::Dict(entries) => entries.borrow().iter().any(|(k, _)| k.py_eq(needle)),
        // pandas checks the index, not the values
        Val::Series(series) => match needle.to_cell() {
            Some(label) => series.position_of(&label).is_some(),
            None => false,
        },
        Val::Frame(frame) => match needle {
            Val::Str(name) => frame.column_position(name).is_some(),
            _ => false,
        },
        other => {
            return raise(
                ExcKind::TypeError,
                format!(
                    "argument of type '{}' is not iterable",
                    other.type_name()
                ),
            )
        }
    })
}

fn same_object(a: &Val, b: &Val) -> bool {
    match (a, b) {
        (Val::None, Val::None) => true,
        (Val::None, _) | (_, Val::None) => false,
        (Val::Bool(x), Val::Bool(y)) => x == y,
        (Val::Float(x), Val::Float(y)) => x.to_bits() == y.to_bits(),
        (Val::List(x), Val::List(y)) => Rc::ptr_eq(x, y),
        (Val::Dict(x), Val::Dict(y)) => Rc::ptr_eq(x, y),
        (Val::Frame(x), Val::Frame(y)) => Rc::ptr_eq(x, y),
        (Val::Series(x), Val::Series(y)) => Rc::ptr_eq(x, y),
        (Val::ExcType(x), Val::ExcType(y)) => x == y,
        (Val::Module(x), Val::Module(y)) => x == y,
        (x, y) => x.py_eq(y) && x.type_name() == y.type_name(),
    }
}
