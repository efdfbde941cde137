//! Runtime value types

use super::ast::{Expr, Stmt};
use super::errors::{py_str_repr, raise, EvalResult, ExcKind, Exception};
use crate::table::format::{format_delta, frame_to_string, label_text, py_float, series_to_string};
use crate::table::{Cell, DataFrame, Series};
use chrono::{NaiveDate, NaiveDateTime};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type ListRef = Rc<RefCell<Vec<Val>>>;
pub type DictRef = Rc<RefCell<Vec<(Val, Val)>>>;

/// Runtime value type
///
/// Lists and dicts are shared references, as in Python; frames and series are
/// copy-on-write (`Rc::make_mut`) so an assignment into one name never leaks
/// into another.
#[derive(Debug, Clone)]
pub enum Val {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Time(NaiveDateTime),
    Date(NaiveDate),
    /// Duration in seconds
    Delta(i64),
    List(ListRef),
    Tuple(Rc<Vec<Val>>),
    Dict(DictRef),
    Slice(Rc<SliceVal>),
    Frame(Rc<DataFrame>),
    Series(Rc<Series>),
    GroupBy(Rc<GroupBy>),
    Accessor(Rc<Accessor>),
    Module(Module),
    Builtin(&'static str),
    Method(Rc<Method>),
    Function(Rc<Function>),
    Exception(Rc<Exception>),
    ExcType(ExcKind),
    Plot(PlotHandle),
    /// Cosmetic object (styles, spines, tick params): every use is a no-op
    Inert,
}

/// `lower:upper:step` inside a subscript; absent bounds are `Val::None`
#[derive(Debug, Clone)]
pub struct SliceVal {
    pub lower: Val,
    pub upper: Val,
    pub step: Val,
}

impl SliceVal {
    fn bound(value: &Val, what: &str) -> EvalResult<Option<i64>> {
        match value {
            Val::None => Ok(None),
            Val::Int(n) => Ok(Some(*n)),
            Val::Bool(b) => Ok(Some(*b as i64)),
            other => raise(
                ExcKind::TypeError,
                format!(
                    "slice {} must be an integer or None, not {}",
                    what,
                    other.type_name()
                ),
            ),
        }
    }

    /// Whether both bounds are positions rather than labels
    pub fn is_positional(&self) -> bool {
        let positional = |v: &Val| matches!(v, Val::None | Val::Int(_) | Val::Bool(_));
        positional(&self.lower) && positional(&self.upper)
    }

    /// Positions selected from a sequence of `len` items, Python semantics
    pub fn indices(&self, len: usize) -> EvalResult<Vec<usize>> {
        let step = Self::bound(&self.step, "step")?.unwrap_or(1);
        if step == 0 {
            return raise(ExcKind::ValueError, "slice step cannot be zero");
        }
        let len = len as i64;
        let clamp = |bound: Option<i64>, default: i64| -> i64 {
            match bound {
                None => default,
                Some(n) if n < 0 => {
                    let n = n + len;
                    if step > 0 {
                        n.max(0)
                    } else {
                        n.max(-1)
                    }
                }
                Some(n) => {
                    if step > 0 {
                        n.min(len)
                    } else {
                        n.min(len - 1)
                    }
                }
            }
        };
        let lower = Self::bound(&self.lower, "indices")?;
        let upper = Self::bound(&self.upper, "indices")?;
        let mut out = Vec::new();
        if step > 0 {
            let (mut i, end) = (clamp(lower, 0), clamp(upper, len));
            while i < end {
                out.push(i as usize);
                i += step;
            }
        } else {
            let (mut i, end) = (clamp(lower, len - 1), clamp(upper, -1));
            while i > end {
                out.push(i as usize);
                i += step;
            }
        }
        Ok(out)
    }
}

/* ===================== Callables ===================== */

/// Attribute looked up on a receiver, waiting to be called
#[derive(Debug, Clone)]
pub struct Method {
    pub receiver: Val,
    pub name: String,
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Lambda(Expr),
}

/// User-defined function (`def`) or lambda
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    /// Defaults evaluated at definition time, aligned with `params`
    pub defaults: Vec<Option<Val>>,
    pub body: FunctionBody,
    /// Enclosing function locals visible to the body
    pub captured: HashMap<String, Val>,
}

/* ===================== pandas Objects ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    One(String),
    Many(Vec<String>),
}

/// Result of `df.groupby(keys)` or `df.resample(rule)`, optionally narrowed with `[...]`
#[derive(Debug, Clone)]
pub struct GroupBy {
    pub frame: Rc<DataFrame>,
    /// One column of labels per grouping level, aligned with the frame rows
    pub keys: Vec<Vec<Cell>>,
    pub names: Vec<String>,
    pub selection: Option<Selection>,
    /// `as_index=False`: group labels come back as columns
    pub flat: bool,
    /// Labels that must appear even without rows (resample bins)
    pub bins: Vec<Cell>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    Loc,
    Iloc,
    Dt,
    Str,
    Rolling { window: usize, min_periods: usize },
}

/// `.loc`, `.iloc`, `.dt`, `.str` and `.rolling(n)` bound to their frame or series
#[derive(Debug, Clone)]
pub struct Accessor {
    pub kind: AccessorKind,
    pub target: Val,
}

/* ===================== Modules & Plotting ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Pandas,
    Numpy,
    Math,
    Pyplot,
    Seaborn,
    Datetime,
}

impl Module {
    pub fn name(&self) -> &'static str {
        match self {
            Module::Pandas => "pandas",
            Module::Numpy => "numpy",
            Module::Math => "math",
            Module::Pyplot => "matplotlib.pyplot",
            Module::Seaborn => "seaborn",
            Module::Datetime => "datetime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotHandle {
    Figure,
    /// Panel position within the figure
    Axes(usize),
}

/* ===================== Construction ===================== */

impl Val {
    pub fn str(text: impl Into<String>) -> Val {
        Val::Str(text.into())
    }

    pub fn list(items: Vec<Val>) -> Val {
        Val::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Val>) -> Val {
        Val::Tuple(Rc::new(items))
    }

    pub fn dict(items: Vec<(Val, Val)>) -> Val {
        Val::Dict(Rc::new(RefCell::new(items)))
    }

    pub fn frame(frame: DataFrame) -> Val {
        Val::Frame(Rc::new(frame))
    }

    pub fn series(series: Series) -> Val {
        Val::Series(Rc::new(series))
    }

    pub fn method(receiver: Val, name: &str) -> Val {
        Val::Method(Rc::new(Method {
            receiver,
            name: name.to_string(),
        }))
    }

    pub fn from_cell(cell: &Cell) -> Val {
        match cell {
            Cell::Null => Val::None,
            Cell::Bool(b) => Val::Bool(*b),
            Cell::Int(n) => Val::Int(*n),
            Cell::Float(x) => Val::Float(*x),
            Cell::Str(s) => Val::Str(s.clone()),
            Cell::Time(t) => Val::Time(*t),
            Cell::Date(d) => Val::Date(*d),
            Cell::Delta(s) => Val::Delta(*s),
            Cell::Tuple(parts) => Val::tuple(parts.iter().map(Val::from_cell).collect()),
        }
    }

    /// Scalar form for storage in a table; None for containers and objects
    pub fn to_cell(&self) -> Option<Cell> {
        Some(match self {
            Val::None => Cell::Null,
            Val::Bool(b) => Cell::Bool(*b),
            Val::Int(n) => Cell::Int(*n),
            Val::Float(x) => Cell::Float(*x),
            Val::Str(s) => Cell::Str(s.clone()),
            Val::Time(t) => Cell::Time(*t),
            Val::Date(d) => Cell::Date(*d),
            Val::Delta(s) => Cell::Delta(*s),
            Val::Tuple(items) => Cell::Tuple(
                items
                    .iter()
                    .map(Val::to_cell)
                    .collect::<Option<Vec<_>>>()?,
            ),
            _ => return None,
        })
    }

    pub fn expect_cell(&self) -> EvalResult<Cell> {
        match self.to_cell() {
            Some(cell) => Ok(cell),
            None => raise(
                ExcKind::TypeError,
                format!("unsupported value of type '{}' in a column", self.type_name()),
            ),
        }
    }
}

/* ===================== Inspection ===================== */

impl Val {
    pub fn type_name(&self) -> &'static str {
        match self {
            Val::None => "NoneType",
            Val::Bool(_) => "bool",
            Val::Int(_) => "int",
            Val::Float(_) => "float",
            Val::Str(_) => "str",
            Val::Time(_) => "Timestamp",
            Val::Date(_) => "date",
            Val::Delta(_) => "Timedelta",
            Val::List(_) => "list",
            Val::Tuple(_) => "tuple",
            Val::Dict(_) => "dict",
            Val::Slice(_) => "slice",
            Val::Frame(_) => "DataFrame",
            Val::Series(_) => "Series",
            Val::GroupBy(_) => "DataFrameGroupBy",
            Val::Accessor(_) => "accessor",
            Val::Module(_) => "module",
            Val::Builtin(_) => "builtin_function_or_method",
            Val::Method(_) => "method",
            Val::Function(_) => "function",
            Val::Exception(_) => "Exception",
            Val::ExcType(_) => "type",
            Val::Plot(PlotHandle::Figure) => "Figure",
            Val::Plot(PlotHandle::Axes(_)) => "Axes",
            Val::Inert => "object",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Val::None)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Val::Int(_) | Val::Float(_) | Val::Bool(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Val::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Val::Int(n) => Some(*n as f64),
            Val::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Val::Bool(b) => Some(*b as i64),
            Val::Int(n) => Some(*n),
            Val::Float(x) if x.fract() == 0.0 && x.is_finite() => Some(*x as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Val::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Python truthiness; pandas objects refuse, as in pandas
    pub fn truthy(&self) -> EvalResult<bool> {
        Ok(match self {
            Val::None => false,
            Val::Bool(b) => *b,
            Val::Int(n) => *n != 0,
            Val::Float(x) => *x != 0.0,
            Val::Str(s) => !s.is_empty(),
            Val::Delta(s) => *s != 0,
            Val::List(items) => !items.borrow().is_empty(),
            Val::Tuple(items) => !items.is_empty(),
            Val::Dict(items) => !items.borrow().is_empty(),
            Val::Frame(_) | Val::Series(_) => {
                return raise(
                    ExcKind::ValueError,
                    format!(
                        "The truth value of a {} is ambiguous. Use a.empty, a.bool(), a.item(), a.any() or a.all().",
                        self.type_name()
                    ),
                )
            }
            _ => true,
        })
    }

    /// Python `==` for scalars and containers
    pub fn py_eq(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::None, Val::None) => true,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::List(a), Val::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.py_eq(y))
            }
            (Val::Tuple(a), Val::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.py_eq(y))
            }
            (Val::Dict(a), Val::Dict(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter().any(|(k2, v2)| k.py_eq(k2) && v.py_eq(v2))
                    })
            }
            (Val::ExcType(a), Val::ExcType(b)) => a == b,
            (Val::Module(a), Val::Module(b)) => a == b,
            (Val::Builtin(a), Val::Builtin(b)) => a == b,
            (a, b) => match (a.to_cell(), b.to_cell()) {
                (Some(x), Some(y)) if !matches!(x, Cell::Null) && !matches!(y, Cell::Null) => {
                    x.loose_eq(&y)
                }
                _ => false,
            },
        }
    }
}

/* ===================== Text ===================== */

impl Val {
    /// `str(value)`
    pub fn to_str(&self) -> String {
        match self {
            Val::Str(s) => s.clone(),
            Val::Float(x) => py_float(*x),
            Val::Time(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
            Val::Date(d) => d.format("%Y-%m-%d").to_string(),
            Val::Delta(s) => format_delta(*s),
            Val::Frame(frame) => frame_to_string(frame),
            Val::Series(series) => series_to_string(series),
            Val::Exception(exc) => exc.message.clone(),
            _ => self.repr(),
        }
    }

    /// `repr(value)`
    pub fn repr(&self) -> String {
        match self {
            Val::None => "None".to_string(),
            Val::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Val::Int(n) => n.to_string(),
            Val::Float(x) => py_float(*x),
            Val::Str(s) => py_str_repr(s),
            Val::Time(t) => format!("Timestamp('{}')", t.format("%Y-%m-%d %H:%M:%S")),
            Val::Date(d) => format!("datetime.date({})", d.format("%Y, %-m, %-d")),
            Val::Delta(s) => format!("Timedelta('{}')", format_delta(*s)),
            Val::List(items) => {
                let parts: Vec<String> = items.borrow().iter().map(Val::repr).collect();
                format!("[{}]", parts.join(", "))
            }
            Val::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(Val::repr).collect();
                if parts.len() == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
            Val::Dict(items) => {
                let parts: Vec<String> = items
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Val::Slice(slice) => format!(
                "slice({}, {}, {})",
                slice.lower.repr(),
                slice.upper.repr(),
                slice.step.repr()
            ),
            Val::Frame(frame) => frame_to_string(frame),
            Val::Series(series) => series_to_string(series),
            Val::GroupBy(_) => "<pandas.core.groupby.DataFrameGroupBy object>".to_string(),
            Val::Accessor(_) => "<accessor object>".to_string(),
            Val::Module(m) => format!("<module '{}'>", m.name()),
            Val::Builtin(name) => format!("<built-in function {}>", name),
            Val::Method(m) => format!("<bound method {} of {}>", m.name, m.receiver.type_name()),
            Val::Function(f) => format!("<function {}>", f.name),
            Val::Exception(exc) => exc.repr(),
            Val::ExcType(kind) => format!("<class '{}'>", kind.name()),
            Val::Plot(PlotHandle::Figure) => "<Figure>".to_string(),
            Val::Plot(PlotHandle::Axes(_)) => "<Axes>".to_string(),
            Val::Inert => "<object>".to_string(),
        }
    }
}

/// Text of a cell as `str()` would print it
pub fn cell_str(cell: &Cell) -> String {
    match cell {
        Cell::Float(x) => py_float(*x),
        Cell::Null => "None".to_string(),
        other => label_text(other),
    }
}

pub fn exception_val(exc: Exception) -> Val {
    Val::Exception(Rc::new(exc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr_of_containers() {
        let v = Val::list(vec![Val::Int(1), Val::Float(2.5), Val::str("a")]);
        assert_eq!(v.repr(), "[1, 2.5, 'a']");
        assert_eq!(Val::tuple(vec![Val::Int(1)]).repr(), "(1,)");
        let d = Val::dict(vec![(Val::str("k"), Val::None)]);
        assert_eq!(d.repr(), "{'k': None}");
    }

    #[test]
    fn test_lists_are_shared_references() {
        let a = Val::list(vec![]);
        let b = a.clone();
        if let Val::List(items) = &b {
            items.borrow_mut().push(Val::Int(1));
        }
        assert_eq!(a.repr(), "[1]");
    }

    #[test]
    fn test_numeric_equality_crosses_types() {
        assert!(Val::Int(1).py_eq(&Val::Float(1.0)));
        assert!(!Val::Float(f64::NAN).py_eq(&Val::Float(f64::NAN)));
        assert!(!Val::None.py_eq(&Val::Int(0)));
    }

    #[test]
    fn test_slice_indices() {
        let slice = |lower: Val, upper: Val, step: Val| SliceVal { lower, upper, step };
        assert_eq!(
            slice(Val::Int(1), Val::None, Val::None).indices(4).unwrap(),
            vec![1, 2, 3]
        );
        assert_eq!(
            slice(Val::Int(-2), Val::None, Val::None).indices(4).unwrap(),
            vec![2, 3]
        );
        assert_eq!(
            slice(Val::None, Val::None, Val::Int(-1)).indices(3).unwrap(),
            vec![2, 1, 0]
        );
        assert!(slice(Val::None, Val::None, Val::Int(0)).indices(3).is_err());
    }

    #[test]
    fn test_series_truthiness_is_ambiguous() {
        let s = Val::series(Series::new(None, vec![Cell::Int(1)]));
        assert!(s.truthy().is_err());
    }
}
