//! Python built-in functions and the methods of list, tuple and dict

use super::{strings, Args, KW};
use crate::sandbox::interpreter::operators::{self, abs_cell};
use crate::sandbox::interpreter::Interpreter;
use crate::sandbox::types::ast::CompareOp;
use crate::sandbox::types::errors::py_str_repr;
use crate::sandbox::types::values::DictRef;
use crate::sandbox::types::{raise, EvalResult, ExcKind, Exception, Module, Val};
use std::cmp::Ordering;

const FUNCTIONS: [&str; 43] = [
    "print", "len", "range", "int", "float", "str", "bool", "list", "tuple", "dict", "set",
    "sorted", "reversed", "enumerate", "zip", "sum", "min", "max", "abs", "round",
    "isinstance", "type", "any", "all", "map", "filter", "divmod", "pow", "getattr", "hasattr",
    "repr", "format", "next", "iter", "chr", "ord", "callable", "frozenset", "object", "vars",
    "id", "hash", "slice",
];

/// Global names that are not bound by the program
pub fn lookup(name: &str) -> Option<Val> {
    if let Some(kind) = ExcKind::from_name(name) {
        return Some(Val::ExcType(kind));
    }
    FUNCTIONS.iter().copied().find(|f| *f == name).map(Val::Builtin)
}

pub fn call(interp: &mut Interpreter, name: &str, args: Args) -> EvalResult<Val> {
    match name {
        "print" => {
            let sep = args.str_opt(KW, "sep")?.unwrap_or_else(|| " ".to_string());
            let end = args.str_opt(KW, "end")?.unwrap_or_else(|| "\n".to_string());
            let text: Vec<String> = args.positional.iter().map(Val::to_str).collect();
            interp.write_stdout(&format!("{}{}", text.join(&sep), end));
            Ok(Val::None)
        }
        "len" => len(args.required(0, "obj", "len")?).map(|n| Val::Int(n as i64)),
        "range" => range(interp, &args),
        "int" => to_int(args.get(0, "x").unwrap_or(&Val::Int(0))),
        "float" => to_float(args.get(0, "x").unwrap_or(&Val::Float(0.0))),
        "str" => Ok(Val::Str(args.get(0, "object").map(Val::to_str).unwrap_or_default())),
        "repr" => Ok(Val::Str(args.required(0, "obj", "repr")?.repr())),
        "bool" => Ok(Val::Bool(match args.get(0, "x") {
            Some(value) => value.truthy()?,
            None => false,
        })),
        "list" => match args.get(0, "iterable") {
            Some(value) => Ok(Val::list(interp.iterate(value)?)),
            None => Ok(Val::list(Vec::new())),
        },
        "tuple" => match args.get(0, "iterable") {
            Some(value) => Ok(Val::tuple(interp.iterate(value)?)),
            None => Ok(Val::tuple(Vec::new())),
        },
        "set" | "frozenset" => {
            let items = match args.get(0, "iterable") {
                Some(value) => interp.iterate(value)?,
                None => Vec::new(),
            };
            Ok(Val::list(unique(items)))
        }
        "dict" => dict_from(interp, args),
        "iter" => Ok(Val::list(interp.iterate(args.required(0, "iterable", "iter")?)?)),
        "next" => {
            let items = interp.iterate(args.required(0, "iterator", "next")?)?;
            match items.into_iter().next() {
                Some(first) => Ok(first),
                None => match args.get(1, "default") {
                    Some(default) => Ok(default.clone()),
                    None => raise(ExcKind::StopIteration, ""),
                },
            }
        }
        "sorted" => {
            let items = interp.iterate(args.required(0, "iterable", "sorted")?)?;
            let key = args.given(KW, "key").cloned();
            let reverse = args.bool_or(KW, "reverse", false)?;
            sort_values(interp, items, key.as_ref(), reverse).map(Val::list)
        }
        "reversed" => {
            let mut items = interp.iterate(args.required(0, "sequence", "reversed")?)?;
            items.reverse();
            Ok(Val::list(items))
        }
        "enumerate" => {
            let items = interp.iterate(args.required(0, "iterable", "enumerate")?)?;
            let start = args.int_opt(1, "start")?.unwrap_or(0);
            Ok(Val::list(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| Val::tuple(vec![Val::Int(start + i as i64), v]))
                    .collect(),
            ))
        }
        "zip" => {
            let mut columns = Vec::with_capacity(args.len());
            for value in &args.positional {
                columns.push(interp.iterate(value)?);
            }
            let shortest = columns.iter().map(Vec::len).min().unwrap_or(0);
            Ok(Val::list(
                (0..shortest)
                    .map(|i| Val::tuple(columns.iter().map(|c| c[i].clone()).collect()))
                    .collect(),
            ))
        }
        "sum" => {
            let items = interp.iterate(args.required(0, "iterable", "sum")?)?;
            let mut total = args.get(1, "start").cloned().unwrap_or(Val::Int(0));
            for item in items {
                total = operators::binary(crate::sandbox::types::ast::BinaryOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        "min" | "max" => extreme(interp, name, &args),
        "abs" => abs(args.required(0, "x", "abs")?),
        "round" => {
            let value = args.required(0, "number", "round")?;
            let digits = args.int_opt(1, "ndigits")?;
            round_value(value, digits)
        }
        "isinstance" => {
            let value = args.required(0, "obj", "isinstance")?;
            let class = args.required(1, "class_or_tuple", "isinstance")?;
            let classes = match class {
                Val::Tuple(items) => items.as_ref().clone(),
                other => vec![other.clone()],
            };
            Ok(Val::Bool(classes.iter().any(|c| is_instance(value, c))))
        }
        "type" => {
            let value = args.required(0, "object", "type")?;
            Ok(match value {
                Val::Int(_) => Val::Builtin("int"),
                Val::Float(_) => Val::Builtin("float"),
                Val::Str(_) => Val::Builtin("str"),
                Val::Bool(_) => Val::Builtin("bool"),
                Val::List(_) => Val::Builtin("list"),
                Val::Tuple(_) => Val::Builtin("tuple"),
                Val::Dict(_) => Val::Builtin("dict"),
                Val::Exception(exc) => Val::ExcType(exc.kind),
                other => Val::Str(format!("<class '{}'>", other.type_name())),
            })
        }
        "any" | "all" => {
            let items = interp.iterate(args.required(0, "iterable", name)?)?;
            let mut result = name == "all";
            for item in items {
                if item.truthy()? != result {
                    result = !result;
                    break;
                }
            }
            Ok(Val::Bool(result))
        }
        "map" => {
            let function = args.required(0, "function", "map")?.clone();
            let mut columns = Vec::new();
            for value in args.positional.iter().skip(1) {
                columns.push(interp.iterate(value)?);
            }
            let shortest = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut out = Vec::with_capacity(shortest);
            for i in 0..shortest {
                let call_args = Args::new(columns.iter().map(|c| c[i].clone()).collect());
                out.push(interp.call_value(&function, call_args)?);
            }
            Ok(Val::list(out))
        }
        "filter" => {
            let function = args.required(0, "function", "filter")?.clone();
            let items = interp.iterate(args.required(1, "iterable", "filter")?)?;
            let mut out = Vec::new();
            for item in items {
                let keep = if function.is_none() {
                    item.truthy()?
                } else {
                    interp.call1(&function, item.clone())?.truthy()?
                };
                if keep {
                    out.push(item);
                }
            }
            Ok(Val::list(out))
        }
        "divmod" => {
            use crate::sandbox::types::ast::BinaryOp;
            let a = args.required(0, "a", "divmod")?;
            let b = args.required(1, "b", "divmod")?;
            Ok(Val::tuple(vec![
                operators::binary(BinaryOp::FloorDiv, a, b)?,
                operators::binary(BinaryOp::Mod, a, b)?,
            ]))
        }
        "pow" => operators::binary(
            crate::sandbox::types::ast::BinaryOp::Pow,
            args.required(0, "base", "pow")?,
            args.required(1, "exp", "pow")?,
        ),
        "getattr" | "hasattr" => {
            let object = args.required(0, "object", name)?.clone();
            let attr = match args.required(1, "name", name)? {
                Val::Str(s) => s.clone(),
                _ => return raise(ExcKind::TypeError, "attribute name must be string"),
            };
            match (super::get_attr(interp, &object, &attr), name) {
                (Ok(value), "getattr") => Ok(value),
                (Ok(_), _) => Ok(Val::Bool(true)),
                (Err(crate::sandbox::types::Unwind::Raise(exc)), "hasattr")
                    if exc.kind == ExcKind::AttributeError =>
                {
                    Ok(Val::Bool(false))
                }
                (Err(crate::sandbox::types::Unwind::Raise(exc)), _)
                    if exc.kind == ExcKind::AttributeError && args.get(2, "default").is_some() =>
                {
                    Ok(args.get(2, "default").cloned().unwrap_or(Val::None))
                }
                (Err(err), _) => Err(err),
            }
        }
        "format" => {
            let value = args.required(0, "value", "format")?;
            let spec = args.str_opt(1, "format_spec")?.unwrap_or_default();
            strings::format_value(value, &spec).map(Val::Str)
        }
        "chr" => {
            let code = args.int_opt(0, "i")?.unwrap_or(0);
            match u32::try_from(code).ok().and_then(char::from_u32) {
                Some(c) => Ok(Val::Str(c.to_string())),
                None => raise(ExcKind::ValueError, "chr() arg not in range(0x110000)"),
            }
        }
        "ord" => match args.required(0, "c", "ord")? {
            Val::Str(s) if s.chars().count() == 1 => {
                Ok(Val::Int(s.chars().next().map(|c| c as i64).unwrap_or(0)))
            }
            other => raise(
                ExcKind::TypeError,
                format!("ord() expected a character, but got {}", other.repr()),
            ),
        },
        "callable" => Ok(Val::Bool(matches!(
            args.required(0, "obj", "callable")?,
            Val::Builtin(_) | Val::Function(_) | Val::Method(_) | Val::ExcType(_)
        ))),
        "slice" => {
            let lower = args.get(0, "start").cloned().unwrap_or(Val::None);
            let upper = args.get(1, "stop").cloned().unwrap_or(Val::None);
            let (lower, upper) = if args.len() == 1 {
                (Val::None, lower)
            } else {
                (lower, upper)
            };
            Ok(Val::Slice(std::rc::Rc::new(crate::sandbox::types::SliceVal {
                lower,
                upper,
                step: args.get(2, "step").cloned().unwrap_or(Val::None),
            })))
        }
        "id" | "hash" => Ok(Val::Int(0)),
        "object" | "vars" => Ok(Val::Inert),
        other => raise(
            ExcKind::NameError,
            format!("name '{}' is not defined", other),
        ),
    }
}

/* ===================== Conversions ===================== */

pub fn len(value: &Val) -> EvalResult<usize> {
    Ok(match value {
        Val::Str(s) => s.chars().count(),
        Val::List(items) => items.borrow().len(),
        Val::Tuple(items) => items.len(),
        Val::Dict(entries) => entries.borrow().len(),
        Val::Frame(frame) => frame.len(),
        Val::Series(series) => series.len(),
        Val::GroupBy(groups) => super::pandas::groupby::group_count(groups)?,
        other => {
            return raise(
                ExcKind::TypeError,
                format!("object of type '{}' has no len()", other.type_name()),
            )
        }
    })
}

fn range(interp: &mut Interpreter, args: &Args) -> EvalResult<Val> {
    let bound = |i: usize| -> EvalResult<Option<i64>> {
        match args.positional.get(i) {
            None => Ok(None),
            Some(value) => match value {
                Val::Int(n) => Ok(Some(*n)),
                Val::Bool(b) => Ok(Some(*b as i64)),
                other => raise(
                    ExcKind::TypeError,
                    format!(
                        "'{}' object cannot be interpreted as an integer",
                        other.type_name()
                    ),
                ),
            },
        }
    };
    let (start, stop, step) = match args.len() {
        0 => return raise(ExcKind::TypeError, "range expected at least 1 argument, got 0"),
        1 => (0, bound(0)?.unwrap_or(0), 1),
        _ => (
            bound(0)?.unwrap_or(0),
            bound(1)?.unwrap_or(0),
            bound(2)?.unwrap_or(1),
        ),
    };
    if step == 0 {
        return raise(ExcKind::ValueError, "range() arg 3 must not be zero");
    }
    let count = if (step > 0 && start < stop) || (step < 0 && start > stop) {
        let (span, stride) = ((stop as i128 - start as i128).abs(), (step as i128).abs());
        (span + stride - 1) / stride
    } else {
        0
    };
    interp.check_len(usize::try_from(count).unwrap_or(usize::MAX))?;
    Ok(Val::list((0..count as i64).map(|i| Val::Int(start + i * step)).collect()))
}

pub fn to_int(value: &Val) -> EvalResult<Val> {
    match value {
        Val::Int(n) => Ok(Val::Int(*n)),
        Val::Bool(b) => Ok(Val::Int(*b as i64)),
        Val::Float(x) if x.is_nan() => raise(ExcKind::ValueError, "cannot convert float NaN to integer"),
        Val::Float(x) if x.is_infinite() => raise(
            ExcKind::ArithmeticError,
            "cannot convert float infinity to integer",
        ),
        Val::Float(x) => Ok(Val::Int(x.trunc() as i64)),
        Val::Str(s) => match s.trim().replace('_', "").parse::<i64>() {
            Ok(n) => Ok(Val::Int(n)),
            Err(_) => raise(
                ExcKind::ValueError,
                format!("invalid literal for int() with base 10: {}", py_str_repr(s)),
            ),
        },
        Val::Delta(s) => Ok(Val::Int(*s)),
        Val::Series(series) if series.len() == 1 => to_int(&Val::from_cell(&series.values[0])),
        other => raise(
            ExcKind::TypeError,
            format!(
                "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                other.type_name()
            ),
        ),
    }
}

pub fn to_float(value: &Val) -> EvalResult<Val> {
    match value {
        Val::Str(s) => {
            let text = s.trim().to_ascii_lowercase();
            let parsed = match text.as_str() {
                "nan" => Some(f64::NAN),
                "inf" | "infinity" => Some(f64::INFINITY),
                "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                _ => text.parse::<f64>().ok(),
            };
            match parsed {
                Some(x) => Ok(Val::Float(x)),
                None => raise(
                    ExcKind::ValueError,
                    format!("could not convert string to float: {}", py_str_repr(s)),
                ),
            }
        }
        Val::None => raise(
            ExcKind::TypeError,
            "float() argument must be a string or a real number, not 'NoneType'",
        ),
        Val::Series(series) if series.len() == 1 => {
            to_float(&Val::from_cell(&series.values[0]))
        }
        other => match other.as_f64() {
            Some(x) => Ok(Val::Float(x)),
            None => raise(
                ExcKind::TypeError,
                format!(
                    "float() argument must be a string or a real number, not '{}'",
                    other.type_name()
                ),
            ),
        },
    }
}

fn dict_from(interp: &mut Interpreter, args: Args) -> EvalResult<Val> {
    let dict = Val::dict(Vec::new());
    if let Val::Dict(entries) = &dict {
        if let Some(source) = args.positional.first() {
            match source {
                Val::Dict(other) => {
                    for (k, v) in other.borrow().iter() {
                        dict_set(entries, k.clone(), v.clone())?;
                    }
                }
                other => {
                    for pair in interp.iterate(other)? {
                        let parts = interp.iterate(&pair)?;
                        match parts.as_slice() {
                            [k, v] => dict_set(entries, k.clone(), v.clone())?,
                            _ => {
                                return raise(
                                    ExcKind::ValueError,
                                    "dictionary update sequence element has wrong length",
                                )
                            }
                        }
                    }
                }
            }
        }
        for (k, v) in args.keywords {
            dict_set(entries, Val::Str(k), v)?;
        }
    }
    Ok(dict)
}

fn abs(value: &Val) -> EvalResult<Val> {
    match value {
        Val::Bool(b) => Ok(Val::Int(*b as i64)),
        Val::Int(_) | Val::Float(_) | Val::Delta(_) => Ok(Val::from_cell(&abs_cell(&value.expect_cell()?)?)),
        Val::Series(series) => {
            let values = series.values.iter().map(abs_cell).collect::<EvalResult<Vec<_>>>()?;
            Ok(Val::series(series.map_values(values)))
        }
        other => raise(
            ExcKind::TypeError,
            format!("bad operand type for abs(): '{}'", other.type_name()),
        ),
    }
}

/// Python `round`: ties to even, correctly rounded on the decimal expansion
pub fn py_round(x: f64, digits: i64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    if digits < -308 {
        return 0f64.copysign(x);
    }
    if digits > 340 {
        return x;
    }
    if digits < 0 {
        let factor = 10f64.powi((-digits) as i32);
        return round_half_even(x / factor) * factor;
    }
    if digits == 0 {
        return round_half_even(x);
    }
    format!("{:.*}", digits as usize, x).parse().unwrap_or(x)
}

fn round_half_even(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 && rounded % 2.0 != 0.0 {
        rounded - x.signum()
    } else {
        rounded
    }
}

pub fn round_value(value: &Val, digits: Option<i64>) -> EvalResult<Val> {
    match (value, digits) {
        (Val::Int(n), _) => Ok(Val::Int(*n)),
        (Val::Bool(b), _) => Ok(Val::Int(*b as i64)),
        (Val::Float(x), None) => {
            if !x.is_finite() {
                return raise(
                    ExcKind::ValueError,
                    "cannot convert float NaN or infinity to integer",
                );
            }
            Ok(Val::Int(round_half_even(*x) as i64))
        }
        (Val::Float(x), Some(d)) => Ok(Val::Float(py_round(*x, d))),
        (Val::Series(series), d) => {
            let d = d.unwrap_or(0);
            Ok(Val::series(super::pandas::series::round(series, d)))
        }
        (Val::Frame(frame), d) => Ok(Val::frame(super::pandas::frame::round(frame, d.unwrap_or(0)))),
        (other, _) => raise(
            ExcKind::TypeError,
            format!(
                "type {} doesn't define __round__ method",
                other.type_name()
            ),
        ),
    }
}

fn is_instance(value: &Val, class: &Val) -> bool {
    match class {
        Val::Builtin(name) => match *name {
            "int" => matches!(value, Val::Int(_) | Val::Bool(_)),
            "float" => matches!(value, Val::Float(_)),
            "str" => matches!(value, Val::Str(_)),
            "bool" => matches!(value, Val::Bool(_)),
            "list" => matches!(value, Val::List(_)),
            "tuple" => matches!(value, Val::Tuple(_)),
            "dict" => matches!(value, Val::Dict(_)),
            _ => false,
        },
        Val::ExcType(kind) => match value {
            Val::Exception(exc) => exc.kind.is_subclass_of(*kind),
            _ => false,
        },
        Val::Method(method) => match (&method.receiver, method.name.as_str(), value) {
            (Val::Module(Module::Pandas), "DataFrame", Val::Frame(_)) => true,
            (Val::Module(Module::Pandas), "Series", Val::Series(_)) => true,
            (Val::Module(Module::Pandas), "Timestamp", Val::Time(_)) => true,
            (Val::Module(Module::Pandas), "Timedelta", Val::Delta(_)) => true,
            (Val::Module(Module::Datetime), "datetime", Val::Time(_)) => true,
            (Val::Module(Module::Datetime), "date", Val::Date(_) | Val::Time(_)) => true,
            (Val::Module(Module::Datetime), "timedelta", Val::Delta(_)) => true,
            (Val::Module(Module::Numpy), "ndarray", Val::List(_) | Val::Series(_)) => true,
            (Val::Module(Module::Numpy), "integer" | "int64", Val::Int(_)) => true,
            (Val::Module(Module::Numpy), "floating" | "float64", Val::Float(_)) => true,
            (Val::Module(Module::Numpy), "number", v) => v.is_number(),
            _ => false,
        },
        _ => false,
    }
}

/* ===================== Ordering ===================== */

/// Python ordering between two values, raising TypeError when unorderable
pub fn py_cmp(a: &Val, b: &Val) -> EvalResult<Ordering> {
    if operators::compare(CompareOp::Lt, a, b)?.truthy()? {
        Ok(Ordering::Less)
    } else if operators::compare(CompareOp::Lt, b, a)?.truthy()? {
        Ok(Ordering::Greater)
    } else {
        Ok(Ordering::Equal)
    }
}

/// Stable sort with an optional key function
pub fn sort_values(
    interp: &mut Interpreter,
    items: Vec<Val>,
    key: Option<&Val>,
    reverse: bool,
) -> EvalResult<Vec<Val>> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let k = match key {
            Some(function) => interp.call1(function, item.clone())?,
            None => item.clone(),
        };
        keyed.push((k, item));
    }
    let mut failure = None;
    keyed.sort_by(|(a, _), (b, _)| {
        let ord = match py_cmp(a, b) {
            Ok(ord) => ord,
            Err(err) => {
                failure.get_or_insert(err);
                Ordering::Equal
            }
        };
        if reverse {
            ord.reverse()
        } else {
            ord
        }
    });
    if let Some(err) = failure {
        return Err(err);
    }
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

fn extreme(interp: &mut Interpreter, name: &str, args: &Args) -> EvalResult<Val> {
    let items = if args.len() == 1 {
        interp.iterate(&args.positional[0])?
    } else {
        args.positional.clone()
    };
    let key = args.given(KW, "key").cloned();
    let mut best: Option<(Val, Val)> = None;
    for item in items {
        let k = match &key {
            Some(function) => interp.call1(function, item.clone())?,
            None => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((current, _)) => {
                let ord = py_cmp(&k, current)?;
                if name == "min" {
                    ord == Ordering::Less
                } else {
                    ord == Ordering::Greater
                }
            }
        };
        if replace {
            best = Some((k, item));
        }
    }
    match best {
        Some((_, item)) => Ok(item),
        None => match args.kw("default") {
            Some(default) => Ok(default.clone()),
            None => raise(
                ExcKind::ValueError,
                format!("{}() arg is an empty sequence", name),
            ),
        },
    }
}

fn unique(items: Vec<Val>) -> Vec<Val> {
    let mut out: Vec<Val> = Vec::with_capacity(items.len());
    for item in items {
        if !out.iter().any(|seen| seen.py_eq(&item)) {
            out.push(item);
        }
    }
    out
}

/* ===================== Dict ===================== */

fn check_hashable(key: &Val) -> EvalResult<()> {
    match key {
        Val::List(_) | Val::Dict(_) | Val::Frame(_) | Val::Series(_) => raise(
            ExcKind::TypeError,
            format!("unhashable type: '{}'", key.type_name()),
        ),
        _ => Ok(()),
    }
}

/// Insert or replace, keeping first-insertion order
pub fn dict_set(entries: &DictRef, key: Val, value: Val) -> EvalResult<()> {
    check_hashable(&key)?;
    let mut entries = entries.borrow_mut();
    match entries.iter_mut().find(|(k, _)| k.py_eq(&key)) {
        Some(slot) => slot.1 = value,
        None => entries.push((key, value)),
    }
    Ok(())
}

pub fn dict_get(entries: &DictRef, key: &Val) -> Option<Val> {
    entries
        .borrow()
        .iter()
        .find(|(k, _)| k.py_eq(key))
        .map(|(_, v)| v.clone())
}

fn key_error(key: &Val) -> crate::sandbox::types::Unwind {
    Exception::new(ExcKind::KeyError, key.repr()).into()
}

/* ===================== Methods ===================== */

pub fn has_method(receiver: &Val, name: &str) -> bool {
    let methods: &[&str] = match receiver {
        Val::List(_) => &[
            "append", "extend", "insert", "pop", "remove", "index", "count", "sort", "reverse",
            "copy", "clear", "tolist", "flatten", "ravel",
        ],
        Val::Tuple(_) => &["count", "index"],
        Val::Dict(_) => &[
            "get", "keys", "values", "items", "update", "pop", "setdefault", "copy", "clear",
        ],
        _ => &[],
    };
    methods.contains(&name)
}

pub fn call_method(
    interp: &mut Interpreter,
    receiver: &Val,
    name: &str,
    args: Args,
) -> EvalResult<Val> {
    match receiver {
        Val::List(items) => match name {
            "append" => {
                let len = items.borrow().len() + 1;
                interp.check_len(len)?;
                items
                    .borrow_mut()
                    .push(args.required(0, "object", "append")?.clone());
                Ok(Val::None)
            }
            "extend" => {
                let extra = interp.iterate(args.required(0, "iterable", "extend")?)?;
                let len = items.borrow().len() + extra.len();
                interp.check_len(len)?;
                items.borrow_mut().extend(extra);
                Ok(Val::None)
            }
            "insert" => {
                let len = items.borrow().len() as i64;
                let at = args.int_opt(0, "index")?.unwrap_or(0);
                let at = if at < 0 { (at + len).max(0) } else { at.min(len) } as usize;
                items
                    .borrow_mut()
                    .insert(at, args.required(1, "object", "insert")?.clone());
                Ok(Val::None)
            }
            "pop" => {
                let len = items.borrow().len();
                if len == 0 {
                    return raise(ExcKind::IndexError, "pop from empty list");
                }
                let at = args.int_opt(0, "index")?.unwrap_or(-1);
                match normalize_index(at, len) {
                    Some(pos) => Ok(items.borrow_mut().remove(pos)),
                    None => raise(ExcKind::IndexError, "pop index out of range"),
                }
            }
            "remove" => {
                let target = args.required(0, "value", "remove")?;
                let pos = items.borrow().iter().position(|v| v.py_eq(target));
                match pos {
                    Some(pos) => {
                        items.borrow_mut().remove(pos);
                        Ok(Val::None)
                    }
                    None => raise(ExcKind::ValueError, "list.remove(x): x not in list"),
                }
            }
            "index" => {
                let target = args.required(0, "value", "index")?;
                match items.borrow().iter().position(|v| v.py_eq(target)) {
                    Some(pos) => Ok(Val::Int(pos as i64)),
                    None => raise(
                        ExcKind::ValueError,
                        format!("{} is not in list", target.repr()),
                    ),
                }
            }
            "count" => {
                let target = args.required(0, "value", "count")?;
                let n = items.borrow().iter().filter(|v| v.py_eq(target)).count();
                Ok(Val::Int(n as i64))
            }
            "sort" => {
                let current = items.borrow().clone();
                let key = args.given(KW, "key").cloned();
                let reverse = args.bool_or(KW, "reverse", false)?;
                let sorted = sort_values(interp, current, key.as_ref(), reverse)?;
                *items.borrow_mut() = sorted;
                Ok(Val::None)
            }
            "reverse" => {
                items.borrow_mut().reverse();
                Ok(Val::None)
            }
            "copy" | "tolist" => Ok(Val::list(items.borrow().clone())),
            "flatten" | "ravel" => {
                let mut flat = Vec::new();
                for item in items.borrow().iter() {
                    match item {
                        Val::List(inner) => flat.extend(inner.borrow().iter().cloned()),
                        other => flat.push(other.clone()),
                    }
                }
                Ok(Val::list(flat))
            }
            "clear" => {
                items.borrow_mut().clear();
                Ok(Val::None)
            }
            _ => super::no_attribute(receiver, name),
        },

        Val::Tuple(items) => match name {
            "count" => {
                let target = args.required(0, "value", "count")?;
                Ok(Val::Int(items.iter().filter(|v| v.py_eq(target)).count() as i64))
            }
            "index" => {
                let target = args.required(0, "value", "index")?;
                match items.iter().position(|v| v.py_eq(target)) {
                    Some(pos) => Ok(Val::Int(pos as i64)),
                    None => raise(ExcKind::ValueError, "tuple.index(x): x not in tuple"),
                }
            }
            _ => super::no_attribute(receiver, name),
        },

        Val::Dict(entries) => match name {
            "get" => {
                let key = args.required(0, "key", "get")?;
                Ok(dict_get(entries, key)
                    .unwrap_or_else(|| args.get(1, "default").cloned().unwrap_or(Val::None)))
            }
            "keys" => Ok(Val::list(entries.borrow().iter().map(|(k, _)| k.clone()).collect())),
            "values" => Ok(Val::list(entries.borrow().iter().map(|(_, v)| v.clone()).collect())),
            "items" => Ok(Val::list(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| Val::tuple(vec![k.clone(), v.clone()]))
                    .collect(),
            )),
            "update" => {
                if let Some(Val::Dict(other)) = args.positional.first() {
                    let pairs = other.borrow().clone();
                    for (k, v) in pairs {
                        dict_set(entries, k, v)?;
                    }
                }
                for (k, v) in &args.keywords {
                    dict_set(entries, Val::Str(k.clone()), v.clone())?;
                }
                Ok(Val::None)
            }
            "pop" => {
                let key = args.required(0, "key", "pop")?;
                let pos = entries.borrow().iter().position(|(k, _)| k.py_eq(key));
                match (pos, args.get(1, "default")) {
                    (Some(pos), _) => Ok(entries.borrow_mut().remove(pos).1),
                    (None, Some(default)) => Ok(default.clone()),
                    (None, None) => Err(key_error(key)),
                }
            }
            "setdefault" => {
                let key = args.required(0, "key", "setdefault")?;
                if let Some(existing) = dict_get(entries, key) {
                    return Ok(existing);
                }
                let default = args.get(1, "default").cloned().unwrap_or(Val::None);
                dict_set(entries, key.clone(), default.clone())?;
                Ok(default)
            }
            "copy" => Ok(Val::dict(entries.borrow().clone())),
            "clear" => {
                entries.borrow_mut().clear();
                Ok(Val::None)
            }
            _ => super::no_attribute(receiver, name),
        },

        other => super::no_attribute(other, name),
    }
}

/* ===================== Subscripts ===================== */

pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let pos = if index < 0 { index + len } else { index };
    if (0..len).contains(&pos) {
        Some(pos as usize)
    } else {
        None
    }
}

fn sequence_item(items: &[Val], index: &Val, kind: &str) -> EvalResult<Val> {
    match index {
        Val::Slice(slice) => {
            let picked: Vec<Val> = slice
                .indices(items.len())?
                .into_iter()
                .map(|i| items[i].clone())
                .collect();
            Ok(if kind == "tuple" {
                Val::tuple(picked)
            } else {
                Val::list(picked)
            })
        }
        other => match other.as_i64().filter(|_| !matches!(other, Val::Float(_))) {
            Some(i) => match normalize_index(i, items.len()) {
                Some(pos) => Ok(items[pos].clone()),
                None => raise(
                    ExcKind::IndexError,
                    format!("{} index out of range", kind),
                ),
            },
            None => raise(
                ExcKind::TypeError,
                format!(
                    "{} indices must be integers or slices, not {}",
                    kind,
                    other.type_name()
                ),
            ),
        },
    }
}

pub fn get_item(container: &Val, index: &Val) -> EvalResult<Val> {
    match container {
        Val::List(items) => match index {
            // axes[0, 1] on a grid of subplots
            Val::Tuple(path) => {
                let mut current = container.clone();
                for step in path.iter() {
                    current = get_item(&current, step)?;
                }
                Ok(current)
            }
            _ => sequence_item(&items.borrow(), index, "list"),
        },
        Val::Tuple(items) => sequence_item(items, index, "tuple"),
        Val::Str(s) => {
            let chars: Vec<Val> = s.chars().map(|c| Val::Str(c.to_string())).collect();
            match sequence_item(&chars, index, "string")? {
                Val::List(picked) => Ok(Val::Str(
                    picked.borrow().iter().map(Val::to_str).collect::<String>(),
                )),
                single => Ok(single),
            }
        }
        Val::Dict(entries) => match dict_get(entries, index) {
            Some(value) => Ok(value),
            None => Err(key_error(index)),
        },
        other => raise(
            ExcKind::TypeError,
            format!("'{}' object is not subscriptable", other.type_name()),
        ),
    }
}

pub fn set_item(container: &mut Val, index: Val, value: Val) -> EvalResult<()> {
    match container {
        Val::List(items) => {
            let len = items.borrow().len();
            match index.as_i64().and_then(|i| normalize_index(i, len)) {
                Some(pos) => {
                    items.borrow_mut()[pos] = value;
                    Ok(())
                }
                None => raise(ExcKind::IndexError, "list assignment index out of range"),
            }
        }
        Val::Dict(entries) => dict_set(entries, index, value),
        other => raise(
            ExcKind::TypeError,
            format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ),
        ),
    }
}

pub fn del_item(container: &mut Val, index: &Val) -> EvalResult<()> {
    match container {
        Val::List(items) => {
            let len = items.borrow().len();
            match index.as_i64().and_then(|i| normalize_index(i, len)) {
                Some(pos) => {
                    items.borrow_mut().remove(pos);
                    Ok(())
                }
                None => raise(ExcKind::IndexError, "list assignment index out of range"),
            }
        }
        Val::Dict(entries) => {
            let pos = entries.borrow().iter().position(|(k, _)| k.py_eq(index));
            match pos {
                Some(pos) => {
                    entries.borrow_mut().remove(pos);
                    Ok(())
                }
                None => Err(key_error(index)),
            }
        }
        other => raise(
            ExcKind::TypeError,
            format!(
                "'{}' object does not support item deletion",
                other.type_name()
            ),
        ),
    }
}
