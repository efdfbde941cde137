//! Built-in library available to analysis code
//!
//! Attribute access, method calls and subscripts are dispatched here by
//! receiver type. Modules that may be imported are listed in `import_module`;
//! anything else raises `ImportError`.

use super::interpreter::{Interpreter, Profile};
use super::types::{raise, EvalResult, ExcKind, Module, PlotHandle, Val};

pub mod builtins;
pub mod datetime;
pub mod numpy;
pub mod pandas;
pub mod plotting;
pub mod strings;

#[cfg(test)]
mod tests;

/* ===================== Arguments ===================== */

/// Evaluated call arguments
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub positional: Vec<Val>,
    pub keywords: Vec<(String, Val)>,
}

/// Position that never matches, for keyword-only parameters
pub const KW: usize = usize::MAX;

impl Args {
    pub fn new(positional: Vec<Val>) -> Self {
        Args {
            positional,
            keywords: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    pub fn kw(&self, name: &str) -> Option<&Val> {
        self.keywords.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn take_kw(&mut self, name: &str) -> Option<Val> {
        let pos = self.keywords.iter().position(|(k, _)| k == name)?;
        Some(self.keywords.remove(pos).1)
    }

    /// Argument at position `index` or passed as `name`
    pub fn get(&self, index: usize, name: &str) -> Option<&Val> {
        self.positional.get(index).or_else(|| self.kw(name))
    }

    /// Like `get`, treating an explicit `None` as absent
    pub fn given(&self, index: usize, name: &str) -> Option<&Val> {
        self.get(index, name).filter(|v| !v.is_none())
    }

    pub fn required(&self, index: usize, name: &str, function: &str) -> EvalResult<&Val> {
        match self.get(index, name) {
            Some(value) => Ok(value),
            None => raise(
                ExcKind::TypeError,
                format!(
                    "{}() missing 1 required positional argument: '{}'",
                    function, name
                ),
            ),
        }
    }

    pub fn str_opt(&self, index: usize, name: &str) -> EvalResult<Option<String>> {
        match self.given(index, name) {
            None => Ok(None),
            Some(Val::Str(s)) => Ok(Some(s.clone())),
            Some(other) => raise(
                ExcKind::TypeError,
                format!("{} must be a string, not {}", name, other.type_name()),
            ),
        }
    }

    pub fn int_opt(&self, index: usize, name: &str) -> EvalResult<Option<i64>> {
        match self.given(index, name) {
            None => Ok(None),
            Some(value) => match value.as_i64() {
                Some(n) => Ok(Some(n)),
                None => raise(
                    ExcKind::TypeError,
                    format!(
                        "'{}' object cannot be interpreted as an integer",
                        value.type_name()
                    ),
                ),
            },
        }
    }

    pub fn float_opt(&self, index: usize, name: &str) -> EvalResult<Option<f64>> {
        match self.given(index, name) {
            None => Ok(None),
            Some(value) => match value.as_f64() {
                Some(x) => Ok(Some(x)),
                None => raise(
                    ExcKind::TypeError,
                    format!("{} must be a number, not {}", name, value.type_name()),
                ),
            },
        }
    }

    pub fn usize_or(&self, index: usize, name: &str, default: usize) -> EvalResult<usize> {
        Ok(self
            .int_opt(index, name)?
            .map(|n| n.max(0) as usize)
            .unwrap_or(default))
    }

    pub fn bool_or(&self, index: usize, name: &str, default: bool) -> EvalResult<bool> {
        match self.given(index, name) {
            None => Ok(default),
            Some(value) => value.truthy(),
        }
    }
}

/// Names from a string or a list of strings (`by=`, `subset=`, `columns=`)
pub fn names(value: &Val) -> EvalResult<Vec<String>> {
    match value {
        Val::Str(s) => Ok(vec![s.clone()]),
        Val::List(items) => items.borrow().iter().map(name_of).collect(),
        Val::Tuple(items) => items.iter().map(name_of).collect(),
        Val::Series(series) => Ok(series
            .values
            .iter()
            .map(crate::table::format::label_text)
            .collect()),
        other => Ok(vec![name_of(other)?]),
    }
}

fn name_of(value: &Val) -> EvalResult<String> {
    match value {
        Val::Str(s) => Ok(s.clone()),
        Val::Int(n) => Ok(n.to_string()),
        other => raise(
            ExcKind::TypeError,
            format!("expected a column name, got {}", other.type_name()),
        ),
    }
}

/// Python-style sequence of values from a list, tuple, series or range result
pub fn sequence(value: &Val) -> Option<Vec<Val>> {
    match value {
        Val::List(items) => Some(items.borrow().clone()),
        Val::Tuple(items) => Some(items.as_ref().clone()),
        Val::Series(series) => Some(series.values.iter().map(Val::from_cell).collect()),
        _ => None,
    }
}

/* ===================== Imports ===================== */

/// Modules accepted but reduced to inert objects
const INERT_MODULES: [&str; 10] = [
    "io",
    "base64",
    "warnings",
    "matplotlib",
    "matplotlib.dates",
    "matplotlib.ticker",
    "matplotlib.patches",
    "matplotlib.colors",
    "matplotlib.style",
    "calendar",
];

const PLOTTING_MODULES: [&str; 7] = [
    "matplotlib",
    "matplotlib.pyplot",
    "matplotlib.dates",
    "matplotlib.ticker",
    "matplotlib.patches",
    "matplotlib.colors",
    "seaborn",
];

pub fn import_module(profile: Profile, name: &str) -> EvalResult<Val> {
    if profile == Profile::Data && PLOTTING_MODULES.contains(&name) {
        return raise(
            ExcKind::ImportError,
            format!("plotting module '{}' is not available to data analysis code", name),
        );
    }
    let module = match name {
        "pandas" => Module::Pandas,
        "numpy" => Module::Numpy,
        "math" => Module::Math,
        "datetime" => Module::Datetime,
        "matplotlib.pyplot" => Module::Pyplot,
        "seaborn" => Module::Seaborn,
        inert if INERT_MODULES.contains(&inert) => return Ok(Val::Inert),
        "os" | "sys" | "subprocess" | "shutil" | "socket" | "pathlib" | "requests"
        | "urllib" | "http" | "pickle" | "importlib" | "ctypes" | "multiprocessing"
        | "threading" => {
            return raise(
                ExcKind::ImportError,
                format!("import of '{}' is not allowed", name),
            )
        }
        other => {
            return raise(
                ExcKind::ModuleNotFoundError,
                format!("No module named '{}'", other),
            )
        }
    };
    Ok(Val::Module(module))
}

pub fn import_from(profile: Profile, module: &str, name: &str) -> EvalResult<Val> {
    let imported = import_module(profile, module)?;
    match &imported {
        Val::Module(_) => get_module_attr(&imported, name),
        _ => Ok(Val::Inert),
    }
}

/// `from module import *`
pub fn import_all(profile: Profile, module: &str) -> EvalResult<Vec<(String, Val)>> {
    let imported = import_module(profile, module)?;
    let members: &[&str] = match imported {
        Val::Module(Module::Math) => &["pi", "e", "sqrt", "floor", "ceil", "log", "exp"],
        Val::Module(Module::Datetime) => &["datetime", "timedelta", "date"],
        _ => &[],
    };
    members
        .iter()
        .map(|name| Ok((name.to_string(), get_module_attr(&imported, name)?)))
        .collect()
}

fn get_module_attr(module: &Val, attr: &str) -> EvalResult<Val> {
    match module {
        Val::Module(Module::Pandas) => pandas::module_attr(attr),
        Val::Module(Module::Numpy) | Val::Module(Module::Math) => {
            numpy::module_attr(module, attr)
        }
        Val::Module(Module::Datetime) => datetime::module_attr(attr),
        Val::Module(Module::Pyplot) | Val::Module(Module::Seaborn) => {
            plotting::module_attr(module, attr)
        }
        _ => Ok(Val::Inert),
    }
}

/// Names every execution starts with
pub fn prelude(profile: Profile) -> Vec<(&'static str, Val)> {
    let mut names = vec![
        ("pd", Val::Module(Module::Pandas)),
        ("np", Val::Module(Module::Numpy)),
        ("numpy", Val::Module(Module::Numpy)),
        ("math", Val::Module(Module::Math)),
    ];
    if profile == Profile::Chart {
        names.push(("plt", Val::Module(Module::Pyplot)));
        names.push(("sns", Val::Module(Module::Seaborn)));
        names.push(("base64", Val::Inert));
        names.push(("io", Val::Inert));
    }
    names
}

/* ===================== Attribute Dispatch ===================== */

pub fn get_attr(interp: &mut Interpreter, receiver: &Val, attr: &str) -> EvalResult<Val> {
    match receiver {
        Val::Module(_) => get_module_attr(receiver, attr),
        Val::Frame(frame) => pandas::frame::attr(frame, receiver, attr),
        Val::Series(series) => pandas::series::attr(series, receiver, attr),
        Val::GroupBy(groups) => pandas::groupby::attr(groups, receiver, attr),
        Val::Accessor(accessor) => pandas::accessors::attr(accessor, receiver, attr),
        Val::Time(_) | Val::Date(_) | Val::Delta(_) => datetime::attr(receiver, attr),
        Val::Plot(_) => plotting::attr(interp, receiver, attr),
        Val::Method(method) if matches!(method.receiver, Val::Module(_)) => {
            // dotted module paths: datetime.datetime.now, plt.style.use
            Ok(Val::method(
                method.receiver.clone(),
                &format!("{}.{}", method.name, attr),
            ))
        }
        // `df.plot.bar(...)`
        Val::Method(method)
            if method.name == "plot" && matches!(method.receiver, Val::Frame(_) | Val::Series(_)) =>
        {
            Ok(Val::method(method.receiver.clone(), &format!("plot.{}", attr)))
        }
        Val::Inert => Ok(Val::Inert),
        Val::Exception(exc) => match attr {
            "args" => Ok(Val::tuple(vec![Val::Str(exc.message.clone())])),
            _ => no_attribute(receiver, attr),
        },
        Val::Str(_) if strings::has_method(attr) => Ok(Val::method(receiver.clone(), attr)),
        Val::List(_) | Val::Tuple(_) | Val::Dict(_) if builtins::has_method(receiver, attr) => {
            Ok(Val::method(receiver.clone(), attr))
        }
        Val::Float(x) => match attr {
            "is_integer" | "round" | "item" | "conjugate" => Ok(Val::method(receiver.clone(), attr)),
            "real" => Ok(Val::Float(*x)),
            "imag" => Ok(Val::Float(0.0)),
            _ => no_attribute(receiver, attr),
        },
        Val::Int(n) => match attr {
            "is_integer" | "round" | "item" | "conjugate" | "bit_length" => {
                Ok(Val::method(receiver.clone(), attr))
            }
            "real" | "numerator" => Ok(Val::Int(*n)),
            "denominator" => Ok(Val::Int(1)),
            "imag" => Ok(Val::Int(0)),
            _ => no_attribute(receiver, attr),
        },
        _ => no_attribute(receiver, attr),
    }
}

pub fn no_attribute<T>(receiver: &Val, attr: &str) -> EvalResult<T> {
    raise(
        ExcKind::AttributeError,
        format!(
            "'{}' object has no attribute '{}'",
            receiver.type_name(),
            attr
        ),
    )
}

pub fn set_attr(receiver: &mut Val, attr: &str, value: Val) -> EvalResult<()> {
    match receiver {
        Val::Frame(frame) => pandas::frame::set_attr(std::rc::Rc::make_mut(frame), attr, value),
        Val::Series(series) => pandas::series::set_attr(std::rc::Rc::make_mut(series), attr, value),
        Val::Plot(_) | Val::Inert => Ok(()),
        other => raise(
            ExcKind::AttributeError,
            format!(
                "'{}' object attribute '{}' is read-only",
                other.type_name(),
                attr
            ),
        ),
    }
}

pub fn call_method(
    interp: &mut Interpreter,
    receiver: &Val,
    name: &str,
    args: Args,
) -> EvalResult<Val> {
    match receiver {
        Val::Module(Module::Pandas) => pandas::call_function(interp, name, args),
        Val::Module(Module::Numpy) | Val::Module(Module::Math) => {
            numpy::call_function(interp, receiver, name, args)
        }
        Val::Module(Module::Datetime) => datetime::call_function(name, args),
        Val::Module(Module::Pyplot) | Val::Module(Module::Seaborn) => {
            plotting::call_function(interp, receiver, name, args)
        }
        Val::Frame(frame) => pandas::frame::call(interp, frame, name, args),
        Val::Series(series) => pandas::series::call(interp, series, name, args),
        Val::GroupBy(groups) => pandas::groupby::call(interp, groups, name, args),
        Val::Accessor(accessor) => pandas::accessors::call(interp, accessor, name, args),
        Val::Time(_) | Val::Date(_) | Val::Delta(_) => datetime::call_method(receiver, name, args),
        Val::Plot(handle) => plotting::call_method(interp, *handle, name, args),
        Val::Str(s) => strings::call_method(interp, s, name, args),
        Val::List(_) | Val::Tuple(_) | Val::Dict(_) => {
            builtins::call_method(interp, receiver, name, args)
        }
        Val::Int(_) | Val::Float(_) => number_method(receiver, name, &args),
        other => no_attribute(other, name),
    }
}

/// Reductions hand back numpy scalars, so their methods work on plain numbers
fn number_method(receiver: &Val, name: &str, args: &Args) -> EvalResult<Val> {
    match (receiver, name) {
        (Val::Float(x), "round") => {
            let decimals = args.int_opt(0, "decimals")?.unwrap_or(0);
            Ok(Val::Float(builtins::py_round(*x, decimals)))
        }
        (Val::Int(n), "round") => Ok(Val::Int(*n)),
        (Val::Float(x), "is_integer") => Ok(Val::Bool(x.is_finite() && x.fract() == 0.0)),
        (Val::Int(_), "is_integer") => Ok(Val::Bool(true)),
        (Val::Int(n), "bit_length") => Ok(Val::Int(64 - n.unsigned_abs().leading_zeros() as i64)),
        (_, "item") | (_, "conjugate") => Ok(receiver.clone()),
        _ => no_attribute(receiver, name),
    }
}

/* ===================== Subscripts ===================== */

pub fn get_item(interp: &mut Interpreter, container: &Val, index: &Val) -> EvalResult<Val> {
    match container {
        Val::Frame(frame) => pandas::frame::get_item(interp, frame, index),
        Val::Series(series) => pandas::series::get_item(series, index),
        Val::GroupBy(groups) => pandas::groupby::select(groups, index),
        Val::Accessor(accessor) => pandas::indexing::get_located(accessor, index),
        Val::Inert | Val::Plot(PlotHandle::Figure) => Ok(Val::Inert),
        _ => builtins::get_item(container, index),
    }
}

pub fn set_item(
    interp: &mut Interpreter,
    container: &mut Val,
    index: Val,
    value: Val,
) -> EvalResult<()> {
    match container {
        Val::Frame(frame) => {
            pandas::frame::set_item(interp, std::rc::Rc::make_mut(frame), index, value)
        }
        Val::Series(series) => pandas::series::set_item(std::rc::Rc::make_mut(series), index, value),
        Val::Inert => Ok(()),
        _ => builtins::set_item(container, index, value),
    }
}

pub fn del_item(container: &mut Val, index: &Val) -> EvalResult<()> {
    match container {
        Val::Frame(frame) => {
            let frame = std::rc::Rc::make_mut(frame);
            for name in names(index)? {
                if !frame.drop_column(&name) {
                    return Err(super::types::Exception::key_error(&name).into());
                }
            }
            Ok(())
        }
        _ => builtins::del_item(container, index),
    }
}
