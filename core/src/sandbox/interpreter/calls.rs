//! Calling values and the subscript protocol

use super::Interpreter;
use crate::sandbox::stdlib::{self, builtins, Args};
use crate::sandbox::types::errors::py_str_repr;
use crate::sandbox::types::values::exception_val;
use crate::sandbox::types::{raise, Control, EvalResult, ExcKind, Exception, Function, FunctionBody, Val};

impl Interpreter {
    pub(crate) fn call_value(&mut self, callee: &Val, args: Args) -> EvalResult<Val> {
        self.tick()?;
        match callee {
            Val::Builtin(name) => builtins::call(self, name, args),
            Val::Function(function) => self.call_function(function, args),
            Val::Method(method) => stdlib::call_method(self, &method.receiver, &method.name, args),
            Val::ExcType(kind) => Ok(exception_val(build_exception(*kind, &args))),
            Val::Inert => Ok(Val::Inert),
            other => raise(
                ExcKind::TypeError,
                format!("'{}' object is not callable", other.type_name()),
            ),
        }
    }

    /// Call with a single positional argument (apply, map, key functions)
    pub(crate) fn call1(&mut self, callee: &Val, arg: Val) -> EvalResult<Val> {
        self.call_value(callee, Args::new(vec![arg]))
    }

    fn call_function(&mut self, function: &Function, args: Args) -> EvalResult<Val> {
        let name = &function.name;
        if args.positional.len() > function.params.len() {
            return raise(
                ExcKind::TypeError,
                format!(
                    "{}() takes {} positional arguments but {} were given",
                    name,
                    function.params.len(),
                    args.positional.len()
                ),
            );
        }
        for (key, _) in &args.keywords {
            if !function.params.contains(key) {
                return raise(
                    ExcKind::TypeError,
                    format!("{}() got an unexpected keyword argument '{}'", name, key),
                );
            }
        }

        let mut vars = function.captured.clone();
        let mut positional = args.positional.into_iter();
        for (i, param) in function.params.iter().enumerate() {
            let value = match positional.next() {
                Some(value) => value,
                None => match args.keywords.iter().find(|(k, _)| k == param) {
                    Some((_, value)) => value.clone(),
                    None => match function.defaults.get(i).cloned().flatten() {
                        Some(default) => default,
                        None => {
                            return raise(
                                ExcKind::TypeError,
                                format!(
                                    "{}() missing 1 required positional argument: '{}'",
                                    name, param
                                ),
                            )
                        }
                    },
                },
            };
            vars.insert(param.clone(), value);
        }

        self.enter_call()?;
        self.push_scope(vars, false);
        let result = match &function.body {
            FunctionBody::Block(body) => self.exec_block(body).map(|control| match control {
                Control::Return(value) => value,
                _ => Val::None,
            }),
            FunctionBody::Lambda(expr) => self.eval(expr),
        };
        self.pop_scope();
        self.exit_call();
        result
    }

    pub(crate) fn get_item(&mut self, container: &Val, index: &Val) -> EvalResult<Val> {
        stdlib::get_item(self, container, index)
    }
}

fn build_exception(kind: ExcKind, args: &Args) -> Exception {
    let message = match args.positional.as_slice() {
        [] => String::new(),
        [Val::Str(text)] if kind == ExcKind::KeyError => py_str_repr(text),
        [single] if kind == ExcKind::KeyError => single.repr(),
        [single] => single.to_str(),
        many => Val::tuple(many.to_vec()).repr(),
    };
    Exception::new(kind, message)
}
