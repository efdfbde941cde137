//! Statement execution
//!
//! Each statement handler returns the `Control` signal that its enclosing
//! block, loop or function consumes.

use super::operators;
use super::Interpreter;
use crate::sandbox::stdlib;
use crate::sandbox::types::ast::{BinaryOp, ExceptHandler, Expr, ImportName, Param, Stmt, Target};
use crate::sandbox::types::values::{exception_val, Function, FunctionBody};
use crate::sandbox::types::{raise, Control, EvalResult, ExcKind, Exception, Unwind, Val};
use std::rc::Rc;

impl Interpreter {
    pub(crate) fn exec_block(&mut self, body: &[Stmt]) -> EvalResult<Control> {
        for stmt in body {
            let control = self.exec_stmt(stmt)?;
            if !control.is_none() {
                return Ok(control);
            }
        }
        Ok(Control::None)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> EvalResult<Control> {
        self.tick()?;
        match stmt {
            Stmt::Expr { expr } => {
                self.eval(expr)?;
                Ok(Control::None)
            }

            Stmt::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
                Ok(Control::None)
            }

            Stmt::AugAssign { target, op, value } => {
                let rhs = self.eval(value)?;
                self.exec_aug_assign(target, *op, rhs)?;
                Ok(Control::None)
            }

            Stmt::If { test, body, orelse } => {
                if self.eval(test)?.truthy()? {
                    self.exec_block(body)
                } else {
                    self.exec_block(orelse)
                }
            }

            Stmt::While { test, body } => {
                while self.eval(test)?.truthy()? {
                    self.tick()?;
                    match self.exec_block(body)? {
                        Control::Break => break,
                        Control::Return(value) => return Ok(Control::Return(value)),
                        Control::None | Control::Continue => {}
                    }
                }
                Ok(Control::None)
            }

            Stmt::For { target, iter, body } => {
                let iterable = self.eval(iter)?;
                for item in self.iterate(&iterable)? {
                    self.tick()?;
                    self.assign(target, item)?;
                    match self.exec_block(body)? {
                        Control::Break => break,
                        Control::Return(value) => return Ok(Control::Return(value)),
                        Control::None | Control::Continue => {}
                    }
                }
                Ok(Control::None)
            }

            Stmt::FunctionDef { name, params, body } => {
                let function = self.make_function(name, params, FunctionBody::Block(body.clone()))?;
                self.assign_name(name, function);
                Ok(Control::None)
            }

            Stmt::Return { value } => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Val::None,
                };
                Ok(Control::Return(value))
            }

            Stmt::Import { names } => {
                for ImportName { name, alias } in names {
                    let module = stdlib::import_module(self.profile(), name)?;
                    let binding = match alias {
                        Some(alias) => alias.clone(),
                        None => name.split('.').next().unwrap_or(name).to_string(),
                    };
                    let value = match (alias, name.contains('.')) {
                        (None, true) => {
                            stdlib::import_module(self.profile(), &binding)?
                        }
                        _ => module,
                    };
                    self.assign_name(&binding, value);
                }
                Ok(Control::None)
            }

            Stmt::FromImport { module, names } => {
                for ImportName { name, alias } in names {
                    if name == "*" {
                        for (member, value) in stdlib::import_all(self.profile(), module)? {
                            self.assign_name(&member, value);
                        }
                        continue;
                    }
                    let value = stdlib::import_from(self.profile(), module, name)?;
                    self.assign_name(alias.as_deref().unwrap_or(name), value);
                }
                Ok(Control::None)
            }

            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => self.exec_try(body, handlers, orelse, finalbody),

            Stmt::With {
                context,
                target,
                body,
            } => {
                let value = self.eval(context)?;
                if let Some(target) = target {
                    self.assign(target, value)?;
                }
                self.exec_block(body)
            }

            Stmt::Raise { exc } => {
                let exception = match exc {
                    None => match self.handling.last() {
                        Some(current) => current.clone(),
                        None => Exception::new(
                            ExcKind::RuntimeError,
                            "No active exception to reraise",
                        ),
                    },
                    Some(expr) => match self.eval(expr)? {
                        Val::Exception(exc) => (*exc).clone(),
                        Val::ExcType(kind) => Exception::new(kind, ""),
                        other => {
                            return raise(
                                ExcKind::TypeError,
                                format!(
                                    "exceptions must derive from BaseException, not {}",
                                    other.type_name()
                                ),
                            )
                        }
                    },
                };
                Err(Unwind::Raise(exception))
            }

            Stmt::Del { targets } => {
                for target in targets {
                    self.delete(target)?;
                }
                Ok(Control::None)
            }

            Stmt::Pass => Ok(Control::None),
            Stmt::Break => Ok(Control::Break),
            Stmt::Continue => Ok(Control::Continue),
        }
    }

    /* ===================== Functions ===================== */

    pub(crate) fn make_function(
        &mut self,
        name: &str,
        params: &[Param],
        body: FunctionBody,
    ) -> EvalResult<Val> {
        let mut defaults = Vec::with_capacity(params.len());
        for param in params {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr)?),
                None => None,
            });
        }
        Ok(Val::Function(Rc::new(Function {
            name: name.to_string(),
            params: params.iter().map(|p| p.name.clone()).collect(),
            defaults,
            body,
            captured: self.capture(),
        })))
    }

    /* ===================== Exceptions ===================== */

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
    ) -> EvalResult<Control> {
        let outcome = match self.exec_block(body) {
            Ok(Control::None) => self.exec_block(orelse),
            Ok(control) => Ok(control),
            Err(Unwind::Raise(exc)) => match self.find_handler(handlers, &exc)? {
                Some(handler) => {
                    if let Some(name) = &handler.name {
                        self.assign_name(name, exception_val(exc.clone()));
                    }
                    self.handling.push(exc);
                    let result = self.exec_block(&handler.body);
                    self.handling.pop();
                    result
                }
                None => Err(Unwind::Raise(exc)),
            },
            Err(halt) => return Err(halt),
        };

        if finalbody.is_empty() {
            return outcome;
        }
        if let Err(Unwind::Halt(_)) = outcome {
            return outcome;
        }
        match self.exec_block(finalbody)? {
            Control::None => outcome,
            control => Ok(control),
        }
    }

    fn find_handler<'a>(
        &mut self,
        handlers: &'a [ExceptHandler],
        exc: &Exception,
    ) -> EvalResult<Option<&'a ExceptHandler>> {
        for handler in handlers {
            let Some(kind_expr) = &handler.kind else {
                return Ok(Some(handler));
            };
            let kinds = match self.eval(kind_expr)? {
                Val::Tuple(items) => items.iter().cloned().collect(),
                other => vec![other],
            };
            let caught = kinds.iter().any(|k| match k {
                Val::ExcType(kind) => exc.kind.is_subclass_of(*kind),
                _ => false,
            });
            if caught {
                return Ok(Some(handler));
            }
        }
        Ok(None)
    }

    /* ===================== Assignment ===================== */

    pub(crate) fn assign(&mut self, target: &Target, value: Val) -> EvalResult<()> {
        match target {
            Target::Name { name } => {
                self.assign_name(name, value);
                Ok(())
            }
            Target::Tuple { items } => {
                let values = self.iterate(&value)?;
                if values.len() != items.len() {
                    let message = if values.len() > items.len() {
                        format!("too many values to unpack (expected {})", items.len())
                    } else {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            items.len(),
                            values.len()
                        )
                    };
                    return raise(ExcKind::ValueError, message);
                }
                for (item, value) in items.iter().zip(values) {
                    self.assign(item, value)?;
                }
                Ok(())
            }
            Target::Subscript { object, index } => {
                let index = self.eval(index)?;
                self.assign_subscript(object, index, value)
            }
            Target::Attribute { object, attr } => self.assign_attribute(object, attr, value),
        }
    }

    /// `object.attr = value`, written back when `object` is a plain name
    fn assign_attribute(&mut self, object: &Expr, attr: &str, value: Val) -> EvalResult<()> {
        if let Expr::Ident { name } = object {
            if let Some((slot, mut receiver)) = self.take_var(name) {
                let result = stdlib::set_attr(&mut receiver, attr, value);
                self.put_var(slot, name, receiver);
                return result;
            }
        }
        let mut receiver = self.eval(object)?;
        stdlib::set_attr(&mut receiver, attr, value)
    }

    /// `object[index] = value`
    ///
    /// Frames and series are copy-on-write, so when `object` names a variable
    /// (or its `.loc`/`.iloc`) the binding is taken out, mutated and put back.
    fn assign_subscript(&mut self, object: &Expr, index: Val, value: Val) -> EvalResult<()> {
        match object {
            Expr::Ident { name } => {
                let (slot, mut container) = match self.take_var(name) {
                    Some(found) => found,
                    None => {
                        return raise(
                            ExcKind::NameError,
                            format!("name '{}' is not defined", name),
                        )
                    }
                };
                let result = stdlib::set_item(self, &mut container, index, value);
                self.put_var(slot, name, container);
                result
            }
            Expr::Attr { object: inner, attr } if matches!(attr.as_str(), "loc" | "iloc") => {
                if let Expr::Ident { name } = inner.as_ref() {
                    if let Some((slot, mut container)) = self.take_var(name) {
                        let positional = attr == "iloc";
                        let result = stdlib::pandas::indexing::set_located(
                            self,
                            &mut container,
                            positional,
                            index,
                            value,
                        );
                        self.put_var(slot, name, container);
                        return result;
                    }
                }
                let mut container = self.eval(object)?;
                stdlib::set_item(self, &mut container, index, value)
            }
            _ => {
                let mut container = self.eval(object)?;
                stdlib::set_item(self, &mut container, index, value)
            }
        }
    }

    fn exec_aug_assign(&mut self, target: &Target, op: BinaryOp, rhs: Val) -> EvalResult<()> {
        match target {
            Target::Name { name } => {
                let current = self.lookup(name)?;
                if let (BinaryOp::Add, Val::List(items)) = (op, &current) {
                    let extra = self.iterate(&rhs)?;
                    let new_len = items.borrow().len() + extra.len();
                    self.check_len(new_len)?;
                    items.borrow_mut().extend(extra);
                    return Ok(());
                }
                let updated = operators::binary(op, &current, &rhs)?;
                self.assign_name(name, updated);
                Ok(())
            }
            Target::Subscript { object, index } => {
                let index = self.eval(index)?;
                let container = self.eval(object)?;
                let current = self.get_item(&container, &index)?;
                let updated = operators::binary(op, &current, &rhs)?;
                self.assign_subscript(object, index, updated)
            }
            Target::Attribute { object, attr } => {
                let receiver = self.eval(object)?;
                let current = stdlib::get_attr(self, &receiver, attr)?;
                let updated = operators::binary(op, &current, &rhs)?;
                self.assign_attribute(object, attr, updated)
            }
            Target::Tuple { .. } => raise(
                ExcKind::SyntaxError,
                "illegal expression for augmented assignment",
            ),
        }
    }

    fn delete(&mut self, target: &Target) -> EvalResult<()> {
        match target {
            Target::Name { name } => self.delete_name(name),
            Target::Tuple { items } => {
                for item in items {
                    self.delete(item)?;
                }
                Ok(())
            }
            Target::Subscript { object, index } => {
                let index = self.eval(index)?;
                match object {
                    Expr::Ident { name } => {
                        let (slot, mut container) = match self.take_var(name) {
                            Some(found) => found,
                            None => {
                                return raise(
                                    ExcKind::NameError,
                                    format!("name '{}' is not defined", name),
                                )
                            }
                        };
                        let result = stdlib::del_item(&mut container, &index);
                        self.put_var(slot, name, container);
                        result
                    }
                    _ => {
                        let mut container = self.eval(object)?;
                        stdlib::del_item(&mut container, &index)
                    }
                }
            }
            Target::Attribute { .. } => Ok(()),
        }
    }
}
