//! Expression evaluation

use super::operators;
use super::Interpreter;
use crate::sandbox::stdlib::{self, builtins, strings, Args};
use crate::sandbox::types::ast::{Arg, BinaryOp, BoolOp, CompFor, CompKind, FStringPart, Literal, Param};
use crate::sandbox::types::values::SliceVal;
use crate::sandbox::types::{raise, EvalResult, ExcKind, Expr, FunctionBody, Target, Val};
use std::collections::HashMap;
use std::rc::Rc;

impl Interpreter {
    pub(crate) fn eval(&mut self, expr: &Expr) -> EvalResult<Val> {
        match expr {
            Expr::Lit { v } => Ok(literal(v)),

            Expr::FString { parts } => self.eval_fstring(parts),

            Expr::Ident { name } => self.lookup(name),

            Expr::List { items } => {
                let values = self.eval_all(items)?;
                self.check_len(values.len())?;
                Ok(Val::list(values))
            }

            Expr::Tuple { items } => Ok(Val::tuple(self.eval_all(items)?)),

            Expr::Dict { items } => {
                let dict = Val::dict(Vec::with_capacity(items.len()));
                if let Val::Dict(entries) = &dict {
                    for (key, value) in items {
                        let key = self.eval(key)?;
                        let value = self.eval(value)?;
                        builtins::dict_set(entries, key, value)?;
                    }
                }
                Ok(dict)
            }

            Expr::Attr { object, attr } => {
                let receiver = self.eval(object)?;
                stdlib::get_attr(self, &receiver, attr)
            }

            Expr::Index { object, index } => {
                let container = self.eval(object)?;
                let index = self.eval(index)?;
                self.get_item(&container, &index)
            }

            Expr::Slice { lower, upper, step } => {
                let mut bound = |e: &Option<Box<Expr>>| -> EvalResult<Val> {
                    match e {
                        Some(e) => self.eval(e),
                        None => Ok(Val::None),
                    }
                };
                let lower = bound(lower)?;
                let upper = bound(upper)?;
                let step = bound(step)?;
                Ok(Val::Slice(Rc::new(SliceVal { lower, upper, step })))
            }

            Expr::Call { callee, args } => self.eval_call(callee, args),

            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                operators::unary(*op, &value)
            }

            Expr::Binary { op, left, right } => {
                let lhs = self.eval(left)?;
                let rhs = self.eval(right)?;
                if *op == BinaryOp::Mul {
                    self.check_repeat(&lhs, &rhs)?;
                }
                operators::binary(*op, &lhs, &rhs)
            }

            Expr::Compare { left, rest } => {
                let mut lhs = self.eval(left)?;
                if let [(op, right)] = rest.as_slice() {
                    let rhs = self.eval(right)?;
                    return operators::compare(*op, &lhs, &rhs);
                }
                for (op, right) in rest {
                    let rhs = self.eval(right)?;
                    if !operators::compare(*op, &lhs, &rhs)?.truthy()? {
                        return Ok(Val::Bool(false));
                    }
                    lhs = rhs;
                }
                Ok(Val::Bool(true))
            }

            Expr::Bool { op, values } => {
                let mut last = Val::None;
                for value in values {
                    last = self.eval(value)?;
                    let truthy = last.truthy()?;
                    match op {
                        BoolOp::And if !truthy => return Ok(last),
                        BoolOp::Or if truthy => return Ok(last),
                        _ => {}
                    }
                }
                Ok(last)
            }

            Expr::IfExp { test, body, orelse } => {
                if self.eval(test)?.truthy()? {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }

            Expr::Lambda { params, body } => {
                let params: Vec<Param> = params
                    .iter()
                    .map(|name| Param {
                        name: name.clone(),
                        default: None,
                    })
                    .collect();
                self.make_function("<lambda>", &params, FunctionBody::Lambda((**body).clone()))
            }

            Expr::Comp {
                kind,
                element,
                value,
                clauses,
            } => self.eval_comprehension(*kind, element, value.as_deref(), clauses),
        }
    }

    fn eval_all(&mut self, items: &[Expr]) -> EvalResult<Vec<Val>> {
        items.iter().map(|item| self.eval(item)).collect()
    }

    /// Refuse `[0] * n` and `'x' * n` before they allocate
    fn check_repeat(&self, lhs: &Val, rhs: &Val) -> EvalResult<()> {
        let (seq, count) = match (lhs, rhs) {
            (seq, Val::Int(n)) | (Val::Int(n), seq) => (seq, *n),
            _ => return Ok(()),
        };
        let len = match seq {
            Val::List(items) => items.borrow().len(),
            Val::Tuple(items) => items.len(),
            Val::Str(s) => s.len(),
            _ => return Ok(()),
        };
        self.check_len(len.saturating_mul(count.max(0) as usize))
    }

    /* ===================== Strings ===================== */

    fn eval_fstring(&mut self, parts: &[FStringPart]) -> EvalResult<Val> {
        let mut out = String::new();
        for part in parts {
            match part {
                FStringPart::Text { text } => out.push_str(text),
                FStringPart::Field {
                    expr,
                    conversion,
                    spec,
                } => {
                    let value = self.eval(expr)?;
                    let value = match conversion {
                        Some('r') => Val::Str(value.repr()),
                        Some(_) => Val::Str(value.to_str()),
                        None => value,
                    };
                    out.push_str(&strings::format_value(&value, spec.as_deref().unwrap_or(""))?);
                }
            }
        }
        Ok(Val::Str(out))
    }

    /* ===================== Calls ===================== */

    fn eval_call(&mut self, callee: &Expr, args: &[Arg]) -> EvalResult<Val> {
        let function = self.eval(callee)?;
        let mut call_args = self.eval_args(args)?;

        // `obj.method(..., inplace=True)` rebinds the receiver to the result
        if let Some(flag) = call_args.take_kw("inplace") {
            if flag.truthy()? {
                if let Expr::Attr { object, .. } = callee {
                    if let Some(target) = rebind_target(object) {
                        let result = self.call_value(&function, call_args)?;
                        self.assign(&target, result)?;
                        return Ok(Val::None);
                    }
                }
            }
        }
        // `df.insert(...)` updates the frame in place
        if let (Val::Method(method), Expr::Attr { object, .. }) = (&function, callee) {
            if method.name == "insert" && matches!(method.receiver, Val::Frame(_)) {
                if let Some(target) = rebind_target(object) {
                    let result = self.call_value(&function, call_args)?;
                    self.assign(&target, result)?;
                    return Ok(Val::None);
                }
            }
        }
        self.call_value(&function, call_args)
    }

    fn eval_args(&mut self, args: &[Arg]) -> EvalResult<Args> {
        let mut out = Args::default();
        for arg in args {
            match arg {
                Arg::Positional(expr) => {
                    let value = self.eval(expr)?;
                    out.positional.push(value);
                }
                Arg::Keyword(name, expr) => {
                    let value = self.eval(expr)?;
                    out.keywords.push((name.clone(), value));
                }
                Arg::Splat(expr) => {
                    let value = self.eval(expr)?;
                    let items = self.iterate(&value)?;
                    out.positional.extend(items);
                }
                Arg::KwSplat(expr) => match self.eval(expr)? {
                    Val::Dict(entries) => {
                        for (key, value) in entries.borrow().iter() {
                            match key {
                                Val::Str(name) => out.keywords.push((name.clone(), value.clone())),
                                _ => return raise(ExcKind::TypeError, "keywords must be strings"),
                            }
                        }
                    }
                    other => {
                        return raise(
                            ExcKind::TypeError,
                            format!(
                                "argument after ** must be a mapping, not {}",
                                other.type_name()
                            ),
                        )
                    }
                },
            }
        }
        Ok(out)
    }

    /* ===================== Iteration ===================== */

    /// Materialize anything `for` can loop over
    pub(crate) fn iterate(&mut self, value: &Val) -> EvalResult<Vec<Val>> {
        let items = match value {
            Val::List(items) => items.borrow().clone(),
            Val::Tuple(items) => items.as_ref().clone(),
            Val::Str(s) => s.chars().map(|c| Val::Str(c.to_string())).collect(),
            Val::Dict(entries) => entries.borrow().iter().map(|(k, _)| k.clone()).collect(),
            Val::Series(series) => series.values.iter().map(Val::from_cell).collect(),
            Val::Frame(frame) => frame.column_names().into_iter().map(Val::Str).collect(),
            Val::GroupBy(groups) => stdlib::pandas::groupby::iterate(groups)?,
            // ax.spines.values() and similar cosmetic collections
            Val::Inert => Vec::new(),
            other => {
                return raise(
                    ExcKind::TypeError,
                    format!("'{}' object is not iterable", other.type_name()),
                )
            }
        };
        self.check_len(items.len())?;
        Ok(items)
    }

    /* ===================== Comprehensions ===================== */

    fn eval_comprehension(
        &mut self,
        kind: CompKind,
        element: &Expr,
        value: Option<&Expr>,
        clauses: &[CompFor],
    ) -> EvalResult<Val> {
        self.push_scope(HashMap::new(), true);
        let mut out = Vec::new();
        let result = self.comp_clause(clauses, element, value, &mut out);
        self.pop_scope();
        result?;

        match kind {
            CompKind::List | CompKind::Generator => {
                Ok(Val::list(out.into_iter().map(|(k, _)| k).collect()))
            }
            CompKind::Dict => {
                let dict = Val::dict(Vec::with_capacity(out.len()));
                if let Val::Dict(entries) = &dict {
                    for (key, value) in out {
                        builtins::dict_set(entries, key, value)?;
                    }
                }
                Ok(dict)
            }
        }
    }

    fn comp_clause(
        &mut self,
        clauses: &[CompFor],
        element: &Expr,
        value: Option<&Expr>,
        out: &mut Vec<(Val, Val)>,
    ) -> EvalResult<()> {
        let Some((clause, rest)) = clauses.split_first() else {
            let key = self.eval(element)?;
            let value = match value {
                Some(expr) => self.eval(expr)?,
                None => Val::None,
            };
            out.push((key, value));
            return self.check_len(out.len());
        };

        let iterable = self.eval(&clause.iter)?;
        'items: for item in self.iterate(&iterable)? {
            self.tick()?;
            self.bind_local(&clause.target, item)?;
            for cond in &clause.conds {
                if !self.eval(cond)?.truthy()? {
                    continue 'items;
                }
            }
            self.comp_clause(rest, element, value, out)?;
        }
        Ok(())
    }

    /// Comprehension targets bind in the comprehension's own scope
    fn bind_local(&mut self, target: &Target, value: Val) -> EvalResult<()> {
        match target {
            Target::Name { name } => {
                self.assign_local(name, value);
                Ok(())
            }
            Target::Tuple { items } => {
                let values = self.iterate(&value)?;
                if values.len() != items.len() {
                    return raise(
                        ExcKind::ValueError,
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            items.len(),
                            values.len()
                        ),
                    );
                }
                for (item, value) in items.iter().zip(values) {
                    self.bind_local(item, value)?;
                }
                Ok(())
            }
            other => self.assign(other, value),
        }
    }
}

fn literal(v: &Literal) -> Val {
    match v {
        Literal::None => Val::None,
        Literal::Bool(b) => Val::Bool(*b),
        Literal::Int(n) => Val::Int(*n),
        Literal::Float(x) => Val::Float(*x),
        Literal::Str(s) => Val::Str(s.clone()),
    }
}

/// Name or subscript a method receiver can be written back to
fn rebind_target(object: &Expr) -> Option<Target> {
    match object {
        Expr::Ident { name } => Some(Target::Name { name: name.clone() }),
        Expr::Index { object, index } => Some(Target::Subscript {
            object: (**object).clone(),
            index: (**index).clone(),
        }),
        _ => None,
    }
}
