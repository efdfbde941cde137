//! Tree-walking interpreter for analysis programs
//!
//! ## Execution model
//!
//! 1. **Single owner**: an `Interpreter` lives on one blocking thread for one
//!    execution and is dropped afterwards; values use `Rc`, never `Arc`.
//! 2. **Recursive evaluation**: statements return a `Control` signal,
//!    expressions return values; both propagate `Unwind` on exceptions.
//! 3. **Bounded**: every statement, loop iteration and call consumes a step;
//!    the step budget, call depth, collection sizes and the cancellation
//!    token are checked as execution proceeds.
//! 4. **Isolated**: stdout and chart artifacts are captured in memory.

use super::chart::Figure;
use super::parser::parse_program;
use super::types::{raise, EvalResult, ExcKind, Exception, ExecError, Unwind, Val};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

pub mod calls;
pub mod expressions;
pub mod operators;
pub mod statements;

#[cfg(test)]
mod tests;

/// Steps between cancellation checks
const CANCEL_CHECK_INTERVAL: u64 = 64;

/* ===================== Configuration ===================== */

/// Which namespace and import rules a run gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Printing analysis; plotting imports are refused
    Data,
    /// Chart code; plotting stack pre-bound, figure captured
    Chart,
}

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Data => "data",
            Profile::Chart => "chart",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_steps: u64,
    pub max_output_bytes: usize,
    pub max_collection_len: usize,
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_steps: 2_000_000,
            max_output_bytes: 64 * 1024,
            max_collection_len: 1_000_000,
            max_call_depth: 64,
        }
    }
}

/* ===================== Run Report ===================== */

/// Everything a finished run leaves behind
#[derive(Debug)]
pub struct RunReport {
    pub stdout: String,
    pub output_truncated: bool,
    pub steps: u64,
    /// PNG written by the last `savefig`
    pub artifact: Option<Vec<u8>>,
    /// Figure state at exit, for the active-figure fallback
    pub figure: Figure,
    pub error: Option<ExecError>,
}

/* ===================== Interpreter ===================== */

#[derive(Debug, Default)]
struct Scope {
    vars: HashMap<String, Val>,
    /// Comprehension scopes see through to the enclosing function scope
    transparent: bool,
}

pub struct Interpreter {
    scopes: Vec<Scope>,
    profile: Profile,
    limits: Limits,
    cancel: CancellationToken,
    steps: u64,
    depth: usize,
    stdout: String,
    output_truncated: bool,
    /// Exceptions currently being handled, innermost last (bare `raise`)
    handling: Vec<Exception>,
    pub(crate) figure: Figure,
    /// `plt.style.use('dark_background')` is in effect
    pub(crate) dark_style: bool,
    pub(crate) artifact: Option<Vec<u8>>,
}

impl Interpreter {
    pub fn new(profile: Profile, limits: Limits, cancel: CancellationToken) -> Self {
        Interpreter {
            scopes: vec![Scope::default()],
            profile,
            limits,
            cancel,
            steps: 0,
            depth: 0,
            stdout: String::new(),
            output_truncated: false,
            handling: Vec::new(),
            figure: Figure::default(),
            dark_style: false,
            artifact: None,
        }
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Define a global before the program runs
    pub fn bind(&mut self, name: &str, value: Val) {
        self.scopes[0].vars.insert(name.to_string(), value);
    }

    /// Parse and execute `source`, consuming the interpreter
    pub fn run(mut self, source: &str) -> RunReport {
        let error = match parse_program(source) {
            Err(err) => {
                let kind = ExcKind::from_name(err.kind_name()).unwrap_or(ExcKind::SyntaxError);
                Some(ExecError::Raised(Exception::new(kind, err.to_string())))
            }
            Ok(program) => match self.exec_block(&program) {
                Ok(_) => None,
                Err(Unwind::Raise(exc)) => Some(ExecError::Raised(exc)),
                Err(Unwind::Halt(err)) => Some(err),
            },
        };

        RunReport {
            stdout: self.stdout,
            output_truncated: self.output_truncated,
            steps: self.steps,
            artifact: self.artifact,
            figure: self.figure,
            error,
        }
    }

    /* ===================== Limits ===================== */

    /// Consume one step of the budget
    pub(crate) fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(Unwind::Halt(ExecError::StepLimit {
                limit: self.limits.max_steps,
            }));
        }
        if self.steps % CANCEL_CHECK_INTERVAL == 0 && self.cancel.is_cancelled() {
            return Err(Unwind::Halt(ExecError::Cancelled));
        }
        Ok(())
    }

    /// Refuse collections larger than the configured cap
    pub(crate) fn check_len(&self, size: usize) -> EvalResult<()> {
        if size > self.limits.max_collection_len {
            return Err(Unwind::Halt(ExecError::CollectionLimit {
                size,
                limit: self.limits.max_collection_len,
            }));
        }
        Ok(())
    }

    pub(crate) fn enter_call(&mut self) -> EvalResult<()> {
        if self.depth >= self.limits.max_call_depth {
            return Err(Unwind::Halt(ExecError::RecursionLimit {
                limit: self.limits.max_call_depth,
            }));
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn exit_call(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Append to captured stdout, dropping whatever exceeds the cap
    pub(crate) fn write_stdout(&mut self, text: &str) {
        if self.output_truncated {
            return;
        }
        let room = self.limits.max_output_bytes.saturating_sub(self.stdout.len());
        if text.len() <= room {
            self.stdout.push_str(text);
            return;
        }
        let mut cut = room;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        self.stdout.push_str(&text[..cut]);
        self.output_truncated = true;
    }

    /* ===================== Scopes ===================== */

    pub(crate) fn push_scope(&mut self, vars: HashMap<String, Val>, transparent: bool) {
        self.scopes.push(Scope { vars, transparent });
    }

    pub(crate) fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Whether code is currently running inside a function body
    pub(crate) fn in_function(&self) -> bool {
        self.scopes.iter().skip(1).any(|s| !s.transparent)
    }

    /// Scopes visible from the current position: local chain, then globals
    fn visible(&self) -> impl Iterator<Item = &Scope> {
        let mut chain = Vec::new();
        for scope in self.scopes.iter().skip(1).rev() {
            chain.push(scope);
            if !scope.transparent {
                break;
            }
        }
        chain.push(&self.scopes[0]);
        chain.into_iter()
    }

    pub(crate) fn lookup(&self, name: &str) -> EvalResult<Val> {
        for scope in self.visible() {
            if let Some(value) = scope.vars.get(name) {
                return Ok(value.clone());
            }
        }
        if let Some(value) = super::stdlib::builtins::lookup(name) {
            return Ok(value);
        }
        raise(
            ExcKind::NameError,
            format!("name '{}' is not defined", name),
        )
    }

    /// Remove a binding so it can be mutated without copy-on-write; returns
    /// the scope it came from for `put_var`
    pub(crate) fn take_var(&mut self, name: &str) -> Option<(usize, Val)> {
        let mut chain: Vec<usize> = Vec::new();
        for i in (1..self.scopes.len()).rev() {
            chain.push(i);
            if !self.scopes[i].transparent {
                break;
            }
        }
        chain.push(0);
        chain
            .into_iter()
            .find_map(|i| self.scopes[i].vars.remove(name).map(|v| (i, v)))
    }

    pub(crate) fn put_var(&mut self, slot: usize, name: &str, value: Val) {
        if let Some(scope) = self.scopes.get_mut(slot) {
            scope.vars.insert(name.to_string(), value);
        }
    }

    /// Bind in the innermost non-transparent scope (comprehension targets excepted)
    pub(crate) fn assign_name(&mut self, name: &str, value: Val) {
        let index = self
            .scopes
            .iter()
            .rposition(|s| !s.transparent)
            .unwrap_or(0);
        self.scopes[index].vars.insert(name.to_string(), value);
    }

    /// Bind in the innermost scope, whatever its kind
    pub(crate) fn assign_local(&mut self, name: &str, value: Val) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.vars.insert(name.to_string(), value);
        }
    }

    pub(crate) fn delete_name(&mut self, name: &str) -> EvalResult<()> {
        match self.take_var(name) {
            Some(_) => Ok(()),
            None => raise(
                ExcKind::NameError,
                format!("name '{}' is not defined", name),
            ),
        }
    }

    /// Locals of the enclosing function chain, captured by nested defs and lambdas
    pub(crate) fn capture(&self) -> HashMap<String, Val> {
        let mut captured = HashMap::new();
        for scope in self.scopes.iter().skip(1) {
            for (name, value) in &scope.vars {
                captured.insert(name.clone(), value.clone());
            }
        }
        captured
    }
}
