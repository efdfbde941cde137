//! Type definitions for the sandbox interpreter
//!
//! - AST nodes (Stmt, Expr, Target)
//! - Runtime values (Val)
//! - Control flow (Control)
//! - Exceptions and sandbox errors (Exception, ExecError, Unwind)

pub mod ast;
pub mod control;
pub mod errors;
pub mod values;

pub use ast::{Expr, Stmt, Target};
pub use control::Control;
pub use errors::{raise, EvalResult, ExcKind, Exception, ExecError, Unwind};
pub use values::{
    Accessor, AccessorKind, Function, FunctionBody, GroupBy, Method, Module, PlotHandle,
    Selection, SliceVal, Val,
};
