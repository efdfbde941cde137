//! Restricted execution of generated analysis code
//!
//! Generated code never runs in a general-purpose runtime. It is parsed by
//! `parser` into the `types::ast` tree and evaluated by `interpreter`, whose
//! library (`stdlib`) emulates the slice of pandas, numpy, pyplot and seaborn
//! that analysis code uses. `executor` is the async boundary the workflow
//! talks to: it bounds concurrency and wall-clock time and turns every run
//! into a tagged outcome.

pub mod chart;
pub mod executor;
pub mod interpreter;
pub mod parser;
pub mod stdlib;
pub mod types;

pub use executor::{
    fingerprint, strip_code_fences, ArtifactSource, ChartFailure, ChartOutcome, ExecutionOutcome,
    Sandbox, SandboxOptions,
};
pub use interpreter::{Limits, Profile};
pub use types::ExecError;
