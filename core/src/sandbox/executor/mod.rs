//! # Sandbox Executor
//!
//! Async boundary around the interpreter.
//!
//! ## Guarantees
//!
//! 1. **Never raises**: every run ends in an `ExecutionOutcome` or a
//!    `ChartOutcome`, whatever the code does.
//! 2. **Private data**: the interpreter gets its own copy of the dataset;
//!    the caller's `Arc<DataFrame>` is never mutated.
//! 3. **Bounded**: runs take a semaphore slot, execute on the blocking pool
//!    and are cut off by a wall-clock timeout that cancels the interpreter.
//! 4. **Per-execution artifacts**: `savefig` output and figure state live in
//!    the run's `RunReport` and are dropped with it.

use crate::sandbox::chart::{render_png, Figure};
use crate::sandbox::interpreter::{Interpreter, Limits, Profile, RunReport};
use crate::sandbox::stdlib::prelude;
use crate::sandbox::types::{ExecError, Val};
use crate::table::DataFrame;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod fences;
pub mod outcome;

#[cfg(test)]
mod tests;

pub use fences::{fingerprint, strip_code_fences};
pub use outcome::{ArtifactSource, ChartFailure, ChartOutcome, ExecutionOutcome};

/* ===================== Options ===================== */

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxOptions {
    /// Wall-clock budget for one run
    pub timeout: Duration,
    /// Runs allowed to execute at the same time
    pub max_concurrent: usize,
    pub limits: Limits,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        SandboxOptions {
            timeout: Duration::from_secs(10),
            max_concurrent: 4,
            limits: Limits::default(),
        }
    }
}

/* ===================== Sandbox ===================== */

pub struct Sandbox {
    options: SandboxOptions,
    permits: Arc<Semaphore>,
}

impl Sandbox {
    pub fn new(options: SandboxOptions) -> Self {
        let permits = Arc::new(Semaphore::new(options.max_concurrent.max(1)));
        Sandbox { options, permits }
    }

    pub fn options(&self) -> &SandboxOptions {
        &self.options
    }

    /// Run data-analysis code; captured stdout is the result
    pub async fn execute_data(&self, code: &str, dataset: Arc<DataFrame>) -> ExecutionOutcome {
        let report = self.run(code, dataset, Profile::Data).await;
        ExecutionOutcome::from_report(report)
    }

    /// Run chart code and collect the PNG it produced
    ///
    /// The `savefig` artifact wins; otherwise the figure left active at exit
    /// is rendered.
    pub async fn execute_chart(&self, code: &str, dataset: Arc<DataFrame>) -> ChartOutcome {
        let report = self.run(code, dataset, Profile::Chart).await;
        if let Some(error) = report.error {
            return ChartOutcome::Failed(ChartFailure::Execution(error));
        }
        if let Some(png) = report.artifact {
            return ChartOutcome::rendered(&png, ArtifactSource::Saved);
        }
        if report.figure.is_blank() {
            let captured = if report.stdout.trim().is_empty() {
                "No output captured".to_string()
            } else {
                report.stdout
            };
            return ChartOutcome::Failed(ChartFailure::NoArtifact(captured));
        }
        match render_png(&report.figure) {
            Ok(png) => {
                debug!(bytes = png.len(), "rendered active figure");
                ChartOutcome::rendered(&png, ArtifactSource::ActiveFigure)
            }
            Err(e) => ChartOutcome::Failed(ChartFailure::NoArtifact(e.to_string())),
        }
    }

    /// Execute `code` under `profile` and return the raw report
    pub async fn run(&self, code: &str, dataset: Arc<DataFrame>, profile: Profile) -> RunReport {
        let source = strip_code_fences(code);
        let digest = fingerprint(&source);
        let started = Instant::now();

        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return failed_report(ExecError::Internal("sandbox is shut down".to_string())),
        };

        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let limits = self.options.limits;
        let task = tokio::task::spawn_blocking(move || {
            // the slot is released only once the interpreter has stopped
            let _permit = permit;
            let mut interp = Interpreter::new(profile, limits, worker_cancel);
            for (name, value) in prelude(profile) {
                interp.bind(name, value);
            }
            interp.bind("df", Val::frame(dataset.as_ref().clone()));
            interp.run(&source)
        });

        let report = match tokio::time::timeout(self.options.timeout, task).await {
            Ok(Ok(report)) => report,
            Ok(Err(join_error)) => {
                warn!(error = %join_error, "sandbox worker did not finish");
                failed_report(ExecError::Internal(join_error.to_string()))
            }
            Err(_) => {
                cancel.cancel();
                failed_report(ExecError::Timeout {
                    limit_ms: self.options.timeout.as_millis() as u64,
                })
            }
        };

        info!(
            profile = profile.name(),
            fingerprint = %&digest[..12],
            steps = report.steps,
            stdout_bytes = report.stdout.len(),
            artifact = report.artifact.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            error = report.error.as_ref().map(|e| e.to_string()),
            "sandbox run finished"
        );
        report
    }
}

fn failed_report(error: ExecError) -> RunReport {
    RunReport {
        stdout: String::new(),
        output_truncated: false,
        steps: 0,
        artifact: None,
        figure: Figure::default(),
        error: Some(error),
    }
}
