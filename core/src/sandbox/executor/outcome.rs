//! Tagged results of sandbox runs

use crate::sandbox::interpreter::RunReport;
use crate::sandbox::types::ExecError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::fmt;

/* ===================== Data Runs ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed {
        stdout: String,
        /// Output hit the byte cap and was cut
        truncated: bool,
    },
    Failed {
        error: ExecError,
        /// Whatever was printed before the failure
        stdout: String,
    },
}

impl ExecutionOutcome {
    pub fn from_report(report: RunReport) -> Self {
        match report.error {
            None => ExecutionOutcome::Completed {
                stdout: report.stdout,
                truncated: report.output_truncated,
            },
            Some(error) => ExecutionOutcome::Failed {
                error,
                stdout: report.stdout,
            },
        }
    }

    /// Text handed to the rest of the workflow: stdout, or the exception repr
    pub fn text(&self) -> String {
        match self {
            ExecutionOutcome::Completed { stdout, .. } => stdout.clone(),
            ExecutionOutcome::Failed { error, .. } => error.to_string(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionOutcome::Failed { error, .. } if error.is_timeout())
    }
}

/* ===================== Chart Runs ===================== */

/// Where a rendered chart came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactSource {
    /// Written by `savefig`
    Saved,
    /// Rendered from the figure left active when the code finished
    ActiveFigure,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartFailure {
    /// The code itself failed
    Execution(ExecError),
    /// The code ran but produced nothing drawable; carries captured stdout
    NoArtifact(String),
}

impl fmt::Display for ChartFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartFailure::Execution(error) => write!(f, "Error executing chart code: {}", error),
            ChartFailure::NoArtifact(captured) => write!(f, "Chart generation failed: {}", captured),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartOutcome {
    Rendered {
        /// Base64 (standard alphabet) of the PNG bytes
        png_base64: String,
        source: ArtifactSource,
    },
    Failed(ChartFailure),
}

impl ChartOutcome {
    pub fn rendered(png: &[u8], source: ArtifactSource) -> Self {
        ChartOutcome::Rendered {
            png_base64: BASE64.encode(png),
            source,
        }
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self, ChartOutcome::Rendered { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ChartOutcome::Failed(ChartFailure::Execution(error)) if error.is_timeout())
    }

    /// The base64 image, or the failure message
    pub fn text(&self) -> String {
        match self {
            ChartOutcome::Rendered { png_base64, .. } => png_base64.clone(),
            ChartOutcome::Failed(failure) => failure.to_string(),
        }
    }

    /// Decoded PNG bytes of a rendered chart
    pub fn png_bytes(&self) -> Option<Vec<u8>> {
        match self {
            ChartOutcome::Rendered { png_base64, .. } => BASE64.decode(png_base64).ok(),
            ChartOutcome::Failed(_) => None,
        }
    }
}
