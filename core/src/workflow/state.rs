//! Per-query working state and the record returned to callers

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::sandbox::{ChartOutcome, ExecutionOutcome};
use crate::table::DataFrame;

/* ===================== Messages ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/* ===================== Stages ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    Chart,
    Data,
}

/// Nodes of the workflow state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Classify,
    Enhance,
    PrepareChart,
    PrepareData,
    VerifyChart,
    VerifyCode,
    RenderChart,
    AnalyzeData,
    Synthesize,
    End,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Classify => "classify",
            Stage::Enhance => "enhance",
            Stage::PrepareChart => "prepare_chart",
            Stage::PrepareData => "prepare_data",
            Stage::VerifyChart => "verify_chart",
            Stage::VerifyCode => "verify_code",
            Stage::RenderChart => "render_chart",
            Stage::AnalyzeData => "analyze_data",
            Stage::Synthesize => "synthesize",
            Stage::End => "end",
        }
    }
}

/* ===================== State ===================== */

/// Working record threaded through the nodes of one query
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub request_id: Uuid,
    /// Kept whole; only the last turn is consulted
    pub messages: Vec<Message>,
    pub enhanced_query: Option<String>,
    pub dataset: Arc<DataFrame>,
    pub intent: Option<Intent>,
    pub chart_code: Option<String>,
    pub code: Option<String>,
    pub chart_output: Option<ChartOutcome>,
    pub output: Option<ExecutionOutcome>,
    pub response: Option<String>,
    pub visited: Vec<Stage>,
    /// Stages that fell back to a placeholder
    pub degraded: Vec<Stage>,
}

impl WorkflowState {
    pub fn new(request_id: Uuid, messages: Vec<Message>, dataset: Arc<DataFrame>) -> Self {
        WorkflowState {
            request_id,
            messages,
            enhanced_query: None,
            dataset,
            intent: None,
            chart_code: None,
            code: None,
            chart_output: None,
            output: None,
            response: None,
            visited: Vec::new(),
            degraded: Vec::new(),
        }
    }

    /// Text of the last turn, empty when there are no messages
    pub fn query(&self) -> &str {
        self.messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    /// The enhanced query, or the raw one before enhancement ran
    pub fn working_query(&self) -> &str {
        self.enhanced_query.as_deref().unwrap_or_else(|| self.query())
    }

    pub fn degrade(&mut self, stage: Stage) {
        if !self.degraded.contains(&stage) {
            self.degraded.push(stage);
        }
    }

    pub fn has_text_output(&self) -> bool {
        matches!(&self.output, Some(ExecutionOutcome::Completed { stdout, .. }) if !stdout.trim().is_empty())
    }

    pub fn has_chart(&self) -> bool {
        self.chart_output
            .as_ref()
            .map(ChartOutcome::is_rendered)
            .unwrap_or(false)
    }

    pub fn status(&self) -> WorkflowStatus {
        match (&self.chart_output, &self.output) {
            (Some(chart), _) if chart.is_rendered() => WorkflowStatus::Success,
            (Some(chart), _) if chart.is_timeout() => WorkflowStatus::TimedOut,
            (Some(_), _) => WorkflowStatus::ChartFailed,
            (None, Some(output)) if output.is_completed() => WorkflowStatus::Success,
            (None, Some(output)) if output.is_timeout() => WorkflowStatus::TimedOut,
            (None, Some(_)) => WorkflowStatus::ExecutionFailed,
            (None, None) => WorkflowStatus::ExecutionFailed,
        }
    }
}

/* ===================== Result ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Success,
    /// The generated analysis code raised or hit a resource limit
    ExecutionFailed,
    /// Chart code raised or drew nothing
    ChartFailed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub request_id: Uuid,
    pub query: String,
    pub chart_generated: bool,
    /// Base64 PNG when a chart was rendered
    pub chart_url_or_data: Option<String>,
    /// Data branch output; always `None` on the chart branch
    pub textual_output: Option<String>,
    /// Why the chart branch produced no chart
    pub chart_error: Option<String>,
    pub response: String,
    pub status: WorkflowStatus,
    pub degraded: Vec<Stage>,
    pub elapsed_ms: u64,
}

impl WorkflowResult {
    pub fn from_state(state: WorkflowState, elapsed_ms: u64) -> Self {
        let status = state.status();
        let query = state.query().to_string();
        let (chart_generated, chart_url_or_data, chart_error) = match &state.chart_output {
            Some(ChartOutcome::Rendered { png_base64, .. }) => (true, Some(png_base64.clone()), None),
            Some(failed) => (false, None, Some(failed.text())),
            None => (false, None, None),
        };
        let textual_output = state.output.as_ref().map(ExecutionOutcome::text);

        WorkflowResult {
            request_id: state.request_id,
            query,
            chart_generated,
            chart_url_or_data,
            textual_output,
            chart_error,
            response: state.response.unwrap_or_default(),
            status,
            degraded: state.degraded,
            elapsed_ms,
        }
    }
}
