//! # Analysis Workflow Engine
//!
//! Drives one query through the node graph:
//!
//! ```text
//! Start → Classify → Enhance ─┬→ PrepareChart → VerifyChart → RenderChart ─┬→ Synthesize → End
//!                             └→ PrepareData  → VerifyCode  → AnalyzeData ─┘
//! ```
//!
//! The only branch is the transition out of `Enhance`, decided by the
//! classifier. Each call builds its own `WorkflowState`; nothing about a query
//! outlives `run_workflow`.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use super::nodes::{self, NodeContext};
use super::state::{Intent, Message, Stage, WorkflowResult, WorkflowState};
use crate::config::{Config, WorkflowSettings};
use crate::dataset::schema_overview;
use crate::llm::LlmProvider;
use crate::sandbox::Sandbox;
use crate::table::format::frame_to_markdown;
use crate::table::DataFrame;

pub struct AnalysisWorkflow {
    provider: Arc<dyn LlmProvider>,
    sandbox: Sandbox,
    settings: WorkflowSettings,
    llm_timeout: Duration,
    overview: String,
}

impl AnalysisWorkflow {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        sandbox: Sandbox,
        settings: WorkflowSettings,
        llm_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            sandbox,
            settings,
            llm_timeout,
            overview: schema_overview(),
        }
    }

    pub fn from_config(config: &Config, provider: Arc<dyn LlmProvider>) -> Self {
        Self::new(
            provider,
            Sandbox::new(config.sandbox.options()),
            config.workflow.clone(),
            config.llm.timeout(),
        )
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Answer a single question
    pub async fn ask(&self, question: &str, dataset: Arc<DataFrame>) -> WorkflowResult {
        self.run_workflow(vec![Message::user(question)], dataset).await
    }

    /// Run the full graph for the last message; always returns a result
    pub async fn run_workflow(&self, messages: Vec<Message>, dataset: Arc<DataFrame>) -> WorkflowResult {
        let started = Instant::now();
        let state = self.run_state(messages, dataset).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let result = WorkflowResult::from_state(state, elapsed_ms);
        info!(
            request_id = %result.request_id,
            status = ?result.status,
            chart_generated = result.chart_generated,
            degraded = result.degraded.len(),
            elapsed_ms,
            "Workflow finished"
        );
        result
    }

    /// Like `run_workflow`, but hands back the whole working state
    pub async fn run_state(&self, messages: Vec<Message>, dataset: Arc<DataFrame>) -> WorkflowState {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "workflow",
            request_id = %request_id,
            rows = dataset.len(),
            provider = self.provider.name(),
        );
        self.execute(request_id, messages, dataset).instrument(span).await
    }

    async fn execute(&self, request_id: Uuid, messages: Vec<Message>, dataset: Arc<DataFrame>) -> WorkflowState {
        let sample = sample_markdown(&dataset, self.settings.sample_rows);
        let ctx = NodeContext {
            provider: self.provider.as_ref(),
            sandbox: &self.sandbox,
            settings: &self.settings,
            llm_timeout: self.llm_timeout,
            overview: &self.overview,
            sample: &sample,
        };

        let mut state = WorkflowState::new(request_id, messages, dataset);
        info!(query = %state.query(), "Workflow started");

        let mut stage = Stage::Start;
        loop {
            state.visited.push(stage);
            debug!(stage = stage.name(), "Entering stage");
            stage = match stage {
                Stage::Start => Stage::Classify,
                Stage::Classify => {
                    nodes::classify(&ctx, &mut state).await;
                    Stage::Enhance
                }
                Stage::Enhance => {
                    nodes::enhance(&ctx, &mut state).await;
                    match state.intent {
                        Some(Intent::Chart) => Stage::PrepareChart,
                        _ => Stage::PrepareData,
                    }
                }
                Stage::PrepareChart => {
                    nodes::generate(&ctx, &mut state, Intent::Chart).await;
                    Stage::VerifyChart
                }
                Stage::PrepareData => {
                    nodes::generate(&ctx, &mut state, Intent::Data).await;
                    Stage::VerifyCode
                }
                Stage::VerifyChart => {
                    nodes::verify(&ctx, &mut state, Intent::Chart).await;
                    Stage::RenderChart
                }
                Stage::VerifyCode => {
                    nodes::verify(&ctx, &mut state, Intent::Data).await;
                    Stage::AnalyzeData
                }
                Stage::RenderChart => {
                    nodes::render_chart(&ctx, &mut state).await;
                    Stage::Synthesize
                }
                Stage::AnalyzeData => {
                    nodes::analyze_data(&ctx, &mut state).await;
                    Stage::Synthesize
                }
                Stage::Synthesize => {
                    nodes::synthesize(&ctx, &mut state).await;
                    Stage::End
                }
                Stage::End => break,
            };
        }
        state
    }
}

/// First `rows` rows as a markdown table
pub fn sample_markdown(dataset: &DataFrame, rows: usize) -> String {
    let head: Vec<usize> = (0..rows.min(dataset.len())).collect();
    frame_to_markdown(&dataset.take(&head))
}
