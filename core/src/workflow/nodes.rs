//! Workflow nodes
//!
//! Each node reads what it needs from `WorkflowState` and writes its result
//! back. Provider failures never escape a node: they are logged, the stage is
//! recorded as degraded and a placeholder value takes the result's place.

use std::time::Duration;
use tracing::{debug, info, warn};

use super::prompts::{self, PromptContext};
use super::state::{Intent, Stage, WorkflowState};
use crate::config::WorkflowSettings;
use crate::llm::{complete_within, LlmError, LlmProvider};
use crate::sandbox::Sandbox;

pub const ENHANCEMENT_PLACEHOLDER: &str = "[enhancement unavailable]";

/// Everything a node needs besides the state
pub struct NodeContext<'a> {
    pub provider: &'a dyn LlmProvider,
    pub sandbox: &'a Sandbox,
    pub settings: &'a WorkflowSettings,
    pub llm_timeout: Duration,
    pub overview: &'a str,
    /// Markdown rendering of the first dataset rows
    pub sample: &'a str,
}

impl NodeContext<'_> {
    async fn ask(&self, stage: Stage, prompt: &str) -> Result<String, LlmError> {
        complete_within(self.provider, stage.name(), prompt, self.llm_timeout).await
    }

    fn prompt_context<'s>(&'s self, query: &'s str) -> PromptContext<'s> {
        PromptContext {
            query,
            overview: self.overview,
            sample: self.sample,
        }
    }
}

/* ===================== Routing ===================== */

/// Chart when the reply mentions "chart"; Data otherwise, and on failure
pub async fn classify(ctx: &NodeContext<'_>, state: &mut WorkflowState) {
    let prompt = prompts::classify(state.query());
    let intent = match ctx.ask(Stage::Classify, &prompt).await {
        Ok(reply) if reply.to_lowercase().contains("chart") => Intent::Chart,
        Ok(_) => Intent::Data,
        Err(e) => {
            warn!(error = %e, "Classification failed, defaulting to data analysis");
            state.degrade(Stage::Classify);
            Intent::Data
        }
    };
    info!(intent = ?intent, "Query classified");
    state.intent = Some(intent);
}

pub async fn enhance(ctx: &NodeContext<'_>, state: &mut WorkflowState) {
    let prompt = prompts::enhance(state.query(), ctx.overview);
    let enhanced = match ctx.ask(Stage::Enhance, &prompt).await {
        Ok(reply) => reply.trim().to_string(),
        Err(e) => {
            warn!(error = %e, "Query enhancement failed");
            state.degrade(Stage::Enhance);
            format!("{} {}", ENHANCEMENT_PLACEHOLDER, state.query())
        }
    };
    debug!(enhanced_query = %enhanced, "Query enhanced");
    state.enhanced_query = Some(enhanced);
}

/* ===================== Generation ===================== */

pub async fn generate(ctx: &NodeContext<'_>, state: &mut WorkflowState, intent: Intent) {
    let stage = match intent {
        Intent::Chart => Stage::PrepareChart,
        Intent::Data => Stage::PrepareData,
    };
    let prompt = prompts::generate(intent, ctx.prompt_context(state.working_query()));
    let code = match ctx.ask(stage, &prompt).await {
        Ok(code) => code,
        Err(e) => {
            warn!(error = %e, stage = stage.name(), "Code generation failed");
            state.degrade(stage);
            format!("# Error generating code: {}", e)
        }
    };
    debug!(stage = stage.name(), code_len = code.len(), "Code generated");
    match intent {
        Intent::Chart => state.chart_code = Some(code),
        Intent::Data => state.code = Some(code),
    }
}

/* ===================== Verification ===================== */

/// How a verification pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Accepted { round: u32 },
    /// Every round produced a correction; the last one is kept unjudged
    Corrected { rounds: u32 },
    JudgeFailed { round: u32 },
    CorrectionFailed { round: u32 },
    TimedOut,
}

/// Judge the generated program and correct it, for at most
/// `max_verification_rounds` rounds; a corrected program is judged again only
/// when another round remains
pub async fn verify(ctx: &NodeContext<'_>, state: &mut WorkflowState, intent: Intent) -> Verification {
    let stage = match intent {
        Intent::Chart => Stage::VerifyChart,
        Intent::Data => Stage::VerifyCode,
    };
    let slot = match intent {
        Intent::Chart => &mut state.chart_code,
        Intent::Data => &mut state.code,
    };
    let mut code = slot.take().unwrap_or_default();
    let query = state.working_query().to_string();

    let budget = ctx.settings.verification_timeout();
    let verdict = match tokio::time::timeout(budget, rounds(ctx, stage, intent, &query, &mut code)).await {
        Ok(verdict) => verdict,
        Err(_) => Verification::TimedOut,
    };

    match intent {
        Intent::Chart => state.chart_code = Some(code),
        Intent::Data => state.code = Some(code),
    }
    match verdict {
        Verification::Accepted { .. } | Verification::Corrected { .. } => {
            info!(stage = stage.name(), verdict = ?verdict, "Verification finished")
        }
        _ => {
            warn!(stage = stage.name(), verdict = ?verdict, "Verification incomplete, keeping current code");
            state.degrade(stage);
        }
    }
    verdict
}

async fn rounds(
    ctx: &NodeContext<'_>,
    stage: Stage,
    intent: Intent,
    query: &str,
    code: &mut String,
) -> Verification {
    let max_rounds = ctx.settings.max_verification_rounds.max(1);
    for round in 1..=max_rounds {
        let judge = prompts::judge(intent, ctx.prompt_context(query), code);
        let feedback = match ctx.ask(stage, &judge).await {
            Ok(feedback) => feedback,
            Err(_) => return Verification::JudgeFailed { round },
        };
        if ctx.settings.verdict_policy.accepts(&feedback) {
            return Verification::Accepted { round };
        }
        debug!(round, feedback = %feedback, "Code rejected by judge");

        let fix = prompts::correct(intent, ctx.prompt_context(query), code, &feedback);
        match ctx.ask(stage, &fix).await {
            Ok(corrected) => *code = corrected,
            Err(_) => return Verification::CorrectionFailed { round },
        }
    }
    Verification::Corrected { rounds: max_rounds }
}

/* ===================== Execution ===================== */

pub async fn render_chart(ctx: &NodeContext<'_>, state: &mut WorkflowState) {
    let code = state.chart_code.clone().unwrap_or_default();
    let outcome = ctx.sandbox.execute_chart(&code, state.dataset.clone()).await;
    if !outcome.is_rendered() {
        warn!(failure = %outcome.text(), "Chart was not rendered");
    }
    state.chart_output = Some(outcome);
}

pub async fn analyze_data(ctx: &NodeContext<'_>, state: &mut WorkflowState) {
    let code = state.code.clone().unwrap_or_default();
    let outcome = ctx.sandbox.execute_data(&code, state.dataset.clone()).await;
    if !outcome.is_completed() {
        warn!(error = %outcome.text(), "Analysis code failed");
    }
    state.output = Some(outcome);
}

/* ===================== Synthesis ===================== */

pub async fn synthesize(ctx: &NodeContext<'_>, state: &mut WorkflowState) {
    let (has_text, has_chart) = (state.has_text_output(), state.has_chart());
    let prompt = prompts::synthesize(
        state.query(),
        ctx.overview,
        has_text,
        has_chart,
        &ctx.settings.activity_link_pattern,
    );
    let response = match ctx.ask(Stage::Synthesize, &prompt).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Response synthesis failed");
            state.degrade(Stage::Synthesize);
            prompts::apology(has_text, has_chart)
        }
    };
    state.response = Some(response);
}
