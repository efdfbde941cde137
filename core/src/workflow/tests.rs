use super::*;
use crate::config::WorkflowSettings;
use crate::llm::{Reply, ScriptedProvider};
use crate::sandbox::{Limits, Sandbox, SandboxOptions};
use crate::table::{Cell, Column, DataFrame};
use base64::Engine;
use std::sync::Arc;
use std::time::Duration;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
const SUM_DISTANCE: &str = "print(df['distance'].sum())";

const CHART_CODE: &str = "\
import matplotlib.pyplot as plt
import seaborn as sns
plt.style.use('dark_background')
fig, ax = plt.subplots(figsize=(10, 6))
sns.lineplot(data=df, x='start_date_local', y='distance', color='#FC5200', ax=ax)
ax.set_title('Distance over time', color='#ffffff')
plt.savefig('chart.png', dpi=300, bbox_inches='tight')
plt.clf()
";

fn dataset() -> Arc<DataFrame> {
    let text = |values: &[&str]| -> Vec<Cell> { values.iter().map(|s| Cell::Str(s.to_string())).collect() };
    let dates = [3, 5, 8, 10, 12]
        .iter()
        .map(|d| {
            Cell::Time(
                chrono::NaiveDate::from_ymd_opt(2024, 6, *d)
                    .unwrap()
                    .and_hms_opt(6, 30, 0)
                    .unwrap(),
            )
        })
        .collect();
    Arc::new(
        DataFrame::new(vec![
            Column::new("id", (201..206).map(Cell::Int).collect()),
            Column::new("name", text(&["Easy", "Tempo", "Long", "Shakeout", "Hills"])),
            Column::new(
                "distance",
                [3.1, 5.0, 10.0, 2.0, 4.0].into_iter().map(Cell::Float).collect(),
            ),
            Column::new("start_date_local", dates),
            Column::new("day_of_week", text(&["Monday", "Wednesday", "Saturday", "Monday", "Wednesday"])),
        ])
        .unwrap(),
    )
}

fn workflow_with(provider: Arc<ScriptedProvider>, settings: WorkflowSettings) -> AnalysisWorkflow {
    AnalysisWorkflow::new(
        provider,
        Sandbox::new(SandboxOptions::default()),
        settings,
        Duration::from_secs(5),
    )
}

fn workflow(provider: Arc<ScriptedProvider>) -> AnalysisWorkflow {
    workflow_with(provider, WorkflowSettings::default())
}

fn script(replies: &[&str]) -> Arc<ScriptedProvider> {
    Arc::new(ScriptedProvider::new(replies.iter().map(|r| Reply::text(*r))))
}

fn judge_prompts(provider: &ScriptedProvider) -> usize {
    provider
        .prompts()
        .iter()
        .filter(|p| p.contains("reviewing generated"))
        .count()
}

/* ===================== Branches ===================== */

#[tokio::test]
async fn test_data_branch_prints_distance_sum() {
    let provider = script(&["data", "Sum the distance column", SUM_DISTANCE, "valid", "You ran 24.1 miles."]);
    let result = workflow(provider.clone())
        .ask("How many miles have I run?", dataset())
        .await;

    assert_eq!(result.textual_output.as_deref(), Some("24.1\n"));
    assert!(!result.chart_generated);
    assert_eq!(result.chart_url_or_data, None);
    assert_eq!(result.status, WorkflowStatus::Success);
    assert_eq!(result.response, "You ran 24.1 miles.");
    assert_eq!(result.query, "How many miles have I run?");
    assert!(result.degraded.is_empty());
    assert_eq!(provider.calls(), 5);
}

#[tokio::test]
async fn test_chart_branch_returns_png() {
    let provider = script(&["chart", "Line chart of distance by date", CHART_CODE, "valid", "Here is your chart."]);
    let result = workflow(provider)
        .ask("Chart my distance over time", dataset())
        .await;

    assert!(result.chart_generated, "{:?}", result.chart_error);
    assert_eq!(result.status, WorkflowStatus::Success);
    assert_eq!(result.textual_output, None);
    assert_eq!(result.chart_error, None);
    let png = base64::engine::general_purpose::STANDARD
        .decode(result.chart_url_or_data.unwrap())
        .unwrap();
    assert_eq!(&png[..8], &PNG_MAGIC);
}

#[tokio::test]
async fn test_nodes_fill_only_the_data_branch() {
    let provider = script(&["data", "q", SUM_DISTANCE, "valid", "answer"]);
    let sandbox = Sandbox::new(SandboxOptions::default());
    let settings = WorkflowSettings::default();
    let overview = crate::dataset::schema_overview();
    let mut state = WorkflowState::new(uuid::Uuid::new_v4(), vec![Message::user("q")], dataset());
    let sample = engine::sample_markdown(&state.dataset, 5);
    let ctx = nodes::NodeContext {
        provider: provider.as_ref(),
        sandbox: &sandbox,
        settings: &settings,
        llm_timeout: Duration::from_secs(5),
        overview: &overview,
        sample: &sample,
    };

    nodes::classify(&ctx, &mut state).await;
    assert_eq!(state.intent, Some(Intent::Data));
    nodes::enhance(&ctx, &mut state).await;
    assert_eq!(state.working_query(), "q");
    nodes::generate(&ctx, &mut state, Intent::Data).await;
    assert_eq!(state.chart_code, None);
    let verdict = nodes::verify(&ctx, &mut state, Intent::Data).await;
    assert_eq!(verdict, nodes::Verification::Accepted { round: 1 });
    nodes::analyze_data(&ctx, &mut state).await;
    assert!(state.has_text_output());
    assert!(state.chart_output.is_none());
}

#[tokio::test]
async fn test_visited_stages_follow_the_graph() {
    let provider = script(&["chart", "q", CHART_CODE, "valid", "answer"]);
    let state = workflow(provider)
        .run_state(vec![Message::user("chart it")], dataset())
        .await;
    assert_eq!(
        state.visited,
        vec![
            Stage::Start,
            Stage::Classify,
            Stage::Enhance,
            Stage::PrepareChart,
            Stage::VerifyChart,
            Stage::RenderChart,
            Stage::Synthesize,
            Stage::End,
        ]
    );
}

/* ===================== Verification ===================== */

#[tokio::test]
async fn test_default_verification_is_at_most_two_round_trips() {
    // the corrected code is never judged again with one round
    let provider = Arc::new(
        ScriptedProvider::new(
            ["data", "q", "print(1)", "It should print the sum", SUM_DISTANCE, "answer"]
                .iter()
                .map(|r| Reply::text(*r)),
        )
        .with_fallback(Reply::text("still wrong")),
    );
    let result = workflow(provider.clone()).ask("total miles", dataset()).await;

    assert_eq!(provider.calls(), 6);
    assert_eq!(judge_prompts(&provider), 1);
    assert_eq!(result.textual_output.as_deref(), Some("24.1\n"));
    assert_eq!(result.response, "answer");
}

#[tokio::test]
async fn test_extra_rounds_rejudge_corrections() {
    let provider = script(&["data", "q", "print(1)", "wrong", SUM_DISTANCE, "valid", "answer"]);
    let settings = WorkflowSettings {
        max_verification_rounds: 3,
        ..WorkflowSettings::default()
    };
    let result = workflow_with(provider.clone(), settings)
        .ask("total miles", dataset())
        .await;

    assert_eq!(judge_prompts(&provider), 2);
    assert_eq!(provider.calls(), 7);
    assert_eq!(result.textual_output.as_deref(), Some("24.1\n"));
}

#[tokio::test]
async fn test_rounds_are_bounded_when_never_accepted() {
    let provider = Arc::new(
        ScriptedProvider::new(["data", "q"].iter().map(|r| Reply::text(*r)))
            .with_fallback(Reply::text(SUM_DISTANCE)),
    );
    let settings = WorkflowSettings {
        max_verification_rounds: 2,
        ..WorkflowSettings::default()
    };
    let result = workflow_with(provider.clone(), settings)
        .ask("total miles", dataset())
        .await;

    // classify, enhance, generate, 2 x (judge, correct), synthesize
    assert_eq!(provider.calls(), 8);
    assert_eq!(judge_prompts(&provider), 2);
    assert_eq!(result.status, WorkflowStatus::Success);
}

#[tokio::test]
async fn test_verbose_affirmation_is_not_acceptance() {
    let provider = script(&["data", "q", SUM_DISTANCE, "Yes, this is valid.", SUM_DISTANCE, "answer"]);
    workflow(provider.clone()).ask("total miles", dataset()).await;
    // the verbose reply triggered a correction round trip
    assert!(provider.prompts()[4].contains("Feedback: Yes, this is valid."));
}

#[tokio::test]
async fn test_lenient_policy_accepts_decorated_token() {
    let provider = script(&["data", "q", SUM_DISTANCE, " `Valid`.\n", "answer"]);
    let settings = WorkflowSettings {
        verdict_policy: VerdictPolicy::Lenient,
        ..WorkflowSettings::default()
    };
    let result = workflow_with(provider.clone(), settings)
        .ask("total miles", dataset())
        .await;
    assert_eq!(provider.calls(), 5);
    assert_eq!(result.response, "answer");
}

#[tokio::test]
async fn test_judge_failure_keeps_generated_code() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Reply::text("data"),
        Reply::text("q"),
        Reply::text(SUM_DISTANCE),
        Reply::fail("judge offline"),
        Reply::text("answer"),
    ]));
    let result = workflow(provider).ask("total miles", dataset()).await;
    assert_eq!(result.textual_output.as_deref(), Some("24.1\n"));
    assert_eq!(result.degraded, vec![Stage::VerifyCode]);
}

#[tokio::test]
async fn test_verification_budget_is_enforced() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Reply::text("data"),
        Reply::text("q"),
        Reply::text(SUM_DISTANCE),
        Reply::Stall(Duration::from_secs(3), Box::new(Reply::text("valid"))),
        Reply::text("answer"),
    ]));
    let settings = WorkflowSettings {
        verification_timeout_secs: 1,
        ..WorkflowSettings::default()
    };
    let result = workflow_with(provider, settings).ask("total miles", dataset()).await;
    assert_eq!(result.textual_output.as_deref(), Some("24.1\n"));
    assert_eq!(result.degraded, vec![Stage::VerifyCode]);
}

/* ===================== Robustness ===================== */

#[tokio::test]
async fn test_sequential_runs_are_identical() {
    let replies = ["data", "q", SUM_DISTANCE, "valid", "answer"];
    let first = workflow(script(&replies)).ask("total miles", dataset()).await;
    let second = workflow(script(&replies)).ask("total miles", dataset()).await;
    assert_eq!(first.textual_output, second.textual_output);
    assert_eq!(first.chart_generated, second.chart_generated);
    assert_ne!(first.request_id, second.request_id);
}

#[tokio::test]
async fn test_syntax_error_reports_execution_failure() {
    // status names the failure instead of reporting success
    let provider = script(&["data", "q", "for x in df\n    print(x)", "valid", "answer"]);
    let result = workflow(provider).ask("total miles", dataset()).await;
    assert_eq!(result.status, WorkflowStatus::ExecutionFailed);
    assert!(result.textual_output.unwrap().starts_with("SyntaxError("));
    assert_eq!(result.response, "answer");
}

#[tokio::test]
async fn test_fenced_code_runs_like_plain_code() {
    let fenced = format!("```python\n{}\n```", SUM_DISTANCE);
    let plain = workflow(script(&["data", "q", SUM_DISTANCE, "valid", "a"]))
        .ask("total miles", dataset())
        .await;
    let wrapped = workflow(script(&["data", "q", &fenced, "valid", "a"]))
        .ask("total miles", dataset())
        .await;
    assert_eq!(plain.textual_output, wrapped.textual_output);
    assert_eq!(wrapped.textual_output.as_deref(), Some("24.1\n"));
}

#[tokio::test]
async fn test_classification_failure_defaults_to_data() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Reply::fail("provider down"),
        Reply::text("q"),
        Reply::text(SUM_DISTANCE),
        Reply::text("valid"),
        Reply::text("answer"),
    ]));
    let result = workflow(provider).ask("Chart my miles", dataset()).await;
    assert!(!result.chart_generated);
    assert_eq!(result.textual_output.as_deref(), Some("24.1\n"));
    assert_eq!(result.degraded, vec![Stage::Classify]);
}

#[tokio::test]
async fn test_classification_timeout_defaults_to_data() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Reply::Stall(Duration::from_secs(2), Box::new(Reply::text("chart"))),
        Reply::text("q"),
        Reply::text(SUM_DISTANCE),
        Reply::text("valid"),
        Reply::text("answer"),
    ]));
    let workflow = AnalysisWorkflow::new(
        provider,
        Sandbox::new(SandboxOptions::default()),
        WorkflowSettings::default(),
        Duration::from_millis(100),
    );
    let result = workflow.ask("Chart my miles", dataset()).await;
    assert!(!result.chart_generated);
    assert_eq!(result.degraded, vec![Stage::Classify]);
}

#[tokio::test]
async fn test_enhancement_failure_uses_placeholder() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Reply::text("data"),
        Reply::fail("enhancer down"),
        Reply::text(SUM_DISTANCE),
        Reply::text("valid"),
        Reply::text("answer"),
    ]));
    let result = workflow(provider.clone()).ask("How far did I run?", dataset()).await;
    assert!(provider.prompts()[2].contains("[enhancement unavailable] How far did I run?"));
    assert_eq!(result.textual_output.as_deref(), Some("24.1\n"));
    assert_eq!(result.degraded, vec![Stage::Enhance]);
}

#[tokio::test]
async fn test_generation_failure_stores_comment_placeholder() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Reply::text("data"),
        Reply::text("q"),
        Reply::fail("generator down"),
        Reply::text("valid"),
        Reply::text("answer"),
    ]));
    let result = workflow(provider.clone()).ask("total miles", dataset()).await;
    assert!(provider.prompts()[3].contains("# Error generating code: generator down"));
    assert_eq!(result.textual_output.as_deref(), Some(""));
    assert_eq!(result.degraded, vec![Stage::PrepareData]);
    // the synthesizer is told there is no text output
    assert!(provider.prompts()[4].contains("Text output exists: False"));
}

#[tokio::test]
async fn test_synthesis_failure_apologizes() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Reply::text("data"),
        Reply::text("q"),
        Reply::text(SUM_DISTANCE),
        Reply::text("valid"),
        Reply::fail("synthesizer down"),
    ]));
    let result = workflow(provider).ask("total miles", dataset()).await;
    assert!(result.response.starts_with("Sorry"));
    assert!(result.response.contains("output is included"));
    assert_eq!(result.degraded, vec![Stage::Synthesize]);
    assert_eq!(result.status, WorkflowStatus::Success);
}

#[tokio::test]
async fn test_chart_without_drawing_fails() {
    let provider = script(&["chart", "q", "print('drawing skipped')", "valid", "answer"]);
    let result = workflow(provider).ask("Chart my miles", dataset()).await;
    assert!(!result.chart_generated);
    assert_eq!(result.status, WorkflowStatus::ChartFailed);
    assert_eq!(result.textual_output, None);
    assert_eq!(
        result.chart_error.as_deref(),
        Some("Chart generation failed: drawing skipped\n")
    );
}

#[tokio::test]
async fn test_runaway_code_times_out() {
    let provider = script(&["data", "q", "while True:\n    pass", "valid", "answer"]);
    let sandbox = Sandbox::new(SandboxOptions {
        timeout: Duration::from_millis(200),
        max_concurrent: 1,
        limits: Limits {
            max_steps: u64::MAX,
            ..Limits::default()
        },
    });
    let workflow = AnalysisWorkflow::new(
        provider,
        sandbox,
        WorkflowSettings::default(),
        Duration::from_secs(5),
    );
    let result = workflow.ask("total miles", dataset()).await;
    assert_eq!(result.status, WorkflowStatus::TimedOut);
}

#[tokio::test]
async fn test_only_the_last_message_is_used() {
    let provider = script(&["data", "q", SUM_DISTANCE, "valid", "answer"]);
    let messages = vec![
        Message::user("What was my longest run?"),
        Message::assistant("Your longest run was 10 miles."),
        Message::user("And my total distance?"),
    ];
    let result = workflow(provider.clone()).run_workflow(messages, dataset()).await;
    assert_eq!(result.query, "And my total distance?");
    assert!(provider.prompts()[0].contains("And my total distance?"));
    assert!(!provider.prompts()[0].contains("longest run"));
}

#[tokio::test]
async fn test_result_serializes_with_snake_case_status() {
    let provider = script(&["data", "q", SUM_DISTANCE, "valid", "answer"]);
    let result = workflow(provider).ask("total miles", dataset()).await;
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], "success");
    assert_eq!(json["chart_generated"], false);
    assert_eq!(json["textual_output"], "24.1\n");
    assert!(json["chart_error"].is_null());
}
