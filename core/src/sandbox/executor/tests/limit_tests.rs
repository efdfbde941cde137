//! Tests for resource limits at the executor boundary

use super::helpers::{sample_dataset, sandbox_with};
use crate::sandbox::executor::{ChartOutcome, ExecutionOutcome};
use crate::sandbox::interpreter::Limits;
use crate::sandbox::types::ExecError;
use std::time::Duration;

#[tokio::test]
async fn test_timeout_cancels_the_run() {
    let sandbox = sandbox_with(
        Duration::from_millis(100),
        Limits {
            max_steps: u64::MAX,
            ..Limits::default()
        },
    );
    let outcome = sandbox
        .execute_data("while True:\n    pass\n", sample_dataset())
        .await;
    assert!(outcome.is_timeout(), "{:?}", outcome);
    assert_eq!(
        outcome.text(),
        "TimeoutError('code execution exceeded 100 ms')"
    );

    // the slot comes back once the cancelled worker stops
    let next = sandbox
        .execute_data("print('free')", sample_dataset())
        .await;
    assert_eq!(next.text(), "free\n");
}

#[tokio::test]
async fn test_chart_timeout_is_tagged() {
    let sandbox = sandbox_with(
        Duration::from_millis(100),
        Limits {
            max_steps: u64::MAX,
            ..Limits::default()
        },
    );
    let outcome = sandbox
        .execute_chart("while True:\n    pass\n", sample_dataset())
        .await;
    assert!(outcome.is_timeout(), "{:?}", outcome);
    match outcome {
        ChartOutcome::Failed(failure) => assert!(failure
            .to_string()
            .starts_with("Error executing chart code: TimeoutError")),
        other => panic!("Expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_step_budget_is_enforced() {
    let sandbox = sandbox_with(
        Duration::from_secs(10),
        Limits {
            max_steps: 10_000,
            ..Limits::default()
        },
    );
    let outcome = sandbox
        .execute_data("n = 0\nwhile True:\n    n += 1\n", sample_dataset())
        .await;
    match outcome {
        ExecutionOutcome::Failed {
            error: ExecError::StepLimit { limit },
            ..
        } => assert_eq!(limit, 10_000),
        other => panic!("Expected step limit, got {:?}", other),
    }
}

#[tokio::test]
async fn test_collection_cap() {
    let sandbox = sandbox_with(
        Duration::from_secs(10),
        Limits {
            max_collection_len: 1_000,
            ..Limits::default()
        },
    );
    let outcome = sandbox
        .execute_data("xs = list(range(5000))\nprint(len(xs))", sample_dataset())
        .await;
    match outcome {
        ExecutionOutcome::Failed {
            error: ExecError::CollectionLimit { limit, .. },
            ..
        } => assert_eq!(limit, 1_000),
        other => panic!("Expected collection limit, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_runs_share_slots() {
    let sandbox = std::sync::Arc::new(sandbox_with(Duration::from_secs(10), Limits::default()));
    let mut handles = Vec::new();
    for i in 0..6 {
        let sandbox = sandbox.clone();
        handles.push(tokio::spawn(async move {
            sandbox
                .execute_data(&format!("print({} + len(df))", i), sample_dataset())
                .await
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.text(), format!("{}\n", i + 5));
    }
}
