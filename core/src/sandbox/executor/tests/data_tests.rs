//! Tests for the data branch

use super::helpers::{sample_dataset, sandbox};
use crate::sandbox::executor::ExecutionOutcome;
use crate::sandbox::types::{ExcKind, ExecError};

#[tokio::test]
async fn test_distance_sum_prints() {
    let outcome = sandbox()
        .execute_data("print(df['distance'].sum())", sample_dataset())
        .await;
    match outcome {
        ExecutionOutcome::Completed { stdout, truncated } => {
            assert_eq!(stdout, "24.1\n");
            assert!(!truncated);
        }
        other => panic!("Expected completed run, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fenced_and_unfenced_code_match() {
    let sandbox = sandbox();
    let code = "longest = df.loc[df['distance'].idxmax()]\nprint(longest['id'], longest['name'])";
    let plain = sandbox.execute_data(code, sample_dataset()).await;
    let fenced = sandbox
        .execute_data(&format!("```python\n{}\n```", code), sample_dataset())
        .await;
    assert_eq!(plain, fenced);
    assert_eq!(plain.text(), "103 Long Run\n");
}

#[tokio::test]
async fn test_runtime_error_becomes_failed_outcome() {
    let outcome = sandbox()
        .execute_data("print('partial')\nprint(df['pace'].mean())", sample_dataset())
        .await;
    match &outcome {
        ExecutionOutcome::Failed {
            error: ExecError::Raised(exc),
            stdout,
        } => {
            assert_eq!(exc.kind, ExcKind::KeyError);
            assert_eq!(stdout, "partial\n");
        }
        other => panic!("Expected KeyError, got {:?}", other),
    }
    assert_eq!(outcome.text(), "KeyError('pace')");
}

#[tokio::test]
async fn test_syntax_error_never_escapes() {
    let outcome = sandbox()
        .execute_data("for run in df.iterrows()\n    print(run)", sample_dataset())
        .await;
    match outcome {
        ExecutionOutcome::Failed {
            error: ExecError::Raised(exc),
            ..
        } => assert_eq!(exc.kind, ExcKind::SyntaxError),
        other => panic!("Expected syntax error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dataset_mutation_stays_private() {
    let dataset = sample_dataset();
    let sandbox = sandbox();
    let outcome = sandbox
        .execute_data(
            "df['distance'] = df['distance'] * 1.609\ndf.drop(columns=['name'], inplace=True)",
            dataset.clone(),
        )
        .await;
    assert!(outcome.is_completed(), "{:?}", outcome);
    assert_eq!(dataset.column_names().len(), 5);

    let again = sandbox
        .execute_data("print(df['distance'].sum())", dataset)
        .await;
    assert_eq!(again.text(), "24.1\n");
}

#[tokio::test]
async fn test_sequential_runs_are_independent() {
    let sandbox = sandbox();
    let first = sandbox
        .execute_data("total = df['distance'].sum()\nprint(total)", sample_dataset())
        .await;
    let second = sandbox.execute_data("print(total)", sample_dataset()).await;
    assert_eq!(first.text(), "24.1\n");
    match second {
        ExecutionOutcome::Failed {
            error: ExecError::Raised(exc),
            ..
        } => assert_eq!(exc.kind, ExcKind::NameError),
        other => panic!("Expected NameError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_forbidden_import_is_reported() {
    let outcome = sandbox()
        .execute_data("import subprocess\nsubprocess.run(['ls'])", sample_dataset())
        .await;
    assert_eq!(
        outcome.text(),
        "ImportError(\"import of 'subprocess' is not allowed\")"
    );
}

#[tokio::test]
async fn test_empty_selection_prints_fallback() {
    let code = "\
long = df[df['distance'] > 50]
if long.empty:
    print('No data found')
else:
    print(long['name'].iloc[0])
";
    let outcome = sandbox().execute_data(code, sample_dataset()).await;
    assert_eq!(outcome.text(), "No data found\n");
}
