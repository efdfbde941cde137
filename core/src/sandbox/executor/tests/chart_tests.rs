//! Tests for the chart branch

use super::helpers::{sample_dataset, sandbox, PNG_MAGIC};
use crate::sandbox::executor::{ArtifactSource, ChartFailure, ChartOutcome};
use crate::sandbox::types::{ExcKind, ExecError};

const THEMED_BAR_CHART: &str = r#"
import matplotlib.pyplot as plt
import seaborn as sns

plt.style.use('dark_background')
fig, ax = plt.subplots(figsize=(10, 6))
fig.patch.set_facecolor('#000000')
ax.set_facecolor('#111111')
sns.barplot(data=df, x='name', y='distance', color='#FC5200', ax=ax)
ax.set_title('Distance by Run', color='#ffffff')
ax.set_xlabel('Run')
ax.set_ylabel('Miles')
ax.tick_params(colors='#aaaaaa')
ax.grid(True, color='#333333')
for spine in ax.spines.values():
    spine.set_color('#333333')
plt.tight_layout()
plt.savefig('chart.png', dpi=300, bbox_inches='tight')
plt.clf()
"#;

#[tokio::test]
async fn test_saved_chart_is_base64_png() {
    let outcome = sandbox()
        .execute_chart(THEMED_BAR_CHART, sample_dataset())
        .await;
    match &outcome {
        ChartOutcome::Rendered { source, .. } => assert_eq!(*source, ArtifactSource::Saved),
        other => panic!("Expected rendered chart, got {:?}", other),
    }
    let png = outcome.png_bytes().unwrap();
    assert_eq!(&png[..8], &PNG_MAGIC);
    // "iVBORw0KGgo" is the base64 of the PNG signature
    assert!(outcome.text().starts_with("iVBORw0KGgo"));
}

#[tokio::test]
async fn test_active_figure_is_rendered_without_savefig() {
    let code = "plt.plot(df['start_date_local'], df['distance'])\nplt.title('Mileage')";
    let outcome = sandbox().execute_chart(code, sample_dataset()).await;
    match &outcome {
        ChartOutcome::Rendered { source, .. } => assert_eq!(*source, ArtifactSource::ActiveFigure),
        other => panic!("Expected rendered chart, got {:?}", other),
    }
    assert_eq!(&outcome.png_bytes().unwrap()[..8], &PNG_MAGIC);
}

#[tokio::test]
async fn test_no_drawing_is_no_artifact() {
    let outcome = sandbox()
        .execute_chart("print('nothing to plot')", sample_dataset())
        .await;
    match &outcome {
        ChartOutcome::Failed(ChartFailure::NoArtifact(captured)) => {
            assert_eq!(captured, "nothing to plot\n")
        }
        other => panic!("Expected missing artifact, got {:?}", other),
    }
    assert!(outcome.text().starts_with("Chart generation failed: "));
}

#[tokio::test]
async fn test_silent_code_reports_no_output() {
    let outcome = sandbox().execute_chart("x = 1", sample_dataset()).await;
    assert_eq!(outcome.text(), "Chart generation failed: No output captured");
}

#[tokio::test]
async fn test_chart_code_error_is_execution_failure() {
    let outcome = sandbox()
        .execute_chart("plt.bar(df['name'], df['elevation'])", sample_dataset())
        .await;
    match &outcome {
        ChartOutcome::Failed(ChartFailure::Execution(ExecError::Raised(exc))) => {
            assert_eq!(exc.kind, ExcKind::KeyError)
        }
        other => panic!("Expected execution failure, got {:?}", other),
    }
    assert_eq!(
        outcome.text(),
        "Error executing chart code: KeyError('elevation')"
    );
    assert!(!outcome.is_rendered());
}

#[tokio::test]
async fn test_figures_do_not_leak_between_runs() {
    let sandbox = sandbox();
    let first = sandbox
        .execute_chart("plt.bar(['a', 'b'], [1, 2])", sample_dataset())
        .await;
    assert!(first.is_rendered());
    let second = sandbox.execute_chart("x = 1", sample_dataset()).await;
    match second {
        ChartOutcome::Failed(ChartFailure::NoArtifact(_)) => {}
        other => panic!("Expected a fresh figure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_saving_a_blank_figure_is_no_artifact() {
    let code = "fig, ax = plt.subplots(figsize=(8, 5))\nplt.savefig('chart.png')\nplt.close()";
    let outcome = sandbox().execute_chart(code, sample_dataset()).await;
    match &outcome {
        ChartOutcome::Failed(ChartFailure::NoArtifact(captured)) => {
            assert_eq!(captured, "No output captured")
        }
        other => panic!("Expected missing artifact, got {:?}", other),
    }
}

#[tokio::test]
async fn test_blank_savefig_falls_back_to_drawn_figure() {
    let code = "plt.savefig('early.png')\nplt.plot([1, 2, 3], [3.1, 5.0, 10.0])";
    let outcome = sandbox().execute_chart(code, sample_dataset()).await;
    match &outcome {
        ChartOutcome::Rendered { source, .. } => assert_eq!(*source, ArtifactSource::ActiveFigure),
        other => panic!("Expected rendered chart, got {:?}", other),
    }
}

#[tokio::test]
async fn test_undrawable_marks_fail_instead_of_rendering_blank() {
    let cases = [
        "plt.pie(df['distance'], labels=df['name'])\nplt.savefig('chart.png')",
        "fig, ax = plt.subplots()\nax.boxplot(df['distance'])\nax.set_title('Spread')",
        "sns.boxplot(data=df, y='distance')\nplt.savefig('chart.png')",
        "sns.kdeplot(df['distance'])\nplt.title('Density')",
        "df['distance'].plot(kind='box', title='Spread')",
        "df.plot(kind='pie', y='distance')",
    ];
    for code in cases {
        let outcome = sandbox().execute_chart(code, sample_dataset()).await;
        match &outcome {
            ChartOutcome::Failed(ChartFailure::Execution(ExecError::Raised(exc))) => {
                assert_eq!(exc.kind, ExcKind::NotImplementedError, "{}", code)
            }
            other => panic!("Expected NotImplementedError for {:?}, got {:?}", code, other),
        }
    }
}

#[tokio::test]
async fn test_errorbar_and_regplot_draw_their_points() {
    for code in [
        "plt.errorbar(df['start_date_local'], df['distance'], yerr=0.5, fmt='o')\nplt.savefig('c.png')",
        "sns.regplot(data=df, x='moving_time', y='distance')\nplt.savefig('c.png')",
    ] {
        let outcome = sandbox().execute_chart(code, sample_dataset()).await;
        match &outcome {
            ChartOutcome::Rendered { source, .. } => assert_eq!(*source, ArtifactSource::Saved),
            other => panic!("Expected rendered chart for {:?}, got {:?}", code, other),
        }
    }
}
