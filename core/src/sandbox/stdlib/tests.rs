//! Library behaviour through whole programs

use crate::sandbox::interpreter::{Interpreter, Limits, Profile, RunReport};
use crate::sandbox::types::{ExcKind, ExecError, Val};
use crate::table::{Cell, Column, DataFrame};
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

fn day(d: u32) -> Cell {
    Cell::Time(
        NaiveDate::from_ymd_opt(2024, 5, d)
            .unwrap()
            .and_hms_opt(7, 30, 0)
            .unwrap(),
    )
}

fn runs() -> DataFrame {
    DataFrame::new(vec![
        Column::new(
            "name",
            ["Easy", "Tempo", "Long", "Recovery", "Intervals"]
                .iter()
                .map(|s| Cell::Str(s.to_string()))
                .collect(),
        ),
        Column::new(
            "type",
            ["Run", "Run", "Run", "Ride", "Run"]
                .iter()
                .map(|s| Cell::Str(s.to_string()))
                .collect(),
        ),
        Column::new(
            "distance",
            [3.1, 5.0, 10.0, 2.0, 4.0].into_iter().map(Cell::Float).collect(),
        ),
        Column::new(
            "moving_time",
            [28.0, 40.0, 95.0, 20.0, 33.0].into_iter().map(Cell::Float).collect(),
        ),
        Column::new("start_date_local", vec![day(6), day(8), day(11), day(12), day(14)]),
    ])
    .unwrap()
}

fn run_profile(profile: Profile, source: &str) -> RunReport {
    let mut interp = Interpreter::new(profile, Limits::default(), CancellationToken::new());
    for (name, value) in super::prelude(profile) {
        interp.bind(name, value);
    }
    interp.bind("df", Val::frame(runs()));
    interp.run(source)
}

fn stdout(source: &str) -> String {
    let report = run_profile(Profile::Data, source);
    if let Some(err) = &report.error {
        panic!("program failed with {}: {}", err, source);
    }
    report.stdout
}

#[test]
fn test_distance_sum() {
    assert_eq!(stdout("print(df['distance'].sum())"), "24.1\n");
}

#[test]
fn test_scalar_methods_on_reductions() {
    assert_eq!(stdout("print(df['distance'].mean().round(2))"), "4.82\n");
    assert_eq!(stdout("print(df['distance'].sum().round())"), "24.0\n");
    assert_eq!(stdout("print(df['distance'].max().item())"), "10.0\n");
    assert_eq!(stdout("print(df['distance'].max().is_integer())"), "True\n");
    assert_eq!(stdout("print(len(df).bit_length(), len(df).item())"), "3 5\n");
}

#[test]
fn test_len_of_groupby_counts_groups() {
    assert_eq!(stdout("print(len(df.groupby('type')))"), "2\n");
    assert_eq!(stdout("print(len(df.groupby(['type', 'name'])))"), "5\n");
}

#[test]
fn test_masks_and_reductions() {
    assert_eq!(stdout("print(len(df[df['distance'] > 4]))"), "2\n");
    assert_eq!(stdout("print(round(df['distance'].mean(), 2))"), "4.82\n");
    assert_eq!(stdout("print(df['distance'].max(), df['distance'].min())"), "10.0 2.0\n");
    assert_eq!(
        stdout("runs = df[df['type'] == 'Run']\nprint(runs['distance'].count())"),
        "4\n"
    );
}

#[test]
fn test_sorting_and_positional_access() {
    let source = "top = df.sort_values('distance', ascending=False)\nprint(top.iloc[0]['name'], top['name'].tolist()[-1])";
    assert_eq!(stdout(source), "Long Recovery\n");
    assert_eq!(stdout("print(df.loc[df['distance'].idxmax(), 'name'])"), "Long\n");
}

#[test]
fn test_derived_columns() {
    let source = "\
df['pace'] = df['moving_time'] / df['distance']
print(round(df['pace'].iloc[1], 2))
print(df.shape)
";
    assert_eq!(stdout(source), "8.0\n(5, 6)\n");
}

#[test]
fn test_groupby_sum_by_label() {
    let source = "totals = df.groupby('type')['distance'].sum()\nprint(totals['Ride'], round(totals['Run'], 1))";
    assert_eq!(stdout(source), "2.0 22.1\n");
}

#[test]
fn test_value_counts_and_unique() {
    assert_eq!(stdout("print(df['type'].value_counts()['Run'])"), "4\n");
    assert_eq!(stdout("print(df['type'].nunique())"), "2\n");
}

#[test]
fn test_datetime_accessor() {
    let source = "d = df['start_date_local']\nprint(d.dt.day.tolist())\nprint(d.dt.day_name().iloc[0])";
    assert_eq!(stdout(source), "[6, 8, 11, 12, 14]\nMonday\n");
}

#[test]
fn test_numpy_functions() {
    assert_eq!(stdout("print(np.mean([1, 2, 3]), np.sqrt(16))"), "2.0 4.0\n");
    assert_eq!(stdout("print(np.isnan(np.nan), math.floor(2.7))"), "True 2\n");
    let source = "labels = np.where(df['distance'] > 4, 'long', 'short')\nprint(list(labels))";
    assert_eq!(
        stdout(source),
        "['short', 'long', 'long', 'short', 'short']\n"
    );
}

#[test]
fn test_iterrows_loop() {
    let source = "\
total = 0
for _, row in df.iterrows():
    if row['type'] == 'Run':
        total += row['moving_time']
print(total)
";
    assert_eq!(stdout(source), "196.0\n");
}

#[test]
fn test_dataframe_copy_is_private() {
    let source = "other = df.copy()\nother['distance'] = 0\nprint(df['distance'].sum())";
    assert_eq!(stdout(source), "24.1\n");
}

#[test]
fn test_missing_column_is_key_error() {
    let report = run_profile(Profile::Data, "df['elevation']");
    match report.error {
        Some(ExecError::Raised(exc)) => assert_eq!(exc.kind, ExcKind::KeyError),
        other => panic!("Expected KeyError, got {:?}", other),
    }
}

#[test]
fn test_plotting_is_absent_from_data_profile() {
    let report = run_profile(Profile::Data, "plt.figure()");
    match report.error {
        Some(ExecError::Raised(exc)) => assert_eq!(exc.kind, ExcKind::NameError),
        other => panic!("Expected NameError, got {:?}", other),
    }
}

#[test]
fn test_savefig_writes_png_artifact() {
    let source = "\
plt.style.use('dark_background')
fig, ax = plt.subplots(figsize=(8, 4))
ax.bar(df['name'], df['distance'], color='#FC5200')
ax.set_title('Distance per run')
plt.savefig('chart.png', dpi=300, bbox_inches='tight')
plt.close()
";
    let report = run_profile(Profile::Chart, source);
    assert!(report.error.is_none(), "{:?}", report.error);
    let png = report.artifact.expect("savefig should leave an artifact");
    assert_eq!(&png[..8], &PNG_MAGIC);
}

#[test]
fn test_figure_state_without_savefig() {
    let source = "\
plt.style.use('dark_background')
plt.figure(figsize=(6, 3))
plt.plot(df['start_date_local'], df['distance'], label='miles')
plt.title('Mileage')
plt.legend()
";
    let report = run_profile(Profile::Chart, source);
    assert!(report.error.is_none(), "{:?}", report.error);
    assert!(report.artifact.is_none());
    let figure = report.figure;
    assert_eq!(figure.width_in, 6.0);
    assert_eq!(figure.facecolor, Some(crate::sandbox::chart::Rgb::BLACK));
    let panel = &figure.panels[0];
    assert_eq!(panel.title.as_deref(), Some("Mileage"));
    assert_eq!(panel.marks.len(), 1);
    assert_eq!(panel.marks[0].label.as_deref(), Some("miles"));
    assert!(panel.legend);
}

#[test]
fn test_pandas_and_seaborn_plots() {
    let source = "\
weekly = df.groupby('type')['distance'].sum()
weekly.plot(kind='bar', title='By type')
sns.barplot(data=df, x='name', y='distance')
";
    let report = run_profile(Profile::Chart, source);
    assert!(report.error.is_none(), "{:?}", report.error);
    let panel = &report.figure.panels[0];
    assert_eq!(panel.marks.len(), 2);
    assert_eq!(panel.title.as_deref(), Some("By type"));
    assert_eq!(panel.marks[1].xs.len(), 5);
}
