//! Text rendering for cells, series and frames
//!
//! Output follows the pandas console layout (right-aligned values, left-aligned
//! index, `Name: ..., dtype: ...` footer, head/tail truncation) so printed
//! results read the same as they would in a notebook.

use super::{Cell, DataFrame, Dtype, Series};

/// Rows shown before a table is truncated to head/tail
const MAX_ROWS: usize = 60;
/// Rows kept on each side of a truncated table
const EDGE_ROWS: usize = 5;
/// Significant decimals kept for floats inside tables
const TABLE_PRECISION: usize = 6;

/* ===================== Scalars ===================== */

/// Shortest round-trip float text, spelled the way Python's `repr` does
pub fn py_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let sci = format!("{:e}", x);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..16).contains(&exponent) {
        let plain = format!("{}", x);
        if plain.contains('.') {
            plain
        } else {
            format!("{}.0", plain)
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}

pub fn format_delta(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let total = seconds.unsigned_abs();
    let days = total / 86_400;
    let rem = total % 86_400;
    format!(
        "{}{} days {:02}:{:02}:{:02}",
        sign,
        days,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Text of a cell outside any column context (index labels, row names)
pub fn label_text(cell: &Cell) -> String {
    match cell {
        Cell::Null => "None".to_string(),
        Cell::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        Cell::Int(n) => n.to_string(),
        Cell::Float(x) if x.is_nan() => "NaN".to_string(),
        Cell::Float(x) => py_float(*x),
        Cell::Str(s) => s.clone(),
        Cell::Time(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
        Cell::Delta(s) => format_delta(*s),
        Cell::Tuple(parts) => {
            let inner: Vec<String> = parts.iter().map(label_text).collect();
            format!("({})", inner.join(", "))
        }
    }
}

/* ===================== Column Formatting ===================== */

/// How the values of one column are spelled inside a table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnFormat {
    pub dtype: Dtype,
    pub decimals: usize,
    pub date_only: bool,
}

impl ColumnFormat {
    pub fn for_values(values: &[Cell]) -> Self {
        let dtype = Dtype::infer(values);
        let decimals = values
            .iter()
            .filter_map(|v| match v {
                Cell::Float(x) if x.is_finite() => Some(decimals_needed(*x)),
                _ => None,
            })
            .max()
            .unwrap_or(1)
            .max(1);
        let date_only = values.iter().all(|v| match v {
            Cell::Time(t) => t.time() == chrono::NaiveTime::default(),
            _ => true,
        });
        ColumnFormat {
            dtype,
            decimals,
            date_only,
        }
    }

    pub fn text(&self, cell: &Cell) -> String {
        match (self.dtype, cell) {
            (Dtype::Float64, Cell::Null) => "NaN".to_string(),
            (Dtype::Datetime, Cell::Null) => "NaT".to_string(),
            (_, Cell::Float(x)) if x.is_nan() => "NaN".to_string(),
            (Dtype::Float64, Cell::Float(x)) => format!("{:.*}", self.decimals, x),
            (Dtype::Float64, Cell::Int(n)) => format!("{:.*}", self.decimals, *n as f64),
            (Dtype::Datetime, Cell::Time(t)) if self.date_only => t.format("%Y-%m-%d").to_string(),
            (Dtype::Object, Cell::Float(x)) => py_float(*x),
            (_, other) => label_text(other),
        }
    }
}

fn decimals_needed(x: f64) -> usize {
    let text = format!("{:.*}", TABLE_PRECISION, x);
    match text.split_once('.') {
        Some((_, frac)) => frac.trim_end_matches('0').len(),
        None => 0,
    }
}

/* ===================== Index Rendering ===================== */

/// Visible rows after truncation; `None` marks the `...` gap
fn visible_rows(len: usize) -> Vec<Option<usize>> {
    if len <= MAX_ROWS {
        return (0..len).map(Some).collect();
    }
    let mut rows: Vec<Option<usize>> = (0..EDGE_ROWS).map(Some).collect();
    rows.push(None);
    rows.extend((len - EDGE_ROWS..len).map(Some));
    rows
}

/// One text column per index level, with repeated outer labels blanked
fn index_columns(index: &[Cell], names: &[String], rows: &[Option<usize>]) -> Vec<Vec<String>> {
    let levels = names.len().max(1);
    let mut columns = vec![Vec::with_capacity(rows.len()); levels];
    let mut previous: Option<&Cell> = None;

    for row in rows {
        let Some(pos) = row else {
            for column in columns.iter_mut() {
                column.push("...".to_string());
            }
            previous = None;
            continue;
        };
        let label = &index[*pos];
        match label {
            Cell::Tuple(parts) if levels > 1 => {
                let prev_parts = match previous {
                    Some(Cell::Tuple(p)) => Some(p),
                    _ => None,
                };
                let mut same_prefix = true;
                for (level, column) in columns.iter_mut().enumerate() {
                    let part = parts.get(level).cloned().unwrap_or(Cell::Null);
                    let repeated = same_prefix
                        && level + 1 < levels
                        && prev_parts
                            .and_then(|p| p.get(level))
                            .map(|p| p.loose_eq(&part))
                            .unwrap_or(false);
                    same_prefix = repeated;
                    column.push(if repeated {
                        String::new()
                    } else {
                        label_text(&part)
                    });
                }
            }
            other => {
                for (level, column) in columns.iter_mut().enumerate() {
                    column.push(if level == 0 {
                        label_text(other)
                    } else {
                        String::new()
                    });
                }
            }
        }
        previous = Some(label);
    }
    columns
}

fn width_of(cells: &[String]) -> usize {
    cells.iter().map(|c| c.chars().count()).max().unwrap_or(0)
}

fn pad_left(text: &str, width: usize) -> String {
    format!("{:>width$}", text, width = width)
}

fn pad_right(text: &str, width: usize) -> String {
    format!("{:<width$}", text, width = width)
}

/* ===================== Series ===================== */

pub fn series_to_string(series: &Series) -> String {
    let dtype = series.dtype();
    let name_part = series
        .name
        .as_ref()
        .map(|n| format!("Name: {}, ", n))
        .unwrap_or_default();

    if series.is_empty() {
        return format!("Series([], {}dtype: {})", name_part, dtype.name());
    }

    let rows = visible_rows(series.len());
    let format = ColumnFormat::for_values(&series.values);
    let values: Vec<String> = rows
        .iter()
        .map(|row| match row {
            Some(pos) => format.text(&series.values[*pos]),
            None => "...".to_string(),
        })
        .collect();
    let index = index_columns(&series.index, &series.index_names, &rows);
    let index_widths: Vec<usize> = index
        .iter()
        .enumerate()
        .map(|(level, col)| {
            let header = series.index_names.get(level).map(|n| n.len()).unwrap_or(0);
            width_of(col).max(header)
        })
        .collect();
    let value_width = width_of(&values);

    let mut lines = Vec::with_capacity(rows.len() + 2);
    if !series.index_names.is_empty() {
        let header: Vec<String> = series
            .index_names
            .iter()
            .zip(&index_widths)
            .map(|(name, width)| pad_right(name, *width))
            .collect();
        lines.push(header.join("  ").trim_end().to_string());
    }
    for (i, value) in values.iter().enumerate() {
        let labels: Vec<String> = index
            .iter()
            .zip(&index_widths)
            .map(|(col, width)| pad_right(&col[i], *width))
            .collect();
        lines.push(format!(
            "{}    {}",
            labels.join("  "),
            pad_left(value, value_width)
        ));
    }

    let length_part = if series.len() > MAX_ROWS {
        format!("Length: {}, ", series.len())
    } else {
        String::new()
    };
    lines.push(format!("{}{}dtype: {}", name_part, length_part, dtype.name()));
    lines.join("\n")
}

/* ===================== DataFrame ===================== */

pub fn frame_to_string(frame: &DataFrame) -> String {
    if frame.is_empty() {
        let columns = frame.column_names().join(", ");
        let index: Vec<String> = frame.index.iter().map(label_text).collect();
        return format!(
            "Empty DataFrame\nColumns: [{}]\nIndex: [{}]",
            columns,
            index.join(", ")
        );
    }

    let rows = visible_rows(frame.len());
    let index = index_columns(&frame.index, &frame.index_names, &rows);
    let index_widths: Vec<usize> = index
        .iter()
        .enumerate()
        .map(|(level, col)| {
            let header = frame.index_names.get(level).map(|n| n.len()).unwrap_or(0);
            width_of(col).max(header)
        })
        .collect();

    let mut rendered: Vec<(String, Vec<String>, usize)> = Vec::with_capacity(frame.width());
    for column in &frame.columns {
        let format = ColumnFormat::for_values(&column.values);
        let cells: Vec<String> = rows
            .iter()
            .map(|row| match row {
                Some(pos) => format.text(&column.values[*pos]),
                None => "...".to_string(),
            })
            .collect();
        let width = width_of(&cells).max(column.name.chars().count());
        rendered.push((column.name.clone(), cells, width));
    }

    let index_block = index_widths.iter().sum::<usize>() + 2 * index_widths.len().saturating_sub(1);
    let mut lines = Vec::with_capacity(rows.len() + 3);

    let mut header = " ".repeat(index_block);
    for (name, _, width) in &rendered {
        header.push_str("  ");
        header.push_str(&pad_left(name, *width));
    }
    lines.push(header.trim_end().to_string());

    if !frame.index_names.is_empty() {
        let names: Vec<String> = frame
            .index_names
            .iter()
            .zip(&index_widths)
            .map(|(name, width)| pad_right(name, *width))
            .collect();
        lines.push(names.join("  ").trim_end().to_string());
    }

    for i in 0..rows.len() {
        let labels: Vec<String> = index
            .iter()
            .zip(&index_widths)
            .map(|(col, width)| pad_right(&col[i], *width))
            .collect();
        let mut line = labels.join("  ");
        for (_, cells, width) in &rendered {
            line.push_str("  ");
            line.push_str(&pad_left(&cells[i], *width));
        }
        lines.push(line);
    }

    if frame.len() > MAX_ROWS {
        lines.push(String::new());
        lines.push(format!("[{} rows x {} columns]", frame.len(), frame.width()));
    }
    lines.join("\n")
}

/// Markdown table of the frame (index first), used in prompts
pub fn frame_to_markdown(frame: &DataFrame) -> String {
    let formats: Vec<ColumnFormat> = frame
        .columns
        .iter()
        .map(|c| ColumnFormat::for_values(&c.values))
        .collect();

    let mut lines = Vec::with_capacity(frame.len() + 2);
    let mut header = String::from("|    |");
    let mut rule = String::from("|---:|");
    for column in &frame.columns {
        header.push_str(&format!(" {} |", column.name));
        rule.push_str(if Dtype::infer(&column.values) == Dtype::Object {
            ":---|"
        } else {
            "---:|"
        });
    }
    lines.push(header);
    lines.push(rule);

    for (row, label) in frame.index.iter().enumerate() {
        let mut line = format!("| {} |", label_text(label));
        for (column, format) in frame.columns.iter().zip(&formats) {
            line.push_str(&format!(" {} |", format.text(&column.values[row])));
        }
        lines.push(line);
    }
    lines.join("\n")
}
