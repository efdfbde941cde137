//! `.loc` / `.iloc` selection and assignment, plus `.str[...]`

use super::{broadcast, cells_of, is_list_like, mask_positions, table_result};
use crate::sandbox::interpreter::Interpreter;
use crate::sandbox::stdlib::builtins::normalize_index;
use crate::sandbox::types::{raise, Accessor, AccessorKind, EvalResult, ExcKind, Exception, SliceVal, Val};
use crate::table::format::label_text;
use crate::table::{parse_datetime, Cell, Column, DataFrame, Series};
use chrono::{NaiveDate, NaiveDateTime};
use std::rc::Rc;

/// Rows or columns picked by a selector
#[derive(Debug, Clone, PartialEq)]
enum Pick {
    One(usize),
    Many(Vec<usize>),
}

impl Pick {
    fn positions(&self) -> Vec<usize> {
        match self {
            Pick::One(pos) => vec![*pos],
            Pick::Many(positions) => positions.clone(),
        }
    }
}

/* ===================== Label Slices ===================== */

/// Inclusive label range `[lower, upper]`; string bounds on a datetime index
/// cover the whole period they name (`'2024-05'` spans May)
pub fn label_slice(labels: &[Cell], slice: &SliceVal) -> EvalResult<Vec<usize>> {
    let lower = bound(labels, &slice.lower, false)?;
    let upper = bound(labels, &slice.upper, true)?;
    let step = match slice.step.as_i64() {
        Some(step) if step != 0 => step,
        Some(_) => return raise(ExcKind::ValueError, "slice step cannot be zero"),
        None => 1,
    };

    // positional ends for a sorted index; labels outside are skipped
    let start = match &lower {
        Some(lo) => labels.iter().position(|l| !l.is_missing() && l.sort_cmp(lo).is_ge()),
        None => Some(0),
    };
    let end = match &upper {
        Some(hi) => labels.iter().rposition(|l| !l.is_missing() && l.sort_cmp(hi).is_le()),
        None => labels.len().checked_sub(1),
    };
    let (Some(start), Some(end)) = (start, end) else {
        return Ok(Vec::new());
    };
    if start > end {
        return Ok(Vec::new());
    }
    let mut out: Vec<usize> = (start..=end).collect();
    if step < 0 {
        out.reverse();
    }
    Ok(out.into_iter().step_by(step.unsigned_abs() as usize).collect())
}

fn bound(labels: &[Cell], value: &Val, upper: bool) -> EvalResult<Option<Cell>> {
    if value.is_none() {
        return Ok(None);
    }
    let datetime_index = labels.iter().any(|l| matches!(l, Cell::Time(_)));
    match value {
        Val::Str(text) if datetime_index => match period_bounds(text) {
            Some((start, end)) => Ok(Some(Cell::Time(if upper { end } else { start }))),
            None => raise(ExcKind::KeyError, format!("'{}'", text)),
        },
        other => Ok(Some(other.expect_cell()?)),
    }
}

/// First and last instant of a partial date string (`2024`, `2024-05`,
/// `2024-05-13`, or a full timestamp)
pub fn period_bounds(text: &str) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let text = text.trim();
    let day_end = |d: NaiveDate| d.and_hms_opt(23, 59, 59);
    let parts: Vec<&str> = text.split('-').collect();
    match parts.as_slice() {
        [year] if year.len() == 4 => {
            let year: i32 = year.parse().ok()?;
            let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
            let end = NaiveDate::from_ymd_opt(year, 12, 31)?;
            Some((start.and_hms_opt(0, 0, 0)?, day_end(end)?))
        }
        [year, month] if year.len() == 4 => {
            let (year, month): (i32, u32) = (year.parse().ok()?, month.parse().ok()?);
            let start = NaiveDate::from_ymd_opt(year, month, 1)?;
            let next = if month == 12 {
                NaiveDate::from_ymd_opt(year + 1, 1, 1)?
            } else {
                NaiveDate::from_ymd_opt(year, month + 1, 1)?
            };
            Some((start.and_hms_opt(0, 0, 0)?, day_end(next.pred_opt()?)?))
        }
        _ if text.len() <= 10 => {
            let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
            Some((date.and_hms_opt(0, 0, 0)?, day_end(date)?))
        }
        _ => parse_datetime(text).map(|t| (t, t)),
    }
}

/* ===================== Selector Resolution ===================== */

fn split_key(index: &Val) -> (Val, Option<Val>) {
    match index {
        Val::Tuple(items) if items.len() == 2 => (items[0].clone(), Some(items[1].clone())),
        other => (other.clone(), None),
    }
}

fn position(len: usize, key: &Val) -> EvalResult<usize> {
    match key.as_i64() {
        Some(n) if !matches!(key, Val::Float(_)) => match normalize_index(n, len) {
            Some(pos) => Ok(pos),
            None => raise(ExcKind::IndexError, "single positional indexer is out-of-bounds"),
        },
        _ => raise(
            ExcKind::TypeError,
            format!("Cannot index by location index with a non-integer key ({})", key.repr()),
        ),
    }
}

fn label_position(labels: &[Cell], key: &Val) -> EvalResult<usize> {
    let cell = key.expect_cell()?;
    labels
        .iter()
        .position(|l| l == &cell || l.loose_eq(&cell))
        .ok_or_else(|| Exception::new(ExcKind::KeyError, key.repr()).into())
}

fn resolve(labels: &[Cell], selector: &Val, positional: bool) -> EvalResult<Pick> {
    if let Some(rows) = mask_positions(selector, labels.len())? {
        return Ok(Pick::Many(rows));
    }
    match selector {
        Val::Slice(slice) if positional => Ok(Pick::Many(slice.indices(labels.len())?)),
        Val::Slice(slice) => Ok(Pick::Many(label_slice(labels, slice)?)),
        list if is_list_like(list) => {
            let mut out = Vec::new();
            for key in cells_of(list)? {
                let key = Val::from_cell(&key);
                out.push(if positional {
                    position(labels.len(), &key)?
                } else {
                    label_position(labels, &key)?
                });
            }
            Ok(Pick::Many(out))
        }
        key if positional => Ok(Pick::One(position(labels.len(), key)?)),
        Val::Str(text) if labels.iter().any(|l| matches!(l, Cell::Time(_))) => {
            let exact = parse_datetime(text).map(Cell::Time);
            if let Some(pos) = exact.and_then(|cell| labels.iter().position(|l| l == &cell)) {
                if text.len() > 10 {
                    return Ok(Pick::One(pos));
                }
            }
            let slice = SliceVal {
                lower: selector.clone(),
                upper: selector.clone(),
                step: Val::None,
            };
            Ok(Pick::Many(label_slice(labels, &slice)?))
        }
        key => Ok(Pick::One(label_position(labels, key)?)),
    }
}

fn column_labels(frame: &DataFrame) -> Vec<Cell> {
    frame.columns.iter().map(|c| Cell::Str(c.name.clone())).collect()
}

/* ===================== Reads ===================== */

pub fn get_located(accessor: &Rc<Accessor>, index: &Val) -> EvalResult<Val> {
    let positional = match accessor.kind {
        AccessorKind::Loc => false,
        AccessorKind::Iloc => true,
        AccessorKind::Str => return string_elements(&accessor.target, index),
        _ => return raise(ExcKind::TypeError, "'accessor' object is not subscriptable"),
    };
    match &accessor.target {
        Val::Frame(frame) => frame_located(frame, index, positional),
        Val::Series(series) => {
            let pick = resolve(&series.index, index, positional)?;
            Ok(match pick {
                Pick::One(pos) => Val::from_cell(&series.values[pos]),
                Pick::Many(rows) => Val::series(series.take(&rows)),
            })
        }
        other => raise(
            ExcKind::TypeError,
            format!("'{}' object is not subscriptable", other.type_name()),
        ),
    }
}

fn frame_located(frame: &DataFrame, index: &Val, positional: bool) -> EvalResult<Val> {
    let (row_key, column_key) = split_key(index);
    let rows = resolve(&frame.index, &row_key, positional)?;
    let columns = match &column_key {
        Some(key) => resolve(&column_labels(frame), key, positional)?,
        None => Pick::Many((0..frame.width()).collect()),
    };
    match (rows, columns) {
        (Pick::One(row), Pick::One(col)) => Ok(Val::from_cell(&frame.columns[col].values[row])),
        (Pick::One(row), Pick::Many(cols)) => {
            let values = cols.iter().map(|&c| frame.columns[c].values[row].clone()).collect();
            let index = cols.iter().map(|&c| Cell::Str(frame.columns[c].name.clone())).collect();
            Ok(Val::series(Series::with_index(
                Some(label_text(&frame.index[row])),
                values,
                index,
                Vec::new(),
            )))
        }
        (Pick::Many(rows), Pick::One(col)) => {
            let column = &frame.columns[col];
            Ok(Val::series(Series::with_index(
                Some(column.name.clone()),
                rows.iter().map(|&r| column.values[r].clone()).collect(),
                rows.iter().map(|&r| frame.index[r].clone()).collect(),
                frame.index_names.clone(),
            )))
        }
        (Pick::Many(rows), Pick::Many(cols)) => {
            let names: Vec<String> = cols.iter().map(|&c| frame.columns[c].name.clone()).collect();
            Ok(Val::frame(table_result(frame.select(&names))?.take(&rows)))
        }
    }
}

/// `s.str[0]`, `s.str[:3]`
fn string_elements(target: &Val, index: &Val) -> EvalResult<Val> {
    let Val::Series(series) = target else {
        return raise(ExcKind::TypeError, "'accessor' object is not subscriptable");
    };
    let mut values = Vec::with_capacity(series.len());
    for cell in &series.values {
        let chars: Vec<char> = match cell {
            Cell::Str(s) => s.chars().collect(),
            _ => {
                values.push(Cell::Null);
                continue;
            }
        };
        values.push(match index {
            Val::Slice(slice) => {
                Cell::Str(slice.indices(chars.len())?.into_iter().map(|i| chars[i]).collect())
            }
            key => match key.as_i64().and_then(|n| normalize_index(n, chars.len())) {
                Some(pos) => Cell::Str(chars[pos].to_string()),
                None => Cell::Null,
            },
        });
    }
    Ok(Val::series(series.map_values(values)))
}

/* ===================== Writes ===================== */

/// `df.loc[rows, cols] = value` on the bound variable `container`
pub fn set_located(
    interp: &mut Interpreter,
    container: &mut Val,
    positional: bool,
    index: Val,
    value: Val,
) -> EvalResult<()> {
    match container {
        Val::Frame(frame) => set_frame(interp, Rc::make_mut(frame), positional, &index, &value),
        Val::Series(series) => {
            let series = Rc::make_mut(series);
            let pick = match resolve(&series.index, &index, positional) {
                Ok(pick) => pick,
                Err(_) if !positional && !is_list_like(&index) => {
                    series.index.push(index.expect_cell()?);
                    series.values.push(Cell::Null);
                    Pick::One(series.len() - 1)
                }
                Err(err) => return Err(err),
            };
            let rows = pick.positions();
            let fill = fill_values(&value, rows.len())?;
            for (row, cell) in rows.into_iter().zip(fill) {
                series.values[row] = cell;
            }
            Ok(())
        }
        other => raise(
            ExcKind::TypeError,
            format!("'{}' object does not support item assignment", other.type_name()),
        ),
    }
}

fn set_frame(
    interp: &mut Interpreter,
    frame: &mut DataFrame,
    positional: bool,
    index: &Val,
    value: &Val,
) -> EvalResult<()> {
    let (row_key, column_key) = split_key(index);

    // `df.loc[:, 'new'] = ...` and `df.loc[mask, 'new'] = ...` create the column
    if let (false, Some(Val::Str(name))) = (positional, &column_key) {
        if frame.column(name).is_none() {
            let empty = vec![Cell::Null; frame.len()];
            table_result(frame.set_column(name, empty))?;
        }
    }

    let rows = match resolve(&frame.index, &row_key, positional) {
        Ok(pick) => pick.positions(),
        // `df.loc[new_label] = [...]` appends a row
        Err(_) if !positional && !is_list_like(&row_key) && !matches!(row_key, Val::Slice(_)) => {
            interp.check_len(frame.len() + 1)?;
            frame.index.push(row_key.expect_cell()?);
            for column in &mut frame.columns {
                column.values.push(Cell::Null);
            }
            vec![frame.len() - 1]
        }
        Err(err) => return Err(err),
    };
    let columns = match &column_key {
        Some(key) => resolve(&column_labels(frame), key, positional)?.positions(),
        None => (0..frame.width()).collect(),
    };

    match value {
        // a frame assigns column by column
        Val::Frame(source) => {
            for (i, &col) in columns.iter().enumerate() {
                let name = &frame.columns[col].name;
                let values = source
                    .column(name)
                    .or_else(|| source.columns.get(i))
                    .map(|c: &Column| c.values.clone())
                    .unwrap_or_default();
                for (k, &row) in rows.iter().enumerate() {
                    frame.columns[col].values[row] = values.get(k).cloned().unwrap_or(Cell::Null);
                }
            }
        }
        // one row, several columns: values spread across the columns
        _ if rows.len() == 1 && columns.len() > 1 && is_list_like(value) => {
            let cells = fill_values(value, columns.len())?;
            for (&col, cell) in columns.iter().zip(cells) {
                frame.columns[col].values[rows[0]] = cell;
            }
        }
        // a series aligns on the row labels
        Val::Series(_) => {
            let aligned = broadcast(value, &frame.index)?;
            for &col in &columns {
                for &row in &rows {
                    frame.columns[col].values[row] = aligned[row].clone();
                }
            }
        }
        _ => {
            let cells = fill_values(value, rows.len())?;
            for &col in &columns {
                for (&row, cell) in rows.iter().zip(&cells) {
                    frame.columns[col].values[row] = cell.clone();
                }
            }
        }
    }
    Ok(())
}

fn fill_values(value: &Val, count: usize) -> EvalResult<Vec<Cell>> {
    if is_list_like(value) {
        let cells = cells_of(value)?;
        if cells.len() != count {
            return raise(
                ExcKind::ValueError,
                format!(
                    "Must have equal len keys and value when setting with an iterable ({} != {})",
                    cells.len(),
                    count
                ),
            );
        }
        return Ok(cells);
    }
    Ok(vec![value.expect_cell()?; count])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> Cell {
        Cell::Time(NaiveDate::from_ymd_opt(2024, 5, d).unwrap().and_hms_opt(7, 0, 0).unwrap())
    }

    #[test]
    fn test_label_slice_is_inclusive() {
        let labels: Vec<Cell> = ["a", "b", "c", "d"].iter().map(|s| Cell::Str(s.to_string())).collect();
        let slice = SliceVal {
            lower: Val::str("b"),
            upper: Val::str("c"),
            step: Val::None,
        };
        assert_eq!(label_slice(&labels, &slice).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_partial_date_string_covers_the_day() {
        let labels = vec![day(1), day(2), day(3)];
        let slice = SliceVal {
            lower: Val::str("2024-05-02"),
            upper: Val::str("2024-05-03"),
            step: Val::None,
        };
        assert_eq!(label_slice(&labels, &slice).unwrap(), vec![1, 2]);
        assert_eq!(
            resolve(&labels, &Val::str("2024-05"), false).unwrap(),
            Pick::Many(vec![0, 1, 2])
        );
    }

    #[test]
    fn test_period_bounds_month_end() {
        let (start, end) = period_bounds("2024-02").unwrap();
        assert_eq!(start.to_string(), "2024-02-01 00:00:00");
        assert_eq!(end.to_string(), "2024-02-29 23:59:59");
    }

    #[test]
    fn test_frame_located_scalar_and_row() {
        let frame = DataFrame::new(vec![
            Column::new("distance", vec![Cell::Float(5.0), Cell::Float(8.0)]),
            Column::new("type", vec![Cell::Str("Run".into()), Cell::Str("Ride".into())]),
        ])
        .unwrap();
        let key = Val::tuple(vec![Val::Int(1), Val::str("distance")]);
        match frame_located(&frame, &key, false).unwrap() {
            Val::Float(x) => assert_eq!(x, 8.0),
            other => panic!("Expected float, got {:?}", other),
        }
        match frame_located(&frame, &Val::Int(0), true).unwrap() {
            Val::Series(row) => assert_eq!(row.len(), 2),
            other => panic!("Expected Series, got {:?}", other),
        }
    }
}
