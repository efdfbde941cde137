//! Columnar tables
//!
//! `DataFrame` and `Series` are the in-memory representation of the activity
//! dataset. The dataset layer builds them, the sandbox interpreter operates on
//! private copies of them, and `format` renders them the way pandas prints.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::cmp::Ordering;

pub mod format;

#[cfg(test)]
mod tests;

/* ===================== Errors ===================== */

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableError {
    #[error("column '{column}' has {found} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("{0}")]
    MissingColumn(String),
}

/* ===================== Cells ===================== */

/// A single table value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Time(NaiveDateTime),
    Date(NaiveDate),
    /// Duration in seconds
    Delta(i64),
    /// Multi-level index label
    Tuple(Vec<Cell>),
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Float(x) => x.is_nan(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Cell::Int(n) => Some(*n as f64),
            Cell::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Cell::Int(_) | Cell::Float(_) | Cell::Bool(_))
    }

    /// Equality used by masks, `isin` and grouping (1 == 1.0, NaN != NaN)
    pub fn loose_eq(&self, other: &Cell) -> bool {
        match (self, other) {
            (Cell::Null, Cell::Null) => false,
            (Cell::Str(a), Cell::Str(b)) => a == b,
            (Cell::Time(a), Cell::Str(b)) | (Cell::Str(b), Cell::Time(a)) => {
                parse_datetime(b).map(|t| t == *a).unwrap_or(false)
            }
            (Cell::Tuple(a), Cell::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (a, b) if a.is_numeric() && b.is_numeric() => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
            (a, b) => a == b,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Bool(_) | Cell::Int(_) | Cell::Float(_) => 0,
            Cell::Str(_) => 1,
            Cell::Time(_) | Cell::Date(_) => 2,
            Cell::Delta(_) => 3,
            Cell::Tuple(_) => 4,
            Cell::Null => 5,
        }
    }

    /// Total order for sorting; missing values compare greater than everything
    pub fn sort_cmp(&self, other: &Cell) -> Ordering {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }
        match (self, other) {
            (Cell::Str(a), Cell::Str(b)) => a.cmp(b),
            (Cell::Time(a), Cell::Time(b)) => a.cmp(b),
            (Cell::Date(a), Cell::Date(b)) => a.cmp(b),
            (Cell::Time(a), Cell::Date(b)) => a.cmp(&midnight(*b)),
            (Cell::Date(a), Cell::Time(b)) => midnight(*a).cmp(b),
            (Cell::Delta(a), Cell::Delta(b)) => a.cmp(b),
            (Cell::Tuple(a), Cell::Tuple(b)) => {
                for (x, y) in a.iter().zip(b) {
                    let ord = x.sort_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let x = a.as_f64().unwrap_or(f64::NAN);
                let y = b.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::default())
}

/// Parse the timestamp spellings found in activity exports and pandas output
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = chrono::DateTime::parse_from_str(text, fmt) {
            return Some(dt.naive_utc());
        }
    }
    let trimmed = text.trim_end_matches('Z');
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(midnight(date));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d") {
        return Some(midnight(date));
    }
    None
}

/* ===================== Dtypes ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    Int64,
    Float64,
    Bool,
    Object,
    Datetime,
    Timedelta,
}

impl Dtype {
    pub fn name(&self) -> &'static str {
        match self {
            Dtype::Int64 => "int64",
            Dtype::Float64 => "float64",
            Dtype::Bool => "bool",
            Dtype::Object => "object",
            Dtype::Datetime => "datetime64[ns]",
            Dtype::Timedelta => "timedelta64[ns]",
        }
    }

    pub fn infer(values: &[Cell]) -> Dtype {
        let mut ints = 0;
        let mut floats = 0;
        let mut bools = 0;
        let mut times = 0;
        let mut deltas = 0;
        let mut others = 0;
        let mut nulls = 0;

        for value in values {
            match value {
                Cell::Null => nulls += 1,
                Cell::Int(_) => ints += 1,
                Cell::Float(_) => floats += 1,
                Cell::Bool(_) => bools += 1,
                Cell::Time(_) => times += 1,
                Cell::Delta(_) => deltas += 1,
                _ => others += 1,
            }
        }

        let present = ints + floats + bools + times + deltas + others;
        if others > 0 {
            return Dtype::Object;
        }
        if present == 0 {
            return if nulls == 0 { Dtype::Object } else { Dtype::Float64 };
        }
        if times == present {
            return Dtype::Datetime;
        }
        if deltas == present {
            return Dtype::Timedelta;
        }
        if bools == present && nulls == 0 {
            return Dtype::Bool;
        }
        if bools > 0 || times > 0 || deltas > 0 {
            return Dtype::Object;
        }
        if floats == 0 && nulls == 0 {
            Dtype::Int64
        } else {
            Dtype::Float64
        }
    }
}

/* ===================== Series ===================== */

/// One labelled column of values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    pub name: Option<String>,
    pub values: Vec<Cell>,
    pub index: Vec<Cell>,
    /// Names of the index levels (empty for an unnamed index)
    pub index_names: Vec<String>,
}

pub fn range_index(len: usize) -> Vec<Cell> {
    (0..len as i64).map(Cell::Int).collect()
}

impl Series {
    pub fn new(name: Option<String>, values: Vec<Cell>) -> Self {
        let index = range_index(values.len());
        Series {
            name,
            values,
            index,
            index_names: Vec::new(),
        }
    }

    pub fn with_index(
        name: Option<String>,
        values: Vec<Cell>,
        index: Vec<Cell>,
        index_names: Vec<String>,
    ) -> Self {
        Series {
            name,
            values,
            index,
            index_names,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn dtype(&self) -> Dtype {
        Dtype::infer(&self.values)
    }

    /// Same labels, new values
    pub fn map_values(&self, values: Vec<Cell>) -> Series {
        Series {
            name: self.name.clone(),
            values,
            index: self.index.clone(),
            index_names: self.index_names.clone(),
        }
    }

    pub fn take(&self, rows: &[usize]) -> Series {
        Series {
            name: self.name.clone(),
            values: rows.iter().map(|&i| self.values[i].clone()).collect(),
            index: rows.iter().map(|&i| self.index[i].clone()).collect(),
            index_names: self.index_names.clone(),
        }
    }

    /// Position of the first index entry equal to `label`
    pub fn position_of(&self, label: &Cell) -> Option<usize> {
        self.index.iter().position(|l| l.loose_eq(label))
    }

    /// Non-missing numeric values
    pub fn numbers(&self) -> Vec<f64> {
        self.values
            .iter()
            .filter(|c| !c.is_missing())
            .filter_map(Cell::as_f64)
            .collect()
    }
}

/* ===================== DataFrame ===================== */

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Column {
    pub name: String,
    pub values: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Cell>) -> Self {
        Column {
            name: name.into(),
            values,
        }
    }
}

/// Two-dimensional table with a row index
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataFrame {
    pub columns: Vec<Column>,
    pub index: Vec<Cell>,
    pub index_names: Vec<String>,
}

impl DataFrame {
    /// Build a frame with a default 0..n index; all columns must agree in length
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let len = columns.first().map(|c| c.values.len()).unwrap_or(0);
        Self::with_index(columns, range_index(len), Vec::new())
    }

    pub fn with_index(
        columns: Vec<Column>,
        index: Vec<Cell>,
        index_names: Vec<String>,
    ) -> Result<Self, TableError> {
        for column in &columns {
            if column.values.len() != index.len() {
                return Err(TableError::LengthMismatch {
                    column: column.name.clone(),
                    expected: index.len(),
                    found: column.values.len(),
                });
            }
        }
        Ok(DataFrame {
            columns,
            index,
            index_names,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.columns.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn series(&self, name: &str) -> Result<Series, TableError> {
        let column = self
            .column(name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))?;
        Ok(Series::with_index(
            Some(column.name.clone()),
            column.values.clone(),
            self.index.clone(),
            self.index_names.clone(),
        ))
    }

    /// Row `pos` as a Series indexed by column name
    pub fn row(&self, pos: usize) -> Series {
        let values = self.columns.iter().map(|c| c.values[pos].clone()).collect();
        let index = self
            .columns
            .iter()
            .map(|c| Cell::Str(c.name.clone()))
            .collect();
        let name = format::label_text(&self.index[pos]);
        Series::with_index(Some(name), values, index, Vec::new())
    }

    pub fn take(&self, rows: &[usize]) -> DataFrame {
        DataFrame {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), rows.iter().map(|&i| c.values[i].clone()).collect()))
                .collect(),
            index: rows.iter().map(|&i| self.index[i].clone()).collect(),
            index_names: self.index_names.clone(),
        }
    }

    pub fn select(&self, names: &[String]) -> Result<DataFrame, TableError> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let column = self
                .column(name)
                .ok_or_else(|| TableError::MissingColumn(name.clone()))?;
            columns.push(column.clone());
        }
        Ok(DataFrame {
            columns,
            index: self.index.clone(),
            index_names: self.index_names.clone(),
        })
    }

    /// Replace or append a column
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) -> Result<(), TableError> {
        if values.len() != self.len() && !(self.columns.is_empty() && self.index.is_empty()) {
            return Err(TableError::LengthMismatch {
                column: name.to_string(),
                expected: self.len(),
                found: values.len(),
            });
        }
        if self.columns.is_empty() && self.index.is_empty() {
            self.index = range_index(values.len());
        }
        match self.column_position(name) {
            Some(pos) => self.columns[pos].values = values,
            None => self.columns.push(Column::new(name, values)),
        }
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> bool {
        match self.column_position(name) {
            Some(pos) => {
                self.columns.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Move the index into leading columns (or discard it) and renumber rows
    pub fn reset_index(&self, drop: bool) -> DataFrame {
        let mut columns = Vec::new();
        if !drop {
            let levels = self.index_names.len().max(1);
            for level in 0..levels {
                let name = self
                    .index_names
                    .get(level)
                    .cloned()
                    .unwrap_or_else(|| "index".to_string());
                let values = self
                    .index
                    .iter()
                    .map(|label| match label {
                        Cell::Tuple(parts) if levels > 1 => {
                            parts.get(level).cloned().unwrap_or(Cell::Null)
                        }
                        other => other.clone(),
                    })
                    .collect();
                columns.push(Column::new(name, values));
            }
        }
        columns.extend(self.columns.iter().cloned());
        DataFrame {
            columns,
            index: range_index(self.len()),
            index_names: Vec::new(),
        }
    }

    /// Row order that sorts by the given (column position, ascending) keys
    pub fn sort_order(&self, keys: &[(usize, bool)]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            for &(col, ascending) in keys {
                let x = &self.columns[col].values[a];
                let y = &self.columns[col].values[b];
                let ord = match (x.is_missing(), y.is_missing()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    _ if ascending => x.sort_cmp(y),
                    _ => y.sort_cmp(x),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        order
    }
}

/* ===================== Grouping ===================== */

/// Group row positions by key; keys are sorted and missing keys dropped
pub fn group_rows(keys: &[&[Cell]], len: usize) -> Vec<(Cell, Vec<usize>)> {
    let key_of = |row: usize| -> Cell {
        if keys.len() == 1 {
            keys[0][row].clone()
        } else {
            Cell::Tuple(keys.iter().map(|k| k[row].clone()).collect())
        }
    };
    let has_missing = |row: usize| keys.iter().any(|k| k[row].is_missing());

    let mut rows: Vec<usize> = (0..len).filter(|&r| !has_missing(r)).collect();
    rows.sort_by(|&a, &b| key_of(a).sort_cmp(&key_of(b)).then(a.cmp(&b)));

    let mut groups: Vec<(Cell, Vec<usize>)> = Vec::new();
    for row in rows {
        let key = key_of(row);
        match groups.last_mut() {
            Some((last, members)) if last.sort_cmp(&key) == Ordering::Equal => members.push(row),
            _ => groups.push((key, vec![row])),
        }
    }
    groups
}
