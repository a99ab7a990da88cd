use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Column labels whose cells carry particle ids (a single id or a list).
pub const ID_LABELS: [&str; 7] = ["id", "id_i", "id_j", "id_k", "id_l", "selection", "ids"];

pub fn is_id_label(label: &str) -> bool {
    ID_LABELS.contains(&label)
}

/// Adds `offset` to every integer found in `value` (recursing into lists).
pub fn shift_ids_in(value: &mut Value, offset: i64) {
    match value {
        Value::Number(n) => {
            if let Some(id) = n.as_i64() {
                *value = Value::from(id + offset);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| shift_ids_in(v, offset)),
        _ => {}
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("Row has {found} cells but the table has {expected} labels")]
    RowLength { expected: usize, found: usize },

    #[error("Column '{0}' is missing and has no fill value")]
    MissingColumn(String),

    #[error("Duplicate column label '{0}'")]
    DuplicateLabel(String),
}

/// A labelled table of per-row values, the `{labels, data}` shape used for
/// particle state, structure and the tabular parts of engine-input entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    pub labels: Vec<String>,
    pub data: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(labels: &[&str]) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            data: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn has_column(&self, label: &str) -> bool {
        self.column_index(label).is_some()
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.labels.len() {
            return Err(TableError::RowLength {
                expected: self.labels.len(),
                found: row.len(),
            });
        }
        self.data.push(row);
        Ok(())
    }

    pub fn cell(&self, row: usize, label: &str) -> Option<&Value> {
        let col = self.column_index(label)?;
        self.data.get(row)?.get(col)
    }

    pub fn cell_mut(&mut self, row: usize, label: &str) -> Option<&mut Value> {
        let col = self.column_index(label)?;
        self.data.get_mut(row)?.get_mut(col)
    }

    pub fn column<'a>(&'a self, label: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let col = self.column_index(label)?;
        Some(self.data.iter().filter_map(move |row| row.get(col)))
    }

    /// Shifts every particle id in id-bearing columns by `offset`.
    pub fn shift_ids(&mut self, offset: i64) {
        let id_columns: Vec<usize> = self
            .labels
            .iter()
            .enumerate()
            .filter(|(_, l)| is_id_label(l))
            .map(|(i, _)| i)
            .collect();
        for row in &mut self.data {
            for &col in &id_columns {
                if let Some(cell) = row.get_mut(col) {
                    shift_ids_in(cell, offset);
                }
            }
        }
    }

    /// Returns a copy with an `id` column prepended holding `first_id + row`.
    pub fn with_id_column(&self, first_id: usize) -> Table {
        let mut labels = Vec::with_capacity(self.labels.len() + 1);
        labels.push("id".to_string());
        labels.extend(self.labels.iter().cloned());
        let data = self
            .data
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mut out = Vec::with_capacity(row.len() + 1);
                out.push(Value::from(first_id + i));
                out.extend(row.iter().cloned());
                out
            })
            .collect();
        Table { labels, data }
    }

    /// Returns a copy with a column of a constant value appended.
    pub fn with_constant_column(&self, label: &str, value: Value) -> Result<Table, TableError> {
        if self.has_column(label) {
            return Err(TableError::DuplicateLabel(label.to_string()));
        }
        let mut out = self.clone();
        out.labels.push(label.to_string());
        for row in &mut out.data {
            row.push(value.clone());
        }
        Ok(out)
    }

    /// Appends another table's rows, taking the union of both label sets.
    ///
    /// Labels keep their first-seen order. Cells missing on either side are
    /// filled from `fill`; a missing column without a fill value fails.
    pub fn append(&mut self, other: &Table, fill: impl Fn(&str) -> Option<Value>) -> Result<(), TableError> {
        if self.labels.is_empty() && self.data.is_empty() {
            *self = other.clone();
            return Ok(());
        }

        let new_labels: Vec<String> = other
            .labels
            .iter()
            .filter(|l| !self.labels.contains(l))
            .cloned()
            .collect();
        for label in &new_labels {
            let value = fill(label).ok_or_else(|| TableError::MissingColumn(label.clone()))?;
            for row in &mut self.data {
                row.push(value.clone());
            }
            self.labels.push(label.clone());
        }

        let mapping: Vec<Option<usize>> = self.labels.iter().map(|l| other.column_index(l)).collect();
        let fills: Vec<Option<Value>> = self
            .labels
            .iter()
            .zip(&mapping)
            .map(|(label, m)| match m {
                Some(_) => Ok(None),
                None => fill(label)
                    .map(Some)
                    .ok_or_else(|| TableError::MissingColumn(label.clone())),
            })
            .collect::<Result<_, _>>()?;

        for row in &other.data {
            let merged = mapping
                .iter()
                .zip(&fills)
                .map(|(m, f)| match (m, f) {
                    (Some(col), _) => row.get(*col).cloned().unwrap_or(Value::Null),
                    (None, Some(v)) => v.clone(),
                    (None, None) => Value::Null,
                })
                .collect();
            self.data.push(merged);
        }
        Ok(())
    }
}
