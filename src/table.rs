//! Minimal in-memory table used for terminology and coordinate batches.
//!
//! Cells are dynamically typed [`Value`]s so a table can hold whatever an
//! external tabular source produced (integers, floats, strings, nested
//! collections). JSON serialization uses the layout
//! `{"columns": [...], "rows": [[...], ...]}`.

use std::collections::HashSet;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::AnnotationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    /// Numeric view of the cell, if it has one.
    ///
    /// Integers beyond ±2^53 round to the nearest representable `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view of the cell; floats are accepted only when integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct RawTable {
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

impl TryFrom<RawTable> for Table {
    type Error = AnnotationError;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        let mut table = Table::new(raw.columns)?;
        for row in raw.rows {
            table.push_row(row)?;
        }
        Ok(table)
    }
}

impl Table {
    /// Create an empty table with the given column names.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotationError::Schema`] if a column name is repeated.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Result<Self, AnnotationError> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(AnnotationError::Schema(format!("duplicate column {name:?}")));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), AnnotationError> {
        if row.len() != self.columns.len() {
            return Err(AnnotationError::Schema(format!(
                "row {} has {} cells, expected {}",
                self.rows.len(),
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value> + use<'a>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[index]))
    }

    /// Names from `required` that this table lacks, sorted.
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        let mut missing: Vec<String> = required
            .iter()
            .filter(|name| self.column_index(name).is_none())
            .map(|name| name.to_string())
            .collect();
        missing.sort();
        missing
    }

    /// Replace the named column, or append it if it does not exist yet.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<(), AnnotationError> {
        if values.len() != self.rows.len() {
            return Err(AnnotationError::Schema(format!(
                "column {name:?} has {} values, table has {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        match self.column_index(name) {
            Some(index) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[index] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, AnnotationError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn to_json_writer<W: Write>(&self, writer: W) -> Result<(), AnnotationError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
