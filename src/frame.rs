use serde::{Serialize, Serializer};
use serde_json::Map;
use std::collections::HashMap;

use crate::utils::{is_missing_token, parse_integer, parse_number, AnalysisError};

/// A single table cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Missing,
}

impl Value {
    /// Numeric view of the cell, `None` for text and missing values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(_) | Value::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Label used when the cell is matched against a category list
    ///
    /// Integral floats keep their decimal point (`1.0`, not `1`), so a
    /// float-typed category column matches categories stored as `"1.0"`
    /// while an integer column matches `"1"`.
    pub fn category_label(&self) -> Option<String> {
        match self {
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 => {
                Some(format!("{:.1}", v))
            }
            Value::Float(v) => Some(v.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Missing => None,
        }
    }

    fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Missing,
            serde_json::Value::Bool(b) => Value::Int(i64::from(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Missing),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Missing => serializer.serialize_none(),
        }
    }
}

/// A named column of cells
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

/// Column-oriented table handed to the feature pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Frame {
    /// Create an empty frame with a fixed number of rows
    pub fn new(n_rows: usize) -> Self {
        Self {
            columns: Vec::new(),
            n_rows,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Column names in table order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Like [`Frame::column`] but reports a schema error for absent columns
    pub fn require_column(&self, name: &str) -> Result<&Column, AnalysisError> {
        self.column(name)
            .ok_or_else(|| AnalysisError::SchemaError(format!("column '{}' not found", name)))
    }

    /// Append a column; its length must match the frame
    pub fn push_column(&mut self, column: Column) -> Result<(), AnalysisError> {
        if column.values.len() != self.n_rows {
            return Err(AnalysisError::SchemaError(format!(
                "column '{}' has {} values, frame has {} rows",
                column.name,
                column.values.len(),
                self.n_rows
            )));
        }
        if self.column(&column.name).is_some() {
            return Err(AnalysisError::SchemaError(format!(
                "duplicate column '{}'",
                column.name
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Remove a column, returning it if it was present
    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(idx))
    }

    /// Coerce a column to numbers; unparsable text becomes missing
    ///
    /// # Returns
    /// * `Some(count)` - number of cells that became missing
    /// * `None` - if the column is absent
    pub fn coerce_numeric(&mut self, name: &str) -> Option<usize> {
        let column = self.column_mut(name)?;
        let mut coerced = 0;
        for value in column.values.iter_mut() {
            if let Value::Text(raw) = value {
                *value = match parse_number(raw) {
                    Some(v) => Value::Float(v),
                    None => {
                        coerced += 1;
                        Value::Missing
                    }
                };
            }
        }
        Some(coerced)
    }

    /// Assemble a frame from JSON records
    ///
    /// Columns are the union of keys in first-seen order; keys absent
    /// from a record are missing values.
    pub fn from_records(records: &[Map<String, serde_json::Value>]) -> Self {
        let mut frame = Frame::new(records.len());
        let mut index: HashMap<String, usize> = HashMap::new();

        for (row, record) in records.iter().enumerate() {
            for (key, value) in record {
                let col_idx = *index.entry(key.clone()).or_insert_with(|| {
                    frame.columns.push(Column {
                        name: key.clone(),
                        values: vec![Value::Missing; row],
                    });
                    frame.columns.len() - 1
                });
                frame.columns[col_idx].values.push(Value::from_json(value));
            }
            for column in frame.columns.iter_mut() {
                if column.values.len() == row {
                    column.values.push(Value::Missing);
                }
            }
        }

        frame
    }

    /// Parse CSV bytes using the first row as column headers
    ///
    /// Each column is typed from its cells: all integers, all numbers,
    /// or text. Empty and NA-like cells are missing in every column type.
    pub fn from_csv(data: &[u8]) -> Result<Self, AnalysisError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(data);

        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Err(AnalysisError::CsvError("CSV has no header row".to_string()));
        }

        let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for result in reader.records() {
            let record = result?;
            for (i, field) in record.iter().enumerate() {
                raw[i].push(field.to_string());
            }
        }

        let n_rows = raw.first().map(|c| c.len()).unwrap_or(0);
        let mut frame = Frame::new(n_rows);
        for (name, cells) in headers.iter().zip(raw) {
            frame.push_column(Column {
                name: name.to_string(),
                values: infer_column(cells),
            })?;
        }

        Ok(frame)
    }
}

fn infer_column(cells: Vec<String>) -> Vec<Value> {
    let present = || cells.iter().filter(|c| !is_missing_token(c));

    if present().all(|c| parse_integer(c).is_some()) {
        return cells
            .iter()
            .map(|c| parse_integer(c).map(Value::Int).unwrap_or(Value::Missing))
            .collect();
    }

    if present().all(|c| parse_number(c).is_some()) {
        return cells
            .iter()
            .map(|c| parse_number(c).map(Value::Float).unwrap_or(Value::Missing))
            .collect();
    }

    cells
        .into_iter()
        .map(|c| {
            if is_missing_token(&c) {
                Value::Missing
            } else {
                Value::Text(c)
            }
        })
        .collect()
}
