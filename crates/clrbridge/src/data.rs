//! Tabular float64 values carried by the Vector and Matrix messages.
//!
//! Both may carry string labels so that row (and column) identifiers that are
//! not plain integers survive the round trip.

use serde::Serialize;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Vector {
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<Vec<String>>,
    values: Vec<f64>,
}

impl Vector {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            labels: None,
            values,
        }
    }

    /// Labelled vector. An empty label list means "no labels".
    pub fn with_labels(labels: Vec<String>, values: Vec<f64>) -> Result<Self> {
        if labels.is_empty() {
            return Ok(Self::new(values));
        }
        if labels.len() != values.len() {
            return Err(BridgeError::malformed(format!(
                "vector has {} labels for {} values",
                labels.len(),
                values.len()
            )));
        }
        Ok(Self {
            labels: Some(labels),
            values,
        })
    }

    pub fn labels(&self) -> Option<&[String]> {
        self.labels.as_deref()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Dense matrix stored column-major, as it travels on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    row_labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    col_labels: Option<Vec<String>>,
    data: Vec<f64>,
}

impl Matrix {
    /// `data` must hold `rows * cols` values in column-major order.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        let expected = rows
            .checked_mul(cols)
            .ok_or_else(|| BridgeError::malformed(format!("matrix {rows}x{cols} overflows")))?;
        if data.len() != expected {
            return Err(BridgeError::malformed(format!(
                "matrix {rows}x{cols} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            row_labels: None,
            col_labels: None,
            data,
        })
    }

    /// Build from row slices; every row must have the same width.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|r| r.len() != cols) {
            return Err(BridgeError::malformed(format!(
                "row {bad} has {} columns, expected {cols}",
                rows[bad].len()
            )));
        }

        let mut data = Vec::with_capacity(rows.len() * cols);
        for c in 0..cols {
            data.extend(rows.iter().map(|r| r[c]));
        }
        Self::new(rows.len(), cols, data)
    }

    pub fn with_row_labels(mut self, labels: Vec<String>) -> Result<Self> {
        self.row_labels = check_labels("row", labels, self.rows)?;
        Ok(self)
    }

    pub fn with_col_labels(mut self, labels: Vec<String>) -> Result<Self> {
        self.col_labels = check_labels("column", labels, self.cols)?;
        Ok(self)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row_labels(&self) -> Option<&[String]> {
        self.row_labels.as_deref()
    }

    pub fn col_labels(&self) -> Option<&[String]> {
        self.col_labels.as_deref()
    }

    /// Column-major backing data.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.data.get(col * self.rows + row).copied()
    }

    pub fn column(&self, col: usize) -> Option<&[f64]> {
        if col >= self.cols {
            return None;
        }
        let start = col * self.rows;
        Some(&self.data[start..start + self.rows])
    }

    /// Single-column matrices travel as vectors, keeping their row labels.
    pub fn as_column_vector(&self) -> Option<Vector> {
        if self.cols != 1 {
            return None;
        }
        Some(Vector {
            labels: self.row_labels.clone(),
            values: self.data.clone(),
        })
    }
}

fn check_labels(axis: &str, labels: Vec<String>, expected: usize) -> Result<Option<Vec<String>>> {
    if labels.is_empty() {
        return Ok(None);
    }
    if labels.len() != expected {
        return Err(BridgeError::malformed(format!(
            "{} {axis} labels for {expected} {axis}s",
            labels.len()
        )));
    }
    Ok(Some(labels))
}
