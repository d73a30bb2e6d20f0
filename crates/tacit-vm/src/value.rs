//! Runtime values: n-dimensional arrays of `f64`.

use std::fmt;

use serde::{Deserialize, Serialize};

use tacit_foundation::Constant;

use crate::error::ExecutionError;

/// A row-major array. Scalars have an empty shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Value {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, ExecutionError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ExecutionError::invalid(
                "array",
                format!("shape {shape:?} needs {expected} elements, got {}", data.len()),
            ));
        }
        Ok(Self { shape, data })
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    pub fn list(values: impl Into<Vec<f64>>) -> Self {
        let data = values.into();
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn from_constant(constant: &Constant) -> Self {
        match constant {
            Constant::Number(value) => Self::scalar(*value),
            Constant::List(values) => Self::list(values.clone()),
        }
    }

    /// Stack rows into one array. Rows must share a shape; no rows gives an
    /// empty list.
    pub fn from_rows(rows: Vec<Value>) -> Result<Self, ExecutionError> {
        let Some(first) = rows.first() else {
            return Ok(Self::list(Vec::new()));
        };
        let cell = first.shape.clone();
        let mut data = Vec::with_capacity(rows.len() * first.data.len());
        for row in &rows {
            if row.shape != cell {
                return Err(ExecutionError::ShapeMismatch {
                    operation: "rows",
                    left: cell,
                    right: row.shape.clone(),
                });
            }
            data.extend_from_slice(&row.data);
        }
        let mut shape = Vec::with_capacity(cell.len() + 1);
        shape.push(rows.len());
        shape.extend(cell);
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    pub fn as_scalar(&self) -> Option<f64> {
        if self.is_scalar() {
            self.data.first().copied()
        } else {
            None
        }
    }

    /// Length of the first axis; a scalar counts as one row.
    pub fn row_count(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    fn cell_shape(&self) -> &[usize] {
        self.shape.get(1..).unwrap_or(&[])
    }

    fn cell_len(&self) -> usize {
        self.cell_shape().iter().product()
    }

    /// Row `index` of the first axis. A scalar is its own only row.
    pub fn row(&self, index: usize) -> Value {
        if self.is_scalar() {
            return self.clone();
        }
        let len = self.cell_len();
        Value {
            shape: self.cell_shape().to_vec(),
            data: self.data[index * len..(index + 1) * len].to_vec(),
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.row_count()).map(move |index| self.row(index))
    }

    /// Same data, first axis reversed.
    pub fn reversed(&self) -> Value {
        if self.is_scalar() {
            return self.clone();
        }
        let len = self.cell_len();
        let data = if len == 0 {
            Vec::new()
        } else {
            self.data
                .chunks(len)
                .rev()
                .flat_map(|chunk| chunk.iter().copied())
                .collect()
        };
        Value {
            shape: self.shape.clone(),
            data,
        }
    }

    /// Split into lanes along the last axis.
    ///
    /// Returns the shape of the remaining axes and the lanes in row-major
    /// order. Fails for scalars.
    pub fn lanes(&self) -> Result<(Vec<usize>, Vec<&[f64]>), ExecutionError> {
        let Some((&last, outer)) = self.shape.split_last() else {
            return Err(ExecutionError::invalid("lanes", "expected an array, got a scalar"));
        };
        let count: usize = outer.iter().product();
        let lanes = (0..count)
            .map(|lane| &self.data[lane * last..(lane + 1) * last])
            .collect();
        Ok((outer.to_vec(), lanes))
    }

    /// Elementwise combination; a scalar on either side is broadcast.
    pub fn zip_with(
        &self,
        other: &Value,
        operation: &'static str,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Value, ExecutionError> {
        let (shape, data) = if self.shape == other.shape {
            (
                self.shape.clone(),
                self.data.iter().zip(&other.data).map(|(a, b)| f(*a, *b)).collect(),
            )
        } else if let Some(a) = self.as_scalar() {
            (other.shape.clone(), other.data.iter().map(|b| f(a, *b)).collect())
        } else if let Some(b) = other.as_scalar() {
            (self.shape.clone(), self.data.iter().map(|a| f(*a, b)).collect())
        } else {
            return Err(ExecutionError::ShapeMismatch {
                operation,
                left: self.shape.clone(),
                right: other.shape.clone(),
            });
        };
        Ok(Value { shape, data })
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Value {
        Value {
            shape: self.shape.clone(),
            data: self.data.iter().map(|x| f(*x)).collect(),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::scalar(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_scalar() {
            Some(value) => write!(f, "{value}"),
            None => write!(f, "{:?}{:?}", self.shape, self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_builds_matrix() {
        let matrix = Value::from_rows(vec![Value::list([1.0, 2.0]), Value::list([3.0, 4.0])]).unwrap();
        assert_eq!(matrix.shape(), &[2, 2]);
        assert_eq!(matrix.row(1), Value::list([3.0, 4.0]));
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        let err = Value::from_rows(vec![Value::list([1.0]), Value::list([1.0, 2.0])]).unwrap_err();
        assert!(matches!(err, ExecutionError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_lanes_split_last_axis() {
        let matrix = Value::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let (outer, lanes) = matrix.lanes().unwrap();
        assert_eq!(outer, vec![2]);
        assert_eq!(lanes, vec![&[1.0, 2.0, 3.0][..], &[4.0, 5.0, 6.0][..]]);
        assert!(Value::scalar(1.0).lanes().is_err());
    }

    #[test]
    fn test_reversed_flips_rows() {
        let matrix = Value::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(matrix.reversed().data(), &[3.0, 4.0, 1.0, 2.0]);
    }

    #[test]
    fn test_zip_broadcasts_scalars() {
        let sum = Value::list([1.0, 2.0])
            .zip_with(&Value::scalar(10.0), "add", |a, b| a + b)
            .unwrap();
        assert_eq!(sum, Value::list([11.0, 12.0]));
        assert!(
            Value::list([1.0])
                .zip_with(&Value::list([1.0, 2.0]), "add", |a, b| a + b)
                .is_err()
        );
    }
}
