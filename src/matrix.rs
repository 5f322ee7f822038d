use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Dense row-major `f64` matrix. `NaN` marks a missing cell.
#[derive(Debug, Clone, Default)]
pub struct Matrix {
    pub(crate) rows: usize,
    pub(crate) cols: usize,
    pub(crate) data: Vec<f64>,
}

impl Matrix {
    /// Build from row-major values. Returns `None` if `data.len() != rows * cols`.
    pub fn from_row_major(rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { rows, cols, data })
    }

    /// Build from equally long columns; `rows` is needed for the zero-column case.
    pub fn from_columns(rows: usize, columns: &[Vec<f64>]) -> Self {
        let cols = columns.len();
        let mut data = vec![f64::NAN; rows * cols];
        for (j, col) in columns.iter().enumerate() {
            debug_assert_eq!(col.len(), rows);
            for (i, v) in col.iter().enumerate() {
                data[i * cols + j] = *v;
            }
        }
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.rows && col < self.cols).then(|| self.data[row * self.cols + col])
    }

    pub fn row(&self, row: usize) -> Option<&[f64]> {
        (row < self.rows).then(|| &self.data[row * self.cols..(row + 1) * self.cols])
    }

    pub fn column(&self, col: usize) -> Option<Vec<f64>> {
        (col < self.cols).then(|| {
            (0..self.rows)
                .map(|i| self.data[i * self.cols + col])
                .collect()
        })
    }

    /// Largest non-NaN value in `col`; `None` if the column is out of range or all NaN.
    pub fn column_max(&self, col: usize) -> Option<f64> {
        if col >= self.cols {
            return None;
        }
        (0..self.rows)
            .map(|i| self.data[i * self.cols + col])
            .filter(|v| !v.is_nan())
            .reduce(f64::max)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// Matrices compare NaN == NaN, so a reloaded matrix equals the one stored.
impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape()
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| a == b || (a.is_nan() && b.is_nan()))
    }
}

/// Serialized form: shape plus flat values, NaN written as `null`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct MatrixPayload {
    pub shape: [usize; 2],
    pub values: Vec<Option<f64>>,
}

impl From<&Matrix> for MatrixPayload {
    fn from(m: &Matrix) -> Self {
        Self {
            shape: [m.rows, m.cols],
            values: m
                .data
                .iter()
                .map(|v| if v.is_nan() { None } else { Some(*v) })
                .collect(),
        }
    }
}

impl TryFrom<MatrixPayload> for Matrix {
    type Error = SessionError;

    fn try_from(p: MatrixPayload) -> Result<Self, Self::Error> {
        let [rows, cols] = p.shape;
        let len = p.values.len();
        let data = p.values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        Matrix::from_row_major(rows, cols, data)
            .ok_or(SessionError::ShapeMismatch { rows, cols, len })
    }
}
