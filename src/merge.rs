use tracing::info;

use crate::{error::MergeError, matrix::Matrix, process::LoadedTable, schema::Column};

/// Two loaded tables side by side: the left table's columns, then the right's.
#[derive(Debug, Clone)]
pub struct MergedTable {
    /// Column names are not de-duplicated.
    pub columns: Vec<Column>,
    pub matrix: Matrix,
    /// Number of columns that came from the left table.
    pub left_cols: usize,
}

impl MergedTable {
    pub fn shape(&self) -> (usize, usize) {
        self.matrix.shape()
    }
}

/// Concatenate two matrices column-wise. Row counts must match.
pub fn merge_matrices(left: &Matrix, right: &Matrix) -> Result<Matrix, MergeError> {
    if left.rows() != right.rows() {
        return Err(MergeError::RowMismatch {
            left: left.rows(),
            right: right.rows(),
        });
    }

    let rows = left.rows();
    let cols = left.cols() + right.cols();
    let mut data = Vec::with_capacity(rows * cols);
    for i in 0..rows {
        data.extend_from_slice(&left.data[i * left.cols..(i + 1) * left.cols]);
        data.extend_from_slice(&right.data[i * right.cols..(i + 1) * right.cols]);
    }

    Ok(Matrix { rows, cols, data })
}

/// Merge `left` (coordinates, by convention) with `right` (metadata).
/// Values are copied verbatim; nothing is re-encoded.
#[tracing::instrument(level = "info", skip_all, fields(left = ?left.matrix.shape(), right = ?right.matrix.shape()))]
pub fn merge(left: &LoadedTable, right: &LoadedTable) -> Result<MergedTable, MergeError> {
    let matrix = merge_matrices(&left.matrix, &right.matrix)?;
    let columns = left
        .columns
        .iter()
        .chain(&right.columns)
        .cloned()
        .collect();

    info!(shape = ?matrix.shape(), "merged tables");
    Ok(MergedTable {
        columns,
        matrix,
        left_cols: left.matrix.cols(),
    })
}
