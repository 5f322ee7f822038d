// src/schema/types.rs

use serde::{Deserialize, Serialize};

/// How a column's cells become matrix values.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Cells are parsed as floats.
    Numeric,
    /// Cells are replaced by their category code.
    Categorical,
}

impl ColumnKind {
    pub fn is_categorical(self) -> bool {
        matches!(self, ColumnKind::Categorical)
    }
}

/// A loaded column's name and kind, as derived from its data.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}
