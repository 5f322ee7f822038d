//! Turning one column of cells into matrix values.
//!
//! Categorical columns get first-seen-order codes; numeric columns are parsed
//! and also get a level dictionary (capped) so a host can recolour them as
//! categories without reloading.

pub mod categories;

pub use categories::{CategoryMap, ColumnCategories, NumericLevels};

use tracing::{debug, warn};

use crate::schema::{parse_finite, ColumnKind};

/// The result of encoding one column.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedColumn {
    pub values: Vec<f64>,
    pub extra: ColumnMaps,
    /// Non-empty cells of a numeric column that did not parse.
    pub parse_failures: usize,
}

/// The dictionary that goes with an encoded column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnMaps {
    Categorical(ColumnCategories),
    Numeric(NumericLevels),
}

/// Encode `cells` as `kind`. Empty cells always become NaN.
pub fn encode_column<S: AsRef<str>>(
    name: &str,
    kind: ColumnKind,
    cells: &[S],
    max_numeric_levels: usize,
) -> EncodedColumn {
    match kind {
        ColumnKind::Categorical => encode_categorical(name, cells),
        ColumnKind::Numeric => encode_numeric(name, cells, max_numeric_levels),
    }
}

fn encode_categorical<S: AsRef<str>>(name: &str, cells: &[S]) -> EncodedColumn {
    let mut cats = ColumnCategories::new();
    let values = cells
        .iter()
        .map(|cell| match cell.as_ref() {
            "" => f64::NAN,
            s => f64::from(cats.intern(s)),
        })
        .collect();

    debug!("encoded `{}`: {} categories", name, cats.len());
    EncodedColumn {
        values,
        extra: ColumnMaps::Categorical(cats),
        parse_failures: 0,
    }
}

fn encode_numeric<S: AsRef<str>>(name: &str, cells: &[S], max_levels: usize) -> EncodedColumn {
    let mut levels = Some(ColumnCategories::new());
    let mut parse_failures = 0;
    let mut values = Vec::with_capacity(cells.len());

    for (row, cell) in cells.iter().enumerate() {
        let cell = cell.as_ref();
        if cell.is_empty() {
            values.push(f64::NAN);
            continue;
        }
        match parse_finite(cell) {
            Some(v) => {
                values.push(v);
                if let Some(lv) = levels.as_mut() {
                    if lv.code(cell).is_none() && lv.len() >= max_levels {
                        debug!("`{}` has more than {} distinct values", name, max_levels);
                        levels = None;
                    } else {
                        lv.intern(cell);
                    }
                }
            }
            None => {
                warn!(column = name, row, cell, "unparseable value in numeric column");
                parse_failures += 1;
                values.push(f64::NAN);
            }
        }
    }

    let levels = match levels {
        Some(lv) => NumericLevels::Levels(lv),
        None => NumericLevels::Overflow,
    };
    EncodedColumn {
        values,
        extra: ColumnMaps::Numeric(levels),
        parse_failures,
    }
}
