use tracing::debug;

use super::ColumnKind;

/// Parse a cell as a finite float. Accepts Rust's decimal float syntax
/// (optional sign, optional exponent); `nan`, `inf` and overflowing literals
/// are rejected.
pub fn parse_finite(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Classify one column from every value observed for it.
///
///  - Ignore empty cells
///  - If any non-empty cell fails to parse as a finite float, stop: Categorical
///  - If no non-empty cell was seen at all, default to Categorical
///  - Otherwise Numeric
pub fn derive_kind<S: AsRef<str>>(name: &str, cells: &[S]) -> ColumnKind {
    let mut seen_value = false;

    for cell in cells {
        let cell = cell.as_ref();
        if cell.is_empty() {
            continue;
        }
        seen_value = true;
        if parse_finite(cell).is_none() {
            debug!("derive_kind: column `{}` has non-numeric value {:?}", name, cell);
            return ColumnKind::Categorical;
        }
    }

    if !seen_value {
        debug!("derive_kind: no values for `{}`, defaulting to categorical", name);
        return ColumnKind::Categorical;
    }
    ColumnKind::Numeric
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_with_gaps_stays_numeric() {
        let cells = ["1", "", "-2.5e3", "+.5", "7."];
        assert_eq!(derive_kind("x", &cells), ColumnKind::Numeric);
    }

    #[test]
    fn one_string_makes_it_categorical() {
        let cells = ["1", "2", "B", "4"];
        assert_eq!(derive_kind("c", &cells), ColumnKind::Categorical);
    }

    #[test]
    fn all_empty_is_categorical() {
        let cells = ["", "", ""];
        assert_eq!(derive_kind("e", &cells), ColumnKind::Categorical);
        let none: [&str; 0] = [];
        assert_eq!(derive_kind("e", &none), ColumnKind::Categorical);
    }

    #[test]
    fn non_finite_literals_are_not_numbers() {
        assert_eq!(parse_finite("nan"), None);
        assert_eq!(parse_finite("inf"), None);
        assert_eq!(parse_finite("-infinity"), None);
        assert_eq!(parse_finite("1e400"), None);
        assert_eq!(parse_finite("1,5"), None);
        assert_eq!(parse_finite("42"), Some(42.0));
        assert_eq!(parse_finite("-1.25E-2"), Some(-0.0125));
        assert_eq!(derive_kind("n", &["1", "NaN"]), ColumnKind::Categorical);
    }
}
