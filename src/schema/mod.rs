pub mod derive;
pub mod types;

pub use derive::{derive_kind, parse_finite};
pub use types::{Column, ColumnKind};
