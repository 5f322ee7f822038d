//! CSV loading and encoding for point-cloud colouring.
//!
//! [`process::load`] reads one file into a dense matrix, classifying each
//! column as numeric or categorical and coding categorical values in
//! first-seen order. [`merge::merge`] joins a coordinates table and a
//! metadata table column-wise, and [`session::SessionCache`] keeps the last
//! result for the visualization layer.

pub mod config;
pub mod encode;
pub mod error;
pub mod matrix;
pub mod merge;
pub mod plot;
pub mod process;
pub mod schema;
pub mod session;

pub use config::LoaderConfig;
pub use error::{ConfigError, FormatError, LoadError, MergeError, PlotError, SessionError};
pub use matrix::Matrix;
pub use merge::{merge, MergedTable};
pub use plot::{distinct_labels, plot, PlotSummary};
pub use process::{load, read_headers, LoadDiagnostics, LoadedTable, Loader};
pub use schema::ColumnKind;
pub use session::{SessionCache, SessionMaps};
