//! Error types for loading, merging and caching tables.

use std::path::PathBuf;
use thiserror::Error;

/// Problems with the shape of the header or the caller's column selection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    /// Line 1 is missing or holds no non-empty column name.
    #[error("header row is missing or empty")]
    EmptyHeader,

    /// A selected column name does not appear in the header.
    #[error("selected column `{name}` not found in header")]
    UnknownColumn { name: String },
}

/// Fatal errors from [`crate::process::load`]. No partial table accompanies them.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{source} (in {path:?})")]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("line {line} of {path:?} is not valid UTF-8")]
    Encoding { path: PathBuf, line: usize },
}

impl LoadError {
    /// The format problem behind this error, if it is one.
    pub fn format_error(&self) -> Option<&FormatError> {
        match self {
            LoadError::Format { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors from [`crate::merge::merge`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("row count mismatch: left has {left} rows, right has {right}")]
    RowMismatch { left: usize, right: usize },
}

/// Errors raised while (de)serializing the session backing payload.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("serializing session payload: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("deserializing session payload: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("stored shape {rows}x{cols} does not match {len} stored values")]
    ShapeMismatch { rows: usize, cols: usize, len: usize },

    #[error("{labels} labels do not fit in a matrix with {cols} columns")]
    TooManyLabels { labels: usize, cols: usize },

    #[error("label `{0}` is not part of the cached session")]
    UnknownLabel(String),

    #[error("no data cached")]
    Empty,
}

/// Errors from reading or validating a [`crate::config::LoaderConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything the `plot` action can fail with.
#[derive(Debug, Error)]
pub enum PlotError {
    #[error("no labels selected")]
    NoLabels,

    #[error("loading {which}: {source}")]
    Load {
        which: &'static str,
        #[source]
        source: LoadError,
    },

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Session(#[from] SessionError),
}
