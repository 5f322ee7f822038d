use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::ConfigError;

/// Above this many distinct values a numeric column's levels collapse to `Overflow`.
pub const DEFAULT_MAX_NUMERIC_LEVELS: usize = 1_000;

/// Knobs for the CSV loader. Every field has a default, so a YAML file only
/// needs the keys it wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub delimiter: char,
    pub quote: char,
    pub max_numeric_levels: usize,
    /// Infer and encode columns on the rayon pool.
    pub parallel: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
            max_numeric_levels: DEFAULT_MAX_NUMERIC_LEVELS,
            parallel: true,
        }
    }
}

impl LoaderConfig {
    /// Read a YAML config from `path` and validate it.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: LoaderConfig =
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delimiter == self.quote {
            return Err(ConfigError::Invalid(format!(
                "delimiter and quote are both {:?}",
                self.delimiter
            )));
        }
        for (what, c) in [("delimiter", self.delimiter), ("quote", self.quote)] {
            if c == '\n' || c == '\r' {
                return Err(ConfigError::Invalid(format!("{} may not be a newline", what)));
            }
        }
        Ok(())
    }
}
