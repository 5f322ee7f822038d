//! The session cache: the last plotted matrix and its label metadata.
//!
//! The serialized copy lives in a [`SessionBacking`] owned by the host. The
//! cache keeps the decoded matrix and maps in memory. While the backing's
//! revision is unchanged nothing is re-read; after a change the payload is
//! fingerprinted and only decoded again if the fingerprint differs.

pub mod backing;

pub use backing::{BackingRecord, MemoryBacking, SessionBacking};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error, info};

use crate::{
    encode::{ColumnCategories, NumericLevels},
    error::SessionError,
    matrix::{Matrix, MatrixPayload},
};

/// The dictionary stored for one label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "map")]
pub enum LabelDictionary {
    Categorical(ColumnCategories),
    Numeric(NumericLevels),
}

/// Per-label metadata stored next to the matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMaps {
    /// label → is-categorical
    pub obs_map: BTreeMap<String, bool>,
    pub cat_map: BTreeMap<String, LabelDictionary>,
}

struct Cached {
    revision: u64,
    fingerprint: String,
    matrix: Arc<Matrix>,
}

struct CachedMaps {
    revision: u64,
    maps: SessionMaps,
}

/// Most recently stored matrix plus labels and maps.
///
/// The labels name the trailing columns of the matrix; every column before
/// them is a leading (coordinate) column.
pub struct SessionCache<B: SessionBacking = MemoryBacking> {
    backing: B,
    cached: Option<Cached>,
    maps: Option<CachedMaps>,
}

impl SessionCache<MemoryBacking> {
    pub fn in_memory() -> Self {
        Self::new(MemoryBacking::new())
    }
}

impl Default for SessionCache<MemoryBacking> {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl<B: SessionBacking> SessionCache<B> {
    pub fn new(backing: B) -> Self {
        Self {
            backing,
            cached: None,
            maps: None,
        }
    }

    pub fn backing(&self) -> &B {
        &self.backing
    }

    /// Mutable access to the backing store. Changes made here are picked up
    /// by the next read, provided the backing bumps its revision.
    pub fn backing_mut(&mut self) -> &mut B {
        &mut self.backing
    }

    /// Serialize and store `matrix` with its labels and maps, replacing
    /// whatever was stored before.
    pub fn store(
        &mut self,
        matrix: Matrix,
        labels: Vec<String>,
        maps: SessionMaps,
    ) -> Result<Arc<Matrix>, SessionError> {
        if labels.len() > matrix.cols() {
            return Err(SessionError::TooManyLabels {
                labels: labels.len(),
                cols: matrix.cols(),
            });
        }

        let data_json =
            serde_json::to_string(&MatrixPayload::from(&matrix)).map_err(SessionError::Serialize)?;
        let obs_map_json = serde_json::to_string(&maps.obs_map).map_err(SessionError::Serialize)?;
        let cat_map_json = serde_json::to_string(&maps.cat_map).map_err(SessionError::Serialize)?;
        let fingerprint = fingerprint(&data_json);

        let (rows, cols) = matrix.shape();
        self.backing.write(BackingRecord {
            shape: [rows, cols],
            data_json,
            labels,
            obs_map_json,
            cat_map_json,
            stored_at: Some(Utc::now()),
        });
        let revision = self.backing.revision();

        let matrix = Arc::new(matrix);
        self.cached = Some(Cached {
            revision,
            fingerprint,
            matrix: Arc::clone(&matrix),
        });
        self.maps = Some(CachedMaps { revision, maps });
        if rows == 0 && cols == 0 {
            self.cached = None;
        }
        info!(rows, cols, "stored session data");
        Ok(matrix)
    }

    /// The stored matrix, or `None` if nothing usable is stored.
    ///
    /// Returns the same `Arc` on every call until the backing payload
    /// changes. A payload that fails to decode is logged and dropped.
    pub fn fetch(&mut self) -> Option<Arc<Matrix>> {
        let revision = self.backing.revision();
        if let Some(cached) = &self.cached {
            if cached.revision == revision {
                return Some(Arc::clone(&cached.matrix));
            }
        }

        let Some(record) = self.backing.record() else {
            self.cached = None;
            return None;
        };
        if record.shape == [0, 0] {
            self.cached = None;
            return None;
        }

        let current = fingerprint(&record.data_json);
        if let Some(cached) = &mut self.cached {
            if cached.fingerprint == current {
                cached.revision = revision;
                return Some(Arc::clone(&cached.matrix));
            }
        }

        debug!("session payload changed, decoding");
        match decode_matrix(&record.data_json, record.shape) {
            Ok(matrix) => {
                let matrix = Arc::new(matrix);
                self.cached = Some(Cached {
                    revision,
                    fingerprint: current,
                    matrix: Arc::clone(&matrix),
                });
                Some(matrix)
            }
            Err(e) => {
                error!("error loading session data: {}", e);
                self.cached = None;
                None
            }
        }
    }

    /// Drop the in-memory matrix and clear the backing store.
    pub fn invalidate(&mut self) {
        self.backing.clear();
        self.cached = None;
        self.maps = None;
        debug!("session invalidated");
    }

    pub fn labels(&self) -> Option<&[String]> {
        self.backing.record().map(|r| r.labels.as_slice())
    }

    pub fn stored_at(&self) -> Option<DateTime<Utc>> {
        self.backing.record().and_then(|r| r.stored_at)
    }

    /// label → is-categorical. Empty if nothing (readable) is stored.
    pub fn obs_map(&mut self) -> &BTreeMap<String, bool> {
        &self.maps().obs_map
    }

    /// label → dictionary. Empty if nothing (readable) is stored.
    pub fn cat_map(&mut self) -> &BTreeMap<String, LabelDictionary> {
        &self.maps().cat_map
    }

    pub fn categories_for(&mut self, label: &str) -> Option<&LabelDictionary> {
        self.cat_map().get(label)
    }

    /// Whether `label` was loaded as categorical; `false` for unknown labels.
    pub fn is_categorical(&mut self, label: &str) -> bool {
        self.obs_map().get(label).copied().unwrap_or(false)
    }

    /// Index of `label`'s column in the stored matrix.
    pub fn label_index(&self, label: &str) -> Result<usize, SessionError> {
        let record = self.backing.record().ok_or(SessionError::Empty)?;
        let pos = record
            .labels
            .iter()
            .position(|l| l == label)
            .ok_or_else(|| SessionError::UnknownLabel(label.to_string()))?;
        let leading = record.shape[1].saturating_sub(record.labels.len());
        Ok(leading + pos)
    }

    pub fn label_column(&mut self, label: &str) -> Result<Vec<f64>, SessionError> {
        let idx = self.label_index(label)?;
        let matrix = self.fetch().ok_or(SessionError::Empty)?;
        matrix
            .column(idx)
            .ok_or_else(|| SessionError::UnknownLabel(label.to_string()))
    }

    /// Largest non-NaN value of `label`'s column, or `1.0` if it has none.
    pub fn label_max(&mut self, label: &str) -> Result<f64, SessionError> {
        let idx = self.label_index(label)?;
        let matrix = self.fetch().ok_or(SessionError::Empty)?;
        Ok(matrix.column_max(idx).unwrap_or(1.0))
    }

    /// Decoded maps for the current backing revision.
    fn maps(&mut self) -> &SessionMaps {
        let revision = self.backing.revision();
        if self.maps.as_ref().is_some_and(|m| m.revision != revision) {
            self.maps = None;
        }
        let backing = &self.backing;
        &self
            .maps
            .get_or_insert_with(|| CachedMaps {
                revision,
                maps: decode_maps(backing.record()),
            })
            .maps
    }
}

fn fingerprint(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}

fn decode_matrix(json: &str, shape: [usize; 2]) -> Result<Matrix, SessionError> {
    let payload: MatrixPayload = serde_json::from_str(json).map_err(SessionError::Deserialize)?;
    if payload.shape != shape {
        let [rows, cols] = shape;
        return Err(SessionError::ShapeMismatch {
            rows,
            cols,
            len: payload.values.len(),
        });
    }
    Matrix::try_from(payload)
}

fn decode_maps(record: Option<&BackingRecord>) -> SessionMaps {
    let Some(record) = record else {
        return SessionMaps::default();
    };
    debug!("decoding session maps");
    SessionMaps {
        obs_map: decode_or_default(&record.obs_map_json, "obs map"),
        cat_map: decode_or_default(&record.cat_map_json, "category map"),
    }
}

fn decode_or_default<T: DeserializeOwned + Default>(json: &str, what: &str) -> T {
    if json.is_empty() {
        return T::default();
    }
    serde_json::from_str(json).unwrap_or_else(|e| {
        error!("error loading {}: {}", what, e);
        T::default()
    })
}
