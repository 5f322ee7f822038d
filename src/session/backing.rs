use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the host keeps in its durable per-scene properties: everything as
/// strings and plain values, so it survives a save/reload of the host file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackingRecord {
    /// `[rows, cols]`; `[0, 0]` means nothing is stored.
    pub shape: [usize; 2],
    /// JSON `{"shape": [r, c], "values": [...]}` with NaN as `null`.
    pub data_json: String,
    pub labels: Vec<String>,
    /// JSON object: label → is-categorical.
    pub obs_map_json: String,
    /// JSON object: label → dictionary.
    pub cat_map_json: String,
    pub stored_at: Option<DateTime<Utc>>,
}

/// The host-owned store behind a [`super::SessionCache`].
pub trait SessionBacking {
    fn record(&self) -> Option<&BackingRecord>;
    fn write(&mut self, record: BackingRecord);
    fn clear(&mut self);
    /// Change token. Must differ from every earlier value whenever the
    /// record may have changed; an equal token means the record is untouched.
    fn revision(&self) -> u64;
}

/// A [`SessionBacking`] that lives in process memory.
#[derive(Debug, Default)]
pub struct MemoryBacking {
    record: Option<BackingRecord>,
    revision: u64,
}

impl MemoryBacking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct access for hosts that edit their properties outside the cache.
    /// Counts as a change.
    pub fn record_mut(&mut self) -> Option<&mut BackingRecord> {
        self.revision += 1;
        self.record.as_mut()
    }
}

impl SessionBacking for MemoryBacking {
    fn record(&self) -> Option<&BackingRecord> {
        self.record.as_ref()
    }

    fn write(&mut self, record: BackingRecord) {
        self.revision += 1;
        self.record = Some(record);
    }

    fn clear(&mut self) {
        self.revision += 1;
        self.record = None;
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}
