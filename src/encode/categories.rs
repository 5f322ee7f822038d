use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};

/// One column's string → code dictionary.
///
/// Codes are `0..len()` in first-seen order. The dictionary serializes as a
/// JSON object with keys in code order, and deserializes from any object
/// whose codes form that contiguous range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "HashMap<String, u32>")]
pub struct ColumnCategories {
    values: Vec<String>,
    codes: HashMap<String, u32>,
}

impl ColumnCategories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the code for `value`, assigning the next one if unseen.
    pub fn intern(&mut self, value: &str) -> u32 {
        if let Some(&code) = self.codes.get(value) {
            return code;
        }
        let code = self.values.len() as u32;
        self.values.push(value.to_string());
        self.codes.insert(value.to_string(), code);
        code
    }

    pub fn code(&self, value: &str) -> Option<u32> {
        self.codes.get(value).copied()
    }

    pub fn value(&self, code: u32) -> Option<&str> {
        self.values.get(code as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(value, code)` pairs in code order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (v.as_str(), i as u32))
    }
}

impl Serialize for ColumnCategories {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (value, code) in self.iter() {
            map.serialize_entry(value, &code)?;
        }
        map.end()
    }
}

impl TryFrom<HashMap<String, u32>> for ColumnCategories {
    type Error = String;

    fn try_from(codes: HashMap<String, u32>) -> Result<Self, Self::Error> {
        let mut values = vec![None; codes.len()];
        for (value, &code) in &codes {
            let slot = values
                .get_mut(code as usize)
                .ok_or_else(|| format!("code {} for {:?} is out of range", code, value))?;
            if slot.is_some() {
                return Err(format!("code {} is assigned twice", code));
            }
            *slot = Some(value.clone());
        }
        // every slot is filled: n distinct in-range codes over n slots
        let values = values.into_iter().flatten().collect();
        Ok(Self { values, codes })
    }
}

/// Column name → dictionary, for the categorical columns of one load.
pub type CategoryMap = BTreeMap<String, ColumnCategories>;

/// Distinct values of a numeric column, kept so the host can colour it by level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericLevels {
    Levels(ColumnCategories),
    /// More distinct values than the configured limit.
    Overflow,
}
