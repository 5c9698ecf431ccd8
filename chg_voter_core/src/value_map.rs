use std::collections::HashMap;

/// Sparse translation of raw vote values into comparison values.
///
/// Only MIN/MAX elections consult it, and only to pick a winner; the winner's
/// raw value is what gets reported.
#[derive(Clone, Debug, Default)]
pub struct ValueMap {
    entries: HashMap<i64, i64>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `original -> mapped`. Returns `false` if `original` was already
    /// mapped, in which case the existing entry is kept.
    pub fn insert(&mut self, original: i64, mapped: i64) -> bool {
        if self.entries.contains_key(&original) {
            return false;
        }
        self.entries.insert(original, mapped);
        true
    }

    /// Comparison value for `raw`; unmapped values compare as themselves.
    #[inline]
    pub fn mapped(&self, raw: i64) -> i64 {
        self.entries.get(&raw).copied().unwrap_or(raw)
    }

    pub fn get(&self, original: i64) -> Option<i64> {
        self.entries.get(&original).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
