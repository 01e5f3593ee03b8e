//! Ordered log of symbolic array writes layered over a plane's bytes

use serde::Serialize;

/// One write in an [`UpdateLog`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateEntry {
    /// Offset expression (may be symbolic, so kept as text)
    pub offset: String,
    pub value: String,
}

/// Ordered association list of `offset -> value` writes.
///
/// Order is significant. Writing an offset that is already present replaces
/// its value in place; writing a new offset appends it at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UpdateLog {
    entries: Vec<UpdateEntry>,
}

impl UpdateLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write, keeping the position of an offset seen before
    pub fn upsert(&mut self, offset: impl Into<String>, value: impl Into<String>) {
        let offset = offset.into();
        let value = value.into();
        match self.entries.iter_mut().find(|entry| entry.offset == offset) {
            Some(entry) => entry.value = value,
            None => self.entries.push(UpdateEntry { offset, value }),
        }
    }

    pub fn get(&self, offset: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.offset == offset)
            .map(|entry| entry.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &UpdateEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// New log holding `self` followed by the writes of `later`
    pub fn merged_with(&self, later: &UpdateLog) -> UpdateLog {
        let mut merged = self.clone();
        for entry in &later.entries {
            merged.upsert(entry.offset.clone(), entry.value.clone());
        }
        merged
    }
}

impl<O, V> FromIterator<(O, V)> for UpdateLog
where
    O: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (O, V)>>(iter: I) -> Self {
        let mut log = UpdateLog::new();
        for (offset, value) in iter {
            log.upsert(offset, value);
        }
        log
    }
}
