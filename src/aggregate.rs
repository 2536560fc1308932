use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// Keys serialize sorted; each record list keeps merge order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateMap<R> {
    entries: BTreeMap<String, Vec<R>>,
}

impl<R> Default for AggregateMap<R> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<R> AggregateMap<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, entity: impl Into<String>, record: R) {
        self.entries.entry(entity.into()).or_default().push(record);
    }

    pub fn merge_all<K: Into<String>>(&mut self, records: impl IntoIterator<Item = (K, R)>) {
        for (entity, record) in records {
            self.merge(entity, record);
        }
    }

    pub fn get(&self, entity: &str) -> Option<&[R]> {
        self.entries.get(entity).map(Vec::as_slice)
    }

    pub fn entity_count(&self) -> usize {
        self.entries.len()
    }

    pub fn record_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[R])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<R>> {
        self.entries
    }
}
