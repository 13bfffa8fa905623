use std::collections::HashMap;

use futures::future::BoxFuture;
use serde_json::Value;

use syncup_core::error::Result;
use syncup_core::traits::LookupStore;
use syncup_core::types::SearchCriteria;

/// In-memory lookup store keyed by collection name.
#[derive(Default, Clone)]
pub struct MemoryLookup {
    collections: HashMap<String, Vec<Value>>,
}

impl MemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, name: impl Into<String>, records: Vec<Value>) -> Self {
        self.collections.insert(name.into(), records);
        self
    }
}

impl LookupStore for MemoryLookup {
    fn search<'a>(&'a self, criteria: &'a SearchCriteria) -> BoxFuture<'a, Result<Vec<Value>>> {
        let found = self
            .collections
            .get(&criteria.collection)
            .map(|records| criteria.apply(records.iter().cloned()))
            .unwrap_or_default();
        Box::pin(async move { Ok(found) })
    }
}
