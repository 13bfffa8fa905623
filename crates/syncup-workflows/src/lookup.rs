use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use syncup_core::error::{Result, SyncupError};
use syncup_core::traits::LookupStore;
use syncup_core::types::SearchCriteria;

/// Lookup store backed by a directory of JSON files.
///
/// Collection `users` is read from `<dir>/users.json`, which must hold a
/// JSON array of records. A missing file is an empty collection.
#[derive(Debug, Clone)]
pub struct JsonDirectoryLookup {
    dir: PathBuf,
}

impl JsonDirectoryLookup {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn collection_path(&self, collection: &str) -> Result<PathBuf> {
        let valid = !collection.is_empty()
            && collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(SyncupError::Lookup(format!(
                "invalid collection name '{}'",
                collection
            )));
        }
        Ok(self.dir.join(format!("{}.json", collection)))
    }

    async fn load(&self, collection: &str) -> Result<Vec<Value>> {
        let path = self.collection_path(collection)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Collection file missing, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(SyncupError::Lookup(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        match serde_json::from_str(&content) {
            Ok(Value::Array(records)) => Ok(records),
            Ok(_) => Err(SyncupError::Lookup(format!(
                "{} does not contain a JSON array",
                path.display()
            ))),
            Err(e) => Err(SyncupError::Lookup(format!(
                "invalid JSON in {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

impl LookupStore for JsonDirectoryLookup {
    fn search<'a>(&'a self, criteria: &'a SearchCriteria) -> BoxFuture<'a, Result<Vec<Value>>> {
        Box::pin(async move {
            let records = self.load(&criteria.collection).await?;
            let found = criteria.apply(records);
            debug!(
                collection = %criteria.collection,
                matched = found.len(),
                "Lookup search"
            );
            Ok(found)
        })
    }
}
