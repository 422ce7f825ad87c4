//! File-backed resource directory
//!
//! Stands in for the account/group repositories, which live outside the
//! validation engine. One JSON file maps `kind:id` references to the
//! display snapshots the engine freezes into new requests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use tontine_core::ResourceRef;
use tontine_validation::{ResolveError, ResourceResolver, ResourceSnapshot};

/// A resource directory persisted as a single JSON file
pub struct FileDirectory {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, ResourceSnapshot>>,
}

impl FileDirectory {
    /// Open the directory, creating an empty one if the file is missing
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ResourceSnapshot>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register (or replace) a resource and persist the file
    pub fn add(&self, resource: &ResourceRef, snapshot: ResourceSnapshot) -> anyhow::Result<()> {
        let mut entries = self.lock();
        entries.insert(resource.to_string(), snapshot);
        let json = serde_json::to_string_pretty(&*entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// All known resources, sorted by reference
    pub fn list(&self) -> Vec<(String, ResourceSnapshot)> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[async_trait]
impl ResourceResolver for FileDirectory {
    async fn resolve(&self, resource: &ResourceRef) -> Result<ResourceSnapshot, ResolveError> {
        self.lock()
            .get(&resource.to_string())
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(resource.clone()))
    }
}
