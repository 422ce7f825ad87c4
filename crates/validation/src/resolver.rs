//! Resource directory seam

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tontine_core::ResourceRef;

/// Why a snapshot could not be produced
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Resource not found: {0}")]
    NotFound(ResourceRef),

    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

/// Display data captured once when a request is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Human-readable name at creation time
    pub label: String,

    /// Contact hint for the resource's owner, if the directory has one
    pub contact: Option<String>,
}

impl ResourceSnapshot {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            contact: None,
        }
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }
}

/// Resolves a resource reference to its display snapshot.
///
/// Stands in for the account/group repositories, which live outside this
/// engine. The snapshot is denormalized into the request so the request
/// stays readable after the resource is renamed or removed.
#[async_trait]
pub trait ResourceResolver: Send + Sync {
    async fn resolve(&self, resource: &ResourceRef) -> Result<ResourceSnapshot, ResolveError>;
}

/// In-memory directory (tests, demos)
#[derive(Default)]
pub struct StaticResolver {
    entries: HashMap<String, ResourceSnapshot>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, keyed by the reference's `kind:id` form.
    pub fn with(mut self, resource: ResourceRef, snapshot: ResourceSnapshot) -> Self {
        self.entries.insert(resource.to_string(), snapshot);
        self
    }
}

#[async_trait]
impl ResourceResolver for StaticResolver {
    async fn resolve(&self, resource: &ResourceRef) -> Result<ResourceSnapshot, ResolveError> {
        self.entries
            .get(&resource.to_string())
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(resource.clone()))
    }
}
