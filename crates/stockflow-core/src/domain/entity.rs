//! Tracked-entity capability
//!
//! The engine never owns the entities it drives. It only needs to read an
//! entity by id and to set its status, both through [`TrackedEntityStore`],
//! which the owning module (e.g. inventory) implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::CoreError;

/// Value object: Tracked entity ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque status value owned by the tracked-entity module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityStatus(pub String);

impl EntityStatus {
    /// Create a status from any string-like value
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    /// Borrow the raw status string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityStatus {
    fn from(status: &str) -> Self {
        Self(status.to_string())
    }
}

/// The slice of an entity the engine can see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntity {
    /// Entity id
    pub id: EntityId,
    /// Current status
    pub status: EntityStatus,
}

/// Capability exposed by the module that owns tracked entities
#[async_trait]
pub trait TrackedEntityStore: Send + Sync {
    /// Fetch an entity by id
    async fn get_entity(&self, id: &EntityId) -> Result<Option<TrackedEntity>, CoreError>;

    /// Overwrite the status of an entity
    async fn set_entity_status(&self, id: &EntityId, status: &EntityStatus)
        -> Result<(), CoreError>;
}
