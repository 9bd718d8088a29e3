//! In-memory state store implementation for Stockflow
//!
//! This crate provides in-memory implementations of the repository
//! interfaces defined in the stockflow-core crate, plus a tracked-entity
//! store. It is primarily useful for development, testing, and simple
//! deployments where persistence is not required.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod repositories;
pub use repositories::{
    InMemoryEntityStore, InMemoryWorkflowDefinitionRepository,
    DefinitionTable, InMemoryWorkflowInstanceRepository, InstanceTables,
};

use stockflow_core::{
    domain::repository::{WorkflowDefinitionRepository, WorkflowInstanceRepository},
    EntityId, TrackedEntity,
};

/// Provider for in-memory state store repositories
pub struct InMemoryStateStoreProvider {
    // Shared storage for workflow definitions
    definitions: DefinitionTable,

    // Shared storage for workflow instances and the step index
    instances: Arc<RwLock<InstanceTables>>,

    // Shared storage for tracked entities
    entities: Arc<RwLock<HashMap<EntityId, TrackedEntity>>>,
}

impl InMemoryStateStoreProvider {
    /// Create a new in-memory state store provider
    pub fn new() -> Self {
        Self {
            definitions: Arc::new(RwLock::new(HashMap::new())),
            instances: Arc::new(RwLock::new(InstanceTables::default())),
            entities: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create repositories for use with the workflow services
    pub fn create_repositories(
        &self,
    ) -> (
        Arc<dyn WorkflowInstanceRepository>,
        Arc<dyn WorkflowDefinitionRepository>,
    ) {
        let instance_repo = Arc::new(InMemoryWorkflowInstanceRepository::new(
            self.instances.clone(),
            self.definitions.clone(),
        ));

        let definition_repo = Arc::new(InMemoryWorkflowDefinitionRepository::new(
            self.definitions.clone(),
            self.instances.clone(),
        ));

        (instance_repo, definition_repo)
    }

    /// Tracked-entity store sharing this provider's storage
    pub fn entity_store(&self) -> Arc<InMemoryEntityStore> {
        Arc::new(InMemoryEntityStore::new(self.entities.clone()))
    }
}

impl Default for InMemoryStateStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
