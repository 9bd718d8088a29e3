use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use stockflow_core::{
    domain::repository::{WorkflowDefinitionRepository, WorkflowInstanceRepository},
    CoreError, EntityId, EntityStatus, ResourceKind, StepInstanceId, TrackedEntity,
    TrackedEntityStore, WorkflowDefinition, WorkflowDefinitionId, WorkflowInstance,
    WorkflowInstanceId, WorkflowType,
};

/// Shared definition table
pub type DefinitionTable = Arc<RwLock<HashMap<WorkflowDefinitionId, WorkflowDefinition>>>;

/// Workflow instances plus a step-instance index, guarded by one lock.
///
/// Code that needs both this lock and the definition lock takes this one
/// first.
#[derive(Default)]
pub struct InstanceTables {
    instances: HashMap<WorkflowInstanceId, WorkflowInstance>,
    step_index: HashMap<StepInstanceId, WorkflowInstanceId>,
}

/// In-memory implementation of the WorkflowInstanceRepository
pub struct InMemoryWorkflowInstanceRepository {
    tables: Arc<RwLock<InstanceTables>>,
    definitions: DefinitionTable,
}

impl InMemoryWorkflowInstanceRepository {
    /// Create a new in-memory workflow instance repository
    pub fn new(tables: Arc<RwLock<InstanceTables>>, definitions: DefinitionTable) -> Self {
        Self {
            tables,
            definitions,
        }
    }
}

#[async_trait]
impl WorkflowInstanceRepository for InMemoryWorkflowInstanceRepository {
    async fn find_by_id(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<Option<WorkflowInstance>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables.instances.get(id).cloned())
    }

    async fn find_by_step_instance(
        &self,
        step_instance_id: &StepInstanceId,
    ) -> Result<Option<WorkflowInstance>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .step_index
            .get(step_instance_id)
            .and_then(|id| tables.instances.get(id))
            .cloned())
    }

    async fn find_by_entity(
        &self,
        entity_id: &EntityId,
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .instances
            .values()
            .filter(|instance| instance.entity_id == *entity_id)
            .cloned()
            .collect())
    }

    async fn find_by_definition(
        &self,
        definition_id: &WorkflowDefinitionId,
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .instances
            .values()
            .filter(|instance| instance.workflow_definition_id == *definition_id)
            .cloned()
            .collect())
    }

    async fn save(
        &self,
        instance: &WorkflowInstance,
        expected_version: Option<u64>,
    ) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;

        let stored_version = tables.instances.get(&instance.id).map(|i| i.version);
        match (stored_version, expected_version) {
            (None, None) => {
                let definitions = self.definitions.read().await;
                if !definitions.contains_key(&instance.workflow_definition_id) {
                    warn!(
                        instance_id = %instance.id,
                        definition_id = %instance.workflow_definition_id,
                        "Refusing to insert instance of a missing workflow definition"
                    );
                    return Err(CoreError::not_found(
                        ResourceKind::WorkflowDefinition,
                        instance.workflow_definition_id,
                    ));
                }
            }
            (Some(found), Some(expected)) if found == expected => {}
            (Some(found), expected) => {
                warn!(
                    instance_id = %instance.id,
                    found,
                    "Rejecting stale workflow instance write"
                );
                return Err(CoreError::ConcurrencyConflict {
                    id: instance.id.to_string(),
                    expected: expected.unwrap_or(0),
                    found,
                });
            }
            (None, Some(_)) => {
                return Err(CoreError::not_found(
                    ResourceKind::WorkflowInstance,
                    instance.id,
                ));
            }
        }

        for step in &instance.step_instances {
            tables.step_index.insert(step.id, instance.id);
        }
        tables.instances.insert(instance.id, instance.clone());

        debug!(
            instance_id = %instance.id,
            version = instance.version,
            "Workflow instance saved"
        );
        Ok(())
    }
}

/// In-memory implementation of the WorkflowDefinitionRepository
pub struct InMemoryWorkflowDefinitionRepository {
    definitions: DefinitionTable,
    instances: Arc<RwLock<InstanceTables>>,
}

impl InMemoryWorkflowDefinitionRepository {
    /// Create a new in-memory workflow definition repository
    pub fn new(definitions: DefinitionTable, instances: Arc<RwLock<InstanceTables>>) -> Self {
        Self {
            definitions,
            instances,
        }
    }
}

#[async_trait]
impl WorkflowDefinitionRepository for InMemoryWorkflowDefinitionRepository {
    async fn find_by_id(
        &self,
        id: &WorkflowDefinitionId,
    ) -> Result<Option<WorkflowDefinition>, CoreError> {
        let definitions = self.definitions.read().await;
        Ok(definitions.get(id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<WorkflowDefinition>, CoreError> {
        let definitions = self.definitions.read().await;
        Ok(definitions.values().cloned().collect())
    }

    async fn find_by_type(
        &self,
        workflow_type: &WorkflowType,
    ) -> Result<Vec<WorkflowDefinition>, CoreError> {
        let definitions = self.definitions.read().await;
        Ok(definitions
            .values()
            .filter(|definition| definition.workflow_type == *workflow_type)
            .cloned()
            .collect())
    }

    async fn save(&self, definition: &WorkflowDefinition) -> Result<(), CoreError> {
        let mut definitions = self.definitions.write().await;
        definitions.insert(definition.id, definition.clone());
        Ok(())
    }

    async fn save_all(&self, batch: &[WorkflowDefinition]) -> Result<(), CoreError> {
        // one write guard for the whole batch
        let mut definitions = self.definitions.write().await;
        for definition in batch {
            definitions.insert(definition.id, definition.clone());
        }
        Ok(())
    }

    async fn delete(&self, id: &WorkflowDefinitionId) -> Result<(), CoreError> {
        // instance inserts hold the instance lock while checking the definition
        let tables = self.instances.read().await;
        let mut definitions = self.definitions.write().await;

        let active = tables
            .instances
            .values()
            .filter(|instance| instance.workflow_definition_id == *id && instance.is_active())
            .count();
        if active > 0 {
            return Err(CoreError::invalid_state(
                ResourceKind::WorkflowDefinition,
                id,
                "InUse",
                format!("referenced by {} active instance(s)", active),
            ));
        }

        definitions.remove(id);
        debug!(definition_id = %id, "Workflow definition deleted");
        Ok(())
    }
}

/// In-memory tracked-entity store
pub struct InMemoryEntityStore {
    entities: Arc<RwLock<HashMap<EntityId, TrackedEntity>>>,
}

impl InMemoryEntityStore {
    /// Create a new in-memory entity store
    pub fn new(entities: Arc<RwLock<HashMap<EntityId, TrackedEntity>>>) -> Self {
        Self { entities }
    }

    /// Register an entity
    pub async fn insert(&self, entity: TrackedEntity) {
        let mut entities = self.entities.write().await;
        entities.insert(entity.id, entity);
    }
}

#[async_trait]
impl TrackedEntityStore for InMemoryEntityStore {
    async fn get_entity(&self, id: &EntityId) -> Result<Option<TrackedEntity>, CoreError> {
        let entities = self.entities.read().await;
        Ok(entities.get(id).cloned())
    }

    async fn set_entity_status(
        &self,
        id: &EntityId,
        status: &EntityStatus,
    ) -> Result<(), CoreError> {
        let mut entities = self.entities.write().await;
        let entity = entities
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(ResourceKind::TrackedEntity, id))?;
        entity.status = status.clone();
        Ok(())
    }
}
