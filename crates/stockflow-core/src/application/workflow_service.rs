use crate::{
    domain::definition::{WorkflowDefinition, WorkflowDefinitionId, WorkflowType},
    domain::entity::{EntityId, EntityStatus, TrackedEntityStore},
    domain::events::DomainEvent,
    domain::instance::{
        validate_priority, StepInstanceId, StepStatus, WorkflowInstance, WorkflowInstanceId,
        WorkflowStatus, WorkflowStepInstance,
    },
    domain::repository::{WorkflowDefinitionRepository, WorkflowInstanceRepository},
    error::ResourceKind,
    CoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<WorkflowInstanceId, Arc<Mutex<()>>>;
use tracing::{debug, error, info, warn};

/// Orchestrates workflow instances: creation, advance, approval gates and
/// entity status side effects.
///
/// Every mutation of an instance runs under a per-instance lock and is
/// persisted with an optimistic version check.
pub struct WorkflowService {
    /// Repository for workflow instances
    instance_repo: Arc<dyn WorkflowInstanceRepository>,

    /// Repository for workflow definitions
    definition_repo: Arc<dyn WorkflowDefinitionRepository>,

    /// Owner of the tracked entities
    entity_store: Arc<dyn TrackedEntityStore>,

    /// Event handler
    event_handler: Arc<dyn DomainEventHandler>,

    /// One writer lock per instance, present only while held or awaited
    instance_locks: Arc<LockTable>,
}

impl WorkflowService {
    /// Create a new workflow service
    pub fn new(
        instance_repo: Arc<dyn WorkflowInstanceRepository>,
        definition_repo: Arc<dyn WorkflowDefinitionRepository>,
        entity_store: Arc<dyn TrackedEntityStore>,
        event_handler: Arc<dyn DomainEventHandler>,
    ) -> Self {
        Self {
            instance_repo,
            definition_repo,
            entity_store,
            event_handler,
            instance_locks: Arc::new(DashMap::with_capacity(64)),
        }
    }

    /// Instantiate a definition against an entity
    pub async fn create_instance(
        &self,
        definition_id: &WorkflowDefinitionId,
        entity_id: &EntityId,
        priority: u8,
    ) -> Result<WorkflowInstance, CoreError> {
        validate_priority(priority)?;

        let definition = self.load_definition(definition_id).await?;
        if self.entity_store.get_entity(entity_id).await?.is_none() {
            return Err(CoreError::not_found(ResourceKind::TrackedEntity, entity_id));
        }

        let (mut instance, transition) =
            WorkflowInstance::instantiate(&definition, *entity_id, priority, Utc::now())
                .map_err(|e| {
                    warn!(definition_id = %definition_id, error = %e, "Cannot instantiate workflow");
                    e
                })?;

        self.commit(&mut instance, None, transition.entity_status)
            .await?;

        info!(
            instance_id = %instance.id,
            definition_id = %definition.id,
            entity_id = %entity_id,
            workflow_type = %instance.workflow_type,
            priority,
            "Workflow instance created"
        );

        Ok(instance)
    }

    /// Get an instance by ID
    pub async fn get_instance(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<WorkflowInstance, CoreError> {
        debug!(instance_id = %id, "Loading workflow instance");
        self.instance_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found(ResourceKind::WorkflowInstance, id))
    }

    /// All instances of an entity, newest first
    pub async fn instances_for_entity(
        &self,
        entity_id: &EntityId,
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        let mut instances = self.instance_repo.find_by_entity(entity_id).await?;
        instances.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(instances)
    }

    /// Active instances of an entity for one workflow type, newest first
    pub async fn active_instances_for_entity_by_type(
        &self,
        entity_id: &EntityId,
        workflow_type: &WorkflowType,
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        Ok(self
            .instances_for_entity(entity_id)
            .await?
            .into_iter()
            .filter(|i| i.is_active() && i.workflow_type == *workflow_type)
            .collect())
    }

    /// The definition an instance runs
    pub async fn definition_for(
        &self,
        instance: &WorkflowInstance,
    ) -> Result<WorkflowDefinition, CoreError> {
        self.load_definition(&instance.workflow_definition_id).await
    }

    /// The step currently being worked on, if any
    pub async fn current_step(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<Option<WorkflowStepInstance>, CoreError> {
        Ok(self.get_instance(id).await?.current_step().cloned())
    }

    /// Move an instance one step forward.
    ///
    /// Returns the new current step, or `None` once the workflow completed.
    pub async fn advance(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<Option<WorkflowStepInstance>, CoreError> {
        let _guard = self.lock_instance(*id).await;

        let mut instance = self.get_instance(id).await?;
        let definition = self.load_definition(&instance.workflow_definition_id).await?;
        let expected = instance.version;

        let transition = instance.advance(&definition, Utc::now()).map_err(|e| {
            warn!(instance_id = %id, error = %e, "Advance refused");
            e
        })?;

        self.commit(&mut instance, Some(expected), transition.entity_status.clone())
            .await?;

        let current = transition
            .current
            .and_then(|step_id| instance.step_instance(step_id).cloned());

        match &current {
            Some(step) => info!(
                instance_id = %id,
                step_instance_id = %step.id,
                sequence_number = step.sequence_number,
                status = %step.status,
                "Workflow advanced"
            ),
            None => info!(instance_id = %id, "Workflow completed"),
        }

        Ok(current)
    }

    /// Release an approval gate. Does not advance.
    pub async fn approve_step(
        &self,
        step_instance_id: &StepInstanceId,
        approver: &str,
        notes: Option<String>,
    ) -> Result<WorkflowStepInstance, CoreError> {
        let step = self
            .mutate_step(*step_instance_id, "approve", |instance, definition, now| {
                instance.approve_step(*step_instance_id, definition, approver, notes, now)
            })
            .await?;

        info!(
            instance_id = %step.workflow_instance_id,
            step_instance_id = %step.id,
            approver,
            "Workflow step approved"
        );
        Ok(step)
    }

    /// Refuse an approval gate. The instance keeps its status.
    pub async fn reject_step(
        &self,
        step_instance_id: &StepInstanceId,
        approver: &str,
        notes: &str,
    ) -> Result<WorkflowStepInstance, CoreError> {
        let step = self
            .mutate_step(*step_instance_id, "reject", |instance, definition, now| {
                instance.reject_step(*step_instance_id, definition, approver, notes, now)
            })
            .await?;

        info!(
            instance_id = %step.workflow_instance_id,
            step_instance_id = %step.id,
            approver,
            "Workflow step rejected"
        );
        Ok(step)
    }

    /// Assign a step to a user
    pub async fn assign_step(
        &self,
        step_instance_id: &StepInstanceId,
        user: &str,
    ) -> Result<WorkflowStepInstance, CoreError> {
        let step = self
            .mutate_step(*step_instance_id, "assign", |instance, _, now| {
                instance.assign_step(*step_instance_id, user, now)
            })
            .await?;

        info!(
            instance_id = %step.workflow_instance_id,
            step_instance_id = %step.id,
            assignee = user,
            "Workflow step assigned"
        );
        Ok(step)
    }

    /// Set a step status directly
    pub async fn update_step_status(
        &self,
        step_instance_id: &StepInstanceId,
        status: StepStatus,
        notes: Option<String>,
    ) -> Result<WorkflowStepInstance, CoreError> {
        let step = self
            .mutate_step(*step_instance_id, "update status of", |instance, _, now| {
                instance.override_step_status(*step_instance_id, status, notes, now)
            })
            .await?;

        info!(
            instance_id = %step.workflow_instance_id,
            step_instance_id = %step.id,
            status = %step.status,
            "Workflow step status updated"
        );
        Ok(step)
    }

    /// Set an instance status directly. Steps and entity are left untouched.
    pub async fn update_instance_status(
        &self,
        id: &WorkflowInstanceId,
        status: WorkflowStatus,
    ) -> Result<WorkflowInstance, CoreError> {
        let _guard = self.lock_instance(*id).await;

        let mut instance = self.get_instance(id).await?;
        let expected = instance.version;
        let from = instance.status;

        instance.set_status(status, Utc::now()).map_err(|e| {
            warn!(instance_id = %id, error = %e, "Status change refused");
            e
        })?;

        if instance.status == from {
            return Ok(instance);
        }

        self.commit(&mut instance, Some(expected), None).await?;

        info!(
            instance_id = %id,
            from = %from,
            to = %instance.status,
            "Workflow instance status updated"
        );
        Ok(instance)
    }

    /// Load, lock and mutate the instance owning a step, then persist it
    async fn mutate_step<F>(
        &self,
        step_instance_id: StepInstanceId,
        action: &'static str,
        mutate: F,
    ) -> Result<WorkflowStepInstance, CoreError>
    where
        F: FnOnce(&mut WorkflowInstance, &WorkflowDefinition, DateTime<Utc>) -> Result<(), CoreError>
            + Send,
    {
        let owner = self
            .instance_repo
            .find_by_step_instance(&step_instance_id)
            .await?
            .ok_or_else(|| {
                CoreError::not_found(ResourceKind::WorkflowStepInstance, step_instance_id)
            })?;

        let _guard = self.lock_instance(owner.id).await;

        // reload under the lock
        let mut instance = self.get_instance(&owner.id).await?;
        let definition = self.load_definition(&instance.workflow_definition_id).await?;
        let expected = instance.version;

        if let Err(e) = mutate(&mut instance, &definition, Utc::now()) {
            warn!(
                instance_id = %instance.id,
                step_instance_id = %step_instance_id,
                error = %e,
                "Cannot {} workflow step",
                action
            );
            return Err(e);
        }

        self.commit(&mut instance, Some(expected), None).await?;

        instance
            .step_instance(step_instance_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(ResourceKind::WorkflowStepInstance, step_instance_id))
    }

    /// Apply the entity side effect, persist the instance and publish its
    /// events. A failed save restores the entity's previous status if the
    /// entity still carries the status applied here.
    async fn commit(
        &self,
        instance: &mut WorkflowInstance,
        expected_version: Option<u64>,
        entity_status: Option<EntityStatus>,
    ) -> Result<(), CoreError> {
        let previous_status = match &entity_status {
            Some(status) => {
                let previous = self.apply_entity_status(&instance.entity_id, status).await?;
                Some((status, previous))
            }
            None => None,
        };

        instance.version = expected_version.map_or(1, |v| v + 1);

        if let Err(e) = self.instance_repo.save(instance, expected_version).await {
            error!(instance_id = %instance.id, error = %e, "Failed to save workflow instance");
            if let Some((applied, previous)) = previous_status {
                self.restore_entity_status(&instance.entity_id, applied, &previous)
                    .await;
            }
            return Err(e);
        }

        self.handle_events(instance).await;
        Ok(())
    }

    async fn apply_entity_status(
        &self,
        entity_id: &EntityId,
        status: &EntityStatus,
    ) -> Result<EntityStatus, CoreError> {
        let entity = self
            .entity_store
            .get_entity(entity_id)
            .await?
            .ok_or_else(|| CoreError::not_found(ResourceKind::TrackedEntity, entity_id))?;

        self.entity_store
            .set_entity_status(entity_id, status)
            .await
            .map_err(|e| {
                warn!(entity_id = %entity_id, status = %status, error = %e, "Entity status update failed");
                e
            })?;

        debug!(
            entity_id = %entity_id,
            from = %entity.status,
            to = %status,
            "Entity status updated"
        );
        Ok(entity.status)
    }

    /// Put back `previous` unless someone moved the entity off `applied` since
    async fn restore_entity_status(
        &self,
        entity_id: &EntityId,
        applied: &EntityStatus,
        previous: &EntityStatus,
    ) {
        match self.entity_store.get_entity(entity_id).await {
            Ok(Some(entity)) if entity.status == *applied => {}
            Ok(current) => {
                warn!(
                    entity_id = %entity_id,
                    applied = %applied,
                    current = ?current.map(|e| e.status),
                    "Entity status changed concurrently, not restoring"
                );
                return;
            }
            Err(e) => {
                error!(entity_id = %entity_id, error = %e, "Cannot read entity for restore");
                return;
            }
        }

        if let Err(e) = self.entity_store.set_entity_status(entity_id, previous).await {
            error!(
                entity_id = %entity_id,
                status = %previous,
                error = %e,
                "Failed to restore entity status"
            );
        }
    }

    /// Handle domain events. The state change is already committed, so a
    /// handler failure is only logged.
    async fn handle_events(&self, instance: &mut WorkflowInstance) {
        for event in instance.take_events() {
            let event_type = event.event_type();
            if let Err(e) = self.event_handler.handle_event(event).await {
                error!(
                    instance_id = %instance.id,
                    event_type,
                    error = %e,
                    "Domain event handler failed"
                );
            }
        }
    }

    async fn load_definition(
        &self,
        id: &WorkflowDefinitionId,
    ) -> Result<WorkflowDefinition, CoreError> {
        self.definition_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found(ResourceKind::WorkflowDefinition, id))
    }

    async fn lock_instance(&self, id: WorkflowInstanceId) -> InstanceLock {
        InstanceLock::acquire(&self.instance_locks, id).await
    }
}

/// Held writer lock on one instance. Dropping the last holder removes the
/// entry from the lock table.
struct InstanceLock {
    id: WorkflowInstanceId,
    table: Arc<LockTable>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl InstanceLock {
    async fn acquire(table: &Arc<LockTable>, id: WorkflowInstanceId) -> Self {
        let lock = table
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        Self {
            id,
            table: table.clone(),
            guard: Some(guard),
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        // the table's own reference is the only one left when nobody waits
        self.table
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Clone implementation for WorkflowService
impl Clone for WorkflowService {
    fn clone(&self) -> Self {
        Self {
            instance_repo: self.instance_repo.clone(),
            definition_repo: self.definition_repo.clone(),
            entity_store: self.entity_store.clone(),
            event_handler: self.event_handler.clone(),
            instance_locks: self.instance_locks.clone(),
        }
    }
}

/// Handler for domain events
#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    /// Handle a domain event
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError>;
}

/// Event handler that writes every event to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventHandler;

#[async_trait]
impl DomainEventHandler for TracingEventHandler {
    async fn handle_event(&self, event: Box<dyn DomainEvent>) -> Result<(), CoreError> {
        info!(
            event_type = event.event_type(),
            instance_id = %event.workflow_instance_id(),
            timestamp = %event.timestamp(),
            "Domain event"
        );
        debug!(event = ?event, "Domain event payload");
        Ok(())
    }
}
