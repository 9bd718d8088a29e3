//! Repository traits for the workflow engine
//!
//! The engine only talks to storage through these traits. External crates
//! implement them to provide different persistence mechanisms; the
//! `stockflow-state-inmemory` crate ships the in-process one.

use async_trait::async_trait;

use super::definition::{WorkflowDefinition, WorkflowDefinitionId, WorkflowType};
use super::entity::EntityId;
use super::instance::{StepInstanceId, WorkflowInstance, WorkflowInstanceId};
use crate::CoreError;

/// Repository for workflow definitions and their step templates
#[async_trait]
pub trait WorkflowDefinitionRepository: Send + Sync {
    /// Find a definition by ID
    async fn find_by_id(
        &self,
        id: &WorkflowDefinitionId,
    ) -> Result<Option<WorkflowDefinition>, CoreError>;

    /// Get all definitions, active or not
    async fn find_all(&self) -> Result<Vec<WorkflowDefinition>, CoreError>;

    /// Get all definitions of one workflow type
    async fn find_by_type(
        &self,
        workflow_type: &WorkflowType,
    ) -> Result<Vec<WorkflowDefinition>, CoreError>;

    /// Insert or replace a definition together with its steps
    async fn save(&self, definition: &WorkflowDefinition) -> Result<(), CoreError>;

    /// Insert or replace several definitions in one atomic write
    async fn save_all(&self, definitions: &[WorkflowDefinition]) -> Result<(), CoreError>;

    /// Delete a definition and its steps.
    ///
    /// Fails with `InvalidState` while any active instance references the
    /// definition. The check and the removal happen under the same guard
    /// that instance inserts take, so no instance can be started against a
    /// definition that is being deleted.
    async fn delete(&self, id: &WorkflowDefinitionId) -> Result<(), CoreError>;
}

/// Repository for workflow instances and their step instances
#[async_trait]
pub trait WorkflowInstanceRepository: Send + Sync {
    /// Find an instance by ID
    async fn find_by_id(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<Option<WorkflowInstance>, CoreError>;

    /// Find the instance owning a step instance
    async fn find_by_step_instance(
        &self,
        step_instance_id: &StepInstanceId,
    ) -> Result<Option<WorkflowInstance>, CoreError>;

    /// Find all instances driving an entity
    async fn find_by_entity(&self, entity_id: &EntityId)
        -> Result<Vec<WorkflowInstance>, CoreError>;

    /// Find all instances of a definition
    async fn find_by_definition(
        &self,
        definition_id: &WorkflowDefinitionId,
    ) -> Result<Vec<WorkflowInstance>, CoreError>;

    /// Persist an instance.
    ///
    /// `expected_version` is `None` for a new instance, which must not exist
    /// yet, and its definition must still exist or the save fails with
    /// `NotFound`. Otherwise the stored version must equal it, or the save fails with
    /// `ConcurrencyConflict`. The instance is stored with its own `version`.
    async fn save(
        &self,
        instance: &WorkflowInstance,
        expected_version: Option<u64>,
    ) -> Result<(), CoreError>;
}
