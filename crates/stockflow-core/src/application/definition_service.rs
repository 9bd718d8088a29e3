use crate::{
    domain::definition::{
        DefinitionUpdate, WorkflowDefinition, WorkflowDefinitionId, WorkflowStep, WorkflowType,
    },
    domain::repository::{WorkflowDefinitionRepository, WorkflowInstanceRepository},
    error::ResourceKind,
    CoreError,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Service for managing workflow definitions
pub struct DefinitionService {
    /// Repository for workflow definitions
    definition_repo: Arc<dyn WorkflowDefinitionRepository>,

    /// Repository for workflow instances
    instance_repo: Arc<dyn WorkflowInstanceRepository>,

    /// Serializes writers so the default flag is switched atomically
    write_lock: Arc<Mutex<()>>,
}

impl DefinitionService {
    /// Create a new definition service
    pub fn new(
        definition_repo: Arc<dyn WorkflowDefinitionRepository>,
        instance_repo: Arc<dyn WorkflowInstanceRepository>,
    ) -> Self {
        Self {
            definition_repo,
            instance_repo,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Register a new definition
    pub async fn create_definition(
        &self,
        mut definition: WorkflowDefinition,
    ) -> Result<WorkflowDefinition, CoreError> {
        definition.sort_steps();
        definition.validate()?;

        let _guard = self.write_lock.lock().await;

        if self
            .definition_repo
            .find_by_id(&definition.id)
            .await?
            .is_some()
        {
            return Err(CoreError::ValidationError(format!(
                "Workflow definition {} already exists",
                definition.id
            )));
        }

        self.save_with_default_switch(&definition).await?;

        info!(
            definition_id = %definition.id,
            workflow_type = %definition.workflow_type,
            steps = definition.steps.len(),
            is_default = definition.is_default,
            "Workflow definition created"
        );

        Ok(definition)
    }

    /// Change header fields of a definition
    pub async fn update_definition(
        &self,
        id: &WorkflowDefinitionId,
        update: DefinitionUpdate,
    ) -> Result<WorkflowDefinition, CoreError> {
        let _guard = self.write_lock.lock().await;

        let mut definition = self.get_definition(id).await?;
        update.apply_to(&mut definition);
        definition.validate()?;

        self.save_with_default_switch(&definition).await?;

        info!(
            definition_id = %definition.id,
            is_active = definition.is_active,
            is_default = definition.is_default,
            "Workflow definition updated"
        );

        Ok(definition)
    }

    /// Append a step template to a definition
    pub async fn add_step(
        &self,
        definition_id: &WorkflowDefinitionId,
        step: WorkflowStep,
    ) -> Result<WorkflowStep, CoreError> {
        let _guard = self.write_lock.lock().await;

        let mut definition = self.get_definition(definition_id).await?;
        self.ensure_no_active_instances(&definition, "steps cannot be added")
            .await?;

        let step_id = step.id;
        definition.push_step(step);
        definition.updated_at = Utc::now();
        definition.validate()?;
        self.definition_repo.save(&definition).await?;

        let step = definition
            .step(&step_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(ResourceKind::WorkflowStep, step_id))?;

        info!(
            definition_id = %definition.id,
            step_id = %step.id,
            sequence_number = step.sequence_number,
            "Workflow step added"
        );

        Ok(step)
    }

    /// Replace an existing step template
    pub async fn update_step(&self, step: WorkflowStep) -> Result<WorkflowStep, CoreError> {
        let _guard = self.write_lock.lock().await;

        let mut definition = self.get_definition(&step.workflow_definition_id).await?;
        let slot = definition
            .steps
            .iter_mut()
            .find(|s| s.id == step.id)
            .ok_or_else(|| CoreError::not_found(ResourceKind::WorkflowStep, step.id))?;
        *slot = step.clone();

        self.ensure_no_active_instances(&definition, "steps cannot be changed")
            .await?;

        definition.sort_steps();
        definition.updated_at = Utc::now();
        definition.validate()?;
        self.definition_repo.save(&definition).await?;

        info!(
            definition_id = %definition.id,
            step_id = %step.id,
            "Workflow step updated"
        );

        Ok(step)
    }

    /// Get a definition by ID
    pub async fn get_definition(
        &self,
        id: &WorkflowDefinitionId,
    ) -> Result<WorkflowDefinition, CoreError> {
        debug!(definition_id = %id, "Loading workflow definition");
        self.definition_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found(ResourceKind::WorkflowDefinition, id))
    }

    /// List definitions ordered by workflow type, then name
    pub async fn list_definitions(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<WorkflowDefinition>, CoreError> {
        let mut definitions: Vec<_> = self
            .definition_repo
            .find_all()
            .await?
            .into_iter()
            .filter(|d| include_inactive || d.is_active)
            .collect();

        definitions.sort_by(|a, b| {
            a.workflow_type
                .cmp(&b.workflow_type)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(definitions)
    }

    /// List definitions of one type ordered by name
    pub async fn definitions_by_type(
        &self,
        workflow_type: &WorkflowType,
        include_inactive: bool,
    ) -> Result<Vec<WorkflowDefinition>, CoreError> {
        let mut definitions: Vec<_> = self
            .definition_repo
            .find_by_type(workflow_type)
            .await?
            .into_iter()
            .filter(|d| include_inactive || d.is_active)
            .collect();

        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(definitions)
    }

    /// The active default definition of a type, if one is set
    pub async fn default_definition(
        &self,
        workflow_type: &WorkflowType,
    ) -> Result<Option<WorkflowDefinition>, CoreError> {
        Ok(self
            .definition_repo
            .find_by_type(workflow_type)
            .await?
            .into_iter()
            .find(|d| d.is_default && d.is_active))
    }

    /// Delete a definition that no active instance uses
    pub async fn delete_definition(&self, id: &WorkflowDefinitionId) -> Result<(), CoreError> {
        let _guard = self.write_lock.lock().await;

        let definition = self.get_definition(id).await?;
        self.ensure_no_active_instances(&definition, "definition is in use")
            .await?;

        self.definition_repo.delete(id).await?;

        info!(definition_id = %id, "Workflow definition deleted");
        Ok(())
    }

    /// Save `definition` and, when it is the default, clear the flag on its
    /// siblings in the same write
    async fn save_with_default_switch(
        &self,
        definition: &WorkflowDefinition,
    ) -> Result<(), CoreError> {
        if !definition.is_default {
            return self.definition_repo.save(definition).await;
        }

        let now = Utc::now();
        let mut batch = vec![definition.clone()];
        for mut sibling in self
            .definition_repo
            .find_by_type(&definition.workflow_type)
            .await?
        {
            if sibling.id != definition.id && sibling.is_default {
                debug!(
                    definition_id = %sibling.id,
                    "Clearing previous default workflow definition"
                );
                sibling.is_default = false;
                sibling.updated_at = now;
                batch.push(sibling);
            }
        }

        self.definition_repo.save_all(&batch).await
    }

    async fn ensure_no_active_instances(
        &self,
        definition: &WorkflowDefinition,
        reason: &str,
    ) -> Result<(), CoreError> {
        let active = self
            .instance_repo
            .find_by_definition(&definition.id)
            .await?
            .iter()
            .filter(|i| i.is_active())
            .count();

        if active > 0 {
            warn!(
                definition_id = %definition.id,
                active_instances = active,
                "Refusing to modify workflow definition with active instances"
            );
            return Err(CoreError::invalid_state(
                ResourceKind::WorkflowDefinition,
                definition.id,
                "InUse",
                format!("{}: {} active instance(s)", reason, active),
            ));
        }
        Ok(())
    }
}

/// Clone implementation for DefinitionService
impl Clone for DefinitionService {
    fn clone(&self) -> Self {
        Self {
            definition_repo: self.definition_repo.clone(),
            instance_repo: self.instance_repo.clone(),
            write_lock: self.write_lock.clone(),
        }
    }
}
