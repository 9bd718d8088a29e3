#![allow(dead_code)]

use std::sync::Arc;
use stockflow_core::{
    DefinitionService, EntityId, EntityStatus, TrackedEntity, TracingEventHandler,
    WorkflowDefinition, WorkflowService, WorkflowStep, WorkflowType,
};
use stockflow_state_inmemory::{InMemoryEntityStore, InMemoryStateStoreProvider};

pub struct Harness {
    pub provider: InMemoryStateStoreProvider,
    pub workflows: WorkflowService,
    pub definitions: DefinitionService,
    pub entities: Arc<InMemoryEntityStore>,
}

pub fn harness() -> Harness {
    let provider = InMemoryStateStoreProvider::new();
    let (instance_repo, definition_repo) = provider.create_repositories();
    let entities = provider.entity_store();

    let workflows = WorkflowService::new(
        instance_repo.clone(),
        definition_repo.clone(),
        entities.clone(),
        Arc::new(TracingEventHandler),
    );
    let definitions = DefinitionService::new(definition_repo, instance_repo);

    Harness {
        provider,
        workflows,
        definitions,
        entities,
    }
}

pub async fn vehicle(entities: &InMemoryEntityStore, status: &str) -> EntityId {
    let id = EntityId::new();
    entities
        .insert(TrackedEntity {
            id,
            status: EntityStatus::from(status),
        })
        .await;
    id
}

pub fn intake_definition() -> WorkflowDefinition {
    WorkflowDefinition::new("Standard intake", WorkflowType::Acquisition)
        .with_step(WorkflowStep::new("Inspect", 1))
        .with_step(WorkflowStep::new("Document", 2))
        .with_step(
            WorkflowStep::new("Approve", 3)
                .with_approval()
                .with_entity_status("InStock"),
        )
}

pub fn linear_definition(steps: u32) -> WorkflowDefinition {
    (1..=steps).fold(
        WorkflowDefinition::new("Linear", WorkflowType::Custom("Linear".to_string())),
        |definition, seq| definition.with_step(WorkflowStep::new(format!("Step {}", seq), seq)),
    )
}

/// A second workflow service over the same storage, with its own locks
pub fn harness_over(provider: &InMemoryStateStoreProvider) -> WorkflowService {
    let (instance_repo, definition_repo) = provider.create_repositories();
    WorkflowService::new(
        instance_repo,
        definition_repo,
        provider.entity_store(),
        Arc::new(TracingEventHandler),
    )
}
