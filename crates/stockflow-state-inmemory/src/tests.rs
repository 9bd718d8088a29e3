use crate::InMemoryStateStoreProvider;
use chrono::Utc;
use pretty_assertions::assert_eq;
use stockflow_core::{
    domain::repository::{WorkflowDefinitionRepository, WorkflowInstanceRepository},
    CoreError, EntityId, EntityStatus, TrackedEntity, TrackedEntityStore, WorkflowDefinition,
    WorkflowInstance, WorkflowStatus, WorkflowStep, WorkflowType,
};

fn reconditioning_definition(name: &str) -> WorkflowDefinition {
    WorkflowDefinition::new(name, WorkflowType::Reconditioning)
        .with_step(WorkflowStep::new("Mechanical", 1).with_expected_duration(4.0))
        .with_step(WorkflowStep::new("Detail", 2).with_entity_status("FrontLine"))
}

fn new_instance(definition: &WorkflowDefinition, entity_id: EntityId) -> WorkflowInstance {
    let (mut instance, _) =
        WorkflowInstance::instantiate(definition, entity_id, 3, Utc::now()).unwrap();
    instance.version = 1;
    instance
}

#[tokio::test]
async fn test_workflow_instance_repository() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (instance_repo, definition_repo) = provider.create_repositories();

    let definition = reconditioning_definition("Standard recon");
    definition_repo.save(&definition).await?;
    let entity_id = EntityId::new();
    let instance = new_instance(&definition, entity_id);

    // Save new instance
    instance_repo.save(&instance, None).await?;

    // Find by ID
    let found = instance_repo.find_by_id(&instance.id).await?;
    assert_eq!(found.map(|i| i.id), Some(instance.id));

    // Find by step instance
    let step_id = instance.step_instances[1].id;
    let owner = instance_repo.find_by_step_instance(&step_id).await?;
    assert_eq!(owner.map(|i| i.id), Some(instance.id));

    // Find by entity and definition
    assert_eq!(instance_repo.find_by_entity(&entity_id).await?.len(), 1);
    assert_eq!(instance_repo.find_by_entity(&EntityId::new()).await?.len(), 0);
    assert_eq!(
        instance_repo.find_by_definition(&definition.id).await?.len(),
        1
    );

    Ok(())
}

#[tokio::test]
async fn test_instance_save_checks_version() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (instance_repo, definition_repo) = provider.create_repositories();

    let definition = reconditioning_definition("Standard recon");
    definition_repo.save(&definition).await?;
    let mut instance = new_instance(&definition, EntityId::new());
    instance_repo.save(&instance, None).await?;

    // Inserting the same instance twice is a conflict
    let err = instance_repo.save(&instance, None).await.unwrap_err();
    assert!(matches!(err, CoreError::ConcurrencyConflict { found: 1, .. }));

    // Writer that read version 1
    instance.version = 2;
    instance_repo.save(&instance, Some(1)).await?;

    // A second writer that also read version 1 loses
    let err = instance_repo.save(&instance, Some(1)).await.unwrap_err();
    assert_eq!(
        err,
        CoreError::ConcurrencyConflict {
            id: instance.id.to_string(),
            expected: 1,
            found: 2,
        }
    );

    // Updating an unknown instance
    let stranger = new_instance(&definition, EntityId::new());
    let err = instance_repo.save(&stranger, Some(1)).await.unwrap_err();
    assert!(err.is_not_found());

    Ok(())
}

#[tokio::test]
async fn test_workflow_definition_repository() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (_, definition_repo) = provider.create_repositories();

    let recon = reconditioning_definition("Standard recon");
    let aging = WorkflowDefinition::new("Aging review", WorkflowType::AgingManagement)
        .with_step(WorkflowStep::new("Review", 1));

    definition_repo.save_all(&[recon.clone(), aging.clone()]).await?;

    let found = definition_repo.find_by_id(&recon.id).await?;
    assert_eq!(found, Some(recon.clone()));
    assert_eq!(definition_repo.find_all().await?.len(), 2);

    let by_type = definition_repo
        .find_by_type(&WorkflowType::AgingManagement)
        .await?;
    assert_eq!(by_type.len(), 1);
    assert_eq!(by_type[0].id, aging.id);

    // Delete
    definition_repo.delete(&recon.id).await?;
    assert!(definition_repo.find_by_id(&recon.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_definition_delete_refused_while_referenced() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (instance_repo, definition_repo) = provider.create_repositories();

    let definition = reconditioning_definition("Standard recon");
    definition_repo.save(&definition).await?;
    let mut instance = new_instance(&definition, EntityId::new());
    instance_repo.save(&instance, None).await?;

    let err = definition_repo.delete(&definition.id).await.unwrap_err();
    assert!(err.is_invalid_state());
    assert!(definition_repo.find_by_id(&definition.id).await?.is_some());

    // Once the instance is finished the definition can go
    instance.set_status(WorkflowStatus::Completed, Utc::now())?;
    instance.version = 2;
    instance_repo.save(&instance, Some(1)).await?;
    definition_repo.delete(&definition.id).await?;
    assert!(definition_repo.find_by_id(&definition.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_instance_insert_requires_definition() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let (instance_repo, definition_repo) = provider.create_repositories();

    let definition = reconditioning_definition("Standard recon");
    definition_repo.save(&definition).await?;
    let instance = new_instance(&definition, EntityId::new());
    definition_repo.delete(&definition.id).await?;

    let err = instance_repo.save(&instance, None).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(instance_repo.find_by_id(&instance.id).await?.is_none());
    assert!(instance_repo
        .find_by_definition(&definition.id)
        .await?
        .is_empty());

    Ok(())
}

#[tokio::test]
async fn test_entity_store() -> Result<(), CoreError> {
    let provider = InMemoryStateStoreProvider::new();
    let store = provider.entity_store();
    let entity = TrackedEntity {
        id: EntityId::new(),
        status: EntityStatus::from("InTransit"),
    };
    store.insert(entity.clone()).await;

    store
        .set_entity_status(&entity.id, &EntityStatus::from("Receiving"))
        .await?;
    let stored = store.get_entity(&entity.id).await?.unwrap();
    assert_eq!(stored.status.as_str(), "Receiving");

    // The provider hands out views over the same storage
    let other_view = provider.entity_store();
    assert!(other_view.get_entity(&entity.id).await?.is_some());

    let err = store
        .set_entity_status(&EntityId::new(), &EntityStatus::from("InStock"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    Ok(())
}

#[test]
fn test_provider_create_repositories() {
    let provider = InMemoryStateStoreProvider::default();
    let (_instance_repo, _definition_repo) = provider.create_repositories();
    let _entities = provider.entity_store();

    // Blocking runtime for a quick sanity check
    let found = tokio_test::block_on(async {
        let (instance_repo, _) = provider.create_repositories();
        instance_repo
            .find_by_id(&stockflow_core::WorkflowInstanceId::new())
            .await
    });
    assert!(matches!(found, Ok(None)));
}
