mod common;

use chrono::Duration;
use common::{harness, reconditioning_definition};
use pretty_assertions::assert_eq;
use stockflow_core::{
    DefinitionUpdate, WorkflowDefinition, WorkflowStatus, WorkflowStep, WorkflowType,
    DEFAULT_PRIORITY,
};
use stockflow_inventory::{InventoryError, VehicleRepository, VehicleStatus};

#[tokio::test]
async fn test_create_requires_default_definition() {
    let h = harness();
    let definition = h
        .register({
            let mut d = reconditioning_definition();
            d.is_default = false;
            d
        })
        .await;
    let vehicle_id = h.vehicle(VehicleStatus::InStock).await;
    let reconditioning = h.reconditioning();

    let err = reconditioning
        .create_reconditioning_workflow(&vehicle_id)
        .await
        .unwrap_err();
    assert_eq!(err, InventoryError::NoDefinition(WorkflowType::Reconditioning));

    h.definitions()
        .update_definition(
            &definition.id,
            DefinitionUpdate {
                is_default: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let instance = reconditioning
        .create_reconditioning_workflow(&vehicle_id)
        .await
        .unwrap();
    assert_eq!(instance.priority, DEFAULT_PRIORITY);
    assert_eq!(
        h.vehicle_status(&vehicle_id).await,
        VehicleStatus::Reconditioning
    );

    let err = reconditioning
        .create_reconditioning_workflow(&vehicle_id)
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::WorkflowAlreadyActive { .. }));
}

#[tokio::test]
async fn test_summary() {
    let h = harness();
    h.register(reconditioning_definition()).await;
    let vehicle_id = h.vehicle(VehicleStatus::InStock).await;
    let reconditioning = h.reconditioning();

    let summary = reconditioning
        .reconditioning_summary(&vehicle_id)
        .await
        .unwrap();
    assert_eq!(summary.current_status, "No active reconditioning");
    assert_eq!(summary.workflow_instance_id, None);

    let instance = reconditioning
        .create_reconditioning_workflow(&vehicle_id)
        .await
        .unwrap();

    let summary = reconditioning
        .reconditioning_summary(&vehicle_id)
        .await
        .unwrap();
    assert_eq!(summary.workflow_instance_id, Some(instance.id));
    assert_eq!(summary.current_status, "Workflow Status: NotStarted");
    assert_eq!(summary.current_step_name, None);

    let step = h.workflows().advance(&instance.id).await.unwrap().unwrap();
    h.workflows().assign_step(&step.id, "tech-7").await.unwrap();

    let summary = reconditioning
        .reconditioning_summary(&vehicle_id)
        .await
        .unwrap();
    assert_eq!(summary.current_status, "In Progress - InProgress");
    assert_eq!(summary.current_step_name.as_deref(), Some("Mechanical"));
    assert_eq!(summary.assigned_technician.as_deref(), Some("tech-7"));
    assert_eq!(
        summary.estimated_completion,
        step.start_date.map(|start| start + Duration::hours(8))
    );
}

#[tokio::test]
async fn test_summary_with_unbounded_estimate() {
    let h = harness();
    h.register(
        WorkflowDefinition::new("Restoration", WorkflowType::Reconditioning)
            .with_step(WorkflowStep::new("Frame-off rebuild", 1).with_expected_duration(1e15))
            .as_default(),
    )
    .await;
    let vehicle_id = h.vehicle(VehicleStatus::InStock).await;
    let reconditioning = h.reconditioning();

    let instance = reconditioning
        .create_reconditioning_workflow(&vehicle_id)
        .await
        .unwrap();
    h.workflows().advance(&instance.id).await.unwrap();

    let summary = reconditioning
        .reconditioning_summary(&vehicle_id)
        .await
        .unwrap();
    assert_eq!(summary.current_step_name.as_deref(), Some("Frame-off rebuild"));
    assert_eq!(summary.estimated_completion, None);
}

#[tokio::test]
async fn test_mark_ready_for_front_line() {
    let h = harness();
    h.register(reconditioning_definition()).await;
    let vehicle_id = h.vehicle(VehicleStatus::InStock).await;
    let reconditioning = h.reconditioning();

    let instance = reconditioning
        .create_reconditioning_workflow(&vehicle_id)
        .await
        .unwrap();
    h.workflows().advance(&instance.id).await.unwrap();

    let vehicle = reconditioning
        .mark_ready_for_front_line(&vehicle_id, Some("detailed and photographed"))
        .await
        .unwrap();
    assert_eq!(vehicle.status, VehicleStatus::FrontLine);
    assert_eq!(vehicle.notes.as_deref(), Some("detailed and photographed"));

    let stored = h.vehicles.find_vehicle(&vehicle_id).await.unwrap().unwrap();
    assert_eq!(stored, vehicle);

    let done = h.workflows().get_instance(&instance.id).await.unwrap();
    assert_eq!(done.status, WorkflowStatus::Completed);
    assert!(reconditioning
        .active_reconditioning_workflow(&vehicle_id)
        .await
        .unwrap()
        .is_none());

    // nothing running: only the vehicle moves
    let vehicle = reconditioning
        .mark_ready_for_front_line(&vehicle_id, None)
        .await
        .unwrap();
    assert_eq!(vehicle.status, VehicleStatus::FrontLine);
}

#[tokio::test]
async fn test_vehicles_in_reconditioning() {
    let h = harness();
    h.register(reconditioning_definition()).await;
    let vehicle_id = h.vehicle(VehicleStatus::InStock).await;
    h.vehicle(VehicleStatus::FrontLine).await;
    let reconditioning = h.reconditioning();

    assert!(reconditioning
        .vehicles_in_reconditioning()
        .await
        .unwrap()
        .is_empty());

    reconditioning
        .create_reconditioning_workflow(&vehicle_id)
        .await
        .unwrap();
    let listed = reconditioning.vehicles_in_reconditioning().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, vehicle_id);

    reconditioning
        .mark_ready_for_front_line(&vehicle_id, None)
        .await
        .unwrap();
    assert!(reconditioning
        .vehicles_in_reconditioning()
        .await
        .unwrap()
        .is_empty());
}
