#![allow(dead_code)]

use std::sync::Arc;
use stockflow_core::{
    DefinitionService, EntityId, TracingEventHandler, WorkflowDefinition, WorkflowService,
    WorkflowStep, WorkflowType,
};
use stockflow_inventory::{
    AcquisitionService, AgingManagementService, InMemoryInspectionStore, InMemoryVehicleStore,
    InventoryContext, ReconditioningService, Vehicle, VehicleRepository, VehicleStatus,
};
use stockflow_state_inmemory::InMemoryStateStoreProvider;

pub struct Harness {
    pub context: InventoryContext,
    pub vehicles: InMemoryVehicleStore,
    pub inspections: Arc<InMemoryInspectionStore>,
}

impl Harness {
    pub fn acquisition(&self) -> AcquisitionService {
        AcquisitionService::new(self.context.clone(), self.inspections.clone())
    }

    pub fn reconditioning(&self) -> ReconditioningService {
        ReconditioningService::new(self.context.clone())
    }

    pub fn aging(&self) -> AgingManagementService {
        AgingManagementService::new(self.context.clone())
    }

    pub fn workflows(&self) -> &WorkflowService {
        &self.context.workflows
    }

    pub fn definitions(&self) -> &DefinitionService {
        &self.context.definitions
    }

    pub async fn vehicle(&self, status: VehicleStatus) -> EntityId {
        let vehicle = Vehicle::new(format!("STK-{}", &EntityId::new().to_string()[..8]))
            .with_status(status);
        self.vehicles.save_vehicle(&vehicle).await.unwrap();
        vehicle.id
    }

    pub async fn vehicle_status(&self, id: &EntityId) -> VehicleStatus {
        self.vehicles.find_vehicle(id).await.unwrap().unwrap().status
    }

    pub async fn register(&self, definition: WorkflowDefinition) -> WorkflowDefinition {
        self.context
            .definitions
            .create_definition(definition)
            .await
            .unwrap()
    }
}

pub fn harness() -> Harness {
    let provider = InMemoryStateStoreProvider::new();
    let (instance_repo, definition_repo) = provider.create_repositories();
    let vehicles = InMemoryVehicleStore::new();

    let workflows = WorkflowService::new(
        instance_repo.clone(),
        definition_repo.clone(),
        Arc::new(vehicles.clone()),
        Arc::new(TracingEventHandler),
    );
    let definitions = DefinitionService::new(definition_repo, instance_repo);

    Harness {
        context: InventoryContext::new(workflows, definitions, Arc::new(vehicles.clone())),
        vehicles,
        inspections: Arc::new(InMemoryInspectionStore::new()),
    }
}

pub fn acquisition_definition() -> WorkflowDefinition {
    WorkflowDefinition::new("Standard acquisition", WorkflowType::Acquisition)
        .with_step(WorkflowStep::new("Vehicle Inspection", 1).with_expected_duration(2.0))
        .with_step(WorkflowStep::new("Document Collection", 2).with_expected_duration(4.0))
        .with_step(
            WorkflowStep::new("Manager Sign-off", 3)
                .with_approval()
                .with_responsible_party("Sales Manager"),
        )
        .as_default()
}

pub fn reconditioning_definition() -> WorkflowDefinition {
    WorkflowDefinition::new("Standard reconditioning", WorkflowType::Reconditioning)
        .with_step(
            WorkflowStep::new("Mechanical", 1)
                .with_expected_duration(8.0)
                .with_entity_status(VehicleStatus::Reconditioning),
        )
        .with_step(WorkflowStep::new("Detail", 2).with_expected_duration(4.0))
        .as_default()
}

pub fn aging_definition() -> WorkflowDefinition {
    WorkflowDefinition::new("Aging review", WorkflowType::AgingManagement)
        .with_step(WorkflowStep::new("Price review", 1).with_approval())
        .as_default()
}
