//!
//! Stockflow Inventory - vehicle workflows on top of the Stockflow engine
//!
//! Vehicles are the tracked entities of the engine. This crate maps vehicle
//! statuses onto engine statuses and provides the acquisition,
//! reconditioning and aging services used by the dealership.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod acquisition;
pub mod aging;
pub mod error;
pub mod inspection;
pub mod reconditioning;
pub mod vehicle;

pub use acquisition::{AcquisitionService, DocumentsUpdate};
pub use aging::{AgingManagementService, AGING_PRIORITY};
pub use error::InventoryError;
pub use inspection::{
    InMemoryInspectionStore, InspectionIssue, InspectionStatus, InspectionStore, IssueSeverity,
    VehicleInspection,
};
pub use reconditioning::{ReconditioningService, ReconditioningSummary};
pub use vehicle::{InMemoryVehicleStore, Vehicle, VehicleRepository, VehicleStatus};

use std::sync::Arc;
use stockflow_core::{
    DefinitionService, EntityId, WorkflowDefinition, WorkflowInstance, WorkflowService,
    WorkflowType,
};
use tracing::{info, warn};

/// Collaborators shared by the inventory services
#[derive(Clone)]
pub struct InventoryContext {
    /// Workflow orchestrator
    pub workflows: WorkflowService,
    /// Definition store
    pub definitions: DefinitionService,
    /// Vehicle storage
    pub vehicles: Arc<dyn VehicleRepository>,
}

/// How a service picks the definition for a new workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DefinitionChoice {
    /// Only the default definition of the type
    DefaultOnly,
    /// The default, else the first active definition by name
    DefaultOrFirstActive,
}

impl InventoryContext {
    /// Bundle the collaborators
    pub fn new(
        workflows: WorkflowService,
        definitions: DefinitionService,
        vehicles: Arc<dyn VehicleRepository>,
    ) -> Self {
        Self {
            workflows,
            definitions,
            vehicles,
        }
    }

    pub(crate) async fn vehicle(&self, id: &EntityId) -> Result<Vehicle, InventoryError> {
        self.vehicles
            .find_vehicle(id)
            .await?
            .ok_or(InventoryError::VehicleNotFound(*id))
    }

    pub(crate) async fn set_vehicle_status(
        &self,
        id: &EntityId,
        status: VehicleStatus,
        note: Option<&str>,
    ) -> Result<Vehicle, InventoryError> {
        let mut vehicle = self.vehicle(id).await?;
        let from = vehicle.status;
        vehicle.status = status;
        if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
            vehicle.append_note(note);
        }
        self.vehicles.save_vehicle(&vehicle).await?;

        info!(vehicle_id = %id, from = %from, to = %status, "Vehicle status changed");
        Ok(vehicle)
    }

    /// Newest active workflow of a type for a vehicle
    pub(crate) async fn active_workflow(
        &self,
        vehicle_id: &EntityId,
        workflow_type: &WorkflowType,
    ) -> Result<Option<WorkflowInstance>, InventoryError> {
        Ok(self
            .workflows
            .active_instances_for_entity_by_type(vehicle_id, workflow_type)
            .await?
            .into_iter()
            .next())
    }

    pub(crate) async fn require_active_workflow(
        &self,
        vehicle_id: &EntityId,
        workflow_type: &WorkflowType,
    ) -> Result<WorkflowInstance, InventoryError> {
        self.active_workflow(vehicle_id, workflow_type)
            .await?
            .ok_or_else(|| InventoryError::NoActiveWorkflow {
                vehicle_id: *vehicle_id,
                workflow_type: workflow_type.clone(),
            })
    }

    async fn pick_definition(
        &self,
        workflow_type: &WorkflowType,
        choice: DefinitionChoice,
    ) -> Result<WorkflowDefinition, InventoryError> {
        if let Some(definition) = self.definitions.default_definition(workflow_type).await? {
            return Ok(definition);
        }
        if choice == DefinitionChoice::DefaultOrFirstActive {
            if let Some(definition) = self
                .definitions
                .definitions_by_type(workflow_type, false)
                .await?
                .into_iter()
                .next()
            {
                return Ok(definition);
            }
        }
        Err(InventoryError::NoDefinition(workflow_type.clone()))
    }

    /// Start a workflow of `workflow_type` unless one is already running
    pub(crate) async fn start_workflow(
        &self,
        vehicle_id: &EntityId,
        workflow_type: WorkflowType,
        choice: DefinitionChoice,
        priority: u8,
    ) -> Result<WorkflowInstance, InventoryError> {
        self.vehicle(vehicle_id).await?;

        if let Some(existing) = self.active_workflow(vehicle_id, &workflow_type).await? {
            warn!(
                vehicle_id = %vehicle_id,
                instance_id = %existing.id,
                workflow_type = %workflow_type,
                "Vehicle already has an active workflow"
            );
            return Err(InventoryError::WorkflowAlreadyActive {
                vehicle_id: *vehicle_id,
                workflow_type,
            });
        }

        let definition = self.pick_definition(&workflow_type, choice).await?;
        let instance = self
            .workflows
            .create_instance(&definition.id, vehicle_id, priority)
            .await?;

        info!(
            vehicle_id = %vehicle_id,
            instance_id = %instance.id,
            definition_id = %definition.id,
            workflow_type = %workflow_type,
            "Vehicle workflow started"
        );
        Ok(instance)
    }
}
