//! Inventory error type

use stockflow_core::{CoreError, EntityId, WorkflowType};
use thiserror::Error;

/// Errors raised by the inventory workflow services
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InventoryError {
    /// Engine refused or failed the operation
    #[error(transparent)]
    Workflow(#[from] CoreError),

    /// Unknown vehicle id
    #[error("Vehicle not found: {0}")]
    VehicleNotFound(EntityId),

    /// A second workflow of the same type was requested
    #[error("Vehicle {vehicle_id} already has an active {workflow_type} workflow")]
    WorkflowAlreadyActive {
        /// The vehicle
        vehicle_id: EntityId,
        /// Type of the running workflow
        workflow_type: WorkflowType,
    },

    /// No usable definition is configured for the type
    #[error("No {0} workflow definition found")]
    NoDefinition(WorkflowType),

    /// The operation needs a running workflow
    #[error("No active {workflow_type} workflow found for vehicle {vehicle_id}")]
    NoActiveWorkflow {
        /// The vehicle
        vehicle_id: EntityId,
        /// Expected workflow type
        workflow_type: WorkflowType,
    },

    /// Intake cannot finish before the vehicle is inspected
    #[error("Vehicle {0} must be inspected before intake can complete")]
    InspectionRequired(EntityId),

    /// Status string that is not a vehicle status
    #[error("Unknown vehicle status: {0}")]
    UnknownVehicleStatus(String),

    /// Missing or malformed input
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<InventoryError> for CoreError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Workflow(inner) => inner,
            InventoryError::VehicleNotFound(id) => {
                CoreError::not_found(stockflow_core::ResourceKind::TrackedEntity, id)
            }
            InventoryError::UnknownVehicleStatus(status) => {
                CoreError::ValidationError(format!("Unknown vehicle status: {}", status))
            }
            other => CoreError::EntityStoreError(other.to_string()),
        }
    }
}
