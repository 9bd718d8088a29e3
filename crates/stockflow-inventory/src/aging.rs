//! Handling of vehicles that sit in stock too long

use stockflow_core::{EntityId, WorkflowInstance, WorkflowType};

use crate::{DefinitionChoice, InventoryContext, InventoryError};

/// Aging workflows outrank the default priority
pub const AGING_PRIORITY: u8 = 2;

/// Starts and looks up aging-management workflows
#[derive(Clone)]
pub struct AgingManagementService {
    context: InventoryContext,
}

impl AgingManagementService {
    /// Create the service
    pub fn new(context: InventoryContext) -> Self {
        Self { context }
    }

    /// Start aging management with the default definition
    pub async fn create_aging_workflow(
        &self,
        vehicle_id: &EntityId,
    ) -> Result<WorkflowInstance, InventoryError> {
        self.context
            .start_workflow(
                vehicle_id,
                WorkflowType::AgingManagement,
                DefinitionChoice::DefaultOnly,
                AGING_PRIORITY,
            )
            .await
    }

    /// The running aging workflow of a vehicle
    pub async fn active_aging_workflow(
        &self,
        vehicle_id: &EntityId,
    ) -> Result<Option<WorkflowInstance>, InventoryError> {
        self.context
            .active_workflow(vehicle_id, &WorkflowType::AgingManagement)
            .await
    }
}
