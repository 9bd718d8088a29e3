//! Repair and detailing before a vehicle goes on the front line

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use stockflow_core::{
    EntityId, WorkflowInstance, WorkflowInstanceId, WorkflowStatus, WorkflowType,
    DEFAULT_PRIORITY,
};
use tracing::{debug, info};

use crate::{DefinitionChoice, InventoryContext, InventoryError, Vehicle, VehicleStatus};

const NO_ACTIVE_RECONDITIONING: &str = "No active reconditioning";

/// `start` plus a fractional number of hours, or `None` past the calendar's range
fn estimated_completion(start: DateTime<Utc>, hours: f64) -> Option<DateTime<Utc>> {
    // `as` saturates, so absurd durations land on the i64 bounds
    let millis = (hours * 3_600_000.0) as i64;
    Duration::try_milliseconds(millis).and_then(|d| start.checked_add_signed(d))
}

/// Where a vehicle stands in reconditioning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconditioningSummary {
    /// The vehicle
    pub vehicle_id: EntityId,
    /// Dealer stock number
    pub stock_number: String,
    /// Running reconditioning workflow, if any
    pub workflow_instance_id: Option<WorkflowInstanceId>,
    /// Human-readable progress
    pub current_status: String,
    /// Name of the current step
    pub current_step_name: Option<String>,
    /// Who works on the current step
    pub assigned_technician: Option<String>,
    /// Current step start plus its expected duration
    pub estimated_completion: Option<DateTime<Utc>>,
}

/// Drives vehicles through reconditioning
#[derive(Clone)]
pub struct ReconditioningService {
    context: InventoryContext,
}

impl ReconditioningService {
    /// Create the service
    pub fn new(context: InventoryContext) -> Self {
        Self { context }
    }

    /// Start reconditioning with the default definition and move the
    /// vehicle to `Reconditioning`
    pub async fn create_reconditioning_workflow(
        &self,
        vehicle_id: &EntityId,
    ) -> Result<WorkflowInstance, InventoryError> {
        let instance = self
            .context
            .start_workflow(
                vehicle_id,
                WorkflowType::Reconditioning,
                DefinitionChoice::DefaultOnly,
                DEFAULT_PRIORITY,
            )
            .await?;

        self.context
            .set_vehicle_status(vehicle_id, VehicleStatus::Reconditioning, None)
            .await?;
        Ok(instance)
    }

    /// Vehicles currently in reconditioning
    pub async fn vehicles_in_reconditioning(&self) -> Result<Vec<Vehicle>, InventoryError> {
        self.context
            .vehicles
            .find_by_status(&[VehicleStatus::Reconditioning])
            .await
    }

    /// The running reconditioning workflow of a vehicle
    pub async fn active_reconditioning_workflow(
        &self,
        vehicle_id: &EntityId,
    ) -> Result<Option<WorkflowInstance>, InventoryError> {
        self.context
            .active_workflow(vehicle_id, &WorkflowType::Reconditioning)
            .await
    }

    /// Summarize reconditioning progress of a vehicle
    pub async fn reconditioning_summary(
        &self,
        vehicle_id: &EntityId,
    ) -> Result<ReconditioningSummary, InventoryError> {
        let vehicle = self.context.vehicle(vehicle_id).await?;
        let mut summary = ReconditioningSummary {
            vehicle_id: vehicle.id,
            stock_number: vehicle.stock_number,
            workflow_instance_id: None,
            current_status: NO_ACTIVE_RECONDITIONING.to_string(),
            current_step_name: None,
            assigned_technician: None,
            estimated_completion: None,
        };

        let Some(workflow) = self.active_reconditioning_workflow(vehicle_id).await? else {
            debug!(vehicle_id = %vehicle_id, "No active reconditioning workflow");
            return Ok(summary);
        };
        summary.workflow_instance_id = Some(workflow.id);

        let Some(step) = workflow.current_step() else {
            summary.current_status = format!("Workflow Status: {}", workflow.status);
            return Ok(summary);
        };

        let definition = self.context.workflows.definition_for(&workflow).await?;
        let template = definition.step(&step.workflow_step_id);

        summary.current_status = format!("In Progress - {}", step.status);
        summary.current_step_name = template.map(|t| t.name.clone());
        summary.assigned_technician = step.assigned_to.clone();
        summary.estimated_completion = match (step.start_date, template) {
            (Some(start), Some(t)) => estimated_completion(start, t.expected_duration_hours),
            _ => None,
        };

        Ok(summary)
    }

    /// Finish reconditioning and put the vehicle on the front line.
    ///
    /// A running reconditioning workflow is completed first.
    pub async fn mark_ready_for_front_line(
        &self,
        vehicle_id: &EntityId,
        notes: Option<&str>,
    ) -> Result<Vehicle, InventoryError> {
        self.context.vehicle(vehicle_id).await?;

        if let Some(workflow) = self.active_reconditioning_workflow(vehicle_id).await? {
            self.context
                .workflows
                .update_instance_status(&workflow.id, WorkflowStatus::Completed)
                .await?;
            debug!(vehicle_id = %vehicle_id, instance_id = %workflow.id, "Reconditioning workflow completed");
        }

        let vehicle = self
            .context
            .set_vehicle_status(vehicle_id, VehicleStatus::FrontLine, notes)
            .await?;

        info!(vehicle_id = %vehicle_id, "Vehicle ready for front line");
        Ok(vehicle)
    }
}
