//! Vehicle intake: inspection, paperwork and sign-off

use std::sync::Arc;
use stockflow_core::{
    CoreError, EntityId, StepStatus, WorkflowInstance, WorkflowStatus, WorkflowType,
    DEFAULT_PRIORITY,
};
use tracing::{debug, info, warn};

use crate::{
    DefinitionChoice, InspectionStore, InventoryContext, InventoryError, Vehicle,
    VehicleInspection, VehicleStatus,
};

const INSPECTION_STEP: &str = "inspection";
const DOCUMENT_STEP: &str = "document";

/// What recording the intake paperwork did to the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentsUpdate {
    /// The document step was completed by this call
    pub step_completed: bool,
    /// The workflow moved on to its next step
    pub advanced: bool,
}

/// Drives vehicles through the acquisition workflow
#[derive(Clone)]
pub struct AcquisitionService {
    context: InventoryContext,
    inspections: Arc<dyn InspectionStore>,
}

impl AcquisitionService {
    /// Create the service
    pub fn new(context: InventoryContext, inspections: Arc<dyn InspectionStore>) -> Self {
        Self {
            context,
            inspections,
        }
    }

    /// Start intake for a vehicle.
    ///
    /// Uses the default acquisition definition, else the first active one.
    /// The vehicle is moved to `Receiving`.
    pub async fn create_acquisition_workflow(
        &self,
        vehicle_id: &EntityId,
    ) -> Result<WorkflowInstance, InventoryError> {
        let instance = self
            .context
            .start_workflow(
                vehicle_id,
                WorkflowType::Acquisition,
                DefinitionChoice::DefaultOrFirstActive,
                DEFAULT_PRIORITY,
            )
            .await?;

        let vehicle = self.context.vehicle(vehicle_id).await?;
        if vehicle.status != VehicleStatus::Receiving {
            self.context
                .set_vehicle_status(vehicle_id, VehicleStatus::Receiving, None)
                .await?;
        }

        Ok(instance)
    }

    /// The running acquisition workflow of a vehicle
    pub async fn active_acquisition_workflow(
        &self,
        vehicle_id: &EntityId,
    ) -> Result<Option<WorkflowInstance>, InventoryError> {
        self.context
            .active_workflow(vehicle_id, &WorkflowType::Acquisition)
            .await
    }

    /// Vehicles still arriving or being received
    pub async fn vehicles_in_acquisition(&self) -> Result<Vec<Vehicle>, InventoryError> {
        self.context
            .vehicles
            .find_by_status(&[VehicleStatus::InTransit, VehicleStatus::Receiving])
            .await
    }

    /// Store an inspection and move intake on.
    ///
    /// Completes the inspection step if it is still open. A failed
    /// inspection, or one with a critical issue, puts the workflow on hold;
    /// otherwise the workflow advances.
    pub async fn record_inspection(
        &self,
        inspection: VehicleInspection,
    ) -> Result<VehicleInspection, InventoryError> {
        let vehicle_id = inspection.vehicle_id;
        self.context.vehicle(&vehicle_id).await?;
        let workflow = self
            .context
            .require_active_workflow(&vehicle_id, &WorkflowType::Acquisition)
            .await?;

        self.inspections.save_inspection(&inspection).await?;
        info!(
            vehicle_id = %vehicle_id,
            inspection_id = %inspection.id,
            status = ?inspection.status,
            issues = inspection.issues.len(),
            "Vehicle inspection recorded"
        );

        let note = format!(
            "Inspection completed on {}. Status: {:?}",
            inspection.inspected_at.to_rfc3339(),
            inspection.status
        );
        if !self
            .complete_named_step(&workflow, INSPECTION_STEP, note)
            .await?
        {
            return Ok(inspection);
        }

        if inspection.requires_hold() {
            warn!(
                vehicle_id = %vehicle_id,
                instance_id = %workflow.id,
                "Inspection requires attention, putting intake on hold"
            );
            self.context
                .workflows
                .update_instance_status(&workflow.id, WorkflowStatus::OnHold)
                .await?;
        } else {
            self.advance_if_possible(&workflow).await?;
        }

        Ok(inspection)
    }

    /// The inspection of a vehicle, if any
    pub async fn inspection(
        &self,
        vehicle_id: &EntityId,
    ) -> Result<Option<VehicleInspection>, InventoryError> {
        self.inspections.find_by_vehicle(vehicle_id).await
    }

    /// Record the intake paperwork of a vehicle.
    ///
    /// Completes the document step and advances. A workflow that cannot
    /// advance, e.g. one on hold, keeps the completed step and reports
    /// `advanced: false`.
    pub async fn update_acquisition_documents(
        &self,
        vehicle_id: &EntityId,
        documents: &[String],
    ) -> Result<DocumentsUpdate, InventoryError> {
        if documents.is_empty() || documents.iter().any(|d| d.trim().is_empty()) {
            return Err(InventoryError::Validation(
                "at least one non-empty document reference is required".to_string(),
            ));
        }

        self.context.vehicle(vehicle_id).await?;
        let workflow = self
            .context
            .require_active_workflow(vehicle_id, &WorkflowType::Acquisition)
            .await?;

        let note = format!("Documents updated. Count: {}", documents.len());
        let step_completed = self
            .complete_named_step(&workflow, DOCUMENT_STEP, note)
            .await?;
        let advanced = step_completed && self.advance_if_possible(&workflow).await?;

        info!(
            vehicle_id = %vehicle_id,
            instance_id = %workflow.id,
            documents = documents.len(),
            step_completed,
            advanced,
            "Acquisition documents updated"
        );
        Ok(DocumentsUpdate {
            step_completed,
            advanced,
        })
    }

    /// Close intake.
    ///
    /// Requires an inspection. The workflow is completed regardless of open
    /// steps; the vehicle goes to `Reconditioning` when the inspection
    /// found serious problems and to `InStock` otherwise.
    pub async fn complete_intake(
        &self,
        vehicle_id: &EntityId,
        user: &str,
        notes: Option<&str>,
    ) -> Result<WorkflowInstance, InventoryError> {
        self.context.vehicle(vehicle_id).await?;
        let workflow = self
            .context
            .require_active_workflow(vehicle_id, &WorkflowType::Acquisition)
            .await?;

        let inspection = self
            .inspections
            .find_by_vehicle(vehicle_id)
            .await?
            .ok_or(InventoryError::InspectionRequired(*vehicle_id))?;

        let completed = self
            .context
            .workflows
            .update_instance_status(&workflow.id, WorkflowStatus::Completed)
            .await?;

        let status = if inspection.requires_reconditioning() {
            VehicleStatus::Reconditioning
        } else {
            VehicleStatus::InStock
        };
        let note = notes.map(|n| format!("Intake completed by {}: {}", user, n));
        self.context
            .set_vehicle_status(vehicle_id, status, note.as_deref())
            .await?;

        info!(
            vehicle_id = %vehicle_id,
            instance_id = %completed.id,
            user,
            status = %status,
            "Vehicle intake completed"
        );
        Ok(completed)
    }

    /// Complete the first step whose name contains `needle`, unless it is
    /// already completed. Returns whether a step was completed.
    async fn complete_named_step(
        &self,
        workflow: &WorkflowInstance,
        needle: &str,
        note: String,
    ) -> Result<bool, InventoryError> {
        let definition = self.context.workflows.definition_for(workflow).await?;
        let Some(template) = definition
            .steps
            .iter()
            .find(|s| s.name.to_lowercase().contains(needle))
        else {
            debug!(instance_id = %workflow.id, step = needle, "Definition has no such step");
            return Ok(false);
        };

        let Some(step) = workflow
            .step_instances
            .iter()
            .find(|s| s.workflow_step_id == template.id)
        else {
            return Ok(false);
        };
        if step.status == StepStatus::Completed {
            return Ok(false);
        }

        self.context
            .workflows
            .update_step_status(&step.id, StepStatus::Completed, Some(note))
            .await?;
        Ok(true)
    }

    /// Advance unless the workflow refuses to move. Returns whether it moved.
    async fn advance_if_possible(&self, workflow: &WorkflowInstance) -> Result<bool, InventoryError> {
        match self.context.workflows.advance(&workflow.id).await {
            Ok(_) => Ok(true),
            Err(err @ CoreError::InvalidState { .. }) => {
                warn!(instance_id = %workflow.id, error = %err, "Acquisition workflow not advanced");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }
}
