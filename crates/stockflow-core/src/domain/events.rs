use crate::domain::definition::WorkflowDefinitionId;
use crate::domain::entity::EntityId;
use crate::domain::instance::{StepInstanceId, StepStatus, WorkflowInstanceId, WorkflowStatus};
use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Domain event trait for all events in the system
pub trait DomainEvent: Debug + Send + Sync {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the workflow instance ID this event is associated with
    fn workflow_instance_id(&self) -> &WorkflowInstanceId;

    /// Returns the timestamp when the event occurred
    fn timestamp(&self) -> DateTime<Utc>;
}

macro_rules! domain_event {
    ($event:ty, $name:literal) => {
        impl DomainEvent for $event {
            fn event_type(&self) -> &'static str {
                $name
            }

            fn workflow_instance_id(&self) -> &WorkflowInstanceId {
                &self.workflow_instance_id
            }

            fn timestamp(&self) -> DateTime<Utc> {
                self.timestamp
            }
        }
    };
}

/// Event: Workflow instance created
#[derive(Debug)]
pub struct InstanceCreated {
    /// The instance
    pub workflow_instance_id: WorkflowInstanceId,
    /// The definition it runs
    pub workflow_definition_id: WorkflowDefinitionId,
    /// The entity it drives
    pub entity_id: EntityId,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(InstanceCreated, "workflow_instance.created");

/// Event: A step became the current step
#[derive(Debug)]
pub struct StepStarted {
    /// The instance
    pub workflow_instance_id: WorkflowInstanceId,
    /// The step instance
    pub step_instance_id: StepInstanceId,
    /// Sequence number of the step
    pub sequence_number: u32,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(StepStarted, "workflow_step.started");

/// Event: A step is blocked on an approval gate
#[derive(Debug)]
pub struct StepAwaitingApproval {
    /// The instance
    pub workflow_instance_id: WorkflowInstanceId,
    /// The step instance
    pub step_instance_id: StepInstanceId,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(StepAwaitingApproval, "workflow_step.awaiting_approval");

/// Event: An approver released a gate
#[derive(Debug)]
pub struct StepApproved {
    /// The instance
    pub workflow_instance_id: WorkflowInstanceId,
    /// The step instance
    pub step_instance_id: StepInstanceId,
    /// Approver user id
    pub approver: String,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(StepApproved, "workflow_step.approved");

/// Event: An approver rejected a gate
#[derive(Debug)]
pub struct StepRejected {
    /// The instance
    pub workflow_instance_id: WorkflowInstanceId,
    /// The step instance
    pub step_instance_id: StepInstanceId,
    /// Approver user id
    pub approver: String,
    /// Rejection reason
    pub notes: String,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(StepRejected, "workflow_step.rejected");

/// Event: A step finished
#[derive(Debug)]
pub struct StepCompleted {
    /// The instance
    pub workflow_instance_id: WorkflowInstanceId,
    /// The step instance
    pub step_instance_id: StepInstanceId,
    /// Hours between start and completion, if the step was started
    pub duration_hours: Option<f64>,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(StepCompleted, "workflow_step.completed");

/// Event: A step was handed to a user
#[derive(Debug)]
pub struct StepAssigned {
    /// The instance
    pub workflow_instance_id: WorkflowInstanceId,
    /// The step instance
    pub step_instance_id: StepInstanceId,
    /// Assignee user id
    pub assignee: String,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(StepAssigned, "workflow_step.assigned");

/// Event: A step status was set directly, outside of advance
#[derive(Debug)]
pub struct StepStatusOverridden {
    /// The instance
    pub workflow_instance_id: WorkflowInstanceId,
    /// The step instance
    pub step_instance_id: StepInstanceId,
    /// Previous status
    pub from: StepStatus,
    /// New status
    pub to: StepStatus,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(StepStatusOverridden, "workflow_step.status_overridden");

/// Event: The instance status changed
#[derive(Debug)]
pub struct InstanceStatusChanged {
    /// The instance
    pub workflow_instance_id: WorkflowInstanceId,
    /// Previous status
    pub from: WorkflowStatus,
    /// New status
    pub to: WorkflowStatus,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(InstanceStatusChanged, "workflow_instance.status_changed");

/// Event: The instance reached its terminal state
#[derive(Debug)]
pub struct InstanceCompleted {
    /// The instance
    pub workflow_instance_id: WorkflowInstanceId,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

domain_event!(InstanceCompleted, "workflow_instance.completed");
