use crate::domain::definition::{
    WorkflowDefinition, WorkflowDefinitionId, WorkflowStep, WorkflowStepId, WorkflowType,
};
use crate::domain::entity::{EntityId, EntityStatus};
use crate::domain::events::{
    DomainEvent, InstanceCompleted, InstanceCreated, InstanceStatusChanged, StepApproved,
    StepAssigned, StepAwaitingApproval, StepCompleted, StepRejected, StepStarted,
    StepStatusOverridden,
};
use crate::error::ResourceKind;
use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Most urgent priority
pub const HIGHEST_PRIORITY: u8 = 1;

/// Least urgent priority
pub const LOWEST_PRIORITY: u8 = 5;

/// Priority used when a caller has no opinion
pub const DEFAULT_PRIORITY: u8 = 3;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Value object: Workflow instance ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowInstanceId(pub Uuid);

impl WorkflowInstanceId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowInstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Value object: Step instance ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepInstanceId(pub Uuid);

impl StepInstanceId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StepInstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StepInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Workflow instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStatus {
    /// Created, no step started yet
    NotStarted,

    /// A step has been started
    InProgress,

    /// Paused by an operator or a failed inspection
    OnHold,

    /// Terminal
    Completed,
}

impl WorkflowStatus {
    /// Anything but `Completed`
    #[inline]
    pub fn is_active(self) -> bool {
        self != WorkflowStatus::Completed
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Step instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    /// Waiting its turn
    NotStarted,

    /// Being worked on
    InProgress,

    /// Work done, blocked on an approver
    WaitingForApproval,

    /// Approver released the gate; completes on the next advance
    Approved,

    /// Approver refused the gate
    Rejected,

    /// Done
    Completed,
}

impl StepStatus {
    /// Statuses that make a step the current step of its instance
    #[inline]
    pub fn is_current(self) -> bool {
        matches!(
            self,
            StepStatus::InProgress | StepStatus::WaitingForApproval | StepStatus::Approved
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Execution record of one template step inside an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStepInstance {
    /// Step instance id
    pub id: StepInstanceId,

    /// Owning instance
    pub workflow_instance_id: WorkflowInstanceId,

    /// Template step this record executes
    pub workflow_step_id: WorkflowStepId,

    /// Copied from the template, used for ordering
    pub sequence_number: u32,

    /// Current status
    pub status: StepStatus,

    /// Set when the step enters `InProgress`
    pub start_date: Option<DateTime<Utc>>,

    /// Set when the step completes
    pub completion_date: Option<DateTime<Utc>>,

    /// Hours between start and completion
    pub actual_duration_hours: Option<f64>,

    /// Assignee user id
    pub assigned_to: Option<String>,

    /// Approver (or rejecter) user id
    pub approved_by: Option<String>,

    /// When the gate was decided
    pub approval_date: Option<DateTime<Utc>>,

    /// Free-form notes
    pub notes: Option<String>,
}

impl WorkflowStepInstance {
    fn for_step(workflow_instance_id: WorkflowInstanceId, step: &WorkflowStep) -> Self {
        Self {
            id: StepInstanceId::new(),
            workflow_instance_id,
            workflow_step_id: step.id,
            sequence_number: step.sequence_number,
            status: StepStatus::NotStarted,
            start_date: None,
            completion_date: None,
            actual_duration_hours: None,
            assigned_to: None,
            approved_by: None,
            approval_date: None,
            notes: None,
        }
    }

    /// Whether this step is the one being worked on
    #[inline]
    pub fn is_current(&self) -> bool {
        self.status.is_current()
    }

    fn start(&mut self, now: DateTime<Utc>) {
        self.status = StepStatus::InProgress;
        self.start_date = Some(now);
    }

    fn complete(&mut self, now: DateTime<Utc>) {
        self.status = StepStatus::Completed;
        self.completion_date = Some(now);
        self.actual_duration_hours = self.start_date.map(|start| hours_between(start, now));
    }
}

/// Fractional hours between two instants
pub fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / MILLIS_PER_HOUR
}

/// Check that a priority is within 1..=5
pub fn validate_priority(priority: u8) -> Result<(), CoreError> {
    if !(HIGHEST_PRIORITY..=LOWEST_PRIORITY).contains(&priority) {
        return Err(CoreError::ValidationError(format!(
            "Priority must be between {} and {}, got {}",
            HIGHEST_PRIORITY, LOWEST_PRIORITY, priority
        )));
    }
    Ok(())
}

/// Outcome of an aggregate transition the caller still has to act on
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// The new current step, `None` once the workflow is complete
    pub current: Option<StepInstanceId>,

    /// Status to apply to the tracked entity, if the transition carries one
    pub entity_status: Option<EntityStatus>,
}

/// Aggregate: Workflow instance
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique identifier
    pub id: WorkflowInstanceId,

    /// Definition this instance runs
    pub workflow_definition_id: WorkflowDefinitionId,

    /// Copied from the definition at creation
    pub workflow_type: WorkflowType,

    /// Entity driven by this instance
    pub entity_id: EntityId,

    /// Current status
    pub status: WorkflowStatus,

    /// Creation timestamp
    pub start_date: DateTime<Utc>,

    /// Set once the instance completes
    pub completion_date: Option<DateTime<Utc>>,

    /// 1 (most urgent) to 5
    pub priority: u8,

    /// One record per template step, in sequence order
    pub step_instances: Vec<WorkflowStepInstance>,

    /// Optimistic concurrency counter, bumped on every save
    pub version: u64,

    /// Domain events
    #[serde(skip)]
    pub events: Vec<Box<dyn DomainEvent>>,
}

impl Clone for WorkflowInstance {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            workflow_definition_id: self.workflow_definition_id,
            workflow_type: self.workflow_type.clone(),
            entity_id: self.entity_id,
            status: self.status,
            start_date: self.start_date,
            completion_date: self.completion_date,
            priority: self.priority,
            step_instances: self.step_instances.clone(),
            version: self.version,
            events: Vec::new(), // events are not cloned
        }
    }
}

impl WorkflowInstance {
    /// Materialize an instance of `definition` for `entity_id`.
    ///
    /// Every template step gets a `NotStarted` step instance, in sequence
    /// order. The returned transition carries the first step's associated
    /// entity status, if any; no step is started.
    pub fn instantiate(
        definition: &WorkflowDefinition,
        entity_id: EntityId,
        priority: u8,
        now: DateTime<Utc>,
    ) -> Result<(Self, Transition), CoreError> {
        validate_priority(priority)?;

        if !definition.is_active {
            return Err(CoreError::invalid_state(
                ResourceKind::WorkflowDefinition,
                definition.id,
                "Inactive",
                "inactive definitions cannot be instantiated",
            ));
        }

        let Some(first) = definition.first_step() else {
            return Err(CoreError::invalid_state(
                ResourceKind::WorkflowDefinition,
                definition.id,
                "Empty",
                "definition has no steps",
            ));
        };

        let id = WorkflowInstanceId::new();
        let mut templates: Vec<&WorkflowStep> = definition.steps.iter().collect();
        templates.sort_by_key(|s| s.sequence_number);

        let mut instance = Self {
            id,
            workflow_definition_id: definition.id,
            workflow_type: definition.workflow_type.clone(),
            entity_id,
            status: WorkflowStatus::NotStarted,
            start_date: now,
            completion_date: None,
            priority,
            step_instances: templates
                .into_iter()
                .map(|step| WorkflowStepInstance::for_step(id, step))
                .collect(),
            version: 0,
            events: Vec::with_capacity(4),
        };

        instance.record_event(Box::new(InstanceCreated {
            workflow_instance_id: id,
            workflow_definition_id: definition.id,
            entity_id,
            timestamp: now,
        }));

        let transition = Transition {
            current: None,
            entity_status: first.associated_entity_status.clone(),
        };

        Ok((instance, transition))
    }

    /// Move the instance one step forward.
    ///
    /// Completes the current step (or parks it at its approval gate) and
    /// starts the next one. Completes the instance when no step is left.
    pub fn advance(
        &mut self,
        definition: &WorkflowDefinition,
        now: DateTime<Utc>,
    ) -> Result<Transition, CoreError> {
        if !matches!(
            self.status,
            WorkflowStatus::NotStarted | WorkflowStatus::InProgress
        ) {
            return Err(CoreError::invalid_state(
                ResourceKind::WorkflowInstance,
                self.id,
                self.status,
                "only NotStarted or InProgress workflows can advance",
            ));
        }

        if let Some(rejected) = self
            .step_instances
            .iter()
            .find(|s| s.status == StepStatus::Rejected)
        {
            return Err(CoreError::invalid_state(
                ResourceKind::WorkflowStepInstance,
                rejected.id,
                rejected.status,
                "a rejected step must be reworked before the workflow can advance",
            ));
        }

        let Some(idx) = self.current_index() else {
            return self.start_next(definition, None, None, now);
        };

        let step_id = self.step_instances[idx].id;
        let step_status = self.step_instances[idx].status;
        let step_sequence = self.step_instances[idx].sequence_number;
        let template = template_for(definition, &self.step_instances[idx])?;

        match step_status {
            StepStatus::WaitingForApproval => Err(CoreError::invalid_state(
                ResourceKind::WorkflowStepInstance,
                step_id,
                step_status,
                "step is waiting for approval",
            )),
            StepStatus::InProgress if template.requires_approval => {
                self.step_instances[idx].status = StepStatus::WaitingForApproval;
                self.record_event(Box::new(StepAwaitingApproval {
                    workflow_instance_id: self.id,
                    step_instance_id: step_id,
                    timestamp: now,
                }));
                Ok(Transition {
                    current: Some(step_id),
                    entity_status: None,
                })
            }
            _ => {
                let completed_status = template.associated_entity_status.clone();
                // resolve the successor before mutating anything
                let next = self.next_not_started(Some(step_sequence));
                if let Some(next_idx) = next {
                    template_for(definition, &self.step_instances[next_idx])?;
                }

                self.complete_step_at(idx, now);
                self.start_next(definition, Some(step_sequence), completed_status, now)
            }
        }
    }

    /// Release an approval gate
    pub fn approve_step(
        &mut self,
        step_instance_id: StepInstanceId,
        definition: &WorkflowDefinition,
        approver: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let idx = self.gate_index(step_instance_id, definition)?;
        if approver.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Approver user id is required".to_string(),
            ));
        }

        let step = &mut self.step_instances[idx];
        step.status = StepStatus::Approved;
        step.approved_by = Some(approver.to_string());
        step.approval_date = Some(now);
        step.notes = notes;

        self.record_event(Box::new(StepApproved {
            workflow_instance_id: self.id,
            step_instance_id,
            approver: approver.to_string(),
            timestamp: now,
        }));
        Ok(())
    }

    /// Refuse an approval gate
    pub fn reject_step(
        &mut self,
        step_instance_id: StepInstanceId,
        definition: &WorkflowDefinition,
        approver: &str,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let idx = self.gate_index(step_instance_id, definition)?;
        if approver.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Approver user id is required".to_string(),
            ));
        }
        if notes.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Notes are required when rejecting a step".to_string(),
            ));
        }

        let step = &mut self.step_instances[idx];
        step.status = StepStatus::Rejected;
        step.approved_by = Some(approver.to_string());
        step.approval_date = Some(now);
        step.notes = Some(notes.to_string());

        self.record_event(Box::new(StepRejected {
            workflow_instance_id: self.id,
            step_instance_id,
            approver: approver.to_string(),
            notes: notes.to_string(),
            timestamp: now,
        }));
        Ok(())
    }

    /// Hand a step to a user, whatever its status
    pub fn assign_step(
        &mut self,
        step_instance_id: StepInstanceId,
        user: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let idx = self.step_index(step_instance_id)?;
        if user.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Assignee user id is required".to_string(),
            ));
        }

        self.step_instances[idx].assigned_to = Some(user.to_string());
        self.record_event(Box::new(StepAssigned {
            workflow_instance_id: self.id,
            step_instance_id,
            assignee: user.to_string(),
            timestamp: now,
        }));
        Ok(())
    }

    /// Set a step status directly, bypassing advance.
    ///
    /// `InProgress` stamps the start date if unset and promotes a
    /// `NotStarted` instance; `Completed` stamps completion and duration.
    /// Only one step may be current at a time.
    pub fn override_step_status(
        &mut self,
        step_instance_id: StepInstanceId,
        status: StepStatus,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let idx = self.step_index(step_instance_id)?;

        if status.is_current() {
            if let Some(other) = self
                .step_instances
                .iter()
                .find(|s| s.id != step_instance_id && s.is_current())
            {
                return Err(CoreError::invalid_state(
                    ResourceKind::WorkflowStepInstance,
                    other.id,
                    other.status,
                    format!("another step is already current; cannot set {} to {}", step_instance_id, status),
                ));
            }
        }

        let from = self.step_instances[idx].status;
        {
            let step = &mut self.step_instances[idx];
            match status {
                StepStatus::InProgress => {
                    step.status = status;
                    if step.start_date.is_none() {
                        step.start_date = Some(now);
                    }
                }
                StepStatus::Completed => step.complete(now),
                _ => step.status = status,
            }
            if notes.is_some() {
                step.notes = notes;
            }
        }

        self.record_event(Box::new(StepStatusOverridden {
            workflow_instance_id: self.id,
            step_instance_id,
            from,
            to: status,
            timestamp: now,
        }));

        if status == StepStatus::InProgress && self.status == WorkflowStatus::NotStarted {
            self.change_status(WorkflowStatus::InProgress, now);
        }
        Ok(())
    }

    /// Set the instance status directly. Steps are left untouched.
    pub fn set_status(&mut self, status: WorkflowStatus, now: DateTime<Utc>) -> Result<(), CoreError> {
        if self.status == WorkflowStatus::Completed {
            if status == WorkflowStatus::Completed {
                return Ok(());
            }
            return Err(CoreError::invalid_state(
                ResourceKind::WorkflowInstance,
                self.id,
                self.status,
                "completed workflows cannot be reopened",
            ));
        }

        if status == WorkflowStatus::Completed {
            self.finish(now);
        } else if status != self.status {
            self.change_status(status, now);
        }
        Ok(())
    }

    /// The lowest-sequence step that is being worked on
    pub fn current_step(&self) -> Option<&WorkflowStepInstance> {
        self.current_index().map(|idx| &self.step_instances[idx])
    }

    /// Look up a step instance by id
    pub fn step_instance(&self, id: StepInstanceId) -> Option<&WorkflowStepInstance> {
        self.step_instances.iter().find(|s| s.id == id)
    }

    /// Whether the instance has not reached `Completed`
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Record a domain event
    pub fn record_event(&mut self, event: Box<dyn DomainEvent>) {
        self.events.push(event);
    }

    /// Get and clear all domain events
    pub fn take_events(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.events)
    }

    fn current_index(&self) -> Option<usize> {
        self.step_instances
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_current())
            .min_by_key(|(_, s)| s.sequence_number)
            .map(|(idx, _)| idx)
    }

    fn next_not_started(&self, after: Option<u32>) -> Option<usize> {
        self.step_instances
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status == StepStatus::NotStarted)
            .filter(|(_, s)| after.map_or(true, |seq| s.sequence_number > seq))
            .min_by_key(|(_, s)| s.sequence_number)
            .map(|(idx, _)| idx)
    }

    fn step_index(&self, id: StepInstanceId) -> Result<usize, CoreError> {
        self.step_instances
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| CoreError::not_found(ResourceKind::WorkflowStepInstance, id))
    }

    fn gate_index(
        &self,
        id: StepInstanceId,
        definition: &WorkflowDefinition,
    ) -> Result<usize, CoreError> {
        let idx = self.step_index(id)?;
        let step = &self.step_instances[idx];
        let template = template_for(definition, step)?;

        if !template.requires_approval {
            return Err(CoreError::invalid_state(
                ResourceKind::WorkflowStepInstance,
                id,
                step.status,
                format!("step '{}' does not require approval", template.name),
            ));
        }
        if step.status != StepStatus::WaitingForApproval {
            return Err(CoreError::invalid_state(
                ResourceKind::WorkflowStepInstance,
                id,
                step.status,
                "only steps waiting for approval can be decided",
            ));
        }
        Ok(idx)
    }

    fn start_next(
        &mut self,
        definition: &WorkflowDefinition,
        after: Option<u32>,
        completed_status: Option<EntityStatus>,
        now: DateTime<Utc>,
    ) -> Result<Transition, CoreError> {
        let Some(next_idx) = self.next_not_started(after) else {
            self.finish(now);
            return Ok(Transition {
                current: None,
                entity_status: completed_status,
            });
        };

        let entity_status = template_for(definition, &self.step_instances[next_idx])?
            .associated_entity_status
            .clone();

        let step = &mut self.step_instances[next_idx];
        step.start(now);
        let step_id = step.id;
        let sequence_number = step.sequence_number;

        self.record_event(Box::new(StepStarted {
            workflow_instance_id: self.id,
            step_instance_id: step_id,
            sequence_number,
            timestamp: now,
        }));

        if self.status == WorkflowStatus::NotStarted {
            self.change_status(WorkflowStatus::InProgress, now);
        }

        Ok(Transition {
            current: Some(step_id),
            entity_status,
        })
    }

    fn complete_step_at(&mut self, idx: usize, now: DateTime<Utc>) {
        let step = &mut self.step_instances[idx];
        step.complete(now);
        let event = StepCompleted {
            workflow_instance_id: self.id,
            step_instance_id: step.id,
            duration_hours: step.actual_duration_hours,
            timestamp: now,
        };
        self.record_event(Box::new(event));
    }

    fn change_status(&mut self, to: WorkflowStatus, now: DateTime<Utc>) {
        let from = self.status;
        self.status = to;
        self.record_event(Box::new(InstanceStatusChanged {
            workflow_instance_id: self.id,
            from,
            to,
            timestamp: now,
        }));
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.change_status(WorkflowStatus::Completed, now);
        self.completion_date = Some(now);
        self.record_event(Box::new(InstanceCompleted {
            workflow_instance_id: self.id,
            timestamp: now,
        }));
    }
}

fn template_for<'d>(
    definition: &'d WorkflowDefinition,
    step: &WorkflowStepInstance,
) -> Result<&'d WorkflowStep, CoreError> {
    definition
        .step(&step.workflow_step_id)
        .ok_or_else(|| CoreError::not_found(ResourceKind::WorkflowStep, step.workflow_step_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn intake_definition() -> WorkflowDefinition {
        WorkflowDefinition::new("Standard intake", WorkflowType::Acquisition)
            .with_step(WorkflowStep::new("Inspect", 1).with_entity_status("Receiving"))
            .with_step(WorkflowStep::new("Document", 2))
            .with_step(
                WorkflowStep::new("Approve", 3)
                    .with_approval()
                    .with_entity_status("InStock"),
            )
    }

    fn new_instance(definition: &WorkflowDefinition) -> WorkflowInstance {
        let (instance, _) =
            WorkflowInstance::instantiate(definition, EntityId::new(), DEFAULT_PRIORITY, Utc::now())
                .unwrap();
        instance
    }

    fn statuses(instance: &WorkflowInstance) -> Vec<StepStatus> {
        instance.step_instances.iter().map(|s| s.status).collect()
    }

    #[test]
    fn test_instantiate_materializes_steps_in_order() {
        let definition = intake_definition();
        let (instance, transition) =
            WorkflowInstance::instantiate(&definition, EntityId::new(), 2, Utc::now()).unwrap();

        assert_eq!(instance.status, WorkflowStatus::NotStarted);
        assert_eq!(instance.priority, 2);
        assert_eq!(instance.workflow_type, WorkflowType::Acquisition);
        assert_eq!(
            instance
                .step_instances
                .iter()
                .map(|s| s.sequence_number)
                .collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(instance
            .step_instances
            .iter()
            .all(|s| s.status == StepStatus::NotStarted && s.workflow_instance_id == instance.id));
        assert_eq!(transition.entity_status, Some(EntityStatus::from("Receiving")));
        assert_eq!(transition.current, None);
        assert_eq!(instance.events.len(), 1);
    }

    #[test]
    fn test_instantiate_rejects_bad_input() {
        let definition = intake_definition();
        let err = WorkflowInstance::instantiate(&definition, EntityId::new(), 0, Utc::now())
            .unwrap_err();
        assert!(err.is_validation());
        assert!(
            WorkflowInstance::instantiate(&definition, EntityId::new(), 6, Utc::now()).is_err()
        );

        let mut inactive = intake_definition();
        inactive.is_active = false;
        let err = WorkflowInstance::instantiate(&inactive, EntityId::new(), 3, Utc::now())
            .unwrap_err();
        assert!(err.is_invalid_state());

        let empty = WorkflowDefinition::new("Empty", WorkflowType::Reconditioning);
        let err =
            WorkflowInstance::instantiate(&empty, EntityId::new(), 3, Utc::now()).unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[test]
    fn test_intake_scenario() {
        let definition = intake_definition();
        let mut instance = new_instance(&definition);
        let now = Utc::now();
        let ids: Vec<_> = instance.step_instances.iter().map(|s| s.id).collect();

        let t = instance.advance(&definition, now).unwrap();
        assert_eq!(t.current, Some(ids[0]));
        assert_eq!(t.entity_status, Some(EntityStatus::from("Receiving")));
        assert_eq!(instance.status, WorkflowStatus::InProgress);

        let t = instance.advance(&definition, now).unwrap();
        assert_eq!(t.current, Some(ids[1]));
        assert_eq!(t.entity_status, None);

        let t = instance.advance(&definition, now).unwrap();
        assert_eq!(t.current, Some(ids[2]));
        assert_eq!(instance.step_instances[2].status, StepStatus::InProgress);

        let t = instance.advance(&definition, now).unwrap();
        assert_eq!(t.current, Some(ids[2]));
        assert_eq!(instance.step_instances[2].status, StepStatus::WaitingForApproval);

        let err = instance.advance(&definition, now).unwrap_err();
        assert!(err.is_invalid_state());

        instance
            .approve_step(ids[2], &definition, "manager", None, now)
            .unwrap();
        assert_eq!(instance.step_instances[2].status, StepStatus::Approved);
        assert_eq!(instance.status, WorkflowStatus::InProgress);

        let t = instance.advance(&definition, now).unwrap();
        assert_eq!(t.current, None);
        assert_eq!(t.entity_status, Some(EntityStatus::from("InStock")));
        assert_eq!(instance.status, WorkflowStatus::Completed);
        assert!(instance.completion_date.is_some());
        assert_eq!(
            statuses(&instance),
            vec![StepStatus::Completed, StepStatus::Completed, StepStatus::Completed]
        );
    }

    #[test]
    fn test_at_most_one_current_step() {
        let definition = intake_definition();
        let mut instance = new_instance(&definition);
        let now = Utc::now();

        for _ in 0..4 {
            instance.advance(&definition, now).unwrap();
            let current = instance.step_instances.iter().filter(|s| s.is_current()).count();
            assert!(current <= 1);

            let current_seq = instance.current_step().map(|s| s.sequence_number);
            assert!(instance
                .step_instances
                .iter()
                .filter(|s| Some(s.sequence_number) < current_seq)
                .all(|s| s.status == StepStatus::Completed));
        }
    }

    #[test]
    fn test_duration_is_fractional_hours() {
        let definition = intake_definition();
        let mut instance = new_instance(&definition);
        let t0 = Utc::now();

        instance.advance(&definition, t0).unwrap();
        instance
            .advance(&definition, t0 + Duration::minutes(90))
            .unwrap();

        let first = &instance.step_instances[0];
        assert_eq!(first.start_date, Some(t0));
        assert_eq!(first.completion_date, Some(t0 + Duration::minutes(90)));
        let hours = first.actual_duration_hours.unwrap();
        assert!((hours - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_completed_instance_refuses_advance() {
        let definition = WorkflowDefinition::new("Aging", WorkflowType::AgingManagement)
            .with_step(WorkflowStep::new("Review", 1));
        let mut instance = new_instance(&definition);
        let now = Utc::now();

        instance.advance(&definition, now).unwrap();
        let t = instance.advance(&definition, now).unwrap();
        assert_eq!(t.current, None);
        let snapshot = instance.clone();

        let err = instance.advance(&definition, now).unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(instance.step_instances, snapshot.step_instances);
        assert_eq!(instance.completion_date, snapshot.completion_date);
    }

    #[test]
    fn test_on_hold_refuses_advance() {
        let definition = intake_definition();
        let mut instance = new_instance(&definition);
        instance.set_status(WorkflowStatus::OnHold, Utc::now()).unwrap();

        assert!(instance
            .advance(&definition, Utc::now())
            .unwrap_err()
            .is_invalid_state());
    }

    #[test]
    fn test_approve_requires_gate_and_waiting_status() {
        let definition = intake_definition();
        let mut instance = new_instance(&definition);
        let now = Utc::now();
        let ids: Vec<_> = instance.step_instances.iter().map(|s| s.id).collect();

        instance.advance(&definition, now).unwrap();
        // no approval gate on the first step
        let err = instance
            .approve_step(ids[0], &definition, "manager", None, now)
            .unwrap_err();
        assert!(err.is_invalid_state());

        // gated step that has not reached the gate
        let err = instance
            .approve_step(ids[2], &definition, "manager", None, now)
            .unwrap_err();
        assert!(err.is_invalid_state());

        let err = instance
            .approve_step(StepInstanceId::new(), &definition, "manager", None, now)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_reject_blocks_advance() {
        let definition = intake_definition();
        let mut instance = new_instance(&definition);
        let now = Utc::now();
        let gate = instance.step_instances[2].id;

        for _ in 0..4 {
            instance.advance(&definition, now).unwrap();
        }

        let err = instance
            .reject_step(gate, &definition, "manager", "  ", now)
            .unwrap_err();
        assert!(err.is_validation());

        instance
            .reject_step(gate, &definition, "manager", "title missing", now)
            .unwrap();
        let step = instance.step_instance(gate).unwrap();
        assert_eq!(step.status, StepStatus::Rejected);
        assert_eq!(step.approved_by.as_deref(), Some("manager"));
        assert_eq!(step.notes.as_deref(), Some("title missing"));
        assert_eq!(instance.status, WorkflowStatus::InProgress);

        assert!(instance
            .advance(&definition, now)
            .unwrap_err()
            .is_invalid_state());

        // rework re-opens the gate
        instance
            .override_step_status(gate, StepStatus::InProgress, None, now)
            .unwrap();
        let t = instance.advance(&definition, now).unwrap();
        assert_eq!(t.current, Some(gate));
        assert_eq!(
            instance.step_instance(gate).unwrap().status,
            StepStatus::WaitingForApproval
        );
    }

    #[test]
    fn test_assign_step() {
        let definition = intake_definition();
        let mut instance = new_instance(&definition);
        let step = instance.step_instances[1].id;

        assert!(instance.assign_step(step, "", Utc::now()).unwrap_err().is_validation());
        instance.assign_step(step, "tech-7", Utc::now()).unwrap();
        assert_eq!(
            instance.step_instance(step).unwrap().assigned_to.as_deref(),
            Some("tech-7")
        );
    }

    #[test]
    fn test_override_step_status() {
        let definition = intake_definition();
        let mut instance = new_instance(&definition);
        let now = Utc::now();
        let ids: Vec<_> = instance.step_instances.iter().map(|s| s.id).collect();

        instance
            .override_step_status(ids[0], StepStatus::InProgress, Some("started early".into()), now)
            .unwrap();
        assert_eq!(instance.status, WorkflowStatus::InProgress);
        assert_eq!(instance.step_instances[0].start_date, Some(now));

        let err = instance
            .override_step_status(ids[1], StepStatus::InProgress, None, now)
            .unwrap_err();
        assert!(err.is_invalid_state());

        let later = now + Duration::hours(2);
        instance
            .override_step_status(ids[0], StepStatus::Completed, None, later)
            .unwrap();
        let first = &instance.step_instances[0];
        assert_eq!(first.completion_date, Some(later));
        assert_eq!(first.notes.as_deref(), Some("started early"));
        assert!((first.actual_duration_hours.unwrap() - 2.0).abs() < 1e-9);

        // advance picks up the next NotStarted step
        let t = instance.advance(&definition, later).unwrap();
        assert_eq!(t.current, Some(ids[1]));
    }

    #[test]
    fn test_set_status_is_terminal_at_completed() {
        let definition = intake_definition();
        let mut instance = new_instance(&definition);
        let now = Utc::now();

        instance.set_status(WorkflowStatus::Completed, now).unwrap();
        assert_eq!(instance.completion_date, Some(now));
        assert_eq!(
            statuses(&instance),
            vec![StepStatus::NotStarted, StepStatus::NotStarted, StepStatus::NotStarted]
        );

        instance
            .set_status(WorkflowStatus::Completed, now + Duration::hours(1))
            .unwrap();
        assert_eq!(instance.completion_date, Some(now));

        assert!(instance
            .set_status(WorkflowStatus::InProgress, now)
            .unwrap_err()
            .is_invalid_state());
    }

    #[test]
    fn test_clone_drops_events() {
        let definition = intake_definition();
        let mut instance = new_instance(&definition);
        instance.advance(&definition, Utc::now()).unwrap();

        assert!(!instance.events.is_empty());
        assert!(instance.clone().events.is_empty());
        assert!(!instance.take_events().is_empty());
        assert!(instance.events.is_empty());
    }
}
