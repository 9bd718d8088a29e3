use crate::domain::entity::EntityStatus;
use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// Value object: Workflow definition ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowDefinitionId(pub Uuid);

impl WorkflowDefinitionId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowDefinitionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowDefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Value object: Workflow step (template) ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowStepId(pub Uuid);

impl WorkflowStepId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowStepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowStepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Business process a definition models
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkflowType {
    /// Vehicle intake: inspection, paperwork, sign-off
    Acquisition,
    /// Repair and detailing before sale
    Reconditioning,
    /// Handling of units that sit too long in stock
    AgingManagement,
    /// Any other process, keyed by name
    Custom(String),
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowType::Acquisition => f.write_str("Acquisition"),
            WorkflowType::Reconditioning => f.write_str("Reconditioning"),
            WorkflowType::AgingManagement => f.write_str("AgingManagement"),
            WorkflowType::Custom(name) => write!(f, "Custom({})", name),
        }
    }
}

/// A template step within a workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step id
    pub id: WorkflowStepId,

    /// Owning definition
    pub workflow_definition_id: WorkflowDefinitionId,

    /// Display name
    pub name: String,

    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,

    /// Position within the definition; unique per definition
    pub sequence_number: u32,

    /// Planned effort, used for ETA estimates
    #[serde(default)]
    pub expected_duration_hours: f64,

    /// Team or role that carries the step out
    #[serde(default)]
    pub responsible_party: String,

    /// Whether a human must approve before the workflow moves past this step
    #[serde(default)]
    pub requires_approval: bool,

    /// Names of documents expected to be on file for this step
    #[serde(default)]
    pub required_documents: Vec<String>,

    /// Status applied to the tracked entity when this step starts (or, for the
    /// last step, when the workflow completes)
    #[serde(default)]
    pub associated_entity_status: Option<EntityStatus>,
}

impl WorkflowStep {
    /// Create a step with no approval gate and no entity status
    pub fn new(name: impl Into<String>, sequence_number: u32) -> Self {
        Self {
            id: WorkflowStepId::new(),
            workflow_definition_id: WorkflowDefinitionId(Uuid::nil()),
            name: name.into(),
            description: None,
            sequence_number,
            expected_duration_hours: 0.0,
            responsible_party: String::new(),
            requires_approval: false,
            required_documents: Vec::new(),
            associated_entity_status: None,
        }
    }

    /// Require an approval before the step can complete
    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// Set the entity status associated with the step
    pub fn with_entity_status(mut self, status: impl Into<EntityStatus>) -> Self {
        self.associated_entity_status = Some(status.into());
        self
    }

    /// Set the planned duration in hours
    pub fn with_expected_duration(mut self, hours: f64) -> Self {
        self.expected_duration_hours = hours;
        self
    }

    /// Set the responsible party
    pub fn with_responsible_party(mut self, party: impl Into<String>) -> Self {
        self.responsible_party = party.into();
        self
    }

    /// Set the required documents
    pub fn with_required_documents<I, S>(mut self, documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_documents = documents.into_iter().map(Into::into).collect();
        self
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ValidationError(format!(
                "Step {} has an empty name",
                self.sequence_number
            )));
        }
        if !self.expected_duration_hours.is_finite() || self.expected_duration_hours < 0.0 {
            return Err(CoreError::ValidationError(format!(
                "Step '{}' has an invalid expected duration: {}",
                self.name, self.expected_duration_hours
            )));
        }
        Ok(())
    }
}

/// A named, versionable workflow template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Definition id
    pub id: WorkflowDefinitionId,

    /// Human-readable name
    pub name: String,

    /// Description of the process
    #[serde(default)]
    pub description: Option<String>,

    /// Business process this definition models
    pub workflow_type: WorkflowType,

    /// Inactive definitions are hidden from default listings and cannot be
    /// instantiated
    pub is_active: bool,

    /// At most one active default per workflow type
    pub is_default: bool,

    /// Steps ordered by sequence number
    pub steps: Vec<WorkflowStep>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Create an active, non-default definition without steps
    pub fn new(name: impl Into<String>, workflow_type: WorkflowType) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowDefinitionId::new(),
            name: name.into(),
            description: None,
            workflow_type,
            is_active: true,
            is_default: false,
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a step, re-parenting it onto this definition
    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.push_step(step);
        self
    }

    /// Mark as the default for its type
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Insert a step keeping sequence order
    pub fn push_step(&mut self, mut step: WorkflowStep) {
        step.workflow_definition_id = self.id;
        self.steps.push(step);
        self.sort_steps();
    }

    /// Re-establish sequence order and parent ids
    pub fn sort_steps(&mut self) {
        let id = self.id;
        for step in &mut self.steps {
            step.workflow_definition_id = id;
        }
        self.steps.sort_by_key(|s| s.sequence_number);
    }

    /// Look up a template step by id
    pub fn step(&self, id: &WorkflowStepId) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == *id)
    }

    /// The step with the lowest sequence number
    pub fn first_step(&self) -> Option<&WorkflowStep> {
        self.steps.iter().min_by_key(|s| s.sequence_number)
    }

    /// Validate the workflow definition
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Workflow definition name is required".to_string(),
            ));
        }

        if let WorkflowType::Custom(name) = &self.workflow_type {
            if name.trim().is_empty() {
                return Err(CoreError::ValidationError(
                    "Custom workflow type requires a name".to_string(),
                ));
            }
        }

        if self.steps.is_empty() {
            return Err(CoreError::ValidationError(format!(
                "Workflow definition '{}' must have at least one step",
                self.name
            )));
        }

        let mut sequence_numbers = HashSet::new();
        let mut step_ids = HashSet::new();
        for step in &self.steps {
            step.validate()?;
            if !sequence_numbers.insert(step.sequence_number) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate sequence number {} in workflow definition '{}'",
                    step.sequence_number, self.name
                )));
            }
            if !step_ids.insert(step.id) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate step ID: {}",
                    step.id
                )));
            }
        }

        Ok(())
    }
}

/// Header fields an administrator may change on an existing definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionUpdate {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New active flag
    pub is_active: Option<bool>,
    /// New default flag
    pub is_default: Option<bool>,
}

impl DefinitionUpdate {
    /// Apply the update to a definition
    pub fn apply_to(&self, definition: &mut WorkflowDefinition) {
        if let Some(name) = &self.name {
            definition.name = name.clone();
        }
        if let Some(description) = &self.description {
            definition.description = Some(description.clone());
        }
        if let Some(is_active) = self.is_active {
            definition.is_active = is_active;
        }
        if let Some(is_default) = self.is_default {
            definition.is_default = is_default;
        }
        definition.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intake_definition() -> WorkflowDefinition {
        WorkflowDefinition::new("Standard intake", WorkflowType::Acquisition)
            .with_step(WorkflowStep::new("Document", 2))
            .with_step(WorkflowStep::new("Inspect", 1))
            .with_step(
                WorkflowStep::new("Approve", 3)
                    .with_approval()
                    .with_entity_status("InStock"),
            )
    }

    #[test]
    fn test_steps_are_kept_in_sequence_order() {
        let definition = intake_definition();
        let names: Vec<_> = definition.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Inspect", "Document", "Approve"]);
        assert!(definition
            .steps
            .iter()
            .all(|s| s.workflow_definition_id == definition.id));
        assert_eq!(definition.first_step().map(|s| s.name.as_str()), Some("Inspect"));
    }

    #[test]
    fn test_validate_accepts_well_formed_definition() {
        assert!(intake_definition().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_sequence_numbers() {
        let definition = intake_definition().with_step(WorkflowStep::new("Again", 2));
        let err = definition.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate sequence number 2"));
    }

    #[test]
    fn test_validate_rejects_empty_definitions() {
        let definition = WorkflowDefinition::new("Empty", WorkflowType::Reconditioning);
        assert!(definition.validate().unwrap_err().is_validation());

        let unnamed = WorkflowDefinition::new("  ", WorkflowType::Reconditioning)
            .with_step(WorkflowStep::new("Only", 1));
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_steps() {
        let negative = WorkflowDefinition::new("Aging", WorkflowType::AgingManagement)
            .with_step(WorkflowStep::new("Review", 1).with_expected_duration(-1.0));
        assert!(negative.validate().is_err());

        let blank = WorkflowDefinition::new("Aging", WorkflowType::AgingManagement)
            .with_step(WorkflowStep::new("", 1));
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_definition_update_applies_only_given_fields() {
        let mut definition = intake_definition();
        let update = DefinitionUpdate {
            is_default: Some(true),
            ..Default::default()
        };
        update.apply_to(&mut definition);

        assert!(definition.is_default);
        assert!(definition.is_active);
        assert_eq!(definition.name, "Standard intake");
    }

    #[test]
    fn test_workflow_type_ordering_and_display() {
        assert!(WorkflowType::Acquisition < WorkflowType::Reconditioning);
        assert!(WorkflowType::Reconditioning < WorkflowType::AgingManagement);
        assert_eq!(
            WorkflowType::Custom("Transfer".to_string()).to_string(),
            "Custom(Transfer)"
        );
    }
}
