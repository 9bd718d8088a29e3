use std::fmt;
use thiserror::Error;

/// Kind of record an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Workflow definition template
    WorkflowDefinition,
    /// Step template within a definition
    WorkflowStep,
    /// Running or finished workflow instance
    WorkflowInstance,
    /// Execution record of one step
    WorkflowStepInstance,
    /// Entity driven by a workflow (e.g. a vehicle)
    TrackedEntity,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::WorkflowDefinition => "Workflow definition",
            ResourceKind::WorkflowStep => "Workflow step",
            ResourceKind::WorkflowInstance => "Workflow instance",
            ResourceKind::WorkflowStepInstance => "Workflow step instance",
            ResourceKind::TrackedEntity => "Tracked entity",
        };
        f.write_str(name)
    }
}

/// Core error type for the workflow engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Unknown definition, step, instance or entity id
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up
        kind: ResourceKind,
        /// The id that was not found
        id: String,
    },

    /// Operation not legal for the current status
    #[error("{kind} {id} is {status}: {reason}")]
    InvalidState {
        /// What the operation targeted
        kind: ResourceKind,
        /// Id of the target
        id: String,
        /// Status at the time of the call
        status: String,
        /// Why the operation was refused
        reason: String,
    },

    /// Missing or malformed input
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Stored version moved underneath the writer
    #[error("Concurrent modification of {id}: expected version {expected}, found {found}")]
    ConcurrencyConflict {
        /// Id of the instance being saved
        id: String,
        /// Version the writer read
        expected: u64,
        /// Version currently stored
        found: u64,
    },

    /// State store error
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Tracked-entity collaborator failed
    #[error("Entity store error: {0}")]
    EntityStoreError(String),
}

impl CoreError {
    /// Build a `NotFound` error
    pub fn not_found(kind: ResourceKind, id: impl fmt::Display) -> Self {
        CoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Build an `InvalidState` error
    pub fn invalid_state(
        kind: ResourceKind,
        id: impl fmt::Display,
        status: impl fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::InvalidState {
            kind,
            id: id.to_string(),
            status: status.to_string(),
            reason: reason.into(),
        }
    }

    /// True for `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }

    /// True for `InvalidState`
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, CoreError::InvalidState { .. })
    }

    /// True for `ValidationError`
    pub fn is_validation(&self) -> bool {
        matches!(self, CoreError::ValidationError(_))
    }
}
