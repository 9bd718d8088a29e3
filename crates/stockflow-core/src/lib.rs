//!
//! Stockflow Core - workflow orchestration engine
//!
//! This crate defines the domain model (definitions, instances, step
//! instances), the repository and tracked-entity interfaces, and the
//! services that drive an entity through a linear sequence of steps with
//! optional approval gates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - core business models, entities, and rules
pub mod domain;

/// Application services - core application logic
pub mod application;

/// Error types
pub mod error;

// Re-export key types
pub use error::{CoreError, ResourceKind};

pub use application::definition_service::DefinitionService;
pub use application::workflow_service::{DomainEventHandler, TracingEventHandler, WorkflowService};

pub use domain::definition::{
    DefinitionUpdate, WorkflowDefinition, WorkflowDefinitionId, WorkflowStep, WorkflowStepId,
    WorkflowType,
};
pub use domain::entity::{EntityId, EntityStatus, TrackedEntity, TrackedEntityStore};
pub use domain::events::DomainEvent;
pub use domain::instance::{
    StepInstanceId, StepStatus, Transition, WorkflowInstance, WorkflowInstanceId,
    WorkflowStatus, WorkflowStepInstance, DEFAULT_PRIORITY, HIGHEST_PRIORITY, LOWEST_PRIORITY,
};
pub use domain::repository::{WorkflowDefinitionRepository, WorkflowInstanceRepository};
