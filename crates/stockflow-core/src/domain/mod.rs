/// Workflow definition templates
pub mod definition;

/// Workflow instance aggregate
pub mod instance;

/// Tracked-entity capability
pub mod entity;

/// Domain events
pub mod events;

/// Repository interfaces
pub mod repository;
