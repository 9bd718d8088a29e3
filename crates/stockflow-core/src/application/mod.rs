/// Workflow orchestration service
pub mod workflow_service;

/// Workflow definition management service
pub mod definition_service;
