mod catalog;
mod config;
mod error;

use anyhow::{Context, Result};
use stockflow_core::{DefinitionService, WorkflowType};
use stockflow_monitoring::init_logging;
use stockflow_state_inmemory::InMemoryStateStoreProvider;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;

    let _logging = init_logging(&config.logging).context("Failed to initialize logging")?;
    info!(
        definitions_path = ?config.definitions_path,
        json_logs = config.logging.enable_json_logging,
        "Configuration loaded"
    );

    let provider = InMemoryStateStoreProvider::new();
    let (instance_repo, definition_repo) = provider.create_repositories();
    let definitions = DefinitionService::new(definition_repo, instance_repo);

    match &config.definitions_path {
        Some(path) => {
            let catalog = Catalog::from_file(path)
                .with_context(|| format!("Failed to load workflow catalog {}", path.display()))?;
            catalog
                .register(&definitions)
                .await
                .context("Failed to register workflow catalog")?;
        }
        None => warn!("No workflow catalog configured; set STOCKFLOW_DEFINITIONS"),
    }

    for workflow_type in [
        WorkflowType::Acquisition,
        WorkflowType::Reconditioning,
        WorkflowType::AgingManagement,
    ] {
        match definitions.default_definition(&workflow_type).await? {
            Some(definition) => info!(
                workflow_type = %workflow_type,
                definition_id = %definition.id,
                name = %definition.name,
                steps = definition.steps.len(),
                "Default workflow definition"
            ),
            None => warn!(workflow_type = %workflow_type, "No default workflow definition"),
        }
    }

    let active = definitions.list_definitions(false).await?.len();
    info!(
        service = %config.logging.service_name,
        active_definitions = active,
        "Workflow catalog ready"
    );

    Ok(())
}
