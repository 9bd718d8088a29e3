//! YAML catalog of workflow definitions registered at startup

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use stockflow_core::{
    CoreError, DefinitionService, EntityStatus, WorkflowDefinition, WorkflowStep, WorkflowType,
};
use tracing::info;

use crate::error::{ConfigError, ConfigResult};

/// A catalog file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Definitions in registration order
    #[serde(default)]
    pub definitions: Vec<DefinitionEntry>,
}

/// One workflow definition in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionEntry {
    pub name: String,
    pub workflow_type: WorkflowType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub steps: Vec<StepEntry>,
}

/// One step template; `sequence_number` defaults to the position in the list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEntry {
    pub name: String,
    #[serde(default)]
    pub sequence_number: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expected_duration_hours: f64,
    #[serde(default)]
    pub responsible_party: Option<String>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub required_documents: Vec<String>,
    #[serde(default)]
    pub entity_status: Option<EntityStatus>,
}

fn default_true() -> bool {
    true
}

impl DefinitionEntry {
    fn to_definition(&self) -> WorkflowDefinition {
        let mut definition = WorkflowDefinition::new(&self.name, self.workflow_type.clone());
        definition.description = self.description.clone();
        definition.is_active = self.is_active;
        definition.is_default = self.is_default;

        for (position, entry) in self.steps.iter().enumerate() {
            let sequence = entry.sequence_number.unwrap_or(position as u32 + 1);
            let mut step = WorkflowStep::new(&entry.name, sequence)
                .with_expected_duration(entry.expected_duration_hours)
                .with_required_documents(entry.required_documents.iter().cloned());
            step.description = entry.description.clone();
            if entry.requires_approval {
                step = step.with_approval();
            }
            if let Some(party) = &entry.responsible_party {
                step = step.with_responsible_party(party);
            }
            if let Some(status) = &entry.entity_status {
                step = step.with_entity_status(status.clone());
            }
            definition = definition.with_step(step);
        }

        definition
    }
}

impl Catalog {
    /// Parse a catalog from YAML text
    pub fn from_yaml(path: &Path, raw: &str) -> ConfigResult<Self> {
        let catalog: Catalog = serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if catalog.definitions.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{} contains no workflow definitions",
                path.display()
            )));
        }
        Ok(catalog)
    }

    /// Read and parse a catalog file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(path, &raw)
    }

    /// Build the definitions without registering them
    pub fn to_definitions(&self) -> Vec<WorkflowDefinition> {
        self.definitions
            .iter()
            .map(DefinitionEntry::to_definition)
            .collect()
    }

    /// Register every definition in order. Stops at the first refusal.
    pub async fn register(
        &self,
        definitions: &DefinitionService,
    ) -> Result<Vec<WorkflowDefinition>, CoreError> {
        let mut registered = Vec::with_capacity(self.definitions.len());
        for definition in self.to_definitions() {
            registered.push(definitions.create_definition(definition).await?);
        }
        info!(count = registered.len(), "Workflow catalog registered");
        Ok(registered)
    }
}
