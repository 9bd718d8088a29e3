//! Intake inspections and their storage

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stockflow_core::EntityId;
use uuid::Uuid;

use crate::InventoryError;

/// Overall inspection result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InspectionStatus {
    /// Nothing found
    Passed,
    /// Passed, with issues to fix
    PassedWithIssues,
    /// Not fit for sale as is
    Failed,
}

/// How bad an inspection issue is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssueSeverity {
    /// Cosmetic
    Minor,
    /// Needs work, not urgent
    Moderate,
    /// Needs work before sale
    Major,
    /// Unsafe or unsellable
    Critical,
}

/// A single finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionIssue {
    /// Area of the vehicle, e.g. "Brakes"
    pub area: String,
    /// What was found
    pub description: String,
    /// Severity
    pub severity: IssueSeverity,
}

impl InspectionIssue {
    /// Create an issue
    pub fn new(
        area: impl Into<String>,
        description: impl Into<String>,
        severity: IssueSeverity,
    ) -> Self {
        Self {
            area: area.into(),
            description: description.into(),
            severity,
        }
    }
}

/// Result of inspecting a vehicle at intake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleInspection {
    /// Inspection id
    pub id: Uuid,
    /// Inspected vehicle
    pub vehicle_id: EntityId,
    /// Inspector user id
    pub inspector: String,
    /// Overall result
    pub status: InspectionStatus,
    /// Findings
    pub issues: Vec<InspectionIssue>,
    /// When the inspection took place
    pub inspected_at: DateTime<Utc>,
    /// Free-form notes
    pub notes: Option<String>,
}

impl VehicleInspection {
    /// Create an inspection dated now
    pub fn new(vehicle_id: EntityId, inspector: impl Into<String>, status: InspectionStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle_id,
            inspector: inspector.into(),
            status,
            issues: Vec::new(),
            inspected_at: Utc::now(),
            notes: None,
        }
    }

    /// Add a finding
    pub fn with_issue(mut self, issue: InspectionIssue) -> Self {
        self.issues.push(issue);
        self
    }

    fn has_issue_at_least(&self, severity: IssueSeverity) -> bool {
        self.issues.iter().any(|i| i.severity >= severity)
    }

    /// Intake must stop until someone looks at the vehicle
    pub fn requires_hold(&self) -> bool {
        self.status == InspectionStatus::Failed || self.has_issue_at_least(IssueSeverity::Critical)
    }

    /// The vehicle goes to reconditioning once intake completes
    pub fn requires_reconditioning(&self) -> bool {
        self.status == InspectionStatus::Failed || self.has_issue_at_least(IssueSeverity::Major)
    }
}

/// Storage for inspections, one per vehicle
#[async_trait]
pub trait InspectionStore: Send + Sync {
    /// Insert or replace the inspection of a vehicle
    async fn save_inspection(&self, inspection: &VehicleInspection) -> Result<(), InventoryError>;

    /// The inspection of a vehicle, if it has been inspected
    async fn find_by_vehicle(
        &self,
        vehicle_id: &EntityId,
    ) -> Result<Option<VehicleInspection>, InventoryError>;
}

/// In-memory inspection store
#[derive(Clone, Default)]
pub struct InMemoryInspectionStore {
    inspections: Arc<DashMap<EntityId, VehicleInspection>>,
}

impl InMemoryInspectionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InspectionStore for InMemoryInspectionStore {
    async fn save_inspection(&self, inspection: &VehicleInspection) -> Result<(), InventoryError> {
        self.inspections
            .insert(inspection.vehicle_id, inspection.clone());
        Ok(())
    }

    async fn find_by_vehicle(
        &self,
        vehicle_id: &EntityId,
    ) -> Result<Option<VehicleInspection>, InventoryError> {
        Ok(self.inspections.get(vehicle_id).map(|i| i.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_and_reconditioning_rules() {
        let vehicle_id = EntityId::new();

        let clean = VehicleInspection::new(vehicle_id, "tech", InspectionStatus::Passed);
        assert!(!clean.requires_hold());
        assert!(!clean.requires_reconditioning());

        let major = VehicleInspection::new(vehicle_id, "tech", InspectionStatus::PassedWithIssues)
            .with_issue(InspectionIssue::new("Brakes", "pads worn", IssueSeverity::Major));
        assert!(!major.requires_hold());
        assert!(major.requires_reconditioning());

        let critical = VehicleInspection::new(vehicle_id, "tech", InspectionStatus::PassedWithIssues)
            .with_issue(InspectionIssue::new("Frame", "cracked", IssueSeverity::Critical));
        assert!(critical.requires_hold());
        assert!(critical.requires_reconditioning());

        let failed = VehicleInspection::new(vehicle_id, "tech", InspectionStatus::Failed);
        assert!(failed.requires_hold());
        assert!(failed.requires_reconditioning());
    }
}
