//! Vehicles as tracked entities
//!
//! [`InMemoryVehicleStore`] is both the inventory's vehicle repository and
//! the [`TrackedEntityStore`] the workflow engine writes statuses through.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use stockflow_core::{CoreError, EntityId, EntityStatus, TrackedEntity, TrackedEntityStore};
use tracing::debug;

use crate::InventoryError;

/// Lifecycle status of a vehicle on the lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleStatus {
    /// Bought, not yet delivered to the dealership
    InTransit,
    /// Arrived, intake in progress
    Receiving,
    /// Available for sale
    InStock,
    /// Being repaired or detailed
    Reconditioning,
    /// Ready and displayed on the front line
    FrontLine,
    /// Blocked pending a decision
    OnHold,
    /// Sold, awaiting delivery
    Sold,
    /// Handed to the buyer
    Delivered,
    /// Moved to another location
    Transferred,
}

impl VehicleStatus {
    /// Every status, in lifecycle order
    pub const ALL: [VehicleStatus; 9] = [
        VehicleStatus::InTransit,
        VehicleStatus::Receiving,
        VehicleStatus::InStock,
        VehicleStatus::Reconditioning,
        VehicleStatus::FrontLine,
        VehicleStatus::OnHold,
        VehicleStatus::Sold,
        VehicleStatus::Delivered,
        VehicleStatus::Transferred,
    ];

    /// Name used on the wire and in workflow definitions
    pub fn as_str(self) -> &'static str {
        match self {
            VehicleStatus::InTransit => "InTransit",
            VehicleStatus::Receiving => "Receiving",
            VehicleStatus::InStock => "InStock",
            VehicleStatus::Reconditioning => "Reconditioning",
            VehicleStatus::FrontLine => "FrontLine",
            VehicleStatus::OnHold => "OnHold",
            VehicleStatus::Sold => "Sold",
            VehicleStatus::Delivered => "Delivered",
            VehicleStatus::Transferred => "Transferred",
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleStatus {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VehicleStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| InventoryError::UnknownVehicleStatus(s.to_string()))
    }
}

impl From<VehicleStatus> for EntityStatus {
    fn from(status: VehicleStatus) -> Self {
        EntityStatus::new(status.as_str())
    }
}

impl TryFrom<&EntityStatus> for VehicleStatus {
    type Error = InventoryError;

    fn try_from(status: &EntityStatus) -> Result<Self, Self::Error> {
        status.as_str().parse()
    }
}

/// A vehicle in inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Vehicle id, shared with the workflow engine
    pub id: EntityId,
    /// Dealer stock number
    pub stock_number: String,
    /// Vehicle identification number
    pub vin: Option<String>,
    /// Current status
    pub status: VehicleStatus,
    /// Free-form notes, one entry per line
    pub notes: Option<String>,
}

impl Vehicle {
    /// Create a vehicle that is still in transit
    pub fn new(stock_number: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            stock_number: stock_number.into(),
            vin: None,
            status: VehicleStatus::InTransit,
            notes: None,
        }
    }

    /// Set the status
    pub fn with_status(mut self, status: VehicleStatus) -> Self {
        self.status = status;
        self
    }

    /// Append a line to the notes
    pub fn append_note(&mut self, note: &str) {
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, note),
            _ => note.to_string(),
        });
    }
}

/// Storage for vehicles
#[async_trait]
pub trait VehicleRepository: Send + Sync {
    /// Find a vehicle by id
    async fn find_vehicle(&self, id: &EntityId) -> Result<Option<Vehicle>, InventoryError>;

    /// Insert or replace a vehicle
    async fn save_vehicle(&self, vehicle: &Vehicle) -> Result<(), InventoryError>;

    /// Vehicles in any of `statuses`, ordered by stock number
    async fn find_by_status(
        &self,
        statuses: &[VehicleStatus],
    ) -> Result<Vec<Vehicle>, InventoryError>;
}

/// In-memory vehicle store
#[derive(Clone, Default)]
pub struct InMemoryVehicleStore {
    vehicles: Arc<DashMap<EntityId, Vehicle>>,
}

impl InMemoryVehicleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VehicleRepository for InMemoryVehicleStore {
    async fn find_vehicle(&self, id: &EntityId) -> Result<Option<Vehicle>, InventoryError> {
        Ok(self.vehicles.get(id).map(|v| v.clone()))
    }

    async fn save_vehicle(&self, vehicle: &Vehicle) -> Result<(), InventoryError> {
        self.vehicles.insert(vehicle.id, vehicle.clone());
        Ok(())
    }

    async fn find_by_status(
        &self,
        statuses: &[VehicleStatus],
    ) -> Result<Vec<Vehicle>, InventoryError> {
        let mut found: Vec<Vehicle> = self
            .vehicles
            .iter()
            .filter(|v| statuses.contains(&v.status))
            .map(|v| v.value().clone())
            .collect();
        found.sort_by(|a, b| a.stock_number.cmp(&b.stock_number));
        Ok(found)
    }
}

#[async_trait]
impl TrackedEntityStore for InMemoryVehicleStore {
    async fn get_entity(&self, id: &EntityId) -> Result<Option<TrackedEntity>, CoreError> {
        Ok(self.vehicles.get(id).map(|v| TrackedEntity {
            id: v.id,
            status: v.status.into(),
        }))
    }

    async fn set_entity_status(
        &self,
        id: &EntityId,
        status: &EntityStatus,
    ) -> Result<(), CoreError> {
        let status = VehicleStatus::try_from(status)?;
        let mut vehicle = self
            .vehicles
            .get_mut(id)
            .ok_or(InventoryError::VehicleNotFound(*id))?;

        debug!(vehicle_id = %id, from = %vehicle.status, to = %status, "Vehicle status set by workflow");
        vehicle.status = status;
        Ok(())
    }
}
