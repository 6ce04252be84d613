//! Virtual machines.

use crate::locator::{schema_error, Lookup, Record};
use crate::models::id_string;
use crate::object::{field, CascadeDelete, Resource, Snapshot};
use crate::session::Session;
use crate::volume::StorageVolume;
use async_trait::async_trait;
use e24_core::{ResourceId, ResourceKind, Result};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::info;

/// Action paths under `/v2/virtual-machines/{id}/`.
mod action {
    pub const POWER_ON: &str = "poweron";
    pub const POWER_OFF: &str = "poweroff";
    pub const REBOOT: &str = "reboot";
    pub const RESIZE: &str = "resize";
}

/// Attributes derived from a VM record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmAttributes {
    /// Power state reported by the API (e.g. `online`).
    pub state: String,
    /// Number of virtual CPUs.
    pub cores: u32,
    /// Memory in MiB.
    pub ram: u64,
    /// Attached storage volumes, in API order.
    pub storage_volume_ids: Vec<ResourceId>,
}

#[async_trait]
impl Snapshot for VmAttributes {
    const KIND: ResourceKind = ResourceKind::VirtualMachine;
    const KEYS: &'static [&'static str] = &["state", "cores", "ram", "storage_volumes"];

    type Owned = Vec<StorageVolume>;

    fn apply(record: &Record) -> Result<Self> {
        let volumes: Vec<Value> = field(record, Self::KIND, "storage_volumes")?;
        let storage_volume_ids = volumes
            .iter()
            .map(|volume| {
                volume
                    .get("id")
                    .and_then(id_string)
                    .ok_or_else(|| schema_error(Self::KIND, "storage_volumes"))
                    .and_then(ResourceId::new)
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            state: field(record, Self::KIND, "state")?,
            cores: field(record, Self::KIND, "cores")?,
            ram: field(record, Self::KIND, "ram")?,
            storage_volume_ids,
        })
    }

    /// Volumes are fetched one after the other. When a lookup fails the volumes
    /// fetched so far are dropped, which also releases their registration.
    async fn load_owned(
        session: &Session,
        attributes: &Self,
        current: &Self::Owned,
    ) -> Result<Self::Owned> {
        let mut volumes = Vec::with_capacity(attributes.storage_volume_ids.len());
        for id in &attributes.storage_volume_ids {
            let attached = current.iter().find(|volume| volume.id() == id).cloned();
            let volume = match attached {
                Some(volume) => volume,
                None => StorageVolume::find(session, &Lookup::Id(id.clone())).await?,
            };
            volumes.push(volume);
        }
        Ok(volumes)
    }

    fn release_owned(owned: &Self::Owned) {
        for volume in owned {
            volume.mark_deleted();
        }
    }
}

/// A virtual machine; it keeps its attached storage volumes alive.
///
/// Deleting it deletes the attached volumes too. The remote cascade is
/// assumed, only the local objects and the registry are updated.
pub type VirtualMachine = Resource<VmAttributes>;

impl Resource<VmAttributes> {
    /// Power the VM on.
    pub async fn power_on(&self) -> Result<()> {
        self.post(action::POWER_ON, None).await
    }

    /// Cut power to the VM.
    pub async fn power_off(&self) -> Result<()> {
        self.post(action::POWER_OFF, None).await
    }

    /// Shut the VM down, optionally asking the API to wait for `wait_for` state.
    pub async fn shutdown(&self, wait_for: Option<&str>) -> Result<()> {
        let body = wait_for.map(|state| json!({ "wait_for": state }));
        self.post(action::POWER_OFF, body).await
    }

    /// Reboot the VM.
    pub async fn reboot(&self) -> Result<()> {
        self.post(action::REBOOT, None).await
    }

    /// Change CPU count and memory (MiB).
    pub async fn resize(&self, cores: u32, ram: u64) -> Result<()> {
        self.post(action::RESIZE, Some(json!({ "cores": cores, "ram": ram })))
            .await
    }

    async fn post(&self, action: &str, body: Option<Value>) -> Result<()> {
        self.action(Method::POST, action, body).await?;
        info!(vm = %self.id(), action, "VM action issued");
        Ok(())
    }

    /// Power state as of the last fetch.
    #[must_use]
    pub fn state(&self) -> String {
        self.attributes().state
    }

    /// CPU count as of the last fetch.
    #[must_use]
    pub fn cores(&self) -> u32 {
        self.attributes().cores
    }

    /// Memory in MiB as of the last fetch.
    #[must_use]
    pub fn ram(&self) -> u64 {
        self.attributes().ram
    }

    /// Attached volume identifiers as of the last fetch.
    #[must_use]
    pub fn storage_volume_ids(&self) -> Vec<ResourceId> {
        self.attributes().storage_volume_ids
    }

    /// Handles on the attached volumes.
    #[must_use]
    pub fn storage_volumes(&self) -> Vec<StorageVolume> {
        self.owned()
    }
}

impl CascadeDelete for Resource<VmAttributes> {
    fn owned_resources(&self) -> Vec<ResourceId> {
        self.owned()
            .iter()
            .map(|volume| volume.id().clone())
            .collect()
    }
}
