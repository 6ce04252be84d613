//! Storage volumes.

use crate::locator::{schema_error, Record};
use crate::models::id_string;
use crate::object::{field, Resource, Snapshot};
use e24_core::{ResourceId, ResourceKind, Result};
use reqwest::Method;
use serde_json::json;

const ATTACH: &str = "attach";
const DETACH: &str = "detach";
const CREATE_IMAGE: &str = "create-image";

/// Attributes derived from a storage volume record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeAttributes {
    /// Size in GiB.
    pub size: u64,
}

impl Snapshot for VolumeAttributes {
    const KIND: ResourceKind = ResourceKind::StorageVolume;
    const KEYS: &'static [&'static str] = &["size"];

    type Owned = ();

    fn apply(record: &Record) -> Result<Self> {
        Ok(Self {
            size: field(record, Self::KIND, "size")?,
        })
    }
}

/// A storage volume.
pub type StorageVolume = Resource<VolumeAttributes>;

impl Resource<VolumeAttributes> {
    /// Size as of the last fetch.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.attributes().size
    }

    /// Attach the volume to a VM.
    pub async fn attach(&self, vm_id: &ResourceId) -> Result<()> {
        let body = json!({ "virtual_machine_id": vm_id });
        self.action(Method::POST, ATTACH, Some(body)).await?;
        Ok(())
    }

    /// Detach the volume from its VM.
    pub async fn detach(&self) -> Result<()> {
        self.action(Method::POST, DETACH, None).await?;
        Ok(())
    }

    /// Request a disc image of the volume and return its identifier.
    ///
    /// The image is created asynchronously; no object is built for it.
    pub async fn create_image(&self, label: &str) -> Result<ResourceId> {
        let response = self
            .action(Method::PUT, CREATE_IMAGE, Some(json!({ "label": label })))
            .await?;

        let kind = ResourceKind::DiskImage;
        let id = response
            .get(kind.singular_key())
            .and_then(|image| image.get("id"))
            .and_then(id_string)
            .ok_or_else(|| schema_error(kind, "id"))?;
        ResourceId::new(id)
    }
}
