//! Resource kinds and their naming on the wire.
//!
//! The API is not symmetric: a single item comes back under the singular key
//! (`virtual_machine`), a collection under the plural key (`virtual_machines`),
//! and URLs use dashes (`/v2/virtual-machines`). [`describe`] is the one place
//! that knows all three names for each kind.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::id::ResourceId;

/// API version prefix of every resource path.
pub const API_PREFIX: &str = "/v2";

/// Kinds of resources the client can bind objects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Virtual machine
    VirtualMachine,
    /// Storage volume
    StorageVolume,
    /// Disc image
    DiskImage,
}

/// Wire names of a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindDescriptor {
    /// JSON key of a single-item response (`virtual_machine`)
    pub singular_key: &'static str,
    /// JSON key of a collection response (`virtual_machines`)
    pub plural_key: &'static str,
    /// URL path segment (`virtual-machines`)
    pub url_segment: &'static str,
}

/// Returns the wire names of `kind`.
#[must_use]
pub const fn describe(kind: ResourceKind) -> KindDescriptor {
    match kind {
        ResourceKind::VirtualMachine => KindDescriptor {
            singular_key: "virtual_machine",
            plural_key: "virtual_machines",
            url_segment: "virtual-machines",
        },
        ResourceKind::StorageVolume => KindDescriptor {
            singular_key: "storage_volume",
            plural_key: "storage_volumes",
            url_segment: "storage-volumes",
        },
        ResourceKind::DiskImage => KindDescriptor {
            singular_key: "disk_image",
            plural_key: "disk_images",
            url_segment: "disk-images",
        },
    }
}

impl ResourceKind {
    /// Returns all resource kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::VirtualMachine, Self::StorageVolume, Self::DiskImage]
    }

    /// Shorthand for [`describe`].
    #[must_use]
    pub const fn descriptor(&self) -> KindDescriptor {
        describe(*self)
    }

    /// JSON key of a single-item response.
    #[must_use]
    pub const fn singular_key(&self) -> &'static str {
        self.descriptor().singular_key
    }

    /// JSON key of a collection response.
    #[must_use]
    pub const fn plural_key(&self) -> &'static str {
        self.descriptor().plural_key
    }

    /// `/v2/{segment}`
    #[must_use]
    pub fn collection_path(&self) -> String {
        format!("{API_PREFIX}/{}", self.descriptor().url_segment)
    }

    /// `/v2/{segment}/{id}`
    #[must_use]
    pub fn item_path(&self, id: &ResourceId) -> String {
        format!("{}/{id}", self.collection_path())
    }

    /// `/v2/{segment}/{id}/{action}`
    #[must_use]
    pub fn action_path(&self, id: &ResourceId, action: &str) -> String {
        format!("{}/{action}", self.item_path(id))
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| {
                let names = kind.descriptor();
                s == names.singular_key || s == names.plural_key || s == names.url_segment
            })
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown resource kind: {s}")))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.singular_key())
    }
}
