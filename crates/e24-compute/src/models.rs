//! Request and response models for provisioning and catalogue endpoints.

use e24_core::{Error, Result, TemplateId, ZoneId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Path of the region/zone catalogue.
pub const REGIONS_PATH: &str = "/v2/regions";
/// Path of the OS template catalogue.
pub const TEMPLATES_PATH: &str = "/v2/templates";

/// Boot type used for every VM provisioned from an OS template.
pub const BOOT_TYPE_IMAGE: &str = "image";

/// Parameters for provisioning a new virtual machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionVm {
    /// Display name of the VM.
    pub name: String,
    /// Number of virtual CPUs.
    pub cpus: u32,
    /// Memory in MiB.
    pub ram: u64,
    /// OS template to install.
    pub os_template: TemplateId,
    /// Initial root password.
    pub password: Option<String>,
    /// SSH key to install.
    pub key_id: Option<String>,
    /// Cloud-init user data.
    pub user_data: Option<String>,
}

impl ProvisionVm {
    /// Create a request with the mandatory parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, cpus: u32, ram: u64, os_template: TemplateId) -> Self {
        Self {
            name: name.into(),
            cpus,
            ram,
            os_template,
            password: None,
            key_id: None,
            user_data: None,
        }
    }

    /// Set the root password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the SSH key id.
    #[must_use]
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Set cloud-init user data.
    #[must_use]
    pub fn with_user_data(mut self, user_data: impl Into<String>) -> Self {
        self.user_data = Some(user_data.into());
        self
    }

    /// Reject requests the API would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidArgument("VM name must not be empty".to_string()));
        }
        if self.cpus == 0 {
            return Err(Error::InvalidArgument("VM needs at least one CPU".to_string()));
        }
        if self.ram == 0 {
            return Err(Error::InvalidArgument("VM RAM must be positive".to_string()));
        }
        Ok(())
    }

    /// Request body for `PUT /v2/virtual-machines`.
    #[must_use]
    pub fn to_body(&self, zone_id: &ZoneId) -> CreateVmBody<'_> {
        CreateVmBody {
            create_vm: CreateVm {
                cpus: self.cpus,
                ram: self.ram,
                zone_id: zone_id.clone(),
                name: &self.name,
                boot_type: BOOT_TYPE_IMAGE,
                os: &self.os_template,
                password: self.password.as_deref(),
                key_id: self.key_id.as_deref(),
                user_data: self.user_data.as_deref(),
            },
        }
    }
}

/// Wire envelope of a VM creation request.
#[derive(Debug, Serialize)]
pub struct CreateVmBody<'a> {
    create_vm: CreateVm<'a>,
}

#[derive(Debug, Serialize)]
struct CreateVm<'a> {
    cpus: u32,
    ram: u64,
    zone_id: ZoneId,
    name: &'a str,
    boot_type: &'static str,
    os: &'a TemplateId,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<&'a str>,
}

/// `/v2/regions` response.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionList {
    /// Regions visible to the account.
    #[serde(default)]
    pub regions: Vec<Region>,
}

/// A provisioning region.
#[derive(Debug, Clone, Deserialize)]
pub struct Region {
    /// Region identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Region label.
    #[serde(default)]
    pub label: Option<String>,
    /// Zones inside the region.
    #[serde(default)]
    pub zones: Vec<Zone>,
}

/// A provisioning zone; its label matches an endpoint label.
#[derive(Debug, Clone, Deserialize)]
pub struct Zone {
    /// Zone identifier used when creating VMs.
    pub id: ZoneId,
    /// Zone label (e.g. `DC1/PUBLIC-1`).
    pub label: String,
}

impl RegionList {
    /// Find the zone labelled `label` in any region.
    #[must_use]
    pub fn zone_for(&self, label: &str) -> Option<&Zone> {
        self.regions
            .iter()
            .flat_map(|region| region.zones.iter())
            .find(|zone| zone.label == label)
    }
}

/// Read an identifier that the API may encode as a string or a number.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
