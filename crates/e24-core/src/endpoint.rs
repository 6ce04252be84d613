//! Endpoint registry.
//!
//! Endpoint labels match the zone labels the API reports under `/v2/regions`,
//! which is how a session finds the zone it provisions into.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Label of the endpoint used when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "DC1/PUBLIC-1";

/// Known e24cloud API endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// Poznań, first data centre
    #[serde(rename = "DC1/PUBLIC-1")]
    Dc1Public1,
    /// Poznań, second data centre
    #[serde(rename = "DC2/PUBLIC-1")]
    Dc2Public1,
}

impl Endpoint {
    /// Returns the zone label of the endpoint.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Dc1Public1 => "DC1/PUBLIC-1",
            Self::Dc2Public1 => "DC2/PUBLIC-1",
        }
    }

    /// Returns the API hostname serving this endpoint.
    #[must_use]
    pub const fn hostname(&self) -> &'static str {
        match self {
            Self::Dc1Public1 => "eu-poland-1poznan.api.e24cloud.com",
            Self::Dc2Public1 => "eu-poland-1poznan2.api.e24cloud.com",
        }
    }

    /// Returns the HTTPS base URL of the endpoint.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("https://{}", self.hostname())
    }

    /// Returns all known endpoints.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Dc1Public1, Self::Dc2Public1]
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::Dc1Public1
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|endpoint| endpoint.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownEndpoint(s.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
