//! Configuration structures for e24cloud sessions.
//!
//! Credentials come from the process environment (`E24_KEY`, `E24_SECRET`).
//! Everything else has a default and can be overridden programmatically or via
//! `E24_ENDPOINT` / `E24_BASE_URL`.

use crate::endpoint::{Endpoint, DEFAULT_ENDPOINT};
use crate::Error;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;
use validator::Validate;

/// Environment variable holding the public access key.
pub const ENV_ACCESS_KEY: &str = "E24_KEY";
/// Environment variable holding the signing secret.
pub const ENV_SECRET: &str = "E24_SECRET";
/// Environment variable selecting the endpoint label.
pub const ENV_ENDPOINT: &str = "E24_ENDPOINT";
/// Environment variable overriding the API base URL.
pub const ENV_BASE_URL: &str = "E24_BASE_URL";

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// API access key and signing secret.
pub struct Credentials {
    access_key: String,
    secret: SecretString,
}

impl Credentials {
    /// Create credentials from explicit values.
    #[must_use]
    pub fn new(access_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    /// Read credentials from `E24_KEY` and `E24_SECRET`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if either variable is missing or empty.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read credentials through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if either variable is missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| Error::ConfigError(format!("{name} is not set")))
        };

        Ok(Self::new(required(ENV_ACCESS_KEY)?, required(ENV_SECRET)?))
    }

    /// Public access key.
    #[must_use]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Signing secret.
    #[must_use]
    pub const fn secret(&self) -> &SecretString {
        &self.secret
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self::new(self.access_key.clone(), self.secret.expose_secret())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct E24Config {
    /// Endpoint label (e.g. `DC1/PUBLIC-1`)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Base URL override; the endpoint's hostname is used when absent
    #[validate(url)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Connect timeout in seconds
    #[validate(range(min = 1, max = 60))]
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl E24Config {
    /// Create a configuration for the given endpoint label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEndpoint`] if the label is not registered.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            endpoint: endpoint.into(),
            ..Self::default()
        };
        config.endpoint()?;
        Ok(config)
    }

    /// Build a configuration from `E24_ENDPOINT` and `E24_BASE_URL`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(ENV_ENDPOINT).filter(|value| !value.is_empty()) {
            Some(endpoint) => Self::new(endpoint)?,
            None => Self::default(),
        };
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|value| !value.is_empty()) {
            debug!(%base_url, "base URL overridden from environment");
            config = config.with_base_url(base_url);
        }
        config.check()?;
        Ok(config)
    }

    /// Set the base URL override.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    /// Set connect timeout in seconds.
    #[must_use]
    pub const fn with_connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout_secs = seconds;
        self
    }

    /// Resolve the endpoint label through the endpoint registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEndpoint`] if the label is not registered.
    pub fn endpoint(&self) -> Result<Endpoint, Error> {
        self.endpoint.parse()
    }

    /// Base URL requests are sent to.
    ///
    /// # Errors
    ///
    /// Returns an error if the override or the endpoint is invalid.
    pub fn base_url(&self) -> Result<Url, Error> {
        let raw = match &self.base_url {
            Some(base_url) => base_url.clone(),
            None => self.endpoint()?.base_url(),
        };
        Url::parse(&raw).map_err(|e| Error::ConfigError(format!("Invalid base URL `{raw}`: {e}")))
    }

    /// Host value covered by request signatures (`host[:port]` of the base URL).
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL has no host.
    pub fn signing_host(&self) -> Result<String, Error> {
        let url = self.base_url()?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::ConfigError(format!("Base URL `{url}` has no host")))?;
        Ok(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    /// Request timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Connect timeout as a Duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Validate field ranges, the base URL and the endpoint label.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn check(&self) -> Result<(), Error> {
        self.validate()?;
        self.endpoint()?;
        Ok(())
    }
}

impl Default for E24Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}
