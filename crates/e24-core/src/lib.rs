//! # e24-core
//!
//! Core types and utilities for working with the e24cloud REST API.
//!
//! This crate provides the shared error type, configuration and credentials,
//! the endpoint registry, the resource type map and the request signer used by
//! every e24cloud client.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy shared by all client crates
//! - [`config`] - Credentials and session configuration
//! - [`endpoint`] - Endpoint labels and their API hostnames
//! - [`kind`] - Resource kinds and their URL/JSON names
//! - [`id`] - Strongly-typed identifiers
//! - [`signer`] - HMAC-SHA256 request signing

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod endpoint;
pub mod error;
pub mod id;
pub mod kind;
pub mod signer;

// Re-export commonly used types
pub use config::{Credentials, E24Config};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use id::{ResourceId, TemplateId, ZoneId};
pub use kind::{describe, KindDescriptor, ResourceKind};
pub use signer::RequestSigner;
