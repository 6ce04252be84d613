//! Session and resource object model for the e24cloud compute API.
//!
//! A [`Session`] signs and dispatches requests, locates resources and keeps a
//! registry of live objects. [`VirtualMachine`], [`StorageVolume`] and
//! [`DiscImage`] are bound views of remote resources built on top of it.

#![deny(missing_docs)]

pub mod context;
pub mod image;
pub mod locator;
pub mod models;
pub mod object;
pub mod session;
pub mod transport;
pub mod vm;
pub mod volume;

pub use context::SessionContext;
pub use image::{DiscImage, ImageAttributes};
pub use locator::{ApiRequester, Lookup, Record};
pub use models::{ProvisionVm, Region, RegionList, Zone};
pub use object::{CascadeDelete, ObjectState, Resource, Snapshot};
pub use session::{RegistryEntry, Session, SessionBuilder};
pub use transport::Dispatcher;
pub use vm::{VirtualMachine, VmAttributes};
pub use volume::{StorageVolume, VolumeAttributes};

/// Convenient result alias that reuses the shared e24cloud error type.
pub type Result<T> = e24_core::Result<T>;
