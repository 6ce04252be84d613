//! Disc images.

use crate::locator::Record;
use crate::object::{Resource, Snapshot};
use e24_core::{ResourceKind, Result};

/// Disc images carry no attributes beyond identity, label and raw data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageAttributes;

impl Snapshot for ImageAttributes {
    const KIND: ResourceKind = ResourceKind::DiskImage;
    const KEYS: &'static [&'static str] = &[];

    type Owned = ();

    fn apply(_record: &Record) -> Result<Self> {
        Ok(Self)
    }
}

/// A disc image.
pub type DiscImage = Resource<ImageAttributes>;
