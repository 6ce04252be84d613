//! Resource lookup by identifier or label.
//!
//! A lookup by id reads the single-item representation (`{"virtual_machine": {..}}`),
//! a lookup by label scans the collection (`{"virtual_machines": [..]}`). Both
//! return the same flat record. A resource that cannot be found is `Ok(None)`,
//! never an error.

use async_trait::async_trait;
use e24_core::{Error, ResourceId, ResourceKind, Result};
use reqwest::Method;
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Raw attribute record of a resource, exactly as the API returned it.
pub type Record = Map<String, Value>;

/// Anything that can issue signed API requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApiRequester: Send + Sync {
    /// Send a request and return the parsed, successful response body.
    async fn api_request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value>;
}

/// How to find a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// By identifier
    Id(ResourceId),
    /// By exact label; the first match in server order wins
    Label(String),
}

impl Lookup {
    /// Lookup by identifier.
    pub fn by_id(id: impl Into<String>) -> Result<Self> {
        Ok(Self::Id(ResourceId::new(id)?))
    }

    /// Lookup by label.
    pub fn by_label(label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        if label.is_empty() {
            return Err(Error::InvalidArgument("Label must not be empty".to_string()));
        }
        Ok(Self::Label(label))
    }

    /// Build a lookup from optional parts; exactly one must be given.
    ///
    /// Empty strings count as absent.
    pub fn from_parts(id: Option<&str>, label: Option<&str>) -> Result<Self> {
        let id = id.filter(|id| !id.is_empty());
        let label = label.filter(|label| !label.is_empty());
        match (id, label) {
            (Some(id), None) => Self::by_id(id),
            (None, Some(label)) => Self::by_label(label),
            (None, None) => Err(Error::InvalidArgument(
                "Cannot find resource without ID or label".to_string(),
            )),
            (Some(_), Some(_)) => Err(Error::InvalidArgument(
                "Provide either an ID or a label, not both".to_string(),
            )),
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id `{id}`"),
            Self::Label(label) => write!(f, "label `{label}`"),
        }
    }
}

/// Locate a resource of `kind`.
///
/// Transport failures of a lookup by id (including 404) yield `Ok(None)`. A
/// lookup by label propagates transport failures and yields `Ok(None)` when no
/// label matches.
pub async fn locate<A>(api: &A, kind: ResourceKind, lookup: &Lookup) -> Result<Option<Record>>
where
    A: ApiRequester + ?Sized,
{
    match lookup {
        Lookup::Id(id) => locate_by_id(api, kind, id).await,
        Lookup::Label(label) => locate_by_label(api, kind, label).await,
    }
}

async fn locate_by_id<A>(api: &A, kind: ResourceKind, id: &ResourceId) -> Result<Option<Record>>
where
    A: ApiRequester + ?Sized,
{
    let path = kind.item_path(id);
    let response = match api.api_request(Method::GET, &path, None).await {
        Ok(response) => response,
        Err(err) if err.is_transport_failure() => {
            debug!(%kind, %id, error = %err, "lookup by id found nothing");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    single_record(response, kind).map(Some)
}

async fn locate_by_label<A>(api: &A, kind: ResourceKind, label: &str) -> Result<Option<Record>>
where
    A: ApiRequester + ?Sized,
{
    let response = api
        .api_request(Method::GET, &kind.collection_path(), None)
        .await?;

    let plural = kind.plural_key();
    let items = response
        .get(plural)
        .and_then(Value::as_array)
        .ok_or_else(|| schema_error(kind, plural))?;

    let found = items
        .iter()
        .filter_map(Value::as_object)
        .find(|item| item.get("label").and_then(Value::as_str) == Some(label))
        .cloned();

    if found.is_none() {
        debug!(%kind, label, "lookup by label found nothing");
    }
    Ok(found)
}

/// Extract the record nested under the singular kind key.
pub(crate) fn single_record(mut response: Value, kind: ResourceKind) -> Result<Record> {
    let singular = kind.singular_key();
    match response.get_mut(singular).map(Value::take) {
        Some(Value::Object(record)) => Ok(record),
        _ => Err(schema_error(kind, singular)),
    }
}

pub(crate) fn schema_error(kind: ResourceKind, key: &str) -> Error {
    Error::SchemaError {
        kind: kind.to_string(),
        key: key.to_string(),
    }
}
