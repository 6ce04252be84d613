//! Resource object model.
//!
//! A [`Resource`] is a shared handle on the local view of one remote resource:
//! identity, label, the raw record returned by the API and typed attributes
//! derived from it. A session holds at most one live object per identifier;
//! looking the same resource up again returns another handle on it, and
//! deleting through any handle makes every handle reject further use. The
//! session registry only keeps weak references, so an object that is dropped
//! everywhere leaves the registry with it.
//!
//! Each kind declares its attributes through [`Snapshot`], naming exactly the
//! record keys it reads. A refreshed record missing one of them is a schema
//! mismatch and fails the refresh instead of leaving stale values behind.

use crate::context::SessionContext;
use crate::locator::{schema_error, single_record, Lookup, Record};
use crate::models::id_string;
use crate::session::Session;
use async_trait::async_trait;
use e24_core::{Error, ResourceId, ResourceKind, Result};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::debug;

/// Lifecycle of a bound resource object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// Attributes reflect the last fetch
    Fresh,
    /// An action was issued since the last fetch
    Stale,
    /// Deleted remotely; every further operation fails
    Deleted,
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Deleted => "deleted",
        };
        f.write_str(state)
    }
}

/// Typed attributes of one resource kind.
#[async_trait]
pub trait Snapshot: Sized + Clone + Send + Sync + 'static {
    /// Kind the attributes belong to.
    const KIND: ResourceKind;

    /// Record keys the attributes are derived from.
    const KEYS: &'static [&'static str];

    /// Sub-resources an object of this kind keeps alive.
    type Owned: Clone + Default + Send + Sync + 'static;

    /// Derive the attributes from a record known to contain every key in `KEYS`.
    fn apply(record: &Record) -> Result<Self>;

    /// Check `KEYS` and derive the attributes.
    fn from_record(record: &Record) -> Result<Self> {
        ensure_keys(Self::KIND, Self::KEYS, record)?;
        Self::apply(record)
    }

    /// Resolve the sub-resources named by `attributes`, reusing those in `current`.
    async fn load_owned(
        _session: &Session,
        _attributes: &Self,
        _current: &Self::Owned,
    ) -> Result<Self::Owned> {
        Ok(Self::Owned::default())
    }

    /// Called once the object has been deleted remotely.
    fn release_owned(_owned: &Self::Owned) {}
}

/// Fail with [`Error::SchemaError`] on the first key of `keys` missing from `record`.
pub fn ensure_keys(kind: ResourceKind, keys: &[&str], record: &Record) -> Result<()> {
    match keys.iter().find(|key| !record.contains_key(**key)) {
        Some(key) => Err(schema_error(kind, key)),
        None => Ok(()),
    }
}

/// Deserialize `record[key]`, failing with [`Error::SchemaError`] if it is
/// missing or has the wrong shape.
pub fn field<T: DeserializeOwned>(record: &Record, kind: ResourceKind, key: &str) -> Result<T> {
    let value = record.get(key).ok_or_else(|| schema_error(kind, key))?;
    serde_json::from_value(value.clone()).map_err(|_| schema_error(kind, key))
}

/// Kinds whose deletion takes other resources with it.
pub trait CascadeDelete {
    /// Identifiers removed remotely together with this resource.
    fn owned_resources(&self) -> Vec<ResourceId>;
}

struct Current<A: Snapshot> {
    label: String,
    data: Record,
    attributes: A,
    owned: A::Owned,
    state: ObjectState,
}

struct Shared<A: Snapshot> {
    session: Session,
    id: ResourceId,
    current: RwLock<Current<A>>,
}

impl<A: Snapshot> Drop for Shared<A> {
    fn drop(&mut self) {
        self.session.release(&self.id);
    }
}

/// Handle on a bound resource object of the kind described by `A`.
///
/// Clones are handles on the same object.
pub struct Resource<A: Snapshot> {
    shared: Arc<Shared<A>>,
}

impl<A: Snapshot> Clone for Resource<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: Snapshot> fmt::Debug for Resource<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.read();
        f.debug_struct("Resource")
            .field("kind", &A::KIND)
            .field("id", &self.shared.id)
            .field("label", &current.label)
            .field("state", &current.state)
            .finish_non_exhaustive()
    }
}

impl<A: Snapshot> Resource<A> {
    /// Locate the resource and register it in `session`.
    ///
    /// If the session already holds a live object for the identifier, a handle
    /// on that object is returned instead of a new one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the lookup finds nothing.
    pub async fn find(session: &Session, lookup: &Lookup) -> Result<Self> {
        if let Lookup::Id(id) = lookup {
            if let Some(live) = Self::live(session, id)? {
                return Ok(live);
            }
        }

        let record = session
            .find(A::KIND, lookup)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} with {lookup} not found", A::KIND)))?;

        let id = match (record.get("id").and_then(id_string), lookup) {
            (Some(id), _) => ResourceId::new(id)?,
            (None, Lookup::Id(id)) => id.clone(),
            (None, Lookup::Label(_)) => return Err(schema_error(A::KIND, "id")),
        };
        if let Some(live) = Self::live(session, &id)? {
            return Ok(live);
        }

        let attributes = A::from_record(&record)?;
        let owned = A::load_owned(session, &attributes, &A::Owned::default()).await?;

        let resource = Self {
            shared: Arc::new(Shared {
                session: session.clone(),
                id,
                current: RwLock::new(Current {
                    label: record_label(&record),
                    data: record,
                    attributes,
                    owned,
                    state: ObjectState::Fresh,
                }),
            }),
        };
        resource.register();
        Ok(resource)
    }

    /// Locate by identifier.
    pub async fn by_id(session: &Session, id: impl Into<String>) -> Result<Self> {
        Self::find(session, &Lookup::by_id(id)?).await
    }

    /// Locate by exact label.
    pub async fn by_label(session: &Session, label: impl Into<String>) -> Result<Self> {
        Self::find(session, &Lookup::by_label(label)?).await
    }

    /// Locate using the explicit session or the context's default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when no session is available and
    /// [`Error::InvalidArgument`] unless exactly one of `id` and `label` is given.
    pub async fn find_in(
        context: &SessionContext,
        session: Option<&Session>,
        id: Option<&str>,
        label: Option<&str>,
    ) -> Result<Self> {
        let session = context.resolve(session)?;
        let lookup = Lookup::from_parts(id, label)?;
        Self::find(session, &lookup).await
    }

    fn live(session: &Session, id: &ResourceId) -> Result<Option<Self>> {
        let Some((kind, handle)) = session.live_object(id) else {
            return Ok(None);
        };
        match handle.downcast::<Shared<A>>() {
            Ok(shared) => {
                debug!(%kind, %id, "reusing live resource");
                Ok(Some(Self { shared }))
            }
            Err(_) => Err(Error::InvalidArgument(format!(
                "`{id}` is registered as a {kind}, not a {}",
                A::KIND
            ))),
        }
    }

    fn register(&self) {
        let label = self.read().label.clone();
        let handle: Weak<dyn Any + Send + Sync> = Arc::<Shared<A>>::downgrade(&self.shared);
        self.shared
            .session
            .register(&self.shared.id, A::KIND, &label, handle);
    }

    /// Re-fetch the record and re-derive every attribute and sub-resource from it.
    ///
    /// Nothing is committed unless every request succeeds; on failure the
    /// object keeps its previous data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StateError`] after deletion and [`Error::SchemaError`]
    /// when the refreshed record lacks an expected key.
    pub async fn update(&self) -> Result<()> {
        self.ensure_live()?;
        let session = self.session();
        let path = A::KIND.item_path(self.id());
        let response = session.request(Method::GET, &path, None).await?;
        let record = single_record(response, A::KIND)?;

        if let Some(id) = record.get("id").and_then(id_string) {
            if id != self.id().as_str() {
                return Err(schema_error(A::KIND, "id"));
            }
        }
        let attributes = A::from_record(&record)?;
        let previous_owned = self.read().owned.clone();
        let owned = A::load_owned(session, &attributes, &previous_owned).await?;

        let label = record_label(&record);
        let replaced = {
            let mut current = self.write();
            if current.state == ObjectState::Deleted {
                return Err(self.deleted_error());
            }
            current.label.clone_from(&label);
            current.data = record;
            current.attributes = attributes;
            current.state = ObjectState::Fresh;
            std::mem::replace(&mut current.owned, owned)
        };
        session.relabel(self.id(), &label);
        drop(replaced);
        drop(previous_owned);

        debug!(kind = %A::KIND, id = %self.id(), "resource refreshed");
        Ok(())
    }

    /// Delete the resource remotely and drop it from the session registry.
    ///
    /// Every handle on the object observes the deletion.
    pub async fn delete(&self) -> Result<()> {
        self.ensure_live()?;
        let session = self.session();
        let path = A::KIND.item_path(self.id());
        session.request(Method::DELETE, &path, None).await?;

        let owned = {
            let mut current = self.write();
            current.state = ObjectState::Deleted;
            current.owned.clone()
        };
        session.deregister(self.id());
        A::release_owned(&owned);
        debug!(kind = %A::KIND, id = %self.id(), "resource deleted");
        Ok(())
    }

    /// Issue an action; local attributes are not touched until [`update`](Self::update).
    pub(crate) async fn action(
        &self,
        method: Method,
        action: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        self.ensure_live()?;
        let path = A::KIND.action_path(self.id(), action);
        let response = self.session().request(method, &path, body.as_ref()).await?;
        {
            let mut current = self.write();
            if current.state == ObjectState::Fresh {
                current.state = ObjectState::Stale;
            }
        }
        Ok(response)
    }

    /// Mark the object deleted without a request; used when a parent took it along.
    pub(crate) fn mark_deleted(&self) {
        self.write().state = ObjectState::Deleted;
        self.session().deregister(self.id());
    }

    pub(crate) fn owned(&self) -> A::Owned {
        self.read().owned.clone()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.read().state == ObjectState::Deleted {
            return Err(self.deleted_error());
        }
        Ok(())
    }

    fn deleted_error(&self) -> Error {
        Error::StateError(format!("{} `{}` has been deleted", A::KIND, self.id()))
    }

    fn read(&self) -> RwLockReadGuard<'_, Current<A>> {
        self.shared
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Current<A>> {
        self.shared
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Resource kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        A::KIND
    }

    /// Resource identifier.
    #[must_use]
    pub fn id(&self) -> &ResourceId {
        &self.shared.id
    }

    /// Label as of the last fetch.
    #[must_use]
    pub fn label(&self) -> String {
        self.read().label.clone()
    }

    /// Raw record as of the last fetch.
    #[must_use]
    pub fn data(&self) -> Record {
        self.read().data.clone()
    }

    /// Typed attributes as of the last fetch.
    #[must_use]
    pub fn attributes(&self) -> A {
        self.read().attributes.clone()
    }

    /// Lifecycle state.
    #[must_use]
    pub fn object_state(&self) -> ObjectState {
        self.read().state
    }

    /// True once deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.object_state() == ObjectState::Deleted
    }

    /// True if both handles refer to the same object.
    #[must_use]
    pub fn same_object(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Session the object is bound to.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.shared.session
    }
}

fn record_label(record: &Record) -> String {
    record
        .get("label")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
