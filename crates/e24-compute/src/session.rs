//! e24cloud session.
//!
//! A [`Session`] owns the HTTP client, the request signer, the lazily resolved
//! provisioning zone and the registry of live resource objects. It is a cheap
//! handle: clones share the same state, which is how resource objects stay
//! bound to the session that created them.

use crate::locator::{self, ApiRequester, Lookup, Record};
use crate::models::{id_string, ProvisionVm, RegionList, REGIONS_PATH, TEMPLATES_PATH};
use crate::transport::Dispatcher;
use async_trait::async_trait;
use e24_core::{
    Credentials, E24Config, Endpoint, Error, RequestSigner, ResourceId, ResourceKind, Result,
    TemplateId, ZoneId,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::debug;
use url::Url;

const X_DATE: HeaderName = HeaderName::from_static("x-date");

/// What the registry knows about a live resource object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Kind of the resource.
    pub kind: ResourceKind,
    /// Label at the time of the last fetch.
    pub label: String,
}

/// Registry slot: the entry plus a weak handle to the object itself.
struct Slot {
    entry: RegistryEntry,
    handle: Weak<dyn Any + Send + Sync>,
}

impl Slot {
    fn is_live(&self) -> bool {
        self.handle.strong_count() > 0
    }
}

/// Builder for [`Session`].
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    credentials: Credentials,
    config: E24Config,
    zone_id: Option<ZoneId>,
}

impl SessionBuilder {
    /// Start from explicit credentials and the default configuration.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            config: E24Config::default(),
            zone_id: None,
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: E24Config) -> Self {
        self.config = config;
        self
    }

    /// Select an endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.config.endpoint = endpoint.label().to_string();
        self
    }

    /// Send requests to `base_url` instead of the endpoint's hostname.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config = self.config.with_base_url(base_url);
        self
    }

    /// Pre-seed the provisioning zone so it is never looked up.
    #[must_use]
    pub fn with_zone_id(mut self, zone_id: ZoneId) -> Self {
        self.zone_id = Some(zone_id);
        self
    }

    /// Build the session.
    pub fn build(self) -> Result<Session> {
        self.config.check()?;
        let endpoint = self.config.endpoint()?;
        let base_url = self.config.base_url()?;
        let host = self.config.signing_host()?;
        let dispatcher = Dispatcher::new(&self.config)?;

        debug!(%endpoint, %host, "e24 session created");
        Ok(Session {
            inner: Arc::new(SessionInner {
                endpoint,
                base_url,
                host,
                signer: RequestSigner::new(self.credentials),
                dispatcher,
                zone_id: RwLock::new(self.zone_id),
                registry: RwLock::new(HashMap::new()),
            }),
        })
    }
}

struct SessionInner {
    endpoint: Endpoint,
    base_url: Url,
    host: String,
    signer: RequestSigner,
    dispatcher: Dispatcher,
    zone_id: RwLock<Option<ZoneId>>,
    registry: RwLock<HashMap<ResourceId, Slot>>,
}

/// Authenticated session against one e24cloud endpoint.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Session for `endpoint` with credentials from the environment.
    pub fn new(endpoint: Endpoint) -> Result<Self> {
        SessionBuilder::new(Credentials::from_env()?)
            .with_endpoint(endpoint)
            .build()
    }

    /// Session configured entirely from the environment.
    pub fn from_env() -> Result<Self> {
        SessionBuilder::new(Credentials::from_env()?)
            .with_config(E24Config::from_env()?)
            .build()
    }

    /// Start building a session.
    #[must_use]
    pub fn builder(credentials: Credentials) -> SessionBuilder {
        SessionBuilder::new(credentials)
    }

    /// Endpoint the session talks to.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.inner.endpoint
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Host value covered by request signatures.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// Signer used for every request of this session.
    #[must_use]
    pub fn signer(&self) -> &RequestSigner {
        &self.inner.signer
    }

    /// True if both handles refer to the same session.
    #[must_use]
    pub fn same_session(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Send a signed request and return the successful response body.
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let body = body.map(serde_json::to_string).transpose()?;
        let signed =
            self.inner
                .signer
                .sign_now(method.as_str(), &self.inner.host, path, body.as_deref())?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(X_DATE, header_value(&signed.date)?);
        headers.insert(AUTHORIZATION, header_value(&signed.authorization)?);

        let url = self.build_url(path)?;
        self.inner.dispatcher.dispatch(method, headers, url, body).await
    }

    /// Locate a resource by id or label; exactly one must be given.
    ///
    /// `Ok(None)` means the resource was not found.
    pub async fn locate(
        &self,
        kind: ResourceKind,
        id: Option<&str>,
        label: Option<&str>,
    ) -> Result<Option<Record>> {
        let lookup = Lookup::from_parts(id, label)?;
        self.find(kind, &lookup).await
    }

    /// Locate a resource through a prepared [`Lookup`].
    pub async fn find(&self, kind: ResourceKind, lookup: &Lookup) -> Result<Option<Record>> {
        debug!(%kind, %lookup, "locating resource");
        locator::locate(self, kind, lookup).await
    }

    /// Cached provisioning zone, if it was already resolved.
    #[must_use]
    pub fn zone_id(&self) -> Option<ZoneId> {
        self.inner
            .zone_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolve the provisioning zone of the endpoint, once per session.
    pub async fn resolve_zone(&self) -> Result<ZoneId> {
        if let Some(zone_id) = self.zone_id() {
            return Ok(zone_id);
        }

        let response = self.request(Method::GET, REGIONS_PATH, None).await?;
        let regions: RegionList = serde_json::from_value(response)?;
        let label = self.inner.endpoint.label();
        let zone_id = regions
            .zone_for(label)
            .map(|zone| zone.id.clone())
            .ok_or_else(|| Error::ZoneUnresolved(label.to_string()))?;

        debug!(zone = %zone_id, endpoint = label, "provisioning zone resolved");
        *self
            .inner
            .zone_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(zone_id.clone());
        Ok(zone_id)
    }

    /// Ask the API to create a VM and return its identifier.
    ///
    /// The VM is materialised asynchronously by the provider, so the id may not
    /// be fetchable right away; nothing is registered.
    pub async fn provision_vm(&self, request: &ProvisionVm) -> Result<ResourceId> {
        request.validate()?;
        let zone_id = self.resolve_zone().await?;
        let body = serde_json::to_value(request.to_body(&zone_id))?;

        let kind = ResourceKind::VirtualMachine;
        let response = self
            .request(Method::PUT, &kind.collection_path(), Some(&body))
            .await?;

        let id = response
            .get(kind.singular_key())
            .and_then(|vm| vm.get("id"))
            .and_then(id_string)
            .ok_or_else(|| locator::schema_error(kind, "id"))?;
        debug!(%id, name = %request.name, "VM provisioning requested");
        ResourceId::new(id)
    }

    /// OS templates keyed by id; the id is removed from each nested record.
    pub async fn list_os_templates(&self) -> Result<BTreeMap<TemplateId, Record>> {
        let response = self.request(Method::GET, TEMPLATES_PATH, None).await?;
        let templates = response
            .get("templates")
            .and_then(Value::as_array)
            .ok_or_else(|| template_schema_error("templates"))?;

        let mut out = BTreeMap::new();
        for template in templates {
            let mut record = template
                .as_object()
                .cloned()
                .ok_or_else(|| template_schema_error("templates"))?;
            let id = record
                .remove("id")
                .as_ref()
                .and_then(id_string)
                .ok_or_else(|| template_schema_error("id"))?;
            out.insert(TemplateId::new(id)?, record);
        }
        Ok(out)
    }

    /// True if a live object for `id` exists in this session.
    #[must_use]
    pub fn is_registered(&self, id: &ResourceId) -> bool {
        self.read_registry().get(id).is_some_and(Slot::is_live)
    }

    /// Registry entry for `id`, if its object is still live.
    #[must_use]
    pub fn registry_entry(&self, id: &ResourceId) -> Option<RegistryEntry> {
        self.read_registry()
            .get(id)
            .filter(|slot| slot.is_live())
            .map(|slot| slot.entry.clone())
    }

    /// Identifiers of all live objects, sorted.
    #[must_use]
    pub fn registered_ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self
            .read_registry()
            .iter()
            .filter(|(_, slot)| slot.is_live())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of live objects.
    #[must_use]
    pub fn registry_len(&self) -> usize {
        self.read_registry()
            .values()
            .filter(|slot| slot.is_live())
            .count()
    }

    pub(crate) fn register(
        &self,
        id: &ResourceId,
        kind: ResourceKind,
        label: &str,
        handle: Weak<dyn Any + Send + Sync>,
    ) {
        let slot = Slot {
            entry: RegistryEntry {
                kind,
                label: label.to_string(),
            },
            handle,
        };
        let previous = self.write_registry().insert(id.clone(), slot);
        if previous.is_some_and(|slot| slot.is_live()) {
            debug!(%kind, %id, "rebinding registered resource");
        } else {
            debug!(%kind, %id, "resource registered");
        }
    }

    /// Live object registered under `id`.
    ///
    /// The registry lock is released before the handle is returned, so dropping
    /// it can never deadlock with [`release`](Self::release).
    pub(crate) fn live_object(
        &self,
        id: &ResourceId,
    ) -> Option<(ResourceKind, Arc<dyn Any + Send + Sync>)> {
        let registry = self.read_registry();
        let slot = registry.get(id)?;
        let handle = slot.handle.upgrade()?;
        Some((slot.entry.kind, handle))
    }

    pub(crate) fn relabel(&self, id: &ResourceId, label: &str) {
        if let Some(slot) = self.write_registry().get_mut(id) {
            slot.entry.label = label.to_string();
        }
    }

    pub(crate) fn deregister(&self, id: &ResourceId) -> Option<RegistryEntry> {
        let removed = self.write_registry().remove(id);
        if removed.is_some() {
            debug!(%id, "resource deregistered");
        }
        removed.map(|slot| slot.entry)
    }

    /// Drop the slot for `id` once its object is gone.
    pub(crate) fn release(&self, id: &ResourceId) {
        let mut registry = self.write_registry();
        if registry.get(id).is_some_and(|slot| !slot.is_live()) {
            registry.remove(id);
            debug!(%id, "dropped resource released");
        }
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, HashMap<ResourceId, Slot>> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, HashMap<ResourceId, Slot>> {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn build_url(&self, path: &str) -> Result<Url> {
        let normalized = path.strip_prefix('/').unwrap_or(path);
        self.inner
            .base_url
            .join(normalized)
            .map_err(|err| Error::InvalidArgument(format!("Invalid API path `{path}`: {err}")))
    }
}

#[async_trait]
impl ApiRequester for Session {
    async fn api_request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        self.request(method, path, body.as_ref()).await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.inner.endpoint)
            .field("base_url", &self.inner.base_url.as_str())
            .field("zone_id", &self.zone_id())
            .field("registered", &self.registry_len())
            .finish_non_exhaustive()
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|err| Error::InvalidArgument(format!("Invalid header value: {err}")))
}

fn template_schema_error(key: &str) -> Error {
    Error::SchemaError {
        kind: "template".to_string(),
        key: key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(server: &MockServer) -> Session {
        Session::builder(Credentials::new("access_key", "secret_key"))
            .with_base_url(server.uri())
            .build()
            .unwrap()
    }

    #[test]
    fn builder_rejects_bad_config() {
        let err = Session::builder(Credentials::new("k", "s"))
            .with_config(E24Config::default().with_timeout(0))
            .build()
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn session_defaults_to_first_endpoint() {
        let session = Session::builder(Credentials::new("k", "s")).build().unwrap();
        assert_eq!(session.endpoint(), Endpoint::Dc1Public1);
        assert_eq!(session.host(), "eu-poland-1poznan.api.e24cloud.com");
        assert!(session.zone_id().is_none());
        assert_eq!(session.registry_len(), 0);
    }

    #[tokio::test]
    async fn request_is_signed_with_sent_date() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/virtual-machines/testid/resize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;

        let session = session(&server);
        let body = json!({"cores": 4, "ram": 2048});
        let response = session
            .request(Method::POST, "/v2/virtual-machines/testid/resize", Some(&body))
            .await
            .unwrap();
        assert_eq!(response, json!({"success": true}));

        let received = server.received_requests().await.unwrap();
        let request = &received[0];
        let date = request.headers.get("x-date").unwrap().to_str().unwrap();
        let authorization = request.headers.get("authorization").unwrap().to_str().unwrap();
        let sent_body = String::from_utf8(request.body.clone()).unwrap();

        assert_eq!(
            request.headers.get("content-type").unwrap().to_str().unwrap(),
            "application/json"
        );
        assert_eq!(sent_body, serde_json::to_string(&body).unwrap());
        let expected = session
            .signer()
            .sign(
                "POST",
                session.host(),
                date,
                "/v2/virtual-machines/testid/resize",
                Some(&sent_body),
            )
            .unwrap();
        assert_eq!(authorization, expected);
    }

    #[tokio::test]
    async fn bodyless_request_signs_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/virtual-machines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;

        let session = session(&server);
        session
            .request(Method::GET, "/v2/virtual-machines", None)
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        let date = received[0].headers.get("x-date").unwrap().to_str().unwrap();
        let authorization = received[0]
            .headers
            .get("authorization")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(received[0].body.is_empty());
        assert_eq!(
            authorization,
            session
                .signer()
                .sign("GET", session.host(), date, "/v2/virtual-machines", None)
                .unwrap()
        );
    }

    #[tokio::test]
    async fn locate_without_id_or_label_is_invalid() {
        let server = MockServer::start().await;
        let err = session(&server)
            .locate(ResourceKind::VirtualMachine, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn locate_by_id_translates_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/virtual-machines/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let record = session(&server)
            .locate(ResourceKind::VirtualMachine, Some("missing"), None)
            .await
            .unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn zone_is_resolved_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/regions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "regions": [{"id": "r1", "zones": [
                    {"id": "zone-dc1", "label": "DC1/PUBLIC-1"},
                    {"id": "zone-dc2", "label": "DC2/PUBLIC-1"}
                ]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server);
        assert_eq!(session.resolve_zone().await.unwrap().as_str(), "zone-dc1");
        assert_eq!(session.resolve_zone().await.unwrap().as_str(), "zone-dc1");
        assert_eq!(session.zone_id().unwrap().as_str(), "zone-dc1");
    }

    #[tokio::test]
    async fn unknown_zone_is_config_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/regions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "regions": [{"id": "r1", "zones": [{"id": "z9", "label": "DC9/PRIVATE"}]}]
            })))
            .mount(&server)
            .await;

        let err = session(&server).resolve_zone().await.unwrap_err();
        assert_eq!(err, Error::ZoneUnresolved("DC1/PUBLIC-1".to_string()));
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn provision_vm_returns_id_only() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v2/virtual-machines"))
            .and(body_json(json!({
                "create_vm": {
                    "cpus": 2,
                    "ram": 1024,
                    "zone_id": "test_zone_id",
                    "name": "test_vm",
                    "boot_type": "image",
                    "os": "2599",
                    "password": "placeholder123placeholder123"
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "virtual_machine": {"id": "test_create_vm"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = Session::builder(Credentials::new("k", "s"))
            .with_base_url(server.uri())
            .with_zone_id(ZoneId::new("test_zone_id").unwrap())
            .build()
            .unwrap();
        let request = ProvisionVm::new("test_vm", 2, 1024, TemplateId::new("2599").unwrap())
            .with_password("placeholder123placeholder123");

        let id = session.provision_vm(&request).await.unwrap();
        assert_eq!(id.as_str(), "test_create_vm");
        assert_eq!(session.registry_len(), 0);
    }

    #[tokio::test]
    async fn provision_vm_validates_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(0)
            .mount(&server)
            .await;

        let request = ProvisionVm::new("vm", 0, 1024, TemplateId::new("1").unwrap());
        let err = session(&server).provision_vm(&request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn list_os_templates_strips_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/templates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "templates": [
                    {"id": 2599, "name": "Ubuntu 24.04", "family": "linux"},
                    {"id": "win-2022", "name": "Windows Server 2022"}
                ]
            })))
            .mount(&server)
            .await;

        let templates = session(&server).list_os_templates().await.unwrap();
        assert_eq!(templates.len(), 2);

        let ubuntu = &templates[&TemplateId::new("2599").unwrap()];
        assert_eq!(ubuntu["name"], json!("Ubuntu 24.04"));
        assert!(!ubuntu.contains_key("id"));
        assert!(templates.contains_key(&TemplateId::new("win-2022").unwrap()));
    }

    fn handle() -> Arc<dyn Any + Send + Sync> {
        Arc::new(())
    }

    #[test]
    fn registry_bookkeeping() {
        let session = Session::builder(Credentials::new("k", "s")).build().unwrap();
        let id = ResourceId::new("S1").unwrap();
        let object = handle();

        session.register(&id, ResourceKind::StorageVolume, "data", Arc::downgrade(&object));
        assert!(session.is_registered(&id));
        session.relabel(&id, "renamed");
        assert_eq!(
            session.registry_entry(&id),
            Some(RegistryEntry {
                kind: ResourceKind::StorageVolume,
                label: "renamed".to_string()
            })
        );

        session.register(&id, ResourceKind::StorageVolume, "again", Arc::downgrade(&object));
        assert_eq!(session.registry_len(), 1);

        let (kind, live) = session.live_object(&id).unwrap();
        assert_eq!(kind, ResourceKind::StorageVolume);
        assert!(Arc::ptr_eq(&live, &object));
        drop(live);

        assert!(session.deregister(&id).is_some());
        assert!(session.deregister(&id).is_none());
        assert!(session.registered_ids().is_empty());
    }

    #[test]
    fn dropped_objects_are_not_registered() {
        let session = Session::builder(Credentials::new("k", "s")).build().unwrap();
        let kept_id = ResourceId::new("V1").unwrap();
        let dropped_id = ResourceId::new("V2").unwrap();
        let kept = handle();
        let dropped = handle();

        session.register(&kept_id, ResourceKind::VirtualMachine, "a", Arc::downgrade(&kept));
        session.register(&dropped_id, ResourceKind::VirtualMachine, "b", Arc::downgrade(&dropped));
        drop(dropped);

        assert!(!session.is_registered(&dropped_id));
        assert!(session.live_object(&dropped_id).is_none());
        assert!(session.registry_entry(&dropped_id).is_none());
        assert_eq!(session.registered_ids(), vec![kept_id.clone()]);

        session.release(&dropped_id);
        session.release(&kept_id);
        assert!(session.is_registered(&kept_id));
        assert_eq!(session.registry_len(), 1);
    }

    #[test]
    fn clones_share_state() {
        let session = Session::builder(Credentials::new("k", "s")).build().unwrap();
        let clone = session.clone();
        let other = Session::builder(Credentials::new("k", "s")).build().unwrap();
        let object = handle();

        clone.register(
            &ResourceId::new("V1").unwrap(),
            ResourceKind::VirtualMachine,
            "",
            Arc::downgrade(&object),
        );
        assert_eq!(session.registry_len(), 1);
        assert!(session.same_session(&clone));
        assert!(!session.same_session(&other));
    }
}
