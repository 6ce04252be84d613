//! Transport dispatcher.
//!
//! Sends one signed request and decides whether it succeeded. A request
//! succeeds only when the HTTP status is 2xx *and* the JSON body carries
//! `"success": true`. Nothing is retried.

use e24_core::{E24Config, Error, Result};
use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

const USER_AGENT: &str = concat!("e24-compute/", env!("CARGO_PKG_VERSION"));

/// Methods the API accepts.
pub const SUPPORTED_METHODS: [Method; 4] =
    [Method::GET, Method::POST, Method::PUT, Method::DELETE];

/// Fails with [`Error::InvalidArgument`] for methods outside GET/POST/PUT/DELETE.
pub fn ensure_supported(method: &Method) -> Result<()> {
    if SUPPORTED_METHODS.contains(method) {
        Ok(())
    } else {
        warn!(%method, "rejecting unsupported HTTP method");
        Err(Error::InvalidArgument(format!("Unrecognized method: {method}")))
    }
}

/// Sends requests over a single reusable HTTP client.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    http: Client,
}

impl Dispatcher {
    /// Build a dispatcher with timeouts taken from `config`.
    pub fn new(config: &E24Config) -> Result<Self> {
        let http = ClientBuilder::new()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| Error::ConfigError(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self { http })
    }

    /// Wrap an existing HTTP client.
    #[must_use]
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    /// Send a request and return its parsed JSON body.
    ///
    /// `body` is sent verbatim, so it must be the same text that was signed.
    pub async fn dispatch(
        &self,
        method: Method,
        headers: HeaderMap,
        url: Url,
        body: Option<String>,
    ) -> Result<Value> {
        ensure_supported(&method)?;

        let path = url.path().to_string();
        let mut request = self.http.request(method.clone(), url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        info!(%method, path = %path, "e24 request");
        let response = request.send().await?;
        let status = response.status();

        // 404 bodies are frequently empty or HTML; never try to decode them.
        if status == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            warn!(%method, path = %path, "e24 resource not found");
            return Err(Error::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) if status.is_success() => {
                warn!(%method, path = %path, %status, "malformed e24 response");
                return Err(Error::ParseError(format!(
                    "Malformed response for `{path}` (status {status}): {err}; body: {text}"
                )));
            }
            Err(_) => {
                return Err(Error::RequestFailed {
                    status: status.as_u16(),
                    body: text,
                })
            }
        };

        let succeeded = value.get("success").and_then(Value::as_bool) == Some(true);
        if !status.is_success() || !succeeded {
            warn!(%method, path = %path, %status, succeeded, "e24 request failed");
            return Err(Error::RequestFailed {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(&E24Config::default()).unwrap()
    }

    fn url(server: &MockServer, path: &str) -> Url {
        Url::parse(&format!("{}{path}", server.uri())).unwrap()
    }

    #[test]
    fn supported_methods() {
        for m in [Method::GET, Method::POST, Method::PUT, Method::DELETE] {
            assert!(ensure_supported(&m).is_ok());
        }
        for m in [Method::PATCH, Method::HEAD, Method::OPTIONS] {
            assert!(matches!(
                ensure_supported(&m),
                Err(Error::InvalidArgument(_))
            ));
        }
    }

    #[tokio::test]
    async fn success_returns_parsed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/virtual-machines"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "virtual_machines": []})),
            )
            .mount(&server)
            .await;

        let value = dispatcher()
            .dispatch(
                Method::GET,
                HeaderMap::new(),
                url(&server, "/v2/virtual-machines"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(value["virtual_machines"], json!([]));
    }

    #[tokio::test]
    async fn body_and_headers_are_sent_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v2/virtual-machines"))
            .and(header_exists("x-date"))
            .and(body_string("{\"create_vm\":{\"cpus\":2}}"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-date",
            "Thu, 15 Oct 2026 09:30:00 GMT".parse().unwrap(),
        );
        dispatcher()
            .dispatch(
                Method::PUT,
                headers,
                url(&server, "/v2/virtual-machines"),
                Some("{\"create_vm\":{\"cpus\":2}}".to_string()),
            )
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(
            received[0].headers.get("x-date").unwrap(),
            "Thu, 15 Oct 2026 09:30:00 GMT"
        );
    }

    #[tokio::test]
    async fn business_failure_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/virtual-machines-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
            .mount(&server)
            .await;

        let err = dispatcher()
            .dispatch(
                Method::GET,
                HeaderMap::new(),
                url(&server, "/v2/virtual-machines-1"),
                None,
            )
            .await
            .unwrap_err();
        assert!(err.is_transport_failure());
        assert_eq!(err.status(), Some(200));
    }

    #[tokio::test]
    async fn missing_success_flag_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/templates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"templates": []})))
            .mount(&server)
            .await;

        let err = dispatcher()
            .dispatch(Method::GET, HeaderMap::new(), url(&server, "/v2/templates"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RequestFailed { status: 200, .. }));
    }

    #[tokio::test]
    async fn not_found_skips_json_decoding() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/virtual-machines-2"))
            .respond_with(ResponseTemplate::new(404).set_body_string("<html>gone</html>"))
            .mount(&server)
            .await;

        let err = dispatcher()
            .dispatch(
                Method::GET,
                HeaderMap::new(),
                url(&server, "/v2/virtual-machines-2"),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::RequestFailed {
                status: 404,
                body: "<html>gone</html>".to_string()
            }
        );
    }

    #[tokio::test]
    async fn http_error_with_success_flag_still_fails() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v2/storage-volumes/v1"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;

        let err = dispatcher()
            .dispatch(
                Method::DELETE,
                HeaderMap::new(),
                url(&server, "/v2/storage-volumes/v1"),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn malformed_success_response_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/regions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = dispatcher()
            .dispatch(Method::GET, HeaderMap::new(), url(&server, "/v2/regions"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
        assert!(err.is_transport_failure());
    }

    #[tokio::test]
    async fn unsupported_method_never_reaches_server() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(0)
            .mount(&server)
            .await;

        let bad = Method::from_bytes(b"BAD_METHOD").unwrap();
        let err = dispatcher()
            .dispatch(bad, HeaderMap::new(), url(&server, "/v2/virtual-machines"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
