//! Request signing.
//!
//! Every request carries an `Authorization: <access-key>:<signature>` header where
//! the signature is the base64 HMAC-SHA256 of
//!
//! ```text
//! METHOD\nHOST\nDATE\nPATH\nBODY
//! ```
//!
//! `BODY` is the exact JSON text sent on the wire and is empty for requests
//! without a body (the newline after `PATH` is always present). The server
//! rebuilds the same string from the `X-Date` header, so the date that is signed
//! must be the date that is sent.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;

use crate::config::Credentials;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Format of the `X-Date` header (RFC 1123, always GMT).
pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Formats a timestamp for the `X-Date` header.
#[must_use]
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// Builds the canonical string covered by the signature.
#[must_use]
pub fn canonical_string(
    method: &str,
    host: &str,
    date: &str,
    path: &str,
    body: Option<&str>,
) -> String {
    format!(
        "{method}\n{host}\n{date}\n{path}\n{}",
        body.unwrap_or_default()
    )
}

/// Date and authorization header values for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    /// Value of `X-Date`
    pub date: String,
    /// Value of `Authorization`
    pub authorization: String,
}

/// Signs requests with a pair of API credentials.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: Credentials,
}

impl RequestSigner {
    /// Create a signer for the given credentials.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Public access key the signatures are issued for.
    #[must_use]
    pub fn access_key(&self) -> &str {
        self.credentials.access_key()
    }

    /// Produces the `Authorization` value for fully specified inputs.
    ///
    /// Deterministic: the same inputs always give the same credential.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the secret cannot key the MAC.
    pub fn sign(
        &self,
        method: &str,
        host: &str,
        date: &str,
        path: &str,
        body: Option<&str>,
    ) -> Result<String> {
        let canonical = canonical_string(method, host, date, path, body);
        let mut mac =
            HmacSha256::new_from_slice(self.credentials.secret().expose_secret().as_bytes())
                .map_err(|err| Error::ConfigError(format!("Invalid signing secret: {err}")))?;
        mac.update(canonical.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!("{}:{signature}", self.credentials.access_key()))
    }

    /// Signs a request dated `at`, returning both header values.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign_at(
        &self,
        at: DateTime<Utc>,
        method: &str,
        host: &str,
        path: &str,
        body: Option<&str>,
    ) -> Result<SignedHeaders> {
        let date = http_date(at);
        let authorization = self.sign(method, host, &date, path, body)?;
        Ok(SignedHeaders {
            date,
            authorization,
        })
    }

    /// Signs a request dated now.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign_now(
        &self,
        method: &str,
        host: &str,
        path: &str,
        body: Option<&str>,
    ) -> Result<SignedHeaders> {
        self.sign_at(Utc::now(), method, host, path, body)
    }
}
