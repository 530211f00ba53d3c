//! HTTP round trips to the management API

use crate::error::{Error, Result};
use crate::session::Session;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Status and body of one appliance response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One request/response exchange with the appliance
///
/// `Err` is reserved for connection-level failures; appliance-reported
/// errors come back as a non-2xx [`RawResponse`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<RawResponse>;
}

/// [`Transport`] over HTTPS with address failover
///
/// The next address is tried only when connecting fails. A timeout or a
/// dropped connection is returned as is, since the appliance may already
/// have acted on the request.
pub struct HttpTransport {
    http: reqwest::Client,
    addresses: Vec<String>,
    preferred: AtomicUsize,
    session: Arc<Session>,
}

impl HttpTransport {
    pub fn new(
        addresses: Vec<String>,
        insecure_skip_verify: bool,
        timeout: Duration,
        session: Arc<Session>,
    ) -> Result<Self> {
        if addresses.is_empty() {
            return Err(Error::Configuration(
                "at least one appliance address is required".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure_skip_verify)
            .build()
            .map_err(|e| {
                Error::Configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            addresses: addresses
                .into_iter()
                .map(|a| a.trim_end_matches('/').to_string())
                .collect(),
            preferred: AtomicUsize::new(0),
            session,
        })
    }

    #[must_use]
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Address that answered most recently
    #[must_use]
    pub fn preferred_address(&self) -> &str {
        let idx = self.preferred.load(Ordering::Relaxed) % self.addresses.len();
        &self.addresses[idx]
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<RawResponse> {
        let start = self.preferred.load(Ordering::Relaxed);
        let mut last_failure = None;

        for i in 0..self.addresses.len() {
            let idx = (start + i) % self.addresses.len();
            let url = format!("{}/{}", self.addresses[idx], path.trim_start_matches('/'));

            let mut request = self
                .http
                .request(method.clone(), &url)
                .header(reqwest::header::CONTENT_TYPE, "application/json");
            if let Some(token) = self.session.token() {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(%method, %url, "sending request");
            match request.send().await {
                Ok(response) => {
                    self.preferred.store(idx, Ordering::Relaxed);
                    let status = response.status().as_u16();
                    let body = response
                        .bytes()
                        .await
                        .map_err(|e| Error::transport(url.clone(), e))?;
                    debug!(%method, %url, status, "received response");
                    return Ok(RawResponse { status, body });
                }
                Err(e) if e.is_connect() => {
                    warn!(%url, error = %e, "appliance address refused connection");
                    last_failure = Some((url, e));
                }
                Err(e) => return Err(Error::transport(url, e)),
            }
        }

        match last_failure {
            Some((url, e)) => Err(Error::transport(url, e)),
            None => Err(Error::Configuration(
                "no appliance address configured".to_string(),
            )),
        }
    }
}

/// Build `path?k=v&...` with keys sorted and values percent-encoded
///
/// Empty values are dropped.
#[must_use]
pub fn build_uri(path: &str, params: &[(&str, String)]) -> String {
    let query: BTreeMap<&str, &str> = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (*k, v.as_str()))
        .collect();
    if query.is_empty() {
        return path.to_string();
    }
    let query = query
        .into_iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{path}?{query}")
}

/// Percent-encode a resource path so it travels as a single URL segment
#[must_use]
pub fn escape_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}
