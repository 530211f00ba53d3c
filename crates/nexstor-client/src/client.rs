//! Authenticated request plumbing shared by every resource API

use crate::error::{Error, Result, classify};
use crate::jobs::monitor_job_id;
use crate::session::Session;
use crate::transport::{HttpTransport, RawResponse, Transport};
use bytes::Bytes;
use nexstor_common::Config;
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Appliance management client
///
/// Calls are issued one at a time per operation; a `Client` may be shared
/// across tasks, in which case re-login after an expired token happens once.
pub struct Client {
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    credentials: Option<Credentials>,
    login_lock: tokio::sync::Mutex<()>,
    pub(crate) job_poll_interval: Duration,
    pub(crate) job_timeout: Duration,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<Session>) -> Self {
        Self {
            transport,
            session,
            credentials: None,
            login_lock: tokio::sync::Mutex::new(()),
            job_poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(300),
        }
    }

    /// Build an HTTPS client from configuration (does not log in)
    pub fn from_config(config: &Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        let session = Arc::new(Session::new());
        let transport = HttpTransport::new(
            config.appliance.addresses.clone(),
            config.appliance.insecure_skip_verify,
            config.client.request_timeout(),
            Arc::clone(&session),
        )?;

        Ok(Self::new(Arc::new(transport), session)
            .with_credentials(&config.appliance.username, &config.appliance.password)
            .with_job_timing(
                config.client.job_poll_interval(),
                config.client.job_timeout(),
            ))
    }

    #[must_use]
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        });
        self
    }

    #[must_use]
    pub fn with_job_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.job_poll_interval = poll_interval;
        self.job_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Obtain a fresh token with the configured credentials
    #[tracing::instrument(skip(self))]
    pub async fn login(&self) -> Result<()> {
        let _guard = self.login_lock.lock().await;
        self.login_locked().await
    }

    async fn login_locked(&self) -> Result<()> {
        #[derive(Deserialize)]
        struct LoginResponse {
            #[serde(default)]
            token: String,
        }

        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| {
                Error::Configuration("no credentials configured".to_string())
            })?;

        self.session.clear();
        let body = json!({
            "username": credentials.username,
            "password": credentials.password,
        });
        let response = self
            .transport
            .send(Method::POST, "auth/login", Some(&body))
            .await?;

        if !response.is_success() {
            let err = classify("login", response.status, &response.body);
            if err.is_auth() {
                error!(
                    username = %credentials.username,
                    "login rejected, please make sure to use correct address and password"
                );
            }
            return Err(err);
        }

        let parsed: LoginResponse = decode("login", &response.body)?;
        if parsed.token.is_empty() {
            return Err(Error::MissingToken {
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }
        self.session.set_token(parsed.token);
        info!(username = %credentials.username, "logged in to appliance");
        Ok(())
    }

    /// Log in again unless another task already replaced `stale`
    async fn relogin(&self, stale: Option<String>) -> Result<()> {
        let _guard = self.login_lock.lock().await;
        if self.session.token().is_some() && self.session.token() != stale {
            debug!("token already refreshed by a concurrent request");
            return Ok(());
        }
        self.login_locked().await
    }

    /// Send once, re-logging in and retrying once if the token was rejected
    pub(crate) async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse> {
        let stale = self.session.token();
        let response = self.transport.send(method.clone(), path, body).await?;
        if response.status != 401 || self.credentials.is_none() {
            return Ok(response);
        }

        debug!(%method, path, "token rejected, logging in again");
        self.relogin(stale).await?;
        self.transport.send(method, path, body).await
    }

    /// Send a request and return the success body
    ///
    /// A `202 Accepted` carrying a `monitor` link is waited on before
    /// returning. Non-2xx responses go through [`classify`].
    pub async fn send_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Bytes> {
        let context = format!("{method} {path}");
        let response = self.send_raw(method, path, body.as_ref()).await?;

        if response.status == 202 {
            if let Some(job_id) = monitor_job_id(&response.body) {
                debug!(%context, %job_id, "request accepted, waiting for job");
                self.wait_for_job(&job_id).await?;
                return Ok(Bytes::new());
            }
            return Ok(response.body);
        }
        if response.is_success() {
            return Ok(response.body);
        }
        Err(classify(&context, response.status, &response.body))
    }

    /// Send a request and decode the success body into `T`
    pub async fn send_request_with_struct<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let context = format!("{method} {path}");
        let bytes = self.send_request(method, path, body).await?;
        decode(&context, &bytes)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("session", &self.session)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

pub(crate) fn decode<T: DeserializeOwned>(context: &str, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|source| Error::Decode {
        context: context.to_string(),
        body: String::from_utf8_lossy(body).into_owned(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory transport

    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Recorded {
        pub method: Method,
        pub path: String,
        pub body: Option<Value>,
        pub token: Option<String>,
    }

    /// Replies with queued responses in order and records every request
    pub struct ScriptedTransport {
        session: Arc<Session>,
        replies: Mutex<VecDeque<Result<RawResponse>>>,
        pub requests: Mutex<Vec<Recorded>>,
    }

    impl ScriptedTransport {
        pub fn new(session: Arc<Session>) -> Self {
            Self {
                session,
                replies: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn reply(&self, status: u16, body: &str) {
            self.replies
                .lock()
                .push_back(Ok(RawResponse::new(status, body.to_string())));
        }

        pub fn fail(&self, message: &'static str) {
            self.replies
                .lock()
                .push_back(Err(Error::transport("https://appliance", message)));
        }

        pub fn paths(&self) -> Vec<String> {
            self.requests.lock().iter().map(|r| r.path.clone()).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            method: Method,
            path: &str,
            body: Option<&Value>,
        ) -> Result<RawResponse> {
            self.requests.lock().push(Recorded {
                method,
                path: path.to_string(),
                body: body.cloned(),
                token: self.session.token(),
            });
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| panic!("no scripted reply for {path}"))
        }
    }

    pub fn scripted_client() -> (Client, Arc<ScriptedTransport>) {
        let session = Arc::new(Session::new());
        let transport = Arc::new(ScriptedTransport::new(Arc::clone(&session)));
        let client = Client::new(transport.clone(), session)
            .with_credentials("admin", "secret")
            .with_job_timing(Duration::from_millis(1), Duration::from_millis(200));
        (client, transport)
    }
}
