//! HTTP implementation of [`RecordBackend`].

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{classify_response, BackendError, RecordBackend};
use crate::config::Credentials;
use crate::error::{Error, Result};
use crate::record::{StatusUpdate, TelemetryRecord};

const USER_AGENT: &str = concat!("installrecord/", env!("CARGO_PKG_VERSION"));

/// Record store client speaking the collection REST API.
///
/// Every request is bounded by the configured timeout; a timeout surfaces as
/// [`BackendError::Transport`].
#[derive(Debug)]
pub struct HttpBackend {
    base_url: String,
    collection: String,
    http: Client,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RecordList {
    #[serde(default)]
    items: Vec<CreatedRecord>,
}

#[derive(Debug, Serialize)]
struct PasswordAuth<'a> {
    identity: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

impl HttpBackend {
    /// Create a client for `collection` on the store at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            http,
            token: None,
        })
    }

    /// Base URL of the store.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether a bearer token has been obtained.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// URL of the records endpoint of the configured collection.
    #[must_use]
    pub fn records_url(&self) -> String {
        format!(
            "{}/api/collections/{}/records",
            self.base_url, self.collection
        )
    }

    /// URL of the password auth endpoint of an auth collection.
    #[must_use]
    pub fn auth_url(&self, auth_collection: &str) -> String {
        format!(
            "{}/api/collections/{}/auth-with-password",
            self.base_url, auth_collection
        )
    }

    fn send(&self, request: RequestBuilder) -> std::result::Result<String, BackendError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        classify_response(status, &body)?;
        Ok(body)
    }
}

/// Build the filter expression matching one session token.
#[must_use]
pub fn random_id_filter(random_id: &str) -> String {
    let escaped = random_id.replace('\\', "\\\\").replace('\'', "\\'");
    format!("(random_id='{escaped}')")
}

impl RecordBackend for HttpBackend {
    fn authenticate(
        &mut self,
        auth_collection: &str,
        credentials: &Credentials,
    ) -> std::result::Result<(), BackendError> {
        let url = self.auth_url(auth_collection);
        debug!("Authenticating as {} against {}", credentials.identity, url);

        let body = PasswordAuth {
            identity: &credentials.identity,
            password: &credentials.password,
        };
        let response = self.send(self.http.post(url).json(&body))?;
        let auth: AuthResponse =
            serde_json::from_str(&response).map_err(|e| BackendError::Decode(e.to_string()))?;

        self.token = Some(auth.token);
        Ok(())
    }

    fn probe(&self) -> std::result::Result<(), BackendError> {
        let request = self
            .http
            .get(self.records_url())
            .query(&[("perPage", "1"), ("fields", "id")]);
        self.send(request).map(|_| ())
    }

    fn create(&self, record: &TelemetryRecord) -> std::result::Result<String, BackendError> {
        let response = self.send(self.http.post(self.records_url()).json(record))?;
        let created: CreatedRecord =
            serde_json::from_str(&response).map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(created.id)
    }

    fn update(&self, id: &str, update: &StatusUpdate) -> std::result::Result<(), BackendError> {
        let url = format!("{}/{}", self.records_url(), id);
        self.send(self.http.patch(url).json(update)).map(|_| ())
    }

    fn find_by_random_id(
        &self,
        random_id: &str,
    ) -> std::result::Result<Option<String>, BackendError> {
        let filter = random_id_filter(random_id);
        let request = self.http.get(self.records_url()).query(&[
            ("filter", filter.as_str()),
            ("fields", "id"),
            ("perPage", "1"),
        ]);
        let response = self.send(request)?;
        let list: RecordList =
            serde_json::from_str(&response).map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(list.items.into_iter().next().map(|record| record.id))
    }
}
