//! REST transport for the Rubrik legacy API.
//!
//! Every call carries the session bearer token. Responses outside the 2xx
//! range are turned into [`RubrikError::Request`] without looking at the
//! body as domain JSON, since error pages are frequently HTML.

use crate::config::RubrikConfig;
use crate::error::{Result, RubrikError};
use crate::models::from_value_lenient;
use crate::session::Session;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Build the HTTP client shared by the session, REST and GraphQL layers.
pub(crate) fn build_http_client(config: &RubrikConfig) -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .danger_accept_invalid_certs(!config.verify_tls)
        .build()?;
    Ok(client)
}

/// Strip the trailing slash so paths can be appended verbatim.
pub(crate) fn base_url(endpoint: &str) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// At most `max` characters of `body`, cut on a char boundary.
pub(crate) fn preview(body: &str, max: usize) -> &str {
    body.char_indices()
        .nth(max)
        .map(|(idx, _)| &body[..idx])
        .unwrap_or(body)
}

/// One REST call: method, path, query parameters and optional body.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Authenticated REST client.
#[derive(Clone)]
pub struct RestTransport {
    client: Client,
    base_url: String,
    session: Arc<Session>,
}

impl RestTransport {
    pub fn new(client: Client, endpoint: &str, session: Arc<Session>) -> Self {
        Self {
            client,
            base_url: base_url(endpoint),
            session,
        }
    }

    /// Execute a request and return the raw body of a 2xx response.
    pub async fn execute(&self, request: &RequestDescriptor) -> Result<String> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!(
            "REST {} {} params={:?}",
            request.method, url, request.params
        );

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .bearer_auth(self.session.token())
            .query(&request.params);

        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RubrikError::transport(&request.path, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("API error: HTTP {} from {}", status.as_u16(), request.path);
            // Body is only useful for diagnosis; never decode it.
            if let Ok(body) = response.text().await {
                debug!(
                    "API error response from {}: {}",
                    request.path,
                    preview(&body, 512)
                );
            }
            return Err(RubrikError::Request {
                status: Some(status.as_u16()),
                path: request.path.clone(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| RubrikError::transport(&request.path, e))
    }

    /// Execute a request and decode its JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, request: &RequestDescriptor) -> Result<T> {
        let body = self.execute(request).await?;
        let value: Value = serde_json::from_str(&body).map_err(|e| {
            RubrikError::Decode(format!(
                "{}: {}. Body preview: {}",
                request.path,
                e,
                preview(&body, 200)
            ))
        })?;
        from_value_lenient(value)
            .map_err(|e| RubrikError::Decode(format!("{}: {}", request.path, e)))
    }
}
