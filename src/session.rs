//! Authentication against the Rubrik appliance.
//!
//! Three strategies are supported and picked in this order:
//!
//! 1. Service account via the OAuth2 client-credentials grant on
//!    `/api/client_token`.
//! 2. Service account via HTTP Basic on `/api/v1/session` (client ID as
//!    username, client secret as password), when the grant is rejected.
//! 3. Username/password via HTTP Basic on `/api/v1/session`, when no
//!    service account is configured.
//!
//! The resulting [`Session`] is created once at startup and never mutated.

use crate::config::RubrikConfig;
use crate::error::{Result, RubrikError};
use crate::transport::{base_url, build_http_client};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

const CLIENT_TOKEN_PATH: &str = "/api/client_token";
pub(crate) const SESSION_PATH: &str = "/api/v1/session";

/// Credentials used to open a session.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Service account client ID and secret
    ServiceAccount {
        client_id: String,
        client_secret: String,
    },
    /// Local or LDAP user
    UserPassword { username: String, password: String },
}

impl Credentials {
    /// Pick the credential form from configuration.
    ///
    /// A complete service account takes precedence over username/password.
    pub fn from_config(config: &RubrikConfig) -> Result<Self> {
        if config.has_service_account() {
            return Ok(Credentials::ServiceAccount {
                client_id: config.service_account_client_id.clone(),
                client_secret: config.service_account_client_secret.clone(),
            });
        }

        if config.has_user_credentials() {
            return Ok(Credentials::UserPassword {
                username: config.username.clone(),
                password: config.password.clone(),
            });
        }

        Err(RubrikError::Auth(
            "no service account or username/password configured".to_string(),
        ))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::ServiceAccount { client_id, .. } => f
                .debug_struct("ServiceAccount")
                .field("client_id", client_id)
                .field("client_secret", &"***REDACTED***")
                .finish(),
            Credentials::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("password", &"***REDACTED***")
                .finish(),
        }
    }
}

/// Authenticated session shared by the REST and GraphQL clients.
#[derive(Clone, Default)]
pub struct Session {
    token: String,
    logged_in: bool,
    session_id: Option<String>,
    user_id: Option<String>,
}

impl Session {
    /// Wrap an already issued bearer token.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            logged_in: true,
            session_id: None,
            user_id: None,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"***REDACTED***")
            .field("logged_in", &self.logged_in)
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Session record returned by `/api/v1/session`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    organization_id: Option<String>,
    #[serde(default)]
    token: String,
    #[serde(default)]
    user_id: Option<String>,
}

/// Token returned by the OAuth2 client-credentials grant.
#[derive(Debug, Deserialize)]
struct OAuth2TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Runs the authentication strategies against one appliance.
pub struct SessionManager {
    client: Client,
    base_url: String,
}

impl SessionManager {
    /// Create a session manager for the configured endpoint.
    pub fn new(config: &RubrikConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
            base_url: base_url(&config.endpoint),
        })
    }

    /// Obtain a bearer token using the strategy the credentials call for.
    ///
    /// Any error returned here is fatal: nothing downstream can run without
    /// a token.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Session> {
        match credentials {
            Credentials::ServiceAccount {
                client_id,
                client_secret,
            } => {
                info!("Using service account authentication");
                match self.client_credentials_grant(client_id, client_secret).await {
                    Ok(session) => Ok(session),
                    Err(e) => {
                        warn!(
                            "OAuth2 client credentials failed ({}), trying basic auth with service account",
                            e
                        );
                        self.basic_session(client_id, client_secret)
                            .await
                            .map_err(|e| {
                                RubrikError::Auth(format!(
                                    "service account rejected by both {} and {}: {}",
                                    CLIENT_TOKEN_PATH, SESSION_PATH, e
                                ))
                            })
                    }
                }
            }
            Credentials::UserPassword { username, password } => {
                info!("Using username/password authentication");
                self.basic_session(username, password).await
            }
        }
    }

    async fn client_credentials_grant(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Session> {
        let url = format!("{}{}", self.base_url, CLIENT_TOKEN_PATH);
        debug!("Requesting client token from: {}", url);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];

        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| RubrikError::Auth(format!("{}: {}", CLIENT_TOKEN_PATH, e)))?;

        if !response.status().is_success() {
            return Err(RubrikError::Auth(format!(
                "{} returned HTTP {}",
                CLIENT_TOKEN_PATH,
                response.status().as_u16()
            )));
        }

        let token: OAuth2TokenResponse = response.json().await.map_err(|e| {
            RubrikError::Auth(format!("failed to decode token response: {}", e))
        })?;

        if token.access_token.is_empty() {
            return Err(RubrikError::Auth(format!(
                "{} returned an empty access token",
                CLIENT_TOKEN_PATH
            )));
        }

        info!(
            "Authenticated with service account ({}, type={}, expires_in={:?})",
            CLIENT_TOKEN_PATH,
            token.token_type.as_deref().unwrap_or("bearer"),
            token.expires_in
        );
        Ok(Session::from_token(token.access_token))
    }

    async fn basic_session(&self, username: &str, password: &str) -> Result<Session> {
        let url = format!("{}{}", self.base_url, SESSION_PATH);
        debug!("Opening session at: {}", url);

        let response = self
            .client
            .post(&url)
            .basic_auth(username, Some(password))
            .send()
            .await
            .map_err(|e| RubrikError::Auth(format!("{}: {}", SESSION_PATH, e)))?;

        if !response.status().is_success() {
            return Err(RubrikError::Auth(format!(
                "{} returned HTTP {}",
                SESSION_PATH,
                response.status().as_u16()
            )));
        }

        let record: SessionRecord = response.json().await.map_err(|e| {
            RubrikError::Auth(format!("failed to decode session response: {}", e))
        })?;

        if record.token.is_empty() {
            return Err(RubrikError::Auth(format!(
                "{} returned an empty session token",
                SESSION_PATH
            )));
        }

        info!(
            "Authenticated with basic auth (session={}, organization={})",
            record.id.as_deref().unwrap_or("-"),
            record.organization_id.as_deref().unwrap_or("-")
        );
        Ok(Session {
            token: record.token,
            logged_in: true,
            session_id: record.id,
            user_id: record.user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_service_account_takes_precedence() {
        let mut config = Settings::default().rubrik;
        config.username = "admin".to_string();
        config.password = "secret".to_string();
        config.service_account_client_id = "client".to_string();
        config.service_account_client_secret = "client-secret".to_string();

        let credentials = Credentials::from_config(&config).unwrap();
        assert_eq!(
            credentials,
            Credentials::ServiceAccount {
                client_id: "client".to_string(),
                client_secret: "client-secret".to_string(),
            }
        );
    }

    #[test]
    fn test_user_password_when_no_service_account() {
        let mut config = Settings::default().rubrik;
        config.username = "admin".to_string();
        config.password = "secret".to_string();

        let credentials = Credentials::from_config(&config).unwrap();
        assert!(matches!(credentials, Credentials::UserPassword { .. }));
    }

    #[test]
    fn test_missing_credentials_is_auth_error() {
        let config = Settings::default().rubrik;
        assert!(matches!(
            Credentials::from_config(&config),
            Err(RubrikError::Auth(_))
        ));
    }

    #[test]
    fn test_debug_output_hides_secrets() {
        let credentials = Credentials::UserPassword {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", credentials).contains("hunter2"));

        let session = Session::from_token("very-secret-token");
        assert!(!format!("{:?}", session).contains("very-secret-token"));
        assert!(session.is_logged_in());
    }
}
