//! Organization API client.
//!
//! Exchanges a configured organization id plus API key for an access
//! token, caches one session per organization, and issues
//! bearer-authenticated GETs against the organization-scoped JSON API.
//!
//! This client is headless: it cannot prompt for credentials, so
//! [`request_session`](crate::providers::SessionProvider::request_session)
//! always yields `None` and interactive credential entry stays a concern
//! of whatever UI embeds the resolver.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::ConsoleConfig;
use crate::providers::{Session, SessionProvider};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Organization {
    id: String,
    name: String,
}

struct Authenticated {
    session: Session,
    access_token: String,
}

pub struct ConsoleClient {
    api_base: String,
    api_key: Option<String>,
    organizations: Vec<String>,
    client: reqwest::Client,
    authenticated: RwLock<HashMap<String, Authenticated>>,
    changes: broadcast::Sender<()>,
}

impl ConsoleClient {
    /// Build a client from config; the API key is read from the
    /// environment variable named by `api_key_env` (absence is fine until
    /// a session is actually needed).
    pub fn new(config: &ConsoleConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: std::env::var(&config.api_key_env).ok(),
            organizations: config.organizations.clone(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
            authenticated: RwLock::new(HashMap::new()),
            changes: broadcast::channel(8).0,
        })
    }

    async fn bearer_get(&self, path: &str, access_token: &str) -> Result<Value> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("GET {} failed with {}: {}", url, status, body);
        }

        Ok(response.json().await?)
    }

    async fn authenticate(&self, organization_id: &str) -> Result<Session> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("no console API key available in the environment"))?;

        let token: TokenResponse = self
            .client
            .get(format!(
                "{}/organizations/{}/credentials/v2/token",
                self.api_base, organization_id
            ))
            .header("X-API-Key", api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("token exchange returned an unexpected payload")?;

        // The global listing provides display names; an organization
        // missing from it still authenticates under its bare id.
        let organizations: Vec<Organization> =
            match self.bearer_get("/organizations", &token.access_token).await {
                Ok(value) => serde_json::from_value(value).unwrap_or_default(),
                Err(err) => {
                    debug!(organization_id, "organization listing failed: {err:#}");
                    Vec::new()
                }
            };

        let display_name = organizations
            .iter()
            .find(|org| org.id == organization_id)
            .map(|org| org.name.clone())
            .unwrap_or_else(|| organization_id.to_string());

        let session = Session {
            id: organization_id.to_string(),
            display_name,
            organizations: organizations.into_iter().map(|org| org.id).collect(),
        };

        self.authenticated.write().unwrap().insert(
            organization_id.to_string(),
            Authenticated {
                session: session.clone(),
                access_token: token.access_token,
            },
        );
        let _ = self.changes.send(());

        Ok(session)
    }
}

#[async_trait]
impl SessionProvider for ConsoleClient {
    async fn sessions(&self) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();

        for organization_id in &self.organizations {
            let cached = {
                let authenticated = self.authenticated.read().unwrap();
                authenticated
                    .get(organization_id)
                    .map(|auth| auth.session.clone())
            };

            match cached {
                Some(session) => sessions.push(session),
                None => sessions.push(self.authenticate(organization_id).await?),
            }
        }

        Ok(sessions)
    }

    async fn request_session(&self) -> Result<Option<Session>> {
        Ok(None)
    }

    async fn api_request(&self, path: &str, organization_id: &str) -> Result<Value> {
        let access_token = {
            let authenticated = self.authenticated.read().unwrap();
            authenticated
                .get(organization_id)
                .map(|auth| auth.access_token.clone())
        };

        let access_token = access_token
            .ok_or_else(|| anyhow!("no active session for organization {}", organization_id))?;

        let separator = if path.starts_with('/') { "" } else { "/" };
        self.bearer_get(
            &format!("/organizations/{}{}{}", organization_id, separator, path),
            &access_token,
        )
        .await
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}
