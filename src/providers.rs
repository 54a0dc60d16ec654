//! Collaborator contracts the resolver core depends on.
//!
//! The discovery engine only ever talks to sessions, files, and plain HTTP
//! through these traits. Production implementations live in
//! [`crate::console`], [`crate::workspace`], and [`crate::http`]; tests
//! substitute in-memory fakes.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

/// An authenticated organization session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Organization id; doubles as the registry id.
    pub id: String,
    pub display_name: String,
    /// All organization ids this session's token may access.
    pub organizations: Vec<String>,
}

/// Supplies organization sessions and authenticated API access.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// All currently active sessions.
    async fn sessions(&self) -> Result<Vec<Session>>;

    /// Attempt to obtain a single new session when none are active.
    ///
    /// Non-interactive implementations return `Ok(None)`.
    async fn request_session(&self) -> Result<Option<Session>>;

    /// Bearer-authenticated GET against the organization API. `path` is
    /// relative to the organization scope; rejects on non-2xx.
    async fn api_request(&self, path: &str, organization_id: &str) -> Result<Value>;

    /// Session change notifications (login, logout, expiry).
    fn subscribe(&self) -> broadcast::Receiver<()> {
        broadcast::channel(1).1
    }
}

/// A root folder that may contain schema files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceFolder {
    pub name: String,
    pub root: PathBuf,
}

/// Enumerates and reads schema-shaped files across workspace roots.
#[async_trait]
pub trait FileAccess: Send + Sync {
    /// Configured workspace roots (may be empty).
    fn roots(&self) -> Vec<WorkspaceFolder>;

    /// All paths matching the `**/jsonschema/*-*-*` layout, across roots.
    async fn find_files(&self) -> Result<Vec<PathBuf>>;

    /// Raw bytes of one file.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Change notifications for schema-shaped paths
    /// (create/change/delete).
    fn subscribe(&self) -> broadcast::Receiver<()> {
        broadcast::channel(1).1
    }
}

/// Plain HTTP fetch of a JSON document.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// GET `url` and parse the body as JSON; rejects on non-2xx.
    async fn fetch_json(&self, url: &str) -> Result<Value>;
}
