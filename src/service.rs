//! Schema discovery, indexing, querying, and resolution.
//!
//! [`SchemaService`] is the engine behind every query surface. It
//! enumerates registries from three sources, indexes each source's schemas
//! into a uniform descriptor list, answers structural queries over the
//! combined index, and lazily fetches schema bodies with best-of-N
//! fallback across equivalent sources.
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//! │ Enumerator  │──▶│  Indexer     │──▶│  Matcher /  │
//! │ ws/org/stat │   │ 3 desc lists │   │  Query      │
//! └─────────────┘   └──────┬──────┘   └──────┬──────┘
//!                          │                 ▼
//!                          │          ┌─────────────┐
//!                          └─────────▶│  Resolver   │
//!                                     └─────────────┘
//! ```
//!
//! Each registry class owns one descriptor list, replaced in a single
//! assignment when that class finishes indexing; readers always observe a
//! consistent per-class snapshot. Failures local to one file or one
//! registry degrade to "contributes nothing" — only `fetch_schema` and
//! `resolve` surface errors.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::{join_all, select_ok};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::{Config, StaticRegistryConfig};
use crate::error::ResolverError;
use crate::model::{
    self_descriptor, DataStructure, Environment, RegistryDescriptor, SchemaDescriptor,
};
use crate::providers::{FileAccess, HttpFetch, SessionProvider, WorkspaceFolder};
use crate::selector::Selector;
use crate::uri::IgluUri;

// ═══════════════════════════════════════════════════════════════════════
// Discovery latches
// ═══════════════════════════════════════════════════════════════════════

/// One-shot signal set by the first completing discovery pass.
struct Latch {
    tx: watch::Sender<bool>,
}

impl Latch {
    fn new() -> Self {
        Self {
            tx: watch::channel(false).0,
        }
    }

    fn set(&self) {
        self.tx.send_replace(true);
    }

    fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                // The latch owns the sender; the channel cannot close while
                // a waiter borrows it.
                std::future::pending::<()>().await;
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Resolve requests
// ═══════════════════════════════════════════════════════════════════════

/// What [`SchemaService::resolve`] accepts: an already-indexed descriptor,
/// a parsed identifier, a raw URI string, or an arbitrary selector.
pub enum ResolveRequest {
    Descriptor(Arc<SchemaDescriptor>),
    Uri(IgluUri),
    Raw(String),
    Selector(Selector),
}

impl From<Arc<SchemaDescriptor>> for ResolveRequest {
    fn from(descriptor: Arc<SchemaDescriptor>) -> Self {
        ResolveRequest::Descriptor(descriptor)
    }
}

impl From<IgluUri> for ResolveRequest {
    fn from(uri: IgluUri) -> Self {
        ResolveRequest::Uri(uri)
    }
}

impl From<&str> for ResolveRequest {
    fn from(raw: &str) -> Self {
        ResolveRequest::Raw(raw.to_string())
    }
}

impl From<String> for ResolveRequest {
    fn from(raw: String) -> Self {
        ResolveRequest::Raw(raw)
    }
}

impl From<Selector> for ResolveRequest {
    fn from(selector: Selector) -> Self {
        ResolveRequest::Selector(selector)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Service
// ═══════════════════════════════════════════════════════════════════════

struct ServiceInner {
    sessions: Arc<dyn SessionProvider>,
    files: Arc<dyn FileAccess>,
    http: Arc<dyn HttpFetch>,
    static_configs: Vec<StaticRegistryConfig>,
    deadline: Duration,

    workspace_registries: RwLock<Vec<RegistryDescriptor>>,
    organization_registries: RwLock<Vec<RegistryDescriptor>>,
    static_registries: RwLock<Vec<RegistryDescriptor>>,

    workspace_schemas: RwLock<Vec<Arc<SchemaDescriptor>>>,
    organization_schemas: RwLock<Vec<Arc<SchemaDescriptor>>>,
    static_schemas: RwLock<Vec<Arc<SchemaDescriptor>>>,

    registries_discovered: Latch,
    schemas_discovered: Latch,
}

/// The schema discovery/indexing/resolution engine. Cheap to clone; all
/// clones share one index.
#[derive(Clone)]
pub struct SchemaService {
    inner: Arc<ServiceInner>,
}

impl SchemaService {
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        files: Arc<dyn FileAccess>,
        http: Arc<dyn HttpFetch>,
        config: &Config,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                sessions,
                files,
                http,
                static_configs: config.static_registries.clone(),
                deadline: Duration::from_millis(config.discovery.deadline_ms),
                workspace_registries: RwLock::new(Vec::new()),
                organization_registries: RwLock::new(Vec::new()),
                static_registries: RwLock::new(Vec::new()),
                workspace_schemas: RwLock::new(Vec::new()),
                organization_schemas: RwLock::new(Vec::new()),
                static_schemas: RwLock::new(Vec::new()),
                registries_discovered: Latch::new(),
                schemas_discovered: Latch::new(),
            }),
        }
    }

    // ─── Discovery lifecycle ────────────────────────────────────────────

    /// Wait until registries and schemas have each been discovered at
    /// least once.
    pub async fn discovered(&self) {
        self.inner.registries_discovered.wait().await;
        self.inner.schemas_discovered.wait().await;
    }

    /// Whether both discovery latches are set.
    pub fn is_discovered(&self) -> bool {
        self.inner.registries_discovered.is_set() && self.inner.schemas_discovered.is_set()
    }

    /// Discover-or-proceed: wait for discovery up to the configured
    /// deadline, then trigger a fresh pass and wait for it instead.
    ///
    /// When discovery already completed, this returns immediately without
    /// re-triggering; the deadline is a soft trigger, not a cancellation
    /// of any in-flight pass.
    pub async fn discover(&self) {
        tokio::select! {
            biased;
            _ = self.discovered() => {}
            _ = tokio::time::sleep(self.inner.deadline) => {
                self.find_registries().await;
                self.find_schemas().await;
            }
        }
    }

    /// Run all three registry enumerators concurrently, then latch.
    pub async fn find_registries(&self) {
        tokio::join!(
            self.find_organization_registries(),
            self.find_workspace_registries(),
            self.find_static_registries(),
        );
        self.inner.registries_discovered.set();
    }

    /// Run all three schema indexers concurrently, then latch.
    pub async fn find_schemas(&self) {
        tokio::join!(
            self.find_organization_schemas(),
            self.find_workspace_schemas(),
            self.find_static_schemas(),
        );
        self.inner.schemas_discovered.set();
    }

    /// All known registries, local first: workspace, organization, static.
    pub fn registries(&self) -> Vec<RegistryDescriptor> {
        let mut all = Vec::new();
        for list in [
            &self.inner.workspace_registries,
            &self.inner.organization_registries,
            &self.inner.static_registries,
        ] {
            all.extend(list.read().unwrap().iter().cloned());
        }
        all
    }

    // ─── Registry enumeration ───────────────────────────────────────────

    /// Replace the static registry list from configuration. Infallible.
    pub async fn find_static_registries(&self) {
        let registries = self
            .inner
            .static_configs
            .iter()
            .map(|config| RegistryDescriptor::Static {
                id: config.base_url.clone(),
                name: config.name.clone(),
                base_url: config.base_url.clone(),
                manifest: config.manifest.clone(),
            })
            .collect();

        *self.inner.static_registries.write().unwrap() = registries;
    }

    /// Replace the organization registry list from the session provider.
    ///
    /// A failing provider yields an empty list, never an error.
    pub async fn find_organization_registries(&self) {
        let mut sessions = match self.inner.sessions.sessions().await {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!("session discovery failed: {err:#}");
                Vec::new()
            }
        };

        if sessions.is_empty() {
            match self.inner.sessions.request_session().await {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(err) => warn!("session request failed: {err:#}"),
            }
        }

        let registries = sessions
            .into_iter()
            .map(|session| RegistryDescriptor::Organization {
                id: session.id.clone(),
                name: session.display_name,
                organization_id: session.id,
            })
            .collect();

        *self.inner.organization_registries.write().unwrap() = registries;
    }

    /// Replace the workspace registry list: one registry per root that
    /// contains at least one schema-shaped file.
    pub async fn find_workspace_registries(&self) {
        let files = match self.inner.files.find_files().await {
            Ok(files) => files,
            Err(err) => {
                warn!("workspace enumeration failed: {err:#}");
                Vec::new()
            }
        };

        let mut folders = self.inner.files.roots();
        if folders.is_empty() {
            folders.push(WorkspaceFolder {
                name: "no active workspace".to_string(),
                root: PathBuf::from("/"),
            });
        }

        let registries = folders
            .into_iter()
            .filter(|folder| files.iter().any(|file| file.starts_with(&folder.root)))
            .map(|folder| RegistryDescriptor::Workspace {
                id: folder.name.clone(),
                name: folder.name,
                root: folder.root,
            })
            .collect();

        *self.inner.workspace_registries.write().unwrap() = registries;
    }

    // ─── Schema indexing ────────────────────────────────────────────────

    /// Re-index workspace schemas: read every schema-shaped file under
    /// each workspace registry's root and keep the ones that parse into a
    /// self-describing schema. Per-file failures skip that file only.
    pub async fn find_workspace_schemas(&self) {
        let registries = self.inner.workspace_registries.read().unwrap().clone();

        let files = match self.inner.files.find_files().await {
            Ok(files) => files,
            Err(err) => {
                warn!("workspace enumeration failed: {err:#}");
                Vec::new()
            }
        };

        let mut descriptors = Vec::new();
        for registry in &registries {
            let RegistryDescriptor::Workspace { root, .. } = registry else {
                continue;
            };

            for path in files.iter().filter(|file| file.starts_with(root)) {
                match self.index_workspace_file(registry, path).await {
                    Ok(descriptor) => descriptors.push(Arc::new(descriptor)),
                    Err(err) => {
                        debug!(path = %path.display(), "skipping non-schema file: {err:#}");
                    }
                }
            }
        }

        *self.inner.workspace_schemas.write().unwrap() = descriptors;
    }

    async fn index_workspace_file(
        &self,
        registry: &RegistryDescriptor,
        path: &Path,
    ) -> Result<SchemaDescriptor> {
        let bytes = self.inner.files.read(path).await?;
        let document: Value = serde_json::from_slice(&bytes)?;
        let uri = self_descriptor(&document).ok_or(ResolverError::InvalidShape)?;

        Ok(SchemaDescriptor::with_body(
            uri,
            registry.clone(),
            path.to_string_lossy().to_string(),
            Environment::Local,
            None,
            document,
        ))
    }

    /// Re-index organization schemas, one descriptor per deployment.
    /// Registries settle independently; a failing one contributes nothing.
    pub async fn find_organization_schemas(&self) {
        let registries = self.inner.organization_registries.read().unwrap().clone();

        let results = join_all(
            registries
                .iter()
                .map(|registry| self.index_organization(registry)),
        )
        .await;

        let mut descriptors = Vec::new();
        for (registry, result) in registries.iter().zip(results) {
            match result {
                Ok(mut indexed) => descriptors.append(&mut indexed),
                Err(err) => {
                    warn!(registry = registry.id(), "organization indexing failed: {err:#}");
                }
            }
        }

        *self.inner.organization_schemas.write().unwrap() = descriptors;
    }

    async fn index_organization(
        &self,
        registry: &RegistryDescriptor,
    ) -> Result<Vec<Arc<SchemaDescriptor>>> {
        let RegistryDescriptor::Organization {
            organization_id, ..
        } = registry
        else {
            return Ok(Vec::new());
        };

        let listing = self
            .inner
            .sessions
            .api_request("/data-structures/v1", organization_id)
            .await?;
        let resources: Vec<DataStructure> =
            serde_json::from_value(listing).context("unexpected data-structures payload")?;

        let mut descriptors = Vec::new();
        for resource in resources {
            for deployment in &resource.deployments {
                let uri = IgluUri::from_parts(
                    resource.vendor.clone(),
                    resource.name.clone(),
                    Some(resource.format.clone()),
                    Some(deployment.version.clone()),
                );

                // The recomputed hash is authoritative; a disagreement with
                // the API's declared value is an integrity signal only.
                let content_hash = uri.hash(organization_id);
                if resource.hash != content_hash {
                    warn!(
                        declared = %resource.hash,
                        recomputed = %content_hash,
                        uri = %uri,
                        "declared content hash disagrees with recomputed value"
                    );
                }

                let location = format!(
                    "/data-structures/v1/{}/versions/{}?env={}",
                    content_hash, deployment.version, deployment.env
                );

                descriptors.push(Arc::new(SchemaDescriptor::new(
                    uri,
                    registry.clone(),
                    location,
                    deployment.env,
                    resource.meta.schema_type,
                )));
            }
        }

        Ok(descriptors)
    }

    /// Re-index static schemas from each registry's manifest. Registries
    /// settle independently; a failing one contributes nothing.
    pub async fn find_static_schemas(&self) {
        let registries = self.inner.static_registries.read().unwrap().clone();

        let results = join_all(registries.iter().map(|registry| self.index_static(registry))).await;

        let mut descriptors = Vec::new();
        for (registry, result) in registries.iter().zip(results) {
            match result {
                Ok(mut indexed) => descriptors.append(&mut indexed),
                Err(err) => {
                    warn!(registry = registry.id(), "static indexing failed: {err:#}");
                }
            }
        }

        *self.inner.static_schemas.write().unwrap() = descriptors;
    }

    async fn index_static(
        &self,
        registry: &RegistryDescriptor,
    ) -> Result<Vec<Arc<SchemaDescriptor>>> {
        let RegistryDescriptor::Static {
            base_url, manifest, ..
        } = registry
        else {
            return Ok(Vec::new());
        };

        let manifest_url = join_url(base_url, manifest);
        let listing = self.inner.http.fetch_json(&manifest_url).await?;
        let entries: Vec<String> = serde_json::from_value(listing)
            .context("manifest is not a JSON array of iglu uris")?;

        let mut descriptors = Vec::new();
        for entry in entries {
            let uri = IgluUri::parse(&entry)?;
            let location = format!(
                "{}/{}/{}/{}/{}",
                strip_scheme(base_url),
                uri.vendor,
                uri.name,
                uri.format,
                uri.version
            );

            descriptors.push(Arc::new(SchemaDescriptor::new(
                uri,
                registry.clone(),
                location,
                Environment::Prod,
                None,
            )));
        }

        Ok(descriptors)
    }

    // ─── Querying ───────────────────────────────────────────────────────

    /// Descriptors in priority order (workspace, organization, static —
    /// local overrides remote), filtered when a selector is given.
    pub fn get_schemas(&self, selector: Option<&Selector>) -> Vec<Arc<SchemaDescriptor>> {
        let mut all = Vec::new();
        for list in [
            &self.inner.workspace_schemas,
            &self.inner.organization_schemas,
            &self.inner.static_schemas,
        ] {
            let guard = list.read().unwrap();
            match selector {
                Some(selector) => all.extend(
                    guard
                        .iter()
                        .filter(|descriptor| selector.matches(&descriptor.as_subject()))
                        .cloned(),
                ),
                None => all.extend(guard.iter().cloned()),
            }
        }
        all
    }

    /// Left fold over matching descriptors in the same priority order,
    /// without materializing an intermediate list. Each source group's
    /// result feeds the next.
    pub fn query_schemas<T>(
        &self,
        mut fold: impl FnMut(T, &SchemaDescriptor) -> T,
        initial: T,
        selector: Option<&Selector>,
    ) -> T {
        let mut accumulator = initial;
        for list in [
            &self.inner.workspace_schemas,
            &self.inner.organization_schemas,
            &self.inner.static_schemas,
        ] {
            let guard = list.read().unwrap();
            for descriptor in guard.iter() {
                let keep = selector
                    .map(|selector| selector.matches(&descriptor.as_subject()))
                    .unwrap_or(true);
                if keep {
                    accumulator = fold(accumulator, descriptor);
                }
            }
        }
        accumulator
    }

    // ─── Resolution ─────────────────────────────────────────────────────

    /// Fetch one descriptor's schema body, memoizing on the descriptor.
    ///
    /// A cached body returns immediately with no I/O. Otherwise the fetch
    /// dispatches on the registry kind; static locations race their
    /// `http://` and `https://` variants and the first well-shaped
    /// response wins.
    pub async fn fetch_schema(
        &self,
        descriptor: &SchemaDescriptor,
    ) -> Result<Value, ResolverError> {
        if let Some(body) = descriptor.body() {
            return Ok(body.clone());
        }

        let fetched = match &descriptor.registry {
            RegistryDescriptor::Organization {
                organization_id, ..
            } => self
                .inner
                .sessions
                .api_request(&descriptor.location, organization_id)
                .await
                .map_err(|err| fetch_error(descriptor, &err))?,

            RegistryDescriptor::Static { .. } => {
                let attempts: Vec<_> = ["http", "https"]
                    .into_iter()
                    .map(|scheme| {
                        let url = format!("{}://{}", scheme, descriptor.location);
                        let http = Arc::clone(&self.inner.http);
                        Box::pin(async move {
                            let body = http.fetch_json(&url).await?;
                            if self_descriptor(&body).is_none() {
                                anyhow::bail!("{} is not a self-describing schema", url);
                            }
                            Ok::<Value, anyhow::Error>(body)
                        })
                    })
                    .collect();

                let (body, _remaining) = select_ok(attempts)
                    .await
                    .map_err(|err| fetch_error(descriptor, &err))?;
                body
            }

            RegistryDescriptor::Workspace { .. } => {
                let bytes = self
                    .inner
                    .files
                    .read(Path::new(&descriptor.location))
                    .await
                    .map_err(|err| fetch_error(descriptor, &err))?;
                serde_json::from_slice(&bytes)
                    .map_err(|err| fetch_error(descriptor, &anyhow::Error::new(err)))?
            }
        };

        if self_descriptor(&fetched).is_none() {
            return Err(ResolverError::Fetch {
                uri: descriptor.uri.to_string(),
                registry: descriptor.registry.id().to_string(),
                message: "response is not a self-describing schema".to_string(),
            });
        }

        Ok(descriptor.cache_body(fetched))
    }

    /// Resolve a request to a schema body.
    ///
    /// Every matching candidate's fetch runs as its own task; the first
    /// success wins. Losing fetches stay detached rather than cancelled,
    /// so an eventually-successful straggler still populates its
    /// descriptor's cache; its error, if any, is logged and dropped.
    pub async fn resolve(
        &self,
        request: impl Into<ResolveRequest>,
    ) -> Result<Value, ResolverError> {
        let candidates = match request.into() {
            ResolveRequest::Descriptor(descriptor) => vec![descriptor],
            ResolveRequest::Raw(raw) => {
                let uri = IgluUri::parse(&raw)?;
                self.get_schemas(Some(&Selector::for_uri(&uri)))
            }
            ResolveRequest::Uri(uri) => self.get_schemas(Some(&Selector::for_uri(&uri))),
            ResolveRequest::Selector(selector) => self.get_schemas(Some(&selector)),
        };

        if candidates.is_empty() {
            return Err(ResolverError::NoMatchingSchema);
        }

        let (tx, mut rx) = mpsc::channel(candidates.len());
        for descriptor in candidates {
            let service = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = service.fetch_schema(&descriptor).await;
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        while let Some(result) = rx.recv().await {
            match result {
                Ok(body) => return Ok(body),
                Err(err) => debug!("candidate fetch failed: {err}"),
            }
        }

        Err(ResolverError::NoMatchingSchema)
    }

    /// [`resolve`](Self::resolve), raced against a cancellation token.
    ///
    /// Cancellation abandons outstanding fetches without awaiting them;
    /// the token subscription lasts only for the duration of the race.
    pub async fn resolve_cancellable(
        &self,
        request: impl Into<ResolveRequest>,
        cancel: &CancelToken,
    ) -> Result<Value, ResolverError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ResolverError::Cancelled),
            result = self.resolve(request) => result,
        }
    }

    // ─── Change watching ────────────────────────────────────────────────

    /// Spawn a task that re-indexes the affected registry class whenever
    /// the file or session providers report changes. The task ends once
    /// both providers' change streams close.
    pub fn watch_for_changes(&self) -> tokio::task::JoinHandle<()> {
        let service = self.clone();
        let mut file_events = self.inner.files.subscribe();
        let mut session_events = self.inner.sessions.subscribe();

        tokio::spawn(async move {
            let mut watch_files = true;
            let mut watch_sessions = true;

            while watch_files || watch_sessions {
                tokio::select! {
                    event = file_events.recv(), if watch_files => match event {
                        Err(broadcast::error::RecvError::Closed) => watch_files = false,
                        _ => {
                            service.find_workspace_registries().await;
                            service.find_workspace_schemas().await;
                        }
                    },
                    event = session_events.recv(), if watch_sessions => match event {
                        Err(broadcast::error::RecvError::Closed) => watch_sessions = false,
                        _ => {
                            service.find_organization_registries().await;
                            service.find_organization_schemas().await;
                        }
                    },
                }
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════

fn fetch_error(descriptor: &SchemaDescriptor, err: &anyhow::Error) -> ResolverError {
    ResolverError::Fetch {
        uri: descriptor.uri.to_string(),
        registry: descriptor.registry.id().to_string(),
        message: format!("{err:#}"),
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}

/// Drop the scheme so static locations can race both `http` and `https`.
fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map(|(_, rest)| rest).unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_empty_and_slashed_paths() {
        assert_eq!(
            join_url("http://iglucentral.com/schemas", ""),
            "http://iglucentral.com/schemas"
        );
        assert_eq!(
            join_url("http://iglucentral.com/schemas/", "/manifest.json"),
            "http://iglucentral.com/schemas/manifest.json"
        );
    }

    #[test]
    fn strip_scheme_leaves_bare_hosts_alone() {
        assert_eq!(strip_scheme("https://example.com/a"), "example.com/a");
        assert_eq!(strip_scheme("example.com/a"), "example.com/a");
    }

    #[tokio::test]
    async fn latch_is_sticky_and_wakes_waiters() {
        let latch = Latch::new();
        assert!(!latch.is_set());

        latch.set();
        latch.set();
        assert!(latch.is_set());
        latch.wait().await;
    }
}
