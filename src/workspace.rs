//! Workspace schema file enumeration.
//!
//! Walks configured roots for files in Iglu's conventional
//! `.../jsonschema/<model-revision-addition>` layout, and feeds change
//! notifications from a polling rescan of the matched set.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use walkdir::WalkDir;

use crate::providers::{FileAccess, WorkspaceFolder};

/// Path layout marking a file as schema-shaped: a `jsonschema` segment
/// followed by a `model-revision-addition` version segment.
pub const SCHEMA_GLOB: &str = "**/jsonschema/*-*-*";

pub struct WorkspaceFiles {
    folders: Vec<WorkspaceFolder>,
    matcher: GlobSet,
    changes: broadcast::Sender<()>,
}

impl WorkspaceFiles {
    pub fn new(roots: &[PathBuf]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        builder.add(Glob::new(SCHEMA_GLOB)?);
        let matcher = builder.build()?;

        let folders = roots
            .iter()
            .map(|root| WorkspaceFolder {
                name: folder_name(root),
                root: root.clone(),
            })
            .collect();

        Ok(Self {
            folders,
            matcher,
            changes: broadcast::channel(8).0,
        })
    }

    fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for folder in &self.folders {
            let walker = WalkDir::new(&folder.root).into_iter().filter_map(|e| e.ok());
            for entry in walker {
                if !entry.file_type().is_file() {
                    continue;
                }
                if self.matcher.is_match(entry.path()) {
                    files.push(entry.path().to_path_buf());
                }
            }
        }

        // Overlapping roots may yield duplicates
        files.sort();
        files.dedup();
        files
    }

    /// Digest over the sorted (path, mtime) listing; any create, change,
    /// or delete of a schema-shaped file alters it.
    fn fingerprint(&self) -> String {
        let mut sha256 = Sha256::new();
        for path in self.scan() {
            sha256.update(path.to_string_lossy().as_bytes());
            if let Ok(modified) = std::fs::metadata(&path).and_then(|meta| meta.modified()) {
                if let Ok(elapsed) = modified.duration_since(std::time::SystemTime::UNIX_EPOCH) {
                    sha256.update(elapsed.as_nanos().to_le_bytes());
                }
            }
        }
        hex::encode(sha256.finalize())
    }

    /// Spawn a polling watcher emitting one change event whenever the
    /// matched file set (or any mtime within it) changes.
    pub fn spawn_watcher(self: &Arc<Self>, poll: Duration) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut last = this.fingerprint();
            let mut ticker = tokio::time::interval(poll);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let current = this.fingerprint();
                if current != last {
                    last = current;
                    let _ = this.changes.send(());
                }
            }
        })
    }
}

#[async_trait]
impl FileAccess for WorkspaceFiles {
    fn roots(&self) -> Vec<WorkspaceFolder> {
        self.folders.clone()
    }

    async fn find_files(&self) -> Result<Vec<PathBuf>> {
        Ok(self.scan())
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

fn folder_name(root: &Path) -> String {
    root.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| root.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_schema(root: &Path, vendor: &str, name: &str, version: &str) -> PathBuf {
        let dir = root.join(vendor).join(name).join("jsonschema");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(version);
        std::fs::write(&path, "{}").unwrap();
        path
    }

    #[tokio::test]
    async fn finds_only_schema_shaped_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let schema = write_schema(tmp.path(), "com.acme", "checkout", "1-0-0");

        // Decoys: wrong directory name, wrong version shape
        std::fs::create_dir_all(tmp.path().join("com.acme/other/avro")).unwrap();
        std::fs::write(tmp.path().join("com.acme/other/avro/1-0-0"), "{}").unwrap();
        std::fs::write(tmp.path().join("com.acme/checkout/jsonschema/notes.txt"), "x").unwrap();

        let files = WorkspaceFiles::new(&[tmp.path().to_path_buf()]).unwrap();
        let found = files.find_files().await.unwrap();
        assert_eq!(found, vec![schema]);
    }

    #[tokio::test]
    async fn watcher_emits_on_new_schema_file() {
        let tmp = tempfile::tempdir().unwrap();
        write_schema(tmp.path(), "com.acme", "checkout", "1-0-0");

        let files = Arc::new(WorkspaceFiles::new(&[tmp.path().to_path_buf()]).unwrap());
        let mut events = files.subscribe();
        let watcher = files.spawn_watcher(Duration::from_millis(20));

        // Let the watcher record its baseline before changing anything
        tokio::time::sleep(Duration::from_millis(100)).await;
        write_schema(tmp.path(), "com.acme", "refund", "1-0-0");

        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("watcher should notice the new file")
            .unwrap();

        watcher.abort();
    }
}
