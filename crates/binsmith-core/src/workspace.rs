//! Ephemeral build workspaces
//!
//! Each build gets a private directory under the scratch root. The directory
//! is owned by a [`Workspace`] value and removed when that value is released
//! or dropped, so cleanup happens on success, failure and cancellation alike.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::orchestrator::BuildKey;

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Failed to create workspace under {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove workspace {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Hands out exclusively-owned build directories under one scratch root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    scratch_root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.scratch_root
    }

    /// Create a fresh workspace for `key`.
    ///
    /// The directory is named `<key-slug>-<millis>-<random>`, so two
    /// concurrent builds of the same key never share a directory.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Create`] if the scratch root or the
    /// directory itself cannot be created.
    pub async fn create(&self, key: &BuildKey) -> Result<Workspace, WorkspaceError> {
        let root = self.scratch_root.clone();
        let prefix = format!("{}-{}-", key.slug(), chrono::Utc::now().timestamp_millis());

        let created = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&root)?;
            tempfile::Builder::new()
                .prefix(&prefix)
                .rand_bytes(8)
                .tempdir_in(&root)
        })
        .await
        .unwrap_or_else(|e| Err(std::io::Error::other(e)));

        let dir = created.map_err(|source| WorkspaceError::Create {
            path: self.scratch_root.clone(),
            source,
        })?;

        debug!(path = %dir.path().display(), "created workspace");
        Ok(Workspace { dir: Some(dir) })
    }

    /// Remove every entry in the scratch root.
    ///
    /// Only safe while no build is running against this root. Returns the
    /// removed paths; with `dry_run` nothing is deleted.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Remove`] on the first entry that cannot be
    /// deleted.
    pub fn sweep(&self, dry_run: bool) -> Result<Vec<PathBuf>, WorkspaceError> {
        let entries = match std::fs::read_dir(&self.scratch_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(WorkspaceError::Remove {
                    path: self.scratch_root.clone(),
                    source,
                });
            }
        };

        let mut removed = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !dry_run {
                let result = if path.is_dir() {
                    std::fs::remove_dir_all(&path)
                } else {
                    std::fs::remove_file(&path)
                };
                result.map_err(|source| WorkspaceError::Remove {
                    path: path.clone(),
                    source,
                })?;
            }
            removed.push(path);
        }
        Ok(removed)
    }
}

/// A build directory exclusively owned by one build.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<tempfile::TempDir>,
}

impl Workspace {
    /// Root of the workspace.
    pub fn path(&self) -> &Path {
        // `dir` is only taken by `release`/`drop`, which consume the value.
        self.dir.as_ref().map_or(Path::new(""), |d| d.path())
    }

    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.path().join(rel)
    }

    /// Delete the workspace now, off the async worker threads. Failures are
    /// logged and swallowed.
    pub async fn release(mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        if let Err(e) = tokio::task::spawn_blocking(move || remove(dir)).await {
            warn!("Workspace removal task failed: {e}");
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        // Not awaited: a dropped workspace is removed in the background when
        // a runtime is available, inline otherwise.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove(dir));
            }
            Err(_) => remove(dir),
        }
    }
}

fn remove(dir: tempfile::TempDir) {
    let path = dir.path().to_path_buf();
    match dir.close() {
        Ok(()) => debug!(path = %path.display(), "removed workspace"),
        Err(source) => {
            let err = WorkspaceError::Remove { path, source };
            warn!("{err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binsmith_schema::{BuildTarget, Ecosystem, PackageName, Version};
    use tempfile::tempdir;

    fn key() -> BuildKey {
        BuildKey {
            name: PackageName::new("@scope/tool"),
            ecosystem: Ecosystem::Npm,
            version: Version::new("1.0.0"),
            target: BuildTarget::Linux,
        }
    }

    #[tokio::test]
    async fn test_workspaces_are_unique_and_named_by_key() {
        let scratch = tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path().join("scratch"));

        let a = manager.create(&key()).await.unwrap();
        let b = manager.create(&key()).await.unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());

        let name = a.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("npm-scope-tool-1.0.0-linux-"), "{name}");
    }

    #[tokio::test]
    async fn test_release_removes_directory() {
        let scratch = tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path());

        let ws = manager.create(&key()).await.unwrap();
        std::fs::create_dir_all(ws.join("node_modules/x")).unwrap();
        std::fs::write(ws.join("file.txt"), "x").unwrap();
        let path = ws.path().to_path_buf();
        ws.release().await;
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_outside_runtime_removes_directory() {
        let scratch = tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let ws = runtime.block_on(manager.create(&key())).unwrap();
        std::fs::create_dir_all(ws.join("node_modules/x")).unwrap();
        let path = ws.path().to_path_buf();
        drop(runtime);
        drop(ws);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_inside_runtime_removes_directory_in_background() {
        let scratch = tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path());

        let path = {
            let ws = manager.create(&key()).await.unwrap();
            std::fs::create_dir_all(ws.join("node_modules/x")).unwrap();
            ws.path().to_path_buf()
        };
        for _ in 0..100 {
            if !path.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_sweep() {
        let scratch = tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path());
        std::fs::create_dir_all(scratch.path().join("orphan-1/deep")).unwrap();
        std::fs::write(scratch.path().join("stray"), "x").unwrap();

        let preview = manager.sweep(true).unwrap();
        assert_eq!(preview.len(), 2);
        assert!(scratch.path().join("orphan-1").exists());

        let removed = manager.sweep(false).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_sweep_missing_root() {
        let scratch = tempdir().unwrap();
        let manager = WorkspaceManager::new(scratch.path().join("never-created"));
        assert!(manager.sweep(false).unwrap().is_empty());
    }
}
