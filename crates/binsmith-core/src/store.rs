//! Finished-artifact directory
//!
//! Files are addressed by their unique file name. Publishing copies into a
//! hidden `.<name>.partial` file first and renames it into place, so readers
//! never observe a half-written executable.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact file name: {0}")]
    InvalidName(String),

    #[error("Artifact already exists: {0}")]
    AlreadyExists(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Append-only directory of published executables.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path a published `file_name` lives at.
    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Whether `file_name` is currently published.
    pub async fn contains(&self, file_name: &str) -> bool {
        if validate_name(file_name).is_err() {
            return false;
        }
        matches!(
            tokio::fs::metadata(self.path_of(file_name)).await,
            Ok(meta) if meta.is_file()
        )
    }

    /// A fresh uniqueness token: `<unix-millis>-<8 hex digits>`.
    pub fn unique_token() -> String {
        format!(
            "{}-{:08x}",
            chrono::Utc::now().timestamp_millis(),
            rand::random::<u32>()
        )
    }

    /// Atomically publish `src` as `file_name`. Returns the published size.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] rather than overwriting, and
    /// [`StoreError::Io`] if the copy or rename fails. A failed publish
    /// leaves no partial file behind.
    pub async fn publish(&self, src: &Path, file_name: &str) -> Result<u64, StoreError> {
        validate_name(file_name)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(io_err(&self.root))?;

        let dest = self.path_of(file_name);
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            return Err(StoreError::AlreadyExists(file_name.to_string()));
        }

        let partial = self.root.join(format!(".{file_name}{PARTIAL_SUFFIX}"));
        let result = async {
            let size = tokio::fs::copy(src, &partial)
                .await
                .map_err(io_err(src))?;
            tokio::fs::rename(&partial, &dest)
                .await
                .map_err(io_err(&dest))?;
            Ok::<u64, StoreError>(size)
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        } else {
            debug!(file = %dest.display(), "published artifact");
        }
        result
    }

    /// Remove a published file. Missing files are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file exists but cannot be removed.
    pub async fn remove(&self, file_name: &str) -> Result<(), StoreError> {
        validate_name(file_name)?;
        let path = self.path_of(file_name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Delete `.partial` leftovers from interrupted publishes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be read.
    pub async fn sweep_partials(&self, dry_run: bool) -> Result<Vec<PathBuf>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut swept = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err(&self.root))? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !(name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX)) {
                continue;
            }
            let path = entry.path();
            if !dry_run {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!("Failed to remove {}: {e}", path.display());
                    continue;
                }
            }
            swept.push(path);
        }
        Ok(swept)
    }
}

fn validate_name(file_name: &str) -> Result<(), StoreError> {
    if file_name.is_empty()
        || file_name.starts_with('.')
        || file_name.contains(['/', '\\'])
        || file_name.contains("..")
    {
        return Err(StoreError::InvalidName(file_name.to_string()));
    }
    Ok(())
}
