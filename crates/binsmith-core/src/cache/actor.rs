//! Cache actor
//!
//! `rusqlite::Connection` is not `Sync`, so the connection lives on a
//! dedicated thread and every async caller talks to it through a channel.
//! This also serializes all writes, which the download counter relies on.

use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use binsmith_schema::{ArtifactRecord, BuildTarget, Ecosystem, PackageName, Version};
use tokio::sync::oneshot;

use super::db::{CacheDb, CacheError, Committed, NewArtifact, Page};

type Reply<T> = oneshot::Sender<Result<T, CacheError>>;

/// Requests understood by the cache actor
pub enum CacheEvent {
    Find {
        name: PackageName,
        ecosystem: Ecosystem,
        version: Version,
        target: BuildTarget,
        resp: Reply<Option<ArtifactRecord>>,
    },
    Get {
        id: i64,
        resp: Reply<Option<ArtifactRecord>>,
    },
    Insert {
        artifact: NewArtifact,
        resp: Reply<Committed>,
    },
    UpdateRebuilt {
        id: i64,
        description: String,
        tags: Vec<String>,
        file_name: String,
        file_size: u64,
        downloads: u64,
        resp: Reply<Committed>,
    },
    IncrementDownloads {
        id: i64,
        resp: Reply<ArtifactRecord>,
    },
    List {
        page: u32,
        per_page: u32,
        resp: Reply<Page>,
    },
    Shutdown,
}

impl fmt::Debug for CacheEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Find {
                name,
                ecosystem,
                version,
                target,
                ..
            } => f
                .debug_struct("Find")
                .field("name", name)
                .field("ecosystem", ecosystem)
                .field("version", version)
                .field("target", target)
                .finish_non_exhaustive(),
            Self::Get { id, .. } => f.debug_struct("Get").field("id", id).finish_non_exhaustive(),
            Self::Insert { artifact, .. } => f
                .debug_struct("Insert")
                .field("name", &artifact.name)
                .field("version", &artifact.version)
                .finish_non_exhaustive(),
            Self::UpdateRebuilt { id, file_name, .. } => f
                .debug_struct("UpdateRebuilt")
                .field("id", id)
                .field("file_name", file_name)
                .finish_non_exhaustive(),
            Self::IncrementDownloads { id, .. } => f
                .debug_struct("IncrementDownloads")
                .field("id", id)
                .finish_non_exhaustive(),
            Self::List { page, per_page, .. } => f
                .debug_struct("List")
                .field("page", page)
                .field("per_page", per_page)
                .finish_non_exhaustive(),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Cloneable, `Send + Sync` handle to the cache thread.
#[derive(Clone)]
pub struct CacheHandle {
    sender: mpsc::Sender<CacheEvent>,
}

impl fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheHandle").finish_non_exhaustive()
    }
}

impl CacheHandle {
    /// Open the database at `path` and start the actor thread.
    pub fn spawn_at(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let db = CacheDb::open_at(&path.into())?;
        Ok(Self::spawn(db))
    }

    /// Start an actor over a private in-memory database.
    pub fn spawn_in_memory() -> Result<Self, CacheError> {
        Ok(Self::spawn(CacheDb::open_in_memory()?))
    }

    fn spawn(db: CacheDb) -> Self {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            run_cache_event_loop(db, receiver);
        });
        Self { sender }
    }

    async fn request<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(Reply<T>) -> CacheEvent,
    {
        let (tx, rx) = oneshot::channel();
        self.sender.send(f(tx)).map_err(|_| CacheError::ActorDied)?;
        rx.await.map_err(|_| CacheError::ActorDied)?
    }

    pub async fn find(
        &self,
        name: PackageName,
        ecosystem: Ecosystem,
        version: Version,
        target: BuildTarget,
    ) -> Result<Option<ArtifactRecord>, CacheError> {
        self.request(|resp| CacheEvent::Find {
            name,
            ecosystem,
            version,
            target,
            resp,
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<Option<ArtifactRecord>, CacheError> {
        self.request(|resp| CacheEvent::Get { id, resp }).await
    }

    pub async fn insert(&self, artifact: NewArtifact) -> Result<Committed, CacheError> {
        self.request(|resp| CacheEvent::Insert { artifact, resp })
            .await
    }

    pub async fn update_rebuilt(
        &self,
        id: i64,
        description: String,
        tags: Vec<String>,
        file_name: String,
        file_size: u64,
        downloads: u64,
    ) -> Result<Committed, CacheError> {
        self.request(|resp| CacheEvent::UpdateRebuilt {
            id,
            description,
            tags,
            file_name,
            file_size,
            downloads,
            resp,
        })
        .await
    }

    pub async fn increment_downloads(&self, id: i64) -> Result<ArtifactRecord, CacheError> {
        self.request(|resp| CacheEvent::IncrementDownloads { id, resp })
            .await
    }

    pub async fn list(&self, page: u32, per_page: u32) -> Result<Page, CacheError> {
        self.request(|resp| CacheEvent::List {
            page,
            per_page,
            resp,
        })
        .await
    }

    /// Ask the actor thread to exit once queued requests are served.
    pub fn shutdown(&self) {
        let _ = self.sender.send(CacheEvent::Shutdown);
    }
}

// The db and receiver are moved into the thread so it owns them exclusively.
#[allow(clippy::needless_pass_by_value)]
fn run_cache_event_loop(mut db: CacheDb, receiver: mpsc::Receiver<CacheEvent>) {
    while let Ok(event) = receiver.recv() {
        match event {
            CacheEvent::Find {
                name,
                ecosystem,
                version,
                target,
                resp,
            } => {
                let _ = resp.send(db.find(&name, ecosystem, &version, target));
            }
            CacheEvent::Get { id, resp } => {
                let _ = resp.send(db.get(id));
            }
            CacheEvent::Insert { artifact, resp } => {
                let _ = resp.send(db.insert(&artifact));
            }
            CacheEvent::UpdateRebuilt {
                id,
                description,
                tags,
                file_name,
                file_size,
                downloads,
                resp,
            } => {
                let _ = resp.send(db.update_rebuilt(
                    id,
                    &description,
                    &tags,
                    &file_name,
                    file_size,
                    downloads,
                ));
            }
            CacheEvent::IncrementDownloads { id, resp } => {
                let _ = resp.send(db.increment_downloads(id));
            }
            CacheEvent::List {
                page,
                per_page,
                resp,
            } => {
                let _ = resp.send(db.list(page, per_page));
            }
            CacheEvent::Shutdown => break,
        }
    }
}
