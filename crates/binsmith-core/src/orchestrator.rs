//! Build orchestration
//!
//! [`BuildOrchestrator::request`] answers "give me an executable for this
//! package" with a cache record. For each [`BuildKey`] the life cycle is:
//!
//! ```text
//! ABSENT ──miss──▶ BUILDING ──commit──▶ READY
//!                     ▲                   │
//!                     └─────── STALE ◀────┘ (artifact file removed)
//! ```
//!
//! Cache hits are answered inline. Misses are coalesced: the first request
//! spawns the build as its own Tokio task and parks a shared handle to it in
//! the in-flight map; identical requests arriving meanwhile await the same
//! handle instead of starting a second build. Because the build is a
//! separate task, a caller that gives up does not cancel it.
//!
//! A task whose key names `latest` (or any version the registry reports
//! differently) hands over to the task for the concrete version once it is
//! known, so `pkg` and `pkg@<current>` never build the same release twice.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use binsmith_schema::{
    ArtifactRecord, BuildTarget, Ecosystem, PackageMetadata, PackageName, PackageSpec, Version,
    artifact_file_name,
};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::builder::{ArtifactBuilder, BuildError, NpmBuilder, PipBuilder};
use crate::cache::{CacheError, CacheHandle, Committed, NewArtifact};
use crate::config::Settings;
use crate::process::CommandRunner;
use crate::reporter::Reporter;
use crate::resolver::{MetadataResolver, NpmResolver, PipResolver, ResolutionError};
use crate::store::{ArtifactStore, StoreError};
use crate::workspace::{Workspace, WorkspaceError, WorkspaceManager};

/// Identity of a cacheable build.
///
/// `version` is whatever the caller asked for, including the `latest`
/// sentinel, so that concurrent `latest` requests coalesce with each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildKey {
    pub name: PackageName,
    pub ecosystem: Ecosystem,
    pub version: Version,
    pub target: BuildTarget,
}

impl BuildKey {
    pub fn new(spec: &PackageSpec, target: BuildTarget) -> Self {
        Self {
            name: spec.name.clone(),
            ecosystem: spec.ecosystem,
            version: spec.version.clone(),
            target,
        }
    }

    /// The request this key was made from.
    pub fn spec(&self) -> PackageSpec {
        PackageSpec::new(self.name.clone(), self.ecosystem, self.version.clone())
    }

    fn at_version(&self, version: Version) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }

    /// Filesystem-safe rendering, e.g. `npm-babel-cli-7.0.0-linux`.
    pub fn slug(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.ecosystem,
            self.name.file_stem(),
            self.version.as_str().replace(['/', '\\', ' '], "-"),
            self.target
        )
    }
}

impl fmt::Display for BuildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{} ({})",
            self.ecosystem, self.name, self.version, self.target
        )
    }
}

/// Failure to durably record a finished build.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything a request can fail with.
///
/// Causes are flattened to strings so one in-flight result can be handed to
/// every coalesced waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<WorkspaceError> for OrchestratorError {
    fn from(e: WorkspaceError) -> Self {
        Self::Workspace(e.to_string())
    }
}

impl From<PersistenceError> for OrchestratorError {
    fn from(e: PersistenceError) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<CacheError> for OrchestratorError {
    fn from(e: CacheError) -> Self {
        PersistenceError::from(e).into()
    }
}

impl From<StoreError> for OrchestratorError {
    fn from(e: StoreError) -> Self {
        PersistenceError::from(e).into()
    }
}

/// Resolver and builder for one ecosystem.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub resolver: Arc<dyn MetadataResolver>,
    pub builder: Arc<dyn ArtifactBuilder>,
}

/// One [`Toolchain`] per supported ecosystem.
#[derive(Debug, Clone)]
pub struct Toolchains {
    npm: Toolchain,
    pip: Toolchain,
}

impl Toolchains {
    pub fn new(npm: Toolchain, pip: Toolchain) -> Self {
        Self { npm, pip }
    }

    /// Production toolchains configured from `settings`.
    pub fn from_settings(settings: &Settings, runner: Arc<dyn CommandRunner>) -> Self {
        let timeout = settings.step_timeout;
        let npm = Toolchain {
            resolver: Arc::new(NpmResolver::new(settings.npm_registry.clone())),
            builder: Arc::new(NpmBuilder::new(
                Arc::clone(&runner),
                settings.npm.clone(),
                settings.npx.clone(),
                settings.node_target.clone(),
                timeout,
            )),
        };
        let pip = Toolchain {
            resolver: Arc::new(PipResolver::new(
                Arc::clone(&runner),
                settings.python.clone(),
                settings.layout().scratch_dir(),
                timeout,
            )),
            builder: Arc::new(PipBuilder::new(runner, settings.python.clone(), timeout)),
        };
        Self { npm, pip }
    }

    pub fn for_ecosystem(&self, ecosystem: Ecosystem) -> &Toolchain {
        match ecosystem {
            Ecosystem::Npm => &self.npm,
            Ecosystem::Pip => &self.pip,
        }
    }
}

/// How a request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// An existing artifact answered it.
    Cache,
    /// This request triggered the build.
    Built,
    /// This request waited on a build started by another request.
    Joined,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Built => "built",
            Self::Joined => "joined",
        }
    }
}

/// Successful answer to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
    pub record: ArtifactRecord,
    pub path: PathBuf,
    pub source: Source,
}

/// Result of one build task, shared by every waiter.
#[derive(Debug, Clone)]
struct Flight {
    record: ArtifactRecord,
    /// The task committed a build, which already counted one download.
    built: bool,
}

type InFlight = Shared<BoxFuture<'static, Result<Flight, OrchestratorError>>>;

struct Inner {
    cache: CacheHandle,
    store: ArtifactStore,
    workspaces: WorkspaceManager,
    toolchains: Toolchains,
    reporter: Arc<dyn Reporter>,
    in_flight: Mutex<HashMap<BuildKey, InFlight>>,
}

/// Coordinates resolution, building, publishing and caching.
///
/// Cheap to clone; clones share the cache, the store and the in-flight map.
#[derive(Clone)]
pub struct BuildOrchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for BuildOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOrchestrator")
            .field("store", &self.inner.store)
            .field("workspaces", &self.inner.workspaces)
            .finish_non_exhaustive()
    }
}

impl BuildOrchestrator {
    pub fn new(
        cache: CacheHandle,
        store: ArtifactStore,
        workspaces: WorkspaceManager,
        toolchains: Toolchains,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                store,
                workspaces,
                toolchains,
                reporter,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Wire up the on-disk cache, store and scratch root under `settings.home`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the database cannot be opened.
    pub fn open(
        settings: &Settings,
        runner: Arc<dyn CommandRunner>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, CacheError> {
        let layout = settings.layout();
        let cache = CacheHandle::spawn_at(layout.db_path())?;
        Ok(Self::new(
            cache,
            ArtifactStore::new(layout.artifacts_dir()),
            WorkspaceManager::new(layout.scratch_dir()),
            Toolchains::from_settings(settings, runner),
            reporter,
        ))
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.inner.cache
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.inner.store
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.inner.workspaces
    }

    /// Number of builds currently running.
    pub fn in_flight(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Produce (or fetch) the executable for `spec` on `target`.
    ///
    /// Every successful call counts exactly one download on the returned
    /// record, whether it was a cache hit, the build that created it, or a
    /// request that joined that build.
    ///
    /// # Errors
    ///
    /// Resolution and build failures leave the cache untouched. See
    /// [`OrchestratorError`].
    pub async fn request(
        &self,
        spec: &PackageSpec,
        target: BuildTarget,
    ) -> Result<BuildOutcome, OrchestratorError> {
        let key = BuildKey::new(spec, target);
        let inner = &self.inner;

        match self.answer(&key).await {
            Ok(outcome) => {
                match outcome.source {
                    Source::Built => inner.reporter.committed(&key, &outcome.record),
                    Source::Cache | Source::Joined => {
                        inner.reporter.cached(&key, &outcome.record);
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                inner.reporter.failed(&key, &e.to_string());
                Err(e)
            }
        }
    }

    async fn answer(&self, key: &BuildKey) -> Result<BuildOutcome, OrchestratorError> {
        let inner = &self.inner;

        if let Some(record) = inner.lookup(key).await? {
            if inner.store.contains(&record.file_name).await {
                debug!(%key, id = record.id, "cache hit");
                let record = inner.cache.increment_downloads(record.id).await?;
                return Ok(inner.outcome(record, Source::Cache));
            }
        }

        let (flight, leader) = inner.join_or_start(key, None);
        inner.settle(flight.await?, leader).await
    }
}

impl Inner {
    fn outcome(&self, record: ArtifactRecord, source: Source) -> BuildOutcome {
        BuildOutcome {
            path: self.store.path_of(&record.file_name),
            record,
            source,
        }
    }

    async fn lookup(&self, key: &BuildKey) -> Result<Option<ArtifactRecord>, CacheError> {
        self.cache
            .find(
                key.name.clone(),
                key.ecosystem,
                key.version.clone(),
                key.target,
            )
            .await
    }

    /// Turn a finished flight into one caller's outcome.
    ///
    /// A commit already counted one download, which belongs to the leader
    /// that started it. Everyone else counts their own.
    async fn settle(
        &self,
        flight: Flight,
        leader: bool,
    ) -> Result<BuildOutcome, OrchestratorError> {
        let Flight { record, built } = flight;
        if leader && built {
            return Ok(self.outcome(record, Source::Built));
        }
        let record = self.cache.increment_downloads(record.id).await?;
        let source = if leader { Source::Cache } else { Source::Joined };
        Ok(self.outcome(record, source))
    }

    /// Attach to the running build for `key`, or start one.
    ///
    /// `resolved` skips resolution in a newly started task; it is ignored
    /// when joining.
    fn join_or_start(
        self: &Arc<Self>,
        key: &BuildKey,
        resolved: Option<PackageMetadata>,
    ) -> (InFlight, bool) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = in_flight.get(key) {
            debug!(%key, "joining in-flight build");
            return (existing.clone(), false);
        }

        // Spawned while holding the lock, so the task cannot remove its
        // entry before it has been inserted.
        let inner = Arc::clone(self);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = inner.build(&task_key, resolved).await;
            inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&task_key);
            result
        });

        let inner = Arc::clone(self);
        let task_key = key.clone();
        let flight: InFlight = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    // A panicked task never reached its own cleanup.
                    inner
                        .in_flight
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&task_key);
                    Err(OrchestratorError::Internal(format!("build task failed: {e}")))
                }
            }
        }
        .boxed()
        .shared();

        in_flight.insert(key.clone(), flight.clone());
        (flight, true)
    }

    /// Finish this task's work through the task for the concrete `key`.
    async fn continue_as(
        self: &Arc<Self>,
        key: BuildKey,
        resolved: Option<PackageMetadata>,
    ) -> Result<Flight, OrchestratorError> {
        debug!(%key, "continuing under concrete version");
        let (flight, started) = self.join_or_start(&key, resolved);
        let Flight { record, built } = flight.await?;
        // A commit made by a task someone else started counted their download.
        Ok(Flight {
            record,
            built: built && started,
        })
    }

    /// Body of a build task: re-check, resolve, build, publish, commit.
    async fn build(
        self: &Arc<Self>,
        key: &BuildKey,
        resolved: Option<PackageMetadata>,
    ) -> Result<Flight, OrchestratorError> {
        // A build for this key may have committed between the caller's
        // lookup and this task starting.
        let stale = match self.lookup(key).await? {
            Some(record) if self.store.contains(&record.file_name).await => {
                debug!(%key, "artifact appeared while queued");
                return Ok(Flight {
                    record,
                    built: false,
                });
            }
            Some(record) => {
                info!("Artifact {} for {key} is missing, rebuilding", record.file_name);
                Some(record)
            }
            None => None,
        };

        // A stale record is rebuilt at exactly the version it describes.
        if let Some(record) = &stale {
            if record.version != key.version {
                return self
                    .continue_as(key.at_version(record.version.clone()), None)
                    .await;
            }
        }

        let toolchain = self.toolchains.for_ecosystem(key.ecosystem);
        let metadata = match resolved {
            Some(metadata) => metadata,
            None => {
                self.reporter.resolving(key);
                let spec = key.spec();
                info!("Resolving {spec}");
                toolchain.resolver.resolve(&spec).await?
            }
        };
        if stale.is_none() && metadata.version != key.version {
            let concrete = key.at_version(metadata.version.clone());
            return self.continue_as(concrete, Some(metadata)).await;
        }

        self.reporter.building(key, &metadata);
        let workspace = self.workspaces.create(key).await?;
        let published = self
            .build_and_publish(toolchain, &metadata, key.target, &workspace)
            .await;
        workspace.release().await;
        let (file_name, file_size) = published?;

        let committed = match self.commit(key, stale, &metadata, &file_name, file_size).await {
            Ok(committed) => committed,
            Err(e) => {
                // Never leave a published file without a record.
                self.discard(&file_name).await;
                return Err(PersistenceError::from(e).into());
            }
        };

        if let Some(replaced) = &committed.replaced_file {
            self.discard(replaced).await;
        }

        info!(
            id = committed.record.id,
            size = committed.record.file_size,
            "Committed {} for {key}",
            committed.record.file_name
        );
        Ok(Flight {
            record: committed.record,
            built: true,
        })
    }

    /// Record a published file, either over a stale row or as a new one.
    async fn commit(
        &self,
        key: &BuildKey,
        stale: Option<ArtifactRecord>,
        metadata: &PackageMetadata,
        file_name: &str,
        file_size: u64,
    ) -> Result<Committed, CacheError> {
        if let Some(old) = stale {
            return self
                .cache
                .update_rebuilt(
                    old.id,
                    metadata.description.clone(),
                    metadata.keywords.clone(),
                    file_name.to_string(),
                    file_size,
                    old.downloads + 1,
                )
                .await;
        }

        let committed = self
            .cache
            .insert(NewArtifact {
                name: key.name.clone(),
                ecosystem: key.ecosystem,
                version: metadata.version.clone(),
                target: key.target,
                description: metadata.description.clone(),
                tags: metadata.keywords.clone(),
                file_name: file_name.to_string(),
                file_size,
            })
            .await?;
        if !committed.kept_existing {
            return Ok(committed);
        }

        // Another process recorded this version first. Its file stays the
        // answer while it exists; ours is surplus.
        if self.store.contains(&committed.record.file_name).await {
            debug!(%key, kept = %committed.record.file_name, "discarding duplicate build");
            self.discard(file_name).await;
            return Ok(committed);
        }
        let record = committed.record;
        self.cache
            .update_rebuilt(
                record.id,
                metadata.description.clone(),
                metadata.keywords.clone(),
                file_name.to_string(),
                file_size,
                record.downloads,
            )
            .await
    }

    async fn discard(&self, file_name: &str) {
        if let Err(e) = self.store.remove(file_name).await {
            warn!("Failed to remove artifact {file_name}: {e}");
        }
    }

    async fn build_and_publish(
        &self,
        toolchain: &Toolchain,
        metadata: &PackageMetadata,
        target: BuildTarget,
        workspace: &Workspace,
    ) -> Result<(String, u64), OrchestratorError> {
        info!("Building {}@{} for {target}", metadata.name, metadata.version);
        let built = toolchain.builder.build(metadata, target, workspace).await?;

        let file_name = artifact_file_name(
            &metadata.name,
            &metadata.version,
            target,
            &ArtifactStore::unique_token(),
        );
        let file_size = self.store.publish(&built.path, &file_name).await?;
        debug!(file = %file_name, size = file_size, built_size = built.file_size, "published");
        Ok((file_name, file_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::builder::BuiltArtifact;
    use crate::reporter::NullReporter;

    /// Resolver and builder that fail and count every call.
    #[derive(Debug, Default)]
    struct Refusing {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MetadataResolver for Refusing {
        async fn resolve(&self, spec: &PackageSpec) -> Result<PackageMetadata, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ResolutionError::NotFound(spec.to_string()))
        }
    }

    #[async_trait]
    impl ArtifactBuilder for Refusing {
        async fn build(
            &self,
            _metadata: &PackageMetadata,
            _target: BuildTarget,
            _workspace: &Workspace,
        ) -> Result<BuiltArtifact, BuildError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BuildError::CompileFailed("unexpected build".to_string()))
        }
    }

    struct Fixture {
        home: TempDir,
        refusing: Arc<Refusing>,
        orchestrator: BuildOrchestrator,
    }

    fn fixture() -> Fixture {
        let home = tempfile::tempdir().unwrap();
        let refusing = Arc::new(Refusing::default());
        let toolchain = Toolchain {
            resolver: refusing.clone(),
            builder: refusing.clone(),
        };
        let orchestrator = BuildOrchestrator::new(
            CacheHandle::spawn_in_memory().unwrap(),
            ArtifactStore::new(home.path().join("artifacts")),
            WorkspaceManager::new(home.path().join("scratch")),
            Toolchains::new(toolchain.clone(), toolchain),
            Arc::new(NullReporter),
        );
        Fixture {
            home,
            refusing,
            orchestrator,
        }
    }

    fn key() -> BuildKey {
        BuildKey {
            name: PackageName::new("left-pad"),
            ecosystem: Ecosystem::Npm,
            version: Version::new("2.0.0"),
            target: BuildTarget::Linux,
        }
    }

    fn metadata() -> PackageMetadata {
        PackageMetadata {
            name: PackageName::new("left-pad"),
            version: Version::new("2.0.0"),
            description: "String left pad".to_string(),
            keywords: vec![],
        }
    }

    /// Publish a file for `key` into the store and return its name.
    async fn publish(f: &Fixture, key: &BuildKey, body: &[u8]) -> String {
        let file_name = artifact_file_name(
            &key.name,
            &key.version,
            key.target,
            &ArtifactStore::unique_token(),
        );
        let src = f.home.path().join(format!("{file_name}.src"));
        std::fs::write(&src, body).unwrap();
        f.orchestrator.store().publish(&src, &file_name).await.unwrap();
        file_name
    }

    async fn record(f: &Fixture, key: &BuildKey, file_name: &str) -> ArtifactRecord {
        f.orchestrator
            .cache()
            .insert(NewArtifact {
                name: key.name.clone(),
                ecosystem: key.ecosystem,
                version: key.version.clone(),
                target: key.target,
                description: "seeded".to_string(),
                tags: vec![],
                file_name: file_name.to_string(),
                file_size: 6,
            })
            .await
            .unwrap()
            .record
    }

    fn published(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_task_finds_artifact_committed_while_queued() {
        let f = fixture();
        let key = key();
        let file_name = publish(&f, &key, b"seeded").await;
        let seeded = record(&f, &key, &file_name).await;

        // Start the task directly, as if the caller's lookup had missed.
        let inner = &f.orchestrator.inner;
        let (flight, leader) = inner.join_or_start(&key, None);
        assert!(leader);
        let flight = flight.await.unwrap();
        assert!(!flight.built);
        assert_eq!(flight.record.id, seeded.id);
        assert_eq!(f.refusing.calls.load(Ordering::SeqCst), 0);

        // Nothing was committed for this leader, so it counts its own download.
        let outcome = inner.settle(flight, leader).await.unwrap();
        assert_eq!(outcome.source, Source::Cache);
        assert_eq!(outcome.record.downloads, 2);
        assert_eq!(outcome.record.file_name, file_name);
        assert!(outcome.path.is_file());
    }

    #[tokio::test]
    async fn test_settle_counts_downloads_per_caller() {
        let f = fixture();
        let key = key();
        let file_name = publish(&f, &key, b"seeded").await;
        let seeded = record(&f, &key, &file_name).await;
        let inner = &f.orchestrator.inner;

        let built = Flight {
            record: seeded.clone(),
            built: true,
        };
        let leader = inner.settle(built.clone(), true).await.unwrap();
        assert_eq!(leader.source, Source::Built);
        assert_eq!(leader.record.downloads, 1);

        let joined = inner.settle(built, false).await.unwrap();
        assert_eq!(joined.source, Source::Joined);
        assert_eq!(joined.record.downloads, 2);
    }

    #[tokio::test]
    async fn test_commit_keeps_existing_row_and_drops_duplicate_file() {
        let f = fixture();
        let key = key();
        let first = publish(&f, &key, b"seeded").await;
        let seeded = record(&f, &key, &first).await;
        let duplicate = publish(&f, &key, b"duplicate build").await;

        let committed = f
            .orchestrator
            .inner
            .commit(&key, None, &metadata(), &duplicate, 15)
            .await
            .unwrap();
        assert!(committed.kept_existing);
        assert_eq!(committed.record.id, seeded.id);
        assert_eq!(committed.record.file_name, first);
        assert_eq!(committed.record.downloads, 2);

        let store = f.orchestrator.store();
        assert!(store.contains(&first).await);
        assert!(!store.contains(&duplicate).await);
        assert_eq!(published(store.root()), 1);
    }

    #[tokio::test]
    async fn test_commit_records_requested_name() {
        let f = fixture();
        let key = key();
        let file_name = publish(&f, &key, b"fresh").await;
        let mut metadata = metadata();
        metadata.name = PackageName::new("Left-Pad");

        let committed = f
            .orchestrator
            .inner
            .commit(&key, None, &metadata, &file_name, 5)
            .await
            .unwrap();
        assert!(!committed.kept_existing);
        assert_eq!(committed.record.name, key.name);
        assert_eq!(committed.record.downloads, 1);
    }

    #[tokio::test]
    async fn test_commit_adopts_new_file_when_existing_one_is_gone() {
        let f = fixture();
        let key = key();
        let seeded = record(&f, &key, "left-pad_2.0.0_linux_gone").await;
        let fresh = publish(&f, &key, b"fresh build").await;

        let committed = f
            .orchestrator
            .inner
            .commit(&key, None, &metadata(), &fresh, 11)
            .await
            .unwrap();
        assert_eq!(committed.record.id, seeded.id);
        assert_eq!(committed.record.file_name, fresh);
        assert_eq!(committed.record.file_size, 11);
        assert_eq!(committed.record.downloads, 2);
        assert!(f.orchestrator.store().contains(&fresh).await);
    }

    #[test]
    fn test_key_slug_and_display() {
        let spec = PackageSpec::parse("@babel/cli@7.0.0", Ecosystem::Npm).unwrap();
        let key = BuildKey::new(&spec, BuildTarget::Windows);
        assert_eq!(key.slug(), "npm-babel-cli-7.0.0-windows");
        assert_eq!(key.to_string(), "npm:@babel/cli@7.0.0 (windows)");
        assert_eq!(key.spec(), spec);
    }

    #[test]
    fn test_errors_flatten_to_strings() {
        let err: OrchestratorError = CacheError::ActorDied.into();
        assert_eq!(
            err,
            OrchestratorError::Persistence("Cache actor is gone".to_string())
        );

        let err: OrchestratorError = ResolutionError::NotFound("x".to_string()).into();
        assert_eq!(err.to_string(), "Package not found: x");
    }
}
