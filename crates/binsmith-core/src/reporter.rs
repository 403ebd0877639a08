//! Reporter trait for dependency injection
//!
//! The orchestrator reports pipeline progress through this trait so it stays
//! independent of any particular terminal UI.

use binsmith_schema::{ArtifactRecord, PackageMetadata};

use crate::orchestrator::BuildKey;

pub trait Reporter: Send + Sync {
    /// Metadata lookup started for a cache miss.
    fn resolving(&self, key: &BuildKey);

    /// The toolchain is running for the resolved package.
    fn building(&self, key: &BuildKey, metadata: &PackageMetadata);

    /// The request was answered from the cache.
    fn cached(&self, key: &BuildKey, record: &ArtifactRecord);

    /// A fresh build was published and recorded.
    fn committed(&self, key: &BuildKey, record: &ArtifactRecord);

    /// The request failed.
    fn failed(&self, key: &BuildKey, reason: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn resolving(&self, key: &BuildKey) {
        (**self).resolving(key)
    }
    fn building(&self, key: &BuildKey, metadata: &PackageMetadata) {
        (**self).building(key, metadata)
    }
    fn cached(&self, key: &BuildKey, record: &ArtifactRecord) {
        (**self).cached(key, record)
    }
    fn committed(&self, key: &BuildKey, record: &ArtifactRecord) {
        (**self).committed(key, record)
    }
    fn failed(&self, key: &BuildKey, reason: &str) {
        (**self).failed(key, reason)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn resolving(&self, _key: &BuildKey) {}
    fn building(&self, _key: &BuildKey, _metadata: &PackageMetadata) {}
    fn cached(&self, _key: &BuildKey, _record: &ArtifactRecord) {}
    fn committed(&self, _key: &BuildKey, _record: &ArtifactRecord) {}
    fn failed(&self, _key: &BuildKey, _reason: &str) {}
}
