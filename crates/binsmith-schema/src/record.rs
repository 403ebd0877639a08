//! Cache records and the naming rules for artifact files.

use serde::{Deserialize, Serialize};

use crate::target::BuildTarget;
use crate::types::{Ecosystem, PackageName, Version};

/// Inclusive upper bound for [`ArtifactRecord::score`].
pub const MAX_SCORE: f64 = 5.0;

/// Inclusive upper bound for [`ArtifactRecord::security_rating`].
pub const MAX_SECURITY_RATING: f64 = 10.0;

/// Durable cache entry describing one built artifact.
///
/// `file_name` is globally unique and names exactly one file in the artifact
/// store. A record is created by the first successful build for its key and
/// rewritten in place (same `id`) when its file goes missing and is rebuilt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    /// Store-assigned identifier.
    pub id: i64,
    /// Package name as requested by the caller.
    pub name: PackageName,
    /// Package description copied from the resolved metadata.
    pub description: String,
    /// Registry keywords, de-duplicated, in first-seen order.
    pub tags: Vec<String>,
    /// Number of requests that resolved to this artifact.
    pub downloads: u64,
    /// Concrete version the artifact was built from.
    pub version: Version,
    /// Registry the package came from.
    pub ecosystem: Ecosystem,
    /// Operating system the artifact runs on.
    pub target: BuildTarget,
    /// Unique file name inside the artifact store.
    pub file_name: String,
    /// Exact size of the artifact file in bytes.
    pub file_size: u64,
    /// Optional quality score in `[0, 5]`.
    pub score: Option<f64>,
    /// Optional security rating in `[0, 10]`.
    pub security_rating: Option<f64>,
    /// Creation time, unix milliseconds.
    pub created_at: i64,
    /// Last modification time, unix milliseconds.
    pub updated_at: i64,
}

/// Errors that can occur when validating an [`ArtifactRecord`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    /// A required field is empty.
    #[error("Empty field: {0}")]
    EmptyField(&'static str),

    /// The score lies outside `[0, 5]`.
    #[error("Score out of range [0, 5]: {0}")]
    ScoreOutOfRange(f64),

    /// The security rating lies outside `[0, 10]`.
    #[error("Security rating out of range [0, 10]: {0}")]
    SecurityRatingOutOfRange(f64),

    /// The file name would escape the artifact store.
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),
}

impl ArtifactRecord {
    /// Validates field-level invariants.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::EmptyField`] if `name`, `version` or `file_name`
    /// is empty, [`RecordError::InvalidFileName`] if `file_name` contains a
    /// path separator, and the range errors for `score` / `security_rating`.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.name.is_empty() {
            return Err(RecordError::EmptyField("name"));
        }
        if self.version.is_empty() {
            return Err(RecordError::EmptyField("version"));
        }
        if self.file_name.is_empty() {
            return Err(RecordError::EmptyField("fileName"));
        }
        if self.file_name.contains(['/', '\\']) || self.file_name.starts_with('.') {
            return Err(RecordError::InvalidFileName(self.file_name.clone()));
        }
        if let Some(score) = self.score {
            if !(0.0..=MAX_SCORE).contains(&score) {
                return Err(RecordError::ScoreOutOfRange(score));
            }
        }
        if let Some(rating) = self.security_rating {
            if !(0.0..=MAX_SECURITY_RATING).contains(&rating) {
                return Err(RecordError::SecurityRatingOutOfRange(rating));
            }
        }
        Ok(())
    }
}

/// De-duplicate tags, keeping the first occurrence of each and dropping
/// blanks.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Build the artifact file name for a package.
///
/// Layout: `<name>_<version>_<target>_<unique><ext>`. The `unique` part is
/// supplied by the caller (time plus randomness) so that two builds of the
/// same key never collide.
pub fn artifact_file_name(
    name: &PackageName,
    version: &Version,
    target: BuildTarget,
    unique: &str,
) -> String {
    format!(
        "{}_{}_{}_{}{}",
        name.file_stem(),
        version.as_str().replace(['/', '\\'], "-"),
        target.as_str(),
        unique,
        target.exe_suffix()
    )
}
