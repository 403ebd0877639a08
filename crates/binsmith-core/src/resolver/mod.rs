//! Package metadata resolution
//!
//! A resolver turns a [`PackageSpec`] into canonical [`PackageMetadata`]
//! with a concrete version. One implementation exists per ecosystem.

use async_trait::async_trait;
use binsmith_schema::{NO_DESCRIPTION, PackageMetadata, PackageSpec};
use thiserror::Error;

pub mod npm;
pub mod pip;

pub use npm::NpmResolver;
pub use pip::PipResolver;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Package not found: {0}")]
    NotFound(String),

    #[error("Registry unreachable: {0}")]
    RegistryUnreachable(String),
}

#[async_trait]
pub trait MetadataResolver: Send + Sync + std::fmt::Debug {
    /// Resolve `spec`, replacing `latest` with the registry's current version.
    async fn resolve(&self, spec: &PackageSpec) -> Result<PackageMetadata, ResolutionError>;
}

/// Description with the placeholder applied to absent or blank values.
pub(crate) fn description_or_default(description: Option<&str>) -> String {
    match description.map(str::trim) {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => NO_DESCRIPTION.to_string(),
    }
}

/// Split a free-form keyword string.
///
/// Commas win when present (`"a, b c"` is two keywords); otherwise the string
/// is split on whitespace.
pub(crate) fn split_keywords(raw: &str) -> Vec<String> {
    let parts: Vec<&str> = if raw.contains(',') {
        raw.split(',').collect()
    } else {
        raw.split_whitespace().collect()
    };
    parts
        .into_iter()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keywords() {
        assert_eq!(split_keywords("cli, http client"), vec!["cli", "http client"]);
        assert_eq!(split_keywords("cli http  tool"), vec!["cli", "http", "tool"]);
        assert!(split_keywords("  ").is_empty());
    }

    #[test]
    fn test_description_placeholder() {
        assert_eq!(description_or_default(None), NO_DESCRIPTION);
        assert_eq!(description_or_default(Some("  ")), NO_DESCRIPTION);
        assert_eq!(description_or_default(Some(" Pads ")), "Pads");
    }
}
