use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use binsmith_schema::{PackageMetadata, PackageName, PackageSpec, Version, normalize_tags};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{MetadataResolver, ResolutionError, description_or_default, split_keywords};

const USER_AGENT: &str = concat!("binsmith/", env!("CARGO_PKG_VERSION"));

/// Resolves packages against an npm registry's package documents.
#[derive(Debug, Clone)]
pub struct NpmResolver {
    client: reqwest::Client,
    registry: String,
}

/// The subset of an npm package document we read.
#[derive(Debug, Deserialize)]
struct Packument {
    name: Option<String>,
    description: Option<String>,
    #[serde(rename = "dist-tags", default)]
    dist_tags: HashMap<String, String>,
    #[serde(default)]
    versions: BTreeMap<String, VersionDoc>,
}

#[derive(Debug, Default, Deserialize)]
struct VersionDoc {
    description: Option<String>,
    keywords: Option<Value>,
}

impl NpmResolver {
    pub fn new(registry: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self::with_client(client, registry)
    }

    pub fn with_client(client: reqwest::Client, registry: impl Into<String>) -> Self {
        Self {
            client,
            registry: registry.into(),
        }
    }

    /// Document URL for `name`. The scope separator is percent-encoded.
    fn document_url(&self, name: &PackageName) -> String {
        format!(
            "{}/{}",
            self.registry.trim_end_matches('/'),
            name.as_str().replace('/', "%2F")
        )
    }
}

#[async_trait]
impl MetadataResolver for NpmResolver {
    async fn resolve(&self, spec: &PackageSpec) -> Result<PackageMetadata, ResolutionError> {
        let url = self.document_url(&spec.name);
        debug!(%url, "fetching npm package document");

        let resp = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| ResolutionError::RegistryUnreachable(format!("{url}: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ResolutionError::NotFound(spec.name.to_string()));
        }
        if !resp.status().is_success() {
            return Err(ResolutionError::RegistryUnreachable(format!(
                "{url}: HTTP {}",
                resp.status()
            )));
        }

        let doc: Packument = resp.json().await.map_err(|e| {
            ResolutionError::RegistryUnreachable(format!("{url}: invalid package document: {e}"))
        })?;

        metadata_from_document(spec, doc)
    }
}

fn metadata_from_document(
    spec: &PackageSpec,
    mut doc: Packument,
) -> Result<PackageMetadata, ResolutionError> {
    let not_found = || ResolutionError::NotFound(format!("{}@{}", spec.name, spec.version));

    let version = if spec.version.is_latest() {
        doc.dist_tags
            .get("latest")
            .filter(|v| doc.versions.contains_key(*v))
            .cloned()
            .or_else(|| {
                doc.versions
                    .keys()
                    .map(|v| Version::new(v))
                    .max()
                    .map(|v| v.to_string())
            })
            .ok_or_else(not_found)?
    } else if doc.versions.contains_key(spec.version.as_str()) {
        spec.version.to_string()
    } else {
        return Err(not_found());
    };

    let version_doc = doc.versions.remove(&version).unwrap_or_default();
    let description = version_doc.description.or(doc.description);
    let keywords = version_doc.keywords.map(keywords_from_value).unwrap_or_default();

    Ok(PackageMetadata {
        name: doc
            .name
            .map_or_else(|| spec.name.clone(), |n| PackageName::new(&n)),
        version: Version::new(&version),
        description: description_or_default(description.as_deref()),
        keywords: normalize_tags(keywords),
    })
}

/// `keywords` is normally an array, but some packages publish a single
/// string; that form is split on commas and whitespace.
fn keywords_from_value(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Value::String(s) => split_keywords(&s),
        _ => Vec::new(),
    }
}
