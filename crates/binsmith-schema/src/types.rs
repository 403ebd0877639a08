//! Package identity: names, versions, ecosystems and parsed references.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

use crate::LATEST;

/// A registry package name, stored exactly as the registry spells it.
///
/// npm names may be scoped (`@scope/pkg`); pip names are matched
/// case-insensitively by the index itself, so no normalization happens here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    /// Create a new package name from `name`, trimming surrounding whitespace.
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_string())
    }

    /// Return the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe form of the name.
    ///
    /// Drops the leading `@` of a scoped npm name and replaces the scope
    /// separator, so `@babel/cli` becomes `babel-cli`.
    pub fn file_stem(&self) -> String {
        self.0
            .trim_start_matches('@')
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | ' ' => '-',
                other => other,
            })
            .collect()
    }

    /// Python import name for a distribution (`my-tool` -> `my_tool`).
    pub fn module_name(&self) -> String {
        self.0.to_lowercase().replace(['-', '.'], "_")
    }
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

/// A version string, either concrete (`1.3.0`) or the `latest` sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (
            semver::Version::parse(&self.0),
            semver::Version::parse(&other.0),
        ) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            (Ok(_), Err(_)) => std::cmp::Ordering::Greater,
            (Err(_), Ok(_)) => std::cmp::Ordering::Less,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Version {
    /// Create a new version from the given string (stored trimmed, as-is).
    pub fn new(v: &str) -> Self {
        Self(v.trim().to_string())
    }

    /// The `latest` sentinel.
    pub fn latest() -> Self {
        Self(LATEST.to_string())
    }

    /// Returns `true` for the `latest` sentinel.
    pub fn is_latest(&self) -> bool {
        self.0.eq_ignore_ascii_case(LATEST)
    }

    /// Return the version string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::latest()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for Version {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl PartialEq<str> for Version {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Version {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Source package registry and its packaging convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    /// The npm registry; artifacts are bundled JavaScript compiled with `pkg`.
    Npm,
    /// The Python Package Index; artifacts are compiled with Nuitka.
    Pip,
}

impl Ecosystem {
    /// Every supported ecosystem, in display order.
    pub const ALL: [Self; 2] = [Self::Npm, Self::Pip];

    /// Lowercase tag used in storage and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pip => "pip",
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Ecosystem {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "npm" | "node" => Ok(Self::Npm),
            "pip" | "pypi" | "python" => Ok(Self::Pip),
            other => Err(SpecError::UnknownEcosystem(other.to_string())),
        }
    }
}

/// Errors produced while parsing user-facing identifiers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    /// The package name is empty.
    #[error("Package name is empty")]
    EmptyName,

    /// The package name contains characters no registry accepts.
    #[error("Invalid package name: {0}")]
    InvalidName(String),

    /// A version separator was present but nothing followed it.
    #[error("Empty version in '{0}'")]
    EmptyVersion(String),

    /// The ecosystem tag is not one of `npm` / `pip`.
    #[error("Unknown ecosystem: {0}")]
    UnknownEcosystem(String),

    /// The OS tag is not one of `windows` / `macos` / `linux`.
    #[error("Unknown build target: {0}")]
    UnknownTarget(String),
}

/// A single build request: which package, from where, at which version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Registry name of the package.
    pub name: PackageName,
    /// Registry the name belongs to.
    pub ecosystem: Ecosystem,
    /// Requested version, or `latest`.
    pub version: Version,
}

impl PackageSpec {
    /// Create a spec from already-validated parts.
    pub fn new(name: impl Into<PackageName>, ecosystem: Ecosystem, version: impl Into<Version>) -> Self {
        Self {
            name: name.into(),
            ecosystem,
            version: version.into(),
        }
    }

    /// Parse `name`, `name@version`, `@scope/name@version` or, for pip,
    /// `name==version`. A missing version means `latest`.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] if the name is empty or malformed, or a version
    /// separator is not followed by a version.
    pub fn parse(input: &str, ecosystem: Ecosystem) -> Result<Self, SpecError> {
        let input = input.trim();

        let (name, version) = if let Some((name, version)) = input.split_once("==") {
            (name, Some(version))
        } else {
            // Skip the leading '@' of a scoped npm name when looking for the
            // version separator.
            let offset = usize::from(input.starts_with('@'));
            match input[offset..].rfind('@') {
                Some(idx) => (&input[..offset + idx], Some(&input[offset + idx + 1..])),
                None => (input, None),
            }
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(SpecError::EmptyName);
        }
        if name.chars().any(|c| c.is_whitespace() || c == '\\')
            || name.contains("..")
            || (name.contains('/') && !(ecosystem == Ecosystem::Npm && name.starts_with('@')))
        {
            return Err(SpecError::InvalidName(name.to_string()));
        }

        let version = match version.map(str::trim) {
            Some("") => return Err(SpecError::EmptyVersion(input.to_string())),
            Some(v) => Version::new(v),
            None => Version::latest(),
        };

        Ok(Self {
            name: PackageName::new(name),
            ecosystem,
            version,
        })
    }
}

impl std::fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}@{}", self.ecosystem, self.name, self.version)
    }
}

/// Canonical package metadata as answered by a registry.
///
/// `version` is always concrete: resolving `latest` replaces the sentinel
/// with the version the registry selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Canonical package name.
    pub name: PackageName,
    /// Concrete resolved version.
    pub version: Version,
    /// One-line description (never empty).
    pub description: String,
    /// Registry keywords, in the order the registry lists them.
    pub keywords: Vec<String>,
}
