//! Shared types for binsmith.
//!
//! Everything that crosses a component boundary in the build pipeline lives
//! here: the request ([`PackageSpec`]), the resolver's answer
//! ([`PackageMetadata`]), the OS selector ([`BuildTarget`]) and the durable
//! cache entry ([`ArtifactRecord`]).

pub mod record;
pub mod target;
pub mod types;

// Re-exports
pub use record::*;
pub use target::*;
pub use types::*;

/// Version string meaning "whatever the registry considers newest".
pub const LATEST: &str = "latest";

/// Description used when a registry publishes none.
pub const NO_DESCRIPTION: &str = "No description provided";
