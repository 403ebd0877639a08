//! Durable artifact records.

pub mod actor;
pub mod db;

pub use actor::CacheHandle;
pub use db::{CacheDb, CacheError, Committed, NewArtifact, Page};
