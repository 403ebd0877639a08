//! SQLite artifact cache
//!
//! One row per (name, ecosystem, version, target). Rows are created by the
//! first successful build and rewritten in place on rebuild; nothing here
//! ever deletes a row.

use std::path::Path;

use binsmith_schema::{
    ArtifactRecord, BuildTarget, Ecosystem, PackageName, RecordError, Version, normalize_tags,
};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid record: {0}")]
    Invalid(#[from] RecordError),

    #[error("Artifact not found: {0}")]
    NotFound(i64),

    #[error("Cache actor is gone")]
    ActorDied,
}

/// Fields of a freshly built artifact, before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArtifact {
    pub name: PackageName,
    pub ecosystem: Ecosystem,
    pub version: Version,
    pub target: BuildTarget,
    pub description: String,
    pub tags: Vec<String>,
    pub file_name: String,
    pub file_size: u64,
}

/// Result of writing a build into the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    pub record: ArtifactRecord,
    /// File the row pointed at before this write, if it changed.
    pub replaced_file: Option<String>,
    /// The key already had a row, which was kept with its counter bumped.
    /// `record.file_name` is then the existing file, not the offered one.
    pub kept_existing: bool,
}

/// One page of [`CacheDb::list`].
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<ArtifactRecord>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

const COLUMNS: &str = "id, name, description, tags, downloads, version, ecosystem, target, \
                       file_name, file_size, score, security_rating, created_at, updated_at";

pub struct CacheDb {
    conn: Connection,
}

impl CacheDb {
    /// Open or create the cache at `path`.
    pub fn open_at(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Open a private in-memory cache (for testing)
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), CacheError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS artifacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                downloads INTEGER NOT NULL DEFAULT 0,
                version TEXT NOT NULL,
                ecosystem TEXT NOT NULL,
                target TEXT NOT NULL,
                file_name TEXT NOT NULL UNIQUE,
                file_size INTEGER NOT NULL,
                score REAL,
                security_rating REAL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (name, ecosystem, version, target)
            );

            CREATE INDEX IF NOT EXISTS idx_artifacts_latest
                ON artifacts(name, ecosystem, target, updated_at);
            CREATE INDEX IF NOT EXISTS idx_artifacts_popular
                ON artifacts(downloads, updated_at);
            ",
        )?;
        Ok(())
    }

    /// Look up the record answering a request.
    ///
    /// An exact version matches its own row. `latest` matches the most
    /// recently updated row for (name, ecosystem, target).
    pub fn find(
        &self,
        name: &PackageName,
        ecosystem: Ecosystem,
        version: &Version,
        target: BuildTarget,
    ) -> Result<Option<ArtifactRecord>, CacheError> {
        let record = if version.is_latest() {
            self.conn
                .query_row(
                    &format!(
                        "SELECT {COLUMNS} FROM artifacts
                         WHERE name = ?1 AND ecosystem = ?2 AND target = ?3
                         ORDER BY updated_at DESC, id DESC LIMIT 1"
                    ),
                    params![name.as_str(), ecosystem.as_str(), target.as_str()],
                    row_to_record,
                )
                .optional()?
        } else {
            self.conn
                .query_row(
                    &format!(
                        "SELECT {COLUMNS} FROM artifacts
                         WHERE name = ?1 AND ecosystem = ?2 AND version = ?3 AND target = ?4"
                    ),
                    params![
                        name.as_str(),
                        ecosystem.as_str(),
                        version.as_str(),
                        target.as_str()
                    ],
                    row_to_record,
                )
                .optional()?
        };
        Ok(record)
    }

    pub fn get(&self, id: i64) -> Result<Option<ArtifactRecord>, CacheError> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM artifacts WHERE id = ?1"),
                params![id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn require(&self, id: i64) -> Result<ArtifactRecord, CacheError> {
        self.get(id)?.ok_or(CacheError::NotFound(id))
    }

    /// Record a first build with `downloads = 1`.
    ///
    /// If a row for the same key appeared in the meantime (another process
    /// built the same version), that row is kept as it is apart from one more
    /// download, and [`Committed::kept_existing`] is set. The offered file is
    /// then unreferenced and belongs to the caller.
    pub fn insert(&mut self, new: &NewArtifact) -> Result<Committed, CacheError> {
        let now = chrono::Utc::now().timestamp_millis();
        let tags = tags_json(&new.tags);
        let tx = self.conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM artifacts
                 WHERE name = ?1 AND ecosystem = ?2 AND version = ?3 AND target = ?4",
                params![
                    new.name.as_str(),
                    new.ecosystem.as_str(),
                    new.version.as_str(),
                    new.target.as_str()
                ],
                |row| row.get(0),
            )
            .optional()?;

        let (id, kept_existing) = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE artifacts SET downloads = downloads + 1 WHERE id = ?1",
                    params![id],
                )?;
                (id, true)
            }
            None => {
                tx.execute(
                    "INSERT INTO artifacts (name, description, tags, downloads, version,
                         ecosystem, target, file_name, file_size, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                    params![
                        new.name.as_str(),
                        new.description,
                        tags,
                        new.version.as_str(),
                        new.ecosystem.as_str(),
                        new.target.as_str(),
                        new.file_name,
                        to_sql_u64(new.file_size),
                        now
                    ],
                )?;
                (tx.last_insert_rowid(), false)
            }
        };

        tx.commit()?;
        let record = self.require(id)?;
        record.validate()?;
        Ok(Committed {
            record,
            replaced_file: None,
            kept_existing,
        })
    }

    /// Rewrite a stale row after its artifact was rebuilt.
    ///
    /// Keeps the id, points the row at the new file and sets `downloads`
    /// to the caller-supplied value.
    pub fn update_rebuilt(
        &self,
        id: i64,
        description: &str,
        tags: &[String],
        file_name: &str,
        file_size: u64,
        downloads: u64,
    ) -> Result<Committed, CacheError> {
        let old = self.require(id)?;
        let now = chrono::Utc::now().timestamp_millis();
        self.conn.execute(
            "UPDATE artifacts
             SET description = ?2, tags = ?3, downloads = ?4,
                 file_name = ?5, file_size = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                id,
                description,
                tags_json(tags),
                to_sql_u64(downloads),
                file_name,
                to_sql_u64(file_size),
                now
            ],
        )?;
        let record = self.require(id)?;
        record.validate()?;
        Ok(Committed {
            record,
            replaced_file: (old.file_name != file_name).then_some(old.file_name),
            kept_existing: false,
        })
    }

    /// Count one more request against `id`.
    pub fn increment_downloads(&self, id: i64) -> Result<ArtifactRecord, CacheError> {
        let changed = self.conn.execute(
            "UPDATE artifacts SET downloads = downloads + 1 WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(CacheError::NotFound(id));
        }
        self.require(id)
    }

    /// Popular-first listing. `page` is 1-based.
    pub fn list(&self, page: u32, per_page: u32) -> Result<Page, CacheError> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let offset = i64::from(page - 1) * i64::from(per_page);

        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM artifacts", [], |row| row.get(0))?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM artifacts
             ORDER BY downloads DESC, updated_at DESC, id DESC
             LIMIT ?1 OFFSET ?2"
        ))?;
        let records = stmt
            .query_map(params![i64::from(per_page), offset], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            records,
            total: from_sql_u64(total),
            page,
            per_page,
        })
    }
}

fn to_sql_u64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn tags_json(tags: &[String]) -> String {
    serde_json::to_string(&normalize_tags(tags)).unwrap_or_else(|_| "[]".to_string())
}

fn conversion_err<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ArtifactRecord> {
    let name: String = row.get(1)?;
    let tags: String = row.get(3)?;
    let version: String = row.get(5)?;
    let ecosystem: String = row.get(6)?;
    let target: String = row.get(7)?;

    Ok(ArtifactRecord {
        id: row.get(0)?,
        name: PackageName::new(&name),
        description: row.get(2)?,
        tags: serde_json::from_str(&tags).map_err(|e| conversion_err(3, e))?,
        downloads: from_sql_u64(row.get(4)?),
        version: Version::new(&version),
        ecosystem: ecosystem.parse().map_err(|e| conversion_err(6, e))?,
        target: target.parse().map_err(|e| conversion_err(7, e))?,
        file_name: row.get(8)?,
        file_size: from_sql_u64(row.get(9)?),
        score: row.get(10)?,
        security_rating: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}
