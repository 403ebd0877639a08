//! Show command

use anyhow::{Context, Result, bail};

use binsmith_core::Settings;
use binsmith_core::cache::CacheHandle;

/// Print one artifact record as JSON
pub async fn show(settings: &Settings, id: i64) -> Result<()> {
    let cache = CacheHandle::spawn_at(settings.layout().db_path())
        .context("Failed to open artifact cache")?;
    let result = cache.get(id).await;
    cache.shutdown();

    let Some(record) = result? else {
        bail!("No artifact with id {id}");
    };
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
