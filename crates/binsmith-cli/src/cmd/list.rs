//! List command

use anyhow::{Context, Result};
use crossterm::style::Stylize;

use binsmith_core::Settings;
use binsmith_core::cache::CacheHandle;

use crate::ui::table::artifact_table;

/// Print one page of cached artifacts, most downloaded first
pub async fn list(settings: &Settings, page: u32, per_page: u32, json: bool) -> Result<()> {
    let cache = CacheHandle::spawn_at(settings.layout().db_path())
        .context("Failed to open artifact cache")?;
    let result = cache.list(page, per_page).await;
    cache.shutdown();
    let page = result?;

    if json {
        let value = serde_json::json!({
            "records": page.records,
            "total": page.total,
            "page": page.page,
            "perPage": page.per_page,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if page.records.is_empty() {
        if page.total == 0 {
            println!("No artifacts cached yet.");
        } else {
            println!("Page {} is empty ({} artifacts total).", page.page, page.total);
        }
        return Ok(());
    }

    println!("{}", artifact_table(&page.records));
    let pages = page.total.div_ceil(u64::from(page.per_page.max(1)));
    println!(
        "{}",
        format!("page {} of {pages}, {} artifacts", page.page, page.total).dark_grey()
    );
    Ok(())
}
