//! Clean command (leftover workspaces and partial publishes)

use anyhow::Result;
use crossterm::style::Stylize;

use binsmith_core::Settings;
use binsmith_core::store::ArtifactStore;
use binsmith_core::workspace::WorkspaceManager;

/// Remove scratch directories and `.partial` files left by killed processes
pub async fn clean(settings: &Settings, dry_run: bool) -> Result<()> {
    let layout = settings.layout();
    let workspaces = WorkspaceManager::new(layout.scratch_dir()).sweep(dry_run)?;
    let partials = ArtifactStore::new(layout.artifacts_dir())
        .sweep_partials(dry_run)
        .await?;

    let verb = if dry_run { "would remove" } else { "removed" };
    for path in workspaces.iter().chain(partials.iter()) {
        println!("  {} {}", verb.dark_grey(), path.display());
    }

    let count = workspaces.len() + partials.len();
    if count == 0 {
        println!("Nothing to clean.");
    } else if dry_run {
        println!("{count} item(s) would be removed.");
    } else {
        println!("{} {count} item(s) removed.", "✓".green());
    }
    Ok(())
}
