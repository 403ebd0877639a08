use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Environment variable overriding the binsmith home directory.
pub const HOME_ENV: &str = "BINSMITH_HOME";

/// Returns the binsmith home directory, or None if the user's home cannot be resolved.
pub fn try_binsmith_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var(HOME_ENV) {
        if !val.trim().is_empty() {
            return Some(PathBuf::from(val));
        }
    }
    home_dir().map(|h| h.join(".binsmith"))
}

/// On-disk layout rooted at a binsmith home.
///
/// ```text
/// <home>/
/// ├── artifacts/   # Finished executables, addressed by file name
/// ├── scratch/     # Ephemeral build workspaces
/// ├── cache.db     # SQLite artifact records
/// └── config.toml  # Optional settings
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    home: PathBuf,
}

impl Layout {
    /// Layout rooted at `home`.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Root directory.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// `SQLite` database path: `<home>/cache.db`
    pub fn db_path(&self) -> PathBuf {
        self.home.join("cache.db")
    }

    /// Finished artifact directory: `<home>/artifacts`
    pub fn artifacts_dir(&self) -> PathBuf {
        self.home.join("artifacts")
    }

    /// Workspace scratch root: `<home>/scratch`
    pub fn scratch_dir(&self) -> PathBuf {
        self.home.join("scratch")
    }

    /// Optional settings file: `<home>/config.toml`
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = Layout::new("/srv/binsmith");
        assert_eq!(layout.db_path(), PathBuf::from("/srv/binsmith/cache.db"));
        assert_eq!(
            layout.artifacts_dir(),
            PathBuf::from("/srv/binsmith/artifacts")
        );
        assert_eq!(layout.scratch_dir(), PathBuf::from("/srv/binsmith/scratch"));
        assert_eq!(
            layout.config_path(),
            PathBuf::from("/srv/binsmith/config.toml")
        );
    }
}
