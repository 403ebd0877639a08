//! Runtime settings.
//!
//! Settings are layered, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. `<home>/config.toml` (every key optional)
//! 3. `BINSMITH_*` environment variables
//! 4. Explicit overrides from the caller (the CLI applies its flags last)
//!
//! ```toml
//! npm_registry = "https://registry.npmjs.org"
//! python = "python3"
//! node_target = "node18"
//! step_timeout_secs = 900
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::paths::{Layout, try_binsmith_home};

/// Default npm registry endpoint.
pub const DEFAULT_NPM_REGISTRY: &str = "https://registry.npmjs.org";

/// Default Node.js runtime the bundler and packager target.
pub const DEFAULT_NODE_TARGET: &str = "node18";

/// Default per-process timeout for toolchain invocations.
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 600;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine home directory. Set BINSMITH_HOME to override.")]
    NoHome,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Effective settings for one binsmith process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Root of all on-disk state.
    pub home: PathBuf,
    /// Base URL of the npm registry.
    pub npm_registry: String,
    /// Python interpreter used for introspection and Nuitka.
    pub python: String,
    /// `npm` executable.
    pub npm: String,
    /// `npx` executable used to run esbuild and pkg.
    pub npx: String,
    /// Node.js runtime token, e.g. `node18`.
    pub node_target: String,
    /// Timeout applied to each external toolchain process.
    pub step_timeout: Duration,
}

/// Shape of `config.toml`. Unknown keys are rejected so typos surface early.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    npm_registry: Option<String>,
    python: Option<String>,
    npm: Option<String>,
    npx: Option<String>,
    node_target: Option<String>,
    step_timeout_secs: Option<u64>,
}

impl Settings {
    /// Built-in defaults rooted at `home`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            npm_registry: DEFAULT_NPM_REGISTRY.to_string(),
            python: default_python().to_string(),
            npm: "npm".to_string(),
            npx: "npx".to_string(),
            node_target: DEFAULT_NODE_TARGET.to_string(),
            step_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
        }
    }

    /// Load defaults, then `config.toml`, then the process environment.
    ///
    /// `home` overrides `BINSMITH_HOME` when given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if no home can be determined, the config file
    /// exists but cannot be read or parsed, or an environment value is
    /// malformed.
    pub fn load(home: Option<PathBuf>) -> Result<Self, ConfigError> {
        let home = home
            .or_else(try_binsmith_home)
            .ok_or(ConfigError::NoHome)?;
        let mut settings = Self::with_home(home);
        let config_path = settings.layout().config_path();
        settings.merge_file(&config_path)?;
        settings.merge_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Directory layout under [`Settings::home`].
    pub fn layout(&self) -> Layout {
        Layout::new(&self.home)
    }

    /// Merge `config.toml` at `path` if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            return Ok(());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileSettings = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(v) = file.npm_registry {
            self.npm_registry = v;
        }
        if let Some(v) = file.python {
            self.python = v;
        }
        if let Some(v) = file.npm {
            self.npm = v;
        }
        if let Some(v) = file.npx {
            self.npx = v;
        }
        if let Some(v) = file.node_target {
            self.node_target = v;
        }
        if let Some(secs) = file.step_timeout_secs {
            self.step_timeout = Duration::from_secs(secs);
        }
        Ok(())
    }

    /// Merge `BINSMITH_*` variables as returned by `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if `BINSMITH_STEP_TIMEOUT` is
    /// not a positive integer.
    pub fn merge_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("BINSMITH_NPM_REGISTRY") {
            self.npm_registry = v;
        }
        if let Some(v) = get("BINSMITH_PYTHON") {
            self.python = v;
        }
        if let Some(v) = get("BINSMITH_NPM") {
            self.npm = v;
        }
        if let Some(v) = get("BINSMITH_NPX") {
            self.npx = v;
        }
        if let Some(v) = get("BINSMITH_NODE_TARGET") {
            self.node_target = v;
        }
        if let Some(v) = get("BINSMITH_STEP_TIMEOUT") {
            let secs = v
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or(ConfigError::InvalidValue {
                    key: "BINSMITH_STEP_TIMEOUT",
                    value: v.clone(),
                })?;
            self.step_timeout = Duration::from_secs(secs);
        }
        Ok(())
    }
}

fn default_python() -> &'static str {
    if cfg!(windows) { "python" } else { "python3" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::with_home("/tmp/bs");
        assert_eq!(settings.npm_registry, DEFAULT_NPM_REGISTRY);
        assert_eq!(settings.node_target, "node18");
        assert_eq!(settings.step_timeout, Duration::from_secs(600));
        assert_eq!(settings.layout().db_path(), PathBuf::from("/tmp/bs/cache.db"));
    }

    #[test]
    fn test_file_then_env_precedence() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("config.toml");
        std::fs::write(
            &config,
            "npm_registry = \"http://file.example\"\npython = \"python3.12\"\nstep_timeout_secs = 30\n",
        )
        .unwrap();

        let mut settings = Settings::with_home(dir.path());
        settings.merge_file(&config).unwrap();
        assert_eq!(settings.npm_registry, "http://file.example");
        assert_eq!(settings.step_timeout, Duration::from_secs(30));

        let env: HashMap<&str, &str> = [
            ("BINSMITH_NPM_REGISTRY", "http://env.example"),
            ("BINSMITH_STEP_TIMEOUT", "45"),
            ("BINSMITH_PYTHON", ""),
        ]
        .into_iter()
        .collect();
        settings
            .merge_env(|k| env.get(k).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(settings.npm_registry, "http://env.example");
        assert_eq!(settings.step_timeout, Duration::from_secs(45));
        // Blank env values do not clobber the file layer.
        assert_eq!(settings.python, "python3.12");
    }

    #[test]
    fn test_missing_file_is_fine() {
        let dir = tempdir().unwrap();
        let mut settings = Settings::with_home(dir.path());
        settings
            .merge_file(&dir.path().join("config.toml"))
            .unwrap();
        assert_eq!(settings, Settings::with_home(dir.path()));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("config.toml");
        std::fs::write(&config, "registry = \"typo\"\n").unwrap();

        let mut settings = Settings::with_home(dir.path());
        assert!(matches!(
            settings.merge_file(&config),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let mut settings = Settings::with_home("/tmp/bs");
        let result = settings.merge_env(|k| {
            (k == "BINSMITH_STEP_TIMEOUT").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
