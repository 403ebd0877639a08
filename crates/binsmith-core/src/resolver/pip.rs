use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use binsmith_schema::{PackageMetadata, PackageName, PackageSpec, Version, normalize_tags};
use serde::Deserialize;
use tracing::{debug, info};

use super::{MetadataResolver, ResolutionError, description_or_default, split_keywords};
use crate::process::{CommandRunner, CommandSpec};

/// Prints the installed distribution's core metadata as JSON, or exits 3.
const INTROSPECT_SCRIPT: &str = r#"
import json, sys
from importlib import metadata
try:
    m = metadata.metadata(sys.argv[1])
except metadata.PackageNotFoundError:
    sys.exit(3)
print(json.dumps({
    "name": m.get("Name"),
    "version": m.get("Version"),
    "summary": m.get("Summary"),
    "keywords": m.get("Keywords"),
}))
"#;

const NOT_FOUND_MARKERS: [&str; 2] = ["No matching distribution", "Could not find a version"];

#[derive(Debug, Deserialize)]
struct Introspected {
    name: Option<String>,
    version: String,
    summary: Option<String>,
    keywords: Option<String>,
}

/// Resolves PyPI distributions through a Python interpreter.
///
/// The host interpreter is asked first. When it does not have the requested
/// version, the distribution is installed (without dependencies) into a
/// throwaway venv and introspected there.
#[derive(Debug, Clone)]
pub struct PipResolver {
    runner: Arc<dyn CommandRunner>,
    python: String,
    scratch_root: PathBuf,
    timeout: Duration,
}

impl PipResolver {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        python: impl Into<String>,
        scratch_root: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            python: python.into(),
            scratch_root: scratch_root.into(),
            timeout,
        }
    }

    async fn introspect(&self, python: &str, name: &PackageName) -> Option<Introspected> {
        let cmd = CommandSpec::new(python)
            .args(["-c", INTROSPECT_SCRIPT, name.as_str()])
            .timeout(self.timeout);
        let out = match self.runner.run(&cmd).await {
            Ok(out) if out.success => out,
            Ok(_) => return None,
            Err(e) => {
                debug!("introspection with {python} failed: {e}");
                return None;
            }
        };
        match serde_json::from_str(out.stdout.trim()) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("unreadable introspection output for {name}: {e}");
                None
            }
        }
    }

    async fn resolve_in_venv(
        &self,
        spec: &PackageSpec,
    ) -> Result<Introspected, ResolutionError> {
        let root = self.scratch_root.clone();
        let venv = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&root)?;
            tempfile::Builder::new().prefix("venv-").tempdir_in(&root)
        })
        .await
        .unwrap_or_else(|e| Err(std::io::Error::other(e)))
        .map_err(|e| {
            ResolutionError::RegistryUnreachable(format!("cannot create venv dir: {e}"))
        })?;

        let result = self.install_in_venv(spec, venv.path()).await;

        // A venv holds thousands of files; keep the removal off the workers.
        let path = venv.path().to_path_buf();
        match tokio::task::spawn_blocking(move || venv.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("failed to remove venv {}: {e}", path.display()),
            Err(e) => debug!("venv removal task failed: {e}"),
        }
        result
    }

    async fn install_in_venv(
        &self,
        spec: &PackageSpec,
        venv: &Path,
    ) -> Result<Introspected, ResolutionError> {
        let unreachable = |msg: String| ResolutionError::RegistryUnreachable(msg);

        let create = CommandSpec::new(&self.python)
            .arg("-m")
            .arg("venv")
            .arg(venv.to_string_lossy())
            .timeout(self.timeout);
        let out = self
            .runner
            .run(&create)
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        if !out.success {
            return Err(unreachable(format!(
                "venv creation failed: {}",
                out.failure_summary()
            )));
        }

        let python = venv_python(venv);
        let requirement = if spec.version.is_latest() {
            spec.name.to_string()
        } else {
            format!("{}=={}", spec.name, spec.version)
        };
        info!("Resolving {requirement} from the package index");

        let install = CommandSpec::new(python.to_string_lossy())
            .args([
                "-m",
                "pip",
                "install",
                "--no-deps",
                "--disable-pip-version-check",
                "--quiet",
            ])
            .arg(&requirement)
            .timeout(self.timeout);
        let out = self
            .runner
            .run(&install)
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        if !out.success {
            let output = format!("{}\n{}", out.stdout, out.stderr);
            if NOT_FOUND_MARKERS.iter().any(|m| output.contains(m)) {
                return Err(ResolutionError::NotFound(requirement));
            }
            return Err(unreachable(format!(
                "pip install {requirement} failed: {}",
                out.failure_summary()
            )));
        }

        self.introspect(&python.to_string_lossy(), &spec.name)
            .await
            .ok_or(ResolutionError::NotFound(requirement))
    }
}

fn venv_python(venv: &Path) -> PathBuf {
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

fn to_metadata(spec: &PackageSpec, info: Introspected) -> PackageMetadata {
    PackageMetadata {
        name: info
            .name
            .map_or_else(|| spec.name.clone(), |n| PackageName::new(&n)),
        version: Version::new(&info.version),
        description: description_or_default(info.summary.as_deref()),
        keywords: normalize_tags(
            info.keywords
                .as_deref()
                .map(split_keywords)
                .unwrap_or_default(),
        ),
    }
}

#[async_trait]
impl MetadataResolver for PipResolver {
    async fn resolve(&self, spec: &PackageSpec) -> Result<PackageMetadata, ResolutionError> {
        if let Some(local) = self.introspect(&self.python, &spec.name).await {
            if spec.version.is_latest() || local.version == spec.version.as_str() {
                debug!(version = %local.version, "using locally installed {}", spec.name);
                return Ok(to_metadata(spec, local));
            }
        }

        let info = self.resolve_in_venv(spec).await?;
        Ok(to_metadata(spec, info))
    }
}
