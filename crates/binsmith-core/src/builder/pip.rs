//! Python distributions: install into a private site dir, compile a
//! one-file executable with Nuitka.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use binsmith_schema::{BuildTarget, PackageMetadata};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::{ArtifactBuilder, BuildError, BuiltArtifact, finish, run_step};
use crate::process::{CommandRunner, CommandSpec};
use crate::workspace::Workspace;

const SITE_DIR: &str = "site";

#[derive(Debug)]
pub struct PipBuilder {
    runner: Arc<dyn CommandRunner>,
    python: String,
    timeout: Duration,
    nuitka: OnceCell<()>,
}

impl PipBuilder {
    pub fn new(runner: Arc<dyn CommandRunner>, python: impl Into<String>, timeout: Duration) -> Self {
        Self {
            runner,
            python: python.into(),
            timeout,
            nuitka: OnceCell::new(),
        }
    }

    fn python(&self) -> CommandSpec {
        CommandSpec::new(&self.python).timeout(self.timeout)
    }

    /// Make sure Nuitka is importable, installing it on first use.
    ///
    /// Concurrent builds share one check; a failed attempt is retried by the
    /// next build.
    async fn ensure_nuitka(&self) -> Result<(), BuildError> {
        self.nuitka
            .get_or_try_init(|| async {
                let check = self.python().args(["-m", "nuitka", "--version"]);
                if let Ok(out) = self.runner.run(&check).await {
                    if out.success {
                        return Ok(());
                    }
                }

                warn!("Nuitka not found for {}, installing it", self.python);
                let install = self.python().args([
                    "-m",
                    "pip",
                    "install",
                    "--disable-pip-version-check",
                    "nuitka",
                ]);
                run_step(self.runner.as_ref(), &install, BuildError::CompileFailed).await?;
                Ok::<(), BuildError>(())
            })
            .await
            .map(|_| ())
    }
}

/// Entry script handed to Nuitka: runs the package's `main()` when it has
/// one, otherwise proves the import works.
fn wrapper_source(metadata: &PackageMetadata) -> String {
    let module = metadata.name.module_name();
    format!(
        r#"import importlib
import sys

module = importlib.import_module("{module}")
entry = getattr(module, "main", None)
if callable(entry):
    sys.exit(entry())
print("{name} {version} loaded successfully")
"#,
        name = metadata.name,
        version = metadata.version,
    )
}

#[async_trait]
impl ArtifactBuilder for PipBuilder {
    async fn build(
        &self,
        metadata: &PackageMetadata,
        target: BuildTarget,
        workspace: &Workspace,
    ) -> Result<BuiltArtifact, BuildError> {
        if target != BuildTarget::current() {
            return Err(BuildError::CompileFailed(format!(
                "Nuitka cannot cross-compile for {target} from {}",
                BuildTarget::current()
            )));
        }

        self.ensure_nuitka().await?;

        let root = workspace.path();
        let site = root.join(SITE_DIR);
        let requirement = format!("{}=={}", metadata.name, metadata.version);

        info!("Installing {requirement}");
        let install = self
            .python()
            .args(["-m", "pip", "install", "--disable-pip-version-check", "--target"])
            .arg(site.to_string_lossy())
            .arg(&requirement)
            .current_dir(root);
        run_step(self.runner.as_ref(), &install, BuildError::InstallFailed).await?;

        let stem = metadata.name.file_stem();
        let wrapper = root.join(format!("{}_entry.py", metadata.name.module_name()));
        std::fs::write(&wrapper, wrapper_source(metadata))
            .map_err(|e| BuildError::CompileFailed(format!("cannot write entry script: {e}")))?;

        info!("Compiling {requirement} for {target}");
        let out_dir = root.join("out");
        let file_name = format!("{stem}{}", target.exe_suffix());
        let compile = self
            .python()
            .args(["-m", "nuitka", "--onefile", "--assume-yes-for-downloads", "--remove-output"])
            .arg(format!("--output-dir={}", out_dir.display()))
            .arg(format!("--output-filename={file_name}"))
            .arg(wrapper.to_string_lossy())
            .env("PYTHONPATH", site.to_string_lossy())
            .current_dir(root);
        run_step(self.runner.as_ref(), &compile, BuildError::CompileFailed).await?;

        finish(&out_dir.join(file_name), target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::BuildKey;
    use crate::process::CommandOutput;
    use crate::process::testing::ScriptedRunner;
    use crate::workspace::WorkspaceManager;
    use binsmith_schema::{Ecosystem, PackageName, Version};
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::tempdir;

    fn metadata() -> PackageMetadata {
        PackageMetadata {
            name: PackageName::new("py-spy"),
            version: Version::new("0.3.14"),
            description: "Sampling profiler".to_string(),
            keywords: vec![],
        }
    }

    async fn workspace(scratch: &Path) -> Workspace {
        WorkspaceManager::new(scratch)
            .create(&BuildKey {
                name: PackageName::new("py-spy"),
                ecosystem: Ecosystem::Pip,
                version: Version::new("0.3.14"),
                target: BuildTarget::current(),
            })
            .await
            .unwrap()
    }

    /// Fake python: Nuitka is missing until `pip install nuitka` runs.
    fn toolchain() -> ScriptedRunner {
        let installed = AtomicBool::new(false);
        ScriptedRunner::new(move |cmd| {
            if cmd.has_arg("--version") {
                return Ok(if installed.load(Ordering::SeqCst) {
                    CommandOutput::ok("2.4")
                } else {
                    CommandOutput::failed("No module named nuitka")
                });
            }
            if cmd.has_arg("nuitka") && cmd.has_arg("install") {
                installed.store(true, Ordering::SeqCst);
                return Ok(CommandOutput::ok(""));
            }
            if cmd.has_arg("--onefile") {
                let dir = cmd
                    .args
                    .iter()
                    .find_map(|a| a.strip_prefix("--output-dir="))
                    .unwrap();
                let name = cmd
                    .args
                    .iter()
                    .find_map(|a| a.strip_prefix("--output-filename="))
                    .unwrap();
                std::fs::create_dir_all(dir).unwrap();
                std::fs::write(Path::new(dir).join(name), b"onefile").unwrap();
                return Ok(CommandOutput::ok(""));
            }
            Ok(CommandOutput::ok(""))
        })
    }

    #[tokio::test]
    async fn test_build_installs_nuitka_once() {
        let scratch = tempdir().unwrap();
        let runner = Arc::new(toolchain());
        let builder = PipBuilder::new(runner.clone(), "python3", Duration::from_secs(30));

        let ws_a = workspace(scratch.path()).await;
        let ws_b = workspace(scratch.path()).await;
        let metadata = metadata();
        let (a, b) = tokio::join!(
            builder.build(&metadata, BuildTarget::current(), &ws_a),
            builder.build(&metadata, BuildTarget::current(), &ws_b),
        );
        let a = a.unwrap();
        b.unwrap();

        let expected = format!("py-spy{}", BuildTarget::current().exe_suffix());
        assert_eq!(a.path, ws_a.join("out").join(expected));
        assert_eq!(a.file_size, 7);

        let calls = runner.calls();
        let nuitka_installs = calls
            .iter()
            .filter(|c| c.has_arg("install") && c.has_arg("nuitka"))
            .count();
        assert_eq!(nuitka_installs, 1);

        let compile = calls.iter().find(|c| c.has_arg("--onefile")).unwrap();
        let pythonpath = compile
            .env
            .iter()
            .find(|(k, _)| k == "PYTHONPATH")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert!(pythonpath.ends_with(SITE_DIR));

        let wrapper = std::fs::read_to_string(ws_a.join("py_spy_entry.py")).unwrap();
        assert!(wrapper.contains(r#"import_module("py_spy")"#));
    }

    #[tokio::test]
    async fn test_install_failure() {
        let scratch = tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|cmd| {
            if cmd.has_arg("--target") {
                Ok(CommandOutput::failed("ERROR: No matching distribution"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        }));
        let builder = PipBuilder::new(runner, "python3", Duration::from_secs(30));

        let ws = workspace(scratch.path()).await;
        let err = builder
            .build(&metadata(), BuildTarget::current(), &ws)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::InstallFailed(_)));
    }

    #[tokio::test]
    async fn test_cross_target_is_rejected() {
        let scratch = tempdir().unwrap();
        let runner = Arc::new(toolchain());
        let builder = PipBuilder::new(runner.clone(), "python3", Duration::from_secs(30));
        let other = BuildTarget::ALL
            .into_iter()
            .find(|t| *t != BuildTarget::current())
            .unwrap();

        let ws = workspace(scratch.path()).await;
        let err = builder.build(&metadata(), other, &ws).await.unwrap_err();
        assert!(matches!(err, BuildError::CompileFailed(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_wrapper_calls_main() {
        let src = wrapper_source(&metadata());
        assert!(src.contains("if callable(entry):"));
        assert!(src.contains("py-spy 0.3.14 loaded successfully"));
    }
}
