//! Artifact builders
//!
//! A builder drives one ecosystem's toolchain inside a [`Workspace`] and
//! leaves a single native executable there. Nothing is written outside the
//! workspace; publishing is the orchestrator's job.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use binsmith_schema::{BuildTarget, PackageMetadata};
use thiserror::Error;

use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::workspace::Workspace;

pub mod npm;
pub mod pip;

pub use npm::NpmBuilder;
pub use pip::PipBuilder;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("No executable entry point: {0}")]
    EntryPointMissing(String),

    #[error("Bundling failed: {0}")]
    BundleFailed(String),

    #[error("Compilation failed: {0}")]
    CompileFailed(String),
}

/// A finished executable inside a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltArtifact {
    pub path: PathBuf,
    pub file_size: u64,
}

#[async_trait]
pub trait ArtifactBuilder: Send + Sync + std::fmt::Debug {
    /// Build `metadata` for `target` inside `workspace`.
    async fn build(
        &self,
        metadata: &PackageMetadata,
        target: BuildTarget,
        workspace: &Workspace,
    ) -> Result<BuiltArtifact, BuildError>;
}

/// Run one toolchain step, mapping any failure (spawn, timeout, non-zero
/// exit) to the step's error kind.
pub(crate) async fn run_step(
    runner: &dyn CommandRunner,
    cmd: &CommandSpec,
    fail: fn(String) -> BuildError,
) -> Result<CommandOutput, BuildError> {
    match runner.run(cmd).await {
        Ok(out) if out.success => Ok(out),
        Ok(out) => Err(fail(format!("{}: {}", cmd.program, out.failure_summary()))),
        Err(e) => Err(fail(e.to_string())),
    }
}

/// Check the compiler output and fix up its permissions.
pub(crate) fn finish(path: &Path, target: BuildTarget) -> Result<BuiltArtifact, BuildError> {
    let meta = std::fs::metadata(path).map_err(|e| {
        BuildError::CompileFailed(format!("no output at {}: {e}", path.display()))
    })?;
    if !meta.is_file() || meta.len() == 0 {
        return Err(BuildError::CompileFailed(format!(
            "empty or invalid output at {}",
            path.display()
        )));
    }
    if target.is_unix_like() {
        make_executable(path).map_err(|e| {
            BuildError::CompileFailed(format!("cannot chmod {}: {e}", path.display()))
        })?;
    }
    Ok(BuiltArtifact {
        path: path.to_path_buf(),
        file_size: meta.len(),
    })
}

#[cfg(unix)]
pub(crate) fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
pub(crate) fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessError;
    use crate::process::testing::ScriptedRunner;

    #[tokio::test]
    async fn test_run_step_maps_failures() {
        let runner = ScriptedRunner::new(|cmd| {
            if cmd.has_arg("slow") {
                Err(ProcessError::TimedOut {
                    program: cmd.program.clone(),
                    secs: 1,
                })
            } else {
                Ok(CommandOutput::failed("boom"))
            }
        });

        let err = run_step(&runner, &CommandSpec::new("npm"), BuildError::InstallFailed)
            .await
            .unwrap_err();
        assert_eq!(err, BuildError::InstallFailed("npm: exit code 1: boom".to_string()));

        let err = run_step(
            &runner,
            &CommandSpec::new("npx").arg("slow"),
            BuildError::BundleFailed,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BuildError::BundleFailed(msg) if msg.contains("timed out")));
    }

    #[test]
    fn test_finish_rejects_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            finish(&missing, BuildTarget::Linux),
            Err(BuildError::CompileFailed(_))
        ));

        let empty = dir.path().join("empty");
        std::fs::write(&empty, b"").unwrap();
        assert!(finish(&empty, BuildTarget::Linux).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_finish_marks_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("tool");
        std::fs::write(&bin, b"\x7fELF").unwrap();

        let built = finish(&bin, BuildTarget::Linux).unwrap();
        assert_eq!(built.file_size, 4);
        let mode = std::fs::metadata(&bin).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
