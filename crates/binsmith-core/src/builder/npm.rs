//! npm packages: install, bundle with esbuild, compile with pkg.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use binsmith_schema::{BuildTarget, PackageMetadata, PackageName};
use serde_json::Value;
use tracing::{debug, info};

use super::{ArtifactBuilder, BuildError, BuiltArtifact, finish, make_executable, run_step};
use crate::process::{CommandRunner, CommandSpec};
use crate::workspace::Workspace;

const SHEBANG: &str = "#!/usr/bin/env node\n";
const BUNDLE_FILE: &str = "bundle.js";
const PKG_PACKAGE: &str = "@yao-pkg/pkg";

#[derive(Debug, Clone)]
pub struct NpmBuilder {
    runner: Arc<dyn CommandRunner>,
    npm: String,
    npx: String,
    node_target: String,
    timeout: Duration,
}

impl NpmBuilder {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        npm: impl Into<String>,
        npx: impl Into<String>,
        node_target: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            npm: npm.into(),
            npx: npx.into(),
            node_target: node_target.into(),
            timeout,
        }
    }

    /// `node18-linux-x64` style target triple for pkg.
    fn pkg_target(&self, target: BuildTarget) -> String {
        format!("{}-{}-x64", self.node_target, target.pkg_platform())
    }
}

/// Resolve the executable entry declared in an installed package's `bin`.
///
/// A string `bin` is the entry itself; for an object the first declared
/// command wins.
fn entry_point(package_dir: &Path, name: &PackageName) -> Result<PathBuf, BuildError> {
    let manifest_path = package_dir.join("package.json");
    let text = std::fs::read_to_string(&manifest_path).map_err(|e| {
        BuildError::InstallFailed(format!("{} missing after install: {e}", manifest_path.display()))
    })?;
    let manifest: Value = serde_json::from_str(&text)
        .map_err(|e| BuildError::InstallFailed(format!("unreadable package.json for {name}: {e}")))?;

    let entry = match manifest.get("bin") {
        Some(Value::String(path)) => Some(path.clone()),
        Some(Value::Object(commands)) => commands
            .values()
            .find_map(|v| v.as_str().map(str::to_string)),
        _ => None,
    }
    .filter(|e| !e.trim().is_empty())
    .ok_or_else(|| BuildError::EntryPointMissing(format!("{name} declares no bin")))?;

    let path = package_dir.join(entry.trim_start_matches("./"));
    if !path.is_file() {
        return Err(BuildError::EntryPointMissing(format!(
            "{name} bin {} does not exist",
            path.display()
        )));
    }
    Ok(path)
}

/// Prepend the node shebang unless the bundle already has one.
fn add_shebang(bundle: &Path) -> std::io::Result<()> {
    let body = std::fs::read_to_string(bundle)?;
    if !body.starts_with("#!") {
        std::fs::write(bundle, format!("{SHEBANG}{body}"))?;
    }
    make_executable(bundle)
}

#[async_trait]
impl ArtifactBuilder for NpmBuilder {
    async fn build(
        &self,
        metadata: &PackageMetadata,
        target: BuildTarget,
        workspace: &Workspace,
    ) -> Result<BuiltArtifact, BuildError> {
        let runner = self.runner.as_ref();
        let root = workspace.path();
        let spec = format!("{}@{}", metadata.name, metadata.version);

        // A private manifest keeps npm from walking up into a parent project.
        let manifest = serde_json::json!({
            "name": "binsmith-build",
            "version": "0.0.0",
            "private": true,
        });
        std::fs::write(root.join("package.json"), manifest.to_string())
            .map_err(|e| BuildError::InstallFailed(format!("cannot write package.json: {e}")))?;

        info!("Installing {spec}");
        let install = CommandSpec::new(&self.npm)
            .args(["install", spec.as_str()])
            .args(["--no-save", "--no-package-lock", "--no-audit", "--no-fund"])
            .current_dir(root)
            .timeout(self.timeout);
        run_step(runner, &install, BuildError::InstallFailed).await?;

        let package_dir = root.join("node_modules").join(metadata.name.as_str());
        let entry = entry_point(&package_dir, &metadata.name)?;
        debug!(entry = %entry.display(), "resolved npm entry point");

        info!("Bundling {spec}");
        let bundle = root.join(BUNDLE_FILE);
        let esbuild = CommandSpec::new(&self.npx)
            .args(["--yes", "esbuild"])
            .arg(entry.to_string_lossy())
            .args(["--bundle", "--platform=node"])
            .arg(format!("--target={}", self.node_target))
            .arg(format!("--outfile={}", bundle.display()))
            .current_dir(root)
            .timeout(self.timeout);
        run_step(runner, &esbuild, BuildError::BundleFailed).await?;
        add_shebang(&bundle)
            .map_err(|e| BuildError::BundleFailed(format!("cannot finalize bundle: {e}")))?;

        info!("Compiling {spec} for {target}");
        let out_dir = root.join("out");
        std::fs::create_dir_all(&out_dir)
            .map_err(|e| BuildError::CompileFailed(format!("cannot create output dir: {e}")))?;
        let output = out_dir.join(format!("{}{}", metadata.name.file_stem(), target.exe_suffix()));
        let pkg = CommandSpec::new(&self.npx)
            .args(["--yes", PKG_PACKAGE, BUNDLE_FILE])
            .arg("--targets")
            .arg(self.pkg_target(target))
            .arg("--output")
            .arg(output.to_string_lossy())
            .current_dir(root)
            .timeout(self.timeout);
        run_step(runner, &pkg, BuildError::CompileFailed).await?;

        finish(&output, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::BuildKey;
    use crate::process::testing::ScriptedRunner;
    use crate::process::{CommandOutput, ProcessError};
    use crate::workspace::WorkspaceManager;
    use binsmith_schema::{Ecosystem, Version};
    use tempfile::tempdir;

    fn metadata(name: &str) -> PackageMetadata {
        PackageMetadata {
            name: PackageName::new(name),
            version: Version::new("1.6.0"),
            description: "cow".to_string(),
            keywords: vec![],
        }
    }

    async fn workspace(scratch: &Path) -> Workspace {
        WorkspaceManager::new(scratch)
            .create(&BuildKey {
                name: PackageName::new("cowsay"),
                ecosystem: Ecosystem::Npm,
                version: Version::new("1.6.0"),
                target: BuildTarget::Linux,
            })
            .await
            .unwrap()
    }

    fn builder(runner: Arc<ScriptedRunner>) -> NpmBuilder {
        NpmBuilder::new(runner, "npm", "npx", "node18", Duration::from_secs(30))
    }

    fn flag_value<'a>(cmd: &'a CommandSpec, flag: &str) -> Option<&'a str> {
        let idx = cmd.args.iter().position(|a| a == flag)?;
        cmd.args.get(idx + 1).map(String::as_str)
    }

    /// Simulates npm, esbuild and pkg. `bin` is written verbatim into the
    /// installed package.json.
    fn toolchain(name: &'static str, bin: &'static str) -> ScriptedRunner {
        ScriptedRunner::new(move |cmd| {
            let cwd = cmd.cwd.clone().unwrap();
            if cmd.has_arg("install") {
                let pkg_dir = cwd.join("node_modules").join(name);
                std::fs::create_dir_all(pkg_dir.join("cli")).unwrap();
                std::fs::write(
                    pkg_dir.join("package.json"),
                    format!(r#"{{"name": "{name}", "bin": {bin}}}"#),
                )
                .unwrap();
                std::fs::write(pkg_dir.join("cli/say.js"), "console.log('moo')").unwrap();
                std::fs::write(pkg_dir.join("cli/think.js"), "console.log('hmm')").unwrap();
                return Ok(CommandOutput::ok("added 1 package"));
            }
            if cmd.has_arg("esbuild") {
                let outfile = cmd
                    .args
                    .iter()
                    .find_map(|a| a.strip_prefix("--outfile="))
                    .unwrap();
                std::fs::write(outfile, "console.log('moo')").unwrap();
                return Ok(CommandOutput::ok(""));
            }
            if cmd.has_arg(PKG_PACKAGE) {
                let output = flag_value(cmd, "--output").unwrap();
                std::fs::write(output, b"native-binary").unwrap();
                return Ok(CommandOutput::ok(""));
            }
            Ok(CommandOutput::failed(format!("unexpected command {cmd}")))
        })
    }

    #[tokio::test]
    async fn test_builds_first_declared_bin() {
        let scratch = tempdir().unwrap();
        let ws = workspace(scratch.path()).await;
        let runner = Arc::new(toolchain(
            "cowsay",
            r#"{"cowsay": "./cli/say.js", "cowthink": "./cli/think.js"}"#,
        ));

        let built = builder(runner.clone())
            .build(&metadata("cowsay"), BuildTarget::Linux, &ws)
            .await
            .unwrap();

        assert_eq!(built.path, ws.join("out/cowsay"));
        assert_eq!(built.file_size, 13);

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].has_arg("cowsay@1.6.0"));
        assert!(calls[0].has_arg("--no-save"));
        assert!(calls[1].args.iter().any(|a| a.ends_with("cli/say.js")));
        assert!(calls[1].has_arg("--target=node18"));
        assert_eq!(flag_value(&calls[2], "--targets"), Some("node18-linux-x64"));

        let bundle = std::fs::read_to_string(ws.join(BUNDLE_FILE)).unwrap();
        assert!(bundle.starts_with(SHEBANG));
    }

    #[tokio::test]
    async fn test_string_bin_and_windows_suffix() {
        let scratch = tempdir().unwrap();
        let ws = workspace(scratch.path()).await;
        let runner = Arc::new(toolchain("@scope/tool", r#""cli/say.js""#));

        let built = builder(runner.clone())
            .build(&metadata("@scope/tool"), BuildTarget::Windows, &ws)
            .await
            .unwrap();

        assert_eq!(built.path, ws.join("out/scope-tool.exe"));
        assert_eq!(
            flag_value(&runner.calls()[2], "--targets"),
            Some("node18-win-x64")
        );
    }

    #[tokio::test]
    async fn test_missing_bin_is_entry_point_missing() {
        let scratch = tempdir().unwrap();
        let ws = workspace(scratch.path()).await;
        let runner = Arc::new(toolchain("left-pad", "null"));

        let err = builder(runner.clone())
            .build(&metadata("left-pad"), BuildTarget::Linux, &ws)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::EntryPointMissing(_)));
        // Nothing after install ran.
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_install_failure_carries_stderr() {
        let scratch = tempdir().unwrap();
        let ws = workspace(scratch.path()).await;
        let runner = Arc::new(ScriptedRunner::new(|_| {
            Ok(CommandOutput::failed("npm ERR! 404 Not Found - GET cowsay"))
        }));

        let err = builder(runner)
            .build(&metadata("cowsay"), BuildTarget::Linux, &ws)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::InstallFailed(msg) if msg.contains("404 Not Found")));
    }

    #[tokio::test]
    async fn test_pkg_timeout_is_compile_failure() {
        let scratch = tempdir().unwrap();
        let ws = workspace(scratch.path()).await;
        let inner = toolchain("cowsay", r#""cli/say.js""#);
        let runner = Arc::new(ScriptedRunner::new(move |cmd| {
            if cmd.has_arg(PKG_PACKAGE) {
                return Err(ProcessError::TimedOut {
                    program: cmd.program.clone(),
                    secs: 30,
                });
            }
            futures::executor::block_on(inner.run(cmd))
        }));

        let err = builder(runner)
            .build(&metadata("cowsay"), BuildTarget::Linux, &ws)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::CompileFailed(msg) if msg.contains("timed out")));
        assert!(!ws.join("out/cowsay").exists());
    }

    #[test]
    fn test_existing_shebang_is_kept() {
        let dir = tempdir().unwrap();
        let bundle = dir.path().join(BUNDLE_FILE);
        std::fs::write(&bundle, "#!/usr/bin/env node\nconsole.log(1)").unwrap();
        add_shebang(&bundle).unwrap();
        let body = std::fs::read_to_string(&bundle).unwrap();
        assert_eq!(body.matches("#!").count(), 1);
    }
}
