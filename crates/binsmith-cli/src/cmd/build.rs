//! Build command

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use crossterm::style::Stylize;
use serde::Serialize;

use binsmith_core::{
    BuildOrchestrator, BuildOutcome, NullReporter, Reporter, Settings, TokioCommandRunner,
};
use binsmith_schema::{ArtifactRecord, BuildTarget, Ecosystem, PackageSpec};

use crate::ui::format_size;
use crate::ui::reporter::ConsoleReporter;

/// Parsed arguments for `binsmith build`
#[derive(Debug, Clone)]
pub struct BuildArgs {
    pub packages: Vec<String>,
    pub ecosystem: Ecosystem,
    pub target: BuildTarget,
    pub registry: Option<String>,
    pub timeout: Option<u64>,
    pub json: bool,
}

/// One line of `--json` output
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    request: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact: Option<ArtifactRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Report {
    fn from_result(request: &str, result: &Result<BuildOutcome, String>) -> Self {
        match result {
            Ok(outcome) => Self {
                request: request.to_string(),
                source: Some(outcome.source.as_str()),
                path: Some(outcome.path.display().to_string()),
                artifact: Some(outcome.record.clone()),
                error: None,
            },
            Err(reason) => Self {
                request: request.to_string(),
                source: None,
                path: None,
                artifact: None,
                error: Some(reason.clone()),
            },
        }
    }
}

/// Fold CLI flags into the loaded settings
pub fn apply_overrides(settings: &mut Settings, registry: Option<String>, timeout: Option<u64>) {
    if let Some(registry) = registry {
        settings.npm_registry = registry;
    }
    if let Some(secs) = timeout {
        settings.step_timeout = Duration::from_secs(secs);
    }
}

/// Build every requested package concurrently and print the results
pub async fn build(mut settings: Settings, args: BuildArgs) -> Result<()> {
    let specs = args
        .packages
        .iter()
        .map(|raw| {
            PackageSpec::parse(raw, args.ecosystem)
                .with_context(|| format!("Invalid package reference '{raw}'"))
        })
        .collect::<Result<Vec<_>>>()?;

    apply_overrides(&mut settings, args.registry, args.timeout);

    let reporter: Arc<dyn Reporter> = if args.json {
        Arc::new(NullReporter)
    } else {
        Arc::new(ConsoleReporter::new())
    };
    let orchestrator = BuildOrchestrator::open(
        &settings,
        Arc::new(TokioCommandRunner),
        reporter,
    )
    .context("Failed to open artifact cache")?;

    tracing::debug!(count = specs.len(), target = %args.target, "starting builds");

    let handles: Vec<_> = specs
        .into_iter()
        .map(|spec| {
            let orchestrator = orchestrator.clone();
            let target = args.target;
            tokio::spawn(async move {
                let result = orchestrator
                    .request(&spec, target)
                    .await
                    .map_err(|e| e.to_string());
                (spec, result)
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for joined in futures::future::join_all(handles).await {
        results.push(joined.context("Build task panicked")?);
    }
    orchestrator.cache().shutdown();

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();

    if args.json {
        let reports: Vec<Report> = results
            .iter()
            .map(|(spec, result)| Report::from_result(&spec.to_string(), result))
            .collect();
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_summary(&results);
    }

    if failed > 0 {
        bail!("{failed} of {} builds failed", results.len());
    }
    Ok(())
}

fn print_summary(results: &[(PackageSpec, Result<BuildOutcome, String>)]) {
    println!();
    for (spec, result) in results {
        match result {
            Ok(outcome) => {
                let record = &outcome.record;
                println!(
                    "  {} {} {}  {}  {}",
                    "✓".green(),
                    record.name.as_str().bold(),
                    record.version.as_str().dark_grey(),
                    format_size(record.file_size),
                    format!("{} downloads", record.downloads).dark_grey(),
                );
                println!("    {}", outcome.path.display().to_string().cyan());
            }
            Err(reason) => {
                println!("  {} {} {}", "✗".red(), spec.to_string().bold(), reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_settings() {
        let mut settings = Settings::with_home("/tmp/binsmith-test");
        apply_overrides(
            &mut settings,
            Some("http://localhost:4873".to_string()),
            Some(30),
        );
        assert_eq!(settings.npm_registry, "http://localhost:4873");
        assert_eq!(settings.step_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_absent_overrides_keep_settings() {
        let mut settings = Settings::with_home("/tmp/binsmith-test");
        let before = settings.clone();
        apply_overrides(&mut settings, None, None);
        assert_eq!(settings, before);
    }

    #[test]
    fn test_failed_report_has_only_error() {
        let report = Report::from_result("npm:nope@latest", &Err("not found".to_string()));
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["request"], "npm:nope@latest");
        assert_eq!(value["error"], "not found");
        assert!(value.get("artifact").is_none());
        assert!(value.get("path").is_none());
    }
}
