//! Line-oriented progress output for `binsmith build`
//!
//! Builds for several packages run concurrently, so each event is a single
//! self-contained line on stderr rather than a redrawn frame.

use std::io::Write;
use std::sync::Mutex;
use std::time::Instant;

use crossterm::style::Stylize;

use binsmith_core::{BuildKey, Reporter};
use binsmith_schema::{ArtifactRecord, PackageMetadata};

use super::format_size;

#[derive(Debug)]
pub struct ConsoleReporter {
    started: Instant,
    out: Mutex<std::io::Stderr>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            out: Mutex::new(std::io::stderr()),
        }
    }

    fn line(&self, tag: String, key: &BuildKey, detail: &str) {
        let elapsed = format!("{:>6.1}s", self.started.elapsed().as_secs_f64());
        let mut out = self
            .out
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let _ = writeln!(
            out,
            "{} {} {} {}",
            elapsed.dark_grey(),
            tag,
            key.to_string().bold(),
            detail
        );
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn resolving(&self, key: &BuildKey) {
        self.line(format!("{:<9}", "resolve").cyan().to_string(), key, "");
    }

    fn building(&self, key: &BuildKey, metadata: &PackageMetadata) {
        let detail = format!("version {}", metadata.version).dark_grey().to_string();
        self.line(format!("{:<9}", "build").yellow().to_string(), key, &detail);
    }

    fn cached(&self, key: &BuildKey, record: &ArtifactRecord) {
        let detail = format!("{} ({})", record.file_name, format_size(record.file_size))
            .dark_grey()
            .to_string();
        self.line(format!("{:<9}", "cached").green().to_string(), key, &detail);
    }

    fn committed(&self, key: &BuildKey, record: &ArtifactRecord) {
        let detail = format!("{} ({})", record.file_name, format_size(record.file_size))
            .dark_grey()
            .to_string();
        self.line(format!("{:<9}", "done").green().to_string(), key, &detail);
    }

    fn failed(&self, key: &BuildKey, reason: &str) {
        self.line(format!("{:<9}", "failed").red().to_string(), key, reason);
    }
}
