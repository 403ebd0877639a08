//! binsmith - standalone executables for registry packages
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Turns an npm or PyPI package reference into a single native executable
//! for Windows, macOS or Linux, and caches the result so the same
//! package/version/OS is built once.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.binsmith/
//! ├── artifacts/   # Finished executables
//! ├── scratch/     # Build workspaces (removed after each build)
//! ├── cache.db     # SQLite artifact records
//! └── config.toml  # Optional settings
//! ```

pub mod cmd;
pub mod ui;

use std::path::PathBuf;

use binsmith_schema::{BuildTarget, Ecosystem};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "binsmith")]
#[command(author, version, about = "Build and cache standalone executables for npm and PyPI packages")]
pub struct Cli {
    /// State directory (cache, artifacts, scratch)
    #[arg(long, global = true, env = "BINSMITH_HOME")]
    pub home: Option<PathBuf>,

    /// Show debug logs
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build (or fetch from cache) executables for one or more packages
    Build {
        /// Package reference(s): name, name@version, @scope/name@version, name==version
        #[arg(required = true)]
        packages: Vec<String>,
        /// Package registry
        #[arg(short, long, default_value = "npm")]
        ecosystem: Ecosystem,
        /// Operating system to build for
        #[arg(long = "os", default_value_t = BuildTarget::current())]
        target: BuildTarget,
        /// Override the npm registry URL
        #[arg(long)]
        registry: Option<String>,
        /// Per-step toolchain timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// List cached artifacts, most downloaded first
    List {
        /// Page number (1-based)
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Rows per page
        #[arg(long, default_value_t = 20)]
        per_page: u32,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one artifact record as JSON
    Show {
        /// Artifact id
        id: i64,
    },
    /// Remove leftover build workspaces and interrupted publishes
    ///
    /// Do not run while a build is in progress.
    Clean {
        /// Only list what would be removed
        #[arg(long)]
        dry_run: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}
