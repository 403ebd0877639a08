pub mod builder;
pub mod cache;
pub mod config;
pub mod orchestrator;
pub mod paths;
pub mod process;
pub mod reporter;
pub mod resolver;
pub mod store;
pub mod workspace;

pub use config::Settings;
pub use orchestrator::{
    BuildKey, BuildOrchestrator, BuildOutcome, OrchestratorError, Source, Toolchain, Toolchains,
};
pub use paths::*;
pub use process::{CommandRunner, TokioCommandRunner};
pub use reporter::{NullReporter, Reporter};
