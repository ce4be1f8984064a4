pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliConfig;

pub use adapters::{DataSource, StorageBackend};
pub use config::Settings;
pub use core::{archive::ArchiveBuilder, engine::{BackupEngine, RunOptions}};
pub use domain::model::{ArchiveSummary, ArtifactRef, DestinationPath, RunReport};
pub use utils::error::{BackupError, Result};
