pub mod archive;
pub mod engine;

pub use crate::domain::model::{ArchiveSummary, ArtifactRef, DestinationPath, RunReport};
pub use crate::domain::ports::{Sink, Source};
pub use crate::utils::error::Result;
