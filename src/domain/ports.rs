use crate::domain::model::{ArtifactRef, DestinationPath};
use crate::utils::error::Result;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Byte stream handed to a sink.
pub type ArchiveReader<'a> = dyn AsyncRead + Unpin + Send + 'a;

/// Upstream store producing artifacts.
#[async_trait]
pub trait Source: Send + Sync {
    /// Short label used in logs and in the default archive filename.
    fn kind(&self) -> &'static str;

    /// Eager connectivity check. Failing here ends the run.
    async fn init(&mut self) -> Result<()>;

    /// Deterministic, finite listing. Failing here ends the run.
    async fn list_artifacts(&self) -> Result<Vec<ArtifactRef>>;

    /// Content of a single artifact. Callers may skip an artifact whose fetch fails.
    async fn fetch(&self, artifact: &ArtifactRef) -> Result<Vec<u8>>;
}

/// Durable destination for the finished archive.
#[async_trait]
pub trait Sink: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn init(&mut self) -> Result<()>;

    /// Persists `reader` at `destination`. Must fail with
    /// `BackupError::AlreadyExists` without writing anything when the
    /// destination is already taken.
    async fn write(
        &self,
        reader: &mut ArchiveReader<'_>,
        destination: &DestinationPath,
    ) -> Result<u64>;
}
