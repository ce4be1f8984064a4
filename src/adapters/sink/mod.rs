pub mod azure;
pub mod local;
#[cfg(feature = "s3")]
pub mod s3;

use crate::config::StorageSettings;
use crate::core::{DestinationPath, Sink};
use crate::domain::ports::ArchiveReader;
use crate::utils::error::Result;
use async_trait::async_trait;

pub use azure::AzureBlobSink;
pub use local::LocalSink;
#[cfg(feature = "s3")]
pub use s3::S3Sink;

/// The closed set of storage backends a run can be configured with.
pub enum StorageBackend {
    Local(LocalSink),
    Azure(AzureBlobSink),
    #[cfg(feature = "s3")]
    S3(S3Sink),
}

impl StorageBackend {
    pub async fn from_settings(settings: StorageSettings) -> Result<Self> {
        match settings {
            StorageSettings::Local(local) => Ok(StorageBackend::Local(LocalSink::new(local))),
            StorageSettings::Azure(azure) => Ok(StorageBackend::Azure(AzureBlobSink::new(azure)?)),
            #[cfg(feature = "s3")]
            StorageSettings::S3(s3) => Ok(StorageBackend::S3(S3Sink::from_settings(s3).await)),
            #[cfg(not(feature = "s3"))]
            StorageSettings::S3(_) => Err(crate::utils::error::BackupError::config(
                "storage type s3 requires building with the 's3' feature",
            )),
        }
    }

    fn inner(&self) -> &dyn Sink {
        match self {
            StorageBackend::Local(sink) => sink,
            StorageBackend::Azure(sink) => sink,
            #[cfg(feature = "s3")]
            StorageBackend::S3(sink) => sink,
        }
    }
}

#[async_trait]
impl Sink for StorageBackend {
    fn kind(&self) -> &'static str {
        self.inner().kind()
    }

    async fn init(&mut self) -> Result<()> {
        match self {
            StorageBackend::Local(sink) => sink.init().await,
            StorageBackend::Azure(sink) => sink.init().await,
            #[cfg(feature = "s3")]
            StorageBackend::S3(sink) => sink.init().await,
        }
    }

    async fn write(
        &self,
        reader: &mut ArchiveReader<'_>,
        destination: &DestinationPath,
    ) -> Result<u64> {
        self.inner().write(reader, destination).await
    }
}
