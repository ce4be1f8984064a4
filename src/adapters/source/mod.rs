pub mod file;
pub mod grafana;

use crate::config::SourceSettings;
use crate::core::{ArtifactRef, Source};
use crate::utils::error::Result;
use async_trait::async_trait;

pub use file::FileSource;
pub use grafana::{GrafanaClient, GrafanaSource, SearchResult};

/// The closed set of sources a run can be configured with.
pub enum DataSource {
    File(FileSource),
    Grafana(GrafanaSource),
}

impl DataSource {
    pub fn from_settings(settings: SourceSettings) -> Self {
        match settings {
            SourceSettings::File(file) => DataSource::File(FileSource::new(file)),
            SourceSettings::Grafana(grafana) => DataSource::Grafana(GrafanaSource::new(grafana)),
        }
    }

    fn inner(&self) -> &dyn Source {
        match self {
            DataSource::File(source) => source,
            DataSource::Grafana(source) => source,
        }
    }
}

#[async_trait]
impl Source for DataSource {
    fn kind(&self) -> &'static str {
        self.inner().kind()
    }

    async fn init(&mut self) -> Result<()> {
        match self {
            DataSource::File(source) => source.init().await,
            DataSource::Grafana(source) => source.init().await,
        }
    }

    async fn list_artifacts(&self) -> Result<Vec<ArtifactRef>> {
        self.inner().list_artifacts().await
    }

    async fn fetch(&self, artifact: &ArtifactRef) -> Result<Vec<u8>> {
        self.inner().fetch(artifact).await
    }
}
