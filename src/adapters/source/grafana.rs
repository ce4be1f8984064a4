use crate::config::GrafanaSettings;
use crate::core::{ArtifactRef, Source};
use crate::utils::error::{BackupError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// One entry of `GET /api/search?type=dash-db`, e.g.
/// `{"id": 8, "uid": "sd", "title": "Some dashboard", "uri": "db/some-dashboard", "url": "/d/sd/some-dashboard"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub id: i64,
    pub uid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub url: String,
}

/// Minimal Grafana HTTP API client. Every call except the health probe sends
/// the bearer token; any status >= 400 is an error.
#[derive(Clone)]
pub struct GrafanaClient {
    client: Client,
    base_url: Url,
    token: String,
}

impl GrafanaClient {
    pub fn new(settings: &GrafanaSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;

        let base_url = Url::parse(&settings.url).map_err(|e| BackupError::InvalidConfigValueError {
            field: "GRAFANA_URL".to_string(),
            value: settings.url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(BackupError::config("GRAFANA_URL cannot be a base URL"));
        }

        Ok(Self {
            client,
            base_url,
            token: settings.token.clone(),
        })
    }

    /// Appends percent-encoded path segments to the base URL, keeping any
    /// sub-path Grafana is served under.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn dashboard_url(&self, uid: &str) -> Url {
        self.endpoint(&["api", "dashboards", "uid", uid])
    }

    /// Verifies the server answers. Says nothing about the token.
    pub async fn ping(&self) -> Result<()> {
        let uri = self.endpoint(&["api", "health"]);
        tracing::debug!("testing connection to Grafana at {}", uri);

        let response = self
            .client
            .get(uri.clone())
            .send()
            .await
            .map_err(|e| BackupError::connectivity(uri.as_str(), e))?;
        if response.status().as_u16() > 399 {
            return Err(BackupError::connectivity(
                uri.as_str(),
                format!("got status {}", response.status().as_u16()),
            ));
        }
        Ok(())
    }

    pub async fn search_dashboards(&self) -> Result<Vec<SearchResult>> {
        tracing::debug!("searching dashboards");
        let mut uri = self.endpoint(&["api", "search"]);
        uri.query_pairs_mut().append_pair("type", "dash-db");
        let response = self
            .get_with_auth(uri)
            .await
            .map_err(BackupError::listing)?;

        response
            .json::<Vec<SearchResult>>()
            .await
            .map_err(|e| BackupError::listing(format!("decoding search response: {}", e)))
    }

    /// Raw JSON of one dashboard, byte for byte as Grafana returned it.
    pub async fn get_dashboard(&self, uid: &str) -> Result<Vec<u8>> {
        tracing::debug!(uid, "getting dashboard");
        let response = self
            .get_with_auth(self.dashboard_url(uid))
            .await
            .map_err(|e| BackupError::fetch(uid, e))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackupError::fetch(uid, format!("reading response: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn get_with_auth(&self, uri: Url) -> std::result::Result<Response, String> {
        let response = self
            .client
            .get(uri.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| format!("requesting {}: {}", uri, e))?;

        let status = response.status().as_u16();
        if status > 399 {
            return Err(format!("requesting {}: got status code {}", uri, status));
        }
        Ok(response)
    }
}

/// Grafana dashboards as artifacts, identified by uid.
pub struct GrafanaSource {
    settings: GrafanaSettings,
    client: Option<GrafanaClient>,
}

impl GrafanaSource {
    pub fn new(settings: GrafanaSettings) -> Self {
        Self {
            settings,
            client: None,
        }
    }

    fn client(&self) -> Result<&GrafanaClient> {
        self.client
            .as_ref()
            .ok_or_else(|| BackupError::config("Grafana source used before init"))
    }
}

#[async_trait]
impl Source for GrafanaSource {
    fn kind(&self) -> &'static str {
        "dashboards"
    }

    async fn init(&mut self) -> Result<()> {
        tracing::debug!(url = %self.settings.url, "creating Grafana client");
        let client = GrafanaClient::new(&self.settings)?;
        client.ping().await?;
        self.client = Some(client);
        Ok(())
    }

    async fn list_artifacts(&self) -> Result<Vec<ArtifactRef>> {
        let dashboards = self.client()?.search_dashboards().await?;
        Ok(dashboards
            .into_iter()
            .map(|dash| ArtifactRef::new(dash.uid).with_title(dash.title))
            .collect())
    }

    async fn fetch(&self, artifact: &ArtifactRef) -> Result<Vec<u8>> {
        self.client()?.get_dashboard(&artifact.id).await
    }
}
