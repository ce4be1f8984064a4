use crate::config::AzureSettings;
use crate::core::{DestinationPath, Sink};
use crate::domain::ports::ArchiveReader;
use crate::utils::error::{BackupError, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use sha2::Sha256;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use url::Url;

const API_VERSION: &str = "2021-08-06";
const ARCHIVE_CONTENT_TYPE: &str = "application/gzip";

type HmacSha256 = Hmac<Sha256>;

/// The parts of a Blob service request covered by a Shared Key signature.
#[derive(Debug)]
struct SignedRequest<'a> {
    method: &'a Method,
    url: &'a Url,
    content_length: usize,
    content_type: Option<&'a str>,
    if_none_match: Option<&'a str>,
    ms_headers: Vec<(&'static str, String)>,
}

impl SignedRequest<'_> {
    fn string_to_sign(&self, account: &str) -> String {
        // Content-Length is signed as empty when zero (versions 2015-02-21 and later)
        let content_length = if self.content_length > 0 {
            self.content_length.to_string()
        } else {
            String::new()
        };

        let fields = [
            self.method.as_str(),
            "", // Content-Encoding
            "", // Content-Language
            content_length.as_str(),
            "", // Content-MD5
            self.content_type.unwrap_or_default(),
            "", // Date, x-ms-date is used instead
            "", // If-Modified-Since
            "", // If-Match
            self.if_none_match.unwrap_or_default(),
            "", // If-Unmodified-Since
            "", // Range
        ];

        let mut ms_headers = self.ms_headers.clone();
        ms_headers.sort_by(|a, b| a.0.cmp(b.0));
        let canonical_headers: String = ms_headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name.to_ascii_lowercase(), value.trim()))
            .collect();

        let mut canonical_resource = format!("/{}{}", account, self.url.path());
        let mut params: Vec<(String, String)> = self
            .url
            .query_pairs()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.into_owned()))
            .collect();
        params.sort();
        for (name, value) in params {
            canonical_resource.push_str(&format!("\n{}:{}", name, value));
        }

        format!(
            "{}\n{}{}",
            fields.join("\n"),
            canonical_headers,
            canonical_resource
        )
    }
}

/// Azure Blob Storage over its REST API, authorized with the account's
/// Shared Key. Blob "directories" are implied by `/` in the blob name.
pub struct AzureBlobSink {
    client: Client,
    account: String,
    container: String,
    key: Vec<u8>,
    endpoint: Url,
}

impl AzureBlobSink {
    pub fn new(settings: AzureSettings) -> Result<Self> {
        let key = STANDARD.decode(settings.access_key.trim()).map_err(|_| {
            BackupError::InvalidConfigValueError {
                field: "AZURE_STORAGE_KEY".to_string(),
                value: String::new(),
                reason: "Access key must be base64 encoded".to_string(),
            }
        })?;

        let endpoint = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}.blob.core.windows.net", settings.account));
        let endpoint = Url::parse(&endpoint).map_err(|e| BackupError::InvalidConfigValueError {
            field: "AZURE_STORAGE_ENDPOINT".to_string(),
            value: endpoint.clone(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            account: settings.account,
            container: settings.container,
            key,
            endpoint,
        })
    }

    fn container_url(&self) -> Result<Url> {
        let mut url = self.url_with_segments(std::iter::empty())?;
        url.set_query(Some("restype=container"));
        Ok(url)
    }

    fn blob_url(&self, destination: &DestinationPath) -> Result<Url> {
        self.url_with_segments(destination.segments().into_iter())
    }

    fn url_with_segments(&self, blob_segments: impl Iterator<Item = String>) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| BackupError::config("AZURE_STORAGE_ENDPOINT cannot be a base URL"))?
            .pop_if_empty()
            .push(&self.container)
            .extend(blob_segments);
        Ok(url)
    }

    fn authorization(&self, request: &SignedRequest<'_>) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| BackupError::config(format!("invalid storage key: {}", e)))?;
        mac.update(request.string_to_sign(&self.account).as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        Ok(format!("SharedKey {}:{}", self.account, signature))
    }

    fn ms_headers(extra: &[(&'static str, &str)]) -> Vec<(&'static str, String)> {
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        let mut headers = vec![("x-ms-date", date), ("x-ms-version", API_VERSION.to_string())];
        headers.extend(extra.iter().map(|(k, v)| (*k, v.to_string())));
        headers
    }

    async fn head(&self, url: &Url) -> Result<StatusCode> {
        let request = SignedRequest {
            method: &Method::HEAD,
            url,
            content_length: 0,
            content_type: None,
            if_none_match: None,
            ms_headers: Self::ms_headers(&[]),
        };

        let mut builder = self
            .client
            .head(url.clone())
            .header("Authorization", self.authorization(&request)?);
        for (name, value) in &request.ms_headers {
            builder = builder.header(*name, value);
        }
        Ok(builder.send().await?.status())
    }
}

#[async_trait]
impl Sink for AzureBlobSink {
    fn kind(&self) -> &'static str {
        "azure"
    }

    /// Fails unless the configured container exists and answers.
    async fn init(&mut self) -> Result<()> {
        let target = format!("container {}", self.container);
        tracing::debug!(account = %self.account, "connecting to container {}", self.container);

        let url = self.container_url()?;
        let status = self
            .head(&url)
            .await
            .map_err(|e| BackupError::connectivity(&target, e))?;

        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(BackupError::connectivity(target, "container not found")),
            s => Err(BackupError::connectivity(
                target,
                format!("looking up container got status {}", s.as_u16()),
            )),
        }
    }

    async fn write(
        &self,
        reader: &mut ArchiveReader<'_>,
        destination: &DestinationPath,
    ) -> Result<u64> {
        let blob = destination.to_string();
        let url = self.blob_url(destination)?;

        // verify blob does not exist
        tracing::debug!("preparing to write to new blob {}", blob);
        let status = self
            .head(&url)
            .await
            .map_err(|e| BackupError::sink_write(&blob, format!("checking blob: {}", e)))?;
        match status {
            s if s.is_success() => return Err(BackupError::AlreadyExists { path: blob }),
            StatusCode::NOT_FOUND => {}
            s => {
                return Err(BackupError::sink_write(
                    &blob,
                    format!("checking blob got status {}", s.as_u16()),
                ))
            }
        }

        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .await
            .map_err(|e| BackupError::sink_write(&blob, e))?;
        let length = body.len();

        let request = SignedRequest {
            method: &Method::PUT,
            url: &url,
            content_length: length,
            content_type: Some(ARCHIVE_CONTENT_TYPE),
            if_none_match: Some("*"),
            ms_headers: Self::ms_headers(&[("x-ms-blob-type", "BlockBlob")]),
        };
        let authorization = self.authorization(&request)?;

        let mut builder = self
            .client
            .put(url.clone())
            .header("Authorization", authorization)
            .header("Content-Type", ARCHIVE_CONTENT_TYPE)
            .header("If-None-Match", "*");
        for (name, value) in &request.ms_headers {
            builder = builder.header(*name, value);
        }

        // one Put Blob call, the service commits it atomically
        tracing::debug!("writing {} bytes to new blob {}", length, blob);
        let response = builder
            .body(body)
            .send()
            .await
            .map_err(|e| BackupError::sink_write(&blob, e))?;

        match response.status() {
            s if s.is_success() => {
                tracing::debug!("successfully wrote to new blob {}", blob);
                Ok(length as u64)
            }
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                Err(BackupError::AlreadyExists { path: blob })
            }
            s => {
                let detail = response.text().await.unwrap_or_default();
                Err(BackupError::sink_write(
                    &blob,
                    format!("got status {}: {}", s.as_u16(), detail.trim()),
                ))
            }
        }
    }
}
