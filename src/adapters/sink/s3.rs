use crate::config::S3Settings;
use crate::core::{DestinationPath, Sink};
use crate::domain::ports::ArchiveReader;
use crate::utils::error::{BackupError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tokio::io::AsyncReadExt;

/// S3 (or S3-compatible) bucket; the destination path is the object key.
#[derive(Debug, Clone)]
pub struct S3Sink {
    client: S3Client,
    bucket: String,
}

impl S3Sink {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Builds a client from the default AWS credential chain.
    pub async fn from_settings(settings: S3Settings) -> Self {
        let shared = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(region) = settings.region {
            builder = builder.region(Region::new(region));
        }
        if let Some(endpoint) = settings.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self::new(S3Client::from_conf(builder.build()), settings.bucket)
    }
}

#[async_trait]
impl Sink for S3Sink {
    fn kind(&self) -> &'static str {
        "s3"
    }

    async fn init(&mut self) -> Result<()> {
        let target = format!("bucket {}", self.bucket);
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| BackupError::connectivity(target, aws_sdk_s3::error::DisplayErrorContext(e)))?;
        Ok(())
    }

    async fn write(
        &self,
        reader: &mut ArchiveReader<'_>,
        destination: &DestinationPath,
    ) -> Result<u64> {
        let key = destination.to_string();

        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => return Err(BackupError::AlreadyExists { path: key }),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {}
            Err(err) => {
                return Err(BackupError::sink_write(
                    &key,
                    format!("checking object: {}", aws_sdk_s3::error::DisplayErrorContext(err)),
                ))
            }
        }

        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .await
            .map_err(|e| BackupError::sink_write(&key, e))?;
        let length = body.len() as u64;

        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .if_none_match("*")
            .content_type("application/gzip")
            .body(ByteStream::from(body))
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::debug!(bucket = %self.bucket, key = %key, "object written");
                Ok(length)
            }
            Err(err) => {
                let raw_status = err.raw_response().map(|r| r.status().as_u16());
                if matches!(raw_status, Some(409) | Some(412)) {
                    return Err(BackupError::AlreadyExists { path: key });
                }
                Err(BackupError::sink_write(
                    &key,
                    aws_sdk_s3::error::DisplayErrorContext(err),
                ))
            }
        }
    }
}
