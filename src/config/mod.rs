#[cfg(feature = "cli")]
pub mod cli;
pub mod file;

use crate::core::engine::{RunOptions, DEFAULT_FILENAME_TEMPLATE};
use crate::utils::error::{BackupError, Result};
use crate::utils::validation::*;
use file::FileConfig;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_GRAFANA_TIMEOUT_SECONDS: u64 = 5;
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum DataSourceKind {
    File,
    Grafana,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum StorageKind {
    Local,
    Azure,
    S3,
}

#[derive(Clone)]
pub struct GrafanaSettings {
    pub url: String,
    pub token: String,
    pub timeout_seconds: u64,
}

impl fmt::Debug for GrafanaSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrafanaSettings")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl Validate for GrafanaSettings {
    fn validate(&self) -> Result<()> {
        validate_url("GRAFANA_URL", &self.url)?;
        validate_non_empty_string("GRAFANA_TOKEN", &self.token)?;
        validate_range("GRAFANA_TIMEOUT_SECONDS", self.timeout_seconds, 1, 300)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FileSourceSettings {
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LocalSettings {
    pub root: PathBuf,
}

#[derive(Clone)]
pub struct AzureSettings {
    pub account: String,
    pub container: String,
    pub access_key: String,
    pub endpoint: Option<String>,
}

impl fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureSettings")
            .field("account", &self.account)
            .field("container", &self.container)
            .field("access_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Validate for AzureSettings {
    fn validate(&self) -> Result<()> {
        use base64::Engine;

        validate_non_empty_string("AZURE_STORAGE_ACCOUNT", &self.account)?;
        validate_azure_container_name("AZURE_STORAGE_CONTAINER", &self.container)?;
        validate_non_empty_string("AZURE_STORAGE_KEY", &self.access_key)?;
        if base64::engine::general_purpose::STANDARD
            .decode(self.access_key.trim())
            .is_err()
        {
            return Err(BackupError::InvalidConfigValueError {
                field: "AZURE_STORAGE_KEY".to_string(),
                value: String::new(),
                reason: "Access key must be base64 encoded".to_string(),
            });
        }
        if let Some(endpoint) = &self.endpoint {
            validate_url("AZURE_STORAGE_ENDPOINT", endpoint)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

impl Validate for S3Settings {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("S3_BUCKET", &self.bucket)?;
        if let Some(endpoint) = &self.endpoint {
            validate_url("S3_ENDPOINT", endpoint)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum SourceSettings {
    File(FileSourceSettings),
    Grafana(GrafanaSettings),
}

#[derive(Debug, Clone)]
pub enum StorageSettings {
    Local(LocalSettings),
    Azure(AzureSettings),
    S3(S3Settings),
}

/// Output naming taken from the command line; overrides the `[output]` section.
#[derive(Debug, Clone, Default)]
pub struct OutputOverrides {
    pub prefix: Option<String>,
    pub filename: Option<String>,
}

/// Everything a run needs, resolved once at startup and handed to the
/// components that need it.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source: SourceSettings,
    pub storage: StorageSettings,
    pub run: RunOptions,
}

impl Settings {
    /// Resolves settings from the process environment and an optional config file.
    pub fn load(
        source: DataSourceKind,
        storage: StorageKind,
        output: OutputOverrides,
        config_file: Option<&std::path::Path>,
    ) -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let file = match config_file {
            Some(path) => FileConfig::from_file(path, env)?,
            None => FileConfig::default(),
        };
        Self::resolve(source, storage, output, file, env)
    }

    /// Environment values win over the config file. Only the settings of the
    /// selected source and storage are required.
    pub fn resolve(
        source: DataSourceKind,
        storage: StorageKind,
        output: OutputOverrides,
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let lookup = |key: &str, fallback: Option<String>| {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .or(fallback.filter(|v| !v.trim().is_empty()))
        };

        let source = match source {
            DataSourceKind::Grafana => {
                let section = file.grafana.unwrap_or_default();
                let timeout_seconds = match env("GRAFANA_TIMEOUT_SECONDS") {
                    Some(raw) => raw.trim().parse().map_err(|_| BackupError::InvalidConfigValueError {
                        field: "GRAFANA_TIMEOUT_SECONDS".to_string(),
                        value: raw.clone(),
                        reason: "Value must be a whole number of seconds".to_string(),
                    })?,
                    None => section
                        .timeout_seconds
                        .unwrap_or(DEFAULT_GRAFANA_TIMEOUT_SECONDS),
                };
                let settings = GrafanaSettings {
                    url: required(lookup("GRAFANA_URL", section.url), "GRAFANA_URL", "grafana.url")?,
                    token: required(
                        lookup("GRAFANA_TOKEN", section.token),
                        "GRAFANA_TOKEN",
                        "grafana.token",
                    )?,
                    timeout_seconds,
                };
                settings.validate()?;
                SourceSettings::Grafana(settings)
            }
            DataSourceKind::File => {
                let section = file.file.unwrap_or_default();
                let dir = required(
                    lookup("FILE_SOURCE_DIR", section.dir),
                    "FILE_SOURCE_DIR",
                    "file.dir",
                )?;
                validate_path("FILE_SOURCE_DIR", &dir)?;
                SourceSettings::File(FileSourceSettings { dir: dir.into() })
            }
        };

        let storage = match storage {
            StorageKind::Local => {
                let section = file.local.unwrap_or_default();
                let root = lookup("LOCAL_STORAGE_ROOT", section.root).unwrap_or_else(|| ".".to_string());
                validate_path("LOCAL_STORAGE_ROOT", &root)?;
                StorageSettings::Local(LocalSettings { root: root.into() })
            }
            StorageKind::Azure => {
                let section = file.azure.unwrap_or_default();
                let settings = AzureSettings {
                    account: required(
                        lookup("AZURE_STORAGE_ACCOUNT", section.account),
                        "AZURE_STORAGE_ACCOUNT",
                        "azure.account",
                    )?,
                    container: required(
                        lookup("AZURE_STORAGE_CONTAINER", section.container),
                        "AZURE_STORAGE_CONTAINER",
                        "azure.container",
                    )?,
                    access_key: required(
                        lookup("AZURE_STORAGE_KEY", section.access_key),
                        "AZURE_STORAGE_KEY",
                        "azure.access_key",
                    )?,
                    endpoint: lookup("AZURE_STORAGE_ENDPOINT", section.endpoint),
                };
                settings.validate()?;
                StorageSettings::Azure(settings)
            }
            StorageKind::S3 => {
                let section = file.s3.unwrap_or_default();
                let settings = S3Settings {
                    bucket: required(lookup("S3_BUCKET", section.bucket), "S3_BUCKET", "s3.bucket")?,
                    region: lookup("S3_REGION", section.region),
                    endpoint: lookup("S3_ENDPOINT", section.endpoint),
                };
                settings.validate()?;
                StorageSettings::S3(settings)
            }
        };

        let section = file.output.unwrap_or_default();
        let run = RunOptions {
            prefix: output.prefix.or(section.prefix).filter(|p| !p.trim().is_empty()),
            filename_template: output
                .filename
                .or(section.filename)
                .unwrap_or_else(|| DEFAULT_FILENAME_TEMPLATE.to_string()),
            compression_level: section
                .compression_level
                .unwrap_or(DEFAULT_COMPRESSION_LEVEL),
        };
        run.validate()?;

        Ok(Self {
            source,
            storage,
            run,
        })
    }
}

impl Validate for RunOptions {
    fn validate(&self) -> Result<()> {
        validate_filename_template("output.filename", &self.filename_template)?;
        validate_range("output.compression_level", self.compression_level, 0, 9)?;
        if let Some(prefix) = &self.prefix {
            validate_path("output.prefix", prefix)?;
            if prefix.split(['/', '\\']).any(|segment| segment == "..") {
                return Err(BackupError::InvalidConfigValueError {
                    field: "output.prefix".to_string(),
                    value: prefix.clone(),
                    reason: "Prefix cannot contain '..' segments".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn required(value: Option<String>, env_key: &str, file_key: &str) -> Result<String> {
    value.ok_or_else(|| {
        BackupError::config(format!(
            "{} is required (set the environment variable or '{}' in the config file)",
            env_key, file_key
        ))
    })
}
