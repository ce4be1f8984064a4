use crate::utils::error::{BackupError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Optional TOML config file. Every value can also come from the environment,
/// which takes precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub grafana: Option<GrafanaSection>,
    pub file: Option<FileSourceSection>,
    pub local: Option<LocalSection>,
    pub azure: Option<AzureSection>,
    pub s3: Option<S3Section>,
    pub output: Option<OutputSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrafanaSection {
    pub url: Option<String>,
    pub token: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSourceSection {
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalSection {
    pub root: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AzureSection {
    pub account: Option<String>,
    pub container: Option<String>,
    pub access_key: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3Section {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    pub prefix: Option<String>,
    pub filename: Option<String>,
    pub compression_level: Option<u32>,
}

impl FileConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BackupError::config(format!("reading config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content, env)
    }

    /// `${VAR}` references are replaced through `env` before parsing, so secrets
    /// can stay out of the file.
    pub fn from_toml_str(content: &str, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let processed = substitute_env_vars(content, env);
        Ok(toml::from_str(&processed)?)
    }
}

fn substitute_env_vars(content: &str, env: impl Fn(&str) -> Option<String>) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex is valid");

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        // 找不到就保留原樣
        env(var_name).unwrap_or_else(|| format!("${{{}}}", var_name))
    })
    .into_owned()
}
