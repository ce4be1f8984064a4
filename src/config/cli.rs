use crate::config::{DataSourceKind, OutputOverrides, StorageKind};
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "backup-tool")]
#[command(about = "Archives Grafana dashboards or local files into a dated tar.gz backup")]
pub struct CliConfig {
    #[arg(long = "storage.type", value_enum, help = "Destination storage service")]
    pub storage_type: StorageKind,

    #[arg(long = "datasource", value_enum, help = "Where the artifacts come from")]
    pub datasource: DataSourceKind,

    #[arg(long = "output.prefix", help = "Path prefix placed before YYYY/M/D")]
    pub output_prefix: Option<String>,

    #[arg(
        long = "output.filename",
        help = "Archive filename, strftime specifiers and {kind} are expanded"
    )]
    pub output_filename: Option<String>,

    #[arg(long, help = "TOML config file; environment variables take precedence")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long = "log-json", help = "Emit logs as JSON lines")]
    pub log_json: bool,
}

impl CliConfig {
    /// Parses the process arguments, accepting Go-style single-dash long flags.
    pub fn parse_args() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    pub fn output_overrides(&self) -> OutputOverrides {
        OutputOverrides {
            prefix: self.output_prefix.clone(),
            filename: self.output_filename.clone(),
        }
    }
}

const LONG_FLAGS: [&str; 7] = [
    "storage.type",
    "datasource",
    "output.prefix",
    "output.filename",
    "config",
    "verbose",
    "log-json",
];

/// Rewrites `-storage.type` (and `-storage.type=local`) into the `--` form
/// clap expects, so existing cron entries keep working.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .enumerate()
        .map(|(index, arg)| {
            if index == 0 {
                return arg;
            }
            let Some(text) = arg.to_str() else {
                return arg;
            };
            match text.strip_prefix('-') {
                Some(rest) if !rest.starts_with('-') => {
                    let name = rest.split('=').next().unwrap_or_default();
                    if LONG_FLAGS.contains(&name) {
                        OsString::from(format!("-{}", text))
                    } else {
                        arg
                    }
                }
                _ => arg,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_go_style_flags() {
        let args = normalize_args([
            "backup-tool",
            "-storage.type",
            "azure",
            "-datasource=grafana",
            "-output.prefix",
            "prod",
        ]);
        let config = CliConfig::try_parse_from(args).unwrap();

        assert_eq!(config.storage_type, StorageKind::Azure);
        assert_eq!(config.datasource, DataSourceKind::Grafana);
        assert_eq!(config.output_prefix.as_deref(), Some("prod"));
        assert!(!config.verbose);
    }

    #[test]
    fn test_parse_double_dash_flags() {
        let config = CliConfig::try_parse_from([
            "backup-tool",
            "--storage.type",
            "local",
            "--datasource",
            "file",
            "--verbose",
        ])
        .unwrap();

        assert_eq!(config.storage_type, StorageKind::Local);
        assert_eq!(config.datasource, DataSourceKind::File);
        assert!(config.verbose);
        assert!(config.output_overrides().prefix.is_none());
    }

    #[test]
    fn test_invalid_storage_type_is_rejected() {
        let args = normalize_args(["backup-tool", "-storage.type", "ftp", "-datasource", "file"]);
        assert!(CliConfig::try_parse_from(args).is_err());
    }

    #[test]
    fn test_missing_selection_is_rejected() {
        assert!(CliConfig::try_parse_from(["backup-tool", "--datasource", "file"]).is_err());
    }

    #[test]
    fn test_short_and_unknown_flags_are_left_alone() {
        let args = normalize_args(["backup-tool", "-v", "-x.y", "--config", "a.toml"]);
        let args: Vec<String> = args.into_iter().map(|a| a.into_string().unwrap()).collect();
        assert_eq!(args, vec!["backup-tool", "-v", "-x.y", "--config", "a.toml"]);
    }
}
