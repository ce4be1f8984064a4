use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Cannot reach {target}: {reason}")]
    ConnectivityError { target: String, reason: String },

    #[error("Listing artifacts failed: {reason}")]
    ListingError { reason: String },

    #[error("Fetching artifact {id} failed: {reason}")]
    FetchError { id: String, reason: String },

    #[error("Writing archive stream failed: {0}")]
    ArchiveFormatError(#[source] std::io::Error),

    #[error("Destination {path} already exists")]
    AlreadyExists { path: String },

    #[error("Writing to {path} failed: {reason}")]
    SinkWriteError { path: String, reason: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    TomlError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Connectivity,
    Listing,
    Fetch,
    Archive,
    WriteConflict,
    SinkWrite,
    Internal,
}

impl BackupError {
    pub fn config(message: impl Into<String>) -> Self {
        BackupError::ConfigError {
            message: message.into(),
        }
    }

    pub fn connectivity(target: impl Into<String>, reason: impl ToString) -> Self {
        BackupError::ConnectivityError {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn listing(reason: impl ToString) -> Self {
        BackupError::ListingError {
            reason: reason.to_string(),
        }
    }

    pub fn fetch(id: impl Into<String>, reason: impl ToString) -> Self {
        BackupError::FetchError {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn sink_write(path: impl Into<String>, reason: impl ToString) -> Self {
        BackupError::SinkWriteError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BackupError::ConfigError { .. }
            | BackupError::InvalidConfigValueError { .. }
            | BackupError::TomlError(_) => ErrorCategory::Configuration,
            BackupError::ConnectivityError { .. } => ErrorCategory::Connectivity,
            BackupError::ListingError { .. } => ErrorCategory::Listing,
            BackupError::FetchError { .. } => ErrorCategory::Fetch,
            BackupError::ArchiveFormatError(_) => ErrorCategory::Archive,
            BackupError::AlreadyExists { .. } => ErrorCategory::WriteConflict,
            BackupError::SinkWriteError { .. } => ErrorCategory::SinkWrite,
            BackupError::HttpError(_)
            | BackupError::IoError(_)
            | BackupError::SerializationError(_) => ErrorCategory::Internal,
        }
    }

    /// Only a single artifact's fetch may be skipped; everything else ends the run.
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::Fetch
    }

    pub fn exit_code(&self) -> u8 {
        match self.category() {
            ErrorCategory::Configuration => 2,
            _ => 1,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            BackupError::ConfigError { message } => format!("Configuration problem: {}", message),
            BackupError::InvalidConfigValueError { field, reason, .. } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
            BackupError::ConnectivityError { target, .. } => {
                format!("Could not connect to {}", target)
            }
            BackupError::AlreadyExists { path } => {
                format!("An archive already exists at {}, refusing to overwrite it", path)
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the command line flags, the config file and the required environment variables"
            }
            ErrorCategory::Connectivity => {
                "Verify the endpoint is reachable and the credentials and container names are correct"
            }
            ErrorCategory::Listing => "Check that the API token is allowed to search dashboards",
            ErrorCategory::Fetch => "The artifact was skipped; inspect it on the source side",
            ErrorCategory::Archive => "Check available memory and retry the run",
            ErrorCategory::WriteConflict => {
                "Another run already produced this archive; use a different prefix or filename"
            }
            ErrorCategory::SinkWrite => "Check permissions and free space on the storage backend",
            ErrorCategory::Internal => "Re-run with --verbose for more details",
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
