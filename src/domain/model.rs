use crate::utils::error::{BackupError, Result};
use chrono::{DateTime, Datelike, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ENTRY_EXTENSION: &str = ".json";

/// One artifact announced by a source listing. The bytes are fetched later,
/// one artifact at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: String,
    pub title: Option<String>,
    /// Where the source found it, when that differs from the id (a file name).
    pub origin: Option<String>,
}

impl ArtifactRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            origin: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Name of the tar entry holding this artifact.
    pub fn entry_name(&self) -> String {
        format!("{}{}", self.id, ENTRY_EXTENSION)
    }

    pub fn has_safe_id(&self) -> bool {
        is_safe_identifier(&self.id)
    }
}

/// An identifier must be usable as a single filename component.
pub fn is_safe_identifier(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    pub total: usize,
    pub archived: usize,
    pub failed: usize,
    pub failed_ids: Vec<String>,
}

impl ArchiveSummary {
    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }
}

/// `[prefix/]YYYY/M/D/filename`, computed once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationPath {
    prefix: Vec<String>,
    year: i32,
    month: u32,
    day: u32,
    filename: String,
}

impl DestinationPath {
    pub fn new(
        prefix: Option<&str>,
        year: i32,
        month: u32,
        day: u32,
        filename: impl Into<String>,
    ) -> Result<Self> {
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(BackupError::config(format!(
                "invalid destination date {}-{}-{}",
                year, month, day
            )));
        }
        let filename = filename.into();
        if !is_safe_identifier(&filename) {
            return Err(BackupError::config(format!(
                "invalid archive filename '{}'",
                filename
            )));
        }

        let prefix = prefix
            .unwrap_or_default()
            .split(['/', '\\'])
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .map(str::to_string)
            .collect::<Vec<_>>();
        if prefix.iter().any(|segment| segment == "..") {
            return Err(BackupError::config("output prefix cannot contain '..'"));
        }

        Ok(Self {
            prefix,
            year,
            month,
            day,
            filename,
        })
    }

    /// Renders the filename template at `at` and partitions by its date.
    /// `{kind}` in the template is replaced with the source kind before the
    /// strftime specifiers are expanded.
    pub fn for_run<Tz>(
        prefix: Option<&str>,
        template: &str,
        kind: &str,
        at: &DateTime<Tz>,
    ) -> Result<Self>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        use std::fmt::Write;

        let template = template.replace("{kind}", kind);
        let mut filename = String::new();
        write!(filename, "{}", at.format(&template)).map_err(|_| {
            BackupError::config(format!("invalid filename template '{}'", template))
        })?;

        Self::new(prefix, at.year(), at.month(), at.day(), filename)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// All path segments in order: prefix parts, year, month, day, filename.
    pub fn segments(&self) -> Vec<String> {
        let mut segments = self.prefix.clone();
        segments.push(self.year.to_string());
        segments.push(self.month.to_string());
        segments.push(self.day.to_string());
        segments.push(self.filename.clone());
        segments
    }
}

impl fmt::Display for DestinationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments().join("/"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub destination: String,
    pub summary: ArchiveSummary,
    pub bytes_written: u64,
}
