use crate::core::archive::ArchiveBuilder;
use crate::core::{DestinationPath, RunReport, Sink, Source};
use crate::utils::error::Result;
use chrono::{DateTime, Local};
use std::io::Cursor;

pub const DEFAULT_FILENAME_TEMPLATE: &str = "{kind}-%H%M.tgz";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub prefix: Option<String>,
    pub filename_template: String,
    pub compression_level: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            filename_template: DEFAULT_FILENAME_TEMPLATE.to_string(),
            compression_level: 6,
        }
    }
}

type Clock = Box<dyn Fn() -> DateTime<Local> + Send + Sync>;

/// Drives one backup run: init source, init sink, build the archive,
/// compute the destination, write. Every error except a single artifact's
/// fetch ends the run.
pub struct BackupEngine<S: Source, K: Sink> {
    source: S,
    sink: K,
    options: RunOptions,
    clock: Clock,
}

impl<S: Source, K: Sink> BackupEngine<S, K> {
    pub fn new(source: S, sink: K, options: RunOptions) -> Self {
        Self {
            source,
            sink,
            options,
            clock: Box::new(Local::now),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Local> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub async fn run(&mut self) -> Result<RunReport> {
        let started_at = (self.clock)();
        tracing::info!(
            source = self.source.kind(),
            sink = self.sink.kind(),
            "starting backup run"
        );

        tracing::debug!("initializing {} source", self.source.kind());
        self.source.init().await?;

        tracing::debug!("initializing {} storage", self.sink.kind());
        self.sink.init().await?;

        let archive = ArchiveBuilder::new()
            .with_compression(self.options.compression_level)
            .with_mtime(started_at.timestamp().max(0) as u64)
            .build(&self.source)
            .await?;

        let destination = DestinationPath::for_run(
            self.options.prefix.as_deref(),
            &self.options.filename_template,
            self.source.kind(),
            &started_at,
        )?;

        tracing::info!(
            "writing archive ({} bytes) to {} storage as {}",
            archive.bytes.len(),
            self.sink.kind(),
            destination
        );
        let mut reader = Cursor::new(archive.bytes);
        let bytes_written = self.sink.write(&mut reader, &destination).await?;

        tracing::info!(destination = %destination, "done");
        Ok(RunReport {
            destination: destination.to_string(),
            summary: archive.summary,
            bytes_written,
        })
    }
}
