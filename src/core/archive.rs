use crate::core::{ArchiveSummary, Source};
use crate::utils::error::{BackupError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashSet;
use std::io::Write;
use tar::{EntryType, Header};

const ENTRY_MODE: u32 = 0o644;

/// tar stream layered on a gzip encoder over `W` (an in-memory buffer by default).
///
/// Entries are compressed as they are appended, so only the current
/// artifact is held uncompressed. `finish` closes the tar stream before the
/// gzip stream; the encoder is only reachable by consuming the tar builder.
pub struct ArchiveWriter<W: Write = Vec<u8>> {
    tar: tar::Builder<GzEncoder<W>>,
    mtime: u64,
    entries: usize,
}

impl ArchiveWriter<Vec<u8>> {
    pub fn new(compression: Compression, mtime: u64) -> Self {
        Self::with_writer(Vec::new(), compression, mtime)
    }
}

impl<W: Write> ArchiveWriter<W> {
    pub fn with_writer(inner: W, compression: Compression, mtime: u64) -> Self {
        let gz = GzEncoder::new(inner, compression);
        let tar = tar::Builder::new(gz);
        Self {
            tar,
            mtime,
            entries: 0,
        }
    }

    /// GNU headers, so names longer than the 100 byte ustar field get a
    /// long-name record instead of failing.
    pub fn append(&mut self, name: &str, content: &[u8]) -> Result<()> {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(ENTRY_MODE);
        header.set_size(content.len() as u64);
        header.set_mtime(self.mtime);

        self.tar
            .append_data(&mut header, name, content)
            .map_err(BackupError::ArchiveFormatError)?;
        self.entries += 1;
        Ok(())
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Writes the end-of-archive marker, then the gzip trailer.
    pub fn finish(self) -> Result<W> {
        let gz = self
            .tar
            .into_inner()
            .map_err(BackupError::ArchiveFormatError)?;
        gz.finish().map_err(BackupError::ArchiveFormatError)
    }
}

#[derive(Debug)]
pub struct Archive {
    pub bytes: Vec<u8>,
    pub summary: ArchiveSummary,
}

#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    compression: Compression,
    mtime: u64,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            mtime: 0,
        }
    }
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, level: u32) -> Self {
        self.compression = Compression::new(level.min(9));
        self
    }

    /// Modification time (Unix seconds) stamped on every entry.
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    /// Lists the source and archives every artifact that can be fetched.
    ///
    /// A failed listing or a failed write into the archive ends the build.
    /// A failed fetch is logged, counted and skipped.
    pub async fn build<S: Source + ?Sized>(&self, source: &S) -> Result<Archive> {
        let (bytes, summary) = self.build_into(source, Vec::new()).await?;
        Ok(Archive { bytes, summary })
    }

    /// Same as `build`, compressing into `inner` and handing it back finished.
    pub async fn build_into<S, W>(&self, source: &S, inner: W) -> Result<(W, ArchiveSummary)>
    where
        S: Source + ?Sized,
        W: Write,
    {
        tracing::info!("archiving {} from source", source.kind());

        let artifacts = source.list_artifacts().await?;
        tracing::debug!("found {} artifacts", artifacts.len());

        let mut writer = ArchiveWriter::with_writer(inner, self.compression, self.mtime);
        let mut summary = ArchiveSummary {
            total: artifacts.len(),
            ..Default::default()
        };
        let mut entry_names = HashSet::new();

        for artifact in &artifacts {
            if !artifact.has_safe_id() {
                tracing::warn!(
                    artifact = %artifact.id,
                    "identifier is not a valid file name, skipping"
                );
                summary.failed += 1;
                summary.failed_ids.push(artifact.id.clone());
                continue;
            }

            let entry_name = artifact.entry_name();
            if !entry_names.insert(entry_name.clone()) {
                tracing::warn!(artifact = %artifact.id, "{} is already in the archive, skipping", entry_name);
                summary.failed += 1;
                summary.failed_ids.push(artifact.id.clone());
                continue;
            }

            let content = match source.fetch(artifact).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(artifact = %artifact.id, error = %e, "fetch failed, skipping");
                    summary.failed += 1;
                    summary.failed_ids.push(artifact.id.clone());
                    continue;
                }
            };

            writer.append(&entry_name, &content)?;
            tracing::debug!(artifact = %artifact.id, bytes = content.len(), "archived");
        }

        summary.archived = writer.entries();
        let inner = writer.finish()?;

        tracing::info!(
            total = summary.total,
            archived = summary.archived,
            failed = summary.failed,
            "successfully archived {} of {} {}",
            summary.archived,
            summary.total,
            source.kind()
        );
        if summary.is_partial() {
            tracing::warn!(failed = ?summary.failed_ids, "archive is missing {} artifacts", summary.failed);
        }

        Ok((inner, summary))
    }
}
