use crate::config::LocalSettings;
use crate::core::{DestinationPath, Sink};
use crate::domain::ports::ArchiveReader;
use crate::utils::error::{BackupError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Writes archives below a root directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalSink {
    root: PathBuf,
}

impl LocalSink {
    pub fn new(settings: LocalSettings) -> Self {
        Self {
            root: settings.root,
        }
    }

    pub fn full_path(&self, destination: &DestinationPath) -> PathBuf {
        destination
            .segments()
            .iter()
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

#[async_trait]
impl Sink for LocalSink {
    fn kind(&self) -> &'static str {
        "local"
    }

    /// Nothing to connect to; the root is created on first write if needed.
    async fn init(&mut self) -> Result<()> {
        if let Ok(metadata) = fs::metadata(&self.root).await {
            if !metadata.is_dir() {
                return Err(BackupError::config(format!(
                    "local storage root {} is not a directory",
                    self.root.display()
                )));
            }
        }
        Ok(())
    }

    async fn write(
        &self,
        reader: &mut ArchiveReader<'_>,
        destination: &DestinationPath,
    ) -> Result<u64> {
        let full_path = self.full_path(destination);
        let shown = full_path.display().to_string();

        // ensure file does not exist
        if fs::try_exists(&full_path)
            .await
            .map_err(|e| BackupError::sink_write(&shown, e))?
        {
            return Err(BackupError::AlreadyExists { path: shown });
        }

        // create directories, if necessary
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                BackupError::sink_write(&shown, format!("creating directory {}: {}", parent.display(), e))
            })?;
        }

        // create_new closes the gap between the check above and the open
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(BackupError::AlreadyExists { path: shown })
            }
            Err(e) => return Err(BackupError::sink_write(&shown, format!("creating file: {}", e))),
        };

        let copied = async {
            let written = tokio::io::copy(reader, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(written)
        }
        .await;
        drop(file);

        match copied {
            Ok(written) => {
                tracing::debug!(path = %shown, bytes = written, "archive written");
                Ok(written)
            }
            Err(e) => {
                remove_partial(&full_path).await;
                Err(BackupError::sink_write(&shown, e))
            }
        }
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "could not remove partially written archive");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn sink_in(dir: &TempDir) -> LocalSink {
        LocalSink::new(LocalSettings {
            root: dir.path().to_path_buf(),
        })
    }

    fn destination() -> DestinationPath {
        DestinationPath::new(None, 2024, 3, 15, "archive.tgz").unwrap()
    }

    #[tokio::test]
    async fn test_write_creates_intermediate_directories() {
        let dir = TempDir::new().unwrap();
        let mut sink = sink_in(&dir);
        sink.init().await.unwrap();

        let dest = DestinationPath::new(Some("nightly"), 2024, 3, 15, "archive.tgz").unwrap();
        let written = sink
            .write(&mut Cursor::new(b"payload".to_vec()), &dest)
            .await
            .unwrap();

        assert_eq!(written, 7);
        let on_disk = std::fs::read(dir.path().join("nightly/2024/3/15/archive.tgz")).unwrap();
        assert_eq!(on_disk, b"payload");
    }

    #[tokio::test]
    async fn test_second_write_is_rejected_and_first_is_kept() {
        let dir = TempDir::new().unwrap();
        let sink = sink_in(&dir);

        sink.write(&mut Cursor::new(b"first".to_vec()), &destination())
            .await
            .unwrap();
        let err = sink
            .write(&mut Cursor::new(b"second".to_vec()), &destination())
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::AlreadyExists { .. }));
        let on_disk = std::fs::read(sink.full_path(&destination())).unwrap();
        assert_eq!(on_disk, b"first");
    }

    #[tokio::test]
    async fn test_failed_copy_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let sink = sink_in(&dir);
        let mut reader = tokio_test::io::Builder::new()
            .read(b"half an archive")
            .read_error(std::io::Error::new(ErrorKind::ConnectionReset, "stream broke"))
            .build();

        let err = sink.write(&mut reader, &destination()).await.unwrap_err();

        assert!(matches!(err, BackupError::SinkWriteError { .. }));
        assert!(!sink.full_path(&destination()).exists());
    }

    #[tokio::test]
    async fn test_init_rejects_file_as_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let mut sink = LocalSink::new(LocalSettings { root: file });

        assert!(sink.init().await.is_err());
    }
}
