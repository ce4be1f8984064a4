use crate::config::FileSourceSettings;
use crate::core::{ArtifactRef, Source};
use crate::domain::model::ENTRY_EXTENSION;
use crate::utils::error::{BackupError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;

/// Regular files directly under a root directory, sorted by file name.
///
/// A file's identifier is its name with one `.json` extension stripped, so
/// `overview.json` is archived as `overview.json` rather than `overview.json.json`.
/// The extension is kept when the stripped name is itself a listed file, so
/// `x` and `x.json` side by side stay two distinct artifacts.
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(settings: FileSourceSettings) -> Self {
        Self { root: settings.dir }
    }

    fn path_of(&self, artifact: &ArtifactRef) -> PathBuf {
        if let Some(file_name) = &artifact.origin {
            return self.root.join(file_name);
        }
        let as_json = self.root.join(artifact.entry_name());
        if as_json.is_file() {
            as_json
        } else {
            self.root.join(&artifact.id)
        }
    }
}

#[async_trait]
impl Source for FileSource {
    fn kind(&self) -> &'static str {
        "files"
    }

    async fn init(&mut self) -> Result<()> {
        let target = self.root.display().to_string();
        let metadata = tokio::fs::metadata(&self.root)
            .await
            .map_err(|e| BackupError::connectivity(&target, e))?;
        if !metadata.is_dir() {
            return Err(BackupError::connectivity(target, "not a directory"));
        }
        Ok(())
    }

    async fn list_artifacts(&self) -> Result<Vec<ArtifactRef>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| BackupError::listing(format!("reading {}: {}", self.root.display(), e)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackupError::listing(format!("reading {}: {}", self.root.display(), e)))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| BackupError::listing(format!("inspecting {:?}: {}", entry.path(), e)))?;
            if !file_type.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => tracing::warn!(file = ?name, "skipping file with non UTF-8 name"),
            }
        }
        names.sort();

        let listed: HashSet<&str> = names.iter().map(String::as_str).collect();
        Ok(names
            .iter()
            .map(|name| {
                let id = match name.strip_suffix(ENTRY_EXTENSION) {
                    Some(stem) if !stem.is_empty() && !listed.contains(stem) => stem,
                    _ => name.as_str(),
                };
                ArtifactRef::new(id).with_origin(name.as_str())
            })
            .collect())
    }

    async fn fetch(&self, artifact: &ArtifactRef) -> Result<Vec<u8>> {
        let path = self.path_of(artifact);
        tokio::fs::read(&path)
            .await
            .map_err(|e| BackupError::fetch(&artifact.id, format!("reading {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source_for(dir: &TempDir) -> FileSource {
        FileSource::new(FileSourceSettings {
            dir: dir.path().to_path_buf(),
        })
    }

    #[tokio::test]
    async fn test_missing_root_fails_init() {
        let dir = TempDir::new().unwrap();
        let mut source = FileSource::new(FileSourceSettings {
            dir: dir.path().join("does-not-exist"),
        });

        let err = source.init().await.unwrap_err();
        assert!(matches!(err, BackupError::ConnectivityError { .. }));
    }

    #[tokio::test]
    async fn test_root_must_be_a_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();
        let mut source = FileSource::new(FileSourceSettings { dir: file });

        assert!(source.init().await.is_err());
    }

    #[tokio::test]
    async fn test_lists_regular_files_sorted() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("a.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hi").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let mut source = source_for(&dir);
        source.init().await.unwrap();
        let ids: Vec<String> = source
            .list_artifacts()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();

        assert_eq!(ids, vec!["a", "b", "notes.txt"]);
    }

    #[tokio::test]
    async fn test_fetch_reads_file_contents() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.json"), br#"{"a":1}"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hi").unwrap();

        let source = source_for(&dir);
        assert_eq!(source.fetch(&ArtifactRef::new("a")).await.unwrap(), br#"{"a":1}"#);
        assert_eq!(source.fetch(&ArtifactRef::new("notes.txt")).await.unwrap(), b"hi");

        let err = source.fetch(&ArtifactRef::new("missing")).await.unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_plain_and_json_twins_are_both_kept() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("x"), b"plain").unwrap();
        std::fs::write(dir.path().join("x.json"), br#"{"j":1}"#).unwrap();

        let source = source_for(&dir);
        let artifacts = source.list_artifacts().await.unwrap();
        let ids: Vec<&str> = artifacts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "x.json"]);

        assert_eq!(source.fetch(&artifacts[0]).await.unwrap(), b"plain");
        assert_eq!(source.fetch(&artifacts[1]).await.unwrap(), br#"{"j":1}"#);

        let archive = crate::core::archive::ArchiveBuilder::new()
            .build(&source)
            .await
            .unwrap();
        assert_eq!(archive.summary.archived, 2);
        assert_eq!(archive.summary.failed, 0);
    }
}
