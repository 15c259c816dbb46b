//! Structured document files with one rolling backup

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Suffix appended to the live file name to form the backup path
pub const BACKUP_SUFFIX: &str = ".bak";

/// On-disk encoding, chosen from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }

    pub fn parse<T: DeserializeOwned + Default>(self, path: &Path, contents: &str) -> Result<T> {
        if contents.trim().is_empty() {
            return Ok(T::default());
        }
        match self {
            Self::Json => serde_json::from_str(contents).map_err(|e| Error::format(path, e)),
            Self::Yaml => serde_yaml::from_str(contents).map_err(|e| Error::format(path, e)),
        }
    }

    pub fn render<T: Serialize>(self, path: &Path, value: &T) -> Result<String> {
        match self {
            Self::Json => serde_json::to_string_pretty(value).map_err(|e| Error::format(path, e)),
            Self::Yaml => serde_yaml::to_string(value).map_err(|e| Error::format(path, e)),
        }
    }
}

/// Backup location for a live file (`creds.yaml` -> `creds.yaml.bak`)
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Read and parse a document. A missing file yields `None`.
pub async fn read_document<T: DeserializeOwned + Default>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(path, e)),
    };

    DocumentFormat::from_path(path)
        .parse(path, &contents)
        .map(Some)
}

/// Serialize `value` to `path`, rotating the previous file into the backup slot.
///
/// Order: drop the old backup, rename the live file onto the backup path,
/// write the new content. If the process dies between the rename and the
/// write only the backup survives.
pub async fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = DocumentFormat::from_path(path).render(path, value)?;
    let backup = backup_path(path);

    match fs::remove_file(&backup).await {
        Ok(()) => debug!(path = %backup.display(), "Removed previous backup"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io(&backup, e)),
    }

    match fs::rename(path, &backup).await {
        Ok(()) => debug!(path = %backup.display(), "Rotated live file into backup"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io(path, e)),
    }

    fs::write(path, contents)
        .await
        .map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    type Doc = BTreeMap<String, Vec<String>>;

    fn sample() -> Doc {
        let mut doc = Doc::new();
        doc.insert("alice".into(), vec!["a/#".into()]);
        doc
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DocumentFormat::from_path(Path::new("x.json")), DocumentFormat::Json);
        assert_eq!(DocumentFormat::from_path(Path::new("x.JSON")), DocumentFormat::Json);
        assert_eq!(DocumentFormat::from_path(Path::new("x.yaml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("passwd")), DocumentFormat::Yaml);
    }

    #[test]
    fn test_backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("/etc/mqtt/creds.yaml")),
            PathBuf::from("/etc/mqtt/creds.yaml.bak")
        );
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let doc: Option<Doc> = read_document(&dir.path().join("absent.yaml")).await.unwrap();
        assert!(doc.is_none());
    }

    #[tokio::test]
    async fn test_empty_file_reads_as_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.yaml");
        std::fs::write(&path, "\n").unwrap();

        let doc: Option<Doc> = read_document(&path).await.unwrap();
        assert_eq!(doc, Some(Doc::new()));
    }

    #[tokio::test]
    async fn test_garbage_is_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result: Result<Option<Doc>> = read_document(&path).await;
        assert!(matches!(result, Err(Error::Format { .. })));
    }

    #[tokio::test]
    async fn test_write_rotates_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.yaml");

        write_document(&path, &sample()).await.unwrap();
        assert!(!backup_path(&path).exists());

        let mut second = sample();
        second.insert("bob".into(), vec![]);
        write_document(&path, &second).await.unwrap();

        let live: Doc = read_document(&path).await.unwrap().unwrap();
        let backup: Doc = read_document(&backup_path(&path)).await.unwrap().unwrap();
        assert_eq!(live, second);
        assert_eq!(backup, sample());

        // Third write replaces the old backup with the second version
        write_document(&path, &sample()).await.unwrap();
        let backup: Doc = read_document(&backup_path(&path)).await.unwrap().unwrap();
        assert_eq!(backup, second);
    }

    #[tokio::test]
    async fn test_write_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no-such-dir").join("doc.yaml");

        let result = write_document(&path, &sample()).await;
        assert!(matches!(result, Err(Error::PersistenceIo { .. })));
    }
}
