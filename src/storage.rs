use std::{
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

/// Directory under the storage root where uploads are written before their
/// metadata commits. Never inside an owner's tree.
pub const STAGING_DIR: &str = ".staging";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
}

/// Binary content store addressed by `/`-separated paths relative to a root.
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    async fn put(&self, path: &str, bytes: Bytes) -> io::Result<()>;

    async fn get(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Moves `from` to `to`, replacing `to` if it exists.
    async fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    /// Returns `false` when there was nothing to remove.
    async fn remove(&self, path: &str) -> io::Result<bool>;

    async fn exists(&self, path: &str) -> io::Result<bool>;

    /// `false` for directories and missing paths.
    async fn is_file(&self, path: &str) -> io::Result<bool>;

    /// `false` for regular files and missing paths.
    async fn is_dir(&self, path: &str) -> io::Result<bool>;

    async fn create_dir_all(&self, path: &str) -> io::Result<()>;

    async fn list_dir(&self, path: &str) -> io::Result<Vec<DirEntryInfo>>;
}

pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    fn resolve(&self, relative: &str) -> io::Result<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(segment) => resolved.push(segment),
                Component::CurDir => {}
                _ => {
                    return Err(io::Error::new(
                        ErrorKind::InvalidInput,
                        format!("path escapes storage root: {relative}"),
                    ))
                }
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl FileStorage for LocalDiskStorage {
    async fn put(&self, path: &str, bytes: Bytes) -> io::Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, &bytes).await
    }

    async fn get(&self, path: &str) -> io::Result<Vec<u8>> {
        let target = self.resolve(path)?;
        if fs::metadata(&target).await?.is_dir() {
            return Err(io::Error::new(ErrorKind::NotFound, "not a file"));
        }
        fs::read(&target).await
    }

    async fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&source, &target).await
    }

    async fn remove(&self, path: &str) -> io::Result<bool> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn exists(&self, path: &str) -> io::Result<bool> {
        let target = self.resolve(path)?;
        fs::try_exists(&target).await
    }

    async fn is_file(&self, path: &str) -> io::Result<bool> {
        let target = self.resolve(path)?;
        match fs::metadata(&target).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn is_dir(&self, path: &str) -> io::Result<bool> {
        let target = self.resolve(path)?;
        match fs::metadata(&target).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn create_dir_all(&self, path: &str) -> io::Result<()> {
        let target = self.resolve(path)?;
        fs::create_dir_all(&target).await
    }

    async fn list_dir(&self, path: &str) -> io::Result<Vec<DirEntryInfo>> {
        let target = self.resolve(path)?;
        let mut reader = fs::read_dir(&target).await?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let file_type = entry.file_type().await?;
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_paths_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDiskStorage::new(dir.path());

        let err = storage
            .put("1/../../escape.txt", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(storage.put("/etc/passwd", Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn remove_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDiskStorage::new(dir.path());

        storage
            .put("1/docs/a.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert!(storage.remove("1/docs/a.txt").await.unwrap());
        assert!(!storage.remove("1/docs/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn distinguishes_files_from_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDiskStorage::new(dir.path());

        storage.create_dir_all("1/photos").await.unwrap();
        storage
            .put("1/notes.txt", Bytes::from_static(b"n"))
            .await
            .unwrap();

        assert!(storage.is_dir("1/photos").await.unwrap());
        assert!(!storage.is_file("1/photos").await.unwrap());
        assert!(storage.is_file("1/notes.txt").await.unwrap());
        assert!(!storage.is_dir("1/notes.txt").await.unwrap());
        assert!(!storage.is_file("1/missing.txt").await.unwrap());
        assert!(!storage.is_dir("1/missing").await.unwrap());
    }

    #[tokio::test]
    async fn lists_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDiskStorage::new(dir.path());

        storage.create_dir_all("1/photos").await.unwrap();
        storage
            .put("1/notes.txt", Bytes::from_static(b"n"))
            .await
            .unwrap();

        let mut entries = storage.list_dir("1").await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            entries,
            vec![
                DirEntryInfo {
                    name: "notes.txt".to_string(),
                    is_dir: false
                },
                DirEntryInfo {
                    name: "photos".to_string(),
                    is_dir: true
                },
            ]
        );
    }
}
