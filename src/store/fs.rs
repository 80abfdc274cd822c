//! Filesystem object store - a local directory laid out like a bucket
//!
//! Blobs live at `<root>/<key>`. Writes go to `<root>/.tmp/<uuid>` first and
//! are moved into place with a rename (or a hard link for conditional
//! creates), so a reader never sees a partially written blob. Conditional
//! deletes move the blob aside to a tombstone, compare it there, and link it
//! back when it was not the expected content.

use crate::store::{validate_key, ObjectStore, StoreError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

const TMP_DIR: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        if key == TMP_DIR || key.starts_with(&format!("{}/", TMP_DIR)) {
            return Err(StoreError::InvalidKey(format!(
                "key '{}' uses the reserved '{}' prefix",
                key, TMP_DIR
            )));
        }
        Ok(key.split('/').fold(self.root.clone(), |p, seg| p.join(seg)))
    }

    /// Write bytes to a fresh temp file under the bucket and return its path
    async fn write_temp(&self, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let tmp_dir = self.root.join(TMP_DIR);
        tokio::fs::create_dir_all(&tmp_dir)
            .await
            .map_err(|e| unavailable("create temp dir", &tmp_dir, e))?;

        let tmp = tmp_dir.join(format!("{}.part", Uuid::new_v4()));
        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(())
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(unavailable("write", &tmp, e));
        }
        Ok(tmp)
    }

    async fn ensure_parent(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| unavailable("create directory", parent, e))?;
        }
        Ok(())
    }
}

fn unavailable(op: &str, path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Unavailable(format!("{} {}: {}", op, path.display(), err))
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(unavailable("stat", &path, e)),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable("read", &path, e)),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        self.ensure_parent(&path).await?;
        let tmp = self.write_temp(&bytes).await?;

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(unavailable("rename into", &path, e));
        }
        debug!("Stored {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, bytes: Vec<u8>) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        self.ensure_parent(&path).await?;
        let tmp = self.write_temp(&bytes).await?;

        let linked = tokio::fs::hard_link(&tmp, &path).await;
        let _ = tokio::fs::remove_file(&tmp).await;
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(unavailable("link into", &path, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(unavailable("delete", &path, e)),
        }
    }

    async fn delete_if_matches(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        let tmp_dir = self.root.join(TMP_DIR);
        tokio::fs::create_dir_all(&tmp_dir)
            .await
            .map_err(|e| unavailable("create temp dir", &tmp_dir, e))?;

        let tombstone = tmp_dir.join(format!("{}.tomb", Uuid::new_v4()));
        match tokio::fs::rename(&path, &tombstone).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(unavailable("move aside", &path, e)),
        }

        let held = tokio::fs::read(&tombstone).await;
        if matches!(&held, Ok(bytes) if bytes.as_slice() == expected) {
            let _ = tokio::fs::remove_file(&tombstone).await;
            debug!("Deleted {} after content check", key);
            return Ok(true);
        }

        // Not the expected blob: put it back unless a newer one took its place
        let restored = tokio::fs::hard_link(&tombstone, &path).await;
        let _ = tokio::fs::remove_file(&tombstone).await;
        match (held, restored) {
            (Err(e), _) => Err(unavailable("read", &tombstone, e)),
            (Ok(_), Ok(())) => Ok(false),
            (Ok(_), Err(e)) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            (Ok(_), Err(e)) => Err(unavailable("restore", &path, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];

        while let Some((dir, key_prefix)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(unavailable("list", &dir, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| unavailable("list", &dir, e))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                if key_prefix.is_empty() && name == TMP_DIR {
                    continue;
                }
                let key = format!("{}{}", key_prefix, name);
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| unavailable("list", &entry.path(), e))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), format!("{}/", key)));
                } else if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}
