//! Per-user artifact storage.
//!
//! Finished PDFs live at `DATA_DIR/<user_id>/<filename>`; the partition key
//! is the user ID and no operation can cross partitions. Writes go through a
//! `.part` file and a rename, so readers never observe a partial artifact.
//! There is no quota, eviction, or deduplication.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// A stored artifact: the filename actually used (collisions get a random
/// prefix) and its absolute path.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub filename: String,
    pub path: PathBuf,
}

/// Filesystem store for converted PDFs, partitioned per user.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reduce a requested filename to a single safe path component.
    pub fn sanitize_filename(name: &str) -> String {
        let cleaned: String = name
            .replace('\\', "/")
            .split('/')
            .next_back()
            .unwrap_or_default()
            .chars()
            .filter(|c| *c != '\0')
            .collect();
        let cleaned = cleaned.trim().trim_start_matches('.').to_string();
        if cleaned.is_empty() {
            "file.pdf".to_string()
        } else {
            cleaned
        }
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        self.root.join(Self::sanitize_filename(user_id))
    }

    async fn ensure_user_dir(&self, user_id: &str) -> Result<PathBuf> {
        let dir = self.user_dir(user_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::StorageUnavailable(format!("{}: {}", dir.display(), e)))?;
        Ok(dir)
    }

    /// Pick a target path in `dir`, prefixing the name when it collides with
    /// an existing artifact.
    async fn unique_target(dir: &Path, filename: &str) -> (String, PathBuf) {
        let target = dir.join(filename);
        if !target.exists() {
            return (filename.to_string(), target);
        }
        let prefixed = format!(
            "{}_{}",
            &uuid::Uuid::new_v4().simple().to_string()[..8],
            filename
        );
        let path = dir.join(&prefixed);
        (prefixed, path)
    }

    /// Store raw bytes under a user's partition.
    pub async fn put(&self, user_id: &str, filename: &str, bytes: &[u8]) -> Result<StoredArtifact> {
        let dir = self.ensure_user_dir(user_id).await?;
        let name = Self::sanitize_filename(filename);
        let (name, target) = Self::unique_target(&dir, &name).await;

        let part = dir.join(format!("{}.part", name));
        tokio::fs::write(&part, bytes)
            .await
            .map_err(|e| Error::StorageUnavailable(format!("write {}: {}", part.display(), e)))?;
        tokio::fs::rename(&part, &target)
            .await
            .map_err(|e| Error::StorageUnavailable(format!("rename {}: {}", target.display(), e)))?;

        Ok(StoredArtifact {
            filename: name,
            path: target,
        })
    }

    /// Move a finished file (e.g. a merged PDF in a scratch dir) into a
    /// user's partition.
    pub async fn store_file(
        &self,
        user_id: &str,
        filename: &str,
        src: &Path,
    ) -> Result<StoredArtifact> {
        let dir = self.ensure_user_dir(user_id).await?;
        let name = Self::sanitize_filename(filename);
        let (name, target) = Self::unique_target(&dir, &name).await;

        // Copy via .part then rename; the source is usually on another
        // filesystem (system temp), so a direct rename can't be relied on.
        let part = dir.join(format!("{}.part", name));
        tokio::fs::copy(src, &part)
            .await
            .map_err(|e| Error::StorageUnavailable(format!("copy to {}: {}", part.display(), e)))?;
        tokio::fs::rename(&part, &target)
            .await
            .map_err(|e| Error::StorageUnavailable(format!("rename {}: {}", target.display(), e)))?;

        Ok(StoredArtifact {
            filename: name,
            path: target,
        })
    }

    /// List a user's artifacts, sorted by name. A missing partition is an
    /// empty listing, not an error.
    pub async fn list(&self, user_id: &str) -> Result<Vec<String>> {
        let dir = self.user_dir(user_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::StorageUnavailable(format!(
                    "{}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::StorageUnavailable(format!("{}: {}", dir.display(), e)))?
        {
            if let Ok(file_type) = entry.file_type().await {
                if !file_type.is_file() {
                    continue;
                }
            }
            if let Ok(name) = entry.file_name().into_string() {
                if !name.ends_with(".part") {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Absolute path of an artifact in a user's partition.
    pub fn path_of(&self, user_id: &str, filename: &str) -> PathBuf {
        self.user_dir(user_id).join(Self::sanitize_filename(filename))
    }

    /// Read an artifact's bytes.
    pub async fn get(&self, user_id: &str, filename: &str) -> Result<Vec<u8>> {
        let path = self.path_of(user_id, filename);
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(filename.to_string()),
            _ => Error::StorageUnavailable(format!("{}: {}", path.display(), e)),
        })
    }
}
