//! Hash-addressed input archive + atomic file writes for run exports.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "wcm-storage";

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Describes one written export for run manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
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

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn artifact_relative_path(
        &self,
        loaded_at: DateTime<Utc>,
        source_id: &str,
        content_hash: &str,
        extension: &str,
    ) -> PathBuf {
        let stamp = loaded_at.format("%Y%m%d_%H%M%S").to_string();
        let ext = extension.trim_start_matches('.').trim();
        let ext = if ext.is_empty() { "bin" } else { ext };
        PathBuf::from(stamp)
            .join(source_id)
            .join(format!("{content_hash}.{ext}"))
    }

    /// Archive a raw input under a hash-addressed path. Identical content for
    /// the same source and timestamp is stored once.
    pub async fn store_bytes(
        &self,
        loaded_at: DateTime<Utc>,
        source_id: &str,
        extension: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredArtifact> {
        let content_hash = Self::sha256_hex(bytes);
        let relative_path =
            self.artifact_relative_path(loaded_at, source_id, &content_hash, extension);
        let absolute_path = self.root.join(&relative_path);

        let deduplicated = !write_atomic_if_absent(&absolute_path, bytes).await?;
        debug!(
            source_id,
            path = %absolute_path.display(),
            deduplicated,
            "archived raw input"
        );
        Ok(StoredArtifact {
            content_hash,
            relative_path,
            absolute_path,
            byte_size: bytes.len(),
            deduplicated,
        })
    }
}

/// Write `bytes` to `path` through a temp file + rename, replacing any
/// previous content.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let temp_path = write_temp_sibling(path, bytes).await?;
    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!(
                "atomically renaming {} -> {}",
                temp_path.display(),
                path.display()
            )
        });
    }
    Ok(())
}

/// Like [`write_atomic`] but leaves an existing file untouched. Returns
/// whether a new file was written.
pub async fn write_atomic_if_absent(path: &Path, bytes: &[u8]) -> anyhow::Result<bool> {
    if fs::try_exists(path)
        .await
        .with_context(|| format!("checking path {}", path.display()))?
    {
        return Ok(false);
    }
    let temp_path = write_temp_sibling(path, bytes).await?;
    match fs::rename(&temp_path, path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            let _ = fs::remove_file(&temp_path).await;
            Ok(false)
        }
        Err(err) => {
            let _ = fs::remove_file(&temp_path).await;
            Err(err).with_context(|| {
                format!(
                    "atomically renaming {} -> {}",
                    temp_path.display(),
                    path.display()
                )
            })
        }
    }
}

async fn write_temp_sibling(path: &Path, bytes: &[u8]) -> anyhow::Result<PathBuf> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    Ok(temp_path)
}

/// Hash and size an already written export, with its path relative to `base`.
pub async fn describe_export(name: &str, base: &Path, path: &Path) -> anyhow::Result<ExportedFile> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let rel = path.strip_prefix(base).unwrap_or(path).display().to_string();
    Ok(ExportedFile {
        name: name.to_string(),
        path: rel,
        sha256: ArtifactStore::sha256_hex(&bytes),
        bytes: bytes.len() as u64,
    })
}
