//! Content-addressed storage of raw uploads.
//!
//! Each upload is kept as `<dir>/<contract_id>.<ext>`. Because the name is
//! derived from the content hash, re-saving the same bytes is a no-op and an
//! existing file is never rewritten.
//!
//! Bytes are written to a uniquely named temporary file in the same directory
//! and moved into place without clobbering, so readers never see a partial
//! file and concurrent saves of one upload all succeed.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use contract_rag_core::models::DocumentId;

use crate::extract::DocumentKind;

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &DocumentId, kind: DocumentKind) -> PathBuf {
        self.dir.join(format!("{}.{}", id, kind.extension()))
    }

    /// Persist `bytes` under their identity, returning the stored path.
    pub async fn save(&self, id: &DocumentId, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(id, DocumentKind::sniff(bytes));
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create upload dir {}", self.dir.display()))?;

        let dir = self.dir.clone();
        let target = path.clone();
        let owned = bytes.to_vec();
        tokio::task::spawn_blocking(move || write_new(&dir, &target, &owned))
            .await
            .context("upload writer task failed")??;

        tracing::debug!(contract_id = %id, path = %path.display(), "stored upload");
        Ok(path)
    }
}

fn write_new(dir: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".upload-")
        .suffix(".partial")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("Failed to write {}", tmp.path().display()))?;

    match tmp.persist_noclobber(target) {
        Ok(_) => Ok(()),
        // Same name means same bytes: a concurrent save already landed.
        Err(_) if target.exists() => Ok(()),
        Err(e) => Err(e.error)
            .with_context(|| format!("Failed to move upload into {}", target.display())),
    }
}
