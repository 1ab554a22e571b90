//! File-backed watermark store.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tidemark_types::Watermark;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::traits::WatermarkStore;

/// Persists the watermark as a small JSON document.
///
/// Saves write a temporary file in the same directory and rename it over the
/// target, so a crash leaves either the old or the new watermark on disk.
#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

impl WatermarkStore for FileWatermarkStore {
    fn load(&self) -> Result<Option<Watermark>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let watermark =
            serde_json::from_slice(&data).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(watermark))
    }

    fn save(&self, watermark: &Watermark) -> Result<()> {
        let data = serde_json::to_vec_pretty(watermark)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        fs::create_dir_all(self.parent())?;
        let mut tmp = NamedTempFile::new_in(self.parent())?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        debug!(
            path = %self.path.display(),
            transaction_number = watermark.last_processed_transaction_number,
            "watermark saved"
        );
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
