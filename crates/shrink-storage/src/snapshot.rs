use serde::{Deserialize, Serialize};
use shrink_core::error::{Result, StoreError};
use std::path::{Path, PathBuf};

/// One persisted mapping in the snapshot file.
///
/// The ownership index is not persisted; it is a cache and gets rebuilt
/// from these records at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub short_id: String,
    pub original_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

/// JSON file backup for the in-memory store.
///
/// The whole map is written as one pretty-printed JSON array, replacing
/// any previous file content. Loading tolerates a missing or empty file
/// and treats both as an empty store.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all records from the snapshot file.
    pub async fn load(&self) -> Result<Vec<SnapshotRecord>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(StoreError::Unavailable(format!(
                    "cannot read snapshot file '{}': {err}",
                    self.path.display()
                )))
            }
        };

        if data.is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&data).map_err(|err| {
            StoreError::InvalidData(format!(
                "cannot parse snapshot file '{}': {err}",
                self.path.display()
            ))
        })
    }

    /// Writes all records to the snapshot file, replacing its content.
    pub async fn write(&self, records: &[SnapshotRecord]) -> Result<()> {
        let data = serde_json::to_vec_pretty(records)
            .map_err(|err| StoreError::InvalidData(format!("cannot encode snapshot: {err}")))?;

        tokio::fs::write(&self.path, data).await.map_err(|err| {
            StoreError::Unavailable(format!(
                "cannot write snapshot file '{}': {err}",
                self.path.display()
            ))
        })
    }
}
