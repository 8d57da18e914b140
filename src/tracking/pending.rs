//! Durable queue of tracker updates that couldn't be sent while offline.
//!
//! Entries are keyed `"{manga_id}:{sync_id}"` and hold the highest chapter
//! number waiting to be pushed. The queue lives in a JSON file.

use crate::error::PendingQueueError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A queued update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingUpdate {
    pub manga_id: i64,
    pub sync_id: i32,
    pub last_chapter_read: f32,
}

impl PendingUpdate {
    /// Returns the queue key of this update.
    pub fn key(&self) -> String {
        format!("{}:{}", self.manga_id, self.sync_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PendingTrackingData {
    updates: BTreeMap<String, f32>,
}

/// Pending tracker update queue backed by a JSON file.
pub struct PendingTrackingStore {
    filepath: PathBuf,
    data: PendingTrackingData,
}

impl PendingTrackingStore {
    /// Opens the queue at `filepath`, loading it if the file exists.
    pub fn open(filepath: &Path) -> Result<Self, PendingQueueError> {
        let mut store = Self {
            filepath: filepath.to_path_buf(),
            data: PendingTrackingData::default(),
        };

        if store.filepath.exists() {
            store.reload_from_disk()?;
        }

        Ok(store)
    }

    /// Get the filepath for this queue.
    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    /// Splits a `manga_id:sync_id` key.
    pub fn parse_key(key: &str) -> Result<(i64, i32), PendingQueueError> {
        let invalid = || PendingQueueError::InvalidKey(key.to_string());
        let (manga, sync) = key.split_once(':').ok_or_else(invalid)?;
        let manga_id = manga.trim().parse().map_err(|_| invalid())?;
        let sync_id = sync.trim().parse().map_err(|_| invalid())?;
        Ok((manga_id, sync_id))
    }

    /// Queues an update, keeping the higher chapter if one is already queued.
    pub fn enqueue(&mut self, manga_id: i64, sync_id: i32, last_chapter_read: f32) {
        let key = PendingUpdate {
            manga_id,
            sync_id,
            last_chapter_read,
        }
        .key();
        let entry = self.data.updates.entry(key).or_insert(last_chapter_read);
        if last_chapter_read > *entry {
            *entry = last_chapter_read;
        }
    }

    /// Removes a queued update. Returns true if it was queued.
    pub fn remove(&mut self, manga_id: i64, sync_id: i32) -> bool {
        self.data
            .updates
            .remove(&format!("{}:{}", manga_id, sync_id))
            .is_some()
    }

    /// Returns the queued chapter for a track, if any.
    pub fn get(&self, manga_id: i64, sync_id: i32) -> Option<f32> {
        self.data
            .updates
            .get(&format!("{}:{}", manga_id, sync_id))
            .copied()
    }

    /// Returns every well-formed queued update. Malformed keys are skipped.
    pub fn entries(&self) -> Vec<PendingUpdate> {
        self.data
            .updates
            .iter()
            .filter_map(|(key, &last_chapter_read)| match Self::parse_key(key) {
                Ok((manga_id, sync_id)) => Some(PendingUpdate {
                    manga_id,
                    sync_id,
                    last_chapter_read,
                }),
                Err(e) => {
                    warn!(error = %e, "skipping pending update");
                    None
                }
            })
            .collect()
    }

    /// Drops entries whose key can't be parsed.
    pub fn purge_invalid(&mut self) -> usize {
        let before = self.data.updates.len();
        self.data
            .updates
            .retain(|key, _| Self::parse_key(key).is_ok());
        before - self.data.updates.len()
    }

    /// Get the number of queued updates.
    pub fn len(&self) -> usize {
        self.data.updates.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.data.updates.is_empty()
    }

    /// Save the queue to disk.
    pub fn save(&self) -> Result<(), PendingQueueError> {
        if let Some(parent) = self.filepath.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.filepath, content)
            .map_err(|e| PendingQueueError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Reload the queue from disk.
    pub fn reload_from_disk(&mut self) -> Result<(), PendingQueueError> {
        let content = std::fs::read_to_string(&self.filepath)?;
        self.data = serde_json::from_str(&content)?;

        let purged = self.purge_invalid();
        if purged > 0 {
            warn!(purged, path = %self.filepath.display(), "dropped malformed pending updates");
        }

        Ok(())
    }
}
