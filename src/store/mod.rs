//! Persisted store contracts.
//!
//! The storage engine itself lives outside this crate; reconciliation and
//! tracking talk to it through these traits. [`MemoryStore`] is a complete
//! in-process implementation used by the CLI and tests.

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::models::{ChapterRecord, Manga, TrackRecord};
use tracing::warn;

/// Chapter and manga persistence.
pub trait ChapterStore {
    /// Returns a manga by id.
    fn manga(&self, manga_id: i64) -> Result<Manga, StoreError>;

    /// Returns every persisted chapter of a manga.
    fn chapters(&self, manga_id: i64) -> Result<Vec<ChapterRecord>, StoreError>;

    /// Inserts new chapters and returns their assigned ids, in input order.
    fn insert_chapters(&mut self, chapters: &[ChapterRecord]) -> Result<Vec<i64>, StoreError>;

    /// Overwrites existing chapters, matched by id.
    fn update_chapters(&mut self, chapters: &[ChapterRecord]) -> Result<(), StoreError>;

    /// Deletes chapters, matched by id.
    fn delete_chapters(&mut self, chapters: &[ChapterRecord]) -> Result<(), StoreError>;

    /// Rewrites only the `source_order` of the given chapters.
    fn fix_source_order(&mut self, chapters: &[ChapterRecord]) -> Result<(), StoreError>;

    /// Sets a manga's last-updated and estimated next-update timestamps.
    fn update_manga_schedule(
        &mut self,
        manga_id: i64,
        last_update: i64,
        next_update: i64,
    ) -> Result<(), StoreError>;

    fn begin_transaction(&mut self) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;

    /// Runs `block` inside a transaction.
    ///
    /// Commits when the block succeeds; rolls back and returns the block's
    /// error otherwise.
    fn run_in_transaction<T, E, F>(&mut self, block: F) -> Result<T, E>
    where
        Self: Sized,
        E: From<StoreError>,
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        self.begin_transaction()?;
        match block(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_error) = self.rollback() {
                    warn!(error = %rollback_error, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

/// Tracker record and reading progress persistence.
pub trait TrackStore {
    /// Returns every tracker record bound to a manga.
    fn tracks(&self, manga_id: i64) -> Result<Vec<TrackRecord>, StoreError>;

    /// Inserts or replaces the record for `(manga_id, sync_id)`.
    fn upsert_track(&mut self, track: &TrackRecord) -> Result<(), StoreError>;

    /// Writes `read`, `bookmark` and `last_page_read` of the given chapters.
    fn update_chapters_progress(&mut self, chapters: &[ChapterRecord]) -> Result<(), StoreError>;
}
