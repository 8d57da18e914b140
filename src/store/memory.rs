//! In-memory store with snapshot transactions and JSON persistence.

use super::{ChapterStore, TrackStore};
use crate::error::StoreError;
use crate::models::{ChapterRecord, Manga, TrackRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

/// Everything the store holds. Cloned whole to open a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct StoreState {
    mangas: BTreeMap<i64, Manga>,
    chapters: BTreeMap<i64, ChapterRecord>,
    tracks: Vec<TrackRecord>,
    /// Chapter ids with a local download.
    downloaded: BTreeSet<i64>,
    next_chapter_id: i64,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            mangas: BTreeMap::new(),
            chapters: BTreeMap::new(),
            tracks: Vec::new(),
            downloaded: BTreeSet::new(),
            next_chapter_id: 1,
        }
    }
}

/// Store keeping the whole library in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: StoreState,
    /// State at `begin_transaction`, restored on rollback.
    snapshot: Option<StoreState>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store snapshot from a JSON file.
    pub fn load_from(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        let state: StoreState = serde_json::from_str(&content)?;
        Ok(Self {
            state,
            snapshot: None,
        })
    }

    /// Saves the committed state to a JSON file.
    pub fn save_to(&self, path: &Path) -> Result<(), StoreError> {
        if self.snapshot.is_some() {
            return Err(StoreError::Transaction(
                "cannot save while a transaction is open".to_string(),
            ));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Adds or replaces a manga.
    pub fn put_manga(&mut self, manga: Manga) {
        self.state.mangas.insert(manga.id, manga);
    }

    /// Returns all mangas in id order.
    pub fn mangas(&self) -> impl Iterator<Item = &Manga> {
        self.state.mangas.values()
    }

    /// Marks a chapter as downloaded or not.
    pub fn set_downloaded(&mut self, chapter_id: i64, downloaded: bool) {
        if downloaded {
            self.state.downloaded.insert(chapter_id);
        } else {
            self.state.downloaded.remove(&chapter_id);
        }
    }

    /// Returns true if the chapter has a local download.
    pub fn is_downloaded(&self, chapter_id: i64) -> bool {
        self.state.downloaded.contains(&chapter_id)
    }

    /// Returns true while a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn require_id(chapter: &ChapterRecord) -> Result<i64, StoreError> {
        chapter
            .id
            .ok_or_else(|| StoreError::Backend(format!("chapter {} has no id", chapter.url)))
    }

    fn stored_mut(&mut self, chapter: &ChapterRecord) -> Result<&mut ChapterRecord, StoreError> {
        let id = Self::require_id(chapter)?;
        self.state
            .chapters
            .get_mut(&id)
            .ok_or(StoreError::ChapterNotFound(id))
    }
}

impl ChapterStore for MemoryStore {
    fn manga(&self, manga_id: i64) -> Result<Manga, StoreError> {
        self.state
            .mangas
            .get(&manga_id)
            .cloned()
            .ok_or(StoreError::MangaNotFound(manga_id))
    }

    fn chapters(&self, manga_id: i64) -> Result<Vec<ChapterRecord>, StoreError> {
        Ok(self
            .state
            .chapters
            .values()
            .filter(|c| c.manga_id == manga_id)
            .cloned()
            .collect())
    }

    fn insert_chapters(&mut self, chapters: &[ChapterRecord]) -> Result<Vec<i64>, StoreError> {
        let mut taken: HashSet<(i64, String)> = self
            .state
            .chapters
            .values()
            .map(|c| (c.manga_id, c.url.clone()))
            .collect();

        for chapter in chapters {
            if !taken.insert((chapter.manga_id, chapter.url.clone())) {
                return Err(StoreError::DuplicateUrl {
                    manga_id: chapter.manga_id,
                    url: chapter.url.clone(),
                });
            }
        }

        let mut ids = Vec::with_capacity(chapters.len());
        for chapter in chapters {
            let id = self.state.next_chapter_id;
            self.state.next_chapter_id += 1;

            let mut stored = chapter.clone();
            stored.id = Some(id);
            self.state.chapters.insert(id, stored);
            ids.push(id);
        }
        Ok(ids)
    }

    fn update_chapters(&mut self, chapters: &[ChapterRecord]) -> Result<(), StoreError> {
        for chapter in chapters {
            let stored = self.stored_mut(chapter)?;
            *stored = chapter.clone();
        }
        Ok(())
    }

    fn delete_chapters(&mut self, chapters: &[ChapterRecord]) -> Result<(), StoreError> {
        for chapter in chapters {
            let id = Self::require_id(chapter)?;
            if self.state.chapters.remove(&id).is_none() {
                return Err(StoreError::ChapterNotFound(id));
            }
            self.state.downloaded.remove(&id);
        }
        Ok(())
    }

    fn fix_source_order(&mut self, chapters: &[ChapterRecord]) -> Result<(), StoreError> {
        for chapter in chapters {
            self.stored_mut(chapter)?.source_order = chapter.source_order;
        }
        Ok(())
    }

    fn update_manga_schedule(
        &mut self,
        manga_id: i64,
        last_update: i64,
        next_update: i64,
    ) -> Result<(), StoreError> {
        let manga = self
            .state
            .mangas
            .get_mut(&manga_id)
            .ok_or(StoreError::MangaNotFound(manga_id))?;
        manga.last_update = last_update;
        manga.next_update = next_update;
        Ok(())
    }

    fn begin_transaction(&mut self) -> Result<(), StoreError> {
        if self.snapshot.is_some() {
            return Err(StoreError::Transaction(
                "transaction already open".to_string(),
            ));
        }
        self.snapshot = Some(self.state.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| StoreError::Transaction("commit without transaction".to_string()))
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| StoreError::Transaction("rollback without transaction".to_string()))?;
        self.state = snapshot;
        Ok(())
    }
}

impl TrackStore for MemoryStore {
    fn tracks(&self, manga_id: i64) -> Result<Vec<TrackRecord>, StoreError> {
        Ok(self
            .state
            .tracks
            .iter()
            .filter(|t| t.manga_id == manga_id)
            .cloned()
            .collect())
    }

    fn upsert_track(&mut self, track: &TrackRecord) -> Result<(), StoreError> {
        match self
            .state
            .tracks
            .iter_mut()
            .find(|t| t.manga_id == track.manga_id && t.sync_id == track.sync_id)
        {
            Some(existing) => *existing = track.clone(),
            None => self.state.tracks.push(track.clone()),
        }
        Ok(())
    }

    fn update_chapters_progress(&mut self, chapters: &[ChapterRecord]) -> Result<(), StoreError> {
        for chapter in chapters {
            let stored = self.stored_mut(chapter)?;
            stored.read = chapter.read;
            stored.bookmark = chapter.bookmark;
            stored.last_page_read = chapter.last_page_read;
        }
        Ok(())
    }
}
