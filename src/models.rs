//! Core data types shared by the merge, reconcile, filter and tracking modules.

use crate::filter::ChapterDisplaySettings;
use serde::{Deserialize, Serialize};

/// Separator between scanlator groups in a chapter's scanlator field.
pub const SCANLATOR_SEPARATOR: &str = " & ";

/// Which provider produced a chapter entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "source", rename_all = "lowercase")]
pub enum Provenance {
    /// The canonical provider for the title.
    #[default]
    Primary,
    /// A secondary provider, identified by its source id.
    Merged(String),
}

impl Provenance {
    /// Returns true if the entry came from a merged source.
    pub fn is_merged(&self) -> bool {
        matches!(self, Provenance::Merged(_))
    }
}

/// A chapter as returned by a provider fetch, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RawChapter {
    pub url: String,
    pub name: String,
    pub scanlator: Option<String>,
    pub volume: Option<i32>,
    /// Chapter label as printed by the provider ("Ch. 12.5").
    pub chapter_txt: String,
    pub chapter_title: String,
    /// Epoch millis, 0 when the provider gives none.
    pub date_upload: i64,
    pub language: Option<String>,
    pub provider_chapter_id: Option<String>,
    pub provenance: Provenance,
    pub unavailable: bool,
    /// Filled in by a [`ChapterNumberRecognizer`](crate::recognition::ChapterNumberRecognizer).
    pub chapter_number: Option<f32>,
}

impl RawChapter {
    /// Returns the provider chapter id, deriving it from the url when missing.
    pub fn effective_provider_id(&self) -> String {
        match &self.provider_chapter_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => derive_provider_chapter_id(&self.url),
        }
    }
}

/// A persisted chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChapterRecord {
    /// Assigned by the store; `None` until inserted.
    pub id: Option<i64>,
    pub manga_id: i64,
    pub url: String,
    pub provider_chapter_id: String,
    pub source_order: i32,
    pub chapter_number: Option<f32>,
    pub volume: Option<i32>,
    pub name: String,
    pub chapter_txt: String,
    pub chapter_title: String,
    pub scanlator: Option<String>,
    pub language: Option<String>,
    pub date_upload: i64,
    pub date_fetch: i64,
    pub read: bool,
    pub bookmark: bool,
    pub last_page_read: i32,
    pub provenance: Provenance,
    pub unavailable: bool,
}

impl ChapterRecord {
    /// Builds an unsaved record from a fetched chapter.
    pub fn from_raw(raw: &RawChapter, manga_id: i64, source_order: i32) -> Self {
        Self {
            id: None,
            manga_id,
            url: raw.url.clone(),
            provider_chapter_id: raw.effective_provider_id(),
            source_order,
            chapter_number: raw.chapter_number,
            volume: raw.volume,
            name: raw.name.clone(),
            chapter_txt: raw.chapter_txt.clone(),
            chapter_title: raw.chapter_title.clone(),
            scanlator: raw.scanlator.clone(),
            language: raw.language.clone(),
            date_upload: raw.date_upload,
            date_fetch: 0,
            read: false,
            bookmark: false,
            last_page_read: 0,
            provenance: raw.provenance.clone(),
            unavailable: raw.unavailable,
        }
    }

    /// Provider chapter id, falling back to the url for records saved without one.
    pub fn effective_provider_id(&self) -> String {
        if self.provider_chapter_id.is_empty() {
            derive_provider_chapter_id(&self.url)
        } else {
            self.provider_chapter_id.clone()
        }
    }

    /// Number bucket used for dedup and readd detection.
    pub fn bucket(&self) -> Option<i64> {
        chapter_bucket(self.chapter_number)
    }

    /// Splits the scanlator field into its groups.
    pub fn scanlator_groups(&self) -> Vec<&str> {
        scanlator_groups(self.scanlator.as_deref())
    }

    /// Copies provider-owned metadata from a fetched record.
    ///
    /// `id`, `read`, `bookmark`, `last_page_read`, `date_fetch` and `source_order`
    /// are left untouched.
    pub fn copy_metadata_from(&mut self, other: &ChapterRecord) {
        self.scanlator = other.scanlator.clone();
        self.name = other.name.clone();
        self.volume = other.volume;
        self.chapter_txt = other.chapter_txt.clone();
        self.chapter_title = other.chapter_title.clone();
        self.date_upload = other.date_upload;
        self.chapter_number = other.chapter_number;
        self.provider_chapter_id = other.provider_chapter_id.clone();
        self.language = other.language.clone();
        self.unavailable = other.unavailable;
    }

    /// Returns true if any provider-owned field differs from `other`.
    pub fn metadata_differs(&self, other: &ChapterRecord) -> bool {
        self.scanlator != other.scanlator
            || self.name != other.name
            || self.volume != other.volume
            || self.chapter_txt != other.chapter_txt
            || self.chapter_title != other.chapter_title
            || self.date_upload != other.date_upload
            || self.chapter_number != other.chapter_number
            || self.provider_chapter_id != other.provider_chapter_id
            || self.language != other.language
            || self.unavailable != other.unavailable
    }
}

/// A title in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Manga {
    pub id: i64,
    pub title: String,
    /// Original language of the title ("ja", "ko", ...).
    pub language: Option<String>,
    /// Source id of the merged provider, if one is configured.
    pub merged_source: Option<String>,
    /// Epoch millis of the newest chapter upload.
    pub last_update: i64,
    /// Estimated epoch millis of the next chapter.
    pub next_update: i64,
    pub display: ChapterDisplaySettings,
}

impl Manga {
    /// Returns true if a merged source is configured for this title.
    pub fn is_merged(&self) -> bool {
        self.merged_source.is_some()
    }
}

/// Reading progress held by an external tracking service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrackRecord {
    pub manga_id: i64,
    /// Identity of the tracker service.
    pub sync_id: i32,
    /// Identity of the title on the tracker.
    pub media_id: i64,
    pub title: String,
    pub last_chapter_read: f32,
    pub total_chapters: i32,
}

impl TrackRecord {
    /// Key used by the pending-update queue.
    pub fn pending_key(&self) -> String {
        format!("{}:{}", self.manga_id, self.sync_id)
    }
}

/// Floors a recognized chapter number into its bucket.
///
/// 1.4 and 1.9 share bucket 1.
pub fn chapter_bucket(number: Option<f32>) -> Option<i64> {
    number
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n.floor() as i64)
}

/// Derives a provider chapter id from the last path segment of a url.
pub fn derive_provider_chapter_id(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Splits a scanlator field into trimmed, non-empty groups.
pub fn scanlator_groups(scanlator: Option<&str>) -> Vec<&str> {
    scanlator
        .map(|s| {
            s.split(SCANLATOR_SEPARATOR)
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
