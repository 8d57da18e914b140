//! Chapter list filtering and sorting.
//!
//! All functions here are pure: they take a chapter list plus the title's
//! display settings and return a new list.

use crate::config::ReaderConfig;
use crate::models::{ChapterRecord, Manga};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Read state filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadFilter {
    #[default]
    All,
    Read,
    Unread,
}

/// Download state filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DownloadFilter {
    #[default]
    All,
    Downloaded,
    NotDownloaded,
}

/// Bookmark filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookmarkFilter {
    #[default]
    All,
    Bookmarked,
    NotBookmarked,
}

/// Availability filter. A downloaded chapter is always available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityFilter {
    #[default]
    All,
    Available,
    Unavailable,
}

/// How excluded scanlator groups hide a multi-group chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanlatorMatch {
    /// Hidden if any of its groups is excluded.
    #[default]
    Any,
    /// Hidden only if all of its groups are excluded.
    All,
}

/// Sort key for chapter lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    SourceOrder,
    ChapterNumber,
    UploadDate,
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "source" | "source_order" => Ok(SortKey::SourceOrder),
            "number" | "chapter_number" => Ok(SortKey::ChapterNumber),
            "upload" | "upload_date" => Ok(SortKey::UploadDate),
            other => Err(format!("unknown sort key: {}", other)),
        }
    }
}

/// Per-title chapter list settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChapterDisplaySettings {
    pub read_filter: ReadFilter,
    pub download_filter: DownloadFilter,
    pub bookmark_filter: BookmarkFilter,
    pub availability_filter: AvailabilityFilter,
    pub excluded_scanlators: BTreeSet<String>,
    pub excluded_languages: BTreeSet<String>,
    pub sort_key: SortKey,
    pub sort_descending: bool,
}

impl ChapterDisplaySettings {
    /// Returns true if any state filter is enabled.
    pub fn has_state_filters(&self) -> bool {
        self.read_filter != ReadFilter::All
            || self.download_filter != DownloadFilter::All
            || self.bookmark_filter != BookmarkFilter::All
            || self.availability_filter != AvailabilityFilter::All
    }

    /// Comparator for the title's configured sort.
    pub fn comparator(&self) -> impl Fn(&ChapterItem, &ChapterItem) -> Ordering + Copy {
        sort_comparator(self.sort_key, self.sort_descending)
    }

    fn accepts(&self, item: &ChapterItem) -> bool {
        let chapter = &item.chapter;
        let read = match self.read_filter {
            ReadFilter::All => true,
            ReadFilter::Read => chapter.read,
            ReadFilter::Unread => !chapter.read,
        };
        let downloaded = match self.download_filter {
            DownloadFilter::All => true,
            DownloadFilter::Downloaded => item.downloaded,
            DownloadFilter::NotDownloaded => !item.downloaded,
        };
        let bookmarked = match self.bookmark_filter {
            BookmarkFilter::All => true,
            BookmarkFilter::Bookmarked => chapter.bookmark,
            BookmarkFilter::NotBookmarked => !chapter.bookmark,
        };
        let available = match self.availability_filter {
            AvailabilityFilter::All => true,
            AvailabilityFilter::Available => item.is_available(),
            AvailabilityFilter::Unavailable => !item.is_available(),
        };
        read && downloaded && bookmarked && available
    }

    fn excludes_scanlator(&self, chapter: &ChapterRecord, mode: ScanlatorMatch) -> bool {
        if self.excluded_scanlators.is_empty() {
            return false;
        }
        let groups = chapter.scanlator_groups();
        if groups.is_empty() {
            return false;
        }
        let excluded = |g: &&str| self.excluded_scanlators.contains(*g);
        match mode {
            ScanlatorMatch::Any => groups.iter().any(excluded),
            ScanlatorMatch::All => groups.iter().all(excluded),
        }
    }

    fn excludes_language(&self, chapter: &ChapterRecord) -> bool {
        chapter.language.as_deref().is_some_and(|lang| {
            self.excluded_languages
                .iter()
                .any(|excluded| excluded.eq_ignore_ascii_case(lang))
        })
    }
}

/// A chapter as shown in a list, with its local download state.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterItem {
    pub chapter: ChapterRecord,
    pub downloaded: bool,
}

impl ChapterItem {
    pub fn new(chapter: ChapterRecord, downloaded: bool) -> Self {
        Self {
            chapter,
            downloaded,
        }
    }

    /// Readable right now: listed by the provider or already on disk.
    pub fn is_available(&self) -> bool {
        !self.chapter.unavailable || self.downloaded
    }
}

/// Drops chapters from excluded scanlators or languages.
pub fn filter_by_scanlator_and_language(
    chapters: &[ChapterItem],
    manga: &Manga,
    scanlator_match: ScanlatorMatch,
) -> Vec<ChapterItem> {
    let display = &manga.display;
    chapters
        .iter()
        .filter(|item| {
            !display.excludes_scanlator(&item.chapter, scanlator_match)
                && !display.excludes_language(&item.chapter)
        })
        .cloned()
        .collect()
}

/// Applies a title's chapter filters.
///
/// Scanlator and language exclusion always apply. The state filters are
/// combined with AND; when none is enabled the excluded-only list is returned.
pub fn filter_chapters(
    chapters: &[ChapterItem],
    manga: &Manga,
    scanlator_match: ScanlatorMatch,
) -> Vec<ChapterItem> {
    let mut filtered = filter_by_scanlator_and_language(chapters, manga, scanlator_match);
    if manga.display.has_state_filters() {
        filtered.retain(|item| manga.display.accepts(item));
    }
    filtered
}

/// Builds the chapter sequence the reader steps through.
///
/// Unavailable chapters and excluded groups are always dropped. Reader
/// settings then skip read chapters, apply the title's filters, and collapse
/// chapters sharing a number. The `selected` chapter is always part of the
/// result, even when a filter would drop it.
pub fn filter_chapters_for_reader<F>(
    chapters: &[ChapterItem],
    manga: &Manga,
    reader: &ReaderConfig,
    scanlator_match: ScanlatorMatch,
    comparator: F,
    selected: Option<&ChapterItem>,
) -> Vec<ChapterItem>
where
    F: Fn(&ChapterItem, &ChapterItem) -> Ordering,
{
    let available: Vec<ChapterItem> = chapters
        .iter()
        .filter(|item| item.is_available())
        .cloned()
        .collect();
    let mut filtered = filter_by_scanlator_and_language(&available, manga, scanlator_match);

    if reader.skip_read {
        filtered.retain(|item| !item.chapter.read);
    }

    if reader.skip_filtered {
        filtered = filter_chapters(&filtered, manga, scanlator_match);
    }

    filtered.sort_by(&comparator);

    if reader.skip_duplicates {
        filtered = partition_by_number(filtered)
            .into_iter()
            .filter_map(|group| pick_duplicate(group, selected))
            .collect();
    }

    if let Some(selected) = selected.filter(|s| s.chapter.id.is_some()) {
        if !filtered.iter().any(|item| item.chapter.id == selected.chapter.id) {
            debug!(chapter_id = ?selected.chapter.id, "re-adding selected chapter");
            filtered.push(selected.clone());
            filtered.sort_by(&comparator);
        }
    }

    filtered
}

/// Splits a sorted list into runs of chapters sharing a chapter number.
///
/// Unrecognized numbers always form their own run; two known, different
/// volumes split a run too.
fn partition_by_number(chapters: Vec<ChapterItem>) -> Vec<Vec<ChapterItem>> {
    let mut runs: Vec<Vec<ChapterItem>> = Vec::new();
    for item in chapters {
        let joins_previous = runs
            .last()
            .and_then(|run| run.last())
            .is_some_and(|prev| same_number(&prev.chapter, &item.chapter));
        match runs.last_mut() {
            Some(run) if joins_previous => run.push(item),
            _ => runs.push(vec![item]),
        }
    }
    runs
}

fn same_number(a: &ChapterRecord, b: &ChapterRecord) -> bool {
    let volumes_conflict = matches!((a.volume, b.volume), (Some(x), Some(y)) if x != y);
    a.chapter_number.is_some() && a.chapter_number == b.chapter_number && !volumes_conflict
}

/// Keeps one chapter of a run: the selected one, else one from the selected
/// chapter's scanlator, else the one sharing the most groups with it.
fn pick_duplicate(group: Vec<ChapterItem>, selected: Option<&ChapterItem>) -> Option<ChapterItem> {
    let Some(selected) = selected else {
        return group.into_iter().next();
    };

    if let Some(pos) = group
        .iter()
        .position(|item| item.chapter.id.is_some() && item.chapter.id == selected.chapter.id)
    {
        return group.into_iter().nth(pos);
    }

    if let Some(pos) = group
        .iter()
        .position(|item| item.chapter.scanlator == selected.chapter.scanlator)
    {
        return group.into_iter().nth(pos);
    }

    let wanted: HashSet<&str> = selected.chapter.scanlator_groups().into_iter().collect();
    let mut best: Option<(usize, usize)> = None;
    for (pos, item) in group.iter().enumerate() {
        let overlap = item
            .chapter
            .scanlator_groups()
            .iter()
            .filter(|g| wanted.contains(*g))
            .count();
        if best.is_none_or(|(_, most)| overlap > most) {
            best = Some((pos, overlap));
        }
    }
    best.and_then(|(pos, _)| group.into_iter().nth(pos))
}

fn compare_numbers(a: Option<f32>, b: Option<f32>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.total_cmp(&y),
    }
}

/// Returns a comparator for the given key.
///
/// Ascending is reading order: oldest chapter first. Providers list newest
/// first, so ascending source order puts the highest `source_order` first.
/// Unrecognized chapter numbers sort lowest.
pub fn sort_comparator(
    key: SortKey,
    descending: bool,
) -> impl Fn(&ChapterItem, &ChapterItem) -> Ordering + Copy {
    move |a, b| {
        let (a, b) = (&a.chapter, &b.chapter);
        let ordering = match key {
            SortKey::SourceOrder => b.source_order.cmp(&a.source_order),
            SortKey::ChapterNumber => compare_numbers(a.chapter_number, b.chapter_number),
            SortKey::UploadDate => a.date_upload.cmp(&b.date_upload),
        };
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// First unread chapter in ascending `key` order.
pub fn next_unread_chapter(chapters: &[ChapterItem], key: SortKey) -> Option<&ChapterItem> {
    let comparator = sort_comparator(key, false);
    let mut sorted: Vec<&ChapterItem> = chapters.iter().collect();
    sorted.sort_by(|a, b| comparator(*a, *b));
    sorted.into_iter().find(|item| !item.chapter.read)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, number: f32, scanlator: &str) -> ChapterItem {
        ChapterItem::new(
            ChapterRecord {
                id: Some(id),
                manga_id: 1,
                url: format!("/chapter/{}", id),
                source_order: 100 - id as i32,
                chapter_number: Some(number),
                scanlator: (!scanlator.is_empty()).then(|| scanlator.to_string()),
                date_upload: id * 10,
                ..Default::default()
            },
            false,
        )
    }

    fn ids(items: &[ChapterItem]) -> Vec<i64> {
        items.iter().filter_map(|i| i.chapter.id).collect()
    }

    fn manga_with(display: ChapterDisplaySettings) -> Manga {
        Manga {
            id: 1,
            display,
            ..Default::default()
        }
    }

    #[test]
    fn test_downloaded_only_after_scanlator_exclusion() {
        let mut chapters = vec![
            item(1, 1.0, "Group A"),
            item(2, 2.0, "Group B"),
            item(3, 3.0, "Group A"),
            item(4, 4.0, ""),
        ];
        chapters[0].downloaded = true;
        chapters[1].downloaded = true;
        chapters[3].downloaded = true;

        let manga = manga_with(ChapterDisplaySettings {
            download_filter: DownloadFilter::Downloaded,
            excluded_scanlators: ["Group B".to_string()].into(),
            ..Default::default()
        });

        let result = filter_chapters(&chapters, &manga, ScanlatorMatch::Any);
        assert_eq!(ids(&result), vec![1, 4]);
        assert!(result.iter().all(|i| i.downloaded));
    }

    #[test]
    fn test_no_state_filters_returns_excluded_only_list() {
        let chapters = vec![item(1, 1.0, "Group A"), item(2, 2.0, "Group B")];
        let manga = manga_with(ChapterDisplaySettings {
            excluded_scanlators: ["Group A".to_string()].into(),
            ..Default::default()
        });

        assert_eq!(
            ids(&filter_chapters(&chapters, &manga, ScanlatorMatch::Any)),
            vec![2]
        );
    }

    #[test]
    fn test_state_filters_combine_with_and() {
        let mut chapters = vec![
            item(1, 1.0, ""),
            item(2, 2.0, ""),
            item(3, 3.0, ""),
        ];
        chapters[0].chapter.read = true;
        chapters[0].chapter.bookmark = true;
        chapters[1].chapter.read = true;
        chapters[2].chapter.bookmark = true;

        let manga = manga_with(ChapterDisplaySettings {
            read_filter: ReadFilter::Read,
            bookmark_filter: BookmarkFilter::Bookmarked,
            ..Default::default()
        });
        assert_eq!(
            ids(&filter_chapters(&chapters, &manga, ScanlatorMatch::Any)),
            vec![1]
        );

        let manga = manga_with(ChapterDisplaySettings {
            read_filter: ReadFilter::Unread,
            ..Default::default()
        });
        assert_eq!(
            ids(&filter_chapters(&chapters, &manga, ScanlatorMatch::Any)),
            vec![3]
        );
    }

    #[test]
    fn test_scanlator_match_modes() {
        let chapters = vec![item(1, 1.0, "Group A & Group B"), item(2, 2.0, "Group B")];
        let manga = manga_with(ChapterDisplaySettings {
            excluded_scanlators: ["Group B".to_string()].into(),
            ..Default::default()
        });

        assert!(filter_chapters(&chapters, &manga, ScanlatorMatch::Any).is_empty());
        assert_eq!(
            ids(&filter_chapters(&chapters, &manga, ScanlatorMatch::All)),
            vec![1]
        );
    }

    #[test]
    fn test_language_exclusion() {
        let mut chapters = vec![item(1, 1.0, ""), item(2, 2.0, "")];
        chapters[0].chapter.language = Some("EN".to_string());
        chapters[1].chapter.language = Some("fr".to_string());
        let manga = manga_with(ChapterDisplaySettings {
            excluded_languages: ["en".to_string()].into(),
            ..Default::default()
        });

        assert_eq!(
            ids(&filter_chapters(&chapters, &manga, ScanlatorMatch::Any)),
            vec![2]
        );
    }

    #[test]
    fn test_availability_filter() {
        let mut chapters = vec![item(1, 1.0, ""), item(2, 2.0, ""), item(3, 3.0, "")];
        chapters[0].chapter.unavailable = true;
        chapters[1].chapter.unavailable = true;
        chapters[1].downloaded = true;

        let manga = manga_with(ChapterDisplaySettings {
            availability_filter: AvailabilityFilter::Unavailable,
            ..Default::default()
        });
        assert_eq!(
            ids(&filter_chapters(&chapters, &manga, ScanlatorMatch::Any)),
            vec![1]
        );
    }

    #[test]
    fn test_number_descending_is_non_increasing() {
        let mut chapters = vec![
            item(1, 3.0, ""),
            item(2, 10.5, ""),
            item(3, 1.0, ""),
            item(4, 7.0, ""),
        ];
        chapters[2].chapter.chapter_number = None;

        chapters.sort_by(sort_comparator(SortKey::ChapterNumber, true));

        let numbers: Vec<Option<f32>> = chapters.iter().map(|c| c.chapter.chapter_number).collect();
        assert_eq!(numbers, vec![Some(10.5), Some(7.0), Some(3.0), None]);
        assert!(numbers.windows(2).all(|w| compare_numbers(w[0], w[1]) != Ordering::Less));
    }

    #[test]
    fn test_source_order_ascending_is_reading_order() {
        // Lower ids get a higher source order, so they are older.
        let mut chapters = vec![item(3, 3.0, ""), item(1, 1.0, ""), item(2, 2.0, "")];
        chapters.sort_by(sort_comparator(SortKey::SourceOrder, false));
        assert_eq!(ids(&chapters), vec![1, 2, 3]);

        chapters.sort_by(sort_comparator(SortKey::UploadDate, true));
        assert_eq!(ids(&chapters), vec![3, 2, 1]);
    }

    #[test]
    fn test_reader_skip_read_keeps_selected() {
        let mut chapters = vec![item(1, 1.0, ""), item(2, 2.0, ""), item(3, 3.0, "")];
        chapters[0].chapter.read = true;
        chapters[1].chapter.read = true;
        let selected = chapters[1].clone();

        let reader = ReaderConfig {
            skip_read: true,
            ..Default::default()
        };
        let result = filter_chapters_for_reader(
            &chapters,
            &manga_with(ChapterDisplaySettings::default()),
            &reader,
            ScanlatorMatch::Any,
            sort_comparator(SortKey::ChapterNumber, false),
            Some(&selected),
        );

        assert_eq!(ids(&result), vec![2, 3]);
    }

    #[test]
    fn test_reader_drops_unavailable_chapters() {
        let mut chapters = vec![item(1, 1.0, ""), item(2, 2.0, "")];
        chapters[0].chapter.unavailable = true;

        let result = filter_chapters_for_reader(
            &chapters,
            &manga_with(ChapterDisplaySettings::default()),
            &ReaderConfig::default(),
            ScanlatorMatch::Any,
            sort_comparator(SortKey::ChapterNumber, false),
            None,
        );
        assert_eq!(ids(&result), vec![2]);
    }

    #[test]
    fn test_reader_skip_filtered_applies_title_filters() {
        let mut chapters = vec![item(1, 1.0, ""), item(2, 2.0, ""), item(3, 3.0, "")];
        chapters[1].chapter.bookmark = true;
        let manga = manga_with(ChapterDisplaySettings {
            bookmark_filter: BookmarkFilter::NotBookmarked,
            ..Default::default()
        });

        let reader = ReaderConfig {
            skip_filtered: true,
            ..Default::default()
        };
        let result = filter_chapters_for_reader(
            &chapters,
            &manga,
            &reader,
            ScanlatorMatch::Any,
            sort_comparator(SortKey::ChapterNumber, false),
            None,
        );
        assert_eq!(ids(&result), vec![1, 3]);
    }

    #[test]
    fn test_reader_skip_duplicates_prefers_selected_group() {
        let chapters = vec![
            item(1, 1.0, "Group A"),
            item(2, 1.0, "Group B"),
            item(3, 2.0, "Group A"),
            item(4, 2.0, "Group B"),
            item(5, 3.0, "Group C & Group B"),
            item(6, 3.0, "Group D"),
        ];
        let selected = chapters[1].clone();

        let reader = ReaderConfig {
            skip_duplicates: true,
            ..Default::default()
        };
        let result = filter_chapters_for_reader(
            &chapters,
            &manga_with(ChapterDisplaySettings::default()),
            &reader,
            ScanlatorMatch::Any,
            sort_comparator(SortKey::ChapterNumber, false),
            Some(&selected),
        );

        assert_eq!(ids(&result), vec![2, 4, 5]);

        let result = filter_chapters_for_reader(
            &chapters,
            &manga_with(ChapterDisplaySettings::default()),
            &reader,
            ScanlatorMatch::Any,
            sort_comparator(SortKey::ChapterNumber, false),
            None,
        );
        assert_eq!(ids(&result), vec![1, 3, 5]);
    }

    #[test]
    fn test_next_unread_chapter() {
        let mut chapters = vec![item(3, 3.0, ""), item(1, 1.0, ""), item(2, 2.0, "")];
        chapters[1].chapter.read = true;

        let next = next_unread_chapter(&chapters, SortKey::ChapterNumber).unwrap();
        assert_eq!(next.chapter.id, Some(2));

        for c in chapters.iter_mut() {
            c.chapter.read = true;
        }
        assert!(next_unread_chapter(&chapters, SortKey::SourceOrder).is_none());
    }

    #[test]
    fn test_sort_key_from_str() {
        assert_eq!("number".parse::<SortKey>().unwrap(), SortKey::ChapterNumber);
        assert_eq!("upload-date".parse::<SortKey>().unwrap(), SortKey::UploadDate);
        assert!("title".parse::<SortKey>().is_err());
    }
}
