//! Merging chapter lists from a primary and a merged provider.
//!
//! Both the deduplicator and the canonical sorter work on chapter
//! *buckets*: the floored chapter number, optionally paired with the volume.
//! The policy deciding which key applies is chosen once per merge and shared
//! by both steps.

mod dedupe;
mod order;

pub use dedupe::ChapterDeduplicator;
pub use order::sort_canonical;

use crate::models::{Manga, RawChapter, chapter_bucket};

/// Key identifying "the same story chapter" across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChapterKey {
    /// Always `None` under [`MatchPolicy::NumberOnly`].
    pub volume: Option<i32>,
    pub bucket: i64,
}

/// How merged entries are matched against primary entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Match on the number bucket alone.
    NumberOnly,
    /// Match on volume and number bucket.
    VolumeAndNumber,
}

impl MatchPolicy {
    /// Picks the policy for a merged title.
    ///
    /// Number-only applies to languages without reliable volume numbering, and
    /// to titles where every primary entry sits in volume 1 while the merged
    /// provider tags no volumes at all.
    pub fn select(
        manga: &Manga,
        primary: &[RawChapter],
        merged: &[RawChapter],
        number_only_languages: &[String],
    ) -> Self {
        let language_without_volumes = manga.language.as_deref().is_some_and(|lang| {
            number_only_languages
                .iter()
                .any(|l| l.eq_ignore_ascii_case(lang))
        });

        let single_volume_fallback = primary.iter().all(|c| c.volume == Some(1))
            && merged.iter().all(|c| c.volume.is_none());

        if language_without_volumes || single_volume_fallback {
            MatchPolicy::NumberOnly
        } else {
            MatchPolicy::VolumeAndNumber
        }
    }

    /// Returns the bucket key for a chapter, or `None` if its number is unrecognized.
    pub fn key(&self, chapter: &RawChapter) -> Option<ChapterKey> {
        let bucket = chapter_bucket(chapter.chapter_number)?;
        let volume = match self {
            MatchPolicy::NumberOnly => None,
            MatchPolicy::VolumeAndNumber => chapter.volume,
        };
        Some(ChapterKey { volume, bucket })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provenance;

    fn chapter(volume: Option<i32>, number: Option<f32>, provenance: Provenance) -> RawChapter {
        RawChapter {
            volume,
            chapter_number: number,
            provenance,
            ..Default::default()
        }
    }

    fn languages() -> Vec<String> {
        vec!["ko".to_string(), "zh".to_string()]
    }

    #[test]
    fn test_language_selects_number_only() {
        let manga = Manga {
            language: Some("KO".to_string()),
            ..Default::default()
        };
        let primary = vec![chapter(Some(2), Some(1.0), Provenance::Primary)];
        let policy = MatchPolicy::select(&manga, &primary, &[], &languages());
        assert_eq!(policy, MatchPolicy::NumberOnly);
    }

    #[test]
    fn test_single_volume_fallback() {
        let manga = Manga {
            language: Some("ja".to_string()),
            ..Default::default()
        };
        let merged_source = Provenance::Merged("komga".to_string());
        let primary = vec![
            chapter(Some(1), Some(1.0), Provenance::Primary),
            chapter(Some(1), Some(2.0), Provenance::Primary),
        ];
        let merged = vec![chapter(None, Some(3.0), merged_source.clone())];
        assert_eq!(
            MatchPolicy::select(&manga, &primary, &merged, &languages()),
            MatchPolicy::NumberOnly
        );

        let merged = vec![chapter(Some(1), Some(3.0), merged_source)];
        assert_eq!(
            MatchPolicy::select(&manga, &primary, &merged, &languages()),
            MatchPolicy::VolumeAndNumber
        );
    }

    #[test]
    fn test_key_floors_number() {
        let a = chapter(Some(2), Some(1.4), Provenance::Primary);
        let b = chapter(Some(2), Some(1.9), Provenance::Primary);
        assert_eq!(
            MatchPolicy::VolumeAndNumber.key(&a),
            MatchPolicy::VolumeAndNumber.key(&b)
        );
        assert_eq!(
            MatchPolicy::NumberOnly.key(&a),
            Some(ChapterKey {
                volume: None,
                bucket: 1
            })
        );
        assert_eq!(
            MatchPolicy::NumberOnly.key(&chapter(None, None, Provenance::Primary)),
            None
        );
    }
}
