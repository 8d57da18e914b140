//! Deduplication of primary and merged provider chapters.

use super::{MatchPolicy, sort_canonical};
use crate::config::MergeConfig;
use crate::models::{Manga, RawChapter};
use std::collections::HashSet;
use tracing::debug;

/// Merges a primary provider's chapters with a merged provider's chapters.
#[derive(Debug, Clone)]
pub struct ChapterDeduplicator {
    number_only_languages: Vec<String>,
}

impl ChapterDeduplicator {
    /// Creates a deduplicator from the merge configuration.
    pub fn new(config: &MergeConfig) -> Self {
        Self {
            number_only_languages: config.number_only_languages.clone(),
        }
    }

    /// Returns the canonical chapter list for a title.
    ///
    /// Without a merged source the primary entries come back untouched and
    /// merged entries are dropped. Otherwise merged entries whose bucket is
    /// already covered by a primary entry are dropped, the rest are appended,
    /// and the result is sorted into canonical order. Entries with an
    /// unrecognized number are never matched and always kept.
    pub fn dedupe(&self, manga: &Manga, chapters: Vec<RawChapter>) -> Vec<RawChapter> {
        let (primary, merged): (Vec<RawChapter>, Vec<RawChapter>) = chapters
            .into_iter()
            .partition(|c| !c.provenance.is_merged());

        if !manga.is_merged() {
            return primary;
        }

        let policy = self.policy_for(manga, &primary, &merged);
        let primary_keys: HashSet<_> = primary.iter().filter_map(|c| policy.key(c)).collect();

        let mut result = primary;
        let mut dropped = 0usize;
        for chapter in merged {
            match policy.key(&chapter) {
                Some(key) if primary_keys.contains(&key) => dropped += 1,
                _ => result.push(chapter),
            }
        }

        debug!(
            manga_id = manga.id,
            ?policy,
            dropped,
            total = result.len(),
            "deduplicated merged chapters"
        );

        sort_canonical(&mut result, policy);
        result
    }

    /// Selects the match policy for a title.
    pub fn policy_for(
        &self,
        manga: &Manga,
        primary: &[RawChapter],
        merged: &[RawChapter],
    ) -> MatchPolicy {
        MatchPolicy::select(manga, primary, merged, &self.number_only_languages)
    }
}

impl Default for ChapterDeduplicator {
    fn default() -> Self {
        Self::new(&MergeConfig::default())
    }
}
