//! Canonical ordering for merged titles.

use super::MatchPolicy;
use crate::models::{RawChapter, chapter_bucket};
use std::cmp::Ordering;

/// Sorts a deduplicated merged list into canonical (newest first) order.
///
/// The sort is stable, so entries sharing a key keep their input order and
/// primary entries stay ahead of merged ones.
pub fn sort_canonical(chapters: &mut [RawChapter], policy: MatchPolicy) {
    match policy {
        MatchPolicy::NumberOnly => chapters.sort_by(compare_bucket_desc),
        MatchPolicy::VolumeAndNumber => chapters.sort_by(|a, b| {
            // Entries without a volume go first.
            b.volume
                .is_none()
                .cmp(&a.volume.is_none())
                .then_with(|| b.volume.cmp(&a.volume))
                .then_with(|| compare_bucket_desc(a, b))
        }),
    }
}

/// Descending by number bucket; unrecognized numbers after recognized ones.
fn compare_bucket_desc(a: &RawChapter, b: &RawChapter) -> Ordering {
    match (
        chapter_bucket(a.chapter_number),
        chapter_bucket(b.chapter_number),
    ) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
