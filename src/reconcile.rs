//! Chapter reconciliation.
//!
//! Diffs a canonical fetched chapter list against the persisted chapters of
//! a manga. [`compute_plan`] is pure and decides every insert, update and
//! delete; [`apply_plan`] writes a plan to a [`ChapterStore`] inside a single
//! transaction. [`Reconciler`] ties recognition, deduplication and both
//! steps together.

use crate::error::ReconcileError;
use crate::merge::ChapterDeduplicator;
use crate::models::{ChapterRecord, Manga, RawChapter};
use crate::recognition::ChapterNumberRecognizer;
use crate::store::ChapterStore;
use chrono::Utc;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Number of newest uploads used to estimate the next update.
const SCHEDULE_SAMPLE: usize = 4;

/// Extra inputs for a reconcile pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// The merged provider failed to fetch; keep its persisted chapters.
    pub merged_fetch_failed: bool,
    /// Urls the merged provider reports as read.
    pub read_from_merged: HashSet<String>,
}

/// Position of a canonical entry in the plan.
#[derive(Debug, Clone, PartialEq)]
enum OrderSlot {
    /// A persisted chapter, carrying its new source order.
    Existing(ChapterRecord),
    /// Index into [`ReconcilePlan::inserts`].
    Inserted(usize),
}

/// Everything a reconcile pass will write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// New chapters, in canonical order, with fetch dates assigned.
    pub inserts: Vec<ChapterRecord>,
    /// Persisted chapters with refreshed metadata and preserved user state.
    pub updates: Vec<ChapterRecord>,
    /// Persisted chapters no longer listed by any provider.
    pub deletes: Vec<ChapterRecord>,
    /// Indices into `inserts` of chapters that replace a deleted chapter
    /// with the same number bucket.
    pub readded: BTreeSet<usize>,
    order: Vec<OrderSlot>,
    order_changed: bool,
}

impl ReconcilePlan {
    /// Returns true if the plan inserts, updates and deletes nothing.
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Returns true if applying the plan would not change the store at all.
    pub fn is_noop(&self) -> bool {
        self.is_empty() && !self.order_changed
    }

    /// Number buckets claimed by readded chapters.
    fn readded_buckets(&self) -> HashSet<i64> {
        self.readded
            .iter()
            .filter_map(|&i| self.inserts.get(i).and_then(ChapterRecord::bucket))
            .collect()
    }

    /// Deleted chapters that weren't replaced by a readded chapter.
    pub fn removed_chapters(&self) -> Vec<ChapterRecord> {
        let readded = self.readded_buckets();
        self.deletes
            .iter()
            .filter(|c| c.bucket().is_none_or(|b| !readded.contains(&b)))
            .cloned()
            .collect()
    }

    /// Inserted chapters worth surfacing as new: not readded, not unavailable.
    pub fn new_chapters(&self) -> Vec<ChapterRecord> {
        self.inserts
            .iter()
            .enumerate()
            .filter(|(i, c)| !self.readded.contains(i) && !c.unavailable)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

/// Result of a reconcile pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// Chapters the user hasn't seen before.
    pub new_chapters: Vec<ChapterRecord>,
    /// Chapters that disappeared for good.
    pub removed_chapters: Vec<ChapterRecord>,
    /// Rows written by the pass, readded chapters included.
    pub inserted: usize,
    /// Persisted chapters whose metadata was refreshed.
    pub updated: usize,
    /// Persisted chapters deleted, including those later readded.
    pub deleted: usize,
}

/// How a canonical entry is matched against persisted chapters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Identity {
    Url(String),
    ProviderId(String),
}

impl Identity {
    fn of(chapter: &ChapterRecord) -> Self {
        if chapter.provenance.is_merged() {
            Identity::Url(chapter.url.clone())
        } else {
            Identity::ProviderId(chapter.effective_provider_id())
        }
    }
}

/// Inserts `idx` under `key`, letting a read chapter win over an unread duplicate.
fn index_preferring_read<K: Eq + Hash>(
    map: &mut HashMap<K, usize>,
    key: K,
    idx: usize,
    persisted: &[ChapterRecord],
) {
    match map.entry(key) {
        Entry::Vacant(entry) => {
            entry.insert(idx);
        }
        Entry::Occupied(mut entry) => {
            if persisted[idx].read && !persisted[*entry.get()].read {
                entry.insert(idx);
            }
        }
    }
}

/// Computes the changes needed to bring `persisted` in line with `canonical`.
///
/// `canonical` must already carry recognized chapter numbers and be in
/// canonical order; an entry's position becomes its `source_order`. `now`
/// seeds the fetch dates of inserted chapters.
pub fn compute_plan(
    persisted: &[ChapterRecord],
    canonical: &[RawChapter],
    manga: &Manga,
    now: i64,
    options: &ReconcileOptions,
) -> ReconcilePlan {
    let persisted: Vec<ChapterRecord> = persisted
        .iter()
        .filter(|c| {
            if c.id.is_none() {
                warn!(url = %c.url, "ignoring persisted chapter without id");
            }
            c.id.is_some()
        })
        .cloned()
        .collect();

    // Canonical entries, first occurrence of each identity and url only.
    let mut seen_identities = HashSet::new();
    let mut seen_urls = HashSet::new();
    let fetched: Vec<ChapterRecord> = canonical
        .iter()
        .map(|raw| ChapterRecord::from_raw(raw, manga.id, 0))
        .filter(|c| {
            let fresh = seen_identities.insert(Identity::of(c)) && seen_urls.insert(c.url.clone());
            if !fresh {
                debug!(url = %c.url, "skipping duplicate canonical chapter");
            }
            fresh
        })
        .collect();

    let mut by_url: HashMap<&str, usize> = HashMap::new();
    let mut by_provider_id: HashMap<String, usize> = HashMap::new();
    for (idx, stored) in persisted.iter().enumerate() {
        index_preferring_read(&mut by_url, stored.url.as_str(), idx, &persisted);
        if !stored.provenance.is_merged() {
            index_preferring_read(
                &mut by_provider_id,
                stored.effective_provider_id(),
                idx,
                &persisted,
            );
        }
    }

    let mut matched = vec![false; persisted.len()];
    let matches: Vec<Option<usize>> = fetched
        .iter()
        .map(|chapter| {
            let hit = match Identity::of(chapter) {
                Identity::Url(url) => by_url.get(url.as_str()).copied(),
                Identity::ProviderId(id) => by_provider_id.get(&id).copied(),
            };
            hit.filter(|&idx| !std::mem::replace(&mut matched[idx], true))
        })
        .collect();

    let mut plan = ReconcilePlan::default();

    for (idx, stored) in persisted.iter().enumerate() {
        if matched[idx] {
            continue;
        }
        if options.merged_fetch_failed && stored.provenance.is_merged() {
            continue;
        }
        plan.deletes.push(stored.clone());
    }

    let deleted_ids: HashSet<Option<i64>> = plan.deletes.iter().map(|c| c.id).collect();
    let retained_urls: HashSet<&str> = persisted
        .iter()
        .filter(|c| !deleted_ids.contains(&c.id))
        .map(|c| c.url.as_str())
        .collect();

    let mut position = 0i32;
    for (mut chapter, hit) in fetched.into_iter().zip(matches) {
        match hit {
            Some(idx) => {
                let stored = &persisted[idx];
                let merged_read = !stored.read && options.read_from_merged.contains(&stored.url);

                let mut current = stored.clone();
                if stored.metadata_differs(&chapter) || merged_read {
                    current.copy_metadata_from(&chapter);
                    if merged_read {
                        current.read = true;
                    }
                    current.source_order = position;
                    plan.updates.push(current.clone());
                }

                if stored.source_order != position {
                    plan.order_changed = true;
                }
                current.source_order = position;
                plan.order.push(OrderSlot::Existing(current));
            }
            None => {
                if retained_urls.contains(chapter.url.as_str()) {
                    warn!(
                        url = %chapter.url,
                        "fetched chapter collides with a retained chapter url, skipping"
                    );
                    continue;
                }
                chapter.source_order = position;
                chapter.read = options.read_from_merged.contains(&chapter.url);
                plan.inserts.push(chapter);
                plan.order.push(OrderSlot::Inserted(plan.inserts.len() - 1));
            }
        }
        position += 1;
    }

    // Fetch dates grow towards the front of the list, so the newest
    // chapter (first) gets the latest date.
    for (offset, chapter) in plan.inserts.iter_mut().rev().enumerate() {
        chapter.date_fetch = now + offset as i64;
    }

    mark_readded(&mut plan);

    debug!(
        manga_id = manga.id,
        inserts = plan.inserts.len(),
        updates = plan.updates.len(),
        deletes = plan.deletes.len(),
        readded = plan.readded.len(),
        "computed reconcile plan"
    );

    plan
}

/// Flags inserts that take the place of a deleted chapter with the same bucket.
fn mark_readded(plan: &mut ReconcilePlan) {
    let mut deleted_numbers = BTreeSet::new();
    let mut deleted_read_numbers = BTreeSet::new();
    let mut earliest_fetch: HashMap<i64, i64> = HashMap::new();

    for deleted in &plan.deletes {
        let Some(bucket) = deleted.bucket() else {
            continue;
        };
        deleted_numbers.insert(bucket);
        if deleted.read {
            deleted_read_numbers.insert(bucket);
        }
        earliest_fetch
            .entry(bucket)
            .and_modify(|d| *d = (*d).min(deleted.date_fetch))
            .or_insert(deleted.date_fetch);
    }

    for (idx, chapter) in plan.inserts.iter_mut().enumerate() {
        let Some(bucket) = chapter.bucket() else {
            continue;
        };
        if deleted_read_numbers.contains(&bucket) {
            chapter.read = true;
        }
        if deleted_numbers.contains(&bucket) {
            // Keep the original fetch date so the chapter doesn't resurface as an update.
            if let Some(&date) = earliest_fetch.get(&bucket) {
                chapter.date_fetch = date;
            }
            plan.readded.insert(idx);
        }
    }
}

/// Estimates `(last_update, next_update)` for a manga from its chapters.
///
/// `last_update` is the newest upload date, or `now` when no chapter has one
/// and chapters were inserted. `next_update` adds the average gap between the
/// newest uploads to the newest upload.
pub fn estimate_schedule(
    chapters: &[ChapterRecord],
    manga: &Manga,
    inserted: bool,
    now: i64,
) -> (i64, i64) {
    let mut uploads: Vec<i64> = chapters.iter().map(|c| c.date_upload).collect();
    uploads.sort_unstable_by(|a, b| b.cmp(a));
    uploads.truncate(SCHEDULE_SAMPLE);

    let newest = uploads.first().copied().unwrap_or(0);

    let next_update = if uploads.len() > 1 {
        let total = uploads
            .windows(2)
            .fold(0i64, |acc, w| acc.saturating_add(w[0].saturating_sub(w[1])));
        newest.saturating_add(total / (uploads.len() as i64 - 1))
    } else {
        manga.next_update
    };

    let last_update = if newest > 0 {
        newest
    } else if inserted {
        now
    } else {
        manga.last_update
    };

    (last_update, next_update)
}

/// Writes a plan to the store inside one transaction.
///
/// Deletes go first, then inserts (which receive their ids), then updates,
/// then the source order of every canonical chapter, then the manga's
/// schedule. Any failure rolls the whole transaction back.
pub fn apply_plan<S: ChapterStore>(
    store: &mut S,
    manga: &Manga,
    plan: ReconcilePlan,
    now: i64,
) -> Result<ReconcileOutcome, ReconcileError> {
    store.run_in_transaction(|store| write_plan(store, manga, plan, now))
}

fn write_plan<S: ChapterStore>(
    store: &mut S,
    manga: &Manga,
    mut plan: ReconcilePlan,
    now: i64,
) -> Result<ReconcileOutcome, ReconcileError> {
    if !plan.deletes.is_empty() {
        store.delete_chapters(&plan.deletes)?;
    }

    if !plan.inserts.is_empty() {
        let ids = store.insert_chapters(&plan.inserts)?;
        if ids.len() != plan.inserts.len() {
            return Err(ReconcileError::IdMismatch {
                expected: plan.inserts.len(),
                assigned: ids.len(),
            });
        }
        for (chapter, id) in plan.inserts.iter_mut().zip(ids) {
            chapter.id = Some(id);
        }
    }

    if !plan.updates.is_empty() {
        store.update_chapters(&plan.updates)?;
    }

    let ordered: Vec<ChapterRecord> = plan
        .order
        .iter()
        .filter_map(|slot| match slot {
            OrderSlot::Existing(chapter) => Some(chapter.clone()),
            OrderSlot::Inserted(i) => plan.inserts.get(*i).cloned(),
        })
        .collect();
    store.fix_source_order(&ordered)?;

    let chapters = store.chapters(manga.id)?;
    let (last_update, next_update) =
        estimate_schedule(&chapters, manga, !plan.inserts.is_empty(), now);
    store.update_manga_schedule(manga.id, last_update, next_update)?;

    Ok(ReconcileOutcome {
        new_chapters: plan.new_chapters(),
        removed_chapters: plan.removed_chapters(),
        inserted: plan.inserts.len(),
        updated: plan.updates.len(),
        deleted: plan.deletes.len(),
    })
}

/// Recognizes, deduplicates and reconciles fetched chapters.
pub struct Reconciler {
    recognizer: Arc<dyn ChapterNumberRecognizer>,
    deduplicator: ChapterDeduplicator,
}

impl Reconciler {
    /// Creates a reconciler.
    pub fn new(
        recognizer: Arc<dyn ChapterNumberRecognizer>,
        deduplicator: ChapterDeduplicator,
    ) -> Self {
        Self {
            recognizer,
            deduplicator,
        }
    }

    /// Runs the recognizer over every fetched chapter.
    pub fn recognize(&self, manga: &Manga, chapters: &mut [RawChapter]) {
        for chapter in chapters.iter_mut() {
            self.recognizer.parse(chapter, manga);
        }
    }

    /// Turns the raw lists of every provider into the canonical list.
    pub fn canonicalize(&self, manga: &Manga, mut chapters: Vec<RawChapter>) -> Vec<RawChapter> {
        self.recognize(manga, &mut chapters);
        self.deduplicator.dedupe(manga, chapters)
    }

    /// Canonicalizes raw provider output and reconciles it with the store.
    pub fn sync_with_sources<S: ChapterStore>(
        &self,
        store: &mut S,
        manga_id: i64,
        raw: Vec<RawChapter>,
        options: &ReconcileOptions,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let manga = store.manga(manga_id)?;
        let canonical = self.canonicalize(&manga, raw);
        self.reconcile_canonical(store, &manga, &canonical, options, now_millis())
    }

    /// Reconciles an already canonical chapter list with the store.
    pub fn reconcile<S: ChapterStore>(
        &self,
        store: &mut S,
        manga_id: i64,
        canonical: Vec<RawChapter>,
        options: &ReconcileOptions,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconcile_at(store, manga_id, canonical, options, now_millis())
    }

    /// Like [`Reconciler::reconcile`] with an explicit clock.
    pub fn reconcile_at<S: ChapterStore>(
        &self,
        store: &mut S,
        manga_id: i64,
        mut canonical: Vec<RawChapter>,
        options: &ReconcileOptions,
        now: i64,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let manga = store.manga(manga_id)?;
        self.recognize(&manga, &mut canonical);
        self.reconcile_canonical(store, &manga, &canonical, options, now)
    }

    fn reconcile_canonical<S: ChapterStore>(
        &self,
        store: &mut S,
        manga: &Manga,
        canonical: &[RawChapter],
        options: &ReconcileOptions,
        now: i64,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let persisted = store.chapters(manga.id)?;
        let plan = compute_plan(&persisted, canonical, manga, now, options);

        if plan.is_noop() {
            // Nothing to write, but keep the schedule fresh.
            let schedule = estimate_schedule(&persisted, manga, false, now);
            if schedule != (manga.last_update, manga.next_update) {
                store.update_manga_schedule(manga.id, schedule.0, schedule.1)?;
            }
            debug!(manga_id = manga.id, "chapters already up to date");
            return Ok(ReconcileOutcome::default());
        }

        let outcome = apply_plan(store, manga, plan, now)?;
        info!(
            manga_id = manga.id,
            new = outcome.new_chapters.len(),
            removed = outcome.removed_chapters.len(),
            inserted = outcome.inserted,
            updated = outcome.updated,
            deleted = outcome.deleted,
            "reconciled chapters"
        );
        Ok(outcome)
    }
}

/// Current time in epoch millis.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
