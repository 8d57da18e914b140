//! Track synchronization engine.
//!
//! Owns the debounce registry for "mark as read" pushes and fans progress
//! out to every logged-in tracker. Tracker calls never run while a store
//! lock is held.

use super::{
    Connectivity, PendingTrackingStore, PendingUpdate, PushReport, TrackerFailure,
    TrackerRegistry, TrackerService,
};
use crate::config::TrackingConfig;
use crate::error::{SyncError, TrackerError};
use crate::models::{ChapterRecord, TrackRecord};
use crate::store::TrackStore;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A delayed push waiting for its debounce window to close.
struct PendingJob {
    target: f32,
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner<S> {
    store: Mutex<S>,
    trackers: TrackerRegistry,
    connectivity: Arc<dyn Connectivity>,
    pending: Mutex<PendingTrackingStore>,
    config: TrackingConfig,
    jobs: Mutex<HashMap<i64, PendingJob>>,
    generation: AtomicU64,
}

/// Result of a two-way sync with one tracker.
#[derive(Debug, Clone, Default)]
pub struct TwoWaySync {
    /// Local chapters newly marked read from the remote progress.
    pub marked_read: Vec<ChapterRecord>,
    /// Progress sent to the tracker, or the remote's own progress when the
    /// local read run is empty or behind it and nothing was sent.
    pub last_chapter_read: f32,
    /// The track as stored by the tracker, when the push succeeded.
    pub pushed: Option<TrackRecord>,
    pub failure: Option<TrackerFailure>,
}

/// Keeps local reading progress and tracker services in step.
pub struct TrackSyncEngine<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for TrackSyncEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: TrackStore + Send + 'static> TrackSyncEngine<S> {
    /// Creates an engine over a store, the configured trackers and the
    /// offline queue.
    pub fn new(
        store: S,
        trackers: TrackerRegistry,
        connectivity: Arc<dyn Connectivity>,
        pending: PendingTrackingStore,
        config: TrackingConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(store),
                trackers,
                connectivity,
                pending: Mutex::new(pending),
                config,
                jobs: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Runs `f` with exclusive access to the store.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut store = self.inner.store.lock();
        f(&mut *store)
    }

    /// Returns the updates waiting in the offline queue.
    pub fn pending_updates(&self) -> Vec<PendingUpdate> {
        self.inner.pending.lock().entries()
    }

    /// Returns the target of the delayed push scheduled for a manga.
    pub fn scheduled_target(&self, manga_id: i64) -> Option<f32> {
        self.inner
            .jobs
            .lock()
            .get(&manga_id)
            .filter(|job| !job.handle.is_finished())
            .map(|job| job.target)
    }

    /// Reconciles local read state with a tracker in both directions.
    ///
    /// Every local chapter numbered at or below the remote progress is
    /// marked read and persisted. Then the end of the contiguous read run,
    /// counted from the lowest chapter number, is pushed to the tracker.
    /// Nothing is pushed when that run is empty or ends below the remote
    /// progress. A failed push is logged and reported, never retried here.
    pub async fn sync_two_way(
        &self,
        chapters: &[ChapterRecord],
        remote: &TrackRecord,
        service: &dyn TrackerService,
    ) -> Result<TwoWaySync, SyncError> {
        let mut sorted: Vec<ChapterRecord> = chapters
            .iter()
            .filter(|c| c.chapter_number.is_some())
            .cloned()
            .collect();
        sorted.sort_by(|a, b| {
            let a = a.chapter_number.unwrap_or(f32::NEG_INFINITY);
            let b = b.chapter_number.unwrap_or(f32::NEG_INFINITY);
            a.total_cmp(&b)
        });

        let mut marked_read = Vec::new();
        for chapter in sorted.iter_mut() {
            let covered = chapter
                .chapter_number
                .is_some_and(|n| n <= remote.last_chapter_read);
            if covered && !chapter.read {
                chapter.read = true;
                marked_read.push(chapter.clone());
            }
        }

        if !marked_read.is_empty() {
            self.inner
                .store
                .lock()
                .update_chapters_progress(&marked_read)?;
            info!(
                manga_id = remote.manga_id,
                tracker = service.name(),
                count = marked_read.len(),
                "marked chapters read from tracker progress"
            );
        }

        // Only count uninterrupted reading.
        let run_end = sorted
            .iter()
            .take_while(|c| c.read)
            .last()
            .and_then(|c| c.chapter_number);

        let mut outcome = TwoWaySync {
            marked_read,
            last_chapter_read: remote.last_chapter_read,
            ..Default::default()
        };

        let Some(last_chapter_read) = run_end.filter(|&n| n >= remote.last_chapter_read) else {
            debug!(
                manga_id = remote.manga_id,
                tracker = service.name(),
                local = ?run_end,
                remote = remote.last_chapter_read,
                "local progress is behind the tracker, not pushing"
            );
            return Ok(outcome);
        };

        let mut track = remote.clone();
        track.last_chapter_read = last_chapter_read;
        outcome.last_chapter_read = last_chapter_read;

        match service.update(&track, false).await {
            Ok(stored) => {
                self.inner.store.lock().upsert_track(&stored)?;
                outcome.pushed = Some(stored);
            }
            Err(error) => {
                warn!(
                    manga_id = track.manga_id,
                    tracker = service.name(),
                    error = %error,
                    "two-way tracker sync failed"
                );
                outcome.failure = Some(failure_for(service, &track, error));
            }
        }

        Ok(outcome)
    }

    /// Schedules a delayed push after chapters were marked read.
    ///
    /// At most one job is pending per manga. A call replaces the pending job
    /// only when its target is higher; otherwise it is ignored. Returns true
    /// if a job was scheduled. Must be called from within a tokio runtime.
    pub fn schedule_mark_as_read(&self, manga_id: i64, new_last_chapter: f32) -> bool {
        if !self.inner.config.update_on_mark_read {
            debug!(manga_id, "tracker updates on mark-read are disabled");
            return false;
        }

        let mut jobs = self.inner.jobs.lock();
        if let Some(job) = jobs.get(&manga_id) {
            if !job.handle.is_finished() && new_last_chapter <= job.target {
                debug!(
                    manga_id,
                    pending = job.target,
                    requested = new_last_chapter,
                    "keeping pending tracker update"
                );
                return false;
            }
        }
        if let Some(job) = jobs.remove(&manga_id) {
            job.handle.abort();
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let delay = self.inner.config.debounce_delay();
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.finish_job(manga_id, generation);

            match engine.push_progress(manga_id, new_last_chapter, true).await {
                Ok(report) => debug!(
                    manga_id,
                    updated = report.updated.len(),
                    queued = report.queued.len(),
                    failed = report.failures.len(),
                    "delayed tracker update done"
                ),
                Err(e) => warn!(manga_id, error = %e, "delayed tracker update failed"),
            }
        });

        jobs.insert(
            manga_id,
            PendingJob {
                target: new_last_chapter,
                generation,
                handle,
            },
        );
        true
    }

    /// Drops a job from the registry once its delay has elapsed.
    fn finish_job(&self, manga_id: i64, generation: u64) {
        let mut jobs = self.inner.jobs.lock();
        if jobs
            .get(&manga_id)
            .is_some_and(|job| job.generation == generation)
        {
            jobs.remove(&manga_id);
        }
    }

    /// Aborts every scheduled push.
    pub fn cancel_all(&self) {
        for (_, job) in self.inner.jobs.lock().drain() {
            job.handle.abort();
        }
    }

    /// Pushes new progress to every logged-in tracker of a manga.
    ///
    /// Trackers already at or past `new_chapter_read` are skipped. When the
    /// network is down and `retry_when_offline` is set, updates go to the
    /// durable queue instead. Each tracker fails on its own; failures are
    /// logged and collected in the report.
    pub async fn push_progress(
        &self,
        manga_id: i64,
        new_chapter_read: f32,
        retry_when_offline: bool,
    ) -> Result<PushReport, SyncError> {
        let tracks = self.inner.store.lock().tracks(manga_id)?;
        let online = self.inner.connectivity.is_online();

        let mut report = PushReport::default();
        let mut calls = Vec::new();
        for mut track in tracks {
            let Some(service) = self.inner.trackers.logged_in(track.sync_id) else {
                debug!(key = %track.pending_key(), "no logged-in tracker, skipping");
                continue;
            };
            if new_chapter_read <= track.last_chapter_read {
                continue;
            }
            track.last_chapter_read = new_chapter_read;

            if !online && retry_when_offline {
                self.inner
                    .pending
                    .lock()
                    .enqueue(manga_id, track.sync_id, new_chapter_read);
                report.queued.push(track);
                continue;
            }

            calls.push(async move {
                let result = service.update(&track, true).await;
                (service, track, result)
            });
        }

        if !report.queued.is_empty() {
            self.inner.pending.lock().save()?;
            info!(
                manga_id,
                count = report.queued.len(),
                "offline, queued tracker updates"
            );
        }

        for (service, track, result) in join_all(calls).await {
            self.record(&mut report, service.as_ref(), &track, result)?;
        }

        Ok(report)
    }

    /// Pulls the remote state of every logged-in tracker of a manga and
    /// stores it.
    pub async fn refresh_tracks(&self, manga_id: i64) -> Result<PushReport, SyncError> {
        let tracks = self.inner.store.lock().tracks(manga_id)?;

        let calls: Vec<_> = tracks
            .into_iter()
            .filter_map(|track| {
                let service = self.inner.trackers.logged_in(track.sync_id)?;
                Some(async move {
                    let result = service.refresh(&track).await;
                    (service, track, result)
                })
            })
            .collect();

        let mut report = PushReport::default();
        for (service, track, result) in join_all(calls).await {
            self.record(&mut report, service.as_ref(), &track, result)?;
        }
        Ok(report)
    }

    /// Replays queued updates once the network is back.
    ///
    /// Successful pushes leave the queue; failed ones stay for the next
    /// flush, as do entries for unknown or logged-out services, which are
    /// reported as failures. Entries already satisfied by the tracker are
    /// dropped.
    pub async fn flush_pending(&self) -> Result<PushReport, SyncError> {
        let mut report = PushReport::default();
        if !self.inner.connectivity.is_online() {
            debug!("offline, leaving pending tracker updates queued");
            return Ok(report);
        }

        let entries = self.inner.pending.lock().entries();
        let mut calls = Vec::new();
        for entry in entries {
            let track = self
                .inner
                .store
                .lock()
                .tracks(entry.manga_id)?
                .into_iter()
                .find(|t| t.sync_id == entry.sync_id);

            let Some(mut track) = track else {
                debug!(key = %entry.key(), "track no longer exists, dropping pending update");
                self.inner
                    .pending
                    .lock()
                    .remove(entry.manga_id, entry.sync_id);
                continue;
            };
            let Some(service) = self.inner.trackers.get(entry.sync_id) else {
                report.failures.push(TrackerFailure {
                    manga_id: entry.manga_id,
                    sync_id: entry.sync_id,
                    service: format!("tracker {}", entry.sync_id),
                    error: TrackerError::UnknownService(entry.sync_id),
                });
                continue;
            };
            if !service.is_logged_in() {
                let error = TrackerError::NotLoggedIn(service.name().to_string());
                report
                    .failures
                    .push(failure_for(service.as_ref(), &track, error));
                continue;
            }
            if entry.last_chapter_read <= track.last_chapter_read {
                self.inner
                    .pending
                    .lock()
                    .remove(entry.manga_id, entry.sync_id);
                continue;
            }

            track.last_chapter_read = entry.last_chapter_read;
            calls.push(async move {
                let result = service.update(&track, true).await;
                (service, track, result)
            });
        }

        for (service, track, result) in join_all(calls).await {
            let delivered = result.is_ok();
            self.record(&mut report, service.as_ref(), &track, result)?;
            if delivered {
                let mut pending = self.inner.pending.lock();
                // A newer chapter may have been queued meanwhile.
                if pending
                    .get(track.manga_id, track.sync_id)
                    .is_some_and(|queued| queued <= track.last_chapter_read)
                {
                    pending.remove(track.manga_id, track.sync_id);
                }
            }
        }

        self.inner.pending.lock().save()?;
        if !report.updated.is_empty() {
            info!(count = report.updated.len(), "flushed pending tracker updates");
        }
        Ok(report)
    }

    /// Stores a successful tracker response or records the failure.
    fn record(
        &self,
        report: &mut PushReport,
        service: &dyn TrackerService,
        track: &TrackRecord,
        result: Result<TrackRecord, TrackerError>,
    ) -> Result<(), SyncError> {
        match result {
            Ok(stored) => {
                self.inner.store.lock().upsert_track(&stored)?;
                report.updated.push(stored);
            }
            Err(error) => {
                warn!(
                    manga_id = track.manga_id,
                    tracker = service.name(),
                    error = %error,
                    "tracker update failed"
                );
                report.failures.push(failure_for(service, track, error));
            }
        }
        Ok(())
    }
}

fn failure_for(
    service: &dyn TrackerService,
    track: &TrackRecord,
    error: TrackerError,
) -> TrackerFailure {
    TrackerFailure {
        manga_id: track.manga_id,
        sync_id: track.sync_id,
        service: service.name().to_string(),
        error,
    }
}
