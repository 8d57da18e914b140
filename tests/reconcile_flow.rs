//! End-to-end flow: merge provider output, reconcile into a library file,
//! list it, then push reading progress to a tracker.

use async_trait::async_trait;
use parking_lot::Mutex;
use shiori::config::{Config, TrackingConfig};
use shiori::error::TrackerError;
use shiori::filter::{self, ChapterItem, DownloadFilter, ScanlatorMatch, SortKey};
use shiori::merge::ChapterDeduplicator;
use shiori::models::{Manga, Provenance, RawChapter, TrackRecord};
use shiori::recognition::BasicRecognizer;
use shiori::reconcile::{ReconcileOptions, Reconciler};
use shiori::store::{ChapterStore, MemoryStore, TrackStore};
use shiori::tracking::{
    Connectivity, NetworkState, PendingTrackingStore, TrackSyncEngine, TrackerRegistry,
    TrackerService,
};
use std::sync::Arc;
use tempfile::TempDir;

fn primary(id: &str, volume: i32, label: &str, upload: i64) -> RawChapter {
    RawChapter {
        url: format!("/chapter/{}", id),
        name: label.to_string(),
        chapter_txt: label.to_string(),
        volume: Some(volume),
        scanlator: Some("Group A".to_string()),
        date_upload: upload,
        ..Default::default()
    }
}

fn merged(path: &str, label: &str, upload: i64) -> RawChapter {
    RawChapter {
        url: format!("/komga/{}", path),
        chapter_txt: label.to_string(),
        date_upload: upload,
        provenance: Provenance::Merged("komga".to_string()),
        ..Default::default()
    }
}

fn library() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.put_manga(Manga {
        id: 1,
        title: "Yotsuba".to_string(),
        language: Some("ja".to_string()),
        merged_source: Some("komga".to_string()),
        ..Default::default()
    });
    store
}

#[test]
fn sync_persist_and_list() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("library.json");
    let config = Config::default();
    let reconciler = Reconciler::new(
        Arc::new(BasicRecognizer),
        ChapterDeduplicator::new(&config.merge),
    );

    let mut store = library();
    let fetched = vec![
        primary("p2", 1, "Ch. 2", 2_000),
        primary("p1", 1, "Ch. 1", 1_000),
        merged("1", "Chapter 1", 900),
        merged("3", "Chapter 3", 3_000),
    ];
    let outcome = reconciler
        .sync_with_sources(&mut store, 1, fetched.clone(), &ReconcileOptions::default())
        .unwrap();
    assert_eq!(outcome.new_chapters.len(), 3);
    store.save_to(&path).unwrap();

    // A second run against the reloaded file changes nothing.
    let mut store = MemoryStore::load_from(&path).unwrap();
    let outcome = reconciler
        .sync_with_sources(&mut store, 1, fetched, &ReconcileOptions::default())
        .unwrap();
    assert_eq!(outcome.inserted + outcome.updated + outcome.deleted, 0);

    let chapters = store.chapters(1).unwrap();
    let merged_three = chapters.iter().find(|c| c.url == "/komga/3").unwrap();
    store.set_downloaded(merged_three.id.unwrap(), true);

    let items: Vec<ChapterItem> = store
        .chapters(1)
        .unwrap()
        .into_iter()
        .map(|c| {
            let downloaded = store.is_downloaded(c.id.unwrap());
            ChapterItem::new(c, downloaded)
        })
        .collect();

    let mut sorted = items.clone();
    sorted.sort_by(filter::sort_comparator(SortKey::SourceOrder, false));
    let urls: Vec<&str> = sorted.iter().map(|i| i.chapter.url.as_str()).collect();
    assert_eq!(urls, vec!["/chapter/p1", "/chapter/p2", "/komga/3"]);

    let mut manga = store.manga(1).unwrap();
    manga.display.download_filter = DownloadFilter::Downloaded;
    let downloaded = filter::filter_chapters(&items, &manga, ScanlatorMatch::Any);
    assert_eq!(downloaded.len(), 1);
    assert_eq!(downloaded[0].chapter.url, "/komga/3");

    let next = filter::next_unread_chapter(&items, SortKey::ChapterNumber).unwrap();
    assert_eq!(next.chapter.url, "/chapter/p1");
}

#[test]
fn removed_and_readded_chapters() {
    let reconciler = Reconciler::new(Arc::new(BasicRecognizer), ChapterDeduplicator::default());
    let mut store = library();
    store.put_manga(Manga {
        merged_source: None,
        ..store.manga(1).unwrap()
    });

    reconciler
        .sync_with_sources(
            &mut store,
            1,
            vec![
                primary("c3", 1, "Ch. 3", 3_000),
                primary("c2", 1, "Ch. 2", 2_000),
                primary("c1", 1, "Ch. 1", 1_000),
            ],
            &ReconcileOptions::default(),
        )
        .unwrap();

    // Chapter 2 is reuploaded under a new id; chapter 1 disappears.
    let outcome = reconciler
        .sync_with_sources(
            &mut store,
            1,
            vec![
                primary("c3", 1, "Ch. 3", 3_000),
                primary("c2-v2", 1, "Ch. 2", 2_500),
            ],
            &ReconcileOptions::default(),
        )
        .unwrap();

    assert!(outcome.new_chapters.is_empty());
    assert_eq!(outcome.removed_chapters.len(), 1);
    assert_eq!(outcome.removed_chapters[0].url, "/chapter/c1");
    assert_eq!(store.chapters(1).unwrap().len(), 2);
}

struct RecordingTracker {
    pushes: Mutex<Vec<f32>>,
}

#[async_trait]
impl TrackerService for RecordingTracker {
    fn id(&self) -> i32 {
        2
    }

    fn name(&self) -> &str {
        "recording"
    }

    fn is_logged_in(&self) -> bool {
        true
    }

    async fn update(
        &self,
        track: &TrackRecord,
        _mark_read: bool,
    ) -> Result<TrackRecord, TrackerError> {
        self.pushes.lock().push(track.last_chapter_read);
        Ok(track.clone())
    }

    async fn refresh(&self, track: &TrackRecord) -> Result<TrackRecord, TrackerError> {
        Ok(track.clone())
    }
}

#[tokio::test]
async fn reconcile_then_sync_with_tracker() {
    let dir = TempDir::new().unwrap();
    let reconciler = Reconciler::new(Arc::new(BasicRecognizer), ChapterDeduplicator::default());
    let mut store = library();
    reconciler
        .sync_with_sources(
            &mut store,
            1,
            vec![
                primary("p2", 1, "Ch. 2", 2_000),
                primary("p1", 1, "Ch. 1", 1_000),
                merged("3", "Chapter 3", 3_000),
            ],
            &ReconcileOptions::default(),
        )
        .unwrap();
    store
        .upsert_track(&TrackRecord {
            manga_id: 1,
            sync_id: 2,
            media_id: 55,
            last_chapter_read: 1.0,
            ..Default::default()
        })
        .unwrap();

    let tracker = Arc::new(RecordingTracker {
        pushes: Mutex::new(Vec::new()),
    });
    let engine = TrackSyncEngine::new(
        store,
        TrackerRegistry::new(vec![tracker.clone() as Arc<dyn TrackerService>]),
        Arc::new(NetworkState::default()) as Arc<dyn Connectivity>,
        PendingTrackingStore::open(&dir.path().join("pending.json")).unwrap(),
        TrackingConfig::default(),
    );

    let chapters = engine.with_store(|s| s.chapters(1).unwrap());
    let remote = engine.with_store(|s| s.tracks(1).unwrap().remove(0));
    let outcome = engine
        .sync_two_way(&chapters, &remote, tracker.as_ref())
        .await
        .unwrap();

    assert_eq!(outcome.marked_read.len(), 1);
    assert_eq!(outcome.last_chapter_read, 1.0);

    let report = engine.push_progress(1, 3.0, true).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(tracker.pushes.lock().clone(), vec![1.0, 3.0]);
    assert_eq!(
        engine.with_store(|s| s.tracks(1).unwrap()[0].last_chapter_read),
        3.0
    );
}
