//! Shiori - manga chapter reconciliation and reading-progress sync.
//!
//! This library provides functionality for:
//! - Merging a primary provider's chapters with a secondary provider's
//! - Reconciling fetched chapters with the persisted library
//! - Filtering and sorting chapter lists for display and reading
//! - Pushing reading progress to external trackers

pub mod config;
pub mod console;
pub mod error;
pub mod filter;
pub mod merge;
pub mod models;
pub mod recognition;
pub mod reconcile;
pub mod store;
pub mod tracking;

// Re-export commonly used types
pub use config::Config;
pub use console::Console;
pub use error::{ConfigError, ReconcileError, StoreError, SyncError, TrackerError};
pub use filter::{ChapterDisplaySettings, ChapterItem, ScanlatorMatch, SortKey};
pub use merge::{ChapterDeduplicator, MatchPolicy};
pub use models::{ChapterRecord, Manga, Provenance, RawChapter, TrackRecord};
pub use recognition::{BasicRecognizer, ChapterNumberRecognizer};
pub use reconcile::{ReconcileOptions, ReconcileOutcome, ReconcilePlan, Reconciler};
pub use store::{ChapterStore, MemoryStore, TrackStore};
pub use tracking::{PushReport, TrackSyncEngine, TrackerRegistry, TrackerService};
