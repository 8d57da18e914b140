//! Error types for Shiori.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong.

use thiserror::Error;

/// Error type for persisted store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The manga isn't known to the store
    #[error("Manga not found: {0}")]
    MangaNotFound(i64),

    /// A chapter referenced by id isn't in the store
    #[error("Chapter not found: {0}")]
    ChapterNotFound(i64),

    /// Inserting would break the (manga, url) uniqueness invariant
    #[error("Duplicate chapter url for manga {manga_id}: {url}")]
    DuplicateUrl { manga_id: i64, url: String },

    /// Transaction bookkeeping was misused (nested begin, commit without begin)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Reading or writing the snapshot file failed
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot file isn't valid JSON
    #[error("Failed to parse store snapshot: {0}")]
    Parse(#[from] serde_json::Error),

    /// Backend-specific failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Error type for chapter reconciliation.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The store rejected part of the transaction; nothing was applied
    #[error("Reconcile aborted: {0}")]
    Store(#[from] StoreError),

    /// The store returned a different number of ids than chapters inserted
    #[error("Store assigned {assigned} ids for {expected} inserted chapters")]
    IdMismatch { expected: usize, assigned: usize },
}

/// Error type for a single tracker service call.
#[derive(Error, Debug, Clone)]
pub enum TrackerError {
    /// The service isn't logged in
    #[error("Tracker {0} is not logged in")]
    NotLoggedIn(String),

    /// The remote service rejected the request
    #[error("Tracker API error: {0}")]
    Api(String),

    /// The request never reached the service
    #[error("Tracker network error: {0}")]
    Network(String),

    /// No registered service for the track's sync id
    #[error("Unknown tracker service: {0}")]
    UnknownService(i32),
}

/// Error type for tracking synchronization that isn't isolated per tracker.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Persisting local progress failed
    #[error("Failed to persist tracking state: {0}")]
    Store(#[from] StoreError),

    /// The offline queue couldn't be written
    #[error("Failed to queue pending update: {0}")]
    Pending(#[from] PendingQueueError),
}

/// Error type for the durable pending-update queue.
#[derive(Error, Debug)]
pub enum PendingQueueError {
    /// Failed to read the queue file
    #[error("Failed to read pending queue: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse JSON
    #[error("Failed to parse pending queue JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    /// A key didn't have the `manga_id:sync_id` shape
    #[error("Invalid pending queue key: {0}")]
    InvalidKey(String),

    /// Failed to write the queue file
    #[error("Failed to save pending queue: {0}")]
    WriteError(String),
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
