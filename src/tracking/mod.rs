//! Tracker service contract and progress synchronization.
//!
//! This module defines the interface every tracking service implements,
//! the registry the engine dispatches through, and the report types a
//! fan-out over several trackers produces.

mod engine;
mod pending;

pub use engine::{TrackSyncEngine, TwoWaySync};
pub use pending::{PendingTrackingStore, PendingUpdate};

use crate::error::TrackerError;
use crate::models::TrackRecord;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Trait for external reading-progress trackers.
///
/// Implementations own authentication and the wire protocol; the engine
/// only decides when and with what progress they are called.
#[async_trait]
pub trait TrackerService: Send + Sync {
    /// Returns the sync id records for this service carry.
    fn id(&self) -> i32;

    /// Returns the human-readable name of this service.
    fn name(&self) -> &str;

    /// Returns true if the service has credentials.
    fn is_logged_in(&self) -> bool;

    /// Pushes a track to the service and returns the stored remote state.
    ///
    /// `mark_read` is set when the push comes from chapters being marked read.
    async fn update(&self, track: &TrackRecord, mark_read: bool)
    -> Result<TrackRecord, TrackerError>;

    /// Fetches the remote state of a track.
    async fn refresh(&self, track: &TrackRecord) -> Result<TrackRecord, TrackerError>;
}

/// Registry of configured tracker services.
#[derive(Default, Clone)]
pub struct TrackerRegistry {
    services: Vec<Arc<dyn TrackerService>>,
}

impl TrackerRegistry {
    /// Creates a registry from a list of services.
    pub fn new(services: Vec<Arc<dyn TrackerService>>) -> Self {
        Self { services }
    }

    /// Adds a service, replacing any service with the same id.
    pub fn register(&mut self, service: Arc<dyn TrackerService>) {
        self.services.retain(|s| s.id() != service.id());
        self.services.push(service);
    }

    /// Finds the service for a sync id.
    pub fn get(&self, sync_id: i32) -> Option<Arc<dyn TrackerService>> {
        self.services.iter().find(|s| s.id() == sync_id).cloned()
    }

    /// Returns all registered services.
    pub fn all(&self) -> &[Arc<dyn TrackerService>] {
        &self.services
    }

    /// Finds the service for a sync id if it is logged in.
    pub fn logged_in(&self, sync_id: i32) -> Option<Arc<dyn TrackerService>> {
        self.get(sync_id).filter(|s| s.is_logged_in())
    }
}

/// Reports whether the network is reachable.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity flag flipped by whoever watches the network.
#[derive(Debug)]
pub struct NetworkState {
    online: AtomicBool,
}

impl NetworkState {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for NetworkState {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for NetworkState {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// A single tracker that failed during a fan-out.
#[derive(Debug, Clone)]
pub struct TrackerFailure {
    pub manga_id: i64,
    pub sync_id: i32,
    pub service: String,
    pub error: TrackerError,
}

impl std::fmt::Display for TrackerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (manga {}): {}",
            self.service, self.manga_id, self.error
        )
    }
}

/// Outcome of a push, refresh or flush across trackers.
#[derive(Debug, Clone, Default)]
pub struct PushReport {
    /// Tracks the services accepted, as returned by them.
    pub updated: Vec<TrackRecord>,
    /// Tracks saved to the pending queue instead of being sent.
    pub queued: Vec<TrackRecord>,
    /// Trackers that failed; the others are unaffected.
    pub failures: Vec<TrackerFailure>,
}

impl PushReport {
    /// Returns true if no tracker failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(i32, bool);

    #[async_trait]
    impl TrackerService for Named {
        fn id(&self) -> i32 {
            self.0
        }
        fn name(&self) -> &str {
            "named"
        }
        fn is_logged_in(&self) -> bool {
            self.1
        }
        async fn update(
            &self,
            track: &TrackRecord,
            _mark_read: bool,
        ) -> Result<TrackRecord, TrackerError> {
            Ok(track.clone())
        }
        async fn refresh(&self, track: &TrackRecord) -> Result<TrackRecord, TrackerError> {
            Ok(track.clone())
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry =
            TrackerRegistry::new(vec![Arc::new(Named(1, true)), Arc::new(Named(2, false))]);

        assert!(registry.get(1).is_some());
        assert!(registry.get(3).is_none());
        assert!(registry.logged_in(1).is_some());
        assert!(registry.logged_in(2).is_none());

        registry.register(Arc::new(Named(2, true)));
        assert_eq!(registry.all().len(), 2);
        assert!(registry.logged_in(2).is_some());
    }

    #[test]
    fn test_network_state() {
        let state = NetworkState::default();
        assert!(state.is_online());
        state.set_online(false);
        assert!(!state.is_online());
    }
}
