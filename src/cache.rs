//! Process-wide capture session cache
//!
//! Platform capture sessions are expensive to initialize and some hardware
//! tolerates only one live instance, so sessions are cached by device
//! identifier and shared across capturers. The one-entry limitation seen on
//! constrained hardware is an eviction policy chosen by the composition
//! root, not a compile-time quirk.

use crate::backend::{CaptureBackend, MediaCaptureSession};
use crate::error::CaptureResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// How the cache bounds its entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// One cached session per device identifier, no global bound
    Unbounded,
    /// At most one cached session process-wide; creating a session for a
    /// new device evicts the previous one first (hardware that cannot
    /// initialize two coexisting sessions)
    SingleSession,
}

/// Shared cache of initialized capture sessions, keyed by device identifier
///
/// At most one cached session per identifier. Insertion happens only after
/// the session initialized successfully.
pub struct SessionCache {
    policy: EvictionPolicy,
    sessions: Mutex<HashMap<String, Arc<dyn MediaCaptureSession>>>,
}

impl SessionCache {
    /// Create a cache with the given eviction policy
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached session for `device_id`, creating and initializing
    /// one through `backend` if absent
    ///
    /// The cache lock is not held across initialization; concurrent starts
    /// for different device identifiers proceed independently.
    pub async fn get_or_create(
        &self,
        device_id: &str,
        backend: &Arc<dyn CaptureBackend>,
    ) -> CaptureResult<Arc<dyn MediaCaptureSession>> {
        if let Some(session) = self.sessions.lock().get(device_id) {
            debug!(device_id, "session cache hit");
            return Ok(session.clone());
        }

        if self.policy == EvictionPolicy::SingleSession {
            self.sessions.lock().clear();
        }

        let session = backend.create_session(device_id).await?;
        self.sessions
            .lock()
            .insert(device_id.to_string(), session.clone());
        debug!(device_id, "session cached");
        Ok(session)
    }

    /// Evict the cached session for `device_id`, if any
    pub fn remove(&self, device_id: &str) {
        if self.sessions.lock().remove(device_id).is_some() {
            debug!(device_id, "session evicted");
        }
    }

    /// Number of cached sessions
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::orientation::CameraPanel;

    fn two_camera_backend() -> Arc<dyn CaptureBackend> {
        let devices = vec![
            crate::backend::DeviceInfo {
                id: "cam-a".to_string(),
                name: "Camera A".to_string(),
                panel: CameraPanel::Front,
            },
            crate::backend::DeviceInfo {
                id: "cam-b".to_string(),
                name: "Camera B".to_string(),
                panel: CameraPanel::Back,
            },
        ];
        Arc::new(MockBackend::with_devices(devices))
    }

    #[tokio::test]
    async fn test_cache_reuses_sessions_per_id() {
        let backend = two_camera_backend();
        let cache = SessionCache::new(EvictionPolicy::Unbounded);

        let first = cache.get_or_create("cam-a", &backend).await.unwrap();
        let second = cache.get_or_create("cam-a", &backend).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        cache.get_or_create("cam-b", &backend).await.unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_single_session_policy_evicts_before_create() {
        let backend = two_camera_backend();
        let cache = SessionCache::new(EvictionPolicy::SingleSession);

        cache.get_or_create("cam-a", &backend).await.unwrap();
        cache.get_or_create("cam-b", &backend).await.unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_initialization_is_not_cached() {
        let backend = Arc::new(MockBackend::new());
        backend.set_fail_session_init(true);
        let dyn_backend: Arc<dyn CaptureBackend> = backend.clone();
        let cache = SessionCache::new(EvictionPolicy::Unbounded);

        assert!(cache
            .get_or_create("mock-camera-0", &dyn_backend)
            .await
            .is_err());
        assert!(cache.is_empty());

        backend.set_fail_session_init(false);
        cache
            .get_or_create("mock-camera-0", &dyn_backend)
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_evicts() {
        let backend = two_camera_backend();
        let cache = SessionCache::new(EvictionPolicy::Unbounded);
        cache.get_or_create("cam-a", &backend).await.unwrap();
        cache.remove("cam-a");
        assert!(cache.is_empty());
    }
}
