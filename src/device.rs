//! Capture device session management
//!
//! [`CaptureDevice`] owns one physical capture session: it binds a device
//! identifier, drives the session lifecycle through an explicit state
//! machine, and forwards decoded samples upward after stripping alignment
//! padding. Sessions come from the shared [`SessionCache`]; a stop that has
//! not signalled completion within [`STOP_COMPLETION_TIMEOUT`] blocks any
//! new start with an invalid-state error.

use crate::backend::{
    CaptureBackend, EncodingProfile, MediaCaptureSession, MediaSample, SampleSink,
    StreamProperties,
};
use crate::cache::SessionCache;
use crate::error::{CaptureError, CaptureResult};
use crate::format::{remove_padding, CaptureCapability};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Bounded wait for a prior stop to complete before a new start proceeds
pub const STOP_COMPLETION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Capture session lifecycle
///
/// `Starting` is reachable only from `Initialized` or `Stopped`; a start
/// while `Started` or during an unexpired stop is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No device identifier bound
    Uninitialized,
    /// Bound to a device identifier, never started
    Initialized,
    /// Start negotiation in flight
    Starting,
    /// Recording into the sample sink
    Started,
    /// Stop requested, session release in flight
    Stopping,
    /// Stopped; the session may be started again
    Stopped,
}

/// Receiver for trimmed frames and device failures
///
/// Frames are valid only for the duration of the callback and may arrive on
/// any thread.
pub trait CaptureDeviceListener: Send + Sync {
    /// A trimmed raw frame arrived
    fn on_incoming_frame(&self, frame: &[u8], info: &CaptureCapability);
    /// The capture pipeline reported a failure
    fn on_capture_device_failed(&self, code: i32, message: &str);
}

/// One physical capture session
pub struct CaptureDevice {
    backend: Arc<dyn CaptureBackend>,
    cache: Arc<SessionCache>,
    listener: Weak<dyn CaptureDeviceListener>,
    state: Mutex<SessionState>,
    device_id: Mutex<String>,
    session: Mutex<Option<Arc<dyn MediaCaptureSession>>>,
    sink: Mutex<Option<Arc<SampleForwarder>>>,
    frame_info: Mutex<CaptureCapability>,
    // true whenever no stop is outstanding; start waits for it
    stopped_tx: watch::Sender<bool>,
}

impl CaptureDevice {
    /// Create a device bound to nothing yet
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        cache: Arc<SessionCache>,
        listener: Weak<dyn CaptureDeviceListener>,
    ) -> Self {
        let (stopped_tx, _) = watch::channel(true);
        Self {
            backend,
            cache,
            listener,
            state: Mutex::new(SessionState::Uninitialized),
            device_id: Mutex::new(String::new()),
            session: Mutex::new(None),
            sink: Mutex::new(None),
            frame_info: Mutex::new(CaptureCapability::default()),
            stopped_tx,
        }
    }

    /// Bind the session to a device identifier
    ///
    /// Re-binding is permitted until capture has started.
    pub fn initialize(&self, device_id: &str) -> CaptureResult<()> {
        let mut state = self.state.lock();
        match *state {
            SessionState::Starting | SessionState::Started | SessionState::Stopping => {
                Err(CaptureError::InvalidState {
                    message: "cannot re-bind a device while capture is active".to_string(),
                })
            }
            _ => {
                info!(device_id, "capture device initialized");
                *self.device_id.lock() = device_id.to_string();
                *state = SessionState::Initialized;
                Ok(())
            }
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Whether the session is recording
    pub fn capture_started(&self) -> bool {
        *self.state.lock() == SessionState::Started
    }

    /// Capability recorded by the last start
    pub fn frame_info(&self) -> CaptureCapability {
        *self.frame_info.lock()
    }

    /// Cached platform session for the bound device, created if absent
    pub async fn media_session(&self) -> CaptureResult<Arc<dyn MediaCaptureSession>> {
        let device_id = self.device_id.lock().clone();
        if device_id.is_empty() {
            return Err(CaptureError::InvalidState {
                message: "capture device is not initialized".to_string(),
            });
        }
        self.cache.get_or_create(&device_id, &self.backend).await
    }

    /// Negotiate the pipeline and start recording
    ///
    /// Fails with `InvalidState` if capture is already started or a prior
    /// stop has not signalled within the bounded wait. Any failure during
    /// negotiation tears the session down (sink and session released, cache
    /// entry evicted) and reverts the state to `Stopped`.
    pub async fn start_capture(
        &self,
        profile: &EncodingProfile,
        properties: &StreamProperties,
    ) -> CaptureResult<()> {
        {
            let state = self.state.lock();
            match *state {
                SessionState::Starting | SessionState::Started => {
                    return Err(CaptureError::InvalidState {
                        message: "capture already started".to_string(),
                    });
                }
                SessionState::Uninitialized => {
                    return Err(CaptureError::InvalidState {
                        message: "capture device is not initialized".to_string(),
                    });
                }
                _ => {}
            }
        }

        let mut stopped_rx = self.stopped_tx.subscribe();
        let wait = stopped_rx.wait_for(|stopped| *stopped);
        if tokio::time::timeout(STOP_COMPLETION_TIMEOUT, wait)
            .await
            .map_or(true, |r| r.is_err())
        {
            return Err(CaptureError::InvalidState {
                message: format!(
                    "previous stop did not complete within {STOP_COMPLETION_TIMEOUT:?}"
                ),
            });
        }

        let device_id = {
            let mut state = self.state.lock();
            // Re-check: another start may have won the race while waiting.
            if matches!(*state, SessionState::Starting | SessionState::Started) {
                return Err(CaptureError::InvalidState {
                    message: "capture already started".to_string(),
                });
            }
            *state = SessionState::Starting;
            self.device_id.lock().clone()
        };
        self.stopped_tx.send_replace(false);

        let info = CaptureCapability::new(
            profile.width,
            profile.height,
            profile.frame_rate,
            profile.subtype,
        );
        *self.frame_info.lock() = info;

        match self.negotiate(&device_id, profile, properties, info).await {
            Ok(()) => {
                *self.state.lock() = SessionState::Started;
                info!(device_id, ?info, "capture started");
                Ok(())
            }
            Err(e) => {
                error!(device_id, error = %e, "capture start failed, tearing down session");
                self.teardown(&device_id);
                Err(e)
            }
        }
    }

    async fn negotiate(
        &self,
        device_id: &str,
        profile: &EncodingProfile,
        properties: &StreamProperties,
        info: CaptureCapability,
    ) -> CaptureResult<()> {
        let session = self.cache.get_or_create(device_id, &self.backend).await?;
        let forwarder = Arc::new(SampleForwarder {
            listener: self.listener.clone(),
            frame_info: info,
            active: AtomicBool::new(true),
        });
        session
            .start_record(profile, properties, forwarder.clone())
            .await?;
        *self.session.lock() = Some(session);
        *self.sink.lock() = Some(forwarder);
        Ok(())
    }

    /// Stop recording and release the session
    ///
    /// A no-op with a logged notice when capture never started. The sink
    /// and session are released and the stop-completed signal is raised on
    /// success and failure alike, so a later start can always proceed.
    pub async fn stop_capture(&self) -> CaptureResult<()> {
        let session = {
            let mut state = self.state.lock();
            if *state != SessionState::Started {
                info!("stop requested but capture was never started");
                return Ok(());
            }
            *state = SessionState::Stopping;
            self.session.lock().clone()
        };

        // Deactivate the sink first so samples racing the stop are dropped
        // instead of reaching a listener mid-teardown.
        if let Some(sink) = self.sink.lock().clone() {
            sink.deactivate();
        }

        let result = match session {
            Some(session) => session.stop_record().await,
            None => Ok(()),
        };
        let device_id = self.device_id.lock().clone();
        self.teardown(&device_id);

        match result {
            Ok(()) => {
                info!(device_id, "capture stopped");
                Ok(())
            }
            Err(e) => {
                error!(device_id, error = %e, "stop failed; session released anyway");
                Err(e)
            }
        }
    }

    fn teardown(&self, device_id: &str) {
        if let Some(sink) = self.sink.lock().take() {
            sink.deactivate();
        }
        *self.session.lock() = None;
        self.cache.remove(device_id);
        *self.state.lock() = SessionState::Stopped;
        self.stopped_tx.send_replace(true);
    }
}

/// Sink installed into the platform session for one recording
///
/// Deactivated before teardown so late samples from the pipeline thread are
/// dropped rather than racing the stop.
struct SampleForwarder {
    listener: Weak<dyn CaptureDeviceListener>,
    frame_info: CaptureCapability,
    active: AtomicBool,
}

impl SampleForwarder {
    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl SampleSink for SampleForwarder {
    fn on_media_sample(&self, mut sample: MediaSample) {
        if !self.active.load(Ordering::Acquire) {
            debug!("sample arrived after stop, dropped");
            return;
        }
        let Some(listener) = self.listener.upgrade() else {
            return;
        };
        // 100-nanosecond units to milliseconds
        let capture_time_ms = sample.sample_time_hns / 10_000;
        remove_padding(&mut sample.buffer, &self.frame_info);
        debug!(
            len = sample.buffer.len(),
            capture_time_ms, "media sample received"
        );
        listener.on_incoming_frame(&sample.buffer, &self.frame_info);
    }

    fn on_capture_failed(&self, code: i32, message: &str) {
        if let Some(listener) = self.listener.upgrade() {
            listener.on_capture_device_failed(code, message);
        }
    }
}
