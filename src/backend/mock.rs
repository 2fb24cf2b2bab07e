//! Scripted in-process capture backend
//!
//! Stands in for a native platform backend in tests and on platforms
//! without one. Sessions record which profile and properties they were
//! started with, and tests drive them by pushing samples or failures.

use super::{
    CaptureBackend, DeviceInfo, EncodingProfile, MediaCaptureSession, MediaSample, SampleSink,
    StreamProperties,
};
use crate::error::{CaptureError, CaptureResult};
use crate::format::VideoType;
use crate::orientation::CameraPanel;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Scripted capture backend
pub struct MockBackend {
    devices: Vec<DeviceInfo>,
    properties: Vec<StreamProperties>,
    fail_session_init: AtomicBool,
    fail_start: Arc<AtomicBool>,
    sessions: Mutex<Vec<Arc<MockSession>>>,
}

impl MockBackend {
    /// Backend with one front-mounted camera and a typical property set
    pub fn new() -> Self {
        let device = DeviceInfo {
            id: "mock-camera-0".to_string(),
            name: "Mock Camera".to_string(),
            panel: CameraPanel::Front,
        };
        Self::with_devices(vec![device])
    }

    /// Backend advertising the given devices and a typical property set
    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices,
            properties: vec![
                StreamProperties::new(VideoType::Nv12, 640, 480, 30),
                StreamProperties::new(VideoType::Nv12, 1280, 720, 30),
                StreamProperties::new(VideoType::Yuy2, 640, 480, 30),
                StreamProperties::new(VideoType::Mjpeg, 1920, 1080, 30),
            ],
            fail_session_init: AtomicBool::new(false),
            fail_start: Arc::new(AtomicBool::new(false)),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Replace the advertised stream properties
    pub fn with_properties(mut self, properties: Vec<StreamProperties>) -> Self {
        self.properties = properties;
        self
    }

    /// Make the next session initializations fail
    pub fn set_fail_session_init(&self, fail: bool) {
        self.fail_session_init.store(fail, Ordering::SeqCst);
    }

    /// Make `start_record` fail on all sessions
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Number of sessions created so far
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Most recently created session
    pub fn last_session(&self) -> Option<Arc<MockSession>> {
        self.sessions.lock().last().cloned()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for MockBackend {
    async fn enumerate_devices(&self) -> CaptureResult<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    async fn create_session(&self, device_id: &str) -> CaptureResult<Arc<dyn MediaCaptureSession>> {
        if self.fail_session_init.load(Ordering::SeqCst) {
            return Err(CaptureError::Platform {
                code: -1,
                message: "scripted session initialization failure".to_string(),
            });
        }
        if !self.devices.iter().any(|d| d.id == device_id) {
            return Err(CaptureError::DeviceNotFound {
                device_id: device_id.to_string(),
            });
        }
        info!(device_id, "mock session initialized");
        let session = Arc::new(MockSession {
            device_id: device_id.to_string(),
            properties: self.properties.clone(),
            fail_start: self.fail_start.clone(),
            recording: AtomicBool::new(false),
            negotiated: Mutex::new(None),
            sink: Mutex::new(None),
        });
        self.sessions.lock().push(session.clone());
        Ok(session)
    }
}

/// Scripted capture session
pub struct MockSession {
    device_id: String,
    properties: Vec<StreamProperties>,
    fail_start: Arc<AtomicBool>,
    recording: AtomicBool,
    negotiated: Mutex<Option<(EncodingProfile, StreamProperties)>>,
    sink: Mutex<Option<Arc<dyn SampleSink>>>,
}

impl MockSession {
    /// Identifier of the device this session is bound to
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Whether the session is currently recording
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Profile and properties the last start negotiated
    pub fn negotiated(&self) -> Option<(EncodingProfile, StreamProperties)> {
        *self.negotiated.lock()
    }

    /// Deliver a sample to the installed sink; `true` if one was installed
    pub fn push_sample(&self, sample: MediaSample) -> bool {
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => {
                sink.on_media_sample(sample);
                true
            }
            None => false,
        }
    }

    /// Report a pipeline failure to the installed sink
    pub fn push_failure(&self, code: i32, message: &str) {
        if let Some(sink) = self.sink.lock().clone() {
            sink.on_capture_failed(code, message);
        }
    }
}

#[async_trait]
impl MediaCaptureSession for MockSession {
    async fn stream_properties(&self) -> CaptureResult<Vec<StreamProperties>> {
        Ok(self.properties.clone())
    }

    async fn start_record(
        &self,
        profile: &EncodingProfile,
        properties: &StreamProperties,
        sink: Arc<dyn SampleSink>,
    ) -> CaptureResult<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(CaptureError::Platform {
                code: -2,
                message: "scripted start failure".to_string(),
            });
        }
        *self.negotiated.lock() = Some((*profile, *properties));
        *self.sink.lock() = Some(sink);
        self.recording.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_record(&self) -> CaptureResult<()> {
        self.recording.store(false, Ordering::SeqCst);
        *self.sink.lock() = None;
        Ok(())
    }
}
