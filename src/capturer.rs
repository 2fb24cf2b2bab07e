//! Video capturer façade
//!
//! [`VideoCapturer`] coordinates device discovery, format negotiation,
//! start/stop/suspend/resume, rotation, and delivery of converted frames
//! to a registered [`FrameSink`]. It owns one [`CaptureDevice`] and one
//! [`BlackFramesGenerator`]; the session cache and orientation registry
//! are injected shared state.

use crate::backend::{CaptureBackend, EncodingProfile, StreamProperties};
use crate::black_frames::BlackFramesGenerator;
use crate::cache::SessionCache;
use crate::convert::{to_i420, I420Frame};
use crate::device::{CaptureDevice, CaptureDeviceListener};
use crate::error::{CaptureError, CaptureResult};
use crate::format::{CaptureCapability, VideoType};
use crate::orientation::{
    derive_rotation, CameraPanel, DisplayOrientation, OrientationObserver, OrientationRegistry,
    VideoRotation,
};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Instant;
use tracing::{error, info, warn};

/// Device identifiers longer than this are rejected at creation
pub const MAX_DEVICE_ID_LENGTH: usize = 1024;

/// A converted I420 frame delivered to the external sink
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Converted planar frame; dimensions reflect any applied rotation
    pub i420: I420Frame,
    /// Rotation still pending on the frame; `Rotate0` when the capturer
    /// applied it during conversion
    pub rotation: VideoRotation,
    /// Monotonic capture timestamp in milliseconds
    pub capture_time_ms: i64,
}

/// External receiver for converted frames and capture failures
pub trait FrameSink: Send + Sync {
    /// A converted frame arrived
    fn on_frame(&self, frame: CapturedFrame);
    /// The capture pipeline failed with a platform error
    fn on_capture_failed(&self, _code: i32, _message: &str) {}
}

/// Creation request for a capturer
pub struct CreationProperties {
    /// Identifier of the device to bind, bounded by [`MAX_DEVICE_ID_LENGTH`]
    pub id: String,
    /// Optional frame delegate installed at creation
    pub delegate: Option<Arc<dyn FrameSink>>,
}

struct NegotiationState {
    device_id: String,
    camera_panel: CameraPanel,
    rotation: VideoRotation,
    apply_rotation: bool,
    last_frame_info: CaptureCapability,
    profile: Option<EncodingProfile>,
    properties: Option<StreamProperties>,
}

struct Inner {
    self_weak: Weak<Inner>,
    device: CaptureDevice,
    fake_device: BlackFramesGenerator,
    registry: Arc<OrientationRegistry>,
    sink: Mutex<Option<Arc<dyn FrameSink>>>,
    state: Mutex<NegotiationState>,
}

/// Façade coordinating one capture device and its synthetic fallback
pub struct VideoCapturer {
    inner: Arc<Inner>,
}

impl VideoCapturer {
    /// Create a capturer bound to the device named in `props`
    ///
    /// Enumerates devices through `backend` and matches by identifier. A
    /// missing device or an oversize identifier is logged and leaves the
    /// capturer unusable: creation still succeeds, and `start_capture`
    /// then fails with `InvalidState`.
    pub async fn create(
        props: CreationProperties,
        backend: Arc<dyn CaptureBackend>,
        cache: Arc<SessionCache>,
        registry: Arc<OrientationRegistry>,
    ) -> Self {
        let mut device_id = String::new();
        let mut camera_panel = CameraPanel::Unknown;

        if props.id.len() > MAX_DEVICE_ID_LENGTH {
            error!(len = props.id.len(), "device identifier too long");
        } else {
            info!(id = %props.id, "creating capturer");
            match backend.enumerate_devices().await {
                Ok(devices) => match devices.into_iter().find(|d| d.id == props.id) {
                    Some(device) => {
                        device_id = device.id;
                        camera_panel = device.panel;
                    }
                    None => error!(id = %props.id, "no video capture device found"),
                },
                Err(e) => {
                    error!(error = %e, "failed to enumerate video capture devices");
                }
            }
        }

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let listener: Weak<dyn CaptureDeviceListener> = weak.clone();
            Inner {
                self_weak: weak.clone(),
                device: CaptureDevice::new(backend, cache, listener.clone()),
                fake_device: BlackFramesGenerator::new(listener),
                registry: registry.clone(),
                sink: Mutex::new(props.delegate),
                state: Mutex::new(NegotiationState {
                    device_id: device_id.clone(),
                    camera_panel,
                    rotation: VideoRotation::Rotate0,
                    apply_rotation: true,
                    last_frame_info: CaptureCapability::default(),
                    profile: None,
                    properties: None,
                }),
            }
        });

        if !device_id.is_empty() {
            if let Err(e) = inner.device.initialize(&device_id) {
                warn!(error = %e, "failed to bind capture device");
            }
        }

        let observer: Arc<dyn OrientationObserver> = inner.clone();
        registry.subscribe(&observer);
        inner.apply_display_orientation(registry.current());

        Self { inner }
    }

    /// Install or replace the frame delegate
    pub fn set_delegate(&self, sink: Arc<dyn FrameSink>) {
        *self.inner.sink.lock() = Some(sink);
    }

    /// Identifier of the bound device, empty when unbound
    pub fn device_id(&self) -> String {
        self.inner.state.lock().device_id.clone()
    }

    /// Negotiate the requested capability and start real capture
    ///
    /// Maps the requested format to a platform subtype, picks the closest
    /// advertised stream property by lexicographic `(width, height, fps)`
    /// difference, applies the current orientation-derived rotation, and
    /// delegates to the device.
    pub async fn start_capture(&self, capability: CaptureCapability) -> CaptureResult<()> {
        let inner = &self.inner;
        if inner.state.lock().device_id.is_empty() {
            return Err(CaptureError::InvalidState {
                message: "capturer is not bound to a capture device".to_string(),
            });
        }

        let subtype = match capability.video_type {
            VideoType::Yv12 => VideoType::Yv12,
            VideoType::Yuy2 => VideoType::Yuy2,
            VideoType::I420 | VideoType::Iyuv => VideoType::Iyuv,
            VideoType::Rgb24 => VideoType::Rgb24,
            VideoType::Argb => VideoType::Argb,
            // MJPEG is decoded to NV12 inside the platform pipeline
            VideoType::Mjpeg | VideoType::Nv12 => VideoType::Nv12,
            VideoType::Unknown => {
                error!("the requested raw video format is not supported on this platform");
                return Err(CaptureError::UnsupportedFormat {
                    format: format!("{:?}", capability.video_type),
                });
            }
        };
        let profile = EncodingProfile {
            subtype,
            width: capability.width,
            height: capability.height,
            frame_rate: capability.max_fps,
        };

        let session = inner.device.media_session().await?;
        let candidates = session.stream_properties().await?;
        let selected = select_closest(&candidates, &capability, subtype).ok_or_else(|| {
            CaptureError::NegotiationFailed {
                reason: format!("no stream properties match {:?}", capability.video_type),
            }
        })?;

        // Read orientation fresh rather than caching it per negotiation;
        // a change notification may race this start.
        inner.apply_display_orientation(inner.registry.current());

        inner
            .device
            .start_capture(&profile, &selected)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to start capture");
                e
            })?;

        let mut st = inner.state.lock();
        st.last_frame_info = capability;
        st.profile = Some(profile);
        st.properties = Some(selected);
        Ok(())
    }

    /// Stop whichever of the real device or the synthetic generator is active
    pub async fn stop_capture(&self) -> CaptureResult<()> {
        if self.inner.device.capture_started() {
            self.inner.device.stop_capture().await.map_err(|e| {
                error!(error = %e, "failed to stop capture");
                e
            })?;
        }
        if self.inner.fake_device.capture_started() {
            self.inner.fake_device.stop_capture()?;
        }
        Ok(())
    }

    /// Whether either the real device or the generator is active
    pub fn capture_started(&self) -> bool {
        self.inner.device.capture_started() || self.inner.fake_device.capture_started()
    }

    /// Capability the device recorded at the last start
    pub fn capture_settings(&self) -> CaptureCapability {
        self.inner.device.frame_info()
    }

    /// Swap the real device for the synthetic generator
    ///
    /// Returns `false` without changing state when real capture is not
    /// running.
    pub async fn suspend_capture(&self) -> bool {
        if !self.inner.device.capture_started() {
            info!("suspend requested but capture is not started");
            return false;
        }
        info!("suspending capture");
        if let Err(e) = self.inner.device.stop_capture().await {
            error!(error = %e, "failed to stop the device during suspend");
        }
        let last = self.inner.state.lock().last_frame_info;
        if let Err(e) = self.inner.fake_device.start_capture(last) {
            error!(error = %e, "failed to start the black frame generator");
        }
        true
    }

    /// Swap the synthetic generator back for the real device
    ///
    /// Returns `false` without changing state when capture is not
    /// suspended.
    pub async fn resume_capture(&self) -> bool {
        if !self.inner.fake_device.capture_started() {
            info!("resume requested but capture is not suspended");
            return false;
        }
        info!("resuming capture");
        if let Err(e) = self.inner.fake_device.stop_capture() {
            error!(error = %e, "failed to stop the black frame generator");
        }
        let (profile, properties) = {
            let st = self.inner.state.lock();
            (st.profile, st.properties)
        };
        match (profile, properties) {
            (Some(profile), Some(properties)) => {
                if let Err(e) = self.inner.device.start_capture(&profile, &properties).await {
                    error!(error = %e, "failed to restart capture during resume");
                }
            }
            _ => warn!("no negotiated profile to resume with"),
        }
        true
    }

    /// Whether the synthetic generator is substituting for the device
    pub fn is_suspended(&self) -> bool {
        self.inner.fake_device.capture_started()
    }

    /// Choose whether rotation is applied during conversion or carried as
    /// frame metadata
    pub fn set_apply_rotation(&self, apply: bool) {
        self.inner.state.lock().apply_rotation = apply;
    }
}

/// Closest-match search over advertised stream properties
///
/// Lexicographic minimization over `(width, height, fps)` absolute
/// differences, in that priority order. MJPEG requests match MJPEG
/// properties even though the recording profile asks for NV12.
fn select_closest(
    candidates: &[StreamProperties],
    capability: &CaptureCapability,
    subtype: VideoType,
) -> Option<StreamProperties> {
    let wanted = if capability.video_type == VideoType::Mjpeg {
        VideoType::Mjpeg
    } else {
        subtype
    };
    let mut best: Option<(StreamProperties, (u32, u32, u32))> = None;
    for prop in candidates {
        if prop.subtype != wanted {
            continue;
        }
        let diff = (
            prop.width.abs_diff(capability.width),
            prop.height.abs_diff(capability.height),
            prop.frame_rate().abs_diff(capability.max_fps),
        );
        match &best {
            Some((_, best_diff)) if diff >= *best_diff => {}
            _ => best = Some((*prop, diff)),
        }
    }
    best.map(|(prop, _)| prop)
}

fn monotonic_ms() -> i64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as i64
}

impl Inner {
    fn apply_display_orientation(&self, orientation: DisplayOrientation) {
        let mut st = self.state.lock();
        if st.camera_panel == CameraPanel::Unknown {
            return;
        }
        if let Some(rotation) = derive_rotation(orientation, st.camera_panel) {
            st.rotation = rotation;
        }
    }
}

impl OrientationObserver for Inner {
    fn orientation_changed(&self, orientation: DisplayOrientation) {
        self.apply_display_orientation(orientation);
    }
}

impl CaptureDeviceListener for Inner {
    fn on_incoming_frame(&self, frame: &[u8], info: &CaptureCapability) {
        let (rotation, apply_rotation) = {
            let mut st = self.state.lock();
            if self.device.capture_started() {
                st.last_frame_info = *info;
            }
            (st.rotation, st.apply_rotation)
        };

        if info.video_type != VideoType::Mjpeg {
            if let Some(expected) = info.expected_size() {
                if expected != frame.len() {
                    error!(
                        expected,
                        actual = frame.len(),
                        "wrong incoming frame length, dropping frame"
                    );
                    return;
                }
            }
        }

        let applied = if apply_rotation {
            rotation
        } else {
            VideoRotation::Rotate0
        };
        let converted = match to_i420(frame, info, applied) {
            Ok(converted) => converted,
            Err(e) => {
                error!(error = %e, video_type = ?info.video_type, "failed to convert capture frame to I420");
                return;
            }
        };

        let captured = CapturedFrame {
            i420: converted,
            rotation: if apply_rotation {
                VideoRotation::Rotate0
            } else {
                rotation
            },
            capture_time_ms: monotonic_ms(),
        };
        // Clone out of the lock so a sink that re-enters the capturer from
        // its callback does not deadlock.
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.on_frame(captured);
        }
    }

    fn on_capture_device_failed(&self, code: i32, message: &str) {
        error!(code, reason = message, "capture device failed");
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.on_capture_failed(code, message);
        }
        if self.device.capture_started() {
            let Some(inner) = self.self_weak.upgrade() else {
                return;
            };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = inner.device.stop_capture().await {
                            warn!(error = %e, "failed to stop after device failure");
                        }
                    });
                }
                Err(_) => warn!("no async runtime available to stop the failed device"),
            }
        }
    }
}
