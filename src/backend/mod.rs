//! Injected platform capture traits
//!
//! The OS capture pipeline (device enumeration, session initialization,
//! recording into a custom sink) sits behind these traits. A native backend
//! crate implements them over the platform's media APIs; [`mock`] provides a
//! scripted in-process implementation used by tests and by platforms
//! without a native backend.

pub mod mock;

use crate::error::CaptureResult;
use crate::format::VideoType;
use crate::orientation::CameraPanel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One enumerated video capture device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Opaque device identifier
    pub id: String,
    /// Human-readable device name
    pub name: String,
    /// Panel the camera is mounted on, `Unknown` when not reported
    pub panel: CameraPanel,
}

/// One stream property set a device advertises for recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamProperties {
    /// Raw format the stream delivers
    pub subtype: VideoType,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame rate numerator
    pub frame_rate_numerator: u32,
    /// Frame rate denominator
    pub frame_rate_denominator: u32,
}

impl StreamProperties {
    /// Property set with a whole frame rate
    pub fn new(subtype: VideoType, width: u32, height: u32, fps: u32) -> Self {
        Self {
            subtype,
            width,
            height,
            frame_rate_numerator: fps,
            frame_rate_denominator: 1,
        }
    }

    /// Whole frames per second
    pub fn frame_rate(&self) -> u32 {
        if self.frame_rate_denominator == 0 {
            return 0;
        }
        self.frame_rate_numerator / self.frame_rate_denominator
    }
}

/// The uncompressed recording profile a start request asks the pipeline for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingProfile {
    /// Raw format the sink will receive
    pub subtype: VideoType,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second
    pub frame_rate: u32,
}

/// One decoded media sample from the capture pipeline
///
/// The buffer is owned by the delivery callback and must not be retained
/// past it. `sample_time_hns` is the capture timestamp in 100-nanosecond
/// units, the pipeline's native resolution.
#[derive(Debug)]
pub struct MediaSample {
    /// Raw sample bytes, possibly carrying alignment padding
    pub buffer: Vec<u8>,
    /// Capture timestamp in 100-nanosecond units
    pub sample_time_hns: i64,
}

/// Receiver for decoded samples and pipeline failures
///
/// Invoked on a capture-pipeline thread; implementations must not assume
/// any particular delivery thread.
pub trait SampleSink: Send + Sync {
    /// A decoded sample arrived
    fn on_media_sample(&self, sample: MediaSample);
    /// The pipeline failed with a platform error
    fn on_capture_failed(&self, code: i32, message: &str);
}

/// Platform entry point: enumeration and session creation
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Enumerate all video capture devices
    async fn enumerate_devices(&self) -> CaptureResult<Vec<DeviceInfo>>;

    /// Create and asynchronously initialize a capture session for a device
    ///
    /// Returns only after initialization completes; a failed initialization
    /// is an error, never a half-initialized session.
    async fn create_session(&self, device_id: &str) -> CaptureResult<Arc<dyn MediaCaptureSession>>;
}

/// One initialized platform capture session
#[async_trait]
pub trait MediaCaptureSession: Send + Sync {
    /// Stream property sets the device advertises for recording
    async fn stream_properties(&self) -> CaptureResult<Vec<StreamProperties>>;

    /// Configure the stream and start recording into `sink`
    async fn start_record(
        &self,
        profile: &EncodingProfile,
        properties: &StreamProperties,
        sink: Arc<dyn SampleSink>,
    ) -> CaptureResult<()>;

    /// Stop recording and release the sink
    async fn stop_record(&self) -> CaptureResult<()>;
}
