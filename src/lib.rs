//! # rtc-capture
//!
//! Video capture core for a conferencing engine: bridges an asynchronous,
//! event-driven platform capture pipeline into the synchronous
//! frame-callback model the engine expects. Covers device discovery,
//! format negotiation, hardware-alignment padding removal, conversion to
//! I420, display-orientation-driven rotation, and suspend/resume fallback
//! to synthetic black frames.
//!
//! The platform pipeline itself is injected behind the traits in
//! [`backend`]; [`backend::mock`] provides a scripted implementation for
//! tests and for platforms without a native backend.

#![warn(clippy::all)]

pub mod backend;
pub mod black_frames;
pub mod cache;
pub mod capturer;
pub mod convert;
pub mod device;
pub mod error;
pub mod format;
pub mod orientation;

// Re-export main types
pub use backend::{
    CaptureBackend, DeviceInfo, EncodingProfile, MediaCaptureSession, MediaSample, SampleSink,
    StreamProperties,
};
pub use black_frames::BlackFramesGenerator;
pub use cache::{EvictionPolicy, SessionCache};
pub use capturer::{
    CapturedFrame, CreationProperties, FrameSink, VideoCapturer, MAX_DEVICE_ID_LENGTH,
};
pub use convert::{to_i420, I420Frame};
pub use device::{
    CaptureDevice, CaptureDeviceListener, SessionState, STOP_COMPLETION_TIMEOUT,
};
pub use error::{CaptureError, CaptureResult};
pub use format::{remove_padding, CaptureCapability, VideoType};
pub use orientation::{
    derive_rotation, CameraPanel, DisplayOrientation, OrientationObserver, OrientationRegistry,
    VideoRotation,
};
