//! Integration tests for the capture lifecycle
//!
//! These tests drive the full capturer through the scripted mock backend:
//! negotiation, start/stop, suspend/resume, rotation, and frame delivery.

use parking_lot::Mutex;
use rtc_capture::backend::mock::MockBackend;
use rtc_capture::*;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// FIXTURES
// ============================================================================

struct CollectingSink {
    frames: Mutex<Vec<CapturedFrame>>,
    failures: Mutex<Vec<(i32, String)>>,
}

impl CollectingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        })
    }

    fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }
}

impl FrameSink for CollectingSink {
    fn on_frame(&self, frame: CapturedFrame) {
        self.frames.lock().push(frame);
    }

    fn on_capture_failed(&self, code: i32, message: &str) {
        self.failures.lock().push((code, message.to_string()));
    }
}

struct Fixture {
    backend: Arc<MockBackend>,
    capturer: VideoCapturer,
    sink: Arc<CollectingSink>,
    registry: Arc<OrientationRegistry>,
}

async fn fixture_with(backend: MockBackend, device_id: &str) -> Fixture {
    let backend = Arc::new(backend);
    let registry = Arc::new(OrientationRegistry::default());
    let sink = CollectingSink::new();
    let capturer = VideoCapturer::create(
        CreationProperties {
            id: device_id.to_string(),
            delegate: Some(sink.clone() as Arc<dyn FrameSink>),
        },
        backend.clone() as Arc<dyn CaptureBackend>,
        Arc::new(SessionCache::new(EvictionPolicy::Unbounded)),
        registry.clone(),
    )
    .await;
    Fixture {
        backend,
        capturer,
        sink,
        registry,
    }
}

async fn fixture() -> Fixture {
    fixture_with(MockBackend::new(), "mock-camera-0").await
}

fn vga_nv12() -> CaptureCapability {
    CaptureCapability::new(640, 480, 30, VideoType::Nv12)
}

fn tight_nv12(width: u32, height: u32) -> Vec<u8> {
    vec![0u8; VideoType::Nv12.expected_size(width, height).unwrap()]
}

fn sample(buffer: Vec<u8>) -> MediaSample {
    MediaSample {
        buffer,
        sample_time_hns: 1_230_000,
    }
}

// ============================================================================
// CREATION
// ============================================================================

#[tokio::test]
async fn test_create_binds_matching_device() {
    let f = fixture().await;
    assert_eq!(f.capturer.device_id(), "mock-camera-0");
    assert!(!f.capturer.capture_started());
}

#[tokio::test]
async fn test_create_with_unknown_device_leaves_capturer_unusable() {
    let f = fixture_with(MockBackend::new(), "no-such-camera").await;
    assert_eq!(f.capturer.device_id(), "");

    let err = f.capturer.start_capture(vga_nv12()).await.unwrap_err();
    assert!(matches!(err, CaptureError::InvalidState { .. }));
}

#[tokio::test]
async fn test_create_with_oversize_identifier_leaves_capturer_unusable() {
    let id = "x".repeat(MAX_DEVICE_ID_LENGTH + 1);
    let f = fixture_with(MockBackend::new(), &id).await;
    assert_eq!(f.capturer.device_id(), "");
    assert!(f.capturer.start_capture(vga_nv12()).await.is_err());
}

// ============================================================================
// NEGOTIATION
// ============================================================================

#[tokio::test]
async fn test_negotiation_picks_exact_match() {
    let backend = MockBackend::new().with_properties(vec![
        StreamProperties::new(VideoType::Nv12, 100, 100, 30),
        StreamProperties::new(VideoType::Nv12, 98, 100, 30),
        StreamProperties::new(VideoType::Nv12, 100, 95, 25),
    ]);
    let f = fixture_with(backend, "mock-camera-0").await;

    f.capturer
        .start_capture(CaptureCapability::new(100, 100, 30, VideoType::Nv12))
        .await
        .unwrap();

    let session = f.backend.last_session().unwrap();
    let (profile, properties) = session.negotiated().unwrap();
    assert_eq!(
        properties,
        StreamProperties::new(VideoType::Nv12, 100, 100, 30)
    );
    assert_eq!(profile.subtype, VideoType::Nv12);
    assert_eq!((profile.width, profile.height), (100, 100));
}

#[tokio::test]
async fn test_mjpeg_request_profiles_as_nv12() {
    let f = fixture().await;
    f.capturer
        .start_capture(CaptureCapability::new(1920, 1080, 30, VideoType::Mjpeg))
        .await
        .unwrap();

    let session = f.backend.last_session().unwrap();
    let (profile, properties) = session.negotiated().unwrap();
    // The pipeline decodes MJPEG to NV12; the stream match is MJPEG.
    assert_eq!(profile.subtype, VideoType::Nv12);
    assert_eq!(properties.subtype, VideoType::Mjpeg);
    // The device reports the decoded format as its capability.
    assert_eq!(f.capturer.capture_settings().video_type, VideoType::Nv12);
}

#[tokio::test]
async fn test_unknown_format_is_unsupported() {
    let f = fixture().await;
    let err = f
        .capturer
        .start_capture(CaptureCapability::new(640, 480, 30, VideoType::Unknown))
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::UnsupportedFormat { .. }));
}

#[tokio::test]
async fn test_no_matching_properties_is_negotiation_failure() {
    let backend = MockBackend::new()
        .with_properties(vec![StreamProperties::new(VideoType::Yuy2, 640, 480, 30)]);
    let f = fixture_with(backend, "mock-camera-0").await;
    let err = f.capturer.start_capture(vga_nv12()).await.unwrap_err();
    assert!(matches!(err, CaptureError::NegotiationFailed { .. }));
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_start_stop_lifecycle() {
    let f = fixture().await;
    f.capturer.start_capture(vga_nv12()).await.unwrap();
    assert!(f.capturer.capture_started());
    assert_eq!(f.capturer.capture_settings(), vga_nv12());
    assert!(f.backend.last_session().unwrap().is_recording());

    f.capturer.stop_capture().await.unwrap();
    assert!(!f.capturer.capture_started());
    assert!(!f.backend.last_session().unwrap().is_recording());
}

#[tokio::test]
async fn test_double_start_fails_without_second_session() {
    let f = fixture().await;
    f.capturer.start_capture(vga_nv12()).await.unwrap();

    let err = f.capturer.start_capture(vga_nv12()).await.unwrap_err();
    assert!(matches!(err, CaptureError::InvalidState { .. }));
    assert_eq!(f.backend.session_count(), 1);
    assert!(f.capturer.capture_started());
}

#[tokio::test]
async fn test_failed_start_reports_and_recovers() {
    let f = fixture().await;
    f.backend.set_fail_start(true);
    assert!(f.capturer.start_capture(vga_nv12()).await.is_err());
    assert!(!f.capturer.capture_started());

    f.backend.set_fail_start(false);
    f.capturer.start_capture(vga_nv12()).await.unwrap();
    assert!(f.capturer.capture_started());
}

// ============================================================================
// FRAME DELIVERY
// ============================================================================

#[tokio::test]
async fn test_frames_are_converted_and_delivered() {
    let f = fixture().await;
    f.capturer.start_capture(vga_nv12()).await.unwrap();

    let session = f.backend.last_session().unwrap();
    assert!(session.push_sample(sample(tight_nv12(640, 480))));

    let frames = f.sink.frames.lock();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].i420.width(), 640);
    assert_eq!(frames[0].i420.height(), 480);
    assert_eq!(frames[0].rotation, VideoRotation::Rotate0);
    assert_eq!(
        frames[0].i420.data().len(),
        VideoType::I420.expected_size(640, 480).unwrap()
    );
}

#[tokio::test]
async fn test_padded_frames_are_trimmed_before_delivery() {
    // 360 is not 16-aligned, so the pipeline pads each dimension to 368.
    let backend = MockBackend::new()
        .with_properties(vec![StreamProperties::new(VideoType::Nv12, 360, 360, 30)]);
    let f = fixture_with(backend, "mock-camera-0").await;
    f.capturer
        .start_capture(CaptureCapability::new(360, 360, 30, VideoType::Nv12))
        .await
        .unwrap();

    let padded = VideoType::Nv12.expected_size(368, 368).unwrap();
    let session = f.backend.last_session().unwrap();
    assert!(session.push_sample(sample(vec![0u8; padded])));

    let frames = f.sink.frames.lock();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].i420.width(), 360);
    assert_eq!(frames[0].i420.height(), 360);
}

#[tokio::test]
async fn test_malformed_frame_is_dropped_before_sink() {
    let f = fixture().await;
    f.capturer.start_capture(vga_nv12()).await.unwrap();

    let session = f.backend.last_session().unwrap();
    let tight = VideoType::Nv12.expected_size(640, 480).unwrap();
    assert!(session.push_sample(sample(vec![0u8; tight + 5])));
    assert!(session.push_sample(sample(vec![0u8; tight - 8])));

    assert_eq!(f.sink.frame_count(), 0);

    // A well-formed frame after the malformed ones still goes through.
    assert!(session.push_sample(sample(tight_nv12(640, 480))));
    assert_eq!(f.sink.frame_count(), 1);
}

struct SwitchingSink {
    capturer: Mutex<Option<Arc<VideoCapturer>>>,
    replacement: Arc<CollectingSink>,
}

impl FrameSink for SwitchingSink {
    fn on_frame(&self, _frame: CapturedFrame) {
        // Re-enters the capturer from inside the delivery callback
        if let Some(capturer) = self.capturer.lock().take() {
            capturer.set_delegate(self.replacement.clone() as Arc<dyn FrameSink>);
        }
    }
}

#[tokio::test]
async fn test_delegate_can_be_replaced_from_its_own_callback() {
    let backend = Arc::new(MockBackend::new());
    let replacement = CollectingSink::new();
    let switcher = Arc::new(SwitchingSink {
        capturer: Mutex::new(None),
        replacement: replacement.clone(),
    });
    let capturer = Arc::new(
        VideoCapturer::create(
            CreationProperties {
                id: "mock-camera-0".to_string(),
                delegate: Some(switcher.clone() as Arc<dyn FrameSink>),
            },
            backend.clone() as Arc<dyn CaptureBackend>,
            Arc::new(SessionCache::new(EvictionPolicy::Unbounded)),
            Arc::new(OrientationRegistry::default()),
        )
        .await,
    );
    *switcher.capturer.lock() = Some(capturer.clone());

    capturer.start_capture(vga_nv12()).await.unwrap();
    let session = backend.last_session().unwrap();
    // The first frame swaps the delegate mid-callback; the second lands in
    // the replacement.
    assert!(session.push_sample(sample(tight_nv12(640, 480))));
    assert!(session.push_sample(sample(tight_nv12(640, 480))));
    assert_eq!(replacement.frame_count(), 1);
}

// ============================================================================
// ROTATION
// ============================================================================

#[tokio::test]
async fn test_portrait_front_camera_rotates_frames() {
    let f = fixture().await;
    f.registry.set_orientation(DisplayOrientation::Portrait);
    f.capturer.start_capture(vga_nv12()).await.unwrap();

    let session = f.backend.last_session().unwrap();
    assert!(session.push_sample(sample(tight_nv12(640, 480))));

    // Front camera in portrait rotates 270; the output dimensions swap and
    // the metadata shows the rotation as already applied.
    let frames = f.sink.frames.lock();
    assert_eq!(frames[0].i420.width(), 480);
    assert_eq!(frames[0].i420.height(), 640);
    assert_eq!(frames[0].rotation, VideoRotation::Rotate0);
}

#[tokio::test]
async fn test_rotation_carried_as_metadata_when_not_applied() {
    let f = fixture().await;
    f.registry.set_orientation(DisplayOrientation::Portrait);
    f.capturer.set_apply_rotation(false);
    f.capturer.start_capture(vga_nv12()).await.unwrap();

    let session = f.backend.last_session().unwrap();
    assert!(session.push_sample(sample(tight_nv12(640, 480))));

    let frames = f.sink.frames.lock();
    assert_eq!(frames[0].i420.width(), 640);
    assert_eq!(frames[0].i420.height(), 480);
    assert_eq!(frames[0].rotation, VideoRotation::Rotate270);
}

#[tokio::test]
async fn test_orientation_change_applies_to_later_frames() {
    let f = fixture().await;
    f.capturer.start_capture(vga_nv12()).await.unwrap();
    let session = f.backend.last_session().unwrap();

    assert!(session.push_sample(sample(tight_nv12(640, 480))));
    f.registry.set_orientation(DisplayOrientation::Portrait);
    assert!(session.push_sample(sample(tight_nv12(640, 480))));

    let frames = f.sink.frames.lock();
    assert_eq!(frames[0].i420.width(), 640);
    assert_eq!(frames[1].i420.width(), 480);
}

// ============================================================================
// SUSPEND / RESUME
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_suspend_substitutes_black_frames() {
    let f = fixture().await;
    f.capturer.start_capture(vga_nv12()).await.unwrap();

    assert!(f.capturer.suspend_capture().await);
    assert!(f.capturer.is_suspended());
    assert!(f.capturer.capture_started());
    assert!(!f.backend.last_session().unwrap().is_recording());

    // Let the generator tick a few times in virtual time.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let frames = f.sink.frames.lock();
    assert!(!frames.is_empty());
    // Zero RGB converts to studio black.
    let last = frames.last().unwrap();
    assert_eq!(last.i420.width(), 640);
    assert_eq!(last.i420.y()[0], 16);
    assert_eq!(last.i420.u()[0], 128);
}

#[tokio::test]
async fn test_resume_restores_real_device_at_last_capability() {
    let f = fixture().await;
    f.capturer.start_capture(vga_nv12()).await.unwrap();
    assert!(f.capturer.suspend_capture().await);

    assert!(f.capturer.resume_capture().await);
    assert!(!f.capturer.is_suspended());
    assert!(f.capturer.capture_started());
    assert!(f.backend.last_session().unwrap().is_recording());
    assert_eq!(f.capturer.capture_settings(), vga_nv12());
}

#[tokio::test]
async fn test_resume_without_suspend_is_a_noop() {
    let f = fixture().await;
    f.capturer.start_capture(vga_nv12()).await.unwrap();

    assert!(!f.capturer.resume_capture().await);
    assert!(f.capturer.capture_started());
    assert!(!f.capturer.is_suspended());
}

#[tokio::test]
async fn test_suspend_without_start_is_a_noop() {
    let f = fixture().await;
    assert!(!f.capturer.suspend_capture().await);
    assert!(!f.capturer.capture_started());
}

// ============================================================================
// FAILURE DELEGATE
// ============================================================================

#[tokio::test]
async fn test_capture_failure_reaches_delegate_and_stops_device() {
    let f = fixture().await;
    f.capturer.start_capture(vga_nv12()).await.unwrap();

    let session = f.backend.last_session().unwrap();
    session.push_failure(-1072873821, "hardware MFT failed to start streaming");

    let failures = f.sink.failures.lock().clone();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, -1072873821);

    // The stop runs as a spawned task; yield until it lands.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!f.capturer.capture_started());
}

#[tokio::test]
async fn test_frames_after_stop_are_dropped() {
    let f = fixture().await;
    f.capturer.start_capture(vga_nv12()).await.unwrap();
    let session = f.backend.last_session().unwrap();

    f.capturer.stop_capture().await.unwrap();
    // The mock releases its sink on stop, so nothing is delivered.
    assert!(!session.push_sample(sample(tight_nv12(640, 480))));
    assert_eq!(f.sink.frame_count(), 0);
}
