//! Synthetic black frame source
//!
//! A periodic zero-filled frame generator substituted for the real device
//! while capture is suspended. Frames use the last known geometry with the
//! format forced to packed RGB, and are delivered to the same listener
//! interface as real capture.

use crate::device::CaptureDeviceListener;
use crate::error::{CaptureError, CaptureResult};
use crate::format::{CaptureCapability, VideoType};
use parking_lot::Mutex;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Periodic synthetic frame source
pub struct BlackFramesGenerator {
    listener: Weak<dyn CaptureDeviceListener>,
    frame_info: Mutex<CaptureCapability>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BlackFramesGenerator {
    /// Create a generator delivering to `listener`
    pub fn new(listener: Weak<dyn CaptureDeviceListener>) -> Self {
        Self {
            listener,
            frame_info: Mutex::new(CaptureCapability::default()),
            task: Mutex::new(None),
        }
    }

    /// Whether the generator is running
    pub fn capture_started(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Geometry of the frames being generated
    pub fn frame_info(&self) -> CaptureCapability {
        *self.frame_info.lock()
    }

    /// Start producing zero-filled frames at `frame_info`'s geometry
    ///
    /// The format is forced to `Rgb24`; the period is one second divided by
    /// the capability's frame rate. Fails with `InvalidState` if already
    /// running.
    pub fn start_capture(&self, frame_info: CaptureCapability) -> CaptureResult<()> {
        let mut task = self.task.lock();
        if task.is_some() {
            info!("black frame generator already started");
            return Err(CaptureError::InvalidState {
                message: "black frame generator already started".to_string(),
            });
        }

        let mut info = frame_info;
        info.video_type = VideoType::Rgb24;
        if info.max_fps == 0 || info.expected_size().map_or(true, |size| size == 0) {
            return Err(CaptureError::InvalidState {
                message: "black frame generator needs a non-empty geometry".to_string(),
            });
        }
        info!(?info, "starting black frame generator");
        *self.frame_info.lock() = info;

        let frame = vec![0u8; info.expected_size().unwrap_or(0)];
        let period = Duration::from_nanos(1_000_000_000 / u64::from(info.max_fps));
        let listener = self.listener.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(listener) = listener.upgrade() else {
                    break;
                };
                listener.on_incoming_frame(&frame, &info);
            }
        }));
        Ok(())
    }

    /// Stop producing frames; `InvalidState` if not running
    pub fn stop_capture(&self) -> CaptureResult<()> {
        let Some(task) = self.task.lock().take() else {
            return Err(CaptureError::InvalidState {
                message: "black frame generator is not started".to_string(),
            });
        };
        info!("stopping black frame generator");
        task.abort();
        Ok(())
    }
}

impl Drop for BlackFramesGenerator {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Collector {
        frames: Mutex<Vec<(usize, CaptureCapability)>>,
    }

    impl CaptureDeviceListener for Collector {
        fn on_incoming_frame(&self, frame: &[u8], info: &CaptureCapability) {
            self.frames.lock().push((frame.len(), *info));
        }
        fn on_capture_device_failed(&self, _code: i32, _message: &str) {}
    }

    fn collector() -> (Arc<Collector>, Weak<dyn CaptureDeviceListener>) {
        let collector = Arc::new(Collector {
            frames: Mutex::new(Vec::new()),
        });
        let weak =
            Arc::downgrade(&(collector.clone() as Arc<dyn CaptureDeviceListener>));
        (collector, weak)
    }

    #[tokio::test(start_paused = true)]
    async fn test_generates_black_rgb_frames_at_period() {
        let (collector, weak) = collector();
        let generator = BlackFramesGenerator::new(weak);
        let requested = CaptureCapability::new(64, 48, 10, VideoType::Nv12);
        generator.start_capture(requested).unwrap();

        // 10 fps, so one second of virtual time yields ten ticks (plus the
        // immediate first tick).
        tokio::time::sleep(Duration::from_secs(1)).await;
        generator.stop_capture().unwrap();

        let frames = collector.frames.lock();
        assert!(frames.len() >= 10, "got {} frames", frames.len());
        let (len, info) = frames[0];
        assert_eq!(info.video_type, VideoType::Rgb24);
        assert_eq!(len, 64 * 48 * 3);
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid_state() {
        let (_collector, weak) = collector();
        let generator = BlackFramesGenerator::new(weak);
        let info = CaptureCapability::new(64, 48, 30, VideoType::Rgb24);
        generator.start_capture(info).unwrap();
        assert!(matches!(
            generator.start_capture(info),
            Err(CaptureError::InvalidState { .. })
        ));
        generator.stop_capture().unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_not_running_is_invalid_state() {
        let (_collector, weak) = collector();
        let generator = BlackFramesGenerator::new(weak);
        assert!(matches!(
            generator.stop_capture(),
            Err(CaptureError::InvalidState { .. })
        ));
    }
}
