//! Display orientation tracking and rotation derivation
//!
//! The derived frame rotation is a pure function of the display orientation
//! and the panel the camera is mounted on. Orientation changes arrive
//! through an explicitly constructed, shared [`OrientationRegistry`] owned
//! by the application composition root and injected into each capturer.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Device display orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayOrientation {
    /// Orientation not reported
    None,
    /// Landscape, the default mounting
    Landscape,
    /// Portrait, rotated a quarter turn from landscape
    Portrait,
    /// Landscape turned upside down
    LandscapeFlipped,
    /// Portrait turned upside down
    PortraitFlipped,
}

/// Panel a camera is mounted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraPanel {
    /// Mounting not reported by the enclosure
    Unknown,
    /// User-facing camera
    Front,
    /// World-facing camera
    Back,
    /// Top edge
    Top,
    /// Bottom edge
    Bottom,
    /// Left edge
    Left,
    /// Right edge
    Right,
}

/// Quarter-turn correction applied to captured frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoRotation {
    /// No rotation
    #[default]
    Rotate0,
    /// 90 degrees clockwise
    Rotate90,
    /// 180 degrees
    Rotate180,
    /// 270 degrees clockwise
    Rotate270,
}

/// Derive the frame rotation for an orientation and camera mounting panel
///
/// Returns `None` when the panel is unknown: rotation is not applied for
/// cameras whose mounting the enclosure does not report.
pub fn derive_rotation(
    orientation: DisplayOrientation,
    panel: CameraPanel,
) -> Option<VideoRotation> {
    if panel == CameraPanel::Unknown {
        return None;
    }
    let front = panel == CameraPanel::Front;
    Some(match orientation {
        DisplayOrientation::Portrait => {
            if front {
                VideoRotation::Rotate270
            } else {
                VideoRotation::Rotate90
            }
        }
        DisplayOrientation::PortraitFlipped => {
            if front {
                VideoRotation::Rotate90
            } else {
                VideoRotation::Rotate270
            }
        }
        DisplayOrientation::Landscape => VideoRotation::Rotate0,
        DisplayOrientation::LandscapeFlipped => VideoRotation::Rotate180,
        DisplayOrientation::None => VideoRotation::Rotate0,
    })
}

/// Observer notified when the display orientation changes
pub trait OrientationObserver: Send + Sync {
    /// Called with the new orientation after each change
    fn orientation_changed(&self, orientation: DisplayOrientation);
}

struct RegistryInner {
    current: DisplayOrientation,
    observers: Vec<Weak<dyn OrientationObserver>>,
}

/// Shared observer registry for display orientation changes
///
/// Constructed once by the composition root and injected into each
/// capturer. The platform's orientation feed calls [`set_orientation`];
/// observers are held weakly and pruned as they drop.
///
/// [`set_orientation`]: OrientationRegistry::set_orientation
pub struct OrientationRegistry {
    inner: Mutex<RegistryInner>,
}

impl OrientationRegistry {
    /// Create a registry with an initial orientation
    pub fn new(initial: DisplayOrientation) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                current: initial,
                observers: Vec::new(),
            }),
        }
    }

    /// Latest reported orientation
    pub fn current(&self) -> DisplayOrientation {
        self.inner.lock().current
    }

    /// Register an observer; it stays registered until dropped or removed
    pub fn subscribe(&self, observer: &Arc<dyn OrientationObserver>) {
        self.inner.lock().observers.push(Arc::downgrade(observer));
    }

    /// Remove a previously registered observer
    pub fn unsubscribe(&self, observer: &Arc<dyn OrientationObserver>) {
        self.inner
            .lock()
            .observers
            .retain(|weak| !weak.upgrade().is_some_and(|o| Arc::ptr_eq(&o, observer)));
    }

    /// Record a new orientation and broadcast it to live observers
    pub fn set_orientation(&self, orientation: DisplayOrientation) {
        let live: Vec<Arc<dyn OrientationObserver>> = {
            let mut inner = self.inner.lock();
            inner.current = orientation;
            inner.observers.retain(|weak| weak.strong_count() > 0);
            inner.observers.iter().filter_map(Weak::upgrade).collect()
        };
        debug!(?orientation, observers = live.len(), "orientation changed");
        // Observers take their own locks; notify outside the registry lock.
        for observer in live {
            observer.orientation_changed(orientation);
        }
    }

    #[cfg(test)]
    fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }
}

impl Default for OrientationRegistry {
    fn default() -> Self {
        Self::new(DisplayOrientation::Landscape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_rotation_table() {
        use CameraPanel::{Back, Front};
        use DisplayOrientation::*;
        use VideoRotation::*;

        let cases = [
            (Portrait, Front, Rotate270),
            (Portrait, Back, Rotate90),
            (PortraitFlipped, Front, Rotate90),
            (PortraitFlipped, Back, Rotate270),
            (Landscape, Front, Rotate0),
            (Landscape, Back, Rotate0),
            (LandscapeFlipped, Front, Rotate180),
            (LandscapeFlipped, Back, Rotate180),
            (None, Front, Rotate0),
        ];
        for (orientation, panel, expected) in cases {
            assert_eq!(
                derive_rotation(orientation, panel),
                Some(expected),
                "{orientation:?} / {panel:?}"
            );
        }
        // Non-front panels all behave like Back
        assert_eq!(
            derive_rotation(Portrait, CameraPanel::Top),
            Some(Rotate90)
        );
    }

    #[test]
    fn test_unknown_panel_applies_no_rotation() {
        assert_eq!(
            derive_rotation(DisplayOrientation::Portrait, CameraPanel::Unknown),
            None
        );
    }

    struct Recorder {
        seen: Mutex<Vec<DisplayOrientation>>,
    }

    impl OrientationObserver for Recorder {
        fn orientation_changed(&self, orientation: DisplayOrientation) {
            self.seen.lock().push(orientation);
        }
    }

    #[test]
    fn test_registry_broadcasts_and_prunes() {
        let registry = OrientationRegistry::default();
        assert_eq!(registry.current(), DisplayOrientation::Landscape);

        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let observer: Arc<dyn OrientationObserver> = recorder.clone();
        registry.subscribe(&observer);

        registry.set_orientation(DisplayOrientation::Portrait);
        assert_eq!(registry.current(), DisplayOrientation::Portrait);
        assert_eq!(*recorder.seen.lock(), vec![DisplayOrientation::Portrait]);

        drop(observer);
        drop(recorder);
        registry.set_orientation(DisplayOrientation::Landscape);
        assert_eq!(registry.observer_count(), 0);
    }

    #[test]
    fn test_registry_unsubscribe() {
        let registry = OrientationRegistry::default();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let observer: Arc<dyn OrientationObserver> = recorder.clone();
        registry.subscribe(&observer);
        registry.unsubscribe(&observer);

        registry.set_orientation(DisplayOrientation::PortraitFlipped);
        assert!(recorder.seen.lock().is_empty());
    }
}
