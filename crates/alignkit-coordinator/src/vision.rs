//! Capture capability
//!
//! The coordinator never talks to camera drivers directly. Each camera name
//! maps to a [`CaptureProvider`] in a [`VisionRegistry`] handed to the
//! coordinator at construction.

use alignkit_core::{AlignmentError, DeviceName, Point3};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelToken;

/// Something that can grab a frame and locate the feature in it
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    /// Capture `camera` and return the feature position in pixels
    ///
    /// Implementations should stop early when `cancel` fires; the coordinator
    /// also abandons the call on cancellation.
    async fn capture(&self, camera: &str, cancel: &CancelToken) -> Result<Point3, AlignmentError>;
}

/// Camera name → capture provider lookup
#[derive(Clone, Default)]
pub struct VisionRegistry {
    providers: HashMap<DeviceName, Arc<dyn CaptureProvider>>,
    fallback: Option<Arc<dyn CaptureProvider>>,
}

impl VisionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for `camera`
    pub fn with_camera(
        mut self,
        camera: impl Into<DeviceName>,
        provider: Arc<dyn CaptureProvider>,
    ) -> Self {
        self.providers.insert(camera.into(), provider);
        self
    }

    /// Serve every camera without its own provider from `provider`
    pub fn with_fallback(mut self, provider: Arc<dyn CaptureProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }

    /// Look up the provider for `camera`
    pub fn get(&self, camera: &DeviceName) -> Result<Arc<dyn CaptureProvider>, AlignmentError> {
        self.providers
            .get(camera)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| AlignmentError::MissingCapability {
                camera: camera.to_string(),
            })
    }

    /// Registered camera names
    pub fn cameras(&self) -> Vec<DeviceName> {
        self.providers.keys().cloned().collect()
    }
}

impl std::fmt::Debug for VisionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionRegistry")
            .field("cameras", &self.cameras())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Pixel readings a simulated camera replays for a 12-point calibration run
pub const CANNED_SEQUENCE: [Point3; 13] = [
    Point3::xy(1854.916, 1577.918),
    Point3::xy(2724.167, 1574.615),
    Point3::xy(2720.464, 709.261),
    Point3::xy(1852.647, 717.672),
    Point3::xy(986.073, 721.674),
    Point3::xy(989.928, 1584.328),
    Point3::xy(995.685, 2445.826),
    Point3::xy(1860.891, 2441.617),
    Point3::xy(2725.389, 2437.412),
    Point3::xy(1851.717, 1576.801),
    Point3::xy(1829.247, 1585.974),
    Point3::xy(1872.619, 1559.839),
    Point3::xy(1854.916, 1577.918),
];

/// Camera that replays a fixed sequence of readings
///
/// Once the sequence is exhausted the last reading repeats. A disconnected
/// camera fails every capture with [`AlignmentError::NotConnected`].
#[derive(Debug)]
pub struct SimulatedCamera {
    frames: Vec<Point3>,
    index: Mutex<usize>,
    connected: AtomicBool,
    delay: Duration,
}

impl SimulatedCamera {
    /// Connected camera replaying `frames` with no delay
    pub fn new(frames: Vec<Point3>) -> Self {
        Self {
            frames,
            index: Mutex::new(0),
            connected: AtomicBool::new(true),
            delay: Duration::ZERO,
        }
    }

    /// Camera replaying [`CANNED_SEQUENCE`]
    pub fn canned() -> Self {
        Self::new(CANNED_SEQUENCE.to_vec())
    }

    /// Wait `delay` before each reading
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Mark connected and rewind to the first frame
    pub fn connect(&self) {
        *self.index.lock() = 0;
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Mark disconnected
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Number of captures served so far
    pub fn captures(&self) -> usize {
        *self.index.lock()
    }
}

#[async_trait]
impl CaptureProvider for SimulatedCamera {
    async fn capture(&self, camera: &str, cancel: &CancelToken) -> Result<Point3, AlignmentError> {
        if !self.connected.load(Ordering::SeqCst) || self.frames.is_empty() {
            return Err(AlignmentError::NotConnected {
                camera: camera.to_string(),
            });
        }

        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(AlignmentError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        let mut index = self.index.lock();
        let frame = self.frames[(*index).min(self.frames.len() - 1)];
        tracing::debug!(
            "Simulated {} frame {}/{} -> {}",
            camera,
            *index + 1,
            self.frames.len(),
            frame
        );
        *index += 1;
        Ok(frame)
    }
}
