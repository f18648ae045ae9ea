//! Local capture devices.

pub use duetcore::media::*;

use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Default)]
struct DeviceCounters {
    deny: AtomicBool,
    acquired: AtomicUsize,
    stopped: AtomicUsize,
    camera: AtomicUsize,
}

/// Capture devices that hand out placeholder tracks and count them, so a
/// caller can check nothing is left running after a call.
#[derive(Clone, Default)]
pub struct SimulatedMediaDevices {
    counters: Arc<DeviceCounters>,
}

impl SimulatedMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following acquisition fail as if the user refused access.
    pub fn deny_permission(&self, deny: bool) {
        self.counters.deny.store(deny, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> usize {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.counters.stopped.load(Ordering::SeqCst)
    }

    /// Track sets acquired and not yet stopped.
    pub fn live(&self) -> usize {
        self.acquired() - self.stopped()
    }

    /// Live track sets holding the camera.
    pub fn camera_in_use(&self) -> usize {
        self.counters.camera.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDevices for SimulatedMediaDevices {
    async fn acquire(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Box<dyn MediaTracks>, MediaError> {
        if self.counters.deny.load(Ordering::SeqCst) {
            let device = if constraints.video {
                "camera and microphone"
            } else {
                "microphone"
            };
            return Err(MediaError::PermissionDenied(format!(
                "user refused access to {device}"
            )));
        }
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        if constraints.video {
            self.counters.camera.fetch_add(1, Ordering::SeqCst);
        }
        debug!("Acquired local media {constraints:?}");
        Ok(Box::new(SimulatedTracks {
            counters: self.counters.clone(),
            video: constraints.video,
            stopped: false,
        }))
    }
}

struct SimulatedTracks {
    counters: Arc<DeviceCounters>,
    video: bool,
    stopped: bool,
}

impl MediaTracks for SimulatedTracks {
    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.counters.stopped.fetch_add(1, Ordering::SeqCst);
        if self.video {
            self.counters.camera.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
