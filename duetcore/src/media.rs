//! Local capture devices (microphone, camera).

use crate::types::call::CallType;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media permission denied: {0}")]
    PermissionDenied(String),

    #[error("media device unavailable: {0}")]
    DeviceUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    /// Microphone always, camera for video calls.
    pub fn for_call(call_type: CallType) -> Self {
        Self {
            audio: true,
            video: call_type.is_video(),
        }
    }
}

/// Live capture tracks. `stop` must be idempotent.
pub trait MediaTracks: Send + Sync {
    fn stop(&mut self);
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn acquire(&self, constraints: MediaConstraints)
    -> Result<Box<dyn MediaTracks>, MediaError>;
}

/// Owns acquired tracks and stops them on release or drop.
#[derive(Default)]
pub struct LocalMedia {
    tracks: Option<Box<dyn MediaTracks>>,
}

impl LocalMedia {
    pub fn new(tracks: Box<dyn MediaTracks>) -> Self {
        Self {
            tracks: Some(tracks),
        }
    }

    pub fn is_live(&self) -> bool {
        self.tracks.is_some()
    }

    pub fn release(&mut self) {
        if let Some(mut tracks) = self.tracks.take() {
            tracks.stop();
        }
    }
}

impl Drop for LocalMedia {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for LocalMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMedia")
            .field("live", &self.is_live())
            .finish()
    }
}
