//! Call-related error types.

use super::state::{CallPhase, InvalidTransition};
use duetcore::media::MediaError;
use duetcore::room::RoomError;
use duetcore::store::StoreError;
use duetcore::types::call::RoomId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("signaling store error: {0}")]
    Store(#[from] StoreError),

    #[error("room service error: {0}")]
    Room(#[from] RoomError),

    #[error("invalid call state transition: {0}")]
    InvalidTransition(#[from] InvalidTransition),

    #[error("another call is in progress ({0})")]
    Busy(CallPhase),

    #[error("cannot call yourself")]
    SelfCall,

    #[error("no ringing call for room {0}")]
    NoSuchCall(RoomId),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("call client is not running")]
    NotRunning,
}

impl CallError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Media(MediaError::PermissionDenied(_)))
    }
}
