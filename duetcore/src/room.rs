//! Room service contract.
//!
//! The room service hosts the actual audio/video exchange once both parties
//! join with the same [`RoomId`]. The call state machine only ever talks to
//! [`RoomService`], never to a vendor SDK.

use crate::types::call::{CallType, RoomId, sanitize_identifier};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Longest participant id accepted by the room service.
pub const MAX_PARTICIPANT_ID_LEN: usize = 32;

/// Maps an arbitrary user id onto an identifier-safe participant id.
pub fn sanitize_participant_id(user_id: &str) -> String {
    sanitize_identifier(user_id, MAX_PARTICIPANT_ID_LEN)
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("invalid room credentials: {0}")]
    InvalidCredentials(String),

    #[error("failed to join room {room_id}: {reason}")]
    JoinFailed { room_id: RoomId, reason: String },

    #[error("not joined to room {0}")]
    NotJoined(RoomId),

    #[error("room {room_id} reported: {reason}")]
    Reported { room_id: RoomId, reason: String },
}

/// Application credentials issued by the conferencing backend.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RoomCredentials {
    pub app_id: u32,
    /// 64 hex characters shared secret.
    pub app_sign: String,
}

impl RoomCredentials {
    pub fn new(app_id: u32, app_sign: impl Into<String>) -> Self {
        Self {
            app_id,
            app_sign: app_sign.into(),
        }
    }

    pub fn validate(&self) -> Result<(), RoomError> {
        if self.app_id == 0 {
            return Err(RoomError::InvalidCredentials("app id is not set".into()));
        }
        if self.app_sign.len() != 64 || !self.app_sign.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RoomError::InvalidCredentials(
                "app sign must be 64 hex characters".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for RoomCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomCredentials")
            .field("app_id", &self.app_id)
            .field("app_sign", &"<redacted>")
            .finish()
    }
}

/// Media capabilities requested when joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomCapabilities {
    pub audio: bool,
    pub video: bool,
}

impl From<CallType> for RoomCapabilities {
    fn from(call_type: CallType) -> Self {
        Self {
            audio: true,
            video: call_type.is_video(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub room_id: RoomId,
    pub participant_id: String,
    pub participant_name: String,
    pub capabilities: RoomCapabilities,
}

impl JoinRequest {
    /// Builds a request, sanitizing `user_id` into a participant id.
    pub fn new(room_id: RoomId, user_id: &str, name: &str, call_type: CallType) -> Self {
        Self {
            room_id,
            participant_id: sanitize_participant_id(user_id),
            participant_name: name.to_string(),
            capabilities: call_type.into(),
        }
    }
}

/// Identifies one local membership in a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomHandle {
    pub room_id: RoomId,
    pub participant_id: String,
    pub session_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    PeerJoined { participant_id: String },
    PeerLeft { participant_id: String },
    Error { message: String },
}

/// A joined room: the handle to leave it and the events it reports.
#[derive(Debug)]
pub struct RoomSession {
    pub handle: RoomHandle,
    pub events: mpsc::UnboundedReceiver<RoomEvent>,
}

#[async_trait]
pub trait RoomService: Send + Sync {
    async fn join_room(&self, request: JoinRequest) -> Result<RoomSession, RoomError>;

    /// Tears down local media for `handle` and notifies the other members.
    async fn leave_room(&self, handle: RoomHandle) -> Result<(), RoomError>;
}
