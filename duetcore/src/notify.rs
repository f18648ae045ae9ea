//! Push notifications for calls arriving while the app is in the background.

use crate::types::call::{CallRecord, RoomId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("push delivery failed: {0}")]
    Delivery(String),
}

/// Title/body/data triple delivered to the callee's devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCallPush {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl IncomingCallPush {
    pub fn for_record(record: &CallRecord) -> Self {
        let title = if record.call_type.is_video() {
            "Incoming video call"
        } else {
            "Incoming audio call"
        };
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), "call".to_string());
        data.insert("roomID".to_string(), record.room_id.to_string());
        data.insert("callerId".to_string(), record.caller_id.clone());
        data.insert("callerName".to_string(), record.caller_name.clone());
        data.insert("callType".to_string(), record.call_type.to_string());

        Self {
            title: title.to_string(),
            body: format!("{} is calling you", record.caller_name),
            data,
        }
    }
}

#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn push(&self, recipient_id: &str, payload: &IncomingCallPush)
    -> Result<(), NotifyError>;
}

/// What the user tapped on a call notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationAction {
    Accept { room_id: RoomId },
    Decline { room_id: RoomId },
}

impl NotificationAction {
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::Accept { room_id } | Self::Decline { room_id } => room_id,
        }
    }

    /// Parses `{action: accept|decline, roomID}` from notification data.
    pub fn from_data(data: &BTreeMap<String, String>) -> Option<Self> {
        let room_id = RoomId::new(data.get("roomID")?.clone());
        match data.get("action")?.as_str() {
            "accept" => Some(Self::Accept { room_id }),
            "decline" => Some(Self::Decline { room_id }),
            _ => None,
        }
    }
}
