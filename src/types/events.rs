use crate::calls::state::CallPhase;
use duetcore::room::RoomEvent;
use duetcore::types::call::{CallType, Participant, RoomId};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

/// Why the machine moved between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransitionReason {
    Dialed,
    OfferReceived,
    /// Our outgoing call lost the simultaneous-call tie-break.
    Superseded,
    Accepted,
    PeerAccepted,
    Rejected,
    Cancelled,
    /// The record under our key disappeared or stopped ringing.
    RemoteEnded,
    TimedOut,
    HungUp,
    PeerLeft,
    MediaDenied,
    RoomFailed,
    Shutdown,
}

/// Serializes as one flat camelCase JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChanged {
    pub from: CallPhase,
    pub to: CallPhase,
    pub reason: TransitionReason,
    pub room_id: Option<RoomId>,
    pub peer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCall {
    pub caller: Participant,
    pub room_id: RoomId,
    pub call_type: CallType,
}

/// The user-facing operation a notice is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CallAction {
    StartCall,
    Accept,
    Reject,
    Cancel,
    HangUp,
    NotificationAction,
    RemoteUpdate,
    Room,
    RingTimeout,
    Shutdown,
}

impl fmt::Display for CallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Transient failure report meant for a toast or log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallNotice {
    pub action: CallAction,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomActivity {
    pub room_id: RoomId,
    pub event: RoomEvent,
}

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus that provides separate broadcast channels for each event type.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    (state_changed, Arc<StateChanged>),
    (incoming_call, Arc<IncomingCall>),
    (notice, Arc<CallNotice>),
    (room_activity, Arc<RoomActivity>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
