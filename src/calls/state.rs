//! Call state machine implementation.

use chrono::{DateTime, Utc};
use duetcore::types::call::{CallRecord, CallType, Participant, RoomId};
use serde::Serialize;
use std::fmt;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

/// The call being negotiated or held, as seen from one side.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub peer: Participant,
    pub direction: CallDirection,
    /// Ringing record as written by the caller. Used to roll back a failed
    /// accept and to re-assert an outgoing call.
    pub offer: CallRecord,
    pub ringing_since: Instant,
}

impl CallSession {
    pub fn outgoing(peer: Participant, offer: CallRecord) -> Self {
        Self {
            peer,
            direction: CallDirection::Outgoing,
            offer,
            ringing_since: Instant::now(),
        }
    }

    pub fn incoming(offer: CallRecord) -> Self {
        Self {
            peer: offer.caller(),
            direction: CallDirection::Incoming,
            offer,
            ringing_since: Instant::now(),
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.offer.room_id
    }

    pub fn call_type(&self) -> CallType {
        self.offer.call_type
    }

    pub fn is_initiator(&self) -> bool {
        self.direction == CallDirection::Outgoing
    }
}

/// Current state of the local user's call.
#[derive(Debug, Clone, Default)]
pub enum CallState {
    #[default]
    Idle,
    /// Offer written, waiting for the peer.
    OutgoingRinging(CallSession),
    /// Offer received, ringing locally.
    IncomingRinging(CallSession),
    /// Both sides accepted; local media and room are live.
    Active {
        session: CallSession,
        accepted_at: DateTime<Utc>,
    },
}

/// Observable phase of a call. `Ended` is only ever reported in passing on
/// the way back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CallPhase {
    Idle,
    OutgoingRinging,
    IncomingRinging,
    Active,
    Ended,
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::OutgoingRinging => "outgoing-ringing",
            Self::IncomingRinging => "incoming-ringing",
            Self::Active => "active",
            Self::Ended => "ended",
        };
        f.write_str(name)
    }
}

impl CallState {
    pub fn phase(&self) -> CallPhase {
        match self {
            Self::Idle => CallPhase::Idle,
            Self::OutgoingRinging(_) => CallPhase::OutgoingRinging,
            Self::IncomingRinging(_) => CallPhase::IncomingRinging,
            Self::Active { .. } => CallPhase::Active,
        }
    }

    pub fn session(&self) -> Option<&CallSession> {
        match self {
            Self::Idle => None,
            Self::OutgoingRinging(session)
            | Self::IncomingRinging(session)
            | Self::Active { session, .. } => Some(session),
        }
    }

    pub fn room_id(&self) -> Option<&RoomId> {
        self.session().map(CallSession::room_id)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_ringing(&self) -> bool {
        matches!(self, Self::OutgoingRinging(_) | Self::IncomingRinging(_))
    }

    pub fn can_accept(&self) -> bool {
        matches!(self, Self::IncomingRinging(_))
    }

    /// Apply a state transition. Returns the phase left behind, or an error
    /// if the transition is not legal from the current state.
    pub fn apply_transition(
        &mut self,
        transition: CallTransition,
    ) -> Result<CallPhase, InvalidTransition> {
        let from = self.phase();
        let next = match (std::mem::take(self), transition) {
            (Self::Idle, CallTransition::Dialed(session)) => Self::OutgoingRinging(session),
            (
                Self::Idle | Self::IncomingRinging(_) | Self::OutgoingRinging(_),
                CallTransition::OfferReceived(session),
            ) => Self::IncomingRinging(session),
            (Self::IncomingRinging(session), CallTransition::LocalAccepted { accepted_at })
            | (Self::OutgoingRinging(session), CallTransition::RemoteAccepted { accepted_at }) => {
                Self::Active {
                    session,
                    accepted_at,
                }
            }
            (Self::IncomingRinging(_) | Self::OutgoingRinging(_), CallTransition::Dismissed) => {
                Self::Idle
            }
            (Self::Active { .. }, CallTransition::Terminated) => Self::Idle,
            (current, transition) => {
                let err = InvalidTransition {
                    current_state: from,
                    attempted: transition.name(),
                };
                *self = current;
                return Err(err);
            }
        };
        *self = next;
        Ok(from)
    }
}

/// State transitions for calls.
#[derive(Debug, Clone)]
pub enum CallTransition {
    Dialed(CallSession),
    OfferReceived(CallSession),
    LocalAccepted { accepted_at: DateTime<Utc> },
    RemoteAccepted { accepted_at: DateTime<Utc> },
    /// A ringing call went away without being answered.
    Dismissed,
    Terminated,
}

impl CallTransition {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dialed(_) => "Dialed",
            Self::OfferReceived(_) => "OfferReceived",
            Self::LocalAccepted { .. } => "LocalAccepted",
            Self::RemoteAccepted { .. } => "RemoteAccepted",
            Self::Dismissed => "Dismissed",
            Self::Terminated => "Terminated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub current_state: CallPhase,
    pub attempted: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid transition {} in state {}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}
