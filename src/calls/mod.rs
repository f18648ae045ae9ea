//! Call signaling over a shared keyed store.
//!
//! # Architecture
//!
//! - [`CallState`] & [`CallTransition`]: pure state machine for one user's call
//! - [`CallMachine`]: applies transitions and drives the store, room service,
//!   local media and alert side effects
//! - [`AlertController`]: owns the ringtone/ringback currently playing
//!
//! # Protocol Overview
//!
//! A caller writes a ringing [`CallRecord`](duetcore::types::call::CallRecord)
//! under the callee's key and its own. The callee flips both to `active` on
//! accept and both sides join the room named by the record. Removing both
//! records ends the call; an absent record is the idle state.

pub mod alert;
pub mod error;
pub mod machine;
pub mod state;

pub use alert::AlertController;
pub use error::CallError;
pub use machine::{CallMachine, CallOptions, CallServices, CallSnapshot};
pub use state::{CallDirection, CallPhase, CallSession, CallState, CallTransition, InvalidTransition};
