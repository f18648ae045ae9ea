//! Platform-independent call signaling contracts.
//!
//! This crate holds the data model that both peers exchange through the
//! signaling store and the traits for every external collaborator the call
//! state machine talks to: the store itself, the room service, local media
//! devices, push delivery and alert playback.

pub mod alert;
pub mod media;
pub mod notify;
pub mod room;
pub mod store;
pub mod types;
