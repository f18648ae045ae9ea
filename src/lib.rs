//! One-to-one audio/video call signaling over a shared keyed store.
//!
//! Each signed-in user runs a [`CallClient`], which owns a single actor that
//! serializes user intents, store notifications, room events and the ring
//! timer. Collaborators (store, room service, media devices, alerts, push)
//! are traits from `duetcore` with in-process implementations here.

pub mod types {
    pub use duetcore::types::*;
    pub mod events;
}

pub mod actors;
pub mod alert;
pub mod calls;
pub mod client;
pub mod config;
pub mod media;
pub mod notify;
pub mod room;
pub mod store;

pub use calls::{CallError, CallOptions, CallPhase, CallServices, CallSnapshot};
pub use client::CallClient;
pub use config::ClientConfig;
pub use types::events::EventBus;
