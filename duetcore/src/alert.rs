use std::fmt;

/// Audible alert tied to a ringing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
    /// Incoming call.
    Ringtone,
    /// Outgoing call waiting for the peer.
    Ringback,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ringtone => f.write_str("ringtone"),
            Self::Ringback => f.write_str("ringback"),
        }
    }
}

/// Plays and stops tones on the local device.
pub trait AlertSink: Send + Sync {
    fn play(&self, tone: Tone);
    fn stop(&self, tone: Tone);
}
