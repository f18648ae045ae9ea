pub use duetcore::alert::*;

use log::info;
use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

/// Alert sink for headless clients: tones are logged, not played.
#[derive(Default)]
pub struct LogAlertSink {
    playing: Mutex<BTreeSet<String>>,
}

impl LogAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tones started and not stopped since, by name.
    pub fn playing(&self) -> Vec<String> {
        self.playing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl AlertSink for LogAlertSink {
    fn play(&self, tone: Tone) {
        info!("Playing {tone}");
        self.playing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tone.to_string());
    }

    fn stop(&self, tone: Tone) {
        info!("Stopped {tone}");
        self.playing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tone.to_string());
    }
}
