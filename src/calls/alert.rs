//! Ringtone/ringback playback tied to the ringing states.

use duetcore::alert::{AlertSink, Tone};
use log::debug;
use std::sync::Arc;

/// Owns whichever tone is currently playing for one client.
pub struct AlertController {
    sink: Arc<dyn AlertSink>,
    playing: Option<Tone>,
}

impl AlertController {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            sink,
            playing: None,
        }
    }

    pub fn playing(&self) -> Option<Tone> {
        self.playing
    }

    /// Starts `tone`, stopping any other tone first. Restarting the tone
    /// that is already playing does nothing.
    pub fn start(&mut self, tone: Tone) {
        if self.playing == Some(tone) {
            return;
        }
        self.stop();
        debug!("Starting {tone}");
        self.sink.play(tone);
        self.playing = Some(tone);
    }

    pub fn stop(&mut self) {
        if let Some(tone) = self.playing.take() {
            debug!("Stopping {tone}");
            self.sink.stop(tone);
        }
    }
}

impl Drop for AlertController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        log: Mutex<Vec<String>>,
    }

    impl AlertSink for RecordingSink {
        fn play(&self, tone: Tone) {
            self.log.lock().unwrap().push(format!("play {tone}"));
        }

        fn stop(&self, tone: Tone) {
            self.log.lock().unwrap().push(format!("stop {tone}"));
        }
    }

    #[test]
    fn test_switching_tones_stops_previous() {
        let sink = Arc::new(RecordingSink::default());
        let mut alert = AlertController::new(sink.clone());

        alert.start(Tone::Ringback);
        alert.start(Tone::Ringback);
        alert.start(Tone::Ringtone);
        assert_eq!(alert.playing(), Some(Tone::Ringtone));
        alert.stop();
        alert.stop();

        assert_eq!(
            *sink.log.lock().unwrap(),
            vec![
                "play ringback",
                "stop ringback",
                "play ringtone",
                "stop ringtone"
            ]
        );
    }

    #[test]
    fn test_drop_stops_playing_tone() {
        let sink = Arc::new(RecordingSink::default());
        {
            let mut alert = AlertController::new(sink.clone());
            alert.start(Tone::Ringtone);
        }
        assert_eq!(
            *sink.log.lock().unwrap(),
            vec!["play ringtone", "stop ringtone"]
        );
    }
}
