pub use duetcore::notify::*;

use async_trait::async_trait;
use log::info;
use std::sync::{Mutex, PoisonError};

/// Push notifier that logs payloads instead of sending them and keeps a copy
/// of each one.
#[derive(Default)]
pub struct LogPushNotifier {
    sent: Mutex<Vec<(String, IncomingCallPush)>>,
}

impl LogPushNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(recipient, payload)` pairs in send order.
    pub fn sent(&self) -> Vec<(String, IncomingCallPush)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PushNotifier for LogPushNotifier {
    async fn push(&self, recipient_id: &str, payload: &IncomingCallPush) -> Result<(), NotifyError> {
        info!(
            "Push to {recipient_id}: {} / {} {:?}",
            payload.title, payload.body, payload.data
        );
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((recipient_id.to_string(), payload.clone()));
        Ok(())
    }
}
