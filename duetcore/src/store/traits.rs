use crate::store::error::Result;
use crate::types::call::CallRecord;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

/// Shared keyed storage through which both peers exchange call records.
///
/// Writes are plain upserts: the last write wins and there is no
/// compare-and-swap. Implementations backed by a store with optimistic
/// concurrency can be dropped in without touching the call state machine.
#[async_trait]
pub trait SignalingStore: Send + Sync {
    /// Watches the record owned by `user_id`.
    ///
    /// The returned subscription must yield the current value (or `None`)
    /// before any later change.
    async fn subscribe(&self, user_id: &str) -> Result<Subscription>;

    async fn read_record(&self, user_id: &str) -> Result<Option<CallRecord>>;

    async fn write_record(&self, user_id: &str, record: &CallRecord) -> Result<()>;

    /// Removing an absent record succeeds.
    async fn remove_record(&self, user_id: &str) -> Result<()>;
}

type UnsubscribeFn = Box<dyn FnOnce() + Send>;

/// Stream of values observed at one user's record.
///
/// Dropping the subscription unsubscribes.
pub struct Subscription {
    user_id: String,
    updates: mpsc::UnboundedReceiver<Option<CallRecord>>,
    on_unsubscribe: Option<UnsubscribeFn>,
}

impl Subscription {
    pub fn new(
        user_id: impl Into<String>,
        updates: mpsc::UnboundedReceiver<Option<CallRecord>>,
        on_unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            updates,
            on_unsubscribe: Some(Box::new(on_unsubscribe)),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Next observed value. The outer `None` means the store went away.
    pub async fn recv(&mut self) -> Option<Option<CallRecord>> {
        self.updates.recv().await
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<Option<CallRecord>> {
        self.updates.try_recv().ok()
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(on_unsubscribe) = self.on_unsubscribe.take() {
            on_unsubscribe();
        }
        self.updates.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("user_id", &self.user_id)
            .field("active", &self.on_unsubscribe.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::call::{CallType, Participant, RoomId};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_subscription_unsubscribes_once_on_drop() {
        let (tx, rx) = mpsc::unbounded_channel();
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let mut sub = Subscription::new("u1", rx, move || {
            assert!(!flag.swap(true, Ordering::SeqCst), "released twice");
        });

        let record = CallRecord::ringing(
            &Participant::new("u2", "Bob"),
            RoomId::new("r1"),
            CallType::Audio,
        );
        tx.send(Some(record.clone())).unwrap();
        assert_eq!(sub.recv().await, Some(Some(record)));

        sub.unsubscribe();
        assert!(released.load(Ordering::SeqCst));
        assert!(tx.send(None).is_err());
    }
}
