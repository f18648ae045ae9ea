use crate::store::traits::*;
use async_trait::async_trait;
use duetcore::store::error::{Result, StoreError};
use duetcore::types::call::{CallRecord, call_record_path};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

type Fields = Map<String, Value>;

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<Option<CallRecord>>,
}

#[derive(Default)]
struct Inner {
    /// Flat field maps keyed by store path (`calls/{userId}`).
    records: HashMap<String, Fields>,
    subscribers: HashMap<String, Vec<Subscriber>>,
    next_subscriber: u64,
    /// Users whose record rejects writes and removals.
    read_only: HashSet<String>,
}

/// A process-local signaling store for tests and demos.
///
/// Every change is delivered to subscribers synchronously, in write order.
/// Writing a value identical to the stored one notifies nobody.
#[derive(Clone, Default)]
pub struct InMemorySignalingStore {
    inner: Arc<Mutex<Inner>>,
    offline: Arc<AtomicBool>,
}

impl InMemorySignalingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every read, write and subscribe fails with
    /// [`StoreError::Connection`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes writes and removals of `user_id`'s record fail with
    /// [`StoreError::PermissionDenied`] while every other key keeps working.
    pub fn fail_writes_for(&self, user_id: &str, fail: bool) {
        let mut inner = self.lock();
        if fail {
            inner.read_only.insert(user_id.to_string());
        } else {
            inner.read_only.remove(user_id);
        }
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.lock().subscribers.get(user_id).map_or(0, Vec::len)
    }

    /// Stored field map for `user_id`, exactly as persisted.
    pub fn raw_fields(&self, user_id: &str) -> Option<Fields> {
        self.lock().records.get(&call_record_path(user_id)).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_online(&self, op: &str, user_id: &str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(format!(
                "{op} {} while offline",
                call_record_path(user_id)
            )));
        }
        Ok(())
    }

    fn ensure_writable(inner: &Inner, user_id: &str) -> Result<()> {
        if inner.read_only.contains(user_id) {
            return Err(StoreError::PermissionDenied(call_record_path(user_id)));
        }
        Ok(())
    }

    fn publish(inner: &mut Inner, user_id: &str, value: Option<CallRecord>) {
        if let Some(subscribers) = inner.subscribers.get_mut(user_id) {
            subscribers.retain(|subscriber| subscriber.tx.send(value.clone()).is_ok());
        }
    }

    fn decode(user_id: &str, fields: Option<&Fields>) -> Result<Option<CallRecord>> {
        fields
            .map(|fields| {
                CallRecord::from_fields(fields.clone()).map_err(|err| {
                    warn!("Malformed call record at {}: {err}", call_record_path(user_id));
                    StoreError::from(err)
                })
            })
            .transpose()
    }
}

#[async_trait]
impl SignalingStore for InMemorySignalingStore {
    async fn subscribe(&self, user_id: &str) -> Result<Subscription> {
        self.ensure_online("subscribe", user_id)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.lock();
            let current = Self::decode(user_id, inner.records.get(&call_record_path(user_id)))?;
            // Registered under the same lock as the initial read, so no
            // change can fall between the two.
            let _ = tx.send(current);
            let id = inner.next_subscriber;
            inner.next_subscriber += 1;
            inner
                .subscribers
                .entry(user_id.to_string())
                .or_default()
                .push(Subscriber { id, tx });
            id
        };
        debug!("Subscribed #{id} to {}", call_record_path(user_id));

        let registry = Arc::downgrade(&self.inner);
        let key = user_id.to_string();
        Ok(Subscription::new(user_id, rx, move || {
            if let Some(inner) = registry.upgrade() {
                let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(subscribers) = inner.subscribers.get_mut(&key) {
                    subscribers.retain(|subscriber| subscriber.id != id);
                }
            }
        }))
    }

    async fn read_record(&self, user_id: &str) -> Result<Option<CallRecord>> {
        self.ensure_online("read", user_id)?;
        let inner = self.lock();
        Self::decode(user_id, inner.records.get(&call_record_path(user_id)))
    }

    async fn write_record(&self, user_id: &str, record: &CallRecord) -> Result<()> {
        self.ensure_online("write", user_id)?;
        let fields = record.to_fields()?;
        let mut inner = self.lock();
        Self::ensure_writable(&inner, user_id)?;
        let previous = inner.records.insert(call_record_path(user_id), fields.clone());
        if previous.as_ref() != Some(&fields) {
            Self::publish(&mut inner, user_id, Some(record.clone()));
        }
        Ok(())
    }

    async fn remove_record(&self, user_id: &str) -> Result<()> {
        self.ensure_online("remove", user_id)?;
        let mut inner = self.lock();
        Self::ensure_writable(&inner, user_id)?;
        if inner.records.remove(&call_record_path(user_id)).is_some() {
            Self::publish(&mut inner, user_id, None);
        }
        Ok(())
    }
}
