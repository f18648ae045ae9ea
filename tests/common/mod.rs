#![allow(dead_code)]

use duet::alert::LogAlertSink;
use duet::media::SimulatedMediaDevices;
use duet::notify::LogPushNotifier;
use duet::room::{LoopbackRoomService, RoomCredentials};
use duet::store::{InMemorySignalingStore, SignalingStore};
use duet::types::call::{CallRecord, Participant};
use duet::types::events::EventBus;
use duet::{CallClient, CallPhase, CallServices, ClientConfig};
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

/// Shared backend for every client created by one test.
pub struct Harness {
    pub store: Arc<InMemorySignalingStore>,
    pub rooms: Arc<LoopbackRoomService>,
}

pub struct TestUser {
    pub client: CallClient,
    pub media: SimulatedMediaDevices,
    pub alerts: Arc<LogAlertSink>,
    pub notifier: Arc<LogPushNotifier>,
}

impl TestUser {
    pub fn participant(&self) -> Participant {
        self.client.user().clone()
    }

    pub async fn phase(&self) -> CallPhase {
        self.client.snapshot().await.unwrap().phase
    }
}

impl Harness {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            store: Arc::new(InMemorySignalingStore::new()),
            rooms: Arc::new(LoopbackRoomService::new(RoomCredentials::new(
                1,
                "ab".repeat(32),
            ))),
        }
    }

    pub async fn user(&self, id: &str) -> TestUser {
        self.user_with(id, None, Arc::new(EventBus::new())).await
    }

    pub async fn user_with(
        &self,
        id: &str,
        ring_timeout: Option<Duration>,
        events: Arc<EventBus>,
    ) -> TestUser {
        let media = SimulatedMediaDevices::new();
        let alerts = Arc::new(LogAlertSink::new());
        let notifier = Arc::new(LogPushNotifier::new());
        let services = CallServices {
            store: self.store.clone(),
            rooms: self.rooms.clone(),
            media: Arc::new(media.clone()),
            alerts: alerts.clone(),
            notifier: Some(notifier.clone()),
        };
        let mut config = ClientConfig::new(
            Participant::new(id, format!("User {id}")),
            RoomCredentials::new(1, "ab".repeat(32)),
        );
        config.ring_timeout = ring_timeout;

        let client = CallClient::connect_with_events(config, services, events)
            .await
            .unwrap();
        TestUser {
            client,
            media,
            alerts,
            notifier,
        }
    }

    pub async fn record(&self, user_id: &str) -> Option<CallRecord> {
        self.store.read_record(user_id).await.unwrap()
    }

    /// Polls the store until `check` holds for `user_id`'s record.
    pub async fn wait_for_record(
        &self,
        user_id: &str,
        check: impl Fn(Option<&CallRecord>) -> bool,
    ) -> Option<CallRecord> {
        tokio::time::timeout(WAIT, async {
            loop {
                let record = self.record(user_id).await;
                if check(record.as_ref()) {
                    return record;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("record for {user_id} never matched"))
    }
}

/// Polls the client's snapshot until it reports `phase`.
pub async fn wait_for_phase(user: &TestUser, phase: CallPhase) {
    let result = tokio::time::timeout(WAIT, async {
        loop {
            if user.phase().await == phase {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    if result.is_err() {
        panic!(
            "{} never reached {phase}, stuck in {}",
            user.client.user().id,
            user.phase().await
        );
    }
}
