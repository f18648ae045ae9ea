use super::*;
use async_trait::async_trait;
use duetcore::types::call::RoomId;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};

struct Member {
    handle: RoomHandle,
    tx: mpsc::UnboundedSender<RoomEvent>,
}

/// In-process room service: members of the same room see each other join
/// and leave, no media flows.
#[derive(Clone)]
pub struct LoopbackRoomService {
    credentials: RoomCredentials,
    rooms: Arc<Mutex<HashMap<RoomId, Vec<Member>>>>,
    next_session: Arc<AtomicU64>,
    fail_joins: Arc<AtomicBool>,
}

impl LoopbackRoomService {
    pub fn new(credentials: RoomCredentials) -> Self {
        Self {
            credentials,
            rooms: Arc::new(Mutex::new(HashMap::new())),
            next_session: Arc::new(AtomicU64::new(1)),
            fail_joins: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every following join fail, as an unreachable backend would.
    pub fn set_fail_joins(&self, fail: bool) {
        self.fail_joins.store(fail, Ordering::SeqCst);
    }

    /// Participant ids currently in `room_id`, in join order.
    pub async fn members(&self, room_id: &RoomId) -> Vec<String> {
        self.rooms
            .lock()
            .await
            .get(room_id)
            .map(|members| {
                members
                    .iter()
                    .map(|member| member.handle.participant_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl RoomService for LoopbackRoomService {
    async fn join_room(&self, request: JoinRequest) -> Result<RoomSession, RoomError> {
        self.credentials.validate()?;
        if self.fail_joins.load(Ordering::SeqCst) {
            return Err(RoomError::JoinFailed {
                room_id: request.room_id,
                reason: "room backend unreachable".to_string(),
            });
        }

        let handle = RoomHandle {
            room_id: request.room_id.clone(),
            participant_id: request.participant_id.clone(),
            session_id: self.next_session.fetch_add(1, Ordering::Relaxed),
        };
        let (tx, events) = mpsc::unbounded_channel();

        let mut rooms = self.rooms.lock().await;
        let members = rooms.entry(request.room_id.clone()).or_default();
        for member in members.iter() {
            let _ = member.tx.send(RoomEvent::PeerJoined {
                participant_id: handle.participant_id.clone(),
            });
            let _ = tx.send(RoomEvent::PeerJoined {
                participant_id: member.handle.participant_id.clone(),
            });
        }
        members.push(Member {
            handle: handle.clone(),
            tx,
        });
        info!(
            "{} ({}) joined room {} [audio={}, video={}]",
            request.participant_id,
            request.participant_name,
            request.room_id,
            request.capabilities.audio,
            request.capabilities.video
        );

        Ok(RoomSession { handle, events })
    }

    async fn leave_room(&self, handle: RoomHandle) -> Result<(), RoomError> {
        let mut rooms = self.rooms.lock().await;
        let members = rooms
            .get_mut(&handle.room_id)
            .ok_or_else(|| RoomError::NotJoined(handle.room_id.clone()))?;
        let before = members.len();
        members.retain(|member| member.handle != handle);
        if members.len() == before {
            return Err(RoomError::NotJoined(handle.room_id));
        }

        for member in members.iter() {
            let _ = member.tx.send(RoomEvent::PeerLeft {
                participant_id: handle.participant_id.clone(),
            });
        }
        if members.is_empty() {
            rooms.remove(&handle.room_id);
            debug!("Room {} is empty, closing", handle.room_id);
        }
        info!("{} left room {}", handle.participant_id, handle.room_id);
        Ok(())
    }
}
