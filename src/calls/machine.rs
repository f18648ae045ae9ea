//! Call state machine driven by user intents, store notifications and room
//! events.
//!
//! The only signaling primitive is "write a record under the other party's
//! key": both participants hold a copy of the same [`CallRecord`] while a call
//! is ringing or active, and a missing record means idle. Everything about
//! media negotiation is left to the room service once both sides join the same
//! [`RoomId`].

use super::alert::AlertController;
use super::error::CallError;
use super::state::{CallPhase, CallSession, CallState, CallTransition, InvalidTransition};
use crate::types::events::{
    CallAction, CallNotice, EventBus, IncomingCall, RoomActivity, StateChanged, TransitionReason,
};
use chrono::{DateTime, Utc};
use duetcore::alert::{AlertSink, Tone};
use duetcore::media::{LocalMedia, MediaConstraints, MediaDevices};
use duetcore::notify::{IncomingCallPush, NotificationAction, PushNotifier};
use duetcore::room::{
    JoinRequest, RoomError, RoomEvent, RoomHandle, RoomService, RoomSession,
    sanitize_participant_id,
};
use duetcore::store::SignalingStore;
use duetcore::types::call::{CallRecord, CallType, Participant, RoomId};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// External collaborators of one signed-in client.
#[derive(Clone)]
pub struct CallServices {
    pub store: Arc<dyn SignalingStore>,
    pub rooms: Arc<dyn RoomService>,
    pub media: Arc<dyn MediaDevices>,
    pub alerts: Arc<dyn AlertSink>,
    pub notifier: Option<Arc<dyn PushNotifier>>,
}

/// Options for starting a call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub call_type: CallType,
    /// Room to use instead of a freshly generated one.
    pub room_id: Option<RoomId>,
}

impl CallOptions {
    pub fn audio() -> Self {
        Self::default()
    }

    pub fn video() -> Self {
        Self {
            call_type: CallType::Video,
            ..Default::default()
        }
    }

    pub fn in_room(mut self, room_id: RoomId) -> Self {
        self.room_id = Some(room_id);
        self
    }
}

/// Point-in-time view of the machine, safe to hand out of the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSnapshot {
    pub phase: CallPhase,
    pub room_id: Option<RoomId>,
    pub peer: Option<Participant>,
    pub call_type: Option<CallType>,
    pub media_live: bool,
    pub in_room: bool,
}

struct JoinedRoom {
    handle: RoomHandle,
    events: Option<mpsc::UnboundedReceiver<RoomEvent>>,
}

pub struct CallMachine {
    me: Participant,
    ring_timeout: Option<Duration>,
    services: CallServices,
    events: Arc<EventBus>,
    alert: AlertController,
    state: CallState,
    media: LocalMedia,
    room: Option<JoinedRoom>,
}

impl CallMachine {
    pub fn new(
        me: Participant,
        ring_timeout: Option<Duration>,
        services: CallServices,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            me,
            ring_timeout,
            alert: AlertController::new(services.alerts.clone()),
            services,
            events,
            state: CallState::Idle,
            media: LocalMedia::default(),
            room: None,
        }
    }

    pub fn me(&self) -> &Participant {
        &self.me
    }

    pub fn state(&self) -> &CallState {
        &self.state
    }

    pub fn snapshot(&self) -> CallSnapshot {
        let session = self.state.session();
        CallSnapshot {
            phase: self.state.phase(),
            room_id: session.map(|s| s.room_id().clone()),
            peer: session.map(|s| s.peer.clone()),
            call_type: session.map(CallSession::call_type),
            media_live: self.media.is_live(),
            in_room: self.room.is_some(),
        }
    }

    /// When the current ringing call should give up, if a ring timeout is set.
    pub fn ring_deadline(&self) -> Option<Instant> {
        let timeout = self.ring_timeout?;
        match &self.state {
            CallState::OutgoingRinging(session) | CallState::IncomingRinging(session) => {
                Some(session.ringing_since + timeout)
            }
            _ => None,
        }
    }

    /// Logs `err` and broadcasts it as a user-facing notice.
    pub fn report(&self, action: CallAction, err: &CallError) {
        warn!("{action} failed for {}: {err}", self.me.id);
        let _ = self.events.notice.send(Arc::new(CallNotice {
            action,
            message: err.to_string(),
        }));
    }

    // --- user intents ---

    pub async fn start_call(
        &mut self,
        callee: Participant,
        options: CallOptions,
    ) -> Result<RoomId, CallError> {
        if callee.id == self.me.id {
            return Err(CallError::SelfCall);
        }
        if !self.state.is_idle() {
            return Err(CallError::Busy(self.state.phase()));
        }

        let room_id = options
            .room_id
            .unwrap_or_else(|| RoomId::generate(&self.me.id));
        let offer = CallRecord::ringing(&self.me, room_id.clone(), options.call_type);
        self.write_pair(&callee.id, &offer, None).await?;

        info!(
            "Calling {} ({} call, room {})",
            callee.id, options.call_type, room_id
        );
        let callee_id = callee.id.clone();
        self.transition(
            CallTransition::Dialed(CallSession::outgoing(callee, offer.clone())),
            TransitionReason::Dialed,
        )?;
        self.alert.start(Tone::Ringback);
        self.push_offer(&callee_id, &offer).await;
        Ok(room_id)
    }

    /// Accepts the incoming call. Media is acquired before anything is
    /// written, so a denied permission leaves the call ringing and both
    /// records untouched.
    pub async fn accept(&mut self) -> Result<(), CallError> {
        let session = match &self.state {
            CallState::IncomingRinging(session) => session.clone(),
            other => {
                return Err(InvalidTransition {
                    current_state: other.phase(),
                    attempted: "LocalAccepted",
                }
                .into());
            }
        };

        let mut media = self.acquire_media(session.call_type()).await?;
        let accepted_at = Utc::now();
        let active = session.offer.accepted(accepted_at);
        self.write_pair(&session.peer.id, &active, Some(&session.offer))
            .await?;
        self.alert.stop();

        let joined = match self.join_room(&session).await {
            Ok(joined) => joined,
            Err(err) => {
                media.release();
                self.remove_pair_reporting(&session.peer.id, CallAction::Accept)
                    .await;
                self.transition(CallTransition::Dismissed, TransitionReason::RoomFailed)?;
                return Err(err);
            }
        };

        self.media = media;
        self.room = Some(joined);
        self.transition(
            CallTransition::LocalAccepted { accepted_at },
            TransitionReason::Accepted,
        )?;
        Ok(())
    }

    /// Rejects the incoming call. A no-op when nothing is ringing any more.
    pub async fn reject(&mut self) -> Result<(), CallError> {
        let peer_id = match &self.state {
            CallState::Idle => {
                debug!("Reject with no ringing call, ignoring");
                return Ok(());
            }
            CallState::IncomingRinging(session) => session.peer.id.clone(),
            other => {
                return Err(InvalidTransition {
                    current_state: other.phase(),
                    attempted: "Rejected",
                }
                .into());
            }
        };
        self.dismiss_ringing(&peer_id, TransitionReason::Rejected)
            .await
    }

    /// Withdraws our outgoing call. A no-op when nothing is ringing any more.
    pub async fn cancel(&mut self) -> Result<(), CallError> {
        let peer_id = match &self.state {
            CallState::Idle => {
                debug!("Cancel with no outgoing call, ignoring");
                return Ok(());
            }
            CallState::OutgoingRinging(session) => session.peer.id.clone(),
            other => {
                return Err(InvalidTransition {
                    current_state: other.phase(),
                    attempted: "Cancelled",
                }
                .into());
            }
        };
        self.dismiss_ringing(&peer_id, TransitionReason::Cancelled)
            .await
    }

    /// Ends whatever call exists: rejects, cancels or hangs up.
    pub async fn hang_up(&mut self) -> Result<(), CallError> {
        match self.state.phase() {
            CallPhase::Idle | CallPhase::Ended => Ok(()),
            CallPhase::IncomingRinging => self.reject().await,
            CallPhase::OutgoingRinging => self.cancel().await,
            CallPhase::Active => {
                let peer_id = self.peer_id().unwrap_or_default();
                self.remove_pair(&peer_id).await?;
                self.end_active(TransitionReason::HungUp).await
            }
        }
    }

    pub async fn on_notification_action(
        &mut self,
        action: NotificationAction,
    ) -> Result<(), CallError> {
        let ringing_here = matches!(
            &self.state,
            CallState::IncomingRinging(session) if session.room_id() == action.room_id()
        );
        match action {
            NotificationAction::Accept { .. } if ringing_here => self.accept().await,
            NotificationAction::Accept { room_id } => {
                if self.state.is_active() && self.state.room_id() == Some(&room_id) {
                    debug!("Call in room {room_id} already accepted");
                    Ok(())
                } else {
                    Err(CallError::NoSuchCall(room_id))
                }
            }
            NotificationAction::Decline { .. } if ringing_here => self.reject().await,
            NotificationAction::Decline { room_id } => {
                debug!("Ignoring decline for room {room_id}, not ringing");
                Ok(())
            }
        }
    }

    /// Releases every local resource. An active call is hung up and an
    /// outgoing call is withdrawn; an incoming call keeps ringing in the store.
    pub async fn shutdown(&mut self) -> Result<(), CallError> {
        self.alert.stop();
        let result = match self.state.phase() {
            CallPhase::Active => {
                let peer_id = self.peer_id().unwrap_or_default();
                let cleanup = self.remove_pair(&peer_id).await;
                self.end_active(TransitionReason::Shutdown).await?;
                cleanup
            }
            CallPhase::OutgoingRinging => {
                let peer_id = self.peer_id().unwrap_or_default();
                let cleanup = self.remove_pair(&peer_id).await;
                self.transition(CallTransition::Dismissed, TransitionReason::Shutdown)?;
                cleanup
            }
            _ => Ok(()),
        };
        self.media.release();
        result
    }

    // --- remote events ---

    /// Reacts to the value now stored under our own key.
    pub async fn on_record_changed(&mut self, record: Option<CallRecord>) -> Result<(), CallError> {
        match self.state.phase() {
            CallPhase::Idle => match record {
                Some(record) if record.is_ringing() && !record.is_placed_by(&self.me.id) => {
                    self.ring_incoming(record, TransitionReason::OfferReceived)
                }
                Some(record) => {
                    debug!(
                        "Ignoring stale {:?} record for room {} while idle",
                        record.status, record.room_id
                    );
                    Ok(())
                }
                None => Ok(()),
            },
            CallPhase::IncomingRinging => self.incoming_record_changed(record),
            CallPhase::OutgoingRinging => self.outgoing_record_changed(record).await,
            CallPhase::Active => self.active_record_changed(record).await,
            CallPhase::Ended => Ok(()),
        }
    }

    pub async fn on_room_event(&mut self, event: RoomEvent) -> Result<(), CallError> {
        let Some(room_id) = self.room.as_ref().map(|room| room.handle.room_id.clone()) else {
            debug!("Dropping room event outside a call: {event:?}");
            return Ok(());
        };
        let _ = self.events.room_activity.send(Arc::new(RoomActivity {
            room_id: room_id.clone(),
            event: event.clone(),
        }));

        match event {
            RoomEvent::PeerJoined { participant_id } => {
                info!("{participant_id} joined room {room_id}");
                Ok(())
            }
            RoomEvent::PeerLeft { participant_id } => {
                let peer_id = self.peer_id().unwrap_or_default();
                if participant_id != sanitize_participant_id(&peer_id) {
                    debug!("Ignoring departure of {participant_id} from room {room_id}");
                    return Ok(());
                }
                info!("{peer_id} left room {room_id}, ending call");
                let cleanup = self.remove_pair(&peer_id).await;
                self.end_active(TransitionReason::PeerLeft).await?;
                cleanup
            }
            RoomEvent::Error { message } => Err(RoomError::Reported {
                room_id,
                reason: message,
            }
            .into()),
        }
    }

    /// Next event from the joined room. Pends forever outside a room.
    pub async fn next_room_event(&mut self) -> RoomEvent {
        let Some(events) = self.room.as_mut().and_then(|room| room.events.as_mut()) else {
            return std::future::pending().await;
        };
        match events.recv().await {
            Some(event) => event,
            None => {
                if let Some(room) = self.room.as_mut() {
                    room.events = None;
                }
                RoomEvent::Error {
                    message: "room event stream closed".to_string(),
                }
            }
        }
    }

    /// Gives up on an unanswered call once the ring timeout elapsed.
    pub async fn on_ring_timeout(&mut self) -> Result<(), CallError> {
        let Some(peer_id) = self
            .state
            .session()
            .filter(|_| self.state.is_ringing())
            .map(|session| session.peer.id.clone())
        else {
            return Ok(());
        };
        info!("No answer in call with {peer_id}, giving up");
        let result = self
            .dismiss_ringing(&peer_id, TransitionReason::TimedOut)
            .await;
        if result.is_err() {
            self.restart_ring_timer();
        }
        result
    }

    // --- transition handlers ---

    fn incoming_record_changed(&mut self, record: Option<CallRecord>) -> Result<(), CallError> {
        let current_room = self.state.room_id().cloned();
        match record {
            Some(record) if record.is_ringing() && Some(&record.room_id) == current_room.as_ref() => {
                Ok(())
            }
            // Only our own accept writes `active` under our key; seen while
            // still ringing, that accept was rolled back.
            Some(record) if record.is_active() && Some(&record.room_id) == current_room.as_ref() => {
                debug!("Ignoring rolled back accept of room {}", record.room_id);
                Ok(())
            }
            Some(record) if record.is_ringing() && record.is_placed_by(&self.me.id) => {
                debug!("Ignoring own outgoing record for room {}", record.room_id);
                Ok(())
            }
            Some(record) if record.is_ringing() => {
                info!("Incoming call replaced by room {}", record.room_id);
                self.ring_incoming(record, TransitionReason::OfferReceived)
            }
            _ => {
                info!("Incoming call withdrawn");
                self.alert.stop();
                self.transition(CallTransition::Dismissed, TransitionReason::RemoteEnded)?;
                Ok(())
            }
        }
    }

    async fn outgoing_record_changed(&mut self, record: Option<CallRecord>) -> Result<(), CallError> {
        let Some(session) = self.state.session().cloned() else {
            return Ok(());
        };
        match record {
            None => {
                info!("{} declined or withdrew the call", session.peer.id);
                self.alert.stop();
                self.remove_pair_reporting(&session.peer.id, CallAction::RemoteUpdate)
                    .await;
                self.transition(CallTransition::Dismissed, TransitionReason::RemoteEnded)?;
                Ok(())
            }
            Some(record) if record.room_id == *session.room_id() => {
                if record.is_active() {
                    let accepted_at = record.accepted_at.unwrap_or_else(Utc::now);
                    self.enter_active_as_caller(session, accepted_at).await
                } else {
                    Ok(())
                }
            }
            Some(record) if record.is_ringing() && record.is_placed_by(&session.peer.id) => {
                self.resolve_mutual_call(session, record).await
            }
            Some(record) => {
                debug!(
                    "Ignoring record for room {} from {} while calling {}",
                    record.room_id, record.caller_id, session.peer.id
                );
                Ok(())
            }
        }
    }

    async fn active_record_changed(&mut self, record: Option<CallRecord>) -> Result<(), CallError> {
        let Some(session) = self.state.session().cloned() else {
            return Ok(());
        };
        match record {
            None => {
                info!("{} ended the call", session.peer.id);
                self.remove_pair_reporting(&session.peer.id, CallAction::RemoteUpdate)
                    .await;
                self.end_active(TransitionReason::RemoteEnded).await
            }
            Some(record) if record.room_id == *session.room_id() => Ok(()),
            Some(record) => {
                warn!(
                    "Ignoring call from {} (room {}) during active call",
                    record.caller_id, record.room_id
                );
                Ok(())
            }
        }
    }

    /// Both users called each other at once. The smaller user id keeps its
    /// call and re-writes it under both keys; the other side drops its own
    /// outgoing call and rings for the winner's.
    async fn resolve_mutual_call(
        &mut self,
        session: CallSession,
        theirs: CallRecord,
    ) -> Result<(), CallError> {
        if self.me.id < session.peer.id {
            info!(
                "Simultaneous call with {}, keeping room {}",
                session.peer.id,
                session.room_id()
            );
            let store = &self.services.store;
            store.write_record(&session.peer.id, &session.offer).await?;
            store.write_record(&self.me.id, &session.offer).await?;
            Ok(())
        } else {
            info!(
                "Simultaneous call with {}, switching to room {}",
                session.peer.id, theirs.room_id
            );
            self.ring_incoming(theirs, TransitionReason::Superseded)
        }
    }

    async fn enter_active_as_caller(
        &mut self,
        session: CallSession,
        accepted_at: DateTime<Utc>,
    ) -> Result<(), CallError> {
        self.alert.stop();
        let mut media = match self.acquire_media(session.call_type()).await {
            Ok(media) => media,
            Err(err) => {
                self.remove_pair_reporting(&session.peer.id, CallAction::RemoteUpdate)
                    .await;
                self.transition(CallTransition::Dismissed, TransitionReason::MediaDenied)?;
                return Err(err);
            }
        };
        let joined = match self.join_room(&session).await {
            Ok(joined) => joined,
            Err(err) => {
                media.release();
                self.remove_pair_reporting(&session.peer.id, CallAction::RemoteUpdate)
                    .await;
                self.transition(CallTransition::Dismissed, TransitionReason::RoomFailed)?;
                return Err(err);
            }
        };

        self.media = media;
        self.room = Some(joined);
        self.transition(
            CallTransition::RemoteAccepted { accepted_at },
            TransitionReason::PeerAccepted,
        )?;
        Ok(())
    }

    fn ring_incoming(
        &mut self,
        offer: CallRecord,
        reason: TransitionReason,
    ) -> Result<(), CallError> {
        info!(
            "Incoming {} call from {} (room {})",
            offer.call_type, offer.caller_id, offer.room_id
        );
        let incoming = IncomingCall {
            caller: offer.caller(),
            room_id: offer.room_id.clone(),
            call_type: offer.call_type,
        };
        self.transition(
            CallTransition::OfferReceived(CallSession::incoming(offer)),
            reason,
        )?;
        self.alert.start(Tone::Ringtone);
        let _ = self.events.incoming_call.send(Arc::new(incoming));
        Ok(())
    }

    async fn dismiss_ringing(
        &mut self,
        peer_id: &str,
        reason: TransitionReason,
    ) -> Result<(), CallError> {
        self.remove_pair(peer_id).await?;
        self.alert.stop();
        self.transition(CallTransition::Dismissed, reason)?;
        Ok(())
    }

    async fn end_active(&mut self, reason: TransitionReason) -> Result<(), CallError> {
        if let Some(room) = self.room.take() {
            let room_id = room.handle.room_id.clone();
            if let Err(err) = self.services.rooms.leave_room(room.handle).await {
                warn!("Failed to leave room {room_id}: {err}");
            }
        }
        self.media.release();
        self.transition(CallTransition::Terminated, reason)?;
        Ok(())
    }

    fn restart_ring_timer(&mut self) {
        if let CallState::OutgoingRinging(session) | CallState::IncomingRinging(session) =
            &mut self.state
        {
            session.ringing_since = Instant::now();
        }
    }

    fn transition(
        &mut self,
        transition: CallTransition,
        reason: TransitionReason,
    ) -> Result<(), InvalidTransition> {
        let before = self.call_context();
        let terminated = matches!(transition, CallTransition::Terminated);
        let from = self.state.apply_transition(transition)?;
        let (room_id, peer_id) = self.call_context().or(before).unzip();

        if terminated {
            self.emit_state(from, CallPhase::Ended, reason, &room_id, &peer_id);
            self.emit_state(CallPhase::Ended, CallPhase::Idle, reason, &room_id, &peer_id);
        } else {
            self.emit_state(from, self.state.phase(), reason, &room_id, &peer_id);
        }
        Ok(())
    }

    fn emit_state(
        &self,
        from: CallPhase,
        to: CallPhase,
        reason: TransitionReason,
        room_id: &Option<RoomId>,
        peer_id: &Option<String>,
    ) {
        info!("{}: {from} -> {to} ({reason:?})", self.me.id);
        let _ = self.events.state_changed.send(Arc::new(StateChanged {
            from,
            to,
            reason,
            room_id: room_id.clone(),
            peer_id: peer_id.clone(),
        }));
    }

    fn call_context(&self) -> Option<(RoomId, String)> {
        self.state
            .session()
            .map(|session| (session.room_id().clone(), session.peer.id.clone()))
    }

    fn peer_id(&self) -> Option<String> {
        self.state.session().map(|session| session.peer.id.clone())
    }

    // --- collaborators ---

    async fn acquire_media(&self, call_type: CallType) -> Result<LocalMedia, CallError> {
        let tracks = self
            .services
            .media
            .acquire(MediaConstraints::for_call(call_type))
            .await?;
        Ok(LocalMedia::new(tracks))
    }

    async fn join_room(&self, session: &CallSession) -> Result<JoinedRoom, CallError> {
        let request = JoinRequest::new(
            session.room_id().clone(),
            &self.me.id,
            &self.me.name,
            session.call_type(),
        );
        let RoomSession { handle, events } = self.services.rooms.join_room(request).await?;
        info!(
            "Joined room {} as {}",
            handle.room_id, handle.participant_id
        );
        Ok(JoinedRoom {
            handle,
            events: Some(events),
        })
    }

    /// Writes `record` under our own key, then the peer's. If the peer's
    /// write fails our key is put back to `previous` (or removed), so the
    /// peer never sees a half-written pair.
    async fn write_pair(
        &self,
        peer_id: &str,
        record: &CallRecord,
        previous: Option<&CallRecord>,
    ) -> Result<(), CallError> {
        let store = &self.services.store;
        store.write_record(&self.me.id, record).await?;
        if let Err(err) = store.write_record(peer_id, record).await {
            warn!("Writing call record for {peer_id} failed, rolling back own record: {err}");
            let rollback = match previous {
                Some(previous) => store.write_record(&self.me.id, previous).await,
                None => store.remove_record(&self.me.id).await,
            };
            if let Err(rollback_err) = rollback {
                warn!("Rollback of own call record failed: {rollback_err}");
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Removes both records. Both removals are attempted even if the first
    /// one fails.
    async fn remove_pair(&self, peer_id: &str) -> Result<(), CallError> {
        let store = &self.services.store;
        let peer = store.remove_record(peer_id).await;
        let own = store.remove_record(&self.me.id).await;
        peer.and(own).map_err(CallError::from)
    }

    async fn remove_pair_reporting(&self, peer_id: &str, action: CallAction) {
        if let Err(err) = self.remove_pair(peer_id).await {
            self.report(action, &err);
        }
    }

    async fn push_offer(&self, callee_id: &str, offer: &CallRecord) {
        let Some(notifier) = &self.services.notifier else {
            return;
        };
        let payload = IncomingCallPush::for_record(offer);
        if let Err(err) = notifier.push(callee_id, &payload).await {
            warn!("Push notification to {callee_id} failed: {err}");
        }
    }
}
