use crate::actors::{CallActor, CallCommand};
use crate::actors::messages::Reply;
use crate::calls::error::CallError;
use crate::calls::machine::{CallMachine, CallOptions, CallServices, CallSnapshot};
use crate::config::ClientConfig;
use crate::types::events::EventBus;
use duetcore::notify::NotificationAction;
use duetcore::types::call::{Participant, RoomId};
use log::info;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Handle to one signed-in user's call actor.
///
/// Cloning is cheap; every clone talks to the same actor. The actor stops
/// after [`CallClient::shutdown`] or once every clone is dropped.
#[derive(Clone)]
pub struct CallClient {
    user: Participant,
    command_tx: mpsc::Sender<CallCommand>,
    event_bus: Arc<EventBus>,
}

impl CallClient {
    /// Subscribes to the user's own call record and spawns the actor.
    pub async fn connect(config: ClientConfig, services: CallServices) -> Result<Self, CallError> {
        Self::connect_with_events(config, services, Arc::new(EventBus::new())).await
    }

    /// Like [`CallClient::connect`], publishing to an existing bus so events
    /// caused by the initial record are not missed.
    pub async fn connect_with_events(
        config: ClientConfig,
        services: CallServices,
        event_bus: Arc<EventBus>,
    ) -> Result<Self, CallError> {
        config.validate()?;
        let subscription = services.store.subscribe(&config.user.id).await?;
        let machine = CallMachine::new(
            config.user.clone(),
            config.ring_timeout,
            services,
            event_bus.clone(),
        );
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
        tokio::spawn(CallActor::new(machine, subscription, command_rx).run());
        info!("Call client for {} connected", config.user.id);

        Ok(Self {
            user: config.user,
            command_tx,
            event_bus,
        })
    }

    pub fn user(&self) -> &Participant {
        &self.user
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub async fn start_call(
        &self,
        callee: Participant,
        options: CallOptions,
    ) -> Result<RoomId, CallError> {
        self.request(|reply| CallCommand::StartCall {
            callee,
            options,
            reply,
        })
        .await
    }

    pub async fn accept(&self) -> Result<(), CallError> {
        self.request(|reply| CallCommand::Accept { reply }).await
    }

    pub async fn reject(&self) -> Result<(), CallError> {
        self.request(|reply| CallCommand::Reject { reply }).await
    }

    pub async fn cancel(&self) -> Result<(), CallError> {
        self.request(|reply| CallCommand::Cancel { reply }).await
    }

    pub async fn hang_up(&self) -> Result<(), CallError> {
        self.request(|reply| CallCommand::HangUp { reply }).await
    }

    pub async fn handle_notification(&self, action: NotificationAction) -> Result<(), CallError> {
        self.request(|reply| CallCommand::Notification { action, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<CallSnapshot, CallError> {
        let (reply, rx) = oneshot::channel();
        self.send(CallCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| CallError::NotRunning)
    }

    /// Stops the actor: hangs up an active call, silences alerts, releases
    /// media and unsubscribes from the store.
    pub async fn shutdown(&self) -> Result<(), CallError> {
        self.request(|reply| CallCommand::Shutdown { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> CallCommand,
    ) -> Result<T, CallError> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| CallError::NotRunning)?
    }

    async fn send(&self, command: CallCommand) -> Result<(), CallError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| CallError::NotRunning)
    }
}
