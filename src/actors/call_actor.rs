use super::messages::{CallCommand, Reply};
use crate::calls::error::CallError;
use crate::calls::machine::CallMachine;
use crate::types::events::CallAction;
use duetcore::store::Subscription;
use log::{debug, info, warn};
use std::ops::ControlFlow;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Single execution context for one signed-in user.
///
/// User commands, changes to the user's own call record, room events and the
/// ring timer are all handled here, one at a time, so the machine never sees
/// two events interleaved.
pub struct CallActor {
    machine: CallMachine,
    // Kept alive for the whole session; dropping it unsubscribes.
    subscription: Subscription,
    command_rx: mpsc::Receiver<CallCommand>,
}

impl CallActor {
    pub fn new(
        machine: CallMachine,
        subscription: Subscription,
        command_rx: mpsc::Receiver<CallCommand>,
    ) -> Self {
        Self {
            machine,
            subscription,
            command_rx,
        }
    }

    pub async fn run(mut self) {
        info!("CallActor for {} started", self.machine.me().id);
        loop {
            let deadline = self.machine.ring_deadline();
            // Store updates first: a command must never overtake a record
            // change that was already queued before it.
            tokio::select! {
                biased;

                update = self.subscription.recv() => {
                    let Some(record) = update else {
                        warn!("Signaling store closed the subscription for {}", self.subscription.user_id());
                        self.stop().await;
                        break;
                    };
                    if let Err(err) = self.machine.on_record_changed(record).await {
                        self.machine.report(CallAction::RemoteUpdate, &err);
                    }
                }
                event = self.machine.next_room_event() => {
                    if let Err(err) = self.machine.on_room_event(event).await {
                        self.machine.report(CallAction::Room, &err);
                    }
                }
                _ = ring_timer(deadline) => {
                    if let Err(err) = self.machine.on_ring_timeout().await {
                        self.machine.report(CallAction::RingTimeout, &err);
                    }
                }
                command = self.command_rx.recv() => {
                    let Some(command) = command else {
                        debug!("All call client handles dropped");
                        self.stop().await;
                        break;
                    };
                    if self.handle_command(command).await.is_break() {
                        break;
                    }
                }
            }
        }
        self.subscription.unsubscribe();
        info!("CallActor for {} stopped", self.machine.me().id);
    }

    async fn handle_command(&mut self, command: CallCommand) -> ControlFlow<()> {
        match command {
            CallCommand::StartCall {
                callee,
                options,
                reply,
            } => {
                let result = self.machine.start_call(callee, options).await;
                self.respond(CallAction::StartCall, result, reply);
            }
            CallCommand::Accept { reply } => {
                let result = self.machine.accept().await;
                self.respond(CallAction::Accept, result, reply);
            }
            CallCommand::Reject { reply } => {
                let result = self.machine.reject().await;
                self.respond(CallAction::Reject, result, reply);
            }
            CallCommand::Cancel { reply } => {
                let result = self.machine.cancel().await;
                self.respond(CallAction::Cancel, result, reply);
            }
            CallCommand::HangUp { reply } => {
                let result = self.machine.hang_up().await;
                self.respond(CallAction::HangUp, result, reply);
            }
            CallCommand::Notification { action, reply } => {
                let result = self.machine.on_notification_action(action).await;
                self.respond(CallAction::NotificationAction, result, reply);
            }
            CallCommand::Snapshot { reply } => {
                let _ = reply.send(self.machine.snapshot());
            }
            CallCommand::Shutdown { reply } => {
                let result = self.machine.shutdown().await;
                if let Err(err) = &result {
                    self.machine.report(CallAction::Shutdown, err);
                }
                let _ = reply.send(result);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn respond<T>(&self, action: CallAction, result: Result<T, CallError>, reply: Reply<T>) {
        if let Err(err) = &result {
            self.machine.report(action, err);
        }
        if reply.send(result).is_err() {
            debug!("Caller of {action} went away before the reply");
        }
    }

    async fn stop(&mut self) {
        if let Err(err) = self.machine.shutdown().await {
            self.machine.report(CallAction::Shutdown, &err);
        }
    }
}

async fn ring_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
