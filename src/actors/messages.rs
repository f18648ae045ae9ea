use crate::calls::error::CallError;
use crate::calls::machine::{CallOptions, CallSnapshot};
use duetcore::notify::NotificationAction;
use duetcore::types::call::{Participant, RoomId};
use tokio::sync::oneshot;

pub type Reply<T> = oneshot::Sender<Result<T, CallError>>;

// --- Messages for the CallActor ---
#[derive(Debug)]
pub enum CallCommand {
    StartCall {
        callee: Participant,
        options: CallOptions,
        reply: Reply<RoomId>,
    },
    Accept {
        reply: Reply<()>,
    },
    Reject {
        reply: Reply<()>,
    },
    Cancel {
        reply: Reply<()>,
    },
    HangUp {
        reply: Reply<()>,
    },
    // Accept/decline tapped on a push notification
    Notification {
        action: NotificationAction,
        reply: Reply<()>,
    },
    Snapshot {
        reply: oneshot::Sender<CallSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<(), CallError>>,
    },
}
