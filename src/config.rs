use crate::calls::error::CallError;
use duetcore::room::RoomCredentials;
use duetcore::types::call::Participant;
use std::time::Duration;

const DEFAULT_COMMAND_BUFFER: usize = 32;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user: Participant,
    pub credentials: RoomCredentials,
    /// Give up on unanswered calls after this long. `None` rings until
    /// someone accepts, rejects or cancels.
    pub ring_timeout: Option<Duration>,
    pub command_buffer: usize,
}

impl ClientConfig {
    pub fn new(user: Participant, credentials: RoomCredentials) -> Self {
        Self {
            user,
            credentials,
            ring_timeout: None,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }

    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), CallError> {
        if self.user.id.trim().is_empty() {
            return Err(CallError::Config("user id is empty".into()));
        }
        if self.ring_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(CallError::Config("ring timeout must be positive".into()));
        }
        if self.command_buffer == 0 {
            return Err(CallError::Config("command buffer must be positive".into()));
        }
        self.credentials.validate()?;
        Ok(())
    }
}
