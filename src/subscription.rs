use crate::error::Result;
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Notification published by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    /// A message changed the mirrored state (raw message text)
    Changed(String),

    /// The device reported its model
    Initialised(String),
}

/// Stream of [`StateUpdate`]s from one session.
///
/// Each receiver gets every update published after it subscribed. One that
/// falls more than 100 updates behind gets a `ChannelError` and then resumes
/// with the oldest update still buffered.
pub struct StateReceiver {
    rx: broadcast::Receiver<StateUpdate>,
}

impl StateReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<StateUpdate>) -> Self {
        Self { rx }
    }

    /// Wait for the next update; `ConnectionClosed` once the session is gone
    pub async fn recv(&mut self) -> Result<StateUpdate> {
        Ok(self.rx.recv().await?)
    }

    /// Next update if one is already queued
    pub fn try_recv(&mut self) -> Result<Option<StateUpdate>> {
        match self.rx.try_recv() {
            Err(TryRecvError::Empty) => Ok(None),
            received => Ok(Some(received?)),
        }
    }
}
