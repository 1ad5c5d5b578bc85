use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::{
    error::ChannelError,
    types::{ChannelEvent, OutboundMessage},
};

/// Broadcast event stream type used by observers.
pub type EventStream = broadcast::Receiver<ChannelEvent>;

/// One-shot reply slot carried by every command.
pub type Reply<T> = oneshot::Sender<Result<T, ChannelError>>;

/// Commands accepted by a running channel task.
#[derive(Debug)]
pub enum ChannelCommand {
    Start { reply: Reply<()> },
    Send { message: OutboundMessage, reply: Reply<()> },
    Stop { reply: Reply<()> },
}

/// Errors returned by channel bus operations.
#[derive(Debug, Error)]
pub enum ChannelBusError {
    /// The command receiver side is closed.
    #[error("command channel is closed")]
    CommandChannelClosed,
}

impl From<ChannelBusError> for ChannelError {
    fn from(_: ChannelBusError) -> Self {
        ChannelError::channel_closed()
    }
}

/// Command/event channel pair linking a channel task and its handles.
#[derive(Clone, Debug)]
pub struct ChannelBus {
    command_tx: mpsc::Sender<ChannelCommand>,
    event_tx: broadcast::Sender<ChannelEvent>,
}

impl ChannelBus {
    /// Create a new channel set and return it with the command receiver.
    pub fn new(
        command_buffer: usize,
        event_buffer: usize,
    ) -> (Self, mpsc::Receiver<ChannelCommand>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));

        (
            Self {
                command_tx,
                event_tx,
            },
            command_rx,
        )
    }

    /// Clone the event sender.
    pub fn event_sender(&self) -> broadcast::Sender<ChannelEvent> {
        self.event_tx.clone()
    }

    /// Subscribe to emitted channel events.
    pub fn subscribe(&self) -> EventStream {
        self.event_tx.subscribe()
    }

    /// Send one command to the channel task.
    pub async fn send_command(&self, command: ChannelCommand) -> Result<(), ChannelBusError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ChannelBusError::CommandChannelClosed)
    }

    /// Emit an event to all subscribers.
    ///
    /// Emission is best-effort; lagged subscribers are handled by `broadcast`.
    pub fn emit(&self, event: ChannelEvent) {
        let _ = self.event_tx.send(event);
    }
}
