use chatlink_core::{
    ChannelBus, ChannelCommand, ChannelError, ConnectionState, ConnectionStatus, EventStream,
    Message, OutboundMessage, Reply,
};
use tokio::sync::{oneshot, watch};

/// Cloneable front door of a running channel.
///
/// Dropping every clone shuts the channel task down.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    bus: ChannelBus,
    status: watch::Receiver<ConnectionStatus>,
    conversation: watch::Receiver<Vec<Message>>,
}

impl ChannelHandle {
    pub(crate) fn new(
        bus: ChannelBus,
        status: watch::Receiver<ConnectionStatus>,
        conversation: watch::Receiver<Vec<Message>>,
    ) -> Self {
        Self {
            bus,
            status,
            conversation,
        }
    }

    /// Begin connecting. Rejected while already connecting or connected.
    pub async fn start(&self) -> Result<(), ChannelError> {
        self.request(|reply| ChannelCommand::Start { reply }).await
    }

    /// Echo `message` into the conversation and write it to the transport.
    ///
    /// Resolves once the transport write finished. On failure the pending
    /// placeholder has already been swapped for the apology message.
    pub async fn send(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        self.request(|reply| ChannelCommand::Send { message, reply })
            .await
    }

    /// Cancel all timers and close the transport. Safe to call repeatedly.
    pub async fn stop(&self) -> Result<(), ChannelError> {
        self.request(|reply| ChannelCommand::Stop { reply }).await
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        self.status().state
    }

    pub fn status_text(&self) -> &'static str {
        self.status().text()
    }

    /// Snapshot of the conversation in display order.
    pub fn conversation(&self) -> Vec<Message> {
        self.conversation.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn watch_conversation(&self) -> watch::Receiver<Vec<Message>> {
        self.conversation.clone()
    }

    /// Subscribe to state changes, conversation ops and stream status.
    pub fn subscribe(&self) -> EventStream {
        self.bus.subscribe()
    }

    async fn request(
        &self,
        command: impl FnOnce(Reply<()>) -> ChannelCommand,
    ) -> Result<(), ChannelError> {
        let (reply, response) = oneshot::channel();
        self.bus.send_command(command(reply)).await?;
        response
            .await
            .map_err(|_| ChannelError::channel_closed())?
    }
}
