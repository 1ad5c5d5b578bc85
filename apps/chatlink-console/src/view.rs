//! Terminal-facing reducer over channel events.

use chatlink_core::{
    ChannelEvent, ConnectionStatus, ConversationBuffer, ConversationOp, Message, Sender,
};
use tracing::{trace, warn};

const THINKING_LINE: &str = "assistant is thinking...";

/// Local mirror of one channel, rebuilt from its event stream.
#[derive(Debug, Default)]
pub struct ConsoleView {
    status: ConnectionStatus,
    conversation: ConversationBuffer,
    out_of_sync: bool,
}

impl ConsoleView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.items()
    }

    /// True after an op could not be applied; call [`Self::resync`].
    pub fn is_out_of_sync(&self) -> bool {
        self.out_of_sync
    }

    /// Replace the mirror with an authoritative snapshot.
    pub fn resync(&mut self, snapshot: Vec<Message>) {
        let ops: Vec<_> = snapshot.into_iter().map(ConversationOp::Append).collect();
        self.conversation = ConversationBuffer::new();
        if let Err(err) = self.conversation.apply_ops(&ops) {
            warn!(%err, "snapshot replay failed");
        }
        self.out_of_sync = false;
    }

    /// Fold one event into the view and return the lines to print.
    pub fn handle_event(&mut self, event: ChannelEvent) -> Vec<String> {
        match event {
            ChannelEvent::StateChanged(status) => {
                self.status = status;
                vec![format!("[status] {}", status.text())]
            }
            ChannelEvent::Conversation(op) => {
                trace!(?op, "conversation op");
                let line = match &op {
                    ConversationOp::Append(message) => Some(render_message(message)),
                    ConversationOp::Remove { .. } => None,
                };
                if let Err(err) = self.conversation.apply_ops(std::slice::from_ref(&op)) {
                    warn!(%err, "conversation mirror diverged");
                    self.out_of_sync = true;
                }
                line.into_iter().collect()
            }
            ChannelEvent::StreamStatus { data } => {
                let status = data
                    .get("status")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                vec![format!("[stream] {status}")]
            }
        }
    }
}

pub fn render_message(message: &Message) -> String {
    if message.is_thinking {
        return format!("  {THINKING_LINE}");
    }
    let who = match message.sender {
        Sender::User => "you",
        Sender::Assistant => "assistant",
    };
    format!("{who}> {}", message.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatlink_core::{ConnectionState, StatusReason};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn append(message: Message) -> ChannelEvent {
        ChannelEvent::Conversation(ConversationOp::Append(message))
    }

    #[test]
    fn status_changes_print_status_text() {
        let mut view = ConsoleView::new();
        let lines = view.handle_event(ChannelEvent::StateChanged(ConnectionStatus::new(
            ConnectionState::Connecting,
            StatusReason::Connecting,
        )));

        assert_eq!(lines, vec!["[status] connecting...".to_owned()]);
        assert_eq!(view.status().state, ConnectionState::Connecting);
    }

    #[test]
    fn placeholder_is_replaced_in_mirror() {
        let mut view = ConsoleView::new();
        view.handle_event(append(Message::text(Sender::User, "hi", 1)));
        let lines = view.handle_event(append(Message::placeholder(2)));
        assert_eq!(lines, vec![format!("  {THINKING_LINE}")]);

        assert!(
            view.handle_event(ChannelEvent::Conversation(ConversationOp::Remove { index: 1 }))
                .is_empty()
        );
        let lines = view.handle_event(append(Message::text(Sender::Assistant, "hello", 3)));

        assert_eq!(lines, vec!["assistant> hello".to_owned()]);
        let contents: Vec<_> = view.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hello"]);
    }

    #[test]
    fn bad_remove_marks_view_out_of_sync_until_resync() {
        let mut view = ConsoleView::new();
        view.handle_event(ChannelEvent::Conversation(ConversationOp::Remove { index: 4 }));
        assert!(view.is_out_of_sync());

        view.resync(vec![Message::text(Sender::User, "hi", 1)]);
        assert!(!view.is_out_of_sync());
        assert_eq!(view.messages().len(), 1);
    }

    #[test]
    fn stream_status_prints_status_field() {
        let mut view = ConsoleView::new();
        let lines = view.handle_event(ChannelEvent::StreamStatus {
            data: json!({"status": "speaking"}),
        });
        assert_eq!(lines, vec!["[stream] speaking".to_owned()]);
    }
}
