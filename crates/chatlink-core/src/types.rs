use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Connection lifecycle state reported to observers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport is active. Either never started, failed, or stopped.
    #[default]
    Disconnected,
    /// Transport setup (socket handshake or first poll) is in progress.
    Connecting,
    /// Transport is live.
    Connected,
}

/// Sub-reason paired with a [`ConnectionState`]; the status text is derived from it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StatusReason {
    /// Channel has not been started yet.
    #[default]
    Idle,
    /// A connection attempt is running.
    Connecting,
    /// The transport is live.
    Connected,
    /// The scripted fixture is live.
    ConnectedScripted,
    /// The last request timed out; the poll timer keeps running.
    TimedOut,
    /// The transport closed; a reconnect is scheduled.
    Closed,
    /// The transport reported an error; a reconnect is scheduled.
    Errored,
    /// Transport setup failed before any I/O; a reconnect is scheduled.
    SetupFailed,
    /// `stop()` was called.
    StoppedByCaller,
}

impl StatusReason {
    /// Human-readable status line shown by UI collaborators.
    pub fn text(self) -> &'static str {
        match self {
            Self::Idle => "not connected",
            Self::Connecting => "connecting...",
            Self::Connected => "connected",
            Self::ConnectedScripted => "connected (mock)",
            Self::TimedOut => "request timed out, retrying...",
            Self::Closed => "connection closed, reconnecting...",
            Self::Errored => "connection error, reconnecting...",
            Self::SetupFailed => "setup failed, reconnecting...",
            Self::StoppedByCaller => "disconnected by caller",
        }
    }
}

/// Connection state plus the reason it was entered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Why the channel is in `state`.
    pub reason: StatusReason,
}

impl ConnectionStatus {
    pub fn new(state: ConnectionState, reason: StatusReason) -> Self {
        Self { state, reason }
    }

    /// Display text for this status.
    pub fn text(&self) -> &'static str {
        self.reason.text()
    }
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// Media kind carried by a message body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Image,
    Video,
}

/// One entry of the conversation buffer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender: Sender,
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    /// Milliseconds since Unix epoch.
    pub timestamp: i64,
    /// Suggested follow-up replies, in display order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_list: Option<Vec<String>>,
    /// Marks the transient "assistant is thinking" placeholder.
    #[serde(default)]
    pub is_thinking: bool,
}

impl Message {
    /// Plain text message with no suggestions.
    pub fn text(sender: Sender, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            sender,
            content: content.into(),
            content_type: ContentType::Text,
            timestamp,
            content_list: None,
            is_thinking: false,
        }
    }

    /// Empty assistant message marking an in-flight reply.
    pub fn placeholder(timestamp: i64) -> Self {
        Self {
            is_thinking: true,
            ..Self::text(Sender::Assistant, String::new(), timestamp)
        }
    }
}

/// Message submitted by the UI through `send`.
///
/// Serialized as-is for the transport write; unknown fields round-trip through `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: ContentType::Text,
            extra: Map::new(),
        }
    }

    /// Attach an extra wire field (for example `"type": "message"`).
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Single conversation buffer mutation, replayable by observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConversationOp {
    /// Message appended at the end of the buffer.
    Append(Message),
    /// Message at `index` removed (only ever a thinking placeholder).
    Remove { index: usize },
}

/// Event fan-out emitted by a running channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ChannelEvent {
    /// Connection state or status text changed.
    StateChanged(ConnectionStatus),
    /// Conversation buffer changed.
    Conversation(ConversationOp),
    /// Auxiliary avatar/presence stream status, forwarded untouched.
    StreamStatus { data: Value },
}
