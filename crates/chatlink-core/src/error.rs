use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ConnectionState;

/// Broad error category used for status reporting and failure routing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChannelErrorCategory {
    /// Invalid input, unsupported state, or other configuration issue.
    Config,
    /// Malformed inbound payload.
    Parse,
    /// Request exceeded its timeout. Transient.
    Timeout,
    /// Transport failure or closed connection. Triggers reconnect.
    Transport,
    /// Outbound message could not be delivered.
    Send,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable channel error payload returned across the handle boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct ChannelError {
    /// High-level error category.
    pub category: ChannelErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ChannelError {
    /// Construct a new channel error.
    pub fn new(
        category: ChannelErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: ConnectionState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            ChannelErrorCategory::Config,
            "invalid_state_transition",
            format!("cannot run '{action}' while channel is {current:?}"),
        )
    }

    pub fn empty_message() -> Self {
        Self::new(
            ChannelErrorCategory::Config,
            "empty_message",
            "message content must not be empty",
        )
    }

    pub fn not_connected() -> Self {
        Self::new(
            ChannelErrorCategory::Send,
            "not_connected",
            "socket is not open; message was not sent",
        )
    }

    /// The channel task has exited and no longer accepts commands.
    pub fn channel_closed() -> Self {
        Self::new(
            ChannelErrorCategory::Internal,
            "channel_closed",
            "channel task is no longer running",
        )
    }

    /// Map a transport failure on the send path.
    pub fn send_failed(err: &TransportError) -> Self {
        Self::new(ChannelErrorCategory::Send, "send_failed", err.to_string())
    }

    /// The backend accepted the request but reported it could not process it.
    pub fn send_rejected(message: impl Into<String>) -> Self {
        Self::new(ChannelErrorCategory::Send, "send_rejected", message)
    }
}

/// Failure reported by a transport adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,
    /// The server answered with a non-success status.
    #[error("server responded with HTTP {0}")]
    Status(u16),
    /// Connection refused, DNS failure, TLS failure and similar.
    #[error("request failed: {0}")]
    Request(String),
    /// The persistent connection closed.
    #[error("connection closed{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed(Option<String>),
    /// The transport could not even be set up (bad URL, client build failure).
    #[error("transport setup failed: {0}")]
    Setup(String),
}

impl TransportError {
    /// Timeouts are retried by the running poll timer; everything else is a hard failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    pub fn category(&self) -> ChannelErrorCategory {
        match self {
            Self::Timeout => ChannelErrorCategory::Timeout,
            Self::Status(status) => classify_http_status(*status),
            Self::Request(_) | Self::Closed(_) => ChannelErrorCategory::Transport,
            Self::Setup(_) => ChannelErrorCategory::Config,
        }
    }
}

/// Map HTTP status codes to channel error categories.
pub fn classify_http_status(status: u16) -> ChannelErrorCategory {
    match status {
        408 | 504 => ChannelErrorCategory::Timeout,
        400..=499 => ChannelErrorCategory::Config,
        500..=599 => ChannelErrorCategory::Transport,
        _ => ChannelErrorCategory::Internal,
    }
}
