//! Core conversation-channel contract shared by the runtime and its observers.
//!
//! This crate defines the data model, connection state machine, reconnect
//! policy, conversation buffer, inbound ingestion pipeline, and the common
//! error/channel abstractions. Nothing in here performs I/O.

/// Async command/event channel primitives.
pub mod channel;
/// Per-channel configuration and endpoint targets.
pub mod config;
/// Ordered conversation buffer with the thinking-placeholder protocol.
pub mod conversation;
/// Stable channel error types and HTTP classification helpers.
pub mod error;
/// Inbound payload parsing, dedup and dispatch.
pub mod ingest;
/// Send-outcome normalization and the apology fallback.
pub mod normalization;
/// Reconnect delay policy.
pub mod retry;
/// Connection lifecycle state machine.
pub mod state_machine;
/// Observer-facing data types.
pub mod types;

pub use channel::{ChannelBus, ChannelBusError, ChannelCommand, EventStream, Reply};
pub use config::{ChannelConfig, ChannelKind, ChannelTarget, UnknownChannelKind};
pub use conversation::{ConversationBuffer, ConversationMergeError};
pub use error::{ChannelError, ChannelErrorCategory, TransportError, classify_http_status};
pub use ingest::{Envelope, IngestProfile, IngestReport, IngestionPipeline, ParseError};
pub use normalization::{
    APOLOGY_TEXT, SendOutcome, apology_message, normalize_dual_send_reply, normalize_send_result,
    resolve_failed_send,
};
pub use retry::ReconnectPolicy;
pub use state_machine::ConnectionStateMachine;
pub use types::{
    ChannelEvent, ConnectionState, ConnectionStatus, ContentType, ConversationOp, Message,
    OutboundMessage, Sender, StatusReason,
};
