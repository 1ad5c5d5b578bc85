//! Inbound payload pipeline: parse, dedupe, dispatch into the conversation.
//!
//! One raw payload per transport event goes in (a socket text frame or an
//! HTTP response body); an [`IngestReport`] comes out describing every buffer
//! mutation and side-channel update the owning channel has to publish.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    conversation::ConversationBuffer,
    types::{ContentType, ConversationOp, Message, Sender},
};

/// Which transport produced the payload. Decides response shape and dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestProfile {
    /// One socket frame is one envelope. No dedup.
    Stream,
    /// Body is one typed envelope or an array of them.
    Poll,
    /// Body is one reply object whose `type` defaults to `message`.
    Dual,
}

impl IngestProfile {
    fn dedups(self) -> bool {
        matches!(self, Self::Poll | Self::Dual)
    }
}

/// Inbound payload that could not be turned into an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("payload is not valid JSON: {0}")]
    Json(String),
    #[error("envelope is not a JSON object")]
    NotAnObject,
    #[error("envelope has no 'type' field")]
    MissingType,
    #[error("message envelope has neither 'sender' nor 'assistant_text'")]
    MissingSender,
    #[error("message envelope has an invalid field: {0}")]
    InvalidField(String),
}

/// Message fields extracted from a `message` envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub sender: Sender,
    pub content: String,
    pub content_type: ContentType,
    pub timestamp: Option<i64>,
    pub content_list: Option<Vec<String>>,
    pub id: Option<Value>,
}

/// Classified inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Message(InboundMessage),
    Heartbeat,
    /// Avatar/presence stream status. `data` is forwarded untouched.
    Stream { data: Option<Value> },
    Unknown { kind: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageFields {
    sender: Option<Sender>,
    content: Option<String>,
    content_type: Option<ContentType>,
    timestamp: Option<i64>,
    content_list: Option<Vec<String>>,
    id: Option<Value>,
    #[serde(rename = "assistant_text")]
    assistant_text: Option<String>,
}

impl Envelope {
    /// Classify one JSON value. `default_type` applies when `type` is absent.
    pub fn parse(value: &Value, default_type: Option<&str>) -> Result<Self, ParseError> {
        let object = value.as_object().ok_or(ParseError::NotAnObject)?;
        let kind = match object.get("type") {
            Some(Value::String(kind)) => kind.as_str(),
            Some(other) => {
                return Err(ParseError::InvalidField(format!("type: {other}")));
            }
            None => default_type.ok_or(ParseError::MissingType)?,
        };

        match kind {
            "message" => parse_message(value).map(Self::Message),
            "heartbeat" => Ok(Self::Heartbeat),
            "stream" => Ok(Self::Stream {
                data: object.get("data").filter(|data| !data.is_null()).cloned(),
            }),
            other => Ok(Self::Unknown {
                kind: other.to_owned(),
            }),
        }
    }
}

fn parse_message(value: &Value) -> Result<InboundMessage, ParseError> {
    let fields = MessageFields::deserialize(value)
        .map_err(|err| ParseError::InvalidField(err.to_string()))?;

    let (sender, content) = match fields.assistant_text.filter(|text| !text.is_empty()) {
        Some(text) => (Sender::Assistant, text),
        None => (
            fields.sender.ok_or(ParseError::MissingSender)?,
            fields.content.unwrap_or_default(),
        ),
    };

    Ok(InboundMessage {
        sender,
        content,
        content_type: fields.content_type.unwrap_or_default(),
        timestamp: fields.timestamp,
        content_list: fields.content_list,
        id: fields.id,
    })
}

/// Last processed payload plus the forward-only `lastMessageId` cursor.
#[derive(Debug, Clone, Default)]
pub struct DedupCache {
    last_payload: Option<Value>,
    last_message_id: Option<String>,
    /// The cursor is a local timestamp, not a server id.
    synthesized: bool,
}

impl DedupCache {
    pub fn last_message_id(&self) -> Option<&str> {
        self.last_message_id.as_deref()
    }

    fn is_duplicate(&self, payload: &Value) -> bool {
        self.last_payload.as_ref() == Some(payload)
    }

    fn remember(&mut self, payload: Value) {
        self.last_payload = Some(payload);
    }

    fn advance(&mut self, id: Option<&Value>, now_ms: i64) {
        let (next, synthesized) = match id {
            Some(Value::String(id)) if !id.is_empty() => (id.clone(), false),
            Some(Value::Number(id)) => (id.to_string(), false),
            _ => (now_ms.to_string(), true),
        };

        if !self.synthesized
            && let Some(current) = &self.last_message_id
            && let (Ok(current), Ok(candidate)) = (current.parse::<i64>(), next.parse::<i64>())
            && candidate < current
        {
            return;
        }
        self.last_message_id = Some(next);
        self.synthesized = synthesized;
    }
}

/// Everything one payload changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Buffer mutations, in the order they were applied.
    pub ops: Vec<ConversationOp>,
    /// `stream` envelope payloads to forward.
    pub stream_updates: Vec<Value>,
    /// Number of `message` envelopes appended.
    pub messages: usize,
    pub heartbeats: usize,
    /// Payload was identical to the previous one and was dropped.
    pub duplicate: bool,
    /// Payload carried nothing to dispatch (empty body, scalar, untyped object).
    pub ignored: bool,
    pub rejected: Vec<ParseError>,
    /// Envelope types nobody handles.
    pub unknown: Vec<String>,
}

/// Per-channel ingestion state.
#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    profile: IngestProfile,
    dedup: DedupCache,
}

impl IngestionPipeline {
    pub fn new(profile: IngestProfile) -> Self {
        Self {
            profile,
            dedup: DedupCache::default(),
        }
    }

    pub fn profile(&self) -> IngestProfile {
        self.profile
    }

    /// Cursor sent as `lastMessageId` on the next poll.
    pub fn cursor(&self) -> Option<&str> {
        self.dedup.last_message_id()
    }

    /// Ingest one raw payload.
    pub fn ingest(
        &mut self,
        raw: &str,
        buffer: &mut ConversationBuffer,
        now_ms: i64,
    ) -> IngestReport {
        if raw.trim().is_empty() && self.profile != IngestProfile::Stream {
            return IngestReport {
                ignored: true,
                ..IngestReport::default()
            };
        }

        match serde_json::from_str::<Value>(raw) {
            Ok(value) => self.ingest_value(value, buffer, now_ms),
            Err(err) => IngestReport {
                rejected: vec![ParseError::Json(err.to_string())],
                ..IngestReport::default()
            },
        }
    }

    /// Ingest one already-decoded payload.
    pub fn ingest_value(
        &mut self,
        value: Value,
        buffer: &mut ConversationBuffer,
        now_ms: i64,
    ) -> IngestReport {
        let mut report = IngestReport::default();

        if self.profile.dedups() && self.dedup.is_duplicate(&value) {
            report.duplicate = true;
            return report;
        }

        match (self.profile, &value) {
            (IngestProfile::Poll, Value::Array(items)) => {
                for item in items {
                    self.dispatch(Envelope::parse(item, None), buffer, now_ms, &mut report);
                }
            }
            (IngestProfile::Poll, Value::Object(object)) if object.contains_key("type") => {
                self.dispatch(Envelope::parse(&value, None), buffer, now_ms, &mut report);
            }
            (IngestProfile::Dual, Value::Object(_)) => {
                let envelope = Envelope::parse(&value, Some("message"));
                self.dispatch(envelope, buffer, now_ms, &mut report);
            }
            (IngestProfile::Stream, _) => {
                self.dispatch(Envelope::parse(&value, None), buffer, now_ms, &mut report);
            }
            _ => report.ignored = true,
        }

        if self.profile.dedups() {
            self.dedup.remember(value);
        }
        report
    }

    fn dispatch(
        &mut self,
        envelope: Result<Envelope, ParseError>,
        buffer: &mut ConversationBuffer,
        now_ms: i64,
        report: &mut IngestReport,
    ) {
        match envelope {
            Ok(Envelope::Message(inbound)) => {
                if inbound.sender == Sender::Assistant {
                    report.ops.extend(buffer.remove_thinking_placeholder());
                }
                self.dedup.advance(inbound.id.as_ref(), now_ms);
                report.ops.extend(buffer.add_message(Message {
                    sender: inbound.sender,
                    content: inbound.content,
                    content_type: inbound.content_type,
                    timestamp: inbound.timestamp.unwrap_or(now_ms),
                    content_list: inbound.content_list,
                    is_thinking: false,
                }));
                report.messages += 1;
            }
            Ok(Envelope::Heartbeat) => report.heartbeats += 1,
            Ok(Envelope::Stream { data }) => report.stream_updates.extend(data),
            Ok(Envelope::Unknown { kind }) => report.unknown.push(kind),
            Err(err) => report.rejected.push(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn drops_identical_poll_payload() {
        let mut pipeline = IngestionPipeline::new(IngestProfile::Poll);
        let mut buffer = ConversationBuffer::new();
        let body = r#"{"type":"message","sender":"assistant","content":"hi","id":7}"#;

        let first = pipeline.ingest(body, &mut buffer, NOW);
        let second = pipeline.ingest(body, &mut buffer, NOW);

        assert_eq!(first.messages, 1);
        assert!(second.duplicate);
        assert!(second.ops.is_empty());
        assert_eq!(buffer.len(), 1);
        assert_eq!(pipeline.cursor(), Some("7"));
    }

    #[test]
    fn stream_profile_never_dedups() {
        let mut pipeline = IngestionPipeline::new(IngestProfile::Stream);
        let mut buffer = ConversationBuffer::new();
        let frame = r#"{"type":"message","sender":"user","content":"again"}"#;

        pipeline.ingest(frame, &mut buffer, NOW);
        let second = pipeline.ingest(frame, &mut buffer, NOW);

        assert!(!second.duplicate);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn assistant_reply_replaces_placeholder() {
        let mut pipeline = IngestionPipeline::new(IngestProfile::Poll);
        let mut buffer = ConversationBuffer::new();
        buffer.add_message(Message::text(Sender::User, "hello", 1));
        buffer.add_message(Message::placeholder(1));

        let report = pipeline.ingest(
            r#"{"type":"message","sender":"assistant","content":"hi","timestamp":5}"#,
            &mut buffer,
            NOW,
        );

        assert_eq!(
            report.ops,
            vec![
                ConversationOp::Remove { index: 1 },
                ConversationOp::Append(Message::text(Sender::Assistant, "hi", 5)),
            ]
        );
        assert_eq!(
            buffer.items(),
            &[
                Message::text(Sender::User, "hello", 1),
                Message::text(Sender::Assistant, "hi", 5),
            ]
        );
    }

    #[test]
    fn processes_poll_array_in_order() {
        let mut pipeline = IngestionPipeline::new(IngestProfile::Poll);
        let mut buffer = ConversationBuffer::new();
        let body = json!([
            {"type": "message", "sender": "user", "content": "a", "id": 1},
            {"type": "heartbeat"},
            {"type": "stream", "data": {"status": "live"}},
            {"type": "message", "sender": "assistant", "content": "b", "id": 2},
            {"type": "presence"}
        ]);

        let report = pipeline.ingest(&body.to_string(), &mut buffer, NOW);

        assert_eq!(report.messages, 2);
        assert_eq!(report.heartbeats, 1);
        assert_eq!(report.stream_updates, vec![json!({"status": "live"})]);
        assert_eq!(report.unknown, vec!["presence".to_owned()]);
        let contents: Vec<_> = buffer.items().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b"]);
        assert_eq!(pipeline.cursor(), Some("2"));
    }

    #[test]
    fn ignores_untyped_poll_object_and_empty_body() {
        let mut pipeline = IngestionPipeline::new(IngestProfile::Poll);
        let mut buffer = ConversationBuffer::new();

        assert!(pipeline.ingest(r#"{"status":"ok"}"#, &mut buffer, NOW).ignored);
        assert!(pipeline.ingest("", &mut buffer, NOW).ignored);
        assert!(pipeline.ingest("null", &mut buffer, NOW).ignored);
        assert!(buffer.is_empty());
    }

    #[test]
    fn rejects_malformed_json_without_mutation() {
        let mut pipeline = IngestionPipeline::new(IngestProfile::Stream);
        let mut buffer = ConversationBuffer::new();

        let report = pipeline.ingest("{not json", &mut buffer, NOW);

        assert!(matches!(report.rejected.as_slice(), [ParseError::Json(_)]));
        assert!(buffer.is_empty());
    }

    #[test]
    fn rejects_message_without_sender() {
        let mut pipeline = IngestionPipeline::new(IngestProfile::Stream);
        let mut buffer = ConversationBuffer::new();

        let report = pipeline.ingest(r#"{"type":"message","content":"?"}"#, &mut buffer, NOW);

        assert_eq!(report.rejected, vec![ParseError::MissingSender]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn dual_defaults_type_and_reads_assistant_text() {
        let mut pipeline = IngestionPipeline::new(IngestProfile::Dual);
        let mut buffer = ConversationBuffer::new();
        buffer.add_message(Message::placeholder(1));

        let report = pipeline.ingest(r#"{"assistant_text":"answer"}"#, &mut buffer, NOW);

        assert_eq!(report.messages, 1);
        assert_eq!(
            buffer.items(),
            &[Message::text(Sender::Assistant, "answer", NOW)]
        );
        assert_eq!(pipeline.cursor(), Some(NOW.to_string().as_str()));
    }

    #[test]
    fn cursor_never_moves_backwards_for_integer_ids() {
        let mut pipeline = IngestionPipeline::new(IngestProfile::Poll);
        let mut buffer = ConversationBuffer::new();

        pipeline.ingest(
            r#"{"type":"message","sender":"user","content":"a","id":10}"#,
            &mut buffer,
            NOW,
        );
        pipeline.ingest(
            r#"{"type":"message","sender":"user","content":"b","id":4}"#,
            &mut buffer,
            NOW,
        );
        assert_eq!(pipeline.cursor(), Some("10"));

        pipeline.ingest(
            r#"{"type":"message","sender":"user","content":"c","id":"msg-9"}"#,
            &mut buffer,
            NOW,
        );
        assert_eq!(pipeline.cursor(), Some("msg-9"));
    }

    #[test]
    fn server_id_replaces_timestamp_cursor() {
        let mut pipeline = IngestionPipeline::new(IngestProfile::Poll);
        let mut buffer = ConversationBuffer::new();

        pipeline.ingest(
            r#"{"type":"message","sender":"assistant","content":"no id"}"#,
            &mut buffer,
            NOW,
        );
        assert_eq!(pipeline.cursor(), Some(NOW.to_string().as_str()));

        pipeline.ingest(
            r#"{"type":"message","sender":"assistant","content":"a","id":11}"#,
            &mut buffer,
            NOW,
        );
        assert_eq!(pipeline.cursor(), Some("11"));

        pipeline.ingest(
            r#"{"type":"message","sender":"assistant","content":"b","id":12}"#,
            &mut buffer,
            NOW,
        );
        assert_eq!(pipeline.cursor(), Some("12"));
    }

    #[test]
    fn non_string_type_is_invalid() {
        let err = Envelope::parse(&json!({"type": 3}), None).expect_err("numeric type must fail");
        assert!(matches!(err, ParseError::InvalidField(_)));
    }
}
