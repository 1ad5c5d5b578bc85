use serde_json::Value;

use crate::{
    conversation::ConversationBuffer,
    error::{ChannelError, TransportError},
    types::{ConversationOp, Message, Sender},
};

/// Assistant message appended when a send cannot be delivered.
pub const APOLOGY_TEXT: &str = "抱歉，系统暂时无法处理您的请求，请稍后重试。";

/// Send result before it is applied to the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    Failed { error: ChannelError },
}

impl SendOutcome {
    pub fn into_result(self) -> Result<(), ChannelError> {
        match self {
            Self::Delivered => Ok(()),
            Self::Failed { error } => Err(error),
        }
    }
}

/// Convert a transport write result into a stable outcome.
pub fn normalize_send_result(result: Result<(), TransportError>) -> SendOutcome {
    match result {
        Ok(()) => SendOutcome::Delivered,
        Err(err) => SendOutcome::Failed {
            error: ChannelError::send_failed(&err),
        },
    }
}

/// Inspect the dual-endpoint POST reply body.
///
/// An empty or `null` body, or an object with an `error` field, means the
/// backend accepted the request but will not answer it.
pub fn normalize_dual_send_reply(body: Option<&str>) -> SendOutcome {
    let body = body.map(str::trim).filter(|body| !body.is_empty());
    let Some(body) = body else {
        return rejected("send endpoint returned an empty body");
    };

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Null) => rejected("send endpoint returned null"),
        Ok(Value::Object(object)) => match object.get("error") {
            Some(error) if !error.is_null() => {
                rejected(format!("send endpoint reported an error: {error}"))
            }
            _ => SendOutcome::Delivered,
        },
        // Plain-text and non-object acknowledgements count as delivered.
        _ => SendOutcome::Delivered,
    }
}

fn rejected(message: impl Into<String>) -> SendOutcome {
    SendOutcome::Failed {
        error: ChannelError::send_rejected(message),
    }
}

pub fn apology_message(now_ms: i64) -> Message {
    Message::text(Sender::Assistant, APOLOGY_TEXT, now_ms)
}

/// Remove the pending placeholder and append the apology.
pub fn resolve_failed_send(buffer: &mut ConversationBuffer, now_ms: i64) -> Vec<ConversationOp> {
    let mut ops: Vec<_> = buffer.remove_thinking_placeholder().into_iter().collect();
    ops.extend(buffer.add_message(apology_message(now_ms)));
    ops
}
