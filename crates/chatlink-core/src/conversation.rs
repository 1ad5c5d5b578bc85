use thiserror::Error;

use crate::types::{ConversationOp, Message};

/// Errors that can occur while mirroring conversation operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversationMergeError {
    /// A `Remove` referenced an index past the end of the buffer.
    #[error("cannot remove index {index} from a conversation of {len} messages")]
    MissingIndex { index: usize, len: usize },
}

/// Ordered conversation history with the single-placeholder invariant.
///
/// The owning channel mutates it through [`ConversationBuffer::add_message`]
/// and [`ConversationBuffer::remove_thinking_placeholder`]; every mutation
/// returns the [`ConversationOp`]s observers need to stay in sync.
#[derive(Debug, Clone, Default)]
pub struct ConversationBuffer {
    items: Vec<Message>,
}

impl ConversationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in display order.
    pub fn items(&self) -> &[Message] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append one message.
    ///
    /// A new thinking placeholder replaces any existing one, so the buffer
    /// never holds more than one.
    pub fn add_message(&mut self, message: Message) -> Vec<ConversationOp> {
        let mut ops = Vec::with_capacity(2);
        if message.is_thinking {
            ops.extend(self.remove_thinking_placeholder());
        }
        self.items.push(message.clone());
        ops.push(ConversationOp::Append(message));
        ops
    }

    /// Remove the first thinking placeholder, if any.
    pub fn remove_thinking_placeholder(&mut self) -> Option<ConversationOp> {
        let index = self.items.iter().position(|item| item.is_thinking)?;
        self.items.remove(index);
        Some(ConversationOp::Remove { index })
    }

    pub fn has_placeholder(&self) -> bool {
        self.items.iter().any(|item| item.is_thinking)
    }

    pub fn thinking_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_thinking).count()
    }

    /// Apply operations in order, for observer-side mirrors.
    pub fn apply_ops(&mut self, ops: &[ConversationOp]) -> Result<(), ConversationMergeError> {
        for op in ops {
            match op {
                ConversationOp::Append(message) => self.items.push(message.clone()),
                ConversationOp::Remove { index } => {
                    if *index >= self.items.len() {
                        return Err(ConversationMergeError::MissingIndex {
                            index: *index,
                            len: self.items.len(),
                        });
                    }
                    self.items.remove(*index);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::Sender;

    fn user(content: &str) -> Message {
        Message::text(Sender::User, content, 1)
    }

    fn assistant(content: &str) -> Message {
        Message::text(Sender::Assistant, content, 2)
    }

    #[test]
    fn removes_first_placeholder_only() {
        let mut buffer = ConversationBuffer::new();
        buffer.add_message(user("hello"));
        buffer.add_message(Message::placeholder(1));

        let op = buffer
            .remove_thinking_placeholder()
            .expect("placeholder should be removed");
        assert_eq!(op, ConversationOp::Remove { index: 1 });
        assert_eq!(buffer.remove_thinking_placeholder(), None);
        assert_eq!(buffer.items(), &[user("hello")]);
    }

    #[test]
    fn second_placeholder_replaces_the_first() {
        let mut buffer = ConversationBuffer::new();
        buffer.add_message(user("one"));
        buffer.add_message(Message::placeholder(1));
        buffer.add_message(user("two"));
        let ops = buffer.add_message(Message::placeholder(3));

        assert_eq!(
            ops,
            vec![
                ConversationOp::Remove { index: 1 },
                ConversationOp::Append(Message::placeholder(3)),
            ]
        );
        assert_eq!(buffer.thinking_count(), 1);
        assert_eq!(
            buffer.items(),
            &[user("one"), user("two"), Message::placeholder(3)]
        );
    }

    #[test]
    fn mirror_tracks_buffer_through_ops() {
        let mut buffer = ConversationBuffer::new();
        let mut mirror = ConversationBuffer::new();

        let mut ops = buffer.add_message(user("hello"));
        ops.extend(buffer.add_message(Message::placeholder(1)));
        ops.extend(buffer.remove_thinking_placeholder());
        ops.extend(buffer.add_message(assistant("hi")));

        mirror.apply_ops(&ops).expect("ops should replay cleanly");
        assert_eq!(mirror.items(), buffer.items());
        assert!(!mirror.has_placeholder());
    }

    #[test]
    fn reports_missing_index_on_bad_remove() {
        let mut mirror = ConversationBuffer::new();
        mirror
            .apply_ops(&[ConversationOp::Append(user("only"))])
            .expect("append should work");
        let err = mirror
            .apply_ops(&[ConversationOp::Remove { index: 3 }])
            .expect_err("remove past the end must fail");
        assert_eq!(err, ConversationMergeError::MissingIndex { index: 3, len: 1 });
    }
}
