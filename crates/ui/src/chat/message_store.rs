use crate::chat::message::{Message, MessageId};

/// Describes which indices a store mutation touched, so layout caches can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Appended {
        start: usize,
        count: usize,
    },
    Replaced {
        count: usize,
    },
    Toggled(usize),
    Spliced {
        index: usize,
        removed: usize,
        inserted: usize,
    },
}

/// Ordered in-memory log of the active thread.
///
/// Messages are only ever appended in receive order; the sole reordering is a full replace.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    next_message_id: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_message_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|message| message.id == id)
    }

    pub fn placeholder_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.is_placeholder())
            .count()
    }

    pub fn alloc_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_message_id.max(1));
        self.next_message_id = id.0.saturating_add(1);
        id
    }

    pub fn append(&mut self, messages: Vec<Message>) -> StoreChange {
        let start = self.messages.len();
        let count = messages.len();
        self.messages.extend(messages);
        StoreChange::Appended { start, count }
    }

    pub fn replace_all(&mut self, messages: Vec<Message>) -> StoreChange {
        self.messages = messages;
        StoreChange::Replaced {
            count: self.messages.len(),
        }
    }

    /// Flips the view mode of one message; out-of-range indices are ignored.
    pub fn toggle_source(&mut self, index: usize) -> Option<StoreChange> {
        let message = self.messages.get_mut(index)?;
        message.show_source = !message.show_source;
        Some(StoreChange::Toggled(index))
    }

    /// Replaces the message with `id` by `replacement`, keeping its position.
    pub fn replace_message(
        &mut self,
        id: MessageId,
        replacement: Vec<Message>,
    ) -> Option<StoreChange> {
        let index = self.position(id)?;
        let inserted = replacement.len();
        self.messages.splice(index..=index, replacement);
        Some(StoreChange::Spliced {
            index,
            removed: 1,
            inserted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::{MessageKind, MessageOrigin};

    fn server_message(store: &mut MessageStore, text: &str) -> Message {
        let id = store.alloc_id();
        Message::new(id, "Assistant A", text, MessageKind::Assistant, MessageOrigin::Server)
    }

    #[test]
    fn append_reports_new_tail_range() {
        let mut store = MessageStore::new();
        let first = server_message(&mut store, "one");
        assert_eq!(
            store.append(vec![first]),
            StoreChange::Appended { start: 0, count: 1 }
        );

        let second = server_message(&mut store, "two");
        let third = server_message(&mut store, "three");
        assert_eq!(
            store.append(vec![second, third]),
            StoreChange::Appended { start: 1, count: 2 }
        );
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn toggle_out_of_range_is_a_no_op() {
        let mut store = MessageStore::new();
        let message = server_message(&mut store, "only");
        store.append(vec![message]);

        assert_eq!(store.toggle_source(3), None);
        assert!(!store.messages()[0].show_source);

        assert_eq!(store.toggle_source(0), Some(StoreChange::Toggled(0)));
        assert!(store.messages()[0].show_source);
    }

    #[test]
    fn replace_message_splices_batch_in_place() {
        let mut store = MessageStore::new();
        let echo = Message::user_echo(store.alloc_id(), "hello");
        let placeholder = Message::placeholder(store.alloc_id());
        let placeholder_id = placeholder.id;
        store.append(vec![echo, placeholder]);

        let first = server_message(&mut store, "hi");
        let second = server_message(&mut store, "hey");
        let change = store.replace_message(placeholder_id, vec![first, second]);

        assert_eq!(
            change,
            Some(StoreChange::Spliced {
                index: 1,
                removed: 1,
                inserted: 2
            })
        );
        assert_eq!(store.placeholder_count(), 0);
        let texts: Vec<_> = store.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["hello", "hi", "hey"]);
        assert_eq!(store.replace_message(placeholder_id, Vec::new()), None);
    }
}
