use colloquy_api::{AssistantId, AssistantRecord, ChatId, ChatRecord, MessageRecord, MessageType};

/// Sender shown on the optimistic echo of outbound text.
pub const USER_ECHO_SENDER: &str = "You";
/// Sender used for placeholders and locally synthesized failures.
pub const SYSTEM_SENDER: &str = "System";
/// Sender assumed for server messages that omit one.
pub const DEFAULT_SERVER_SENDER: &str = "User";
pub const PLACEHOLDER_TEXT: &str = "Typing...";

/// Client-local identifier for one message; never sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Creates a typed message identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Identifier for one open/close lifetime of a thread.
///
/// This must change on every open and close so late responses can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadSessionId(pub u64);

impl ThreadSessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Routing key attached to every asynchronous result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadTarget {
    pub chat_id: ChatId,
    pub session_id: ThreadSessionId,
}

impl ThreadTarget {
    pub fn new(chat_id: ChatId, session_id: ThreadSessionId) -> Self {
        Self {
            chat_id,
            session_id,
        }
    }
}

/// Presentation class of a message. Not guaranteed to agree with `sender`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    User,
    Assistant,
    System,
}

impl From<Option<MessageType>> for MessageKind {
    fn from(value: Option<MessageType>) -> Self {
        match value {
            Some(MessageType::Assistant) => Self::Assistant,
            Some(MessageType::System) => Self::System,
            Some(MessageType::User) | Some(MessageType::Other) | None => Self::User,
        }
    }
}

/// How a message entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageOrigin {
    Server,
    Echo,
    Placeholder,
    LocalError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: String,
    pub text: String,
    pub timestamp: Option<String>,
    pub kind: MessageKind,
    pub show_source: bool,
    pub origin: MessageOrigin,
}

impl Message {
    pub fn new(
        id: MessageId,
        sender: impl Into<String>,
        text: impl Into<String>,
        kind: MessageKind,
        origin: MessageOrigin,
    ) -> Self {
        Self {
            id,
            sender: sender.into(),
            text: text.into(),
            timestamp: None,
            kind,
            show_source: false,
            origin,
        }
    }

    /// Maps one backend record, filling the defaults the backend may omit.
    pub fn from_record(id: MessageId, record: MessageRecord) -> Self {
        let sender = record
            .sender
            .filter(|sender| !sender.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_SENDER.to_string());

        Self {
            id,
            sender,
            text: record.text,
            timestamp: record.timestamp,
            kind: MessageKind::from(record.message_type),
            show_source: false,
            origin: MessageOrigin::Server,
        }
    }

    /// Optimistic echo of outbound user text.
    pub fn user_echo(id: MessageId, text: impl Into<String>) -> Self {
        Self::new(id, USER_ECHO_SENDER, text, MessageKind::User, MessageOrigin::Echo)
    }

    /// Transient placeholder shown while a send is in flight.
    pub fn placeholder(id: MessageId) -> Self {
        Self::new(
            id,
            SYSTEM_SENDER,
            PLACEHOLDER_TEXT,
            MessageKind::System,
            MessageOrigin::Placeholder,
        )
    }

    pub fn send_failure(id: MessageId, reason: impl Into<String>) -> Self {
        Self::new(
            id,
            SYSTEM_SENDER,
            reason,
            MessageKind::System,
            MessageOrigin::LocalError,
        )
    }

    pub fn is_placeholder(&self) -> bool {
        self.origin == MessageOrigin::Placeholder
    }
}

/// Chat metadata owned by the thread.
///
/// The backend record is kept whole so updates echo fields the thread never edits.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatIdentity {
    record: ChatRecord,
}

impl ChatIdentity {
    pub fn new(record: ChatRecord) -> Self {
        Self { record }
    }

    pub fn id(&self) -> &ChatId {
        &self.record.id
    }

    pub fn title(&self) -> &str {
        &self.record.title
    }

    pub fn assistants(&self) -> &[AssistantRecord] {
        &self.record.assistants
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.record.title = title.into();
    }

    pub fn has_assistant(&self, assistant_id: &AssistantId) -> bool {
        self.record
            .assistants
            .iter()
            .any(|assistant| &assistant.id == assistant_id)
    }

    /// Adds a participant; returns false when it already takes part.
    pub fn add_assistant(&mut self, assistant: AssistantRecord) -> bool {
        if self.has_assistant(&assistant.id) {
            return false;
        }
        self.record.assistants.push(assistant);
        true
    }

    pub fn remove_assistant(&mut self, assistant_id: &AssistantId) -> bool {
        let before = self.record.assistants.len();
        self.record
            .assistants
            .retain(|assistant| &assistant.id != assistant_id);
        self.record.assistants.len() != before
    }

    pub fn to_record(&self) -> ChatRecord {
        self.record.clone()
    }
}
