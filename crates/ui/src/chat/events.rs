use colloquy_api::{
    ApiResult, AssistantId, AssistantRecord, ChatRecord, MessageRecord, SendMessageResponse,
};

use crate::chat::memory::MemoryOperation;
use crate::chat::message::ThreadTarget;
use crate::chat::send::SendTicket;

/// Which optimistic chat edit a `PUT /chats/{id}` completion belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
    Rename { title: String },
    AddAssistant { assistant_id: AssistantId },
    RemoveAssistant { assistant_id: AssistantId },
}

impl ChatUpdate {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Rename { .. } => "update chat title",
            Self::AddAssistant { .. } => "add assistant",
            Self::RemoveAssistant { .. } => "remove assistant",
        }
    }
}

/// Result of background work, mapped into thread domain language.
#[derive(Debug)]
pub enum ThreadEventPayload {
    Opened {
        chat: ApiResult<ChatRecord>,
        history: ApiResult<Vec<MessageRecord>>,
    },
    SendFinished {
        ticket: SendTicket,
        result: ApiResult<SendMessageResponse>,
    },
    ChatUpdated {
        update: ChatUpdate,
        result: ApiResult<()>,
    },
    MemoryFinished {
        operation: MemoryOperation,
        result: ApiResult<()>,
    },
    AssistantCatalogLoaded(ApiResult<Vec<AssistantRecord>>),
    /// The Enter debounce window elapsed for timer `generation`.
    SubmitDue { generation: u64 },
}

/// Emitted by spawned tasks back onto the owning thread's event channel.
#[derive(Debug)]
pub struct ThreadEvent {
    pub target: ThreadTarget,
    pub payload: ThreadEventPayload,
}

impl ThreadEvent {
    pub fn new(target: ThreadTarget, payload: ThreadEventPayload) -> Self {
        Self { target, payload }
    }

    /// True for network completions; false for local timers.
    pub fn is_request_completion(&self) -> bool {
        !matches!(self.payload, ThreadEventPayload::SubmitDue { .. })
    }
}
