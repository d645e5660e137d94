use futures::future::BoxFuture;

use super::error::ApiResult;
use super::ids::ChatId;
use super::types::{AssistantRecord, ChatRecord, MessageRecord, SendMessageResponse};

/// REST contract consumed by the chat thread.
///
/// Futures are boxed and `'static` so callers can hand them straight to a spawned task.
pub trait ChatBackend: Send + Sync {
    fn get_chat(&self, chat_id: ChatId) -> BoxFuture<'static, ApiResult<ChatRecord>>;

    fn list_messages(&self, chat_id: ChatId) -> BoxFuture<'static, ApiResult<Vec<MessageRecord>>>;

    fn send_message(
        &self,
        chat_id: ChatId,
        message: String,
    ) -> BoxFuture<'static, ApiResult<SendMessageResponse>>;

    fn update_chat(&self, chat: ChatRecord) -> BoxFuture<'static, ApiResult<()>>;

    fn delete_short_term(
        &self,
        chat_id: ChatId,
        transfer_to_long_term: bool,
    ) -> BoxFuture<'static, ApiResult<()>>;

    fn delete_long_term(&self, chat_id: ChatId) -> BoxFuture<'static, ApiResult<()>>;

    fn transfer_to_long_term(&self, chat_id: ChatId) -> BoxFuture<'static, ApiResult<()>>;

    fn list_assistants(&self) -> BoxFuture<'static, ApiResult<Vec<AssistantRecord>>>;
}
