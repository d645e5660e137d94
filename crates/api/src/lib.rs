use std::sync::Arc;

pub mod backend;
pub mod error;
pub mod http;
pub mod ids;
pub mod types;

pub use backend::ChatBackend;
pub use error::{ApiError, ApiResult};
pub use http::{BackendConfig, HttpChatBackend};
pub use ids::{AssistantId, ChatId};
pub use types::{
    AssistantRecord, ChatRecord, MessageRecord, MessageType, SendMessageRequest,
    SendMessageResponse,
};

/// Builds the default HTTP backend behind the object-safe contract.
pub fn create_backend(config: BackendConfig) -> ApiResult<Arc<dyn ChatBackend>> {
    let backend = HttpChatBackend::new(config)?;
    tracing::info!(base_url = %backend.base_url(), "initialized chat backend");
    Ok(Arc::new(backend))
}
