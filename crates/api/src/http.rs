use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use snafu::{ResultExt, ensure};
use url::Url;

use super::backend::ChatBackend;
use super::error::{
    ApiResult, BaseUrlNotHierarchicalSnafu, BuildClientSnafu, DecodeSnafu, InvalidBaseUrlSnafu,
    InvalidBearerTokenSnafu, RequestSnafu, StatusSnafu,
};
use super::ids::ChatId;
use super::types::{
    AssistantRecord, ChatRecord, MessageRecord, SendMessageRequest, SendMessageResponse,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim().to_string(),
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into().trim().to_string();
        self.bearer_token = if token.is_empty() { None } else { Some(token) };
        self
    }
}

/// `reqwest` implementation of the chat REST contract.
#[derive(Debug, Clone)]
pub struct HttpChatBackend {
    client: Client,
    base_url: Url,
}

impl HttpChatBackend {
    pub fn new(config: BackendConfig) -> ApiResult<Self> {
        let base_url = Url::parse(&config.base_url).context(InvalidBaseUrlSnafu {
            stage: "parse-base-url",
            raw: config.base_url.clone(),
        })?;
        ensure!(
            !base_url.cannot_be_a_base(),
            BaseUrlNotHierarchicalSnafu {
                stage: "parse-base-url",
                raw: config.base_url.clone(),
            }
        );

        let mut headers = HeaderMap::new();
        if let Some(token) = config.bearer_token.as_deref() {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).context(
                InvalidBearerTokenSnafu {
                    stage: "build-authorization-header",
                },
            )?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context(BuildClientSnafu {
                stage: "build-client",
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Hierarchy is checked in `new`; segments are percent-encoded by `url`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

async fn execute(request: RequestBuilder, stage: &'static str, url: &Url) -> ApiResult<Response> {
    let response = request.send().await.context(RequestSnafu {
        stage,
        url: url.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(%url, status = status.as_u16(), "backend rejected request on `{stage}`");
        return StatusSnafu {
            stage,
            status: status.as_u16(),
            body,
        }
        .fail();
    }

    Ok(response)
}

async fn execute_json<T: DeserializeOwned>(
    request: RequestBuilder,
    stage: &'static str,
    url: Url,
) -> ApiResult<T> {
    let response = execute(request, stage, &url).await?;
    response.json::<T>().await.context(DecodeSnafu { stage })
}

async fn execute_empty(request: RequestBuilder, stage: &'static str, url: Url) -> ApiResult<()> {
    execute(request, stage, &url).await.map(|_| ())
}

impl ChatBackend for HttpChatBackend {
    fn get_chat(&self, chat_id: ChatId) -> BoxFuture<'static, ApiResult<ChatRecord>> {
        let url = self.endpoint(&["chats", chat_id.as_str()]);
        let request = self.client.get(url.clone());
        execute_json(request, "get-chat", url).boxed()
    }

    fn list_messages(&self, chat_id: ChatId) -> BoxFuture<'static, ApiResult<Vec<MessageRecord>>> {
        let url = self.endpoint(&["chats", chat_id.as_str(), "messages"]);
        let request = self.client.get(url.clone());
        execute_json(request, "list-messages", url).boxed()
    }

    fn send_message(
        &self,
        chat_id: ChatId,
        message: String,
    ) -> BoxFuture<'static, ApiResult<SendMessageResponse>> {
        let url = self.endpoint(&["chats", chat_id.as_str(), "messages"]);
        let request = self
            .client
            .post(url.clone())
            .json(&SendMessageRequest { message });
        execute_json(request, "send-message", url).boxed()
    }

    fn update_chat(&self, chat: ChatRecord) -> BoxFuture<'static, ApiResult<()>> {
        let url = self.endpoint(&["chats", chat.id.as_str()]);
        let request = self.client.put(url.clone()).json(&chat);
        execute_empty(request, "update-chat", url).boxed()
    }

    fn delete_short_term(
        &self,
        chat_id: ChatId,
        transfer_to_long_term: bool,
    ) -> BoxFuture<'static, ApiResult<()>> {
        let url = self.endpoint(&["chats", chat_id.as_str(), "messages"]);
        let request = self
            .client
            .delete(url.clone())
            .query(&[("transferToLongTermMemory", transfer_to_long_term)]);
        execute_empty(request, "delete-short-term", url).boxed()
    }

    fn delete_long_term(&self, chat_id: ChatId) -> BoxFuture<'static, ApiResult<()>> {
        let url = self.endpoint(&["chats", chat_id.as_str(), "messages", "long-term"]);
        let request = self.client.delete(url.clone());
        execute_empty(request, "delete-long-term", url).boxed()
    }

    fn transfer_to_long_term(&self, chat_id: ChatId) -> BoxFuture<'static, ApiResult<()>> {
        let url = self.endpoint(&[
            "chats",
            chat_id.as_str(),
            "messages",
            "transfer-to-long-term",
        ]);
        let request = self.client.post(url.clone());
        execute_empty(request, "transfer-to-long-term", url).boxed()
    }

    fn list_assistants(&self) -> BoxFuture<'static, ApiResult<Vec<AssistantRecord>>> {
        let url = self.endpoint(&["assistants"]);
        let request = self.client.get(url.clone());
        execute_json(request, "list-assistants", url).boxed()
    }
}
