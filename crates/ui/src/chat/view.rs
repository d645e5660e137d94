use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use colloquy_api::{AssistantId, AssistantRecord, ChatBackend, ChatId, ChatRecord};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::chat::error::ThreadError;
use crate::chat::events::{ChatUpdate, ThreadEvent, ThreadEventPayload};
use crate::chat::memory::{ConfirmationDialog, MemoryController, MemoryOperation, MemoryRejection};
use crate::chat::message::{ChatIdentity, Message, MessageId, ThreadSessionId, ThreadTarget};
use crate::chat::message_input::{DEFAULT_SEND_DEBOUNCE, EnterAction, MessageInput};
use crate::chat::message_list::{ListConfig, MessageList, RenderedWindow, RowMeasurer};
use crate::chat::notifier::{NotificationLevel, Notifier};
use crate::chat::send::{SendController, SendState, SendTicket, SubmitOutcome};
use crate::chat::virtual_list::{ScrollAlignment, Viewport};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreadOptions {
    pub list: ListConfig,
    pub send_debounce: Duration,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        Self {
            list: ListConfig::default(),
            send_debounce: DEFAULT_SEND_DEBOUNCE,
        }
    }
}

/// Coordinator for one chat thread: history, sending, memory and chat metadata.
///
/// Background requests run as spawned tasks and report back through a channel as
/// [`ThreadEvent`]s. The owner drives the thread by feeding those events to
/// [`ThreadController::handle_event`] (or [`ThreadController::settle`]), so all state is
/// mutated from one place and in arrival order.
pub struct ThreadController {
    backend: Arc<dyn ChatBackend>,
    notifier: Arc<dyn Notifier>,
    on_back: Option<Box<dyn FnMut() + Send>>,
    identity: Option<ChatIdentity>,
    active_chat_id: Option<ChatId>,
    session_id: ThreadSessionId,
    list: MessageList,
    input: MessageInput,
    send: SendController,
    memory: MemoryController,
    assistant_catalog: Vec<AssistantRecord>,
    events_tx: UnboundedSender<ThreadEvent>,
    events_rx: UnboundedReceiver<ThreadEvent>,
    in_flight_requests: usize,
}

impl ThreadController {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        notifier: Arc<dyn Notifier>,
        options: ThreadOptions,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            backend,
            notifier,
            on_back: None,
            identity: None,
            active_chat_id: None,
            session_id: ThreadSessionId::new(0),
            list: MessageList::new(options.list),
            input: MessageInput::new(options.send_debounce),
            send: SendController::new(),
            memory: MemoryController::new(),
            assistant_catalog: Vec::new(),
            events_tx,
            events_rx,
            in_flight_requests: 0,
        }
    }

    /// Callback run by [`ThreadController::close`] to leave the thread view.
    pub fn with_back_callback(mut self, on_back: impl FnMut() + Send + 'static) -> Self {
        self.on_back = Some(Box::new(on_back));
        self
    }

    pub fn with_row_measurer(mut self, measurer: impl RowMeasurer + 'static) -> Self {
        self.list = std::mem::take(&mut self.list).with_measurer(measurer);
        self
    }

    pub fn identity(&self) -> Option<&ChatIdentity> {
        self.identity.as_ref()
    }

    pub fn chat_id(&self) -> Option<&ChatId> {
        self.active_chat_id.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.active_chat_id.is_some()
    }

    pub fn session_id(&self) -> ThreadSessionId {
        self.session_id
    }

    pub fn messages(&self) -> &[Message] {
        self.list.messages()
    }

    pub fn list(&self) -> &MessageList {
        &self.list
    }

    pub fn input(&self) -> &MessageInput {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut MessageInput {
        self.send.note_edit();
        &mut self.input
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.input_mut().set_draft(text);
    }

    pub fn send_state(&self) -> &SendState {
        self.send.state()
    }

    pub fn queued_sends(&self) -> usize {
        self.send.queued_len()
    }

    pub fn memory_dialog(&self) -> Option<&ConfirmationDialog> {
        self.memory.dialog()
    }

    pub fn assistant_catalog(&self) -> &[AssistantRecord] {
        &self.assistant_catalog
    }

    pub fn in_flight_requests(&self) -> usize {
        self.in_flight_requests
    }

    /// Starts a new session on `chat_id` and loads its metadata and history.
    pub fn open(&mut self, chat_id: impl Into<ChatId>) {
        let chat_id = chat_id.into();
        self.begin_session(Some(chat_id.clone()));
        let Some(target) = self.target() else {
            return;
        };

        tracing::info!(chat_id = %chat_id, session = target.session_id.0, "opening chat thread");

        let chat = self.backend.get_chat(chat_id.clone());
        let history = self.backend.list_messages(chat_id);
        self.spawn_request(target, async move {
            let (chat, history) = futures::join!(chat, history);
            ThreadEventPayload::Opened { chat, history }
        });
    }

    /// Leaves the thread. Requests still in flight are not cancelled; their results are dropped.
    pub fn close(&mut self) {
        if let Some(chat_id) = self.active_chat_id.as_ref() {
            tracing::info!(chat_id = %chat_id, session = self.session_id.0, "closing chat thread");
        }

        self.begin_session(None);
        if let Some(on_back) = self.on_back.as_mut() {
            on_back();
        }
    }

    pub fn rename_title(&mut self, title: impl Into<String>) {
        let title = title.into();
        let Some(identity) = self.identity.as_mut() else {
            tracing::warn!("rename requested before chat metadata loaded");
            return;
        };

        identity.set_title(title.clone());
        let record = identity.to_record();
        self.push_chat_update(ChatUpdate::Rename { title }, record);
    }

    pub fn load_assistant_catalog(&mut self) {
        let Some(target) = self.target() else {
            return;
        };

        let request = self.backend.list_assistants();
        self.spawn_request(target, async move {
            ThreadEventPayload::AssistantCatalogLoaded(request.await)
        });
    }

    /// Adds a participant. Returns false when it already takes part or no chat is loaded.
    pub fn add_assistant(&mut self, assistant: AssistantRecord) -> bool {
        let Some(identity) = self.identity.as_mut() else {
            return false;
        };

        let assistant_id = assistant.id.clone();
        if !identity.add_assistant(assistant) {
            tracing::debug!(assistant_id = %assistant_id, "assistant already in chat");
            return false;
        }

        let record = identity.to_record();
        self.push_chat_update(ChatUpdate::AddAssistant { assistant_id }, record);
        true
    }

    pub fn remove_assistant(&mut self, assistant_id: &AssistantId) -> bool {
        let Some(identity) = self.identity.as_mut() else {
            return false;
        };

        if !identity.remove_assistant(assistant_id) {
            return false;
        }

        let record = identity.to_record();
        self.push_chat_update(
            ChatUpdate::RemoveAssistant {
                assistant_id: assistant_id.clone(),
            },
            record,
        );
        true
    }

    /// Sends `text` now, or queues it behind the send already in flight.
    pub fn send(&mut self, text: &str) {
        if !self.is_open() {
            tracing::warn!("send requested with no open thread");
            return;
        }

        match self.send.submit(text) {
            SubmitOutcome::Ignored => tracing::debug!("ignoring blank send"),
            SubmitOutcome::Queued { position } => {
                self.input.clear();
                tracing::info!(position, "send queued behind in-flight message");
            }
            SubmitOutcome::Dispatch(text) => {
                self.dispatch_send(text);
                self.input.clear();
            }
        }
    }

    pub fn press_enter(&mut self, shift: bool) -> EnterAction {
        self.send.note_edit();
        match self.target() {
            Some(target) => self.input.press_enter(shift, target, &self.events_tx),
            None if shift => {
                self.input.insert("\n");
                EnterAction::Newline
            }
            None => EnterAction::Ignored,
        }
    }

    /// Send button: bypasses the Enter debounce.
    pub fn click_send(&mut self) {
        self.input.cancel_pending();
        let text = self.input.submission().to_string();
        self.send(&text);
    }

    pub fn toggle_message_view(&mut self, index: usize) -> bool {
        self.list.toggle_source(index)
    }

    pub fn code_block(&mut self, message_index: usize, block_index: usize) -> Option<String> {
        self.list.code_block(message_index, block_index)
    }

    pub fn request_memory_operation(&mut self, operation: MemoryOperation) -> &ConfirmationDialog {
        self.memory.request(operation)
    }

    pub fn set_transfer_to_long_term(&mut self, transfer_first: bool) -> bool {
        self.memory.set_transfer_first(transfer_first)
    }

    pub fn confirm_memory_operation(&mut self) -> bool {
        match self.memory.take_confirmed() {
            Some(operation) => self.run_memory_operation(operation),
            None => false,
        }
    }

    pub fn cancel_memory_operation(&mut self) -> bool {
        self.memory.cancel()
    }

    /// Runs an already-confirmed memory operation. Returns false when it was not started.
    pub fn run_memory_operation(&mut self, operation: MemoryOperation) -> bool {
        let Some(target) = self.target() else {
            return false;
        };

        if let Err(MemoryRejection::Busy { active }) = self.memory.begin(operation) {
            self.notifier.notify(
                &format!("Please wait: the request to {} is still running.", active.describe()),
                NotificationLevel::Warning,
            );
            return false;
        }

        tracing::info!(?operation, chat_id = %target.chat_id, "running memory operation");
        let request = operation.dispatch(self.backend.as_ref(), target.chat_id.clone());
        self.spawn_request(target, async move {
            ThreadEventPayload::MemoryFinished {
                operation,
                result: request.await,
            }
        });
        true
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) -> bool {
        self.list.set_viewport(Viewport::new(width, height))
    }

    pub fn scroll_by(&mut self, delta: f32) {
        self.list.scroll_by(delta);
    }

    pub fn scroll_to_index(&mut self, index: usize, alignment: ScrollAlignment) {
        self.list.scroll_to_index(index, alignment);
    }

    pub fn scroll_to_newest(&mut self) {
        self.list.scroll_to_newest();
    }

    pub fn render_window(&mut self) -> RenderedWindow {
        self.list.render_window()
    }

    pub async fn next_event(&mut self) -> Option<ThreadEvent> {
        self.events_rx.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<ThreadEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Waits for one event and applies it. Returns false once the channel is closed.
    pub async fn process_next_event(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Applies events until no request or debounce timer is outstanding.
    pub async fn settle(&mut self) {
        while self.in_flight_requests > 0 || self.input.has_pending_submit() {
            if !self.process_next_event().await {
                break;
            }
        }
    }

    pub fn handle_event(&mut self, event: ThreadEvent) {
        if event.is_request_completion() {
            self.in_flight_requests = self.in_flight_requests.saturating_sub(1);
        }

        if self.target().as_ref() != Some(&event.target) {
            // Strict target equality keeps late results out of a reopened or closed thread.
            tracing::debug!(
                chat_id = %event.target.chat_id,
                session = event.target.session_id.0,
                "discarding stale thread event"
            );
            return;
        }

        match event.payload {
            ThreadEventPayload::Opened { chat, history } => self.apply_opened(chat, history),
            ThreadEventPayload::SendFinished { ticket, result } => {
                self.apply_send_finished(ticket, result)
            }
            ThreadEventPayload::ChatUpdated { update, result } => match result {
                Ok(()) => tracing::debug!(?update, "chat update saved"),
                Err(source) => self.report(ThreadError::MutationFailure {
                    operation: update.describe(),
                    source,
                }),
            },
            ThreadEventPayload::MemoryFinished { operation, result } => {
                self.apply_memory_finished(operation, result)
            }
            ThreadEventPayload::AssistantCatalogLoaded(result) => match result {
                Ok(assistants) => {
                    tracing::debug!(count = assistants.len(), "loaded assistant catalog");
                    self.assistant_catalog = assistants;
                }
                Err(source) => self.report(ThreadError::FetchFailure {
                    operation: "list-assistants",
                    source,
                }),
            },
            ThreadEventPayload::SubmitDue { generation } => {
                if self.input.take_due(generation) {
                    let text = self.input.submission().to_string();
                    self.send(&text);
                }
            }
        }
    }

    fn target(&self) -> Option<ThreadTarget> {
        self.active_chat_id
            .clone()
            .map(|chat_id| ThreadTarget::new(chat_id, self.session_id))
    }

    fn begin_session(&mut self, chat_id: Option<ChatId>) {
        // Reserve a fresh session so every result spawned earlier becomes stale.
        self.session_id = ThreadSessionId::new(self.session_id.0.saturating_add(1));
        self.active_chat_id = chat_id;
        self.input.cancel_pending();
        self.memory.reset();

        let dropped = self.send.abandon();
        if dropped > 0 {
            tracing::info!(dropped, "dropped queued sends on session change");
        }

        if self.active_chat_id.is_some() {
            self.identity = None;
            self.input.clear();
            self.list.replace_all(Vec::new());
        }
    }

    fn spawn_request<F>(&mut self, target: ThreadTarget, request: F)
    where
        F: Future<Output = ThreadEventPayload> + Send + 'static,
    {
        self.in_flight_requests += 1;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let payload = request.await;
            // The receiver is gone once the controller is dropped.
            let _ = events.send(ThreadEvent::new(target, payload));
        });
    }

    fn push_chat_update(&mut self, update: ChatUpdate, record: ChatRecord) {
        let Some(target) = self.target() else {
            return;
        };

        let request = self.backend.update_chat(record);
        self.spawn_request(target, async move {
            ThreadEventPayload::ChatUpdated {
                update,
                result: request.await,
            }
        });
    }

    fn dispatch_send(&mut self, text: String) {
        let Some(target) = self.target() else {
            return;
        };

        let echo_id = self.list.alloc_id();
        let placeholder_id = self.list.alloc_id();
        let ticket = match self.send.begin(text.clone(), placeholder_id) {
            Ok(ticket) => ticket,
            Err(rejection) => {
                tracing::warn!(?rejection, "send rejected by state machine");
                return;
            }
        };

        self.list.append(vec![
            Message::user_echo(echo_id, text.clone()),
            Message::placeholder(placeholder_id),
        ]);
        tracing::debug!(ticket = ticket.0, chat_id = %target.chat_id, "sending message");

        let request = self.backend.send_message(target.chat_id.clone(), text);
        self.spawn_request(target, async move {
            ThreadEventPayload::SendFinished {
                ticket,
                result: request.await,
            }
        });
    }

    fn apply_opened(
        &mut self,
        chat: colloquy_api::ApiResult<ChatRecord>,
        history: colloquy_api::ApiResult<Vec<colloquy_api::MessageRecord>>,
    ) {
        let chat = match chat {
            Ok(chat) => chat,
            Err(source) => {
                self.report(ThreadError::FetchFailure {
                    operation: "get-chat",
                    source,
                });
                return;
            }
        };
        self.identity = Some(ChatIdentity::new(chat));

        match history {
            Ok(records) => {
                let mut messages = Vec::with_capacity(records.len());
                for record in records {
                    messages.push(Message::from_record(self.list.alloc_id(), record));
                }
                tracing::info!(count = messages.len(), "loaded chat history");
                self.list.replace_all(messages);
            }
            Err(source) => self.report(ThreadError::FetchFailure {
                operation: "list-messages",
                source,
            }),
        }
    }

    fn apply_send_finished(
        &mut self,
        ticket: SendTicket,
        result: colloquy_api::ApiResult<colloquy_api::SendMessageResponse>,
    ) {
        let (failure, replacement) = match result {
            Ok(response) => {
                let mut batch = Vec::with_capacity(response.messages.len());
                for record in response.messages {
                    batch.push(Message::from_record(self.list.alloc_id(), record));
                }
                (None, batch)
            }
            Err(source) => {
                let error = ThreadError::SendFailure { source };
                tracing::warn!("{error}");
                let reason = error.to_string();
                let message = Message::send_failure(self.list.alloc_id(), reason.clone());
                (Some(reason), vec![message])
            }
        };

        let Some(finished) = self.send.finish(ticket, failure) else {
            return;
        };
        self.resolve_placeholder(finished.placeholder_id, replacement);

        if let Some(next) = self.send.next_queued() {
            self.dispatch_send(next);
        }
    }

    fn resolve_placeholder(&mut self, placeholder_id: MessageId, replacement: Vec<Message>) {
        if self.list.store().position(placeholder_id).is_some() {
            self.list.replace_message(placeholder_id, replacement);
        } else {
            // History was cleared while the send was in flight.
            self.list.append(replacement);
        }
    }

    fn apply_memory_finished(
        &mut self,
        operation: MemoryOperation,
        result: colloquy_api::ApiResult<()>,
    ) {
        self.memory.finish(operation);

        match result {
            Ok(()) => {
                if operation.clears_history() {
                    self.list.replace_all(Vec::new());
                }
                tracing::info!(?operation, "memory operation finished");
                self.notifier
                    .notify(operation.success_message(), NotificationLevel::Success);
            }
            Err(source) => self.report(ThreadError::MutationFailure {
                operation: operation.describe(),
                source,
            }),
        }
    }

    fn report(&self, error: ThreadError) {
        tracing::error!("{error}");
        self.notifier.notify(&error.to_string(), NotificationLevel::Error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::{MessageKind, PLACEHOLDER_TEXT};
    use crate::chat::notifier::RecordingNotifier;
    use colloquy_api::{ApiError, ApiResult, MessageRecord, MessageType, SendMessageResponse};
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        GetChat(ChatId),
        ListMessages(ChatId),
        Send(String),
        Update(ChatRecord),
        DeleteShortTerm(bool),
        DeleteLongTerm,
        Transfer,
        ListAssistants,
    }

    #[derive(Default)]
    struct FakeBackend {
        chat: Option<ChatRecord>,
        history: Vec<MessageRecord>,
        assistants: Vec<AssistantRecord>,
        send_results: Mutex<VecDeque<ApiResult<SendMessageResponse>>>,
        send_delay: Option<Duration>,
        fail_mutations: bool,
        calls: Mutex<Vec<Call>>,
    }

    fn status(code: u16, body: &str) -> ApiError {
        ApiError::Status {
            stage: "fake",
            status: code,
            body: body.to_string(),
        }
    }

    impl FakeBackend {
        fn with_chat(chat_id: &str) -> Self {
            Self {
                chat: Some(ChatRecord::new(chat_id, "Roadmap")),
                ..Self::default()
            }
        }

        fn history(mut self, history: Vec<MessageRecord>) -> Self {
            self.history = history;
            self
        }

        fn reply(self, result: ApiResult<SendMessageResponse>) -> Self {
            if let Ok(mut results) = self.send_results.lock() {
                results.push_back(result);
            }
            self
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn sent(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Send(text) => Some(text),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn mutation(&self, call: Call) -> BoxFuture<'static, ApiResult<()>> {
            self.record(call);
            let result = if self.fail_mutations {
                Err(status(500, "storage offline"))
            } else {
                Ok(())
            };
            async move { result }.boxed()
        }
    }

    impl ChatBackend for FakeBackend {
        fn get_chat(&self, chat_id: ChatId) -> BoxFuture<'static, ApiResult<ChatRecord>> {
            self.record(Call::GetChat(chat_id));
            let result = self
                .chat
                .clone()
                .ok_or_else(|| status(404, "chat not found"));
            async move { result }.boxed()
        }

        fn list_messages(
            &self,
            chat_id: ChatId,
        ) -> BoxFuture<'static, ApiResult<Vec<MessageRecord>>> {
            self.record(Call::ListMessages(chat_id));
            let history = self.history.clone();
            async move { Ok(history) }.boxed()
        }

        fn send_message(
            &self,
            _chat_id: ChatId,
            message: String,
        ) -> BoxFuture<'static, ApiResult<SendMessageResponse>> {
            self.record(Call::Send(message));
            let result = self
                .send_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(SendMessageResponse::default()));
            let delay = self.send_delay;
            async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            .boxed()
        }

        fn update_chat(&self, chat: ChatRecord) -> BoxFuture<'static, ApiResult<()>> {
            self.mutation(Call::Update(chat))
        }

        fn delete_short_term(
            &self,
            _chat_id: ChatId,
            transfer_to_long_term: bool,
        ) -> BoxFuture<'static, ApiResult<()>> {
            self.mutation(Call::DeleteShortTerm(transfer_to_long_term))
        }

        fn delete_long_term(&self, _chat_id: ChatId) -> BoxFuture<'static, ApiResult<()>> {
            self.mutation(Call::DeleteLongTerm)
        }

        fn transfer_to_long_term(&self, _chat_id: ChatId) -> BoxFuture<'static, ApiResult<()>> {
            self.mutation(Call::Transfer)
        }

        fn list_assistants(&self) -> BoxFuture<'static, ApiResult<Vec<AssistantRecord>>> {
            self.record(Call::ListAssistants);
            let assistants = self.assistants.clone();
            async move { Ok(assistants) }.boxed()
        }
    }

    fn reply_with(text: &str) -> ApiResult<SendMessageResponse> {
        Ok(SendMessageResponse {
            messages: vec![MessageRecord::new("Assistant A", text, MessageType::Assistant)],
        })
    }

    fn controller(backend: &Arc<FakeBackend>, notifier: &Arc<RecordingNotifier>) -> ThreadController {
        ThreadController::new(backend.clone(), notifier.clone(), ThreadOptions::default())
    }

    fn rows(controller: &ThreadController) -> Vec<(String, String, MessageKind)> {
        controller
            .messages()
            .iter()
            .map(|message| (message.sender.clone(), message.text.clone(), message.kind))
            .collect()
    }

    fn row(sender: &str, text: &str, kind: MessageKind) -> (String, String, MessageKind) {
        (sender.to_string(), text.to_string(), kind)
    }

    async fn opened(backend: &Arc<FakeBackend>, notifier: &Arc<RecordingNotifier>) -> ThreadController {
        let mut thread = controller(backend, notifier);
        thread.open("c1");
        thread.settle().await;
        thread
    }

    #[tokio::test]
    async fn open_loads_metadata_then_history() {
        let backend = Arc::new(FakeBackend::with_chat("c1").history(vec![
            MessageRecord::new("Assistant A", "earlier", MessageType::Assistant),
        ]));
        let notifier = Arc::new(RecordingNotifier::new());

        let thread = opened(&backend, &notifier).await;

        assert_eq!(thread.identity().map(ChatIdentity::title), Some("Roadmap"));
        assert_eq!(
            rows(&thread),
            [row("Assistant A", "earlier", MessageKind::Assistant)]
        );
        assert_eq!(
            backend.calls(),
            [
                Call::GetChat(ChatId::new("c1")),
                Call::ListMessages(ChatId::new("c1"))
            ]
        );
        assert!(notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn open_failure_notifies_and_leaves_thread_empty() {
        let backend = Arc::new(FakeBackend::default());
        let notifier = Arc::new(RecordingNotifier::new());

        let thread = opened(&backend, &notifier).await;

        assert!(thread.identity().is_none());
        assert!(thread.messages().is_empty());
        assert_eq!(notifier.levels(), [NotificationLevel::Error]);
        assert!(notifier.notifications()[0].message.contains("chat not found"));
    }

    #[tokio::test]
    async fn send_shows_echo_and_placeholder_then_reply() {
        let backend = Arc::new(FakeBackend::with_chat("c1").reply(reply_with("hi")));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut thread = opened(&backend, &notifier).await;
        thread.set_draft("hello");

        thread.send("hello");

        assert_eq!(
            rows(&thread),
            [
                row("You", "hello", MessageKind::User),
                row("System", PLACEHOLDER_TEXT, MessageKind::System),
            ]
        );
        assert_eq!(thread.list().store().placeholder_count(), 1);
        assert_eq!(thread.input().draft(), "");
        assert!(thread.send_state().is_sending());

        thread.settle().await;

        assert_eq!(
            rows(&thread),
            [
                row("You", "hello", MessageKind::User),
                row("Assistant A", "hi", MessageKind::Assistant),
            ]
        );
        assert_eq!(backend.sent(), ["hello"]);
        assert!(matches!(thread.send_state(), SendState::Succeeded(_)));
    }

    #[tokio::test]
    async fn failed_send_replaces_placeholder_with_error_message() {
        let backend = Arc::new(FakeBackend::with_chat("c1").reply(Err(status(500, "model offline"))));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut thread = opened(&backend, &notifier).await;

        thread.send("hello");
        thread.settle().await;

        assert_eq!(
            rows(&thread),
            [
                row("You", "hello", MessageKind::User),
                row(
                    "System",
                    "Error sending message: backend returned status 500: model offline",
                    MessageKind::System
                ),
            ]
        );
        assert_eq!(thread.list().store().placeholder_count(), 0);
        assert!(matches!(thread.send_state(), SendState::Failed { .. }));
        assert_eq!(thread.input().draft(), "");
    }

    #[tokio::test]
    async fn blank_send_makes_no_request() {
        let backend = Arc::new(FakeBackend::with_chat("c1"));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut thread = opened(&backend, &notifier).await;

        thread.send("   \n");
        thread.click_send();

        assert!(thread.messages().is_empty());
        assert!(backend.sent().is_empty());
        assert_eq!(thread.in_flight_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn enter_burst_sends_the_draft_once() {
        let backend = Arc::new(FakeBackend::with_chat("c1"));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut thread = opened(&backend, &notifier).await;

        thread.set_draft("hello");
        for _ in 0..4 {
            assert_eq!(thread.press_enter(false), EnterAction::Scheduled);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        thread.set_draft("hello world");
        thread.settle().await;

        assert_eq!(backend.sent(), ["hello world"]);
        assert_eq!(thread.input().draft(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn shift_enter_never_sends() {
        let backend = Arc::new(FakeBackend::with_chat("c1"));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut thread = opened(&backend, &notifier).await;

        thread.set_draft("first line");
        assert_eq!(thread.press_enter(true), EnterAction::Newline);
        thread.settle().await;

        assert!(backend.sent().is_empty());
        assert_eq!(thread.input().draft(), "first line\n");
    }

    #[tokio::test(start_paused = true)]
    async fn sends_while_in_flight_are_queued_in_order() {
        let backend = FakeBackend {
            send_delay: Some(Duration::from_millis(50)),
            ..FakeBackend::with_chat("c1")
        };
        let backend = Arc::new(backend.reply(reply_with("one back")).reply(reply_with("two back")));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut thread = opened(&backend, &notifier).await;

        thread.send("one");
        thread.set_draft("two");
        thread.click_send();

        assert_eq!(thread.queued_sends(), 1);
        assert_eq!(thread.input().draft(), "");
        assert_eq!(thread.list().store().placeholder_count(), 1);
        assert_eq!(thread.messages().len(), 2);

        thread.settle().await;

        assert_eq!(backend.sent(), ["one", "two"]);
        assert_eq!(
            rows(&thread),
            [
                row("You", "one", MessageKind::User),
                row("Assistant A", "one back", MessageKind::Assistant),
                row("You", "two", MessageKind::User),
                row("Assistant A", "two back", MessageKind::Assistant),
            ]
        );
    }

    #[tokio::test]
    async fn delete_short_term_with_transfer_clears_and_notifies() {
        let backend = Arc::new(FakeBackend::with_chat("c1").history(vec![
            MessageRecord::new("You", "hello", MessageType::User),
            MessageRecord::new("Assistant A", "hi", MessageType::Assistant),
        ]));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut thread = opened(&backend, &notifier).await;
        assert_eq!(thread.messages().len(), 2);

        let dialog = thread.request_memory_operation(MemoryOperation::DeleteShortTerm {
            transfer_first: false,
        });
        assert_eq!(dialog.transfer_first, Some(false));
        assert!(thread.set_transfer_to_long_term(true));
        assert!(thread.confirm_memory_operation());
        thread.settle().await;

        assert!(thread.messages().is_empty());
        assert!(backend.calls().contains(&Call::DeleteShortTerm(true)));
        assert_eq!(notifier.levels(), [NotificationLevel::Success]);
        assert!(thread.memory_dialog().is_none());
    }

    #[tokio::test]
    async fn cancelled_confirmation_makes_no_request() {
        let backend = Arc::new(FakeBackend::with_chat("c1"));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut thread = opened(&backend, &notifier).await;

        thread.request_memory_operation(MemoryOperation::DeleteLongTerm);
        assert!(thread.cancel_memory_operation());
        assert!(!thread.confirm_memory_operation());
        thread.settle().await;

        assert!(!backend.calls().contains(&Call::DeleteLongTerm));
        assert!(notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn second_memory_operation_is_rejected_while_busy() {
        let backend = Arc::new(FakeBackend::with_chat("c1"));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut thread = opened(&backend, &notifier).await;

        assert!(thread.run_memory_operation(MemoryOperation::TransferToLongTerm));
        assert!(!thread.run_memory_operation(MemoryOperation::DeleteLongTerm));
        thread.settle().await;

        assert_eq!(
            notifier.levels(),
            [NotificationLevel::Warning, NotificationLevel::Success]
        );
        assert!(!backend.calls().contains(&Call::DeleteLongTerm));
        assert!(backend.calls().contains(&Call::Transfer));
    }

    #[tokio::test]
    async fn failed_memory_operation_keeps_history() {
        let backend = FakeBackend {
            fail_mutations: true,
            ..FakeBackend::with_chat("c1")
        };
        let backend = Arc::new(backend.history(vec![MessageRecord::new(
            "You",
            "keep me",
            MessageType::User,
        )]));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut thread = opened(&backend, &notifier).await;

        thread.run_memory_operation(MemoryOperation::DeleteShortTerm {
            transfer_first: false,
        });
        thread.settle().await;

        assert_eq!(thread.messages().len(), 1);
        assert_eq!(notifier.levels(), [NotificationLevel::Error]);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_after_history_clear_is_appended() {
        let backend = FakeBackend {
            send_delay: Some(Duration::from_millis(50)),
            ..FakeBackend::with_chat("c1")
        };
        let backend = Arc::new(backend.reply(reply_with("late")));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut thread = opened(&backend, &notifier).await;

        thread.send("hello");
        thread.run_memory_operation(MemoryOperation::DeleteShortTerm {
            transfer_first: false,
        });
        thread.settle().await;

        assert_eq!(
            rows(&thread),
            [row("Assistant A", "late", MessageKind::Assistant)]
        );
    }

    #[tokio::test]
    async fn results_arriving_after_close_are_discarded() {
        let backend = Arc::new(FakeBackend::with_chat("c1").reply(reply_with("too late")));
        let notifier = Arc::new(RecordingNotifier::new());
        let back_calls = Arc::new(AtomicUsize::new(0));
        let counter = back_calls.clone();
        let mut thread = opened(&backend, &notifier).await.with_back_callback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        thread.send("hello");
        thread.close();
        thread.settle().await;

        assert_eq!(back_calls.load(Ordering::SeqCst), 1);
        assert!(!thread.is_open());
        assert_eq!(thread.in_flight_requests(), 0);
        assert_eq!(thread.list().store().placeholder_count(), 1);
        assert!(!thread.messages().iter().any(|message| message.text == "too late"));
    }

    #[tokio::test]
    async fn reopening_drops_the_previous_sessions_history() {
        let backend = Arc::new(FakeBackend::with_chat("c1").history(vec![MessageRecord::new(
            "Assistant A",
            "from c1",
            MessageType::Assistant,
        )]));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut thread = controller(&backend, &notifier);

        thread.open("c1");
        let first_session = thread.session_id();
        thread.open("c1");
        assert_ne!(thread.session_id(), first_session);
        thread.settle().await;

        // Only the second open's result is applied.
        assert_eq!(thread.messages().len(), 1);
        assert_eq!(thread.in_flight_requests(), 0);
    }

    #[tokio::test]
    async fn rename_is_optimistic_and_not_rolled_back() {
        let backend = FakeBackend {
            fail_mutations: true,
            ..FakeBackend::with_chat("c1")
        };
        let backend = Arc::new(backend);
        let notifier = Arc::new(RecordingNotifier::new());
        let mut thread = opened(&backend, &notifier).await;

        thread.rename_title("Launch plan");
        assert_eq!(thread.identity().map(ChatIdentity::title), Some("Launch plan"));
        thread.settle().await;

        assert_eq!(thread.identity().map(ChatIdentity::title), Some("Launch plan"));
        assert_eq!(notifier.levels(), [NotificationLevel::Error]);
        let updates: Vec<_> = backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Update(record) => Some(record.title),
                _ => None,
            })
            .collect();
        assert_eq!(updates, ["Launch plan"]);
    }

    #[tokio::test]
    async fn assistants_are_added_once_and_removed() {
        let backend = FakeBackend {
            assistants: vec![AssistantRecord::new("a1", "Planner")],
            ..FakeBackend::with_chat("c1")
        };
        let backend = Arc::new(backend);
        let notifier = Arc::new(RecordingNotifier::new());
        let mut thread = opened(&backend, &notifier).await;

        thread.load_assistant_catalog();
        thread.settle().await;
        let planner = thread.assistant_catalog()[0].clone();

        assert!(thread.add_assistant(planner.clone()));
        assert!(!thread.add_assistant(planner));
        thread.settle().await;
        assert_eq!(thread.identity().map(|chat| chat.assistants().len()), Some(1));

        assert!(thread.remove_assistant(&AssistantId::new("a1")));
        thread.settle().await;

        let updates: Vec<_> = backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Update(record) => Some(record.assistants.len()),
                _ => None,
            })
            .collect();
        assert_eq!(updates, [1, 0]);
    }

    #[tokio::test]
    async fn toggling_a_message_invalidates_its_height() {
        let backend = Arc::new(FakeBackend::with_chat("c1").history(vec![MessageRecord::new(
            "Assistant A",
            "**bold**",
            MessageType::Assistant,
        )]));
        let notifier = Arc::new(RecordingNotifier::new());
        let mut thread = opened(&backend, &notifier).await;
        thread.render_window();
        assert!(thread.list().size_cache().is_measured(0));

        assert!(thread.toggle_message_view(0));
        assert!(!thread.list().size_cache().is_measured(0));
        let window = thread.render_window();
        assert_eq!(window.rows[0].view.lines, ["**bold**"]);

        assert!(thread.toggle_message_view(0));
        let window = thread.render_window();
        assert_eq!(window.rows[0].view.lines, ["bold"]);
    }
}
