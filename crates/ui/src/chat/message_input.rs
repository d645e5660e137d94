use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::chat::events::{ThreadEvent, ThreadEventPayload};
use crate::chat::message::ThreadTarget;

pub const DEFAULT_SEND_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterAction {
    /// Shift+Enter: a newline went into the draft.
    Newline,
    /// Plain Enter: a trailing submit is (re)scheduled.
    Scheduled,
    /// Plain Enter with no open thread.
    Ignored,
}

/// Draft text plus the trailing-edge debounce for Enter.
pub struct MessageInput {
    draft: String,
    debounce: Duration,
    debounce_task: Option<JoinHandle<()>>,
    generation: u64,
}

impl MessageInput {
    pub fn new(debounce: Duration) -> Self {
        Self {
            draft: String::new(),
            debounce,
            debounce_task: None,
            generation: 0,
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn insert(&mut self, text: &str) {
        self.draft.push_str(text);
    }

    pub fn clear(&mut self) {
        self.draft.clear();
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn has_pending_submit(&self) -> bool {
        self.debounce_task.is_some()
    }

    /// Draft as it should be sent. A newline left by a final Shift+Enter is dropped.
    pub fn submission(&self) -> &str {
        self.draft.strip_suffix('\n').unwrap_or(&self.draft)
    }

    pub fn press_enter(
        &mut self,
        shift: bool,
        target: ThreadTarget,
        events: &UnboundedSender<ThreadEvent>,
    ) -> EnterAction {
        if shift {
            self.draft.push('\n');
            return EnterAction::Newline;
        }

        self.schedule_submit(target, events);
        EnterAction::Scheduled
    }

    /// Restarts the debounce window; only the last timer in a burst fires.
    pub fn schedule_submit(&mut self, target: ThreadTarget, events: &UnboundedSender<ThreadEvent>) {
        self.abort_timer();
        self.generation = self.generation.wrapping_add(1);

        let generation = self.generation;
        let delay = self.debounce;
        let events = events.clone();
        self.debounce_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let event = ThreadEvent::new(target, ThreadEventPayload::SubmitDue { generation });
            // The receiver is gone once the thread is dropped.
            let _ = events.send(event);
        }));
    }

    /// Claims a fired timer. Returns false for timers superseded or cancelled since.
    pub fn take_due(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.debounce_task.is_none() {
            return false;
        }
        self.debounce_task = None;
        true
    }

    pub fn cancel_pending(&mut self) {
        self.abort_timer();
        self.generation = self.generation.wrapping_add(1);
    }

    fn abort_timer(&mut self) {
        if let Some(task) = self.debounce_task.take() {
            task.abort();
        }
    }
}

impl Default for MessageInput {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_DEBOUNCE)
    }
}

impl Drop for MessageInput {
    fn drop(&mut self) {
        self.abort_timer();
    }
}
