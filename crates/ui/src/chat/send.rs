use std::collections::VecDeque;

use crate::chat::message::MessageId;

/// Identifier for one dispatched send; completions carry it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SendTicket(pub u64);

impl SendTicket {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Lifecycle of the thread's outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SendState {
    #[default]
    Idle,
    Composing,
    Sending(SendTicket),
    Succeeded(SendTicket),
    Failed {
        ticket: SendTicket,
        reason: String,
    },
}

/// State transition input for the send lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTransition {
    Edit,
    Dispatch(SendTicket),
    Resolve(SendTicket),
    Fail { ticket: SendTicket, reason: String },
    Reset,
}

/// Rejection reason for illegal send transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTransitionRejection {
    AlreadySending {
        active: SendTicket,
        attempted: SendTicket,
    },
    NoActiveSend,
    TicketMismatch {
        active: SendTicket,
        attempted: SendTicket,
    },
}

pub type SendTransitionResult = Result<SendState, SendTransitionRejection>;

impl SendState {
    pub fn active_ticket(&self) -> Option<SendTicket> {
        match self {
            Self::Sending(ticket) => Some(*ticket),
            Self::Idle | Self::Composing | Self::Succeeded(_) | Self::Failed { .. } => None,
        }
    }

    pub fn is_sending(&self) -> bool {
        matches!(self, Self::Sending(_))
    }

    /// Applies one transition deterministically.
    ///
    /// Editing never interrupts an active send. Terminal transitions must name the active
    /// ticket exactly.
    pub fn apply(&self, transition: SendTransition) -> SendTransitionResult {
        match transition {
            SendTransition::Edit => Ok(match self {
                Self::Sending(_) => self.clone(),
                Self::Idle | Self::Composing | Self::Succeeded(_) | Self::Failed { .. } => {
                    Self::Composing
                }
            }),
            SendTransition::Dispatch(ticket) => self.apply_dispatch(ticket),
            SendTransition::Resolve(ticket) => {
                self.apply_terminal(ticket, Self::Succeeded(ticket))
            }
            SendTransition::Fail { ticket, reason } => {
                self.apply_terminal(ticket, Self::Failed { ticket, reason })
            }
            SendTransition::Reset => Ok(Self::Idle),
        }
    }

    fn apply_dispatch(&self, ticket: SendTicket) -> SendTransitionResult {
        match self {
            Self::Sending(active) if *active != ticket => {
                Err(SendTransitionRejection::AlreadySending {
                    active: *active,
                    attempted: ticket,
                })
            }
            Self::Sending(_) => Ok(self.clone()),
            Self::Idle | Self::Composing | Self::Succeeded(_) | Self::Failed { .. } => {
                Ok(Self::Sending(ticket))
            }
        }
    }

    fn apply_terminal(&self, ticket: SendTicket, next: SendState) -> SendTransitionResult {
        match self {
            Self::Sending(active) if *active == ticket => Ok(next),
            Self::Sending(active) => Err(SendTransitionRejection::TicketMismatch {
                active: *active,
                attempted: ticket,
            }),
            Self::Idle | Self::Composing | Self::Succeeded(_) | Self::Failed { .. } => {
                Err(SendTransitionRejection::NoActiveSend)
            }
        }
    }
}

/// The send currently waiting on the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightSend {
    pub ticket: SendTicket,
    pub placeholder_id: MessageId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank text; nothing happens.
    Ignored,
    /// Another send is in flight; the text waits at this 1-based queue position.
    Queued { position: usize },
    /// The caller should dispatch this text now.
    Dispatch(String),
}

/// Serializes sends for one thread: one in flight, the rest queued FIFO.
#[derive(Debug)]
pub struct SendController {
    state: SendState,
    in_flight: Option<InFlightSend>,
    queue: VecDeque<String>,
    next_ticket: u64,
}

impl SendController {
    pub fn new() -> Self {
        Self {
            state: SendState::Idle,
            in_flight: None,
            queue: VecDeque::new(),
            next_ticket: 1,
        }
    }

    pub fn state(&self) -> &SendState {
        &self.state
    }

    pub fn in_flight(&self) -> Option<&InFlightSend> {
        self.in_flight.as_ref()
    }

    pub fn queued(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(String::as_str)
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn note_edit(&mut self) {
        if let Ok(next) = self.state.apply(SendTransition::Edit) {
            self.state = next;
        }
    }

    pub fn submit(&mut self, text: &str) -> SubmitOutcome {
        if text.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }

        if self.in_flight.is_some() {
            self.queue.push_back(text.to_string());
            return SubmitOutcome::Queued {
                position: self.queue.len(),
            };
        }

        SubmitOutcome::Dispatch(text.to_string())
    }

    /// Moves to `Sending` for `text`, whose placeholder row is `placeholder_id`.
    pub fn begin(
        &mut self,
        text: String,
        placeholder_id: MessageId,
    ) -> Result<SendTicket, SendTransitionRejection> {
        let ticket = SendTicket::new(self.next_ticket);
        self.state = self.state.apply(SendTransition::Dispatch(ticket))?;
        self.next_ticket = self.next_ticket.saturating_add(1);
        self.in_flight = Some(InFlightSend {
            ticket,
            placeholder_id,
            text,
        });
        Ok(ticket)
    }

    /// Resolves the in-flight send. `failure` carries the user-visible reason.
    ///
    /// Returns the finished send, or `None` when `ticket` is not the active one.
    pub fn finish(&mut self, ticket: SendTicket, failure: Option<String>) -> Option<InFlightSend> {
        let transition = match failure {
            None => SendTransition::Resolve(ticket),
            Some(reason) => SendTransition::Fail { ticket, reason },
        };

        match self.state.apply(transition) {
            Ok(next) => {
                self.state = next;
                self.in_flight.take()
            }
            Err(rejection) => {
                tracing::debug!(?rejection, "ignoring send completion");
                None
            }
        }
    }

    /// Next queued text, available only once nothing is in flight.
    pub fn next_queued(&mut self) -> Option<String> {
        if self.in_flight.is_some() {
            return None;
        }
        self.queue.pop_front()
    }

    /// Forgets the in-flight send and drops queued texts. Returns how many were dropped.
    pub fn abandon(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.in_flight = None;
        self.state = SendState::Idle;
        dropped
    }
}

impl Default for SendController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_rejects_out_of_order_completions() {
        let state = SendState::Idle;
        let composing = state.apply(SendTransition::Edit).unwrap();
        assert_eq!(composing, SendState::Composing);

        let sending = composing
            .apply(SendTransition::Dispatch(SendTicket::new(1)))
            .unwrap();
        assert_eq!(sending.active_ticket(), Some(SendTicket::new(1)));
        assert_eq!(sending.apply(SendTransition::Edit), Ok(sending.clone()));

        assert_eq!(
            sending.apply(SendTransition::Dispatch(SendTicket::new(2))),
            Err(SendTransitionRejection::AlreadySending {
                active: SendTicket::new(1),
                attempted: SendTicket::new(2),
            })
        );
        assert_eq!(
            sending.apply(SendTransition::Resolve(SendTicket::new(7))),
            Err(SendTransitionRejection::TicketMismatch {
                active: SendTicket::new(1),
                attempted: SendTicket::new(7),
            })
        );

        let failed = sending
            .apply(SendTransition::Fail {
                ticket: SendTicket::new(1),
                reason: "boom".to_string(),
            })
            .unwrap();
        assert!(!failed.is_sending());
        assert_eq!(
            failed.apply(SendTransition::Resolve(SendTicket::new(1))),
            Err(SendTransitionRejection::NoActiveSend)
        );
        assert_eq!(failed.apply(SendTransition::Reset), Ok(SendState::Idle));
    }

    #[test]
    fn blank_text_is_ignored() {
        let mut controller = SendController::new();
        assert_eq!(controller.submit("  \n\t"), SubmitOutcome::Ignored);
        assert_eq!(controller.queued_len(), 0);
    }

    #[test]
    fn sends_are_serialized_through_a_fifo_queue() {
        let mut controller = SendController::new();
        assert_eq!(
            controller.submit("first"),
            SubmitOutcome::Dispatch("first".to_string())
        );
        let ticket = controller
            .begin("first".to_string(), MessageId::new(2))
            .unwrap();

        assert_eq!(controller.submit("second"), SubmitOutcome::Queued { position: 1 });
        assert_eq!(controller.submit("third"), SubmitOutcome::Queued { position: 2 });
        assert_eq!(controller.next_queued(), None);

        let finished = controller.finish(ticket, None).unwrap();
        assert_eq!(finished.placeholder_id, MessageId::new(2));
        assert_eq!(controller.state(), &SendState::Succeeded(ticket));
        assert_eq!(controller.next_queued().as_deref(), Some("second"));
        assert_eq!(controller.queued().collect::<Vec<_>>(), ["third"]);
    }

    #[test]
    fn stale_ticket_does_not_finish_the_active_send() {
        let mut controller = SendController::new();
        let first = controller.begin("a".to_string(), MessageId::new(1)).unwrap();
        controller.finish(first, Some("down".to_string()));
        let second = controller.begin("b".to_string(), MessageId::new(3)).unwrap();

        assert_eq!(controller.finish(first, None), None);
        assert_eq!(controller.in_flight().map(|send| send.ticket), Some(second));
    }
}
