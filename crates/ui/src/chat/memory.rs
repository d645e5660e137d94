use colloquy_api::{ApiResult, ChatBackend, ChatId};
use futures::future::BoxFuture;

pub const TRANSFER_OPTION_LABEL: &str = "Transfer to long-term memory";

/// Destructive or archival operations on a chat's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOperation {
    /// Clears the displayed history, optionally archiving it first.
    DeleteShortTerm { transfer_first: bool },
    DeleteLongTerm,
    TransferToLongTerm,
}

impl MemoryOperation {
    /// Phrase used in failure messages: "failed to {operation}".
    pub fn describe(&self) -> &'static str {
        match self {
            Self::DeleteShortTerm { .. } => "delete short-term memory",
            Self::DeleteLongTerm => "delete long-term memory",
            Self::TransferToLongTerm => "transfer messages to long-term memory",
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            Self::DeleteShortTerm {
                transfer_first: false,
            } => "All messages deleted.",
            Self::DeleteShortTerm {
                transfer_first: true,
            } => "Messages transferred to long-term memory and deleted.",
            Self::DeleteLongTerm => "Long-term memory deleted.",
            Self::TransferToLongTerm => "Messages transferred to long-term memory.",
        }
    }

    /// Whether success empties the local history.
    pub fn clears_history(&self) -> bool {
        matches!(self, Self::DeleteShortTerm { .. })
    }

    pub fn dispatch(
        self,
        backend: &dyn ChatBackend,
        chat_id: ChatId,
    ) -> BoxFuture<'static, ApiResult<()>> {
        match self {
            Self::DeleteShortTerm { transfer_first } => {
                backend.delete_short_term(chat_id, transfer_first)
            }
            Self::DeleteLongTerm => backend.delete_long_term(chat_id),
            Self::TransferToLongTerm => backend.transfer_to_long_term(chat_id),
        }
    }

    fn dialog(self) -> ConfirmationDialog {
        let (title, prompt, confirm_label) = match self {
            Self::DeleteShortTerm { .. } => (
                "Delete All Messages",
                "Are you sure you want to delete all messages?",
                "Delete All",
            ),
            Self::DeleteLongTerm => (
                "Delete Long-Term Memory",
                "Are you sure you want to delete this chat's long-term memory?",
                "Delete",
            ),
            Self::TransferToLongTerm => (
                "Transfer to Long-Term Memory",
                "Move the current messages into long-term memory?",
                "Transfer",
            ),
        };
        let transfer_first = match self {
            Self::DeleteShortTerm { transfer_first } => Some(transfer_first),
            Self::DeleteLongTerm | Self::TransferToLongTerm => None,
        };

        ConfirmationDialog {
            operation: self,
            title,
            prompt,
            confirm_label,
            transfer_first,
        }
    }
}

/// Pending confirmation for a memory operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationDialog {
    pub operation: MemoryOperation,
    pub title: &'static str,
    pub prompt: &'static str,
    pub confirm_label: &'static str,
    /// State of the transfer checkbox; only delete-short-term carries one.
    pub transfer_first: Option<bool>,
}

impl ConfirmationDialog {
    /// The operation as it will run if confirmed now.
    pub fn resolved_operation(&self) -> MemoryOperation {
        match (self.operation, self.transfer_first) {
            (MemoryOperation::DeleteShortTerm { .. }, Some(transfer_first)) => {
                MemoryOperation::DeleteShortTerm { transfer_first }
            }
            (operation, _) => operation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRejection {
    Busy { active: MemoryOperation },
}

/// Confirmation dialog state plus the single in-flight memory operation.
#[derive(Debug, Default)]
pub struct MemoryController {
    dialog: Option<ConfirmationDialog>,
    in_flight: Option<MemoryOperation>,
}

impl MemoryController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dialog(&self) -> Option<&ConfirmationDialog> {
        self.dialog.as_ref()
    }

    pub fn in_flight(&self) -> Option<MemoryOperation> {
        self.in_flight
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Opens the dialog for `operation`, replacing any dialog already open.
    pub fn request(&mut self, operation: MemoryOperation) -> &ConfirmationDialog {
        self.dialog.insert(operation.dialog())
    }

    /// Toggles the transfer checkbox. Returns false when no dialog offers it.
    pub fn set_transfer_first(&mut self, transfer_first: bool) -> bool {
        match self.dialog.as_mut() {
            Some(ConfirmationDialog {
                transfer_first: Some(value),
                ..
            }) => {
                *value = transfer_first;
                true
            }
            _ => false,
        }
    }

    /// Closes the dialog and returns the confirmed operation.
    pub fn take_confirmed(&mut self) -> Option<MemoryOperation> {
        self.dialog
            .take()
            .map(|dialog| dialog.resolved_operation())
    }

    pub fn cancel(&mut self) -> bool {
        self.dialog.take().is_some()
    }

    pub fn begin(&mut self, operation: MemoryOperation) -> Result<(), MemoryRejection> {
        if let Some(active) = self.in_flight {
            return Err(MemoryRejection::Busy { active });
        }
        self.in_flight = Some(operation);
        Ok(())
    }

    pub fn finish(&mut self, operation: MemoryOperation) -> bool {
        if self.in_flight == Some(operation) {
            self.in_flight = None;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.dialog = None;
        self.in_flight = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_short_term_dialog_carries_transfer_checkbox() {
        let mut controller = MemoryController::new();
        let dialog = controller.request(MemoryOperation::DeleteShortTerm {
            transfer_first: false,
        });
        assert_eq!(dialog.title, "Delete All Messages");
        assert_eq!(dialog.confirm_label, "Delete All");
        assert_eq!(dialog.transfer_first, Some(false));

        assert!(controller.set_transfer_first(true));
        assert_eq!(
            controller.take_confirmed(),
            Some(MemoryOperation::DeleteShortTerm {
                transfer_first: true
            })
        );
        assert!(controller.dialog().is_none());
    }

    #[test]
    fn other_dialogs_have_no_checkbox() {
        let mut controller = MemoryController::new();
        controller.request(MemoryOperation::DeleteLongTerm);

        assert!(!controller.set_transfer_first(true));
        assert_eq!(
            controller.take_confirmed(),
            Some(MemoryOperation::DeleteLongTerm)
        );
    }

    #[test]
    fn cancel_dismisses_without_an_operation() {
        let mut controller = MemoryController::new();
        assert!(!controller.cancel());

        controller.request(MemoryOperation::TransferToLongTerm);
        assert!(controller.cancel());
        assert_eq!(controller.take_confirmed(), None);
    }

    #[test]
    fn second_operation_is_rejected_while_one_runs() {
        let mut controller = MemoryController::new();
        controller.begin(MemoryOperation::DeleteLongTerm).unwrap();

        assert_eq!(
            controller.begin(MemoryOperation::TransferToLongTerm),
            Err(MemoryRejection::Busy {
                active: MemoryOperation::DeleteLongTerm
            })
        );
        assert!(!controller.finish(MemoryOperation::TransferToLongTerm));
        assert!(controller.finish(MemoryOperation::DeleteLongTerm));
        assert!(!controller.is_busy());
    }

    #[test]
    fn only_short_term_delete_clears_history() {
        assert!(
            MemoryOperation::DeleteShortTerm {
                transfer_first: true
            }
            .clears_history()
        );
        assert!(!MemoryOperation::DeleteLongTerm.clears_history());
        assert!(!MemoryOperation::TransferToLongTerm.clears_history());
    }
}
