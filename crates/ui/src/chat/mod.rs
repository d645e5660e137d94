/// Thread failures surfaced to the user.
pub mod error;
/// Event contracts between background requests and the thread.
pub mod events;
pub mod markdown;
pub mod memory;
/// Domain entities and session routing keys.
pub mod message;
pub mod message_input;
pub mod message_list;
pub mod message_store;
pub mod notifier;
pub mod scroll_manager;
pub mod send;
pub mod size_cache;
pub mod view;
pub mod virtual_list;

pub use error::{ThreadError, ThreadResult};
pub use events::{ChatUpdate, ThreadEvent, ThreadEventPayload};
pub use memory::{ConfirmationDialog, MemoryController, MemoryOperation, MemoryRejection};
pub use message::{
    ChatIdentity, Message, MessageId, MessageKind, MessageOrigin, ThreadSessionId, ThreadTarget,
};
pub use message_input::{EnterAction, MessageInput};
pub use message_list::{
    ListConfig, MessageList, MountedRow, RenderedWindow, RowMeasurer, RowView, TextMeasurer,
};
pub use message_store::{MessageStore, StoreChange};
pub use notifier::{NotificationLevel, Notifier, RecordingNotifier, TracingNotifier};
pub use scroll_manager::ScrollManager;
pub use send::{SendController, SendState, SendTicket, SubmitOutcome};
pub use size_cache::SizeCache;
pub use view::{ThreadController, ThreadOptions};
pub use virtual_list::{ScrollAlignment, Viewport, VirtualList};
