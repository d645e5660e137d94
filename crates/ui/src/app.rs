use std::fmt::Write as _;
use std::num::ParseIntError;
use std::sync::Arc;

use colloquy_api::{ApiError, ChatId};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::chat::events::ThreadEvent;
use crate::chat::memory::{ConfirmationDialog, MemoryOperation, TRANSFER_OPTION_LABEL};
use crate::chat::message_list::RenderedWindow;
use crate::chat::notifier::{NotificationLevel, Notifier};
use crate::chat::view::ThreadController;
use crate::settings::{ClientSettings, SettingsError, SettingsStore};

/// Lines scrolled by `/up` and `/down`.
pub const SCROLL_STEP: f32 = 240.0;

pub const HELP_TEXT: &str = "\
commands:
  <text>              append to the draft and press Enter (sends after the debounce)
  <text>\\             append to the draft and press Shift+Enter (newline)
  /send               send the draft now
  /source N           toggle rendered/source view of message N
  /copy N M           print code block M of message N
  /title TEXT         rename the chat
  /assistants         list assistants available to add
  /add ID  /remove ID change chat participants
  /clear [--transfer] delete short-term memory
  /forget             delete long-term memory
  /archive            transfer messages to long-term memory
  /yes /no            confirm or cancel the open dialog
  /transfer on|off    toggle the transfer checkbox in the dialog
  /up /down /bottom   scroll the transcript
  /back               leave the thread";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("failed to initialize backend on `{stage}`: {source}"))]
    Backend {
        stage: &'static str,
        source: ApiError,
    },
    #[snafu(display("failed to save settings on `{stage}`: {source}"))]
    Settings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("failed to read terminal input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write terminal output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Draft text followed by Enter, or Shift+Enter when `newline` is set.
    Text { text: String, newline: bool },
    Send,
    ToggleSource(usize),
    Copy { message: usize, block: usize },
    Title(String),
    Assistants,
    AddAssistant(String),
    RemoveAssistant(String),
    Memory(MemoryOperation),
    Confirm,
    Cancel,
    Transfer(bool),
    ScrollUp,
    ScrollDown,
    Bottom,
    Help,
    Back,
}

#[derive(Debug, Snafu)]
pub enum CommandError {
    #[snafu(display("unknown command `/{name}`, try /help"))]
    UnknownCommand { name: String },
    #[snafu(display("`/{command}` needs {argument}"))]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[snafu(display("`/{command}` expects a number, got `{raw}`"))]
    InvalidNumber {
        command: &'static str,
        raw: String,
        source: ParseIntError,
    },
    #[snafu(display("expected `on` or `off`, got `{raw}`"))]
    InvalidToggle { raw: String },
}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(match line.strip_suffix('\\') {
            Some(text) => Command::Text {
                text: text.to_string(),
                newline: true,
            },
            None => Command::Text {
                text: line.to_string(),
                newline: false,
            },
        });
    };

    let (name, argument) = match rest.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (rest, ""),
    };

    match name {
        "send" => Ok(Command::Send),
        "source" => Ok(Command::ToggleSource(parse_index("source", argument)?)),
        "copy" => {
            let mut parts = argument.split_whitespace();
            let message = parse_index("copy", parts.next().unwrap_or_default())?;
            let block = parse_index("copy", parts.next().unwrap_or("0"))?;
            Ok(Command::Copy { message, block })
        }
        "title" => required("title", "a title", argument).map(Command::Title),
        "assistants" => Ok(Command::Assistants),
        "add" => required("add", "an assistant id", argument).map(Command::AddAssistant),
        "remove" => required("remove", "an assistant id", argument).map(Command::RemoveAssistant),
        "clear" => Ok(Command::Memory(MemoryOperation::DeleteShortTerm {
            transfer_first: argument == "--transfer",
        })),
        "forget" => Ok(Command::Memory(MemoryOperation::DeleteLongTerm)),
        "archive" => Ok(Command::Memory(MemoryOperation::TransferToLongTerm)),
        "yes" => Ok(Command::Confirm),
        "no" => Ok(Command::Cancel),
        "transfer" => match argument {
            "on" => Ok(Command::Transfer(true)),
            "off" => Ok(Command::Transfer(false)),
            raw => InvalidToggleSnafu { raw }.fail(),
        },
        "up" => Ok(Command::ScrollUp),
        "down" => Ok(Command::ScrollDown),
        "bottom" => Ok(Command::Bottom),
        "help" => Ok(Command::Help),
        "back" | "quit" => Ok(Command::Back),
        name => UnknownCommandSnafu { name }.fail(),
    }
}

fn parse_index(command: &'static str, raw: &str) -> Result<usize, CommandError> {
    if raw.is_empty() {
        return MissingArgumentSnafu {
            command,
            argument: "a message number",
        }
        .fail();
    }
    raw.parse().context(InvalidNumberSnafu { command, raw })
}

fn required(
    command: &'static str,
    argument: &'static str,
    value: &str,
) -> Result<String, CommandError> {
    if value.is_empty() {
        return MissingArgumentSnafu { command, argument }.fail();
    }
    Ok(value.to_string())
}

/// Applies one command. Returns feedback to print, if any.
pub fn apply_command(controller: &mut ThreadController, command: Command) -> Option<String> {
    match command {
        Command::Text { text, newline } => {
            // Lines typed while a submit is pending join the same message.
            let input = controller.input();
            let join_lines = input.has_pending_submit()
                && !input.draft().is_empty()
                && !input.draft().ends_with('\n');
            if join_lines {
                controller.input_mut().insert("\n");
            }
            controller.input_mut().insert(&text);
            controller.press_enter(newline);
            None
        }
        Command::Send => {
            controller.click_send();
            None
        }
        Command::ToggleSource(index) => {
            if controller.toggle_message_view(index) {
                None
            } else {
                Some(format!("no message {index}"))
            }
        }
        Command::Copy { message, block } => Some(
            controller
                .code_block(message, block)
                .unwrap_or_else(|| format!("message {message} has no code block {block}")),
        ),
        Command::Title(title) => {
            controller.rename_title(title);
            None
        }
        Command::Assistants => {
            controller.load_assistant_catalog();
            Some(format_catalog(controller))
        }
        Command::AddAssistant(key) => {
            let found = controller
                .assistant_catalog()
                .iter()
                .find(|assistant| assistant.id.as_str() == key || assistant.name == key)
                .cloned();
            match found {
                Some(assistant) if controller.add_assistant(assistant.clone()) => None,
                Some(assistant) => Some(format!("{} is already in this chat", assistant.name)),
                None => Some(format!("unknown assistant `{key}`, try /assistants")),
            }
        }
        Command::RemoveAssistant(key) => {
            let found = controller.identity().and_then(|chat| {
                chat.assistants()
                    .iter()
                    .find(|assistant| assistant.id.as_str() == key || assistant.name == key)
                    .map(|assistant| assistant.id.clone())
            });
            match found {
                Some(assistant_id) => {
                    controller.remove_assistant(&assistant_id);
                    None
                }
                None => Some(format!("`{key}` is not in this chat")),
            }
        }
        Command::Memory(operation) => {
            let dialog = controller.request_memory_operation(operation);
            Some(format_dialog(dialog))
        }
        Command::Confirm => {
            if controller.memory_dialog().is_none() {
                return Some("nothing to confirm".to_string());
            }
            controller.confirm_memory_operation();
            None
        }
        Command::Cancel => {
            if controller.cancel_memory_operation() {
                Some("cancelled".to_string())
            } else {
                Some("nothing to cancel".to_string())
            }
        }
        Command::Transfer(transfer_first) => {
            if !controller.set_transfer_to_long_term(transfer_first) {
                return Some("no dialog offers a transfer option".to_string());
            }
            controller.memory_dialog().map(format_dialog)
        }
        Command::ScrollUp => {
            controller.scroll_by(-SCROLL_STEP);
            None
        }
        Command::ScrollDown => {
            controller.scroll_by(SCROLL_STEP);
            None
        }
        Command::Bottom => {
            controller.scroll_to_newest();
            None
        }
        Command::Help => Some(HELP_TEXT.to_string()),
        Command::Back => {
            controller.close();
            None
        }
    }
}

pub fn format_dialog(dialog: &ConfirmationDialog) -> String {
    let mut text = format!("{}\n  {}\n", dialog.title, dialog.prompt);
    if let Some(transfer_first) = dialog.transfer_first {
        let mark = if transfer_first { "x" } else { " " };
        let _ = writeln!(text, "  [{mark}] {TRANSFER_OPTION_LABEL}  (/transfer on|off)");
    }
    let _ = write!(text, "  /yes to {}, /no to cancel", dialog.confirm_label);
    text
}

fn format_catalog(controller: &ThreadController) -> String {
    if controller.assistant_catalog().is_empty() {
        return "loading assistants...".to_string();
    }

    let mut text = String::from("assistants:");
    for assistant in controller.assistant_catalog() {
        let joined = controller
            .identity()
            .is_some_and(|chat| chat.has_assistant(&assistant.id));
        let mark = if joined { "*" } else { " " };
        let _ = write!(text, "\n {mark} {} ({})", assistant.name, assistant.id);
    }
    text
}

/// Renders the mounted rows of the transcript, top to bottom.
pub fn format_window(title: &str, window: &RenderedWindow) -> String {
    let mut text = format!("== {title} ==");
    for row in &window.rows {
        let view = &row.view;
        let _ = write!(text, "\n[{}] {}", view.index, view.sender);
        if let Some(timestamp) = view.timestamp.as_deref() {
            let _ = write!(text, " @ {timestamp}");
        }
        if view.show_source {
            text.push_str(" (source)");
        }
        if view.code_block_count > 0 {
            let _ = write!(text, " [{} code]", view.code_block_count);
        }
        for line in &view.lines {
            let _ = write!(text, "\n    {line}");
        }
    }
    if !window.following_bottom {
        text.push_str("\n-- more below, /bottom to jump --");
    }
    text
}

/// Prints notifications inline with the transcript.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, message: &str, level: NotificationLevel) {
        tracing::debug!(%level, "{message}");
        eprintln!("[{level}] {message}");
    }
}

enum Step {
    Line(Option<String>),
    Event(Option<ThreadEvent>),
}

/// Opens `chat_id` and drives the thread from `input` until `/back` or end of input.
pub async fn run_thread<R, W>(
    controller: &mut ThreadController,
    chat_id: ChatId,
    input: R,
    output: &mut W,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    controller.open(chat_id);
    controller.load_assistant_catalog();
    let mut lines = input.lines();

    loop {
        let step = tokio::select! {
            line = lines.next_line() => Step::Line(line.context(ReadInputSnafu {
                stage: "read-command-line",
            })?),
            event = controller.next_event() => Step::Event(event),
        };

        let feedback = match step {
            Step::Line(None) => {
                // A piped script ends before its last debounce fires.
                if controller.input().has_pending_submit() {
                    controller.click_send();
                    controller.settle().await;
                    write_frame(controller, None, output).await?;
                }
                controller.close();
                break;
            }
            Step::Line(Some(line)) => match parse_command(&line) {
                Ok(Command::Back) => {
                    controller.close();
                    break;
                }
                Ok(command) => apply_command(controller, command),
                Err(error) => Some(error.to_string()),
            },
            Step::Event(Some(event)) => {
                controller.handle_event(event);
                None
            }
            Step::Event(None) => break,
        };

        write_frame(controller, feedback, output).await?;
    }

    Ok(())
}

async fn write_frame<W>(
    controller: &mut ThreadController,
    feedback: Option<String>,
    output: &mut W,
) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
{
    let title = controller
        .identity()
        .map(|chat| chat.title().to_string())
        .unwrap_or_default();
    let mut frame = format_window(&title, &controller.render_window());
    if let Some(feedback) = feedback {
        frame.push('\n');
        frame.push_str(&feedback);
    }
    frame.push('\n');
    output
        .write_all(frame.as_bytes())
        .await
        .context(WriteOutputSnafu {
            stage: "write-transcript",
        })?;
    output.flush().await.context(WriteOutputSnafu {
        stage: "flush-transcript",
    })
}

/// Setting overrides from the command line; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub backend_url: Option<String>,
    pub api_path: Option<String>,
    pub bearer_token: Option<String>,
    pub send_debounce_ms: Option<u64>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(self, current: &ClientSettings) -> ClientSettings {
        ClientSettings {
            backend_url: self.backend_url.unwrap_or_else(|| current.backend_url.clone()),
            api_path: self.api_path.unwrap_or_else(|| current.api_path.clone()),
            bearer_token: self
                .bearer_token
                .unwrap_or_else(|| current.bearer_token.clone()),
            send_debounce_ms: self.send_debounce_ms.unwrap_or(current.send_debounce_ms),
            ..current.clone()
        }
    }
}

/// Persists `update` when it changes anything and returns the active settings.
///
/// The update is applied to the file layer so environment overrides never reach disk.
pub fn configure(
    store: &SettingsStore,
    update: SettingsUpdate,
) -> Result<Arc<ClientSettings>, AppError> {
    if !update.is_empty() {
        let settings = update.apply(&store.stored_settings());
        store.update(settings).context(SettingsSnafu {
            stage: "update-settings",
        })?;
    }
    Ok(store.settings())
}

pub async fn open_thread(settings: &ClientSettings, chat_id: ChatId) -> Result<(), AppError> {
    let backend = colloquy_api::create_backend(settings.to_backend_config()).context(BackendSnafu {
        stage: "create-backend",
    })?;
    let mut controller =
        ThreadController::new(backend, Arc::new(ConsoleNotifier), settings.thread_options())
            .with_back_callback(|| tracing::info!("left chat thread"));

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    run_thread(&mut controller, chat_id, stdin, &mut stdout).await
}
