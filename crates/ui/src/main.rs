use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colloquy::app::{self, AppError, SettingsUpdate};
use colloquy::settings::SettingsStore;
use colloquy_api::ChatId;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "colloquy", version, about = "Terminal client for multi-assistant chat threads")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Open a chat thread and talk to its assistants.
    Open { chat_id: String },
    /// Print the active settings, or update and persist them.
    Config {
        #[arg(long)]
        backend_url: Option<String>,
        #[arg(long)]
        api_path: Option<String>,
        #[arg(long)]
        bearer_token: Option<String>,
        #[arg(long)]
        send_debounce_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so the transcript on stdout stays readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error}");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let store = SettingsStore::load();

    match cli.command {
        CliCommand::Open { chat_id } => {
            let settings = store.settings();
            app::open_thread(&settings, ChatId::new(chat_id)).await
        }
        CliCommand::Config {
            backend_url,
            api_path,
            bearer_token,
            send_debounce_ms,
        } => {
            let settings = app::configure(
                &store,
                SettingsUpdate {
                    backend_url,
                    api_path,
                    bearer_token,
                    send_debounce_ms,
                },
            )?;

            println!("settings file: {}", store.config_path().display());
            println!("api base url:  {}", settings.api_base_url());
            let token = if settings.bearer_token.is_empty() {
                "(none)"
            } else {
                "(set)"
            };
            println!("bearer token:  {token}");
            println!("send debounce: {} ms", settings.send_debounce_ms);
            Ok(())
        }
    }
}
