use colloquy_api::ApiError;
use snafu::Snafu;

/// Failures surfaced by a thread. None of them are fatal; they are shown and logged.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ThreadError {
    #[snafu(display("failed to load chat on `{operation}`: {source}"))]
    FetchFailure {
        operation: &'static str,
        source: ApiError,
    },
    #[snafu(display("Error sending message: {source}"))]
    SendFailure { source: ApiError },
    #[snafu(display("failed to {operation}: {source}"))]
    MutationFailure {
        operation: &'static str,
        source: ApiError,
    },
}

impl ThreadError {
    pub fn api_error(&self) -> &ApiError {
        match self {
            Self::FetchFailure { source, .. }
            | Self::SendFailure { source }
            | Self::MutationFailure { source, .. } => source,
        }
    }
}

pub type ThreadResult<T> = Result<T, ThreadError>;
