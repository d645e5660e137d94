use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApiError {
    #[snafu(display("backend base URL '{raw}' is invalid"))]
    InvalidBaseUrl {
        stage: &'static str,
        raw: String,
        source: url::ParseError,
    },
    #[snafu(display("backend base URL '{raw}' cannot carry path segments"))]
    BaseUrlNotHierarchical { stage: &'static str, raw: String },
    #[snafu(display("bearer token is not a valid header value"))]
    InvalidBearerToken {
        stage: &'static str,
        source: reqwest::header::InvalidHeaderValue,
    },
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to {url} failed on `{stage}`: {source}"))]
    Request {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("{}", status_message(*status, body)))]
    Status {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode response on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        source: reqwest::Error,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// HTTP status for rejected requests, `None` for transport and decode failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// The backend reports errors as a bare message body; fall back to the status line when it is empty.
fn status_message(status: u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("backend returned status {status}")
    } else {
        format!("backend returned status {status}: {body}")
    }
}
