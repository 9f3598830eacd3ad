use crate::http::quota::QuotaError;
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;

/// Known values of [`ApiError::code`]. Unknown codes are kept as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorCode {
    AlreadySold,
    /// Sent along 422, seemingly when a listing was pulled mid-purchase.
    InvalidPurchaseState,
    PriceChanged,
    /// Sales history is disabled for some items (cases for example).
    SalesHistoryUnavailable,
    Other(u32),
}

impl From<u32> for ApiErrorCode {
    fn from(code: u32) -> Self {
        match code {
            4 => Self::AlreadySold,
            6 => Self::InvalidPurchaseState,
            15 => Self::PriceChanged,
            200 => Self::SalesHistoryUnavailable,
            other => Self::Other(other),
        }
    }
}

/// Structured failure reported by the server in a non-success body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    #[serde(skip)]
    pub http_status: u16,
    pub code: u32,
    pub message: String,
}

impl ApiError {
    pub fn kind(&self) -> ApiErrorCode {
        ApiErrorCode::from(self.code)
    }

    pub fn retriable(&self) -> bool {
        if self.kind() == ApiErrorCode::PriceChanged {
            return true;
        }
        match StatusCode::from_u16(self.http_status) {
            Ok(s) => s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error(),
            Err(_) => false,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)
    }
}

/// Decodes a non-success body of the form `{"code": <int>, "message": <string>}`.
///
/// The status comes from the transport, never from the body. A failure here
/// means the server did not tell us what went wrong.
pub fn decode_api_error(body: &[u8], status: StatusCode) -> Result<ApiError, serde_json::Error> {
    let mut err: ApiError = serde_json::from_slice(body)?;
    err.http_status = status.as_u16();
    Ok(err)
}

#[derive(Debug, thiserror::Error)]
#[error("wait cancelled")]
pub struct Cancelled;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("error encoding payload: {0}")]
    Encoding(#[source] serde_json::Error),
    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("credential is not a valid header value")]
    InvalidCredential,
    #[error("error sending request: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("error getting ratelimits: {0}")]
    MalformedQuota(#[from] QuotaError),
    #[error("invalid status code: {}; {}", .0.http_status, .0)]
    Api(ApiError),
    #[error("invalid status code {status}, couldn't read error message: {source}")]
    UndecodableError {
        status: StatusCode,
        #[source]
        source: serde_json::Error,
    },
    #[error("error decoding response: {0}")]
    Decoding(#[source] serde_json::Error),
    #[error("request cancelled")]
    Cancelled,
}

impl From<Cancelled> for DispatchError {
    fn from(_: Cancelled) -> Self {
        DispatchError::Cancelled
    }
}

impl DispatchError {
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            DispatchError::Api(e) => Some(e),
            _ => None,
        }
    }

    /// Whether repeating the same exchange later may succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            DispatchError::Transport(_) => true,
            DispatchError::Api(e) => e.retriable(),
            DispatchError::UndecodableError { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}
