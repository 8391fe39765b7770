use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Why a request produced no response. Rendered as the `error_kind` metric tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum HttpTransportErrorKind {
    InvalidUrl,
    UnsupportedScheme,
    InvalidRequest,
    Connect,
    Send,
    Timeout,
    Body,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported scheme `{scheme}` in `{url}` (only http:// targets are supported)")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("failed to build request: {0}")]
    InvalidRequest(#[from] http::Error),

    #[error("connection failed: {0}")]
    Connect(#[source] hyper_util::client::legacy::Error),

    #[error("request failed: {0}")]
    Send(#[source] hyper_util::client::legacy::Error),

    #[error("no complete response within {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    Body(#[from] hyper::Error),
}

impl Error {
    /// Splits client failures into the connect phase and everything after it.
    pub(crate) fn from_client(err: hyper_util::client::legacy::Error) -> Self {
        if err.is_connect() {
            Self::Connect(err)
        } else {
            Self::Send(err)
        }
    }

    #[must_use]
    pub fn transport_error_kind(&self) -> HttpTransportErrorKind {
        match self {
            Self::InvalidUrl { .. } => HttpTransportErrorKind::InvalidUrl,
            Self::UnsupportedScheme { .. } => HttpTransportErrorKind::UnsupportedScheme,
            Self::InvalidHeader { .. } | Self::InvalidRequest(_) => {
                HttpTransportErrorKind::InvalidRequest
            }
            Self::Connect(_) => HttpTransportErrorKind::Connect,
            Self::Send(_) => HttpTransportErrorKind::Send,
            Self::Timeout(_) => HttpTransportErrorKind::Timeout,
            Self::Body(_) => HttpTransportErrorKind::Body,
        }
    }
}
