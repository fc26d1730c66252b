//! Unified error types for chainwave.
//!
//! Every failure a request chain can hit is represented by a single [`Error`]
//! type. Errors are never thrown across the chain: they are latched on the
//! [`Response`](crate::Response) carrier and handed back by the terminal
//! decoding operations. The variants follow the lifecycle of a request:
//! - [`Error::InvalidRequest`]: the method or URL was rejected before any option ran
//! - [`Error::Option`]: a request option could not be applied
//! - [`Error::Transport`]: the transport failed while sending
//! - [`Error::StatusMismatch`]: a status assertion failed
//! - [`Error::Body`]: the response body could not be read, decoded or saved

use core::fmt;

use http::StatusCode;
use thiserror::Error;

use crate::context::ContextError;

/// Convenient result alias used across the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for all chainwave operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The method or URL of the request is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] InvalidRequestKind),

    /// A request option failed its precondition.
    #[error("request option failed: {0}")]
    Option(#[from] OptionErrorKind),

    /// The transport failed to deliver the request or receive the response head.
    #[error("transport error: {0}")]
    Transport(#[from] TransportErrorKind),

    /// The response status did not match the asserted status.
    #[error("bad status: expected {expected}, got {actual}")]
    StatusMismatch {
        /// Status the caller asserted
        expected: ExpectedStatus,
        /// Status the server returned
        actual: StatusCode,
    },

    /// The response body could not be read, decoded or persisted.
    #[error("failed to read response body: {0}")]
    Body(#[from] BodyErrorKind),
}

/// Reasons a request is rejected before any option runs.
#[derive(Debug, Error)]
pub enum InvalidRequestKind {
    /// The HTTP method is not a valid token.
    #[error("invalid method `{0}`")]
    Method(String),

    /// The URL could not be parsed.
    #[error("invalid URL `{url}`: {source}")]
    Url {
        /// The rejected input
        url: String,
        /// Parser failure
        #[source]
        source: url::ParseError,
    },

    /// The URL parsed but cannot be requested (non-HTTP scheme or missing host).
    #[error("unsupported URL `{0}`")]
    UnsupportedUrl(String),
}

/// Request option failures.
#[derive(Debug, Error)]
pub enum OptionErrorKind {
    /// `with_context` was given no context.
    #[error("nil context")]
    MissingContext,

    /// Two upload descriptors share a field name.
    #[error("field name of files should be different: `{0}`")]
    DuplicateField(String),

    /// An upload path is missing, unreadable or a directory.
    #[error("unexpected file path of `{field}`: {source}")]
    InvalidFile {
        /// Field name of the offending descriptor
        field: String,
        /// Underlying file system failure
        #[source]
        source: std::io::Error,
    },

    /// A header name or value produced by an option is invalid.
    #[error("invalid header `{0}`")]
    InvalidHeader(String),

    /// The payload could not be encoded.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] std::sync::Arc<serde_json::Error>),

    /// A user-supplied option failed.
    #[error("{0}")]
    Custom(#[source] anyhow::Error),
}

/// Transport failures.
#[derive(Debug, Error)]
pub enum TransportErrorKind {
    /// The attached context was cancelled.
    #[error("context canceled")]
    Canceled,

    /// The attached context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The configured request timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// Connecting to the remote host failed.
    #[error("connection failed: {0}")]
    Connect(#[source] curl::Error),

    /// The TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] curl::Error),

    /// The redirect policy refused to follow any further.
    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    /// A custom redirect policy returned an error.
    #[error("redirect rejected: {0}")]
    Redirect(#[source] anyhow::Error),

    /// The streamed request body failed while it was being produced.
    #[error("failed to write request body: {0}")]
    BodyWrite(#[source] std::io::Error),

    /// The response head could not be interpreted.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Any other libcurl failure.
    #[error("{0}")]
    Curl(#[source] curl::Error),
}

/// Response body failures.
#[derive(Debug, Error)]
pub enum BodyErrorKind {
    /// Reading the body stream failed.
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    /// The body was not valid JSON for the requested type.
    #[error("invalid JSON: {0}")]
    Json(#[source] serde_json::Error),

    /// Writing the body to its destination failed.
    #[error("save failed: {0}")]
    Save(#[source] std::io::Error),

    /// The body has already been consumed.
    #[error("body already consumed")]
    Consumed,

    /// The named cookie is not present in the response.
    #[error("named cookie `{0}` not present")]
    MissingCookie(String),
}

/// The status a chain asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpectedStatus {
    /// Exactly this code
    Code(StatusCode),
    /// Any 2xx code
    Success,
}

impl ExpectedStatus {
    /// Whether `status` satisfies the expectation.
    #[must_use]
    pub fn matches(self, status: StatusCode) -> bool {
        match self {
            Self::Code(code) => code == status,
            Self::Success => status.is_success(),
        }
    }
}

impl fmt::Display for ExpectedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{}", code.as_u16()),
            Self::Success => write!(f, "2xx"),
        }
    }
}

impl From<ContextError> for TransportErrorKind {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Canceled => Self::Canceled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

impl Error {
    /// Check if the request was rejected before any option ran.
    pub const fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }

    /// Check if a request option failed.
    pub const fn is_option_failure(&self) -> bool {
        matches!(self, Self::Option(_))
    }

    /// Check if the transport failed.
    pub const fn is_transport_failure(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Check if a status assertion failed.
    pub const fn is_status_mismatch(&self) -> bool {
        matches!(self, Self::StatusMismatch { .. })
    }

    /// Check if reading the response body failed.
    pub const fn is_body_read_failure(&self) -> bool {
        matches!(self, Self::Body(_))
    }

    /// Check if the failure stems from the attached context being done.
    pub const fn is_canceled(&self) -> bool {
        matches!(
            self,
            Self::Transport(TransportErrorKind::Canceled | TransportErrorKind::DeadlineExceeded)
        )
    }

    /// Check if this is a timeout error.
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Transport(TransportErrorKind::Timeout | TransportErrorKind::DeadlineExceeded)
        )
    }

    /// Actual status code carried by a [`Error::StatusMismatch`].
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::StatusMismatch { actual, .. } => Some(*actual),
            _ => None,
        }
    }

    /// Get the error category.
    ///
    /// Useful for logging and monitoring.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Option(_) => ErrorKind::Option,
            Self::Transport(_) => ErrorKind::Transport,
            Self::StatusMismatch { .. } => ErrorKind::StatusMismatch,
            Self::Body(_) => ErrorKind::Body,
        }
    }
}

/// Error category labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed method or URL
    InvalidRequest,
    /// Request option failure
    Option,
    /// Transport failure
    Transport,
    /// Status assertion failure
    StatusMismatch,
    /// Response body failure
    Body,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest => write!(f, "invalid_request"),
            Self::Option => write!(f, "option"),
            Self::Transport => write!(f, "transport"),
            Self::StatusMismatch => write!(f, "status_mismatch"),
            Self::Body => write!(f, "body"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mismatch_mentions_both_codes() {
        let err = Error::StatusMismatch {
            expected: ExpectedStatus::Code(StatusCode::OK),
            actual: StatusCode::NOT_FOUND,
        };
        assert_eq!(err.to_string(), "bad status: expected 200, got 404 Not Found");
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.kind(), ErrorKind::StatusMismatch);
    }

    #[test]
    fn expected_success_matches_any_2xx() {
        assert!(ExpectedStatus::Success.matches(StatusCode::NO_CONTENT));
        assert!(!ExpectedStatus::Success.matches(StatusCode::MOVED_PERMANENTLY));
        assert_eq!(ExpectedStatus::Success.to_string(), "2xx");
    }

    #[test]
    fn context_errors_classify_as_canceled() {
        let err = Error::from(TransportErrorKind::from(ContextError::Canceled));
        assert!(err.is_canceled());
        assert!(err.is_transport_failure());
        assert!(!err.is_timeout());

        let err = Error::from(TransportErrorKind::from(ContextError::DeadlineExceeded));
        assert!(err.is_canceled());
        assert!(err.is_timeout());
    }

    #[test]
    fn kind_labels() {
        assert_eq!(ErrorKind::Option.to_string(), "option");
        assert_eq!(
            Error::from(OptionErrorKind::MissingContext).kind(),
            ErrorKind::Option
        );
    }
}
