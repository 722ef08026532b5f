use std::io;
use std::num::ParseIntError;

use thiserror::Error;

use crate::types::{ListMode, Pair};

/// US3 ret code returned when the signature or ACL refuses the request
pub const ACCESS_DENIED: i64 = -148643;
/// US3 ret code returned when the key does not exist
pub const NO_SUCH_KEY: i64 = -148654;

/// Failure reported by the US3 file API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("us3 server error: status {status}, ret code {ret_code:?}, message {message:?}")]
pub struct ServerError {
    /// HTTP status of the response
    pub status: u16,
    /// US3 `RetCode`, when the response carried one
    pub ret_code: Option<i64>,
    pub message: String,
    /// `X-SessionId` header, useful when contacting UCloud support
    pub session_id: Option<String>,
}

impl ServerError {
    pub fn new(status: u16, ret_code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            status,
            ret_code,
            message: message.into(),
            session_id: None,
        }
    }

    pub fn code(&self) -> Option<i64> {
        self.ret_code
    }
}

/// Raw error raised while talking to the backend or decoding its responses.
///
/// Never returned to callers directly; it is always normalized into
/// [`Error`] first and kept as the error source.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid integer {value:?}: {source}")]
    ParseInt {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Invalid timestamp {value:?}: {source}")]
    ParseTime {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Timestamp out of range: {0}")]
    TimestampOutOfRange(i64),
}

impl BackendError {
    /// US3 ret code carried by a server error
    pub fn code(&self) -> Option<i64> {
        match self {
            BackendError::Server(e) => e.code(),
            _ => None,
        }
    }
}

/// Portable error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PermissionDenied,
    ObjectNotExist,
    Unexpected,
    PairUnsupported,
    ListModeInvalid,
    CredentialInvalid,
    EndpointInvalid,
}

/// Main error type for us3-adapter operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Permission denied: {0}")]
    PermissionDenied(#[source] BackendError),

    #[error("Object not exist: {0}")]
    ObjectNotExist(#[source] BackendError),

    #[error("Unexpected: {0}")]
    Unexpected(#[source] BackendError),

    #[error("Pair unsupported: {0}")]
    PairUnsupported(Pair),

    #[error("List mode invalid: {0}")]
    ListModeInvalid(ListMode),

    #[error("Credential invalid: {0}")]
    CredentialInvalid(String),

    #[error("Endpoint invalid: {0}")]
    EndpointInvalid(String),

    #[error("{op} for {ty} with pairs [{}]: {source}", render_pairs(.pairs))]
    Init {
        op: &'static str,
        ty: &'static str,
        pairs: Vec<Pair>,
        #[source]
        source: Box<Error>,
    },

    #[error("{op} on {storager} for {path:?}: {source}")]
    Storage {
        op: &'static str,
        storager: String,
        path: Vec<String>,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Portable kind of this error, looking through context wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::ObjectNotExist(_) => ErrorKind::ObjectNotExist,
            Error::Unexpected(_) => ErrorKind::Unexpected,
            Error::PairUnsupported(_) => ErrorKind::PairUnsupported,
            Error::ListModeInvalid(_) => ErrorKind::ListModeInvalid,
            Error::CredentialInvalid(_) => ErrorKind::CredentialInvalid,
            Error::EndpointInvalid(_) => ErrorKind::EndpointInvalid,
            Error::Init { source, .. } | Error::Storage { source, .. } => source.kind(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::ObjectNotExist
    }

    /// The backend error behind a normalized kind, if any
    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            Error::PermissionDenied(e) | Error::ObjectNotExist(e) | Error::Unexpected(e) => {
                Some(e)
            }
            Error::Init { source, .. } | Error::Storage { source, .. } => source.backend(),
            _ => None,
        }
    }
}

/// Normalize an error into the portable vocabulary.
///
/// Backend errors are classified by their US3 ret code; errors that are
/// already portable come back unchanged.
pub fn format_error(err: impl Into<Error>) -> Error {
    err.into()
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        match err.code() {
            Some(ACCESS_DENIED) => Error::PermissionDenied(err),
            Some(NO_SUCH_KEY) => Error::ObjectNotExist(err),
            _ => Error::Unexpected(err),
        }
    }
}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Self {
        BackendError::from(err).into()
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        BackendError::from(err).into()
    }
}

fn render_pairs(pairs: &[Pair]) -> String {
    pairs
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for us3-adapter operations
pub type Result<T> = std::result::Result<T, Error>;
