//! Error types for ADBC-RTDB driver.
//!
//! Provides the driver error, the mapping from native status codes, and the
//! conversion into ADBC status codes.

use std::backtrace::Backtrace;
use std::fmt::{Display, Formatter};

use crate::adapter::Status;
use crate::context::CancelReason;
use crate::native;

/// Result type used throughout the driver.
pub type Result<T> = std::result::Result<T, RtdbError>;

/// Error type for ADBC-RTDB operations.
///
/// Contains the error kind together with a backtrace captured when the error
/// was created.
#[derive(Debug)]
pub struct RtdbError {
    kind: ErrorKind,
    backtrace: Backtrace,
}

/// Failure reported by the native client library through a nonzero status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NativeError {
    #[error("invalid arguments")]
    InvalidArgs,
    #[error("no access")]
    NoAccess,
    #[error("out of memory")]
    OutOfMemory,
    #[error("protocol error")]
    ProtocolError,
}

impl NativeError {
    /// Maps a native status code. Returns `None` for success.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            native::STATUS_OK => None,
            native::EINVAL => Some(NativeError::InvalidArgs),
            native::EACCES => Some(NativeError::NoAccess),
            native::ENOMEM => Some(NativeError::OutOfMemory),
            _ => Some(NativeError::ProtocolError),
        }
    }
}

/// The category of an [`RtdbError`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ErrorKind {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Argument count mismatch: {placeholders} placeholders, {arguments} arguments")]
    ArgumentCountMismatch { placeholders: usize, arguments: usize },
    #[error("Unsupported argument type: {0}")]
    UnsupportedArgumentType(String),
    #[error("Connection error: {0}")]
    Connection(NativeError),
    #[error("Query error: {0}")]
    Query(NativeError),
    #[error("Bad connection")]
    BadConnection,
    #[error("End of data")]
    EndOfData,
    #[error("No active result set")]
    NotFetching,
    #[error("Operation cancelled: {0}")]
    Cancelled(CancelReason),
    #[error("Cannot {operation} while {status:?}")]
    InvalidTransition { operation: &'static str, status: Status },
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Type conversion error: {0}")]
    Conversion(String),
}

impl RtdbError {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Creates a malformed input error (bad DSN or parameter value).
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedInput(msg.into()))
    }

    /// Creates an argument count mismatch error.
    pub(crate) fn argument_count(placeholders: usize, arguments: usize) -> Self {
        Self::new(ErrorKind::ArgumentCountMismatch { placeholders, arguments })
    }

    /// Creates an unsupported argument type error.
    pub(crate) fn unsupported_argument(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedArgumentType(msg.into()))
    }

    /// Creates a connection error from a native failure.
    pub(crate) fn connection(err: NativeError) -> Self {
        Self::new(ErrorKind::Connection(err))
    }

    /// Creates a query error from a native failure.
    pub(crate) fn query(err: NativeError) -> Self {
        Self::new(ErrorKind::Query(err))
    }

    pub(crate) fn bad_connection() -> Self {
        Self::new(ErrorKind::BadConnection)
    }

    pub(crate) fn end_of_data() -> Self {
        Self::new(ErrorKind::EndOfData)
    }

    pub(crate) fn not_fetching() -> Self {
        Self::new(ErrorKind::NotFetching)
    }

    pub(crate) fn cancelled(reason: CancelReason) -> Self {
        Self::new(ErrorKind::Cancelled(reason))
    }

    pub(crate) fn invalid_transition(operation: &'static str, status: Status) -> Self {
        Self::new(ErrorKind::InvalidTransition { operation, status })
    }

    /// Creates an error for a feature this driver does not provide.
    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported(msg.into()))
    }

    /// Creates a type conversion error.
    pub(crate) fn conversion(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conversion(msg.into()))
    }

    /// Returns the error kind.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns the backtrace captured when this error was created.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Returns true if this is a connection error.
    pub fn is_connection(&self) -> bool {
        matches!(self.kind, ErrorKind::Connection(_))
    }

    /// Returns true if this is a query error.
    pub fn is_query(&self) -> bool {
        matches!(self.kind, ErrorKind::Query(_))
    }

    /// Returns true if the connection can no longer be used.
    pub fn is_bad_connection(&self) -> bool {
        matches!(self.kind, ErrorKind::BadConnection)
    }

    /// Returns true if a fetch ran past the last row.
    pub fn is_end_of_data(&self) -> bool {
        matches!(self.kind, ErrorKind::EndOfData)
    }

    /// Returns true if the operation observed a cancellation or deadline.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled(_))
    }

    /// Returns the corresponding ADBC status code.
    pub fn adbc_status(&self) -> adbc_core::error::Status {
        use adbc_core::error::Status as AdbcStatus;

        match &self.kind {
            ErrorKind::MalformedInput(_)
            | ErrorKind::ArgumentCountMismatch { .. }
            | ErrorKind::UnsupportedArgumentType(_) => AdbcStatus::InvalidArguments,
            ErrorKind::Connection(NativeError::NoAccess) => AdbcStatus::Unauthenticated,
            ErrorKind::Connection(_) => AdbcStatus::IO,
            ErrorKind::Query(NativeError::InvalidArgs) => AdbcStatus::InvalidArguments,
            ErrorKind::Query(NativeError::NoAccess) => AdbcStatus::Unauthorized,
            ErrorKind::Query(_) => AdbcStatus::Internal,
            ErrorKind::BadConnection
            | ErrorKind::EndOfData
            | ErrorKind::NotFetching
            | ErrorKind::InvalidTransition { .. } => AdbcStatus::InvalidState,
            ErrorKind::Cancelled(CancelReason::Cancelled) => AdbcStatus::Cancelled,
            ErrorKind::Cancelled(CancelReason::DeadlineExceeded) => AdbcStatus::Timeout,
            ErrorKind::Unsupported(_) => AdbcStatus::NotImplemented,
            ErrorKind::Conversion(_) => AdbcStatus::InvalidData,
        }
    }
}

impl Display for RtdbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for RtdbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Connection(err) | ErrorKind::Query(err) => Some(err),
            ErrorKind::Cancelled(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Converts `RtdbError` to ADBC `Error`.
impl From<RtdbError> for adbc_core::error::Error {
    fn from(err: RtdbError) -> Self {
        adbc_core::error::Error::with_message_and_status(err.to_string(), err.adbc_status())
    }
}
