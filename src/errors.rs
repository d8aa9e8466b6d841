use std::error::Error;
use std::fmt;
use std::io;

use http::StatusCode;

use crate::session::{CheckoutSession, SessionState};

/// Failure of the underlying HTTP transport, surfaced as-is.
#[derive(Debug)]
pub enum TransportError {
    /// No response within the configured request timeout.
    Timeout,
    Io(io::Error),
    Request(Box<dyn Error + Send + Sync>),
}

pub type TransportResult<T> = Result<T, TransportError>;

impl TransportError {
    pub fn request(e: impl Into<Box<dyn Error + Send + Sync>>) -> TransportError {
        TransportError::Request(e.into())
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            TransportError::Request(e) => Some(e.as_ref()),
            TransportError::Timeout => None,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "request timed out"),
            TransportError::Io(e) => write!(f, "I/O error: {e}"),
            TransportError::Request(e) => write!(f, "request failed: {e}"),
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Everything that can go wrong while checking a document out or in.
#[derive(Debug)]
pub enum DavError {
    /// Another principal holds the lock (423 Locked).
    AlreadyLocked,
    LockFailed {
        status: StatusCode,
        reason: String,
    },
    RemoteFetchFailed {
        status: StatusCode,
        reason: String,
    },
    /// The resource disappeared while it was being edited.
    RemoteResourceGone,
    RemoteStoreFailed {
        status: StatusCode,
        reason: String,
    },
    UnlockFailed(String),
    Transport(TransportError),
    Cancelled,
    /// Local working copy could not be written, read or removed.
    Io(io::Error),
    InvalidUrl(String),
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

pub type DavResult<T> = Result<T, DavError>;

fn reason_of(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("").to_string()
}

impl DavError {
    pub(crate) fn lock_failed(status: StatusCode) -> DavError {
        DavError::LockFailed {
            status,
            reason: reason_of(status),
        }
    }

    pub(crate) fn fetch_failed(status: StatusCode) -> DavError {
        DavError::RemoteFetchFailed {
            status,
            reason: reason_of(status),
        }
    }

    pub(crate) fn store_failed(status: StatusCode) -> DavError {
        DavError::RemoteStoreFailed {
            status,
            reason: reason_of(status),
        }
    }

    /// The HTTP status that caused this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DavError::AlreadyLocked => Some(StatusCode::LOCKED),
            DavError::LockFailed { status, .. }
            | DavError::RemoteFetchFailed { status, .. }
            | DavError::RemoteStoreFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DavError::Cancelled)
    }
}

impl Error for DavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DavError::Transport(e) => Some(e),
            DavError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for DavError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DavError::AlreadyLocked => write!(f, "document is already locked by another user"),
            DavError::LockFailed { status, reason } => {
                write!(f, "locking failed: {} - {}", status.as_u16(), reason)
            }
            DavError::RemoteFetchFailed { status, reason } => {
                write!(f, "downloading the remote file failed: {} - {}", status.as_u16(), reason)
            }
            DavError::RemoteResourceGone => write!(f, "the remote file no longer exists"),
            DavError::RemoteStoreFailed { status, reason } => {
                write!(f, "uploading the remote file failed: {} - {}", status.as_u16(), reason)
            }
            DavError::UnlockFailed(reason) => write!(f, "unlocking failed: {reason}"),
            DavError::Transport(e) => write!(f, "transport error: {e}"),
            DavError::Cancelled => write!(f, "cancelled by user"),
            DavError::Io(e) => write!(f, "local file error: {e}"),
            DavError::InvalidUrl(u) => write!(f, "invalid document url: {u}"),
            DavError::InvalidState { operation, state } => {
                write!(f, "cannot {operation} a session in state {state:?}")
            }
        }
    }
}

impl From<TransportError> for DavError {
    fn from(e: TransportError) -> Self {
        DavError::Transport(e)
    }
}

impl From<io::Error> for DavError {
    fn from(e: io::Error) -> Self {
        DavError::Io(e)
    }
}

/// How bad a failed check-in is for the user's edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The remote document is up to date; only housekeeping failed.
    Warning,
    /// The edits only exist in the local working copy.
    DataAtRisk,
}

/// Failure of [`Coordinator::checkin`](crate::Coordinator::checkin).
#[derive(Debug)]
pub enum CheckinError {
    /// The document was not stored. The session is handed back still
    /// holding its lock and working copy, so the store can be retried.
    NotStored {
        error: DavError,
        session: CheckoutSession,
    },
    /// The document was stored and the working copy removed, but the
    /// lock could not be released.
    NotReleased { error: DavError },
}

impl CheckinError {
    pub fn severity(&self) -> Severity {
        match self {
            CheckinError::NotStored { .. } => Severity::DataAtRisk,
            CheckinError::NotReleased { .. } => Severity::Warning,
        }
    }

    pub fn error(&self) -> &DavError {
        match self {
            CheckinError::NotStored { error, .. } | CheckinError::NotReleased { error } => error,
        }
    }

    /// Take back the parked session after a failed store.
    pub fn into_session(self) -> Option<CheckoutSession> {
        match self {
            CheckinError::NotStored { session, .. } => Some(session),
            CheckinError::NotReleased { .. } => None,
        }
    }
}

impl Error for CheckinError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.error())
    }
}

impl fmt::Display for CheckinError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CheckinError::NotStored { error, session } => write!(
                f,
                "{error}; your changes are kept in {}",
                session
                    .working_copy()
                    .map(|w| w.file().display().to_string())
                    .unwrap_or_default()
            ),
            CheckinError::NotReleased { error } => {
                write!(f, "document updated, but {error}")
            }
        }
    }
}
