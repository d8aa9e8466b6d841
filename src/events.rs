//! Structured events emitted while a document is checked out or in.
//!
//! The coordinator never talks to a user directly. Everything worth
//! showing (progress bars, status lines, log files) is derived from the
//! [`CheckoutEvent`]s it hands to an [`EventSink`].

use std::path::Path;

use http::StatusCode;

use crate::errors::DavError;
use crate::session::LockToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

#[derive(Debug)]
pub enum CheckoutEvent<'a> {
    Locking {
        url: &'a str,
        owner: &'a str,
    },
    LockAcquired {
        url: &'a str,
        token: &'a LockToken,
    },
    LockRejected {
        url: &'a str,
        status: StatusCode,
    },
    FetchStarted {
        url: &'a str,
        content_length: Option<u64>,
    },
    /// Bytes moved so far, out of `total` if the size is known.
    Progress {
        direction: Direction,
        transferred: u64,
        total: Option<u64>,
    },
    FetchCompleted {
        path: &'a Path,
        bytes: u64,
    },
    FetchCancelled {
        url: &'a str,
    },
    StoreStarted {
        url: &'a str,
        path: &'a Path,
    },
    StoreCompleted {
        url: &'a str,
    },
    StoreFailed {
        url: &'a str,
        error: &'a DavError,
    },
    Unlocked {
        url: &'a str,
    },
    /// Unlock failed. `compensating` is set when this happened while
    /// cleaning up after another error.
    UnlockFailed {
        url: &'a str,
        error: &'a DavError,
        compensating: bool,
    },
    WorkingCopyRemoved {
        path: &'a Path,
    },
    CleanupFailed {
        path: &'a Path,
        error: &'a std::io::Error,
    },
}

/// Receiver of checkout events.
pub trait EventSink: Send + Sync {
    fn event(&self, event: &CheckoutEvent<'_>);
}

impl<F> EventSink for F
where
    F: Fn(&CheckoutEvent<'_>) + Send + Sync,
{
    fn event(&self, event: &CheckoutEvent<'_>) {
        self(event)
    }
}

/// Writes every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn event(&self, event: &CheckoutEvent<'_>) {
        use CheckoutEvent::*;
        match event {
            Locking { url, owner } => info!("locking {url} for {owner}"),
            LockAcquired { url, token } => info!("locked {url}: {token:?}"),
            LockRejected { url, status } => warn!("lock on {url} refused: {status}"),
            FetchStarted {
                url,
                content_length,
            } => match content_length {
                Some(len) => info!("downloading {url} ({len} bytes)"),
                None => info!("downloading {url}"),
            },
            Progress {
                direction,
                transferred,
                total,
            } => trace!("{direction:?}: {transferred}/{total:?}"),
            FetchCompleted { path, bytes } => {
                info!("file saved locally to {} ({bytes} bytes)", path.display())
            }
            FetchCancelled { url } => info!("download of {url} cancelled by user"),
            StoreStarted { url, path } => info!("uploading {} to {url}", path.display()),
            StoreCompleted { url } => info!("{url} updated"),
            StoreFailed { url, error } => error!("updating {url} failed: {error}"),
            Unlocked { url } => info!("unlocked {url}"),
            UnlockFailed {
                url,
                error,
                compensating,
            } => {
                if *compensating {
                    warn!("releasing lock on {url} after an error failed: {error}")
                } else {
                    error!("unlocking {url} failed: {error}")
                }
            }
            WorkingCopyRemoved { path } => debug!("removed working copy {}", path.display()),
            CleanupFailed { path, error } => {
                warn!("could not remove {}: {error}", path.display())
            }
        }
    }
}
