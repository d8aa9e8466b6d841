//
// This module contains the main entry point of the library,
// the Coordinator.
//
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;

use crate::cancel::CancelToken;
use crate::davurl::DocumentRef;
use crate::errors::{CheckinError, DavError, DavResult};
use crate::events::{CheckoutEvent, EventSink, LogSink};
use crate::session::{CheckoutSession, LockToken, SessionState};
use crate::transport::DavTransport;

pub mod fetch;
pub mod lock;
pub mod store;

/// Lock timeout asked for when locking a document: ten minutes.
pub const LOCK_TIMEOUT: Duration = Duration::from_millis(600_000);
/// Prefix of the working directories created below the temp root.
pub const TEMP_PREFIX: &str = "silver-";

/// Configuration of the coordinator.
#[derive(Clone)]
pub struct CoordinatorBuilder {
    /// Transport used for all requests.
    transport: Arc<dyn DavTransport>,
    /// Receiver of progress and status events.
    events: Arc<dyn EventSink>,
    /// Timeout sent with LOCK requests.
    lock_timeout: Duration,
    /// Directory below which working directories are created.
    temp_root: PathBuf,
    /// Name prefix of working directories.
    temp_prefix: String,
}

impl CoordinatorBuilder {
    /// Create a new configuration builder.
    pub fn new(transport: Arc<dyn DavTransport>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            transport,
            events: Arc::new(LogSink),
            lock_timeout: LOCK_TIMEOUT,
            temp_root: std::env::temp_dir(),
            temp_prefix: TEMP_PREFIX.to_string(),
        }
    }

    pub fn build(self) -> Coordinator {
        self.into()
    }

    /// Where events go. Defaults to [`LogSink`].
    pub fn events(self, sink: impl EventSink + 'static) -> Self {
        let mut this = self;
        this.events = Arc::new(sink);
        this
    }

    /// Lock timeout to ask the server for (default 600 000 ms).
    pub fn lock_timeout(self, timeout: Duration) -> Self {
        let mut this = self;
        this.lock_timeout = timeout;
        this
    }

    /// Directory to create working directories in (default: the system
    /// temp directory).
    pub fn temp_root(self, root: impl Into<PathBuf>) -> Self {
        let mut this = self;
        this.temp_root = root.into();
        this
    }

    /// Name prefix of working directories (default `silver-`).
    pub fn temp_prefix(self, prefix: impl Into<String>) -> Self {
        let mut this = self;
        this.temp_prefix = prefix.into();
        this
    }
}

/// Drives documents through lock, fetch, store and unlock.
///
/// The coordinator itself holds no per-document state; all of that lives
/// in the [`CheckoutSession`] that is passed to each operation. One
/// coordinator can be cloned and shared between checkouts.
#[derive(Clone)]
pub struct Coordinator {
    pub(crate) transport: Arc<dyn DavTransport>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) lock_timeout: Duration,
    pub(crate) temp_root: Arc<PathBuf>,
    pub(crate) temp_prefix: Arc<String>,
}

impl From<CoordinatorBuilder> for Coordinator {
    fn from(cfg: CoordinatorBuilder) -> Self {
        Coordinator {
            transport: cfg.transport,
            events: cfg.events,
            lock_timeout: cfg.lock_timeout,
            temp_root: Arc::new(cfg.temp_root),
            temp_prefix: Arc::new(cfg.temp_prefix),
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("transport", &self.transport)
            .field("lock_timeout", &self.lock_timeout)
            .field("temp_root", &self.temp_root)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Return a configuration builder.
    pub fn builder(transport: Arc<dyn DavTransport>) -> CoordinatorBuilder {
        CoordinatorBuilder::new(transport)
    }

    /// Check a document out: lock it, then download it.
    ///
    /// A URL that names no file is refused before anything is sent. If the
    /// download fails the lock is released again before the error is
    /// returned. On success the session is in state `Fetched` and its
    /// working copy can be handed to an editor.
    pub async fn checkout(
        &self,
        document: DocumentRef,
        owner: &str,
        cancel: &CancelToken,
    ) -> DavResult<CheckoutSession> {
        document.file_name()?;
        let mut session = self.lock(document, owner).await?;
        match self.fetch(&mut session, cancel).await {
            Ok(_) => Ok(session),
            // fetch has released the lock already.
            Err(DavError::Cancelled) => Err(DavError::Cancelled),
            Err(e) => {
                self.release(&mut session).await;
                Err(e)
            }
        }
    }

    /// Check a document back in: store it, unlock it, and remove the
    /// working copy.
    ///
    /// If the store fails nothing else happens: the session comes back in
    /// the error still locked and with its working copy, and `checkin` can
    /// simply be called again. If only the unlock fails, the document has
    /// been updated and the working copy is removed anyway.
    pub async fn checkin(&self, session: CheckoutSession) -> Result<(), CheckinError> {
        let mut session = session;
        if let Err(error) = self.store(&mut session).await {
            return Err(CheckinError::NotStored { error, session });
        }
        let released = self.unlock(&mut session).await;
        if let Some(wc) = session.working_copy.take() {
            match wc.remove().await {
                Ok(()) => self.emit(CheckoutEvent::WorkingCopyRemoved { path: wc.file() }),
                Err(error) => self.emit(CheckoutEvent::CleanupFailed {
                    path: wc.file(),
                    error: &error,
                }),
            }
        }
        released.map_err(|error| CheckinError::NotReleased { error })
    }

    /// Release the lock held by the session.
    ///
    /// A session without a lock is left alone. Otherwise the token is
    /// taken out of the session whether or not the server confirms the
    /// unlock; it is never sent twice.
    pub async fn unlock(&self, session: &mut CheckoutSession) -> DavResult<()> {
        let token = match session.lock.take() {
            Some(token) => token,
            None => return Ok(()),
        };
        session.state = SessionState::Unlocked;
        let url = session.document.as_str();
        match self.unlock_token(&session.document, &token).await {
            Ok(()) => {
                self.emit(CheckoutEvent::Unlocked { url });
                Ok(())
            }
            Err(error) => {
                self.emit(CheckoutEvent::UnlockFailed {
                    url,
                    error: &error,
                    compensating: false,
                });
                Err(error)
            }
        }
    }

    // Best-effort unlock while another error is on its way out. A failure
    // here is reported, but never replaces that error.
    pub(crate) async fn release(&self, session: &mut CheckoutSession) {
        let token = match session.lock.take() {
            Some(token) => token,
            None => return,
        };
        session.state = SessionState::Unlocked;
        let url = session.document.as_str();
        match self.unlock_token(&session.document, &token).await {
            Ok(()) => self.emit(CheckoutEvent::Unlocked { url }),
            Err(error) => self.emit(CheckoutEvent::UnlockFailed {
                url,
                error: &error,
                compensating: true,
            }),
        }
    }

    async fn unlock_token(&self, document: &DocumentRef, token: &LockToken) -> DavResult<()> {
        let status = self.transport.unlock(document.url(), token).await?;
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            info!("UNLOCK {document}: unexpected status {status}");
        }
        if !status.is_success() {
            return Err(DavError::UnlockFailed(format!(
                "{} - {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )));
        }
        Ok(())
    }

    pub(crate) fn emit(&self, event: CheckoutEvent<'_>) {
        self.events.event(&event);
    }
}
