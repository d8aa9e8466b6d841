//! The state of one document checkout.
//!
//! A [`CheckoutSession`] is created by [`Coordinator::lock`] and threaded
//! through every following operation. It owns the lock token and the local
//! working copy; there is no other place where either is kept.
//!
//! [`Coordinator::lock`]: crate::Coordinator::lock
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::davurl::DocumentRef;
use crate::errors::{DavError, DavResult};

/// Opaque lock token as issued by the server, e.g. `opaquelocktoken:...`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    pub fn new(token: impl Into<String>) -> LockToken {
        LockToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// tokens end up in log files; keep them recognizable but not complete.
impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let shown: String = self.0.chars().take(24).collect();
        if shown.len() < self.0.len() {
            write!(f, "LockToken({shown}...)")
        } else {
            write!(f, "LockToken({shown})")
        }
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Downloaded copy of the document, in a directory of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCopy {
    dir: PathBuf,
    file: PathBuf,
}

impl WorkingCopy {
    pub(crate) fn new(dir: PathBuf, file_name: &str) -> WorkingCopy {
        let file = dir.join(file_name);
        WorkingCopy { dir, file }
    }

    /// Working copy at an existing path; its directory is the file's parent.
    pub fn from_path(file: impl Into<PathBuf>) -> DavResult<WorkingCopy> {
        let file = file.into();
        let dir = match file.parent() {
            Some(p) if !p.as_os_str().is_empty() && file.file_name().is_some() => p.to_path_buf(),
            _ => {
                return Err(DavError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{}: not a file path", file.display()),
                )))
            }
        };
        Ok(WorkingCopy { dir, file })
    }

    /// Path of the local file.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Directory that was created to hold the file.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // remove the file, then its (now empty) directory.
    pub(crate) async fn remove(&self) -> io::Result<()> {
        tokio::fs::remove_file(&self.file).await?;
        tokio::fs::remove_dir(&self.dir).await
    }
}

/// Where a checkout session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unlocked,
    Locked,
    Fetched,
    Stored,
}

/// One document, at most one lock, at most one working copy.
#[derive(Debug)]
pub struct CheckoutSession {
    pub(crate) document: DocumentRef,
    pub(crate) lock: Option<LockToken>,
    pub(crate) working_copy: Option<WorkingCopy>,
    pub(crate) state: SessionState,
}

impl CheckoutSession {
    /// A session for a document that is locked with `token`, but has not
    /// been downloaded.
    pub fn locked(document: DocumentRef, token: LockToken) -> CheckoutSession {
        CheckoutSession {
            document,
            lock: Some(token),
            working_copy: None,
            state: SessionState::Locked,
        }
    }

    /// Continue a checkout that was done earlier, possibly by another
    /// process: the document is locked with `token` and was downloaded to
    /// `local_path`.
    pub fn resume(
        document: DocumentRef,
        local_path: impl Into<PathBuf>,
        token: LockToken,
    ) -> DavResult<CheckoutSession> {
        Ok(CheckoutSession {
            document,
            lock: Some(token),
            working_copy: Some(WorkingCopy::from_path(local_path)?),
            state: SessionState::Fetched,
        })
    }

    pub fn document(&self) -> &DocumentRef {
        &self.document
    }

    pub fn lock_token(&self) -> Option<&LockToken> {
        self.lock.as_ref()
    }

    pub fn working_copy(&self) -> Option<&WorkingCopy> {
        self.working_copy.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn expect_state(
        &self,
        operation: &'static str,
        states: &[SessionState],
    ) -> DavResult<()> {
        if states.contains(&self.state) {
            Ok(())
        } else {
            Err(DavError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}
