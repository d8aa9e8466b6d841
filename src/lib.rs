//! ## Check out documents from a WebDAV server
//!
//! This crate edits a single document on a [`Webdav`] (RFC4918) server the
//! way an office suite plugin would: take an exclusive lock on it, download
//! it to a private temporary directory, let an external editor work on the
//! local file, upload the result, release the lock and clean up.
//!
//! The sequence is:
//!
//! ```text
//! UNLOCKED --lock--> LOCKED --fetch--> FETCHED --store--> STORED --unlock--> UNLOCKED
//! ```
//!
//! and the interesting part is what happens when a step fails:
//!
//! - a failed or cancelled download releases the lock again before the
//!   error is returned. A document is never left locked because a
//!   download did not work out.
//! - a failed upload keeps both the lock and the local file. The user's
//!   edits only exist locally at that point, and keeping the lock means the
//!   upload can be retried later without anybody else getting in between.
//! - a failed unlock after a successful upload is reported, but as a
//!   warning: the remote document is up to date.
//!
//! ## Interfaces.
//!
//! - the [`Coordinator`] runs the sequence. It is configured once, and can be
//!   shared between checkouts.
//! - each checkout is a [`CheckoutSession`], a plain value that holds the
//!   lock token and the working copy and is passed to every operation.
//! - requests go through a [transport][DavTransport]. Included are a
//!   `hyper` based HTTP transport ([`HyperTransport`]) and an in-memory
//!   server ([`MemTransport`]) for tests.
//! - progress and status are reported as [events][CheckoutEvent] to an
//!   [`EventSink`]; by default they go to the `log` crate.
//!
//! ## Example.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dav_checkout::{CancelToken, Coordinator, Credentials, DocumentRef, HttpConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = HttpConfig::new()
//!         .credentials(Credentials::new("alice", "secret"))
//!         .build();
//!     let coordinator = Coordinator::builder(Arc::new(transport)).build();
//!
//!     let doc = DocumentRef::parse("http://host/silverpeas/repository/jackrabbit/My File.odt")?;
//!     let session = coordinator.checkout(doc, "alice", &CancelToken::never()).await?;
//!     println!("editing {}", session.working_copy().unwrap().file().display());
//!
//!     // ... run the editor ...
//!
//!     coordinator.checkin(session).await?;
//!     Ok(())
//! }
//! ```
//!
//! [`Webdav`]: https://tools.ietf.org/html/rfc4918

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate log;

mod cancel;
mod coordinator;
mod davurl;
mod errors;
mod events;
mod session;
mod util;

pub mod body;
pub mod transport;

pub use crate::cancel::{cancellation, CancelHandle, CancelToken};
pub use crate::coordinator::{Coordinator, CoordinatorBuilder, LOCK_TIMEOUT, TEMP_PREFIX};
pub use crate::davurl::{encode_url, DocumentRef};
pub use crate::errors::{
    CheckinError, DavError, DavResult, Severity, TransportError, TransportResult,
};
pub use crate::events::{CheckoutEvent, Direction, EventSink, LogSink};
pub use crate::session::{CheckoutSession, LockToken, SessionState, WorkingCopy};
pub use crate::transport::memory::MemTransport;
pub use crate::transport::DavTransport;
#[cfg(any(docsrs, feature = "hyper-client"))]
pub use crate::transport::hyper::{Credentials, HttpConfig, HyperTransport};
pub use crate::util::DavMethod;
