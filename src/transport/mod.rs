//! Contains the structs and traits that define a WebDAV transport.
//!
//! A transport executes single WebDAV requests (GET, HEAD, PUT, LOCK,
//! UNLOCK) against one server and reports what the server answered. It holds
//! no per-document state, so one transport can be shared by any number of
//! checkouts. Policy (what a 423 means, when to unlock) lives in the
//! coordinator, not here.
//!
//! Non-success statuses are not errors at this level: a transport only
//! fails with [`TransportError`] if it could not get an answer at all.
use std::fmt::Debug;
use std::time::Duration;

use futures_util::future::BoxFuture;
use http::{HeaderMap, StatusCode};
use url::Url;

use crate::body::Body;
use crate::errors::TransportResult;
use crate::session::LockToken;

#[cfg(any(docsrs, feature = "hyper-client"))]
#[cfg_attr(docsrs, doc(cfg(feature = "hyper-client")))]
pub mod hyper;
pub mod memory;

/// Future returned by almost all of the `DavTransport` methods.
pub type TransportFuture<'a, T> = BoxFuture<'a, TransportResult<T>>;

/// What to ask for in a LOCK request. Checkouts only take exclusive
/// write locks.
#[derive(Debug, Clone)]
pub struct LockInfo {
    /// Principal requesting the lock, sent as the `owner` element.
    pub owner: String,
    pub timeout: Duration,
}

impl LockInfo {
    pub fn exclusive(owner: impl Into<String>, timeout: Duration) -> LockInfo {
        LockInfo {
            owner: owner.into(),
            timeout,
        }
    }
}

/// Answer to a LOCK request. `token` is only present on success.
#[derive(Debug)]
pub struct LockResponse {
    pub status: StatusCode,
    pub token: Option<LockToken>,
}

/// Answer to a GET request. The body has not been read yet.
#[derive(Debug)]
pub struct DavResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl DavResponse {
    /// Value of the Content-Length header, if present and valid.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}

/// The trait that defines a WebDAV client transport.
pub trait DavTransport: Debug + Send + Sync {
    /// GET a resource. The body is streamed.
    fn get<'a>(&'a self, url: &'a Url) -> TransportFuture<'a, DavResponse>;

    /// HEAD a resource.
    fn head<'a>(&'a self, url: &'a Url) -> TransportFuture<'a, StatusCode>;

    /// PUT the full contents of a resource, submitting the lock token.
    fn put<'a>(
        &'a self,
        url: &'a Url,
        body: bytes::Bytes,
        token: &'a LockToken,
    ) -> TransportFuture<'a, StatusCode>;

    /// LOCK a resource.
    fn lock<'a>(&'a self, url: &'a Url, info: &'a LockInfo) -> TransportFuture<'a, LockResponse>;

    /// UNLOCK a resource.
    fn unlock<'a>(&'a self, url: &'a Url, token: &'a LockToken)
        -> TransportFuture<'a, StatusCode>;
}
