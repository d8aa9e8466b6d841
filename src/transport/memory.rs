//! Ephemeral in-memory WebDAV server.
//!
//! `MemTransport` answers requests from a map of resources kept in memory,
//! with just enough locking semantics to behave like a real server:
//! exclusive write locks, `423 Locked` on contention, lock tokens checked on
//! PUT and UNLOCK. Every request is recorded, and failures can be injected,
//! which makes it the transport of choice for tests.
//!
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_stream::stream;
use bytes::Bytes;
use futures_util::FutureExt;
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use url::Url;

use crate::body::Body;
use crate::davurl::DocumentRef;
use crate::errors::TransportError;
use crate::session::LockToken;
use crate::transport::*;
use crate::util::DavMethod;

/// Ephemeral in-memory WebDAV server.
#[derive(Debug)]
pub struct MemTransport {
    state: Mutex<MemState>,
}

#[derive(Debug)]
struct MemState {
    resources: HashMap<String, Resource>,
    calls: Vec<(DavMethod, String)>,
    faults: HashMap<DavMethod, Fault>,
    stall_after: Option<usize>,
    truncate_after: Option<usize>,
    chunk_size: usize,
}

#[derive(Debug)]
struct Resource {
    data: Bytes,
    lock: Option<MemLock>,
}

#[derive(Debug)]
struct MemLock {
    token: LockToken,
    owner: String,
}

#[derive(Debug)]
enum Fault {
    Status(StatusCode),
    Transport,
}

// resources are keyed by their normalized url.
fn key(url: &str) -> String {
    DocumentRef::parse(url)
        .map(|d| d.as_str().to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl MemTransport {
    /// Create a new, empty, in-memory server.
    pub fn new() -> Arc<MemTransport> {
        Arc::new(MemTransport {
            state: Mutex::new(MemState {
                resources: HashMap::new(),
                calls: Vec::new(),
                faults: HashMap::new(),
                stall_after: None,
                truncate_after: None,
                chunk_size: 4096,
            }),
        })
    }

    /// Create or replace a resource.
    pub fn insert(&self, url: &str, data: impl Into<Bytes>) {
        let mut state = self.state.lock();
        let data = data.into();
        match state.resources.get_mut(&key(url)) {
            Some(res) => res.data = data,
            None => {
                state
                    .resources
                    .insert(key(url), Resource { data, lock: None });
            }
        }
    }

    /// Delete a resource, as another user would.
    pub fn remove(&self, url: &str) -> Option<Bytes> {
        self.state.lock().resources.remove(&key(url)).map(|r| r.data)
    }

    pub fn contents(&self, url: &str) -> Option<Bytes> {
        self.state
            .lock()
            .resources
            .get(&key(url))
            .map(|r| r.data.clone())
    }

    /// Owner of the lock on `url`, if it is locked.
    pub fn lock_owner(&self, url: &str) -> Option<String> {
        let state = self.state.lock();
        let res = state.resources.get(&key(url))?;
        res.lock.as_ref().map(|l| l.owner.clone())
    }

    pub fn is_locked(&self, url: &str) -> bool {
        self.lock_owner(url).is_some()
    }

    /// Answer the next `method` request with `status`, without executing it.
    pub fn fail_next(&self, method: DavMethod, status: StatusCode) {
        self.state
            .lock()
            .faults
            .insert(method, Fault::Status(status));
    }

    /// Let the next `method` request fail at the transport level.
    pub fn break_next(&self, method: DavMethod) {
        self.state.lock().faults.insert(method, Fault::Transport);
    }

    /// The next GET body stops making progress after `bytes` bytes.
    pub fn stall_next_get_after(&self, bytes: usize) {
        self.state.lock().stall_after = Some(bytes);
    }

    /// The next GET advertises the full length, but the body ends after
    /// `bytes` bytes.
    pub fn truncate_next_get(&self, bytes: usize) {
        self.state.lock().truncate_after = Some(bytes);
    }

    /// Size of the chunks GET bodies are delivered in.
    pub fn set_chunk_size(&self, size: usize) {
        self.state.lock().chunk_size = size.max(1);
    }

    /// All requests so far, in order.
    pub fn calls(&self) -> Vec<(DavMethod, String)> {
        self.state.lock().calls.clone()
    }

    /// How many `method` requests were made.
    pub fn count(&self, method: DavMethod) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(m, _)| *m == method)
            .count()
    }

    /// The set of methods used so far.
    pub fn methods_used(&self) -> DavMethod {
        self.state
            .lock()
            .calls
            .iter()
            .fold(DavMethod::empty(), |set, (m, _)| set | *m)
    }

    // record the call, and see if it should fail.
    fn enter(&self, method: DavMethod, url: &Url) -> Result<Option<StatusCode>, TransportError> {
        let mut state = self.state.lock();
        state.calls.push((method, url.as_str().to_string()));
        match state.faults.remove(&method) {
            Some(Fault::Status(status)) => Ok(Some(status)),
            Some(Fault::Transport) => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))),
            None => Ok(None),
        }
    }
}

impl DavTransport for MemTransport {
    fn get<'a>(&'a self, url: &'a Url) -> TransportFuture<'a, DavResponse> {
        async move {
            trace!("MEM: GET {url}");
            if let Some(status) = self.enter(DavMethod::GET, url)? {
                return Ok(DavResponse {
                    status,
                    headers: HeaderMap::new(),
                    body: Body::empty(),
                });
            }
            let mut state = self.state.lock();
            let stall_after = state.stall_after.take();
            let truncate_after = state.truncate_after.take();
            let chunk_size = state.chunk_size;
            let data = match state.resources.get(url.as_str()) {
                Some(res) => res.data.clone(),
                None => {
                    return Ok(DavResponse {
                        status: StatusCode::NOT_FOUND,
                        headers: HeaderMap::new(),
                        body: Body::empty(),
                    })
                }
            };
            drop(state);

            let mut headers = HeaderMap::new();
            headers.insert(http::header::CONTENT_LENGTH, data.len().into());
            let end_of_body = truncate_after.map_or(data.len(), |n| n.min(data.len()));
            let body = Body::stream(stream! {
                let mut sent = 0;
                while sent < end_of_body {
                    if stall_after.map(|limit| sent >= limit).unwrap_or(false) {
                        futures_util::future::pending::<()>().await;
                    }
                    let end = (sent + chunk_size).min(end_of_body);
                    let chunk = data.slice(sent..end);
                    sent = end;
                    yield Ok::<_, io::Error>(chunk);
                }
            });
            Ok(DavResponse {
                status: StatusCode::OK,
                headers,
                body,
            })
        }
        .boxed()
    }

    fn head<'a>(&'a self, url: &'a Url) -> TransportFuture<'a, StatusCode> {
        async move {
            trace!("MEM: HEAD {url}");
            if let Some(status) = self.enter(DavMethod::HEAD, url)? {
                return Ok(status);
            }
            let state = self.state.lock();
            Ok(if state.resources.contains_key(url.as_str()) {
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            })
        }
        .boxed()
    }

    fn put<'a>(
        &'a self,
        url: &'a Url,
        body: Bytes,
        token: &'a LockToken,
    ) -> TransportFuture<'a, StatusCode> {
        async move {
            trace!("MEM: PUT {url} ({} bytes)", body.len());
            if let Some(status) = self.enter(DavMethod::PUT, url)? {
                return Ok(status);
            }
            let mut state = self.state.lock();
            let status = match state.resources.get_mut(url.as_str()) {
                Some(res) => match &res.lock {
                    Some(lock) if lock.token != *token => StatusCode::LOCKED,
                    _ => {
                        res.data = body;
                        StatusCode::NO_CONTENT
                    }
                },
                None => {
                    state.resources.insert(
                        url.as_str().to_string(),
                        Resource {
                            data: body,
                            lock: None,
                        },
                    );
                    StatusCode::CREATED
                }
            };
            Ok(status)
        }
        .boxed()
    }

    fn lock<'a>(&'a self, url: &'a Url, info: &'a LockInfo) -> TransportFuture<'a, LockResponse> {
        async move {
            trace!("MEM: LOCK {url} owner {}", info.owner);
            if let Some(status) = self.enter(DavMethod::LOCK, url)? {
                return Ok(LockResponse {
                    status,
                    token: None,
                });
            }
            let mut state = self.state.lock();
            let mut status = StatusCode::OK;
            let res = state
                .resources
                .entry(url.as_str().to_string())
                .or_insert_with(|| {
                    // lock on an unmapped url creates an empty resource.
                    status = StatusCode::CREATED;
                    Resource {
                        data: Bytes::new(),
                        lock: None,
                    }
                });
            if res.lock.is_some() {
                return Ok(LockResponse {
                    status: StatusCode::LOCKED,
                    token: None,
                });
            }
            let token = LockToken::new(format!("opaquelocktoken:{}", uuid::Uuid::new_v4()));
            res.lock = Some(MemLock {
                token: token.clone(),
                owner: info.owner.clone(),
            });
            Ok(LockResponse {
                status,
                token: Some(token),
            })
        }
        .boxed()
    }

    fn unlock<'a>(
        &'a self,
        url: &'a Url,
        token: &'a LockToken,
    ) -> TransportFuture<'a, StatusCode> {
        async move {
            trace!("MEM: UNLOCK {url}");
            if let Some(status) = self.enter(DavMethod::UNLOCK, url)? {
                return Ok(status);
            }
            let mut state = self.state.lock();
            let status = match state.resources.get_mut(url.as_str()) {
                None => StatusCode::NOT_FOUND,
                Some(res) => match &res.lock {
                    Some(lock) if lock.token == *token => {
                        res.lock = None;
                        StatusCode::NO_CONTENT
                    }
                    _ => StatusCode::CONFLICT,
                },
            };
            Ok(status)
        }
        .boxed()
    }
}
