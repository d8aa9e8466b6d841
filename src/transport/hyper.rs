//! WebDAV transport on top of the `hyper` HTTP client.
//!
//! Plain HTTP/1.1 with a pooled connector. Credentials are configured once
//! and sent as basic auth on every request.
//!
use std::io;
use std::time::Duration;

use bytes::Bytes;
use async_stream::stream;
use futures_util::{FutureExt, StreamExt};
use headers::authorization::Basic;
use headers::{Authorization, HeaderMapExt};
use http::{Request, StatusCode};
use hyper::client::HttpConnector;
use url::Url;
use xml::writer::{EmitterConfig, XmlEvent};
use xmltree::{Element, XMLNode};

use crate::body::Body;
use crate::errors::{TransportError, TransportResult};
use crate::session::LockToken;
use crate::transport::{
    DavResponse, DavTransport, LockInfo, LockResponse, TransportFuture,
};
use crate::util::DavMethod;

/// Default number of pooled connections per host.
pub const MAX_CONNECTIONS_PER_HOST: usize = 20;
/// Default time to wait for the response head.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Login and password for basic authentication.
#[derive(Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Credentials {
        Credentials {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

/// Configuration of the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    credentials: Option<Credentials>,
    max_connections_per_host: usize,
    request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig::new()
    }
}

impl HttpConfig {
    pub fn new() -> HttpConfig {
        HttpConfig {
            credentials: None,
            max_connections_per_host: MAX_CONNECTIONS_PER_HOST,
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    /// Credentials sent with every request.
    pub fn credentials(self, credentials: Credentials) -> Self {
        let mut this = self;
        this.credentials = Some(credentials);
        this
    }

    /// Connections kept in the pool per host (default 20).
    pub fn max_connections_per_host(self, max: usize) -> Self {
        let mut this = self;
        this.max_connections_per_host = max;
        this
    }

    /// How long to wait for a response, and for each chunk of a response
    /// body (default 60 seconds).
    pub fn request_timeout(self, timeout: Duration) -> Self {
        let mut this = self;
        this.request_timeout = timeout;
        this
    }

    pub fn build(self) -> HyperTransport {
        HyperTransport::new(self)
    }
}

/// HTTP transport backed by a pooled `hyper::Client`.
#[derive(Debug, Clone)]
pub struct HyperTransport {
    client: hyper::Client<HttpConnector, hyper::Body>,
    auth: Option<Authorization<Basic>>,
    timeout: Duration,
}

impl HyperTransport {
    pub fn new(config: HttpConfig) -> HyperTransport {
        let client = hyper::Client::builder()
            .pool_max_idle_per_host(config.max_connections_per_host)
            .build_http();
        let auth = config
            .credentials
            .map(|c| Authorization::basic(&c.login, &c.password));
        HyperTransport {
            client,
            auth,
            timeout: config.request_timeout,
        }
    }

    fn request(&self, method: DavMethod, url: &Url) -> TransportResult<http::request::Builder> {
        let method = method
            .to_http()
            .ok_or_else(|| TransportError::request(format!("no such method {method:?}")))?;
        let uri: hyper::Uri = url.as_str().parse().map_err(TransportError::request)?;
        let mut req = Request::builder().method(method).uri(uri);
        if let (Some(auth), Some(headers)) = (&self.auth, req.headers_mut()) {
            headers.typed_insert(auth.clone());
        }
        Ok(req)
    }

    async fn send(&self, req: Request<hyper::Body>) -> TransportResult<hyper::Response<hyper::Body>> {
        debug!("HTTP: {} {}", req.method(), req.uri());
        match tokio::time::timeout(self.timeout, self.client.request(req)).await {
            Ok(Ok(resp)) => {
                debug!("HTTP: status {}", resp.status());
                Ok(resp)
            }
            Ok(Err(e)) => Err(TransportError::request(e)),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    // send, and throw the response body away.
    async fn send_status(&self, req: Request<hyper::Body>) -> TransportResult<StatusCode> {
        let resp = self.send(req).await?;
        let status = resp.status();
        hyper::body::to_bytes(resp.into_body())
            .await
            .map_err(TransportError::request)?;
        Ok(status)
    }
}

/// XML body of a LOCK request.
pub(crate) fn lockinfo_xml(info: &LockInfo) -> Result<Vec<u8>, xml::writer::Error> {
    let mut buf = Vec::new();
    {
        let mut w = EmitterConfig::new()
            .perform_indent(false)
            .create_writer(&mut buf);
        w.write(XmlEvent::start_element("D:lockinfo").ns("D", "DAV:"))?;
        w.write(XmlEvent::start_element("D:lockscope"))?;
        w.write(XmlEvent::start_element("D:exclusive"))?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::start_element("D:locktype"))?;
        w.write(XmlEvent::start_element("D:write"))?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::start_element("D:owner"))?;
        w.write(XmlEvent::characters(&info.owner))?;
        w.write(XmlEvent::end_element())?;
        w.write(XmlEvent::end_element())?;
    }
    Ok(buf)
}

// find the first element called `name`, depth first.
fn find<'e>(elem: &'e Element, name: &str) -> Option<&'e Element> {
    if elem.name == name {
        return Some(elem);
    }
    elem.children
        .iter()
        .filter_map(|c| match c {
            XMLNode::Element(e) => Some(e),
            _ => None,
        })
        .find_map(|c| find(c, name))
}

/// Lock token from the `Lock-Token` header, or else from the
/// `lockdiscovery` in the response body.
pub(crate) fn parse_lock_token(headers: &http::HeaderMap, body: &[u8]) -> Option<LockToken> {
    let from_header = headers
        .get("lock-token")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().trim_start_matches('<').trim_end_matches('>').trim())
        .filter(|v| !v.is_empty());
    if let Some(token) = from_header {
        return Some(LockToken::new(token));
    }
    let root = Element::parse(body).ok()?;
    let href = find(&root, "locktoken")?.get_child("href")?;
    let text = href.get_text()?;
    let text = text.trim();
    (!text.is_empty()).then(|| LockToken::new(text))
}

// every chunk of a response body has to arrive within `timeout`.
fn read_timeout(
    body: hyper::Body,
    timeout: Duration,
) -> impl futures_util::Stream<Item = io::Result<Bytes>> + Send + 'static {
    stream! {
        let mut body = body;
        loop {
            match tokio::time::timeout(timeout, body.next()).await {
                Ok(Some(Ok(data))) => {
                    yield Ok::<_, io::Error>(data);
                }
                Ok(Some(Err(e))) => {
                    yield Err(io::Error::new(io::ErrorKind::Other, e));
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    yield Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no data received for {timeout:?}"),
                    ));
                    break;
                }
            }
        }
    }
}

fn timeout_header(timeout: Duration) -> String {
    format!("Second-{}", timeout.as_secs().max(1))
}

impl DavTransport for HyperTransport {
    fn get<'a>(&'a self, url: &'a Url) -> TransportFuture<'a, DavResponse> {
        async move {
            let req = self
                .request(DavMethod::GET, url)?
                .body(hyper::Body::empty())
                .map_err(TransportError::request)?;
            let resp = self.send(req).await?;
            let (parts, body) = resp.into_parts();
            Ok(DavResponse {
                status: parts.status,
                headers: parts.headers,
                body: Body::stream(read_timeout(body, self.timeout)),
            })
        }
        .boxed()
    }

    fn head<'a>(&'a self, url: &'a Url) -> TransportFuture<'a, StatusCode> {
        async move {
            let req = self
                .request(DavMethod::HEAD, url)?
                .body(hyper::Body::empty())
                .map_err(TransportError::request)?;
            self.send_status(req).await
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
            let mut req = self
                .request(DavMethod::PUT, url)?
                .header("If", format!("(<{token}>)"))
                .header("Lock-Token", format!("<{token}>"));
            if let Some(headers) = req.headers_mut() {
                headers.typed_insert(headers::ContentLength(body.len() as u64));
                let mime = mime_guess::from_path(url.path()).first_or_octet_stream();
                headers.typed_insert(headers::ContentType::from(mime));
            }
            let req = req
                .body(hyper::Body::from(body))
                .map_err(TransportError::request)?;
            self.send_status(req).await
        }
        .boxed()
    }

    fn lock<'a>(&'a self, url: &'a Url, info: &'a LockInfo) -> TransportFuture<'a, LockResponse> {
        async move {
            let xml = lockinfo_xml(info).map_err(TransportError::request)?;
            let req = self
                .request(DavMethod::LOCK, url)?
                .header("Depth", "0")
                .header("Timeout", timeout_header(info.timeout))
                .header("Content-Type", "application/xml; charset=utf-8")
                .body(hyper::Body::from(xml))
                .map_err(TransportError::request)?;
            let resp = self.send(req).await?;
            let (parts, body) = resp.into_parts();
            let body = hyper::body::to_bytes(body)
                .await
                .map_err(TransportError::request)?;
            let token = if parts.status.is_success() {
                parse_lock_token(&parts.headers, &body)
            } else {
                None
            };
            Ok(LockResponse {
                status: parts.status,
                token,
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
            let req = self
                .request(DavMethod::UNLOCK, url)?
                .header("Lock-Token", format!("<{token}>"))
                .body(hyper::Body::empty())
                .map_err(TransportError::request)?;
            self.send_status(req).await
        }
        .boxed()
    }
}
