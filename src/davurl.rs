//! Utility module to handle document urls.
//!
//! Urls handed to us by the office plugin are "half escaped": path segments
//! can contain literal spaces as well as `%20`. [`encode_url`] turns them
//! into something a HTTP client accepts, and [`DocumentRef`] is the parsed
//! result that the rest of the crate works with.
//!
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::errors::{DavError, DavResult};

// Everything except `A-Z a-z 0-9 . - * _` gets escaped.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'*')
    .remove(b'_');

// Scheme, the two slashes after it, and the host.
const VERBATIM_TOKENS: usize = 4;

// Split on '/', returning the separators as tokens of their own. Empty
// tokens are skipped.
fn tokens(url: &str) -> impl Iterator<Item = &str> {
    url.split_inclusive('/')
        .flat_map(|part| {
            let n = part.len() - usize::from(part.ends_with('/'));
            let (segment, slash) = part.split_at(n);
            [segment, slash]
        })
        .filter(|t| !t.is_empty())
}

/// Percent-encode the path of a document url.
///
/// The url is cut into tokens at every `/`, keeping the slashes as tokens.
/// The first four tokens (`http:`, `/`, `/`, `host`) and all slashes are
/// copied verbatim; every other token is decoded and then fully
/// percent-encoded. Spaces always end up as `%20`.
///
/// Applying this to its own output returns the output unchanged.
pub fn encode_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len() + 16);
    for (count, token) in tokens(url).enumerate() {
        if count < VERBATIM_TOKENS || token == "/" {
            out.push_str(&token.replace(' ', "%20"));
            continue;
        }
        let decoded = match percent_decode_str(token).decode_utf8() {
            Ok(s) => s,
            Err(_) => Cow::Borrowed(token),
        };
        out.extend(utf8_percent_encode(&decoded, SEGMENT));
    }
    out
}

/// The remote document: an absolute, escaped url and the host it lives on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    url: Url,
    host: String,
}

impl DocumentRef {
    /// Normalize and parse a document url.
    pub fn parse(raw: &str) -> DavResult<DocumentRef> {
        let encoded = encode_url(raw.trim());
        let url = Url::parse(&encoded).map_err(|e| DavError::InvalidUrl(format!("{raw}: {e}")))?;
        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(DavError::InvalidUrl(format!("{raw}: no host"))),
        };
        Ok(DocumentRef { url, host })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Name of the local working copy: the last path segment, decoded,
    /// with spaces replaced by underscores.
    pub fn file_name(&self) -> DavResult<String> {
        let segment = self
            .url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or("");
        let decoded = percent_decode_str(segment).decode_utf8_lossy();
        let name: String = decoded
            .chars()
            .map(|c| match c {
                ' ' | '/' | '\\' => '_',
                c => c,
            })
            .collect();
        match name.as_str() {
            "" | "." | ".." => Err(DavError::InvalidUrl(format!(
                "{}: does not name a file",
                self.url
            ))),
            _ => Ok(name),
        }
    }
}

impl FromStr for DocumentRef {
    type Err = DavError;

    fn from_str(s: &str) -> DavResult<DocumentRef> {
        DocumentRef::parse(s)
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}
