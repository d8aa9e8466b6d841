//! Definitions for response bodies.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream};

use pin_utils::pin_mut;

/// Body is returned by a transport for a GET request, and implements `Stream`.
pub struct Body {
    pub(crate) inner: BodyType,
}

pub(crate) enum BodyType {
    Bytes(Option<Bytes>),
    Stream(BoxStream<'static, Result<Bytes, io::Error>>),
}

impl Body {
    /// Return an empty body.
    pub fn empty() -> Body {
        Body {
            inner: BodyType::Bytes(None),
        }
    }
    /// Create a body from a stream.
    pub fn stream(stream: impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static) -> Body {
        Body {
            inner: BodyType::Stream(Box::pin(stream)),
        }
    }
}

impl Stream for Body {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        match &mut self.inner {
            BodyType::Bytes(bytes) => Poll::Ready(bytes.take().map(Ok)),
            BodyType::Stream(stream) => {
                pin_mut!(stream);
                stream.poll_next(cx)
            }
        }
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            BodyType::Bytes(b) => f
                .debug_struct("Body")
                .field("len", &b.as_ref().map(|b| b.len()).unwrap_or(0))
                .finish(),
            BodyType::Stream(_) => f.debug_struct("Body").field("stream", &true).finish(),
        }
    }
}

impl From<Bytes> for Body {
    fn from(t: Bytes) -> Body {
        Body {
            inner: BodyType::Bytes(Some(t)),
        }
    }
}
