use std::io;
use std::path::PathBuf;

use futures_util::StreamExt;
use http::StatusCode;
use tokio::io::AsyncWriteExt;

use crate::body::Body;
use crate::cancel::CancelToken;
use crate::davurl::DocumentRef;
use crate::errors::{DavError, DavResult, TransportError};
use crate::events::{CheckoutEvent, Direction};
use crate::session::{CheckoutSession, SessionState, WorkingCopy};
use crate::util::create_working_dir;

impl crate::Coordinator {
    /// Download a locked document into a fresh working directory and
    /// return the path of the local file.
    ///
    /// The whole body is on disk before this returns. If `cancel` fires
    /// while the body is streaming, the partial file is removed, the lock
    /// is released and [`DavError::Cancelled`] is returned; the session is
    /// then `Unlocked`. Other failures leave the session `Locked`.
    pub async fn fetch(
        &self,
        session: &mut CheckoutSession,
        cancel: &CancelToken,
    ) -> DavResult<PathBuf> {
        session.expect_state("fetch", &[SessionState::Locked])?;
        match self.download(&session.document, cancel).await {
            Ok(wc) => {
                let path = wc.file().to_path_buf();
                session.working_copy = Some(wc);
                session.state = SessionState::Fetched;
                Ok(path)
            }
            Err(DavError::Cancelled) => {
                self.emit(CheckoutEvent::FetchCancelled {
                    url: session.document.as_str(),
                });
                self.release(session).await;
                Err(DavError::Cancelled)
            }
            Err(e) => Err(e),
        }
    }

    async fn download(&self, document: &DocumentRef, cancel: &CancelToken) -> DavResult<WorkingCopy> {
        let name = document.file_name()?;
        let resp = self.transport.get(document.url()).await?;
        if resp.status != StatusCode::OK && resp.status != StatusCode::CREATED {
            return Err(DavError::fetch_failed(resp.status));
        }
        let total = resp.content_length();
        self.emit(CheckoutEvent::FetchStarted {
            url: document.as_str(),
            content_length: total,
        });

        let dir = create_working_dir(&self.temp_root, &self.temp_prefix).await?;
        let wc = WorkingCopy::new(dir, &name);
        match self.write_body(&wc, resp.body, total, cancel).await {
            Ok(bytes) => {
                self.emit(CheckoutEvent::FetchCompleted {
                    path: wc.file(),
                    bytes,
                });
                Ok(wc)
            }
            Err(e) => {
                self.discard(&wc).await;
                Err(e)
            }
        }
    }

    async fn write_body(
        &self,
        wc: &WorkingCopy,
        mut body: Body,
        total: Option<u64>,
        cancel: &CancelToken,
    ) -> DavResult<u64> {
        let mut file = tokio::fs::File::create(wc.file()).await?;
        let mut written = 0u64;
        self.emit(CheckoutEvent::Progress {
            direction: Direction::Download,
            transferred: 0,
            total,
        });
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DavError::Cancelled),
                chunk = body.next() => chunk,
            };
            let data = match chunk {
                Some(Ok(data)) => data,
                Some(Err(e)) => return Err(TransportError::Io(e).into()),
                None => break,
            };
            file.write_all(&data).await?;
            written += data.len() as u64;
            self.emit(CheckoutEvent::Progress {
                direction: Direction::Download,
                transferred: written,
                total,
            });
        }
        file.flush().await?;
        file.sync_all().await?;

        match total {
            Some(total) if total != written => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {total} bytes, received {written}"),
            ))
            .into()),
            _ => Ok(written),
        }
    }

    // remove what is left of a failed download.
    async fn discard(&self, wc: &WorkingCopy) {
        match tokio::fs::remove_file(wc.file()).await {
            Err(error) if error.kind() != io::ErrorKind::NotFound => {
                self.emit(CheckoutEvent::CleanupFailed {
                    path: wc.file(),
                    error: &error,
                });
            }
            _ => {}
        }
        if let Err(error) = tokio::fs::remove_dir(wc.dir()).await {
            self.emit(CheckoutEvent::CleanupFailed {
                path: wc.dir(),
                error: &error,
            });
        }
    }
}
