use bytes::Bytes;
use http::StatusCode;

use crate::davurl::DocumentRef;
use crate::errors::{DavError, DavResult};
use crate::events::{CheckoutEvent, Direction};
use crate::session::{CheckoutSession, LockToken, SessionState, WorkingCopy};

impl crate::Coordinator {
    /// Upload the working copy over the remote document.
    ///
    /// A HEAD request first checks that the document still exists; if it
    /// was deleted or moved in the meantime this fails with
    /// [`DavError::RemoteResourceGone`] and nothing is uploaded. There is
    /// no check that somebody else modified it since it was locked.
    ///
    /// On failure the session stays `Fetched`, lock and working copy
    /// included, so the store can be retried.
    pub async fn store(&self, session: &mut CheckoutSession) -> DavResult<()> {
        session.expect_state("store", &[SessionState::Fetched])?;
        let (token, wc) = match (&session.lock, &session.working_copy) {
            (Some(token), Some(wc)) => (token, wc),
            _ => {
                return Err(DavError::InvalidState {
                    operation: "store",
                    state: session.state,
                })
            }
        };
        let result = self.upload(&session.document, wc, token).await;
        let url = session.document.as_str();
        match result {
            Ok(()) => {
                self.emit(CheckoutEvent::StoreCompleted { url });
                session.state = SessionState::Stored;
                Ok(())
            }
            Err(error) => {
                self.emit(CheckoutEvent::StoreFailed { url, error: &error });
                Err(error)
            }
        }
    }

    async fn upload(
        &self,
        document: &DocumentRef,
        wc: &WorkingCopy,
        token: &LockToken,
    ) -> DavResult<()> {
        let status = self.transport.head(document.url()).await?;
        match status {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND | StatusCode::GONE => return Err(DavError::RemoteResourceGone),
            s => return Err(DavError::store_failed(s)),
        }

        self.emit(CheckoutEvent::StoreStarted {
            url: document.as_str(),
            path: wc.file(),
        });
        let data = Bytes::from(tokio::fs::read(wc.file()).await?);
        let total = data.len() as u64;
        self.emit(CheckoutEvent::Progress {
            direction: Direction::Upload,
            transferred: 0,
            total: Some(total),
        });

        let status = self.transport.put(document.url(), data, token).await?;
        if !status.is_success() {
            return Err(DavError::store_failed(status));
        }
        self.emit(CheckoutEvent::Progress {
            direction: Direction::Upload,
            transferred: total,
            total: Some(total),
        });
        Ok(())
    }
}
