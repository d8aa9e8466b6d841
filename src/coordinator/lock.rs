use http::StatusCode;

use crate::davurl::DocumentRef;
use crate::errors::{DavError, DavResult};
use crate::events::CheckoutEvent;
use crate::session::CheckoutSession;
use crate::transport::LockInfo;

impl crate::Coordinator {
    /// Take an exclusive write lock on the document for `owner`.
    ///
    /// Contention is reported right away as [`DavError::AlreadyLocked`];
    /// retrying is up to the caller.
    pub async fn lock(&self, document: DocumentRef, owner: &str) -> DavResult<CheckoutSession> {
        let url = document.as_str();
        self.emit(CheckoutEvent::Locking { url, owner });

        let info = LockInfo::exclusive(owner, self.lock_timeout);
        let resp = self.transport.lock(document.url(), &info).await?;
        let token = match resp.token {
            Some(token) if resp.status.is_success() => token,
            _ => {
                self.emit(CheckoutEvent::LockRejected {
                    url,
                    status: resp.status,
                });
                return Err(match resp.status {
                    StatusCode::LOCKED => DavError::AlreadyLocked,
                    status if status.is_success() => DavError::LockFailed {
                        status,
                        reason: "no lock token in response".to_string(),
                    },
                    status => DavError::lock_failed(status),
                });
            }
        };
        self.emit(CheckoutEvent::LockAcquired { url, token: &token });
        Ok(CheckoutSession::locked(document, token))
    }
}
