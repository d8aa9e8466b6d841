//! Cooperative cancellation of a running download.
//!
//! The application keeps the [`CancelHandle`] (behind its "cancel" button,
//! or a ctrl-c handler) and passes the [`CancelToken`] to
//! [`Coordinator::checkout`](crate::Coordinator::checkout).

use tokio::sync::watch;

/// Create a connected handle/token pair.
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // nobody listening means nothing left to cancel.
        let _ = self.tx.send(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> CancelToken {
        let (_tx, rx) = watch::channel(false);
        CancelToken { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled. Pends forever if the handle
    /// was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> CancelToken {
        CancelToken::never()
    }
}
