//! Cancellation signalling for load tasks
//!
//! A `watch` channel carries a single flag. The handle flips it; tokens are
//! polled at the points where a load may stop.

use std::sync::Arc;

use tokio::sync::watch;

/// Owner side: requests cancellation
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observer side: checked between load steps
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle and token
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelToken { rx })
}

impl CancelHandle {
    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Another token observing this handle
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelToken {
    /// A token that is never cancelled
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_observed_by_all_tokens() {
        let (handle, token) = cancel_pair();
        let second = handle.token();
        assert!(!token.is_cancelled());

        handle.cancel();
        handle.cancel();
        assert!(token.is_cancelled());
        assert!(second.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_never_token() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
        assert!(!token.clone().is_cancelled());
    }
}
