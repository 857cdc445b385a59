use crate::error::Error;
use std::sync::OnceLock;
use tokio::sync::Notify;

/// Single-shot, cause-carrying close signal shared by a connection or stream
/// and everything blocked on it. The first `close` wins; later calls are
/// no-ops.
#[derive(Debug, Default)]
pub(crate) struct Closer {
    cause: OnceLock<Error>,
    notify: Notify,
}

impl Closer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the cause and wakes all waiters. Returns true for the call
    /// that actually performed the close.
    pub fn close(&self, cause: Error) -> bool {
        let first = self.cause.set(cause).is_ok();
        if first {
            self.notify.notify_waiters();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.cause.get().is_some()
    }

    pub fn cause(&self) -> Option<Error> {
        self.cause.get().cloned()
    }

    /// The close cause, or a generic placeholder when not yet closed.
    pub fn err(&self) -> Error {
        self.cause.get().cloned().unwrap_or_else(|| Error::Closed("closed".to_string()))
    }

    /// Resolves once `close` has been called. Safe to call repeatedly and
    /// from multiple tasks.
    pub async fn closed(&self) {
        while !self.is_closed() {
            let notified = self.notify.notified();
            if self.is_closed() {
                break;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_close_wins() {
        let closer = Closer::new();
        assert!(!closer.is_closed());
        assert!(closer.close(Error::Timeout));
        assert!(!closer.close(Error::ConnectionRefused));
        assert_eq!(closer.cause(), Some(Error::Timeout));
    }

    #[tokio::test]
    async fn closed_resolves_for_waiters() {
        let closer = Arc::new(Closer::new());
        let waiter = {
            let closer = closer.clone();
            tokio::spawn(async move {
                closer.closed().await;
                closer.err()
            })
        };
        tokio::task::yield_now().await;
        closer.close(Error::Closed("bye".to_string()));
        assert_eq!(waiter.await.unwrap(), Error::Closed("bye".to_string()));
    }

    #[tokio::test]
    async fn closed_resolves_when_already_closed() {
        let closer = Closer::new();
        closer.close(Error::Timeout);
        closer.closed().await;
    }
}
