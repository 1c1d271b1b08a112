//! One-shot results for account operations.
//!
//! Every operation hands back a [`Deferred`] and keeps the matching
//! [`Resolver`]. Settling consumes the resolver, so a result can be delivered
//! at most once; dropping it unsettled surfaces as [`AuthError::Dropped`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use crate::error::AuthError;

/// Pending result of an account operation.
#[must_use = "a Deferred does nothing unless awaited or polled"]
#[derive(Debug)]
pub struct Deferred<T> {
    rx: oneshot::Receiver<Result<T, AuthError>>,
}

/// Sending half of a [`Deferred`].
#[derive(Debug)]
pub struct Resolver<T> {
    tx: oneshot::Sender<Result<T, AuthError>>,
}

pub fn pair<T>() -> (Resolver<T>, Deferred<T>) {
    let (tx, rx) = oneshot::channel();
    (Resolver { tx }, Deferred { rx })
}

impl<T> Resolver<T> {
    pub fn settle(self, result: Result<T, AuthError>) {
        // The receiver may already be gone; nobody is waiting then.
        let _ = self.tx.send(result);
    }
}

impl<T> Deferred<T> {
    /// A deferred that is already settled.
    pub fn settled(result: Result<T, AuthError>) -> Self {
        let (resolver, deferred) = pair();
        resolver.settle(result);
        deferred
    }

    pub fn rejected(error: AuthError) -> Self {
        Self::settled(Err(error))
    }
}

impl<T> Future for Deferred<T> {
    type Output = Result<T, AuthError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(AuthError::Dropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn test_pending_until_settled() {
        let (resolver, mut deferred) = pair::<u8>();
        assert!((&mut deferred).now_or_never().is_none());
        resolver.settle(Ok(7));
        assert_eq!(deferred.now_or_never().unwrap().unwrap(), 7);
    }

    #[test]
    fn test_dropped_resolver() {
        let (resolver, deferred) = pair::<()>();
        drop(resolver);
        let err = deferred.now_or_never().unwrap().unwrap_err();
        assert!(matches!(err, AuthError::Dropped));
    }

    #[test]
    fn test_rejected() {
        let deferred = Deferred::<()>::rejected(AuthError::Surface("gone".into()));
        let err = deferred.now_or_never().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "could not open the account surface: gone");
    }
}
