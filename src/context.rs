//! Cooperative cancellation and deadlines for a single call.

use futures::Future;
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;

use std::io;

/// Carries the cancellation signal and the optional deadline of a call.
///
/// Clones share the same cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context which is never cancelled and has no deadline.
    pub fn background() -> Self {
        CallContext::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        CallContext::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        CallContext { token: CancellationToken::new(), deadline: Some(deadline) }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drives `fut` until it completes, the context is cancelled or the deadline passes.
    ///
    /// `fut` is polled first, so a future which is immediately ready wins even against an
    /// expired context.
    pub async fn run<F, T>(&self, fut: F) -> io::Result<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        let expiry = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => futures::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            res = fut => res,
            _ = self.token.cancelled() => Err(canceled()),
            _ = expiry => Err(deadline_exceeded()),
        }
    }
}

pub fn canceled() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "context canceled")
}

pub fn deadline_exceeded() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "context deadline exceeded")
}
