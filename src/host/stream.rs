use crate::ProtocolId;

use futures::Future;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep_until, Instant, Sleep};
use tokio_yamux::StreamHandle;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A byte stream to a remote peer with a clock deadline for its I/O.
pub trait RpcStream: AsyncRead + AsyncWrite + Unpin + Send {
    /// After `deadline` every read and write fails with `TimedOut`. `None` clears it.
    fn set_deadline(&mut self, deadline: Option<Instant>);
}

/// A multiplexed stream on which `protocol` was negotiated.
pub struct MuxedStream {
    inner: StreamHandle,
    protocol: ProtocolId,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl MuxedStream {
    pub fn new(inner: StreamHandle, protocol: ProtocolId) -> Self {
        MuxedStream { inner, protocol, deadline: None }
    }

    pub fn protocol(&self) -> &ProtocolId {
        &self.protocol
    }

    fn poll_deadline(&mut self, cx: &mut Context<'_>) -> Option<io::Error> {
        let sleep = self.deadline.as_mut()?;
        if sleep.as_mut().poll(cx).is_ready() {
            return Some(io::Error::new(io::ErrorKind::TimedOut, "stream deadline exceeded"));
        }
        None
    }
}

impl RpcStream for MuxedStream {
    fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline.map(|at| Box::pin(sleep_until(at)));
    }
}

impl AsyncRead for MuxedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(err) = this.poll_deadline(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MuxedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Some(err) = this.poll_deadline(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(err) = this.poll_deadline(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
