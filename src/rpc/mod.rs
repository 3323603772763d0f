//! Single request/response exchanges with a remote peer.
//!
//! A call goes through connect, stream open, write (skipped without a request value) and
//! read, strictly in that order. Each phase is attempted at most once; the first failure ends
//! the call and the timings of the phases that ran are still reported. Retrying is left to
//! the caller.

mod guard;

pub use guard::{connect_and_protect, Protection};

use crate::host::{Host, RpcStream};
use crate::{wire, AddrInfo, CallContext, Error, PeerId, ProtocolId, Result};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::time::{timeout, Duration, Instant};
use tracing::debug;

use std::io;
use std::ops::{Deref, DerefMut};

/// Stream deadline applied when the caller's context carries none.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Upper bound on closing a stream once the exchange is over.
const STREAM_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long each phase of a call took, in milliseconds. A phase that was not reached is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcTook {
    #[serde(rename = "dialing_peerid")]
    pub local_peer_id: PeerId,
    #[serde(rename = "peer_connect_took_msecs", skip_serializing_if = "Option::is_none")]
    pub peer_connect_msecs: Option<u64>,
    #[serde(rename = "stream_open_took_msecs", skip_serializing_if = "Option::is_none")]
    pub stream_open_msecs: Option<u64>,
    #[serde(rename = "stream_write_took_msecs", skip_serializing_if = "Option::is_none")]
    pub stream_write_msecs: Option<u64>,
    #[serde(rename = "stream_read_took_msecs", skip_serializing_if = "Option::is_none")]
    pub stream_read_msecs: Option<u64>,
}

impl RpcTook {
    pub fn new(local_peer_id: PeerId) -> Self {
        RpcTook {
            local_peer_id,
            peer_connect_msecs: None,
            stream_open_msecs: None,
            stream_write_msecs: None,
            stream_read_msecs: None,
        }
    }
}

/// Runs one RPC: connects to `peer`, opens a `protocol` stream, writes `request` (when given)
/// and reads a single `Rsp`.
///
/// The stream deadline follows the deadline of `ctx`, or `DEFAULT_RPC_TIMEOUT` from now when
/// `ctx` has none. Connection protection, the stream deadline and the stream itself are
/// released on every exit path.
pub async fn exec_rpc<H, Req, Rsp>(
    ctx: &CallContext,
    host: &H,
    peer: &AddrInfo,
    protocol: &ProtocolId,
    request: Option<&Req>,
) -> (RpcTook, Result<Rsp>)
where
    H: Host,
    Req: Serialize + Sync + ?Sized,
    Rsp: DeserializeOwned,
{
    let mut took = RpcTook::new(host.id());
    let res = run_phases(ctx, host, peer, protocol, request, &mut took).await;
    if let Err(err) = &res {
        debug!("rpc {} to {} failed: {}", protocol, peer.peer_id, err);
    }
    (took, res)
}

async fn run_phases<H, Req, Rsp>(
    ctx: &CallContext,
    host: &H,
    peer: &AddrInfo,
    protocol: &ProtocolId,
    request: Option<&Req>,
    took: &mut RpcTook,
) -> Result<Rsp>
where
    H: Host,
    Req: Serialize + Sync + ?Sized,
    Rsp: DeserializeOwned,
{
    let (connect_took, protection) = connect_and_protect(ctx, host, peer).await;
    took.peer_connect_msecs = Some(msecs(connect_took));
    // held until return, then unprotected
    let _protection = protection?;

    let t0 = Instant::now();
    let opened = ctx.run(host.new_stream(&peer.peer_id, protocol)).await;
    took.stream_open_msecs = Some(msecs(t0.elapsed()));
    let mut stream = opened
        .map_err(|source| Error::StreamOpenFailed { protocol: protocol.clone(), source })?;

    // The stream only understands clock deadlines, the context only cancellation. Inherit the
    // context deadline, and never leave the stream unbounded.
    let deadline = ctx.deadline().unwrap_or_else(|| Instant::now() + DEFAULT_RPC_TIMEOUT);
    let res = {
        let mut scoped = DeadlineScope::apply(&mut stream, deadline);
        exchange(ctx, &mut *scoped, protocol, request, took).await
    };

    let closed = timeout(STREAM_CLOSE_TIMEOUT, ctx.run(stream.shutdown()))
        .await
        .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "stream close timed out")));
    if let Err(err) = closed {
        debug!("closing {} stream to {}: {}", protocol, peer.peer_id, err);
    }
    res
}

async fn exchange<S, Req, Rsp>(
    ctx: &CallContext,
    stream: &mut S,
    protocol: &ProtocolId,
    request: Option<&Req>,
    took: &mut RpcTook,
) -> Result<Rsp>
where
    S: RpcStream,
    Req: Serialize + Sync + ?Sized,
    Rsp: DeserializeOwned,
{
    if let Some(request) = request {
        let t0 = Instant::now();
        let written = ctx.run(wire::write_rpc(&mut *stream, request)).await;
        took.stream_write_msecs = Some(msecs(t0.elapsed()));
        written
            .map_err(|source| Error::StreamWriteFailed { protocol: protocol.clone(), source })?;
    }

    let t0 = Instant::now();
    let read = ctx.run(wire::read_rpc::<_, Rsp>(&mut *stream)).await;
    took.stream_read_msecs = Some(msecs(t0.elapsed()));
    read.map_err(|source| Error::StreamReadFailed { protocol: protocol.clone(), source })
}

/// Sets a stream deadline for as long as the scope lives.
struct DeadlineScope<'a, S: RpcStream> {
    stream: &'a mut S,
}

impl<'a, S: RpcStream> DeadlineScope<'a, S> {
    fn apply(stream: &'a mut S, deadline: Instant) -> Self {
        stream.set_deadline(Some(deadline));
        DeadlineScope { stream }
    }
}

impl<S: RpcStream> Deref for DeadlineScope<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.stream
    }
}

impl<S: RpcStream> DerefMut for DeadlineScope<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.stream
    }
}

impl<S: RpcStream> Drop for DeadlineScope<'_, S> {
    fn drop(&mut self) {
        self.stream.set_deadline(None);
    }
}

fn msecs(d: Duration) -> u64 {
    d.as_millis() as u64
}

#[cfg(test)]
mod rpc_tests;
