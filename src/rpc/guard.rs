use crate::host::{ConnManager, Host};
use crate::{AddrInfo, CallContext, Error, PeerId, Result};

use tokio::time::{Duration, Instant};
use tracing::debug;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TAG_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Keeps a peer protected from connection trimming until released or dropped.
///
/// The tag is unprotected exactly once, whichever of `release` or `Drop` comes first.
pub struct Protection<'a> {
    conn_manager: &'a dyn ConnManager,
    peer: PeerId,
    tag: String,
    released: bool,
}

impl<'a> Protection<'a> {
    fn acquire(conn_manager: &'a dyn ConnManager, peer: PeerId) -> Self {
        let tag = protection_tag(&peer);
        conn_manager.protect(&peer, &tag);
        Protection { conn_manager, peer, tag, released: false }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn release(mut self) {
        self.unprotect();
    }

    fn unprotect(&mut self) {
        if !self.released {
            self.released = true;
            self.conn_manager.unprotect(&self.peer, &self.tag);
        }
    }
}

impl Drop for Protection<'_> {
    fn drop(&mut self) {
        self.unprotect();
    }
}

/// Unique per attempt: peer, wall clock nanoseconds and a process-wide sequence number.
fn protection_tag(peer: &PeerId) -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
    let seq = TAG_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("conn-{}-{}-{}", peer, nanos, seq)
}

/// Protects the peer, then connects to it under `ctx`.
///
/// The protection is registered before dialing so the connection is covered from the moment
/// it exists. On failure it is released before returning. The elapsed time covers tagging
/// through the end of the connect attempt, whatever its outcome.
pub async fn connect_and_protect<'a, H: Host>(
    ctx: &CallContext,
    host: &'a H,
    peer: &AddrInfo,
) -> (Duration, Result<Protection<'a>>) {
    let t0 = Instant::now();
    let protection = Protection::acquire(host.conn_manager(), peer.peer_id);

    let connected = ctx.run(host.connect(peer)).await;
    let took = t0.elapsed();

    match connected {
        Ok(()) => {
            debug!("connected to {} in {:?}, protected as {}", peer.peer_id, took, protection.tag());
            (took, Ok(protection))
        }
        Err(source) => {
            protection.release();
            (took, Err(Error::ConnectFailed { peer: peer.peer_id, source }))
        }
    }
}
