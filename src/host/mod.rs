//! The local network identity used to reach remote peers.
//!
//! `Host` is the seam the RPC code is written against. `TcpHost` is the production
//! implementation: TCP transport, mutually authenticated TLS and a yamux multiplexer, dial
//! only.

pub mod conn_manager;
pub mod peerstore;
pub mod settings;
pub mod stream;
mod tcp_host;

pub use conn_manager::{BasicConnManager, ConnManager};
pub use peerstore::{PeerRecord, PeerStore};
pub use settings::HostConfig;
pub use stream::{MuxedStream, RpcStream};
pub use tcp_host::{new_tcp_host, TcpHost};

use crate::{AddrInfo, PeerId, ProtocolId};

use futures::future::BoxFuture;

use std::io;

pub trait Host: Send + Sync {
    type Stream: RpcStream;

    fn id(&self) -> PeerId;

    fn conn_manager(&self) -> &dyn ConnManager;

    /// Ensures a live connection to the peer, dialing its addresses if there is none yet.
    fn connect<'a>(&'a self, peer: &'a AddrInfo) -> BoxFuture<'a, io::Result<()>>;

    /// Opens a stream to a connected peer and negotiates `protocol` on it.
    fn new_stream<'a>(
        &'a self,
        peer: &'a PeerId,
        protocol: &'a ProtocolId,
    ) -> BoxFuture<'a, io::Result<Self::Stream>>;
}
