use crate::addr_info::tcp_multiaddr;
use crate::protocol::{EchoRequest, EchoResponse, IdentifyResponse, ECHO_PROTOCOL, IDENTIFY_PROTOCOL};
use crate::{wire, PeerId, ProtocolId};

use futures::future::{BoxFuture, FutureExt};
use futures::Future;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio_yamux::StreamHandle;
use tracing::debug;

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

/// The authenticated peer on the other end of an inbound stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemotePeer {
    pub id: PeerId,
    pub addr: SocketAddr,
}

/// Serves one negotiated inbound stream to completion.
pub type Handler =
    Arc<dyn Fn(RemotePeer, StreamHandle) -> BoxFuture<'static, io::Result<()>> + Send + Sync>;

/// Maps protocol ids to the handlers serving them.
#[derive(Clone, Default)]
pub struct Router {
    handlers: HashMap<ProtocolId, Handler>,
}

impl Router {
    pub fn new() -> Self {
        Router::default()
    }

    /// Serves `protocol` with a handler that gets the whole stream after negotiation.
    pub fn route_raw<F, Fut>(&mut self, protocol: impl Into<ProtocolId>, handler: F) -> &mut Self
    where
        F: Fn(RemotePeer, StreamHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |peer, stream| handler(peer, stream).boxed());
        self.handlers.insert(protocol.into(), handler);
        self
    }

    /// Serves `protocol` with one request value in and one response value out.
    pub fn route<Req, Rsp, F, Fut>(&mut self, protocol: impl Into<ProtocolId>, handler: F) -> &mut Self
    where
        Req: DeserializeOwned + Send + 'static,
        Rsp: Serialize + Send + Sync + 'static,
        F: Fn(RemotePeer, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Rsp> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.route_raw(protocol, move |peer, mut stream| {
            let handler = handler.clone();
            async move {
                let request: Req = wire::read_rpc(&mut stream).await?;
                let response = handler(peer, request).await;
                respond(stream, &response).await
            }
        })
    }

    /// Serves `protocol` by answering as soon as it is negotiated, without reading anything.
    pub fn route_no_args<Rsp, F, Fut>(&mut self, protocol: impl Into<ProtocolId>, handler: F) -> &mut Self
    where
        Rsp: Serialize + Send + Sync + 'static,
        F: Fn(RemotePeer) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Rsp> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.route_raw(protocol, move |peer, stream| {
            let handler = handler.clone();
            async move {
                let response = handler(peer).await;
                respond(stream, &response).await
            }
        })
    }

    /// Adds the echo protocol, which sends every message back together with the caller's id.
    pub fn with_echo(mut self) -> Self {
        self.route(ECHO_PROTOCOL, |peer: RemotePeer, req: EchoRequest| async move {
            EchoResponse { message: req.message, caller: peer.id }
        });
        self
    }

    /// Adds the identify protocol describing the local peer and every protocol routed so far.
    pub fn with_identify(mut self, local: PeerId, agent_version: impl Into<String>) -> Self {
        let mut protocols: Vec<String> =
            self.protocols().iter().map(|p| p.as_str().to_owned()).collect();
        protocols.push(IDENTIFY_PROTOCOL.to_owned());
        protocols.sort();
        let agent_version = agent_version.into();

        self.route_no_args(IDENTIFY_PROTOCOL, move |peer: RemotePeer| {
            let response = IdentifyResponse {
                peer_id: local,
                agent_version: agent_version.clone(),
                protocols: protocols.clone(),
                observed_addr: tcp_multiaddr(&peer.addr),
            };
            async move { response }
        });
        self
    }

    pub fn handler(&self, protocol: &ProtocolId) -> Option<Handler> {
        self.handlers.get(protocol).cloned()
    }

    pub fn protocols(&self) -> Vec<ProtocolId> {
        let mut protocols: Vec<ProtocolId> = self.handlers.keys().cloned().collect();
        protocols.sort();
        protocols
    }
}

async fn respond<T: Serialize + Sync>(mut stream: StreamHandle, response: &T) -> io::Result<()> {
    wire::write_rpc(&mut stream, response).await?;
    if let Err(err) = stream.shutdown().await {
        debug!("closing response stream: {}", err);
    }
    Ok(())
}
