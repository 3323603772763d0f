use crate::addr_info::tcp_multiaddr;
use crate::host::HostConfig;
use crate::tls::certificate::Identity;
use crate::tls::upgrader::{TlsServerUpgrader, Upgrader};
use crate::{wire, AddrInfo, Error, PeerId, Result};

use super::router::{RemotePeer, Router};

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_yamux::{Session, StreamHandle};
use tracing::{debug, error, info};

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

/// Implements a server for handling incoming connections.
///
/// Every accepted connection is authenticated with TLS and multiplexed; each inbound stream
/// negotiates one protocol and is handed to the router.
pub struct Server {
    id: PeerId,
    listener: TcpListener,
    upgrader: Arc<dyn Upgrader>,
    config: HostConfig,
    router: Arc<Router>,
}

impl Server {
    /// Binds `addr` under a freshly generated identity.
    ///
    /// The identify protocol is always served, describing the protocols of `router`.
    pub async fn bind(addr: SocketAddr, config: &HostConfig, router: Router) -> Result<Server> {
        let identity = Identity::generate()
            .map_err(|e| Error::HostConstructionFailed { stage: "identity", source: Box::new(e) })?;
        let upgrader = TlsServerUpgrader::new(&identity)
            .map_err(|e| Error::HostConstructionFailed { stage: "security", source: Box::new(e) })?;
        let listener = TcpListener::bind(addr).await?;
        let id = identity.id();
        let router = router.with_identify(id, config.user_agent.clone());
        info!("server {} listening on {}", id, listener.local_addr()?);
        Ok(Server { id, listener, upgrader, config: config.clone(), router: Arc::new(router) })
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// What a caller needs to reach this server.
    pub fn addr_info(&self) -> io::Result<AddrInfo> {
        Ok(AddrInfo::new(self.id, vec![tcp_multiaddr(&self.local_addr()?)]))
    }

    pub async fn listen(self) -> Result<()> {
        loop {
            let (tcp_stream, remote) = self.listener.accept().await?;
            let upgrader = self.upgrader.clone();
            let router = self.router.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                if let Err(err) = serve_connection(upgrader, tcp_stream, remote, router, config).await {
                    debug!("connection from {} ended: {}", remote, err);
                }
            });
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            let res = self.listen().await;
            if let Err(err) = &res {
                error!("server stopped: {}", err);
            }
            res
        })
    }
}

async fn serve_connection(
    upgrader: Arc<dyn Upgrader>,
    tcp_stream: TcpStream,
    remote: SocketAddr,
    router: Arc<Router>,
    config: HostConfig,
) -> io::Result<()> {
    tcp_stream.set_nodelay(true)?;
    let stream = timeout(config.transport_timeout(), upgrader.upgrade(tcp_stream))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "tls handshake timed out"))??;
    let peer = RemotePeer { id: stream.get_id()?, addr: remote };
    debug!("accepted {} from {}", peer.id, remote);

    let mut session = Session::new_server(stream, config.mux_config());
    while let Some(inbound) = session.next().await {
        match inbound {
            Ok(stream) => {
                tokio::spawn(serve_stream(stream, peer, router.clone(), config.dial_timeout()));
            }
            Err(err) => return Err(err),
        }
    }
    debug!("connection from {} closed", peer.id);
    Ok(())
}

async fn serve_stream(
    mut stream: StreamHandle,
    peer: RemotePeer,
    router: Arc<Router>,
    negotiation_timeout: Duration,
) {
    let protocol = match timeout(negotiation_timeout, wire::read_proposal(&mut stream)).await {
        Ok(Ok(protocol)) => protocol,
        Ok(Err(err)) => {
            debug!("negotiation with {} failed: {}", peer.id, err);
            return;
        }
        Err(_) => {
            debug!("negotiation with {} timed out", peer.id);
            return;
        }
    };

    let handler = router.handler(&protocol);
    if let Err(err) = wire::answer_proposal(&mut stream, &protocol, handler.is_some()).await {
        debug!("answering {} proposal from {} failed: {}", protocol, peer.id, err);
        return;
    }
    match handler {
        Some(handler) => {
            if let Err(err) = handler(peer, stream).await {
                debug!("{} stream from {} failed: {}", protocol, peer.id, err);
            }
        }
        None => debug!("{} asked for unsupported protocol {}", peer.id, protocol),
    }
}
