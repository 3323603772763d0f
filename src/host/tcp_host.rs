use crate::addr_info::resolve_tcp;
use crate::tls::certificate::Identity;
use crate::tls::connection_stream::ConnectionStream;
use crate::tls::upgrader::{upgrade_outbound, TlsClientUpgrader, Upgrader};
use crate::wire;
use crate::{AddrInfo, Error, PeerId, ProtocolId, Result};

use super::conn_manager::{BasicConnManager, ConnManager};
use super::peerstore::PeerStore;
use super::settings::HostConfig;
use super::stream::MuxedStream;
use super::Host;

use futures::future::{select_ok, BoxFuture, FutureExt};
use futures::StreamExt;
use multiaddr::Multiaddr;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_yamux::{Control, Session};
use tracing::{debug, info, warn};

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type Connections = Arc<Mutex<HashMap<PeerId, LiveConnection>>>;

struct LiveConnection {
    conn_id: u64,
    control: Control,
    remote_addr: SocketAddr,
    opened_at: Instant,
}

/// A dial-only host: it never listens and refuses streams opened by remote peers.
pub struct TcpHost {
    identity: Identity,
    upgrader: Arc<dyn Upgrader>,
    config: HostConfig,
    conn_manager: Arc<BasicConnManager>,
    peerstore: Arc<PeerStore>,
    connections: Connections,
    next_conn_id: AtomicU64,
}

/// Builds a host for short-lived outbound calls, with a fresh identity every time.
///
/// Returns the host together with the peer store it fills while connecting.
pub fn new_tcp_host(config: HostConfig) -> Result<(TcpHost, Arc<PeerStore>)> {
    let peerstore = Arc::new(PeerStore::new());

    let conn_manager = Arc::new(BasicConnManager::new(
        config.conn_mgr_low_water,
        config.conn_mgr_high_water,
        config.grace_period(),
    )?);

    let identity = Identity::generate()
        .map_err(|e| Error::HostConstructionFailed { stage: "identity", source: Box::new(e) })?;
    let upgrader = TlsClientUpgrader::new(&identity)
        .map_err(|e| Error::HostConstructionFailed { stage: "security", source: Box::new(e) })?;

    info!("host {} ready, dial timeout {:?}", identity.id(), config.dial_timeout());

    let host = TcpHost {
        identity,
        upgrader,
        config,
        conn_manager,
        peerstore: peerstore.clone(),
        connections: Arc::new(Mutex::new(HashMap::new())),
        next_conn_id: AtomicU64::new(0),
    };
    Ok((host, peerstore))
}

impl TcpHost {
    pub fn is_connected(&self, peer: &PeerId) -> bool {
        lock(&self.connections).contains_key(peer)
    }

    pub fn connected_peers(&self) -> Vec<(PeerId, SocketAddr)> {
        lock(&self.connections).iter().map(|(peer, conn)| (*peer, conn.remote_addr)).collect()
    }

    /// Closes the connection to `peer`, if any. Must be called within a tokio runtime.
    pub fn disconnect(&self, peer: &PeerId) -> bool {
        let removed = lock(&self.connections).remove(peer);
        match removed {
            Some(conn) => {
                let mut control = conn.control;
                tokio::spawn(async move { control.close().await });
                info!("disconnected from {}", peer);
                true
            }
            None => false,
        }
    }

    /// Without addresses in `info`, the ones learned earlier for the peer are dialed.
    async fn connect_peer(&self, info: &AddrInfo) -> io::Result<()> {
        if self.is_connected(&info.peer_id) {
            return Ok(());
        }
        let addrs = if info.addrs.is_empty() {
            self.peerstore.addrs(&info.peer_id)
        } else {
            self.peerstore.add_addrs(&info.peer_id, &info.addrs);
            info.addrs.clone()
        };

        let (stream, remote) =
            timeout(self.config.dial_timeout(), self.dial_any(&info.peer_id, &addrs))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "dial timed out"))??;
        self.register(info.peer_id, stream, remote);
        Ok(())
    }

    /// Dials every resolved address at once and keeps the first connection that authenticates.
    async fn dial_any(
        &self,
        peer: &PeerId,
        addrs: &[Multiaddr],
    ) -> io::Result<(ConnectionStream, SocketAddr)> {
        let mut last_err = None;
        let mut sockets = vec![];
        for addr in addrs.iter() {
            match resolve_tcp(addr).await {
                Ok(resolved) => sockets.extend(resolved),
                Err(err) => {
                    debug!("skipping {}: {}", addr, err);
                    last_err = Some(err);
                }
            }
        }
        if sockets.is_empty() {
            return Err(last_err.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses to dial")
            }));
        }

        let attempts = sockets.into_iter().map(|socket| {
            async move {
                match self.dial(socket, peer).await {
                    Ok(stream) => Ok((stream, socket)),
                    Err(err) => {
                        debug!("dialing {} at {} failed: {}", peer, socket, err);
                        Err(err)
                    }
                }
            }
            .boxed()
        });
        let (connected, _) = select_ok(attempts).await?;
        Ok(connected)
    }

    async fn dial(&self, socket: SocketAddr, peer: &PeerId) -> io::Result<ConnectionStream> {
        let transport_timeout = self.config.transport_timeout();
        let tcp_stream = timeout(transport_timeout, TcpStream::connect(socket))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "tcp connect timed out"))??;
        tcp_stream.set_nodelay(true)?;
        timeout(transport_timeout, upgrade_outbound(self.upgrader.as_ref(), tcp_stream, peer))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "tls handshake timed out"))?
    }

    fn register(&self, peer: PeerId, stream: ConnectionStream, remote_addr: SocketAddr) {
        let session = Session::new_client(stream, self.config.mux_config());
        let control = session.control();
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut connections = lock(&self.connections);
            if connections.contains_key(&peer) {
                // a concurrent dial won, dropping the session closes ours
                debug!("dropping duplicate connection to {}", peer);
                return;
            }
            let opened_at = Instant::now();
            connections.insert(peer, LiveConnection { conn_id, control, remote_addr, opened_at });
        }
        self.peerstore.record_connection(&peer, remote_addr);
        info!("connected to {} at {}", peer, remote_addr);

        tokio::spawn(drive_session(session, peer, conn_id, self.connections.clone()));
        self.trim();
    }

    fn trim(&self) {
        let victims = {
            let connections = lock(&self.connections);
            let live: Vec<(PeerId, Instant)> =
                connections.iter().map(|(peer, conn)| (*peer, conn.opened_at)).collect();
            self.conn_manager.select_for_trim(&live, Instant::now())
        };
        for peer in victims.iter() {
            self.disconnect(peer);
        }
    }

    async fn open_stream(&self, peer: &PeerId, protocol: &ProtocolId) -> io::Result<MuxedStream> {
        let control = lock(&self.connections).get(peer).map(|conn| conn.control.clone());
        let mut control = control.ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, format!("no connection to {}", peer))
        })?;
        let mut handle = control.open_stream().await.map_err(|e| {
            io::Error::new(io::ErrorKind::BrokenPipe, format!("opening stream failed: {:?}", e))
        })?;
        wire::select_protocol(&mut handle, protocol).await?;
        self.peerstore.record_protocol(peer, protocol);
        debug!("opened {} stream to {}", protocol, peer);
        Ok(MuxedStream::new(handle, protocol.clone()))
    }
}

impl Host for TcpHost {
    type Stream = MuxedStream;

    fn id(&self) -> PeerId {
        self.identity.id()
    }

    fn conn_manager(&self) -> &dyn ConnManager {
        self.conn_manager.as_ref()
    }

    fn connect<'a>(&'a self, peer: &'a AddrInfo) -> BoxFuture<'a, io::Result<()>> {
        self.connect_peer(peer).boxed()
    }

    fn new_stream<'a>(
        &'a self,
        peer: &'a PeerId,
        protocol: &'a ProtocolId,
    ) -> BoxFuture<'a, io::Result<MuxedStream>> {
        self.open_stream(peer, protocol).boxed()
    }
}

/// Polls the session until the connection ends, refusing inbound streams.
async fn drive_session(
    mut session: Session<ConnectionStream>,
    peer: PeerId,
    conn_id: u64,
    connections: Connections,
) {
    while let Some(inbound) = session.next().await {
        match inbound {
            Ok(stream) => {
                warn!("refusing inbound stream from {}", peer);
                drop(stream);
            }
            Err(err) => {
                debug!("connection to {} failed: {}", peer, err);
                break;
            }
        }
    }
    let mut connections = lock(&connections);
    if connections.get(&peer).map_or(false, |conn| conn.conn_id == conn_id) {
        connections.remove(&peer);
    }
    debug!("connection {} to {} closed", conn_id, peer);
}

fn lock(connections: &Connections) -> MutexGuard<'_, HashMap<PeerId, LiveConnection>> {
    connections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
