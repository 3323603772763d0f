use std::future::Future;
use std::io;
use std::{pin::Pin, sync::Arc};

use crate::tls::certificate::Identity;
use crate::tls::tls::{client_tls_config, server_tls_config, DUMMY_DOMAIN};
use crate::PeerId;
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use super::connection_stream::ConnectionStream;

/// Secures a raw TCP connection.
pub trait Upgrader: Sync + Send {
    // === async fn upgrade(..) -> Result<ConnectionStream>;
    fn upgrade(&self, conn: TcpStream) -> UpgradeOutput;
}

pub struct TlsClientUpgrader {
    connector: TlsConnector,
}

pub struct TlsServerUpgrader {
    acceptor: TlsAcceptor,
}

/// Future type that can be safely held across `.await` boundaries
/// and is compatible with Tokio
type SafeFuture<Out> = Pin<Box<dyn Send + Future<Output = Out>>>;

type UpgradeOutput = SafeFuture<Result<ConnectionStream, std::io::Error>>;

impl TlsClientUpgrader {
    pub fn new(identity: &Identity) -> Result<Arc<dyn Upgrader>, rustls::Error> {
        let config = client_tls_config(identity.certificate(), identity.private_key())?;
        let connector = TlsConnector::from(Arc::new(config));
        Ok(Arc::new(TlsClientUpgrader { connector }))
    }
}

impl Upgrader for TlsClientUpgrader {
    fn upgrade(&self, c: TcpStream) -> UpgradeOutput {
        let connector = self.connector.clone();
        let fut = async move {
            match connector.connect(DUMMY_DOMAIN.clone(), c).await {
                Ok(tls_stream) => Ok(ConnectionStream::TlsClient(tls_stream)),
                Err(e) => Err(e),
            }
        };
        Box::pin(fut)
    }
}

impl TlsServerUpgrader {
    pub fn new(identity: &Identity) -> Result<Arc<dyn Upgrader>, rustls::Error> {
        let config = server_tls_config(identity.certificate(), identity.private_key())?;
        let acceptor = TlsAcceptor::from(Arc::new(config));
        Ok(Arc::new(TlsServerUpgrader { acceptor }))
    }
}

impl Upgrader for TlsServerUpgrader {
    fn upgrade(&self, c: TcpStream) -> UpgradeOutput {
        let acc = self.acceptor.clone();
        let fut = async move {
            match acc.accept(c).await {
                Ok(tls_stream) => Ok(ConnectionStream::TlsServer(tls_stream)),
                Err(e) => Err(e),
            }
        };
        Box::pin(fut)
    }
}

/// Secures an outbound connection and checks that the remote is the peer we meant to reach.
pub async fn upgrade_outbound(
    upgrader: &dyn Upgrader,
    conn: TcpStream,
    expected: &PeerId,
) -> io::Result<ConnectionStream> {
    let stream = upgrader.upgrade(conn).await?;
    let presented = stream.get_id()?;
    if presented != *expected {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("unexpected peer connected: expected {}, got {}", expected, presented),
        ));
    }
    Ok(stream)
}
