use std::io;
use std::{net::SocketAddr, pin::Pin};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use crate::PeerId;

/// A unified type for both ends of an authenticated TLS connection.
/// As it implements Tokio's `AsyncWrite` and `AsyncRead` traits, it is usable in the
/// multiplexer regardless of which side opened the connection.
#[derive(Debug)]
pub enum ConnectionStream {
    TlsServer(tokio_rustls::server::TlsStream<TcpStream>),
    TlsClient(tokio_rustls::client::TlsStream<TcpStream>),
}

impl ConnectionStream {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Self::TlsServer(s) => s.get_ref().0.local_addr(),
            Self::TlsClient(s) => s.get_ref().0.local_addr(),
        }
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Self::TlsServer(s) => s.get_ref().0.peer_addr(),
            Self::TlsClient(s) => s.get_ref().0.peer_addr(),
        }
    }

    /// The `PeerId` of the remote end: the hash of the certificate it presented
    pub fn get_id(&self) -> io::Result<PeerId> {
        match self {
            Self::TlsServer(s) => id_from_first_cert(s.get_ref().1.peer_certificates()),
            Self::TlsClient(s) => id_from_first_cert(s.get_ref().1.peer_certificates()),
        }
    }
}

/// Generate the peer ID from the first (and only) certificate
fn id_from_first_cert(certs: Option<&[rustls::Certificate]>) -> io::Result<PeerId> {
    match certs {
        Some(certs) if !certs.is_empty() => Ok(PeerId::from_certificate(&certs[0].0)),
        _ => Err(io::Error::new(io::ErrorKind::Other, "no certificates present in TLS state")),
    }
}

// Inspired by:
// https://github.com/tokio-rs/tls/blob/794659740dcc399f79058c4eba325ffd97474c7b/tokio-rustls/src/lib.rs#L245
//
impl AsyncWrite for ConnectionStream {
    #[inline]
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            ConnectionStream::TlsClient(x) => Pin::new(x).poll_write(cx, buf),
            ConnectionStream::TlsServer(x) => Pin::new(x).poll_write(cx, buf),
        }
    }

    #[inline]
    fn poll_flush(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            ConnectionStream::TlsClient(x) => Pin::new(x).poll_flush(cx),
            ConnectionStream::TlsServer(x) => Pin::new(x).poll_flush(cx),
        }
    }

    #[inline]
    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            ConnectionStream::TlsClient(x) => Pin::new(x).poll_shutdown(cx),
            ConnectionStream::TlsServer(x) => Pin::new(x).poll_shutdown(cx),
        }
    }
}

impl AsyncRead for ConnectionStream {
    #[inline]
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            ConnectionStream::TlsClient(x) => Pin::new(x).poll_read(cx, buf),
            ConnectionStream::TlsServer(x) => Pin::new(x).poll_read(cx, buf),
        }
    }
}
