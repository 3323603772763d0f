//! Peer addressing records assembled from untrusted input.
//!
//! A peer is described by its `PeerId` plus an ordered list of multiaddrs. Both arrive from
//! the outside world (command lines, JSON documents, other peers), so assembly validates every
//! piece and reports every failure at once rather than stopping at the first one.

use crate::{Error, PeerId, Result};

use multiaddr::{Multiaddr, Protocol};

use std::convert::TryFrom;
use std::fmt;
use std::io;
use std::net::SocketAddr;

/// An address as it was received: human-readable multiaddr text or packed wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedAddr {
    Text(String),
    Binary(Vec<u8>),
}

impl EncodedAddr {
    fn decode(&self) -> std::result::Result<Multiaddr, multiaddr::Error> {
        let decoded = match self {
            EncodedAddr::Text(s) => s.parse::<Multiaddr>()?,
            EncodedAddr::Binary(bytes) => Multiaddr::try_from(bytes.clone())?,
        };
        // both forms happily decode to the empty address
        if decoded.is_empty() {
            return Err(multiaddr::Error::InvalidMultiaddr);
        }
        Ok(decoded)
    }
}

impl fmt::Display for EncodedAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EncodedAddr::Text(s) => write!(f, "{}", s),
            EncodedAddr::Binary(bytes) => write!(f, "{}", hex::encode(bytes)),
        }
    }
}

impl From<&str> for EncodedAddr {
    fn from(s: &str) -> Self {
        EncodedAddr::Text(s.to_owned())
    }
}

impl From<String> for EncodedAddr {
    fn from(s: String) -> Self {
        EncodedAddr::Text(s)
    }
}

impl From<&[u8]> for EncodedAddr {
    fn from(bytes: &[u8]) -> Self {
        EncodedAddr::Binary(bytes.to_vec())
    }
}

impl From<Vec<u8>> for EncodedAddr {
    fn from(bytes: Vec<u8>) -> Self {
        EncodedAddr::Binary(bytes)
    }
}

impl From<&Multiaddr> for EncodedAddr {
    fn from(addr: &Multiaddr) -> Self {
        EncodedAddr::Binary(addr.to_vec())
    }
}

/// A validated peer addressing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrInfo {
    #[serde(rename = "peerid")]
    pub peer_id: PeerId,
    #[serde(rename = "multiaddrs")]
    pub addrs: Vec<Multiaddr>,
}

impl AddrInfo {
    pub fn new(peer_id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        AddrInfo { peer_id, addrs }
    }
}

impl fmt::Display for AddrInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let addrs: Vec<String> = self.addrs.iter().map(|a| a.to_string()).collect();
        write!(f, "{{{}: [{}]}}", self.peer_id, addrs.join(" "))
    }
}

/// Validates a peer id and a list of encoded addresses into an `AddrInfo`.
///
/// Every address is decoded even after a failure so that the returned
/// `Error::AddressAssemblyFailed` lists each problem with its position. No partial
/// record is ever returned. Pure parsing, no I/O.
pub fn assemble_addr_info<I, A>(peer_id: Option<&str>, addrs: I) -> Result<AddrInfo>
where
    I: IntoIterator<Item = A>,
    A: Into<EncodedAddr>,
{
    let mut errs = vec![];

    let decoded_id = match peer_id {
        None | Some("") => {
            errs.push(Error::InvalidPeerId { input: peer_id.map(str::to_owned) });
            None
        }
        Some(s) => match s.parse::<PeerId>() {
            Ok(id) => Some(id),
            Err(_) => {
                errs.push(Error::InvalidPeerId { input: Some(s.to_owned()) });
                None
            }
        },
    };

    let mut decoded_addrs = vec![];
    for (index, encoded) in addrs.into_iter().map(Into::into).enumerate() {
        match encoded.decode() {
            Ok(addr) => decoded_addrs.push(addr),
            Err(source) => errs.push(Error::InvalidAddress { index, input: encoded, source }),
        }
    }

    match decoded_id {
        Some(peer_id) if errs.is_empty() => Ok(AddrInfo { peer_id, addrs: decoded_addrs }),
        _ => Err(Error::AddressAssemblyFailed(errs)),
    }
}

/// Resolves a multiaddr to the TCP socket addresses it designates.
///
/// Only `ip4`, `ip6` and `dns*` hosts followed by `tcp` are dialable; a trailing `p2p`
/// component is ignored.
pub async fn resolve_tcp(addr: &Multiaddr) -> io::Result<Vec<SocketAddr>> {
    let undialable =
        || io::Error::new(io::ErrorKind::InvalidInput, format!("undialable address {}", addr));

    let mut parts = addr.iter();
    let host = parts.next();
    let port = match parts.next() {
        Some(Protocol::Tcp(port)) => port,
        _ => return Err(undialable()),
    };
    for rest in parts {
        match rest {
            Protocol::P2p(_) => (),
            _ => return Err(undialable()),
        }
    }

    match host {
        Some(Protocol::Ip4(ip)) => Ok(vec![SocketAddr::new(ip.into(), port)]),
        Some(Protocol::Ip6(ip)) => Ok(vec![SocketAddr::new(ip.into(), port)]),
        Some(Protocol::Dns(name)) => {
            Ok(tokio::net::lookup_host((&*name, port)).await?.collect())
        }
        Some(Protocol::Dns4(name)) => Ok(tokio::net::lookup_host((&*name, port))
            .await?
            .filter(SocketAddr::is_ipv4)
            .collect()),
        Some(Protocol::Dns6(name)) => Ok(tokio::net::lookup_host((&*name, port))
            .await?
            .filter(SocketAddr::is_ipv6)
            .collect()),
        _ => Err(undialable()),
    }
}

/// The `/ip*/<ip>/tcp/<port>` multiaddr of a socket address.
pub fn tcp_multiaddr(addr: &SocketAddr) -> Multiaddr {
    let host = match addr {
        SocketAddr::V4(v4) => Protocol::Ip4(*v4.ip()),
        SocketAddr::V6(v6) => Protocol::Ip6(*v6.ip()),
    };
    Multiaddr::empty().with(host).with(Protocol::Tcp(addr.port()))
}
