#[macro_use]
extern crate serde_derive;

pub mod addr_info;
pub mod context;
pub mod host;
pub mod peer_id;
pub mod protocol;
pub mod rpc;
pub mod server;
pub mod tls;
pub mod wire;

pub use addr_info::{assemble_addr_info, AddrInfo, EncodedAddr};
pub use context::CallContext;
pub use host::{new_tcp_host, ConnManager, Host, HostConfig, PeerStore, RpcStream, TcpHost};
pub use peer_id::PeerId;
pub use protocol::ProtocolId;
pub use rpc::{connect_and_protect, exec_rpc, Protection, RpcTook, DEFAULT_RPC_TIMEOUT};
pub use server::{Router, Server};

use std::fmt;

#[derive(Debug)]
pub enum Error {
    IO(std::io::Error),

    /// Error caused by converting from a `String` to a `PeerId`
    TryFromStringError,

    // addressing errors
    /// `None` or an empty input means no peer id was supplied at all.
    InvalidPeerId {
        input: Option<String>,
    },
    InvalidAddress {
        index: usize,
        input: EncodedAddr,
        source: multiaddr::Error,
    },
    /// Every validation failure found while assembling an `AddrInfo`, in input order.
    AddressAssemblyFailed(Vec<Error>),

    // host errors
    HostConstructionFailed {
        stage: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    Config(config::ConfigError),

    // rpc errors
    ConnectFailed {
        peer: PeerId,
        source: std::io::Error,
    },
    StreamOpenFailed {
        protocol: ProtocolId,
        source: std::io::Error,
    },
    StreamWriteFailed {
        protocol: ProtocolId,
        source: std::io::Error,
    },
    StreamReadFailed {
        protocol: ProtocolId,
        source: std::io::Error,
    },
}

impl Error {
    /// The individual failures behind an aggregate error, or the error itself.
    pub fn errors(&self) -> Vec<&Error> {
        match self {
            Error::AddressAssemblyFailed(errs) => errs.iter().collect(),
            err => vec![err],
        }
    }

    /// The underlying I/O error of a connect or stream phase failure.
    pub fn io_cause(&self) -> Option<&std::io::Error> {
        match self {
            Error::IO(err) => Some(err),
            Error::ConnectFailed { source, .. }
            | Error::StreamOpenFailed { source, .. }
            | Error::StreamWriteFailed { source, .. }
            | Error::StreamReadFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IO(err) => Some(err),
            Error::InvalidAddress { source, .. } => Some(source),
            Error::HostConstructionFailed { source, .. } => Some(source.as_ref()),
            Error::Config(err) => Some(err),
            Error::ConnectFailed { source, .. }
            | Error::StreamOpenFailed { source, .. }
            | Error::StreamWriteFailed { source, .. }
            | Error::StreamReadFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IO(error)
    }
}

impl std::convert::From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Error::Config(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IO(err) => write!(f, "{}", err),
            Error::TryFromStringError => write!(f, "not a valid base58check peer id"),
            Error::InvalidPeerId { input: None } => write!(f, "no peer id supplied"),
            Error::InvalidPeerId { input: Some(s) } if s.is_empty() => {
                write!(f, "no peer id supplied")
            }
            Error::InvalidPeerId { input: Some(s) } => write!(f, "peer id '{}' is not valid", s),
            Error::InvalidAddress { index, input, source } => {
                write!(f, "multiaddress entry '{}' (#{}) is not valid: {}", input, index, source)
            }
            Error::AddressAssemblyFailed(errs) => {
                let lines: Vec<String> = errs.iter().map(|e| e.to_string()).collect();
                write!(f, "{}", lines.join("\n"))
            }
            Error::HostConstructionFailed { stage, source } => {
                write!(f, "failed to construct host ({}): {}", stage, source)
            }
            Error::Config(err) => write!(f, "invalid configuration: {}", err),
            Error::ConnectFailed { peer, source } => {
                write!(f, "error ensuring connection to {}: {}", peer, source)
            }
            Error::StreamOpenFailed { protocol, source } => {
                write!(f, "error while opening {} stream: {}", protocol, source)
            }
            Error::StreamWriteFailed { protocol, source } => {
                write!(f, "error while writing to {} stream: {}", protocol, source)
            }
            Error::StreamReadFailed { protocol, source } => {
                write!(f, "error while reading {} response: {}", protocol, source)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
