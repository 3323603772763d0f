use crate::PeerId;

use multiaddr::Multiaddr;

use std::fmt;

/// Name of a stream protocol, agreed out-of-band with the remote peer (e.g `/peer-rpc/echo/1.0.0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolId(String);

impl ProtocolId {
    pub fn new(name: impl Into<String>) -> Self {
        ProtocolId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProtocolId {
    fn from(name: &str) -> Self {
        ProtocolId::new(name)
    }
}

impl From<String> for ProtocolId {
    fn from(name: String) -> Self {
        ProtocolId(name)
    }
}

pub const ECHO_PROTOCOL: &str = "/peer-rpc/echo/1.0.0";
pub const IDENTIFY_PROTOCOL: &str = "/peer-rpc/identify/1.0.0";

/// Asks the remote to send `message` back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoRequest {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub message: String,
    /// The identity the responder observed for the caller.
    pub caller: PeerId,
}

/// Reply to an identify call, which carries no request value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    pub peer_id: PeerId,
    pub agent_version: String,
    pub protocols: Vec<String>,
    /// The address the responder sees the caller connecting from.
    pub observed_addr: Multiaddr,
}
