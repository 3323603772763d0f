use std::convert::TryInto;
use std::fmt;
use std::str::FromStr;

use base58check::{FromBase58Check, ToBase58Check};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use rand::{self, Rng};

type Blake2b256 = Blake2b<U32>;

/// Self-certifying peer identity: the hash of the certificate a peer presents during the
/// TLS handshake.
#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Serialize, Deserialize)]
pub struct PeerId(pub [u8; 32]);

impl std::fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_base58check(0))
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_base58check(0))
    }
}

impl FromStr for PeerId {
    type Err = crate::Error;

    /// Converts a base58check encoded string to bytes of a `PeerId`
    fn from_str(id_str: &str) -> Result<Self, crate::Error> {
        let (vsn, bytes) =
            id_str.from_base58check().map_err(|_| crate::Error::TryFromStringError)?;
        if vsn != 0 {
            return Err(crate::Error::TryFromStringError);
        }
        let bytes: [u8; 32] =
            bytes.as_slice().try_into().map_err(|_| crate::Error::TryFromStringError)?;
        Ok(PeerId(bytes))
    }
}

impl PeerId {
    /// Derives the identity of a peer from the DER certificate it presents.
    pub fn from_certificate(der: &[u8]) -> PeerId {
        PeerId(hash(der))
    }

    /// A random identity which no reachable peer holds.
    pub fn generate() -> PeerId {
        let mut rng = rand::thread_rng();
        let v: [u8; 32] = rng.gen();
        PeerId(v)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

pub fn hash(input: &[u8]) -> [u8; 32] {
    let digest = Blake2b256::digest(input);
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&digest);
    buf
}
