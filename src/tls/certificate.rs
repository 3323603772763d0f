use crate::PeerId;

use derive_more::{Display, Error, From};
use rcgen::RcgenError;
use rcgen::{Certificate, CertificateParams, KeyIdMethod, KeyPair, PKCS_ED25519};

/// A freshly generated certificate and key, never written anywhere.
#[derive(Clone)]
pub struct Identity {
    id: PeerId,
    certificate: Vec<u8>,
    private_key: Vec<u8>,
}

impl Identity {
    /// Generates a new identity. Every call yields a different `PeerId`.
    pub fn generate() -> Result<Identity> {
        let (certificate, private_key) = generate_node_cert()?;
        let id = PeerId::from_certificate(&certificate);
        Ok(Identity { id, certificate, private_key })
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Identity({})", self.id)
    }
}

/// Generate a valid, self signed X.509 certificate on a new Ed25519 key pair
///
/// Returns the DER encoded certificate and PKCS#8 private key.
pub fn generate_node_cert() -> Result<(Vec<u8>, Vec<u8>)> {
    let alg = &PKCS_ED25519;
    let key_pair = KeyPair::generate(alg)?;
    let san = "peer-rpc".to_owned();
    let mut params = CertificateParams::new(vec![san]);
    params.alg = alg;
    params.key_pair = Some(key_pair);
    params.key_identifier_method = KeyIdMethod::Sha256;

    let cert = Certificate::from_params(params)?;
    let private_key = cert.serialize_private_key_der();
    let cert = cert.serialize_der()?;
    Ok((cert, private_key))
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Display, From)]
pub enum Error {
    CertificateGenError(RcgenError),
}
