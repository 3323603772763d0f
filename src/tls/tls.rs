//! This module contains the code for configuring `tokio_rustls` for a peer-to-peer setting
//! Client side authenication is enforced, but the server doesn't need a certificate chain,
//! as both use single self-signed certificates. Whether the certificate belongs to the peer
//! that was meant to be reached is decided afterwards by comparing its hash with the expected
//! `PeerId`.

use lazy_static::lazy_static;
use std::convert::TryFrom;
use std::{sync::Arc, time::SystemTime};
use tokio_rustls::rustls::{
    self, client::ServerCertVerifier, server::ClientCertVerifier, Certificate, ClientConfig,
    ServerConfig, ServerName,
};

lazy_static! {
    pub static ref DUMMY_DOMAIN: ServerName = ServerName::try_from("example.org").unwrap();
}

/// Client verification: enforce the presence of a single certificate
struct PeerClientCertVerifier;

impl ClientCertVerifier for PeerClientCertVerifier {
    fn verify_client_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _now: SystemTime,
    ) -> Result<rustls::server::ClientCertVerified, rustls::Error> {
        Ok(rustls::server::ClientCertVerified::assertion())
    }

    fn client_auth_root_subjects(&self) -> Option<rustls::DistinguishedNames> {
        Some(vec![])
    }

    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> Option<bool> {
        Some(true)
    }
}

/// Server verification: don't check certificate chain and domain name, just the presence of a certificate
struct PeerServerCertVerifier;

impl ServerCertVerifier for PeerServerCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

/// Build a client-side configuration from the certificate and private key, usable in a peer-to-peer network
pub fn client_tls_config(
    raw_certificate: &[u8],
    raw_private_key: &[u8],
) -> Result<ClientConfig, rustls::Error> {
    let cert_vec = vec![rustls::Certificate(Vec::from(raw_certificate))];
    let pk = rustls::PrivateKey(Vec::from(raw_private_key));
    let verifier = Arc::new(PeerServerCertVerifier);
    let mut config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_single_cert(cert_vec, pk)?;
    // `dangerous` here only means that we're using our own certificate verification
    config.dangerous().set_certificate_verifier(verifier);
    Ok(config)
}

/// Build a server-side configuration from the certificate and private key, usable in a peer-to-peer network
pub fn server_tls_config(
    raw_certificate: &[u8],
    raw_private_key: &[u8],
) -> Result<ServerConfig, rustls::Error> {
    let cert_vec = vec![rustls::Certificate(Vec::from(raw_certificate))];
    let pk = rustls::PrivateKey(Vec::from(raw_private_key));
    let verifier = Arc::new(PeerClientCertVerifier);
    ServerConfig::builder()
        .with_safe_defaults()
        .with_client_cert_verifier(verifier)
        .with_single_cert(cert_vec, pk)
}
