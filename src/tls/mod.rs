//! TLS and certificate-related code, to be used in a peer-to-peer context
//!
//! Every host and server generates a fresh self-signed certificate when it is constructed and
//! is identified on the network by the hash of that certificate. Both sides, acting as the
//! client and the server, have to present their certificates in order to establish a
//! connection, and there is no plain TCP fallback.

pub mod certificate;
pub mod connection_stream;
pub mod tls;
pub mod upgrader;
