//! The answering side of the RPC path: accepts connections and serves protocols on them.

mod router;
mod server;

pub use router::*;
pub use server::*;
