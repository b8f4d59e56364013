//! Per-connection IMAP metadata exposed to the application handler.

use crate::endpoint::TlsSnapshot;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct ImapConnectionMetadata {
    pub client_addr: SocketAddr,
    pub server_addr: SocketAddr,
    pub secure: bool,
    pub tls: TlsSnapshot,
    pub principal: Option<String>,
}

impl ImapConnectionMetadata {
    pub fn new(client_addr: SocketAddr, server_addr: SocketAddr) -> Self {
        ImapConnectionMetadata {
            client_addr,
            server_addr,
            secure: false,
            tls: TlsSnapshot::default(),
            principal: None,
        }
    }
}
