//! `FTPConnectionMetadata`: the observable snapshot handed to the
//! application handler. Mutated only by the session; read by the handler.

use crate::endpoint::TlsSnapshot;
use crate::ftp::session::{TransferMode, TransferType};
use std::net::SocketAddr;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct FtpConnectionMetadata {
    pub client_addr: SocketAddr,
    pub server_addr: SocketAddr,
    pub secure: bool,
    pub tls: TlsSnapshot,
    pub start_time: Instant,
    pub user: Option<String>,
    pub current_directory: String,
    pub transfer_mode: TransferMode,
    pub transfer_type: TransferType,
    /// Populated by `handleSiteCommand` for the caller to relay to the client.
    pub site_response: Option<String>,
}

impl FtpConnectionMetadata {
    pub fn new(client_addr: SocketAddr, server_addr: SocketAddr) -> Self {
        FtpConnectionMetadata {
            client_addr,
            server_addr,
            secure: false,
            tls: TlsSnapshot::default(),
            start_time: Instant::now(),
            user: None,
            current_directory: "/".to_string(),
            transfer_mode: TransferMode::default(),
            transfer_type: TransferType::default(),
            site_response: None,
        }
    }
}
