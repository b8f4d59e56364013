//! Ambient FTP server configuration, not part of the wire protocol itself —
//! a plain, serde-optional `ServerConfig` struct.

use std::net::SocketAddr;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct FtpServerConfig {
    pub bind_addr: SocketAddr,
    /// RFC 959's 1024-byte command line plus the CRLF terminator.
    pub max_line_length: usize,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub passive_ports: Range<u16>,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub idle_timeout: Duration,
}

impl Default for FtpServerConfig {
    fn default() -> Self {
        FtpServerConfig {
            bind_addr: "0.0.0.0:2121".parse().unwrap(),
            max_line_length: 1024 + 2,
            passive_ports: 50000..50100,
            tls_cert_path: None,
            tls_key_path: None,
            idle_timeout: Duration::from_secs(5 * 60),
        }
    }
}
