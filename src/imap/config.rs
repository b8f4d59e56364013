//! Ambient IMAP server configuration, mirroring [`crate::ftp::config::FtpServerConfig`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct ImapServerConfig {
    pub bind_addr: SocketAddr,
    /// IMAP line limit, default 8192 (commands only; a literal's declared
    /// byte count is read separately, not subject to this limit).
    pub max_line_length: usize,
    pub max_literal_size: u32,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub idle_timeout: Duration,
    /// LOGIN is rejected with BAD over cleartext when this is `false`.
    pub allow_plaintext_login: bool,
    pub sasl_mechanisms: Vec<String>,
}

impl Default for ImapServerConfig {
    fn default() -> Self {
        ImapServerConfig {
            bind_addr: "0.0.0.0:1430".parse().unwrap(),
            max_line_length: 8192,
            max_literal_size: 25 * 1024 * 1024,
            tls_cert_path: None,
            tls_key_path: None,
            idle_timeout: Duration::from_secs(30 * 60),
            allow_plaintext_login: false,
            sasl_mechanisms: vec!["PLAIN".to_string()],
        }
    }
}
