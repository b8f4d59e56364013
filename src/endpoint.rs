//! [`Transport`]: the opaque bidirectional byte transport consumed by both
//! session cores. Exclusively owned by one session; released on session
//! teardown. Wraps either a plain TCP stream or one
//! upgraded in place to TLS, the way the control channel swaps streams on
//! `AUTH TLS` / `STARTTLS` (see `libunftp`'s `control_loop::spawn`, which
//! tears down the codec around the raw stream and rewraps it post-handshake).

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

/// A snapshot of the secure channel, once established. Cheap to clone and
/// handed to the application handler via `FTPConnectionMetadata` / session
/// state; never mutated after capture.
#[derive(Debug, Clone, Default)]
pub struct TlsSnapshot {
    pub cipher_suite: Option<String>,
    pub protocol_version: Option<String>,
    pub peer_certificates: Vec<Vec<u8>>,
}

/// A TCP stream, possibly upgraded to TLS in place.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    pub fn is_secure(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Transport::Plain(s) => s.local_addr(),
            Transport::Tls(s) => s.get_ref().0.local_addr(),
        }
    }

    pub fn remote_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Transport::Plain(s) => s.peer_addr(),
            Transport::Tls(s) => s.get_ref().0.peer_addr(),
        }
    }

    pub fn tls_snapshot(&self) -> TlsSnapshot {
        match self {
            Transport::Plain(_) => TlsSnapshot::default(),
            Transport::Tls(s) => {
                let (_, conn) = s.get_ref();
                let peer_certificates = conn
                    .peer_certificates()
                    .map(|certs| certs.iter().map(|c| c.as_ref().to_vec()).collect())
                    .unwrap_or_default();
                TlsSnapshot {
                    cipher_suite: conn.negotiated_cipher_suite().map(|cs| format!("{:?}", cs.suite())),
                    protocol_version: conn.protocol_version().map(|v| format!("{v:?}")),
                    peer_certificates,
                }
            }
        }
    }

    /// Upgrade a plain transport to TLS, consuming it. The caller is
    /// responsible for having already replied to the client (e.g. FTP's
    /// `234`, IMAP's continuation) before handshaking, since once this call
    /// starts the plaintext socket is no longer readable as plaintext.
    pub async fn upgrade_server(self, acceptor: &tokio_rustls::TlsAcceptor) -> io::Result<Transport> {
        match self {
            Transport::Plain(tcp) => {
                let tls = acceptor.accept(tcp).await?;
                Ok(Transport::Tls(Box::new(tls)))
            }
            already @ Transport::Tls(_) => Ok(already),
        }
    }
}

impl AsyncRead for Transport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Transport::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Transport::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_flush(cx),
            Transport::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Transport::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
