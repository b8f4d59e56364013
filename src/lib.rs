//! Session cores for two line-oriented Internet protocols: FTP (RFC 959,
//! with RFC 2428 extended addressing, RFC 4217 explicit TLS, and RFC 2389
//! `FEAT`) and IMAP4rev2 (RFC 9051, with `IDLE`, `NAMESPACE`, `MOVE` and
//! quota extensions).
//!
//! Both cores are transport- and storage-agnostic: they drive a state
//! machine over an [`endpoint::Transport`] and delegate every
//! filesystem/mailbox decision to an application-supplied handler trait
//! (`ftp::handler::FtpHandler`, the staged `imap::handler` traits). Nothing
//! in this crate opens a file or touches a disk.

pub mod endpoint;
mod error;
pub mod ftp;
pub mod imap;
mod line_codec;
mod messages;
pub mod telemetry;

pub use endpoint::{TlsSnapshot, Transport};
pub use error::{CoreError, ErrorCategory, Result};
pub use line_codec::LineCodec;
pub use messages::MessageCatalog;
