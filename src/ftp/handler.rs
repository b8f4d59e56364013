//! The application handler interfaces consumed by the FTP dispatcher.
//! Everything here is a boundary the core calls through; no implementation
//! lives in this crate — the file system, quota persistence and
//! authentication realm are all external collaborators.

use crate::ftp::metadata::FtpConnectionMetadata;
use crate::ftp::session::{AuthResult, OpResult, Operation};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// A single entry in a directory listing, formatted by
/// [`crate::ftp::data::format_listing_line`].
#[derive(Debug, Clone)]
pub struct FtpFileInfo {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    pub modified: std::time::SystemTime,
    /// Unix-style `rwxr-xr-x`-shaped permission string, owner-first.
    pub permissions: String,
    pub owner: String,
    pub group: String,
}

pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// The per-authenticated-user file system, handed out by
/// `FtpHandler::get_file_system`. Opaque value types throughout.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn open_read(&self, path: &str, offset: u64) -> std::io::Result<BoxedReader>;
    async fn open_write(&self, path: &str, append: bool) -> std::io::Result<BoxedWriter>;
    /// Generates a server-chosen unique name for `STOU`, per Design Note
    /// "Open question — STOU path": the name is produced up front, then
    /// uploaded through the ordinary `StoreUnique` transfer kind.
    async fn generate_unique_name(&self, directory: &str) -> std::io::Result<String>;
    async fn list(&self, path: &str) -> std::io::Result<Vec<FtpFileInfo>>;
    async fn cwd(&self, path: &str) -> OpResult;
    async fn pwd(&self) -> String;
    async fn mkd(&self, path: &str) -> OpResult;
    async fn rmd(&self, path: &str) -> OpResult;
    async fn dele(&self, path: &str) -> OpResult;
    async fn rename(&self, from: &str, to: &str) -> OpResult;
}

/// Usage snapshot returned by a [`QuotaManager`], rendered by `SITE QUOTA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaSource {
    User,
    Role,
    Default,
    None,
}

#[derive(Debug, Clone)]
pub struct QuotaUsage {
    pub used: u64,
    /// `None` means unlimited.
    pub limit: Option<u64>,
    pub source: QuotaSource,
}

#[async_trait]
pub trait QuotaManager: Send + Sync {
    async fn can_store(&self, user: &str, additional: u64) -> bool;
    async fn usage(&self, user: &str) -> QuotaUsage;
    async fn set_user_quota(&self, user: &str, limit: Option<u64>) -> Result<(), String>;
}

/// The application callback interface driving every FTP session decision.
/// Default methods are permissive no-ops except `is_authorized`, which
/// defaults to allowing everything.
#[async_trait]
pub trait FtpHandler: Send + Sync {
    async fn connected(&self, metadata: &FtpConnectionMetadata) -> Option<String> {
        let _ = metadata;
        None
    }

    async fn authenticate(
        &self,
        user: &str,
        password: Option<&str>,
        account: Option<&str>,
        metadata: &FtpConnectionMetadata,
    ) -> AuthResult;

    async fn get_file_system(&self, metadata: &FtpConnectionMetadata) -> Arc<dyn FileSystem>;

    async fn transfer_starting(&self, path: &str, is_upload: bool, restart_offset: i64, metadata: &FtpConnectionMetadata) {
        let _ = (path, is_upload, restart_offset, metadata);
    }

    async fn transfer_progress(&self, path: &str, is_upload: bool, total: u64, metadata: &FtpConnectionMetadata) {
        let _ = (path, is_upload, total, metadata);
    }

    async fn transfer_completed(&self, path: &str, is_upload: bool, bytes: u64, success: bool, metadata: &FtpConnectionMetadata) {
        let _ = (path, is_upload, bytes, success, metadata);
    }

    async fn handle_site_command(&self, cmd: &str, metadata: &FtpConnectionMetadata) -> OpResult {
        let _ = (cmd, metadata);
        OpResult::NotSupported
    }

    async fn disconnected(&self, metadata: &FtpConnectionMetadata) {
        let _ = metadata;
    }

    /// Defaults to permissive per the source's default-interface-method
    /// pattern (Design Note "Deep handler inheritance"), made an explicit
    /// zero value here rather than a trait-object vtable default.
    async fn is_authorized(&self, op: Operation, path: &str, metadata: &FtpConnectionMetadata) -> bool {
        let _ = (op, path, metadata);
        true
    }

    fn quota_manager(&self) -> Option<Arc<dyn QuotaManager>> {
        None
    }

    /// `true` if the caller is entitled to `ADMIN`-class operations such as
    /// `SITE SETQUOTA` and `SITE QUOTA <other-user>`.
    async fn is_admin(&self, metadata: &FtpConnectionMetadata) -> bool {
        let _ = metadata;
        false
    }
}
