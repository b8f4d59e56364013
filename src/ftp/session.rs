//! Per-control-connection FTP session state.

use std::collections::HashMap;

/// `TYPE` representation. `EBCDIC` is accepted for parsing (so `TYPE E`
/// doesn't fall through to "unrecognized command") but streaming treats it
/// identically to `LOCAL`/`BINARY`; EBCDIC conversion itself is a Non-goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferType {
    #[default]
    Ascii,
    Binary,
    Ebcdic,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    #[default]
    Stream,
    Block,
    Compressed,
}

/// RFC 2228 `PROT` level. Only `C`/`P` are implemented; `S`/`E` are parsed
/// and rejected with 536.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtLevel {
    Clear,
    Private,
    Safe,
    Confidential,
}

/// Outcome of `authenticate(user, pass, acct)`, mapped to a reply code by
/// the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    Success,
    NeedPassword,
    NeedAccount,
    InvalidUser,
    InvalidPassword,
    InvalidAccount,
    AccountDisabled,
    TooManyAttempts,
    UserLimitExceeded,
    AnonymousNotAllowed,
}

/// Outcome of a file/navigation operation, mapped to a reply code by the
/// dispatcher's fixed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpResult {
    Success,
    TransferStarting,
    NotFound,
    AccessDenied,
    AlreadyExists,
    DirectoryNotEmpty,
    FileSystemError,
    FileLocked,
    IsDirectory,
    IsFile,
    InsufficientSpace,
    QuotaExceeded,
    InvalidName,
    NotSupported,
    RenamePending,
}

/// The authorization taxonomy consulted by `is_authorized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Delete,
    CreateDir,
    DeleteDir,
    Rename,
    Navigate,
    SiteCommand,
    Admin,
}

/// Per-connection FTP session state. Owned exclusively by the control
/// connection's dispatch task; the data coordinator is driven by direct
/// calls rather than holding a reference back to this struct.
#[derive(Debug, Clone)]
pub struct FtpSession {
    pub user: Option<String>,
    pub password: Option<String>,
    pub account: Option<String>,
    pub current_directory: String,
    pub authenticated: bool,
    /// Set only between a successful RNFR and the next RNTO attempt
    /// (success or failure), per invariant I3.
    pub rename_from: Option<String>,
    /// Consumed by the next RETR and reset to 0 afterward (I4).
    pub restart_offset: u64,
    pub transfer_type: TransferType,
    pub transfer_mode: TransferMode,
    /// Latched by `EPSV ALL`; once set, PORT/PASV/EPRT reply 522 (I5).
    pub epsv_all_mode: bool,
    pub pbsz_set: bool,
    pub data_protection: bool,
    /// AUTH is single-shot per session (I2).
    pub auth_used: bool,
    pub metadata: HashMap<String, String>,
}

impl Default for FtpSession {
    fn default() -> Self {
        FtpSession {
            user: None,
            password: None,
            account: None,
            current_directory: "/".to_string(),
            authenticated: false,
            rename_from: None,
            restart_offset: 0,
            transfer_type: TransferType::default(),
            transfer_mode: TransferMode::default(),
            epsv_all_mode: false,
            pbsz_set: false,
            data_protection: false,
            auth_used: false,
            metadata: HashMap::new(),
        }
    }
}

impl FtpSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// The commands reachable without authentication.
    pub fn allowed_before_auth(command: &str) -> bool {
        matches!(
            command,
            "USER" | "PASS" | "ACCT" | "QUIT" | "NOOP" | "HELP" | "FEAT" | "AUTH" | "PBSZ" | "PROT" | "CCC"
        )
    }

    /// `REST` sets the pending restart offset; consumed by the very next
    /// `RETR`/`STOR`/`APPE` and reset afterward by the caller.
    pub fn take_restart_offset(&mut self) -> u64 {
        let offset = self.restart_offset;
        self.restart_offset = 0;
        offset
    }
}
