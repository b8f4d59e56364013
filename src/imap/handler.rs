//! The staged IMAP handler contract.
//!
//! Four handler interfaces, one per session state, plus the outcome types
//! that stand in for a per-command "state callback" object. A Java-style
//! state callback is an object handed *into* the handler method whose
//! terminal call (`selectOk`, `reject`, ...) installs the next handler; in
//! async Rust the same contract — "the terminal call determines the next
//! handler" — is expressed more directly by having the handler method
//! simply *return* the outcome. Each outcome's positive variant still
//! carries the next handler reference, so exactly one handler is live at a
//! time and a terminal can't fire twice: the latter holds structurally,
//! since a return value can't be produced twice.

use crate::imap::metadata::ImapConnectionMetadata;
use crate::imap::types::{FetchedMessage, FlagSet, MailboxListEntry, MailboxOpResult, QuotaUsage, StatusItem};
use async_trait::async_trait;
use std::sync::Arc;

// ---------------------------------------------------------------------
// Connection-level (ClientConnected)
// ---------------------------------------------------------------------

pub enum ConnectedOutcome {
    /// `acceptConnection(greeting, h)` -> NOT_AUTHENTICATED.
    Accept { greeting: String, handler: Arc<dyn NotAuthenticatedHandler> },
    /// `acceptPreauth(greeting, h)` -> AUTHENTICATED directly (PREAUTH).
    AcceptPreauth { greeting: String, handler: Arc<dyn AuthenticatedHandler> },
    /// `rejectConnection(msg)` -> BYE + close.
    Reject { message: Option<String> },
    ServerShuttingDown,
}

#[async_trait]
pub trait ConnectedHandler: Send + Sync {
    async fn connected(&self, metadata: &ImapConnectionMetadata) -> ConnectedOutcome;
}

/// The authentication realm: password/role lookup lives entirely outside
/// this crate, behind this consumed interface. LOGIN and AUTHENTICATE
/// both resolve a verified principal through the realm before the session
/// ever calls into [`NotAuthenticatedHandler::authenticate`].
#[async_trait]
pub trait Realm: Send + Sync {
    async fn verify_password(&self, user: &str, password: &str) -> Option<String>;

    /// Verify one SASL PLAIN exchange (RFC 4616): `authzid`, `authcid`,
    /// `password`, already NUL-split and UTF-8 decoded from the base64
    /// continuation payload.
    async fn verify_sasl_plain(&self, authzid: &str, authcid: &str, password: &str) -> Option<String>;
}

// ---------------------------------------------------------------------
// NOT_AUTHENTICATED
// ---------------------------------------------------------------------

pub enum AuthenticateOutcome {
    /// `accept(store, h)` / `accept(msg, store, h)` -> AUTHENTICATED.
    Accept { message: Option<String>, handler: Arc<dyn AuthenticatedHandler> },
    /// `reject(msg, h)` -> stays NOT_AUTHENTICATED with a (possibly new)
    /// handler, per the rule that a rejected principal still advances the
    /// realm-verification step without tearing down the connection.
    Reject { message: String, handler: Arc<dyn NotAuthenticatedHandler> },
    /// `rejectAndClose(msg)` -> close.
    RejectAndClose { message: String },
    ServerShuttingDown,
}

#[async_trait]
pub trait NotAuthenticatedHandler: Send + Sync {
    /// Invoked by the session after realm verification of LOGIN/AUTHENTICATE
    /// credentials has already succeeded; `principal` is the verified
    /// identity, not raw client-supplied credentials.
    async fn authenticate(&self, principal: &str, metadata: &ImapConnectionMetadata) -> AuthenticateOutcome;

    async fn disconnected(&self) {}
}

// ---------------------------------------------------------------------
// AUTHENTICATED (and the ops SELECTED inherits)
// ---------------------------------------------------------------------

pub enum SelectOutcome {
    Ok {
        read_write: bool,
        exists: u32,
        recent: u32,
        uid_validity: u32,
        uid_next: u32,
        unseen: Option<u32>,
        flags: FlagSet,
        permanent_flags: FlagSet,
        handler: Arc<dyn SelectedHandler>,
    },
    Failed { message: String, handler: Arc<dyn AuthenticatedHandler> },
    MailboxNotFound { message: String, handler: Arc<dyn AuthenticatedHandler> },
    AccessDenied { message: String, handler: Arc<dyn AuthenticatedHandler> },
}

pub struct MailboxOpOutcome {
    pub result: MailboxOpResult,
    pub message: String,
    pub handler: Arc<dyn AuthenticatedHandler>,
}

pub struct ListOutcome {
    pub entries: Vec<MailboxListEntry>,
    pub handler: Arc<dyn AuthenticatedHandler>,
}

pub struct StatusOutcome {
    pub result: MailboxOpResult,
    pub message: String,
    pub items: Vec<(StatusItem, u64)>,
    pub handler: Arc<dyn AuthenticatedHandler>,
}

pub enum AppendOutcome {
    /// `acceptLiteral(dataHandler)`: the session already knows the literal's
    /// declared byte count from the command line itself, so it reads
    /// exactly that many bytes and delivers chunks to
    /// `AppendDataHandler::append_data` as they arrive.
    AcceptLiteral { data_handler: Arc<dyn AppendDataHandler> },
    Reject { message: String, handler: Arc<dyn AuthenticatedHandler> },
}

pub enum AppendCompleteOutcome {
    Appended { uid_validity: u32, uid: u32, handler: Arc<dyn AuthenticatedHandler> },
    Failed { message: String, handler: Arc<dyn AuthenticatedHandler> },
}

#[async_trait]
pub trait AppendDataHandler: Send + Sync {
    async fn append_data(&self, mailbox: &str, chunk: &[u8]);
    async fn append_complete(&self, mailbox: &str) -> AppendCompleteOutcome;
}

pub struct QuotaOutcome {
    pub usage: Option<QuotaUsage>,
    pub handler: Arc<dyn AuthenticatedHandler>,
}

pub struct QuotaRootOutcome {
    pub roots: Vec<String>,
    pub usages: Vec<QuotaUsage>,
    pub handler: Arc<dyn AuthenticatedHandler>,
}

#[async_trait]
pub trait AuthenticatedHandler: Send + Sync {
    async fn select(&self, mailbox: &str, read_only: bool, metadata: &ImapConnectionMetadata) -> SelectOutcome;

    async fn create(&self, mailbox: &str, metadata: &ImapConnectionMetadata) -> MailboxOpOutcome;
    async fn delete(&self, mailbox: &str, metadata: &ImapConnectionMetadata) -> MailboxOpOutcome;
    async fn rename(&self, from: &str, to: &str, metadata: &ImapConnectionMetadata) -> MailboxOpOutcome;
    async fn subscribe(&self, mailbox: &str, metadata: &ImapConnectionMetadata) -> MailboxOpOutcome;
    async fn unsubscribe(&self, mailbox: &str, metadata: &ImapConnectionMetadata) -> MailboxOpOutcome;

    async fn list(&self, reference: &str, pattern: &str, metadata: &ImapConnectionMetadata) -> ListOutcome;
    async fn lsub(&self, reference: &str, pattern: &str, metadata: &ImapConnectionMetadata) -> ListOutcome;

    async fn status(&self, mailbox: &str, items: &[StatusItem], metadata: &ImapConnectionMetadata) -> StatusOutcome;

    async fn append(&self, mailbox: &str, flags: FlagSet, literal_size: u32, metadata: &ImapConnectionMetadata) -> AppendOutcome;

    /// RFC 2087 GETQUOTA.
    async fn get_quota(&self, root: &str, metadata: &ImapConnectionMetadata) -> QuotaOutcome;
    /// RFC 2087 GETQUOTAROOT.
    async fn get_quota_root(&self, mailbox: &str, metadata: &ImapConnectionMetadata) -> QuotaRootOutcome;
    /// RFC 2087 SETQUOTA.
    async fn set_quota(&self, root: &str, limits: &[(String, u64)], metadata: &ImapConnectionMetadata) -> QuotaOutcome;

    async fn disconnected(&self) {}
}

// ---------------------------------------------------------------------
// SELECTED
// ---------------------------------------------------------------------

pub struct CloseOutcome {
    pub handler: Arc<dyn AuthenticatedHandler>,
}

pub struct ExpungeOutcome {
    pub expunged_seqs: Vec<u32>,
    pub handler: Arc<dyn SelectedHandler>,
}

pub struct StoreOutcome {
    pub updated: Vec<(u32, FlagSet)>,
    pub handler: Arc<dyn SelectedHandler>,
}

pub struct CopyOutcome {
    pub result: MailboxOpResult,
    pub message: String,
    pub handler: Arc<dyn SelectedHandler>,
}

pub struct MoveOutcome {
    pub result: MailboxOpResult,
    pub message: String,
    /// MOVE may deselect the mailbox's source if the destination becomes
    /// current (it never does per RFC 6851 — MOVE keeps the source
    /// selected); kept as `SelectedHandler` uniformly.
    pub handler: Arc<dyn SelectedHandler>,
}

pub struct FetchOutcome {
    pub messages: Vec<FetchedMessage>,
    pub handler: Arc<dyn SelectedHandler>,
}

pub struct SearchOutcome {
    pub matches: Vec<u32>,
    pub handler: Arc<dyn SelectedHandler>,
}

/// `SelectedHandler` extends `AuthenticatedHandler`: every AUTH op plus
/// close/unselect/expunge/store/copy/move/fetch/search. Trait inheritance
/// is the idiomatic-Rust stand-in for a method-set union.
#[async_trait]
pub trait SelectedHandler: AuthenticatedHandler {
    async fn close(&self, metadata: &ImapConnectionMetadata) -> CloseOutcome;
    async fn unselect(&self, metadata: &ImapConnectionMetadata) -> CloseOutcome;

    async fn expunge(&self, metadata: &ImapConnectionMetadata) -> ExpungeOutcome;
    async fn uid_expunge(&self, uid_set: &str, metadata: &ImapConnectionMetadata) -> ExpungeOutcome;

    async fn store(&self, seq_set: &str, flags: &FlagSet, mode: StoreMode, silent: bool, metadata: &ImapConnectionMetadata) -> StoreOutcome;
    async fn uid_store(&self, uid_set: &str, flags: &FlagSet, mode: StoreMode, silent: bool, metadata: &ImapConnectionMetadata) -> StoreOutcome;

    async fn copy(&self, seq_set: &str, destination: &str, metadata: &ImapConnectionMetadata) -> CopyOutcome;
    async fn uid_copy(&self, uid_set: &str, destination: &str, metadata: &ImapConnectionMetadata) -> CopyOutcome;

    async fn mv(&self, seq_set: &str, destination: &str, metadata: &ImapConnectionMetadata) -> MoveOutcome;
    async fn uid_move(&self, uid_set: &str, destination: &str, metadata: &ImapConnectionMetadata) -> MoveOutcome;

    async fn fetch(&self, seq_set: &str, items: &str, metadata: &ImapConnectionMetadata) -> FetchOutcome;
    async fn uid_fetch(&self, uid_set: &str, items: &str, metadata: &ImapConnectionMetadata) -> FetchOutcome;

    async fn search(&self, criteria: &str, metadata: &ImapConnectionMetadata) -> SearchOutcome;
    async fn uid_search(&self, criteria: &str, metadata: &ImapConnectionMetadata) -> SearchOutcome;

    /// Push channel for IDLE: pre-rendered untagged lines
    /// (`EXISTS`, `EXPUNGE`, flag-update `FETCH`) the session forwards to
    /// the client verbatim while idling. `None` if this handler has no
    /// event source to offer; the session then just waits for `DONE`.
    async fn idle_events(&self) -> Option<tokio::sync::mpsc::Receiver<String>> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Set,
    Add,
    Remove,
}
