//! The IMAP4rev2 staged-handler session core: the NOT_AUTHENTICATED ->
//! AUTHENTICATED -> SELECTED -> LOGOUT state machine plus IDLE/NAMESPACE/
//! MOVE/QUOTA extensions.

pub mod capability;
mod command;
pub mod config;
pub mod dispatch;
pub mod handler;
mod literal;
pub mod metadata;
pub mod reply;
pub mod session;
pub mod types;

pub use config::ImapServerConfig;
pub use dispatch::run_session;
pub use handler::{
    AppendCompleteOutcome, AppendDataHandler, AppendOutcome, AuthenticateOutcome, AuthenticatedHandler, CloseOutcome, ConnectedHandler, ConnectedOutcome,
    CopyOutcome, ExpungeOutcome, FetchOutcome, ListOutcome, MailboxOpOutcome, MoveOutcome, NotAuthenticatedHandler, QuotaOutcome, QuotaRootOutcome, Realm,
    SearchOutcome, SelectOutcome, SelectedHandler, StatusOutcome, StoreMode, StoreOutcome,
};
pub use metadata::ImapConnectionMetadata;
pub use reply::{ImapReply, ResponseStatus};
pub use session::{CurrentHandler, EnabledExtensions, ImapSession, ImapState};
pub use types::{FetchedMessage, FlagSet, MailboxListEntry, MailboxOpResult, MailboxStatus, QuotaUsage, StatusItem};
