//! Opaque-ish value types threaded through the staged handler outcomes.
//!
//! `FlagSet` and `MailboxMessage` are treated as opaque: the mailbox
//! store owns their real representation. The core only needs enough shape
//! to render the wire form of FETCH/SEARCH/STATUS/LIST responses, so these
//! are kept deliberately thin rather than modeling the full RFC 9051
//! fetch-data-item grammar.

/// A message flag, e.g. `\Seen`, `\Answered`, or a keyword. Render-ready as
/// given; the mailbox store is responsible for `\`-prefixing system flags.
pub type FlagSet = Vec<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusItem {
    Messages,
    UidNext,
    UidValidity,
    Unseen,
    Recent,
    Deleted,
    Size,
}

impl StatusItem {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusItem::Messages => "MESSAGES",
            StatusItem::UidNext => "UIDNEXT",
            StatusItem::UidValidity => "UIDVALIDITY",
            StatusItem::Unseen => "UNSEEN",
            StatusItem::Recent => "RECENT",
            StatusItem::Deleted => "DELETED",
            StatusItem::Size => "SIZE",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "MESSAGES" => Some(StatusItem::Messages),
            "UIDNEXT" => Some(StatusItem::UidNext),
            "UIDVALIDITY" => Some(StatusItem::UidValidity),
            "UNSEEN" => Some(StatusItem::Unseen),
            "RECENT" => Some(StatusItem::Recent),
            "DELETED" => Some(StatusItem::Deleted),
            "SIZE" => Some(StatusItem::Size),
            _ => None,
        }
    }
}

/// One row of a LIST/LSUB response.
#[derive(Debug, Clone)]
pub struct MailboxListEntry {
    pub name: String,
    pub delimiter: char,
    pub flags: Vec<String>,
}

/// A `STATUS mailbox (item ...)` response body, already resolved to values
/// by the mailbox store.
#[derive(Debug, Clone)]
pub struct MailboxStatus {
    pub items: Vec<(StatusItem, u64)>,
}

/// One message's worth of pre-rendered FETCH data. The mailbox store
/// renders each requested data item (`ENVELOPE`, `BODY[...]`, `FLAGS`,
/// ...) to its wire text; the core only wraps it in `* N FETCH (...)`.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub seq: u32,
    pub uid: u32,
    pub data_items: String,
}

/// Quota root usage, RFC 2087 `current/limit` pairs keyed by resource name
/// (`STORAGE`, `MESSAGE`, ...).
#[derive(Debug, Clone)]
pub struct QuotaUsage {
    pub root: String,
    pub resources: Vec<(String, u64, u64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxOpResult {
    Ok,
    No,
    Bad,
}
