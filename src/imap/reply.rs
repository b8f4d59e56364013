//! IMAP response formatting (RFC 9051 §2.2.1-§2.2.2).
//!
//! Three response shapes: tagged (`TAG SP (OK|NO|BAD) SP text CRLF`),
//! untagged (`* text CRLF`), and continuation (`+ text CRLF`). Mirrors the
//! FTP side's [`crate::ftp::reply::Reply`] shape, renamed for the protocol
//! that actually ships `*`-prefixed lines instead of multi-line codes.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    No,
    Bad,
}

impl ResponseStatus {
    fn as_str(self) -> &'static str {
        match self {
            ResponseStatus::Ok => "OK",
            ResponseStatus::No => "NO",
            ResponseStatus::Bad => "BAD",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ImapReply {
    /// `TAG OK/NO/BAD [code] text`
    Tagged { tag: String, status: ResponseStatus, code: Option<String>, text: String },
    /// `* text`, one per mailbox event / listing row / capability line.
    Untagged(Vec<String>),
    /// `+ text`
    Continuation(String),
    /// Untagged lines followed by one tagged completion; the common case
    /// for SELECT/LIST/CAPABILITY/STATUS.
    UntaggedThenTagged { untagged: Vec<String>, tag: String, status: ResponseStatus, code: Option<String>, text: String },
}

impl ImapReply {
    pub fn tagged(tag: impl Into<String>, status: ResponseStatus, text: impl Into<String>) -> Self {
        ImapReply::Tagged {
            tag: tag.into(),
            status,
            code: None,
            text: text.into(),
        }
    }

    pub fn tagged_with_code(tag: impl Into<String>, status: ResponseStatus, code: impl Into<String>, text: impl Into<String>) -> Self {
        ImapReply::Tagged {
            tag: tag.into(),
            status,
            code: Some(code.into()),
            text: text.into(),
        }
    }

    pub fn untagged(line: impl Into<String>) -> Self {
        ImapReply::Untagged(vec![line.into()])
    }

    pub fn untagged_then_ok(untagged: Vec<String>, tag: impl Into<String>, text: impl Into<String>) -> Self {
        ImapReply::UntaggedThenTagged {
            untagged,
            tag: tag.into(),
            status: ResponseStatus::Ok,
            code: None,
            text: text.into(),
        }
    }

    pub fn untagged_then_ok_with_code(untagged: Vec<String>, tag: impl Into<String>, code: impl Into<String>, text: impl Into<String>) -> Self {
        ImapReply::UntaggedThenTagged {
            untagged,
            tag: tag.into(),
            status: ResponseStatus::Ok,
            code: Some(code.into()),
            text: text.into(),
        }
    }

    /// Render the full wire form, CRLF-terminated, in order.
    pub fn render(&self) -> String {
        match self {
            ImapReply::Tagged { tag, status, code, text } => render_tagged(tag, *status, code.as_deref(), text),
            ImapReply::Untagged(lines) => lines.iter().map(|l| format!("* {l}\r\n")).collect(),
            ImapReply::Continuation(text) => format!("+ {text}\r\n"),
            ImapReply::UntaggedThenTagged { untagged, tag, status, code, text } => {
                let mut out: String = untagged.iter().map(|l| format!("* {l}\r\n")).collect();
                out.push_str(&render_tagged(tag, *status, code.as_deref(), text));
                out
            }
        }
    }
}

fn render_tagged(tag: &str, status: ResponseStatus, code: Option<&str>, text: &str) -> String {
    match code {
        Some(code) => format!("{tag} {} [{code}] {text}\r\n", status.as_str()),
        None => format!("{tag} {} {text}\r\n", status.as_str()),
    }
}
