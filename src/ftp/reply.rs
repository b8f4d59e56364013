//! FTP reply formatting (RFC 959 §4.2, RFC 2389 multi-line `FEAT`/`SITE QUOTA`).
//!
//! A reply is `CODE SP TEXT CRLF`, or for multi-line bodies a run of
//! `CODE '-' TEXT CRLF` continuation lines followed by one `CODE SP TEXT
//! CRLF` terminator sharing the same code, exactly as `libunftp`'s
//! `Reply`/`ReplyCode` pair renders them.

/// Numeric reply codes used by this engine. Not every RFC 959/2228/2389 code
/// is reachable from the commands in this dispatcher, but the ones that are
/// follow the source names verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ReplyCode {
    FileStatusOkay = 150,
    CommandOkay = 200,
    SystemStatus = 211,
    DirectoryStatus = 212,
    FileStatus = 213,
    HelpMessage = 214,
    SystemType = 215,
    ServiceReady = 220,
    ClosingControlConnection = 221,
    DataConnectionOpen = 225,
    ClosingDataConnection = 226,
    EnteringPassiveMode = 227,
    EnteringExtendedPassiveMode = 229,
    UserLoggedIn = 230,
    AuthOkayNoDataNeeded = 234,
    FileActionOkay = 250,
    DirCreated = 257,
    NeedPassword = 331,
    NeedAccount = 332,
    FileActionPending = 350,
    ServiceNotAvailable = 421,
    CommandSyntaxError = 500,
    ParameterSyntaxError = 501,
    CommandNotImplemented = 502,
    BadCommandSequence = 503,
    CommandNotImplementedForParameter = 504,
    ProtocolNotSupported = 522,
    NotLoggedIn = 530,
    FtpsRequired = 534,
    ProtLevelNotSupported = 536,
    FileError = 550,
    ExceededStorageAllocation = 552,
    BadFileName = 553,
    Resp533 = 533,
}

impl ReplyCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// A complete reply to be written to the control channel.
#[derive(Debug, Clone)]
pub enum Reply {
    /// No reply at all (used internally; never written to the wire).
    None,
    CodeAndMsg { code: ReplyCode, msg: String },
    MultiLine { code: ReplyCode, lines: Vec<String> },
}

impl Reply {
    pub fn new(code: ReplyCode, msg: impl Into<String>) -> Self {
        Reply::CodeAndMsg { code, msg: msg.into() }
    }

    pub fn multiline<I, S>(code: ReplyCode, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Reply::MultiLine {
            code,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Render the full `CODE[- ]TEXT\r\n` wire form: every non-final line
    /// uses `-`, the final line uses a space, and all lines share one code.
    pub fn render(&self) -> String {
        match self {
            Reply::None => String::new(),
            Reply::CodeAndMsg { code, msg } => format!("{} {}\r\n", code.as_u32(), msg),
            Reply::MultiLine { code, lines } => {
                let mut out = String::new();
                let n = code.as_u32();
                if let Some((last, rest)) = lines.split_last() {
                    for line in rest {
                        out.push_str(&format!("{n}-{line}\r\n"));
                    }
                    out.push_str(&format!("{n} {last}\r\n"));
                } else {
                    out.push_str(&format!("{n} \r\n"));
                }
                out
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Reply::None)
    }
}
