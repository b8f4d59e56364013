//! RFC 4217 explicit TLS upgrade sequencing: `AUTH` / `PBSZ` / `PROT` / `CCC`.
//! Pure state transitions over [`FtpSession`]; the actual
//! handshake is driven by the dispatcher once [`AuthOutcome::start_tls`]
//! tells it to call [`crate::Transport::upgrade_server`].

use crate::ftp::reply::{Reply, ReplyCode};
use crate::ftp::session::{FtpSession, ProtLevel};
use crate::messages::MessageCatalog;

pub struct AuthOutcome {
    pub reply: Reply,
    pub start_tls: bool,
}

/// `AUTH TLS` / `AUTH SSL`. Single-shot per session (I2); requires a TLS
/// context to be configured.
pub fn handle_auth(session: &mut FtpSession, arg: Option<&str>, already_secure: bool, tls_available: bool, catalog: &MessageCatalog) -> AuthOutcome {
    let mechanism = arg.map(str::to_uppercase);
    let is_supported_mechanism = matches!(mechanism.as_deref(), Some("TLS") | Some("SSL"));
    if !is_supported_mechanism {
        return AuthOutcome {
            reply: Reply::new(ReplyCode::CommandNotImplementedForParameter, "AUTH requires TLS or SSL"),
            start_tls: false,
        };
    }
    if already_secure {
        return AuthOutcome {
            reply: Reply::new(ReplyCode::BadCommandSequence, catalog.format("ftp.already_secure", &[])),
            start_tls: false,
        };
    }
    if !tls_available {
        return AuthOutcome {
            reply: Reply::new(ReplyCode::FtpsRequired, catalog.format("ftp.tls_unavailable", &[])),
            start_tls: false,
        };
    }
    session.auth_used = true;
    session.pbsz_set = false;
    session.data_protection = false;
    AuthOutcome {
        reply: Reply::new(ReplyCode::AuthOkayNoDataNeeded, format!("AUTH {} successful", mechanism.unwrap())),
        start_tls: true,
    }
}

/// `PBSZ`: requires a secure control channel. TLS mandates buffer size 0
/// regardless of the value the client sent.
pub fn handle_pbsz(session: &mut FtpSession, arg: Option<&str>, secure: bool, catalog: &MessageCatalog) -> Reply {
    if !secure {
        return Reply::new(ReplyCode::BadCommandSequence, catalog.format("ftp.pbsz_requires_tls", &[]));
    }
    match arg.unwrap_or("").trim().parse::<u64>() {
        Ok(_) => {
            session.pbsz_set = true;
            Reply::new(ReplyCode::CommandOkay, "PBSZ=0")
        }
        Err(_) => Reply::new(ReplyCode::ParameterSyntaxError, "PBSZ requires a numeric argument"),
    }
}

/// `PROT`: requires a secure channel and a prior `PBSZ`. `C`/`P` toggle the
/// coordinator's data-protection bit; `S`/`E` are recognized but
/// unsupported (536); anything else is a syntax error.
pub fn handle_prot(session: &mut FtpSession, arg: Option<&str>, secure: bool, catalog: &MessageCatalog) -> Reply {
    if !secure {
        return Reply::new(ReplyCode::BadCommandSequence, catalog.format("ftp.pbsz_requires_tls", &[]));
    }
    if !session.pbsz_set {
        return Reply::new(ReplyCode::BadCommandSequence, catalog.format("ftp.prot_requires_pbsz", &[]));
    }
    let level = match arg.unwrap_or("").trim().to_uppercase().as_str() {
        "C" => ProtLevel::Clear,
        "P" => ProtLevel::Private,
        "S" => ProtLevel::Safe,
        "E" => ProtLevel::Confidential,
        _ => return Reply::new(ReplyCode::ParameterSyntaxError, "PROT requires C, P, S or E"),
    };
    match level {
        ProtLevel::Clear => {
            session.data_protection = false;
            Reply::new(ReplyCode::CommandOkay, "PROT OK. Switching data channel to plaintext")
        }
        ProtLevel::Private => {
            session.data_protection = true;
            Reply::new(ReplyCode::CommandOkay, "PROT OK. Securing data channel")
        }
        ProtLevel::Safe | ProtLevel::Confidential => Reply::new(ReplyCode::ProtLevelNotSupported, "PROT S/E not implemented"),
    }
}

/// `CCC` (clear command channel) is unsupported.
pub fn handle_ccc(catalog: &MessageCatalog) -> Reply {
    Reply::new(ReplyCode::Resp533, catalog.format("ftp.ccc_unsupported", &[]))
}
