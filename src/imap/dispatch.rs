//! The IMAP control-connection command dispatcher and per-connection driver
//! loop. Ties together the line framer, the staged handler state machine,
//! literal/IDLE suspension, and TLS upgrade into one session.

use crate::error::CoreError;
use crate::imap::capability;
use crate::imap::command::{parse_command, unquote, ParsedCommand};
use crate::imap::config::ImapServerConfig;
use crate::imap::handler::{
    AppendCompleteOutcome, AppendOutcome, AuthenticateOutcome, ConnectedHandler, ConnectedOutcome, Realm, SelectOutcome, SelectedHandler, StoreMode,
};
use crate::imap::literal::{detect_trailing_literal, LiteralSpec};
use crate::imap::metadata::ImapConnectionMetadata;
use crate::imap::reply::{ImapReply, ResponseStatus};
use crate::imap::session::{CurrentHandler, EnabledExtensions, ImapSession, ImapState};
use crate::imap::types::{FlagSet, MailboxOpResult, QuotaUsage, StatusItem};
use crate::line_codec::LineCodec;
use crate::messages::MessageCatalog;
use crate::telemetry;
use crate::Transport;
use base64::Engine as _;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::Decoder;

struct Connection {
    transport: Option<Transport>,
    codec: LineCodec,
    buf: BytesMut,
}

impl Connection {
    fn new(transport: Transport, max_line_length: usize) -> Self {
        Connection {
            transport: Some(transport),
            codec: LineCodec::new(max_line_length),
            buf: BytesMut::new(),
        }
    }

    fn transport_mut(&mut self) -> &mut Transport {
        self.transport.as_mut().expect("transport present for the session's lifetime")
    }

    async fn read_line(&mut self) -> Result<Option<Result<String, CoreError>>, CoreError> {
        loop {
            if let Some(item) = self.codec.decode(&mut self.buf)? {
                return Ok(Some(item));
            }
            let mut chunk = [0u8; 4096];
            let n = self.transport_mut().read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn read_exact_into(&mut self, target: &mut [u8]) -> Result<(), CoreError> {
        let mut filled = 0;
        while filled < target.len() {
            if !self.buf.is_empty() {
                let take = (target.len() - filled).min(self.buf.len());
                let chunk = self.buf.split_to(take);
                target[filled..filled + take].copy_from_slice(&chunk);
                filled += take;
                continue;
            }
            let n = self.transport_mut().read(&mut target[filled..]).await?;
            if n == 0 {
                return Err(CoreError::ConnectionClosed);
            }
            filled += n;
        }
        Ok(())
    }

    /// A literal's declared byte count covers only the payload; the client
    /// still appends the CRLF that closes out the command line. Drop it
    /// before resuming line-oriented reads, or the line codec would hand
    /// back a spurious empty "command".
    async fn skip_crlf(&mut self) -> Result<(), CoreError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let _ = self.buf.split_to(pos + 1);
                return Ok(());
            }
            let mut chunk = [0u8; 64];
            let n = self.transport_mut().read(&mut chunk).await?;
            if n == 0 {
                return Err(CoreError::ConnectionClosed);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Consume-and-drop exactly `n` declared literal bytes, the recovery
    /// path for a `max_literal_size` violation.
    async fn discard_bytes(&mut self, mut n: u32) -> Result<(), CoreError> {
        while n > 0 {
            if !self.buf.is_empty() {
                let take = (n as usize).min(self.buf.len());
                let _ = self.buf.split_to(take);
                n -= take as u32;
                continue;
            }
            let mut chunk = [0u8; 4096];
            let want = (n as usize).min(chunk.len());
            let read = self.transport_mut().read(&mut chunk[..want]).await?;
            if read == 0 {
                return Err(CoreError::ConnectionClosed);
            }
            n -= read as u32;
        }
        Ok(())
    }

    async fn write_reply(&mut self, reply: &ImapReply) -> Result<(), CoreError> {
        self.transport_mut().write_all(reply.render().as_bytes()).await?;
        self.transport_mut().flush().await?;
        Ok(())
    }

    async fn upgrade_tls(&mut self, acceptor: &tokio_rustls::TlsAcceptor) -> std::io::Result<()> {
        let transport = self.transport.take().expect("transport present");
        let upgraded = transport.upgrade_server(acceptor).await?;
        self.transport = Some(upgraded);
        Ok(())
    }
}

enum Outcome {
    Reply(ImapReply),
    StartTls(ImapReply),
    Logout(ImapReply),
}

fn bad_state_reply(tag: &str, catalog: &MessageCatalog) -> ImapReply {
    ImapReply::tagged(tag, ResponseStatus::Bad, catalog.format("imap.bad_state", &[]))
}

fn status_for(result: MailboxOpResult) -> ResponseStatus {
    match result {
        MailboxOpResult::Ok => ResponseStatus::Ok,
        MailboxOpResult::No => ResponseStatus::No,
        MailboxOpResult::Bad => ResponseStatus::Bad,
    }
}

fn quota_line(usage: &QuotaUsage) -> String {
    let resources: Vec<String> = usage.resources.iter().map(|(name, current, limit)| format!("{name} {current} {limit}")).collect();
    format!("QUOTA {} ({})", usage.root, resources.join(" "))
}

fn parse_flags_token(token: &str) -> FlagSet {
    token.trim_start_matches('(').trim_end_matches(')').split_whitespace().map(str::to_string).collect()
}

fn parse_status_items(items_token: &str) -> Vec<StatusItem> {
    items_token.trim_start_matches('(').trim_end_matches(')').split_whitespace().filter_map(StatusItem::parse).collect()
}

/// Clones the currently selected handler and mailbox name without
/// disturbing `session.handler`; returns `None` outside SELECTED.
fn selected(session: &ImapSession) -> Option<(Arc<dyn SelectedHandler>, String)> {
    match &session.handler {
        CurrentHandler::Selected(h, mailbox) => Some((h.clone(), mailbox.clone())),
        _ => None,
    }
}

/// CREATE/DELETE/RENAME/SUBSCRIBE/... terminate with an `AuthenticatedHandler`
/// regardless of whether the caller was in AUTH or SELECTED; while SELECTED
/// that terminal *is* a `SelectedHandler`, so the session simply keeps its
/// existing selected handler and mailbox rather than trying to recover a
/// `SelectedHandler` from the narrower type.
fn keep_or_replace_authenticated(session: &mut ImapSession, handler: Arc<dyn crate::imap::handler::AuthenticatedHandler>) {
    if matches!(session.handler, CurrentHandler::Authenticated(_)) {
        session.handler = CurrentHandler::Authenticated(handler);
    }
}

/// Drives one IMAP session end to end: greeting, command loop, teardown.
#[allow(clippy::too_many_arguments)]
pub async fn run_session(
    transport: Transport,
    connected_handler: Arc<dyn ConnectedHandler>,
    realm: Arc<dyn Realm>,
    tls_acceptor: Option<tokio_rustls::TlsAcceptor>,
    config: &ImapServerConfig,
    catalog: Arc<MessageCatalog>,
    client_addr: SocketAddr,
    server_addr: SocketAddr,
) -> Result<(), CoreError> {
    let span = telemetry::session_span("imap", client_addr);
    let _enter = span.enter();

    let mut metadata = ImapConnectionMetadata::new(client_addr, server_addr);
    metadata.secure = transport.is_secure();
    metadata.tls = transport.tls_snapshot();

    let mut conn = Connection::new(transport, config.max_line_length);
    let sasl_mechanisms: Vec<&str> = config.sasl_mechanisms.iter().map(String::as_str).collect();

    let mut session = match connected_handler.connected(&metadata).await {
        ConnectedOutcome::Accept { greeting, handler } => {
            let caps = capability::compose(false, metadata.secure, tls_acceptor.is_some(), config, EnabledExtensions::default(), &sasl_mechanisms);
            conn.write_reply(&ImapReply::untagged(format!("OK [{}] {greeting}", capability::render_line(&caps)))).await?;
            ImapSession::new(CurrentHandler::NotAuthenticated(handler), metadata.secure)
        }
        ConnectedOutcome::AcceptPreauth { greeting, handler } => {
            let caps = capability::compose(true, metadata.secure, tls_acceptor.is_some(), config, EnabledExtensions::default(), &[]);
            conn.write_reply(&ImapReply::untagged(format!("PREAUTH [{}] {greeting}", capability::render_line(&caps)))).await?;
            ImapSession::new(CurrentHandler::Authenticated(handler), metadata.secure)
        }
        ConnectedOutcome::Reject { message } => {
            conn.write_reply(&ImapReply::untagged(format!("BYE {}", message.unwrap_or_else(|| "connection rejected".to_string())))).await?;
            return Ok(());
        }
        ConnectedOutcome::ServerShuttingDown => {
            conn.write_reply(&ImapReply::untagged("BYE server shutting down".to_string())).await?;
            return Ok(());
        }
    };

    'session: loop {
        let line = match conn.read_line().await? {
            None => break 'session,
            Some(Err(e)) => {
                telemetry::emit_error_event!(e.category(), "imap line framing error");
                conn.write_reply(&ImapReply::tagged("*", ResponseStatus::Bad, catalog.format("ftp.line_too_long", &[]))).await?;
                continue;
            }
            Some(Ok(line)) => line,
        };

        let (parsed, literal) = match detect_trailing_literal(&line) {
            Some((spec, prefix)) => match parse_command(prefix) {
                Ok(parsed) => (parsed, Some(spec)),
                Err(e) => {
                    conn.write_reply(&ImapReply::tagged(e.tag.unwrap_or_else(|| "*".to_string()), ResponseStatus::Bad, e.message)).await?;
                    continue;
                }
            },
            None => match parse_command(&line) {
                Ok(parsed) => (parsed, None),
                Err(e) => {
                    conn.write_reply(&ImapReply::tagged(e.tag.unwrap_or_else(|| "*".to_string()), ResponseStatus::Bad, e.message)).await?;
                    continue;
                }
            },
        };

        let outcome = dispatch_command(&parsed, literal, &mut session, &mut metadata, &catalog, config, tls_acceptor.as_ref(), &realm, &mut conn).await?;

        match outcome {
            Outcome::Reply(reply) => conn.write_reply(&reply).await?,
            Outcome::StartTls(reply) => {
                conn.write_reply(&reply).await?;
                if let Some(acceptor) = tls_acceptor.as_ref() {
                    conn.upgrade_tls(acceptor).await?;
                    metadata.secure = true;
                    session.secure = true;
                    metadata.tls = conn.transport_mut().tls_snapshot();
                    telemetry::record_secure(&span, true);
                }
            }
            Outcome::Logout(reply) => {
                conn.write_reply(&reply).await?;
                session.handler = CurrentHandler::Logout;
                break 'session;
            }
        }
    }

    drop(_enter);
    match &session.handler {
        CurrentHandler::NotAuthenticated(h) => h.disconnected().await,
        CurrentHandler::Authenticated(h) => h.disconnected().await,
        CurrentHandler::Selected(h, _) => h.disconnected().await,
        CurrentHandler::Logout => {}
    }
    Ok(())
}

async fn complete_authenticate(principal: String, session: &mut ImapSession, metadata: &mut ImapConnectionMetadata, tag: &str, default_ok_msg: &str) -> Outcome {
    let CurrentHandler::NotAuthenticated(handler) = &session.handler else {
        return Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "already authenticated"));
    };
    match handler.authenticate(&principal, metadata).await {
        AuthenticateOutcome::Accept { message, handler } => {
            session.principal = Some(principal.clone());
            metadata.principal = Some(principal);
            session.handler = CurrentHandler::Authenticated(handler);
            Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Ok, message.unwrap_or_else(|| default_ok_msg.to_string())))
        }
        AuthenticateOutcome::Reject { message, handler } => {
            session.handler = CurrentHandler::NotAuthenticated(handler);
            Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::No, message))
        }
        AuthenticateOutcome::RejectAndClose { message } => Outcome::Logout(ImapReply::tagged(tag, ResponseStatus::No, message)),
        AuthenticateOutcome::ServerShuttingDown => Outcome::Logout(ImapReply::untagged("BYE server shutting down".to_string())),
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_command(
    parsed: &ParsedCommand,
    literal: Option<LiteralSpec>,
    session: &mut ImapSession,
    metadata: &mut ImapConnectionMetadata,
    catalog: &MessageCatalog,
    config: &ImapServerConfig,
    tls_acceptor: Option<&tokio_rustls::TlsAcceptor>,
    realm: &Arc<dyn Realm>,
    conn: &mut Connection,
) -> Result<Outcome, CoreError> {
    let tag = parsed.tag.as_str();

    match parsed.verb.as_str() {
        "CAPABILITY" => {
            let sasl: Vec<&str> = config.sasl_mechanisms.iter().map(String::as_str).collect();
            let tokens = capability::compose(session.state() != ImapState::NotAuthenticated, session.secure, tls_acceptor.is_some(), config, session.enabled_extensions, &sasl);
            Ok(Outcome::Reply(ImapReply::untagged_then_ok(vec![capability::render_line(&tokens)], tag, "CAPABILITY completed")))
        }
        "NOOP" => Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Ok, "NOOP completed"))),
        "LOGOUT" => Ok(Outcome::Logout(ImapReply::UntaggedThenTagged {
            untagged: vec!["BYE logging out".to_string()],
            tag: tag.to_string(),
            status: ResponseStatus::Ok,
            code: None,
            text: "LOGOUT completed".to_string(),
        })),
        "ID" => Ok(Outcome::Reply(ImapReply::untagged_then_ok(vec!["ID NIL".to_string()], tag, "ID completed"))),
        "NAMESPACE" => {
            if session.state() == ImapState::NotAuthenticated {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            }
            if !session.enabled_extensions.namespace {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::No, "NAMESPACE not enabled")));
            }
            Ok(Outcome::Reply(ImapReply::untagged_then_ok(
                vec!["NAMESPACE ((\"\" \"/\")) NIL NIL".to_string()],
                tag,
                "NAMESPACE completed",
            )))
        }
        "STARTTLS" => {
            if session.secure {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, catalog.format("ftp.already_secure", &[]))));
            }
            if tls_acceptor.is_none() {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, catalog.format("ftp.tls_unavailable", &[]))));
            }
            Ok(Outcome::StartTls(ImapReply::tagged(tag, ResponseStatus::Ok, "Begin TLS negotiation now")))
        }

        "LOGIN" => {
            if session.state() != ImapState::NotAuthenticated {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            }
            if !session.secure && !config.allow_plaintext_login {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, catalog.format("imap.login_disabled", &[]))));
            }
            let (Some(user_raw), Some(pass_raw)) = (parsed.args.first(), parsed.args.get(1)) else {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "LOGIN requires a username and password")));
            };
            match realm.verify_password(unquote(user_raw), unquote(pass_raw)).await {
                Some(principal) => Ok(complete_authenticate(principal, session, metadata, tag, "LOGIN completed").await),
                None => Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::No, "LOGIN failed"))),
            }
        }
        "AUTHENTICATE" => {
            if session.state() != ImapState::NotAuthenticated {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            }
            let Some(mechanism) = parsed.args.first() else {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "AUTHENTICATE requires a mechanism")));
            };
            if !mechanism.eq_ignore_ascii_case("PLAIN") {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::No, "mechanism not supported")));
            }
            conn.write_reply(&ImapReply::Continuation(String::new())).await?;
            let response_line = match conn.read_line().await? {
                Some(Ok(line)) => line,
                _ => return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "AUTHENTICATE aborted"))),
            };
            let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(response_line.trim().as_bytes()) else {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "invalid base64")));
            };
            let segments: Vec<&[u8]> = decoded.splitn(3, |&b| b == 0).collect();
            if segments.len() != 3 {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "malformed SASL PLAIN response")));
            }
            let authzid = String::from_utf8_lossy(segments[0]).into_owned();
            let authcid = String::from_utf8_lossy(segments[1]).into_owned();
            let password = String::from_utf8_lossy(segments[2]).into_owned();
            match realm.verify_sasl_plain(&authzid, &authcid, &password).await {
                Some(principal) => Ok(complete_authenticate(principal, session, metadata, tag, "AUTHENTICATE completed").await),
                None => Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::No, "authentication failed"))),
            }
        }

        "IDLE" => {
            if session.state() == ImapState::NotAuthenticated {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            }
            if !session.enabled_extensions.idle {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::No, "IDLE not enabled")));
            }
            conn.write_reply(&ImapReply::Continuation("idling".to_string())).await?;
            session.idling = true;
            let mut events = match &session.handler {
                CurrentHandler::Selected(h, _) => h.idle_events().await,
                _ => None,
            };
            let reply = loop {
                tokio::select! {
                    line = conn.read_line() => {
                        match line? {
                            Some(Ok(l)) if l.trim().eq_ignore_ascii_case("DONE") => break ImapReply::tagged(tag, ResponseStatus::Ok, "IDLE completed"),
                            Some(Ok(_)) => continue,
                            Some(Err(_)) | None => break ImapReply::tagged(tag, ResponseStatus::Bad, catalog.format("imap.idle_timeout", &[])),
                        }
                    }
                    event = async {
                        match events.as_mut() {
                            Some(rx) => rx.recv().await,
                            None => std::future::pending().await,
                        }
                    } => {
                        if let Some(line) = event {
                            conn.write_reply(&ImapReply::untagged(line)).await?;
                        }
                    }
                }
            };
            session.idling = false;
            Ok(Outcome::Reply(reply))
        }

        "SELECT" | "EXAMINE" => {
            if session.state() == ImapState::NotAuthenticated {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            }
            let Some(mailbox_raw) = parsed.args.first() else {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "SELECT requires a mailbox")));
            };
            let mailbox = unquote(mailbox_raw).to_string();
            let read_only = parsed.verb == "EXAMINE";
            let outcome = match &session.handler {
                CurrentHandler::Authenticated(h) => h.select(&mailbox, read_only, metadata).await,
                CurrentHandler::Selected(h, _) => h.select(&mailbox, read_only, metadata).await,
                _ => unreachable!("gated above"),
            };
            match outcome {
                SelectOutcome::Ok {
                    read_write,
                    exists,
                    recent,
                    uid_validity,
                    uid_next,
                    unseen,
                    flags,
                    permanent_flags,
                    handler,
                } => {
                    session.handler = CurrentHandler::Selected(handler, mailbox);
                    let mut untagged = vec![
                        format!("FLAGS ({})", flags.join(" ")),
                        format!("{exists} EXISTS"),
                        format!("{recent} RECENT"),
                        format!("OK [PERMANENTFLAGS ({})] Flags permitted", permanent_flags.join(" ")),
                        format!("OK [UIDVALIDITY {uid_validity}] UIDs valid"),
                        format!("OK [UIDNEXT {uid_next}] Predicted next UID"),
                    ];
                    if let Some(unseen) = unseen {
                        untagged.push(format!("OK [UNSEEN {unseen}] first unseen message"));
                    }
                    let code = if read_write { "READ-WRITE" } else { "READ-ONLY" };
                    Ok(Outcome::Reply(ImapReply::untagged_then_ok_with_code(untagged, tag, code, format!("{} completed", parsed.verb))))
                }
                SelectOutcome::Failed { message, handler } | SelectOutcome::MailboxNotFound { message, handler } | SelectOutcome::AccessDenied { message, handler } => {
                    session.handler = CurrentHandler::Authenticated(handler);
                    Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::No, message)))
                }
            }
        }

        "CREATE" | "DELETE" | "SUBSCRIBE" | "UNSUBSCRIBE" => {
            if session.state() == ImapState::NotAuthenticated {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            }
            let Some(mailbox_raw) = parsed.args.first() else {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, format!("{} requires a mailbox", parsed.verb))));
            };
            let mailbox = unquote(mailbox_raw).to_string();
            let outcome = match (parsed.verb.as_str(), &session.handler) {
                ("CREATE", CurrentHandler::Authenticated(h)) => h.create(&mailbox, metadata).await,
                ("CREATE", CurrentHandler::Selected(h, _)) => h.create(&mailbox, metadata).await,
                ("DELETE", CurrentHandler::Authenticated(h)) => h.delete(&mailbox, metadata).await,
                ("DELETE", CurrentHandler::Selected(h, _)) => h.delete(&mailbox, metadata).await,
                ("SUBSCRIBE", CurrentHandler::Authenticated(h)) => h.subscribe(&mailbox, metadata).await,
                ("SUBSCRIBE", CurrentHandler::Selected(h, _)) => h.subscribe(&mailbox, metadata).await,
                ("UNSUBSCRIBE", CurrentHandler::Authenticated(h)) => h.unsubscribe(&mailbox, metadata).await,
                ("UNSUBSCRIBE", CurrentHandler::Selected(h, _)) => h.unsubscribe(&mailbox, metadata).await,
                _ => unreachable!("gated above"),
            };
            keep_or_replace_authenticated(session, outcome.handler);
            let text = if outcome.message.is_empty() { format!("{} completed", parsed.verb) } else { outcome.message };
            Ok(Outcome::Reply(ImapReply::tagged(tag, status_for(outcome.result), text)))
        }

        "RENAME" => {
            if session.state() == ImapState::NotAuthenticated {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            }
            let (Some(from_raw), Some(to_raw)) = (parsed.args.first(), parsed.args.get(1)) else {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "RENAME requires two mailbox names")));
            };
            let (from, to) = (unquote(from_raw).to_string(), unquote(to_raw).to_string());
            let outcome = match &session.handler {
                CurrentHandler::Authenticated(h) => h.rename(&from, &to, metadata).await,
                CurrentHandler::Selected(h, _) => h.rename(&from, &to, metadata).await,
                _ => unreachable!("gated above"),
            };
            keep_or_replace_authenticated(session, outcome.handler);
            let text = if outcome.message.is_empty() { "RENAME completed".to_string() } else { outcome.message };
            Ok(Outcome::Reply(ImapReply::tagged(tag, status_for(outcome.result), text)))
        }

        "LIST" | "LSUB" => {
            if session.state() == ImapState::NotAuthenticated {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            }
            let (Some(reference_raw), Some(pattern_raw)) = (parsed.args.first(), parsed.args.get(1)) else {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, format!("{} requires a reference and a pattern", parsed.verb))));
            };
            let (reference, pattern) = (unquote(reference_raw), unquote(pattern_raw));
            let outcome = match (parsed.verb.as_str(), &session.handler) {
                ("LIST", CurrentHandler::Authenticated(h)) => h.list(reference, pattern, metadata).await,
                ("LIST", CurrentHandler::Selected(h, _)) => h.list(reference, pattern, metadata).await,
                ("LSUB", CurrentHandler::Authenticated(h)) => h.lsub(reference, pattern, metadata).await,
                ("LSUB", CurrentHandler::Selected(h, _)) => h.lsub(reference, pattern, metadata).await,
                _ => unreachable!("gated above"),
            };
            keep_or_replace_authenticated(session, outcome.handler);
            let untagged: Vec<String> = outcome
                .entries
                .iter()
                .map(|e| format!("{} ({}) \"{}\" \"{}\"", parsed.verb, e.flags.join(" "), e.delimiter, e.name))
                .collect();
            Ok(Outcome::Reply(ImapReply::untagged_then_ok(untagged, tag, format!("{} completed", parsed.verb))))
        }

        "STATUS" => {
            if session.state() == ImapState::NotAuthenticated {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            }
            let Some(mailbox_raw) = parsed.args.first() else {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "STATUS requires a mailbox")));
            };
            let mailbox = unquote(mailbox_raw).to_string();
            let items = parsed.args.get(1).map(|t| parse_status_items(t)).unwrap_or_default();
            let outcome = match &session.handler {
                CurrentHandler::Authenticated(h) => h.status(&mailbox, &items, metadata).await,
                CurrentHandler::Selected(h, _) => h.status(&mailbox, &items, metadata).await,
                _ => unreachable!("gated above"),
            };
            keep_or_replace_authenticated(session, outcome.handler);
            if outcome.result != MailboxOpResult::Ok {
                let text = if outcome.message.is_empty() { "STATUS failed".to_string() } else { outcome.message };
                return Ok(Outcome::Reply(ImapReply::tagged(tag, status_for(outcome.result), text)));
            }
            let rendered: Vec<String> = outcome.items.iter().map(|(item, value)| format!("{} {value}", item.as_str())).collect();
            let line = format!("STATUS {mailbox} ({})", rendered.join(" "));
            Ok(Outcome::Reply(ImapReply::untagged_then_ok(vec![line], tag, "STATUS completed")))
        }

        "APPEND" => {
            if session.state() == ImapState::NotAuthenticated {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            }
            let Some(mailbox_raw) = parsed.args.first() else {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "APPEND requires a mailbox")));
            };
            let mailbox = unquote(mailbox_raw).to_string();
            let flags: FlagSet = parsed.args.get(1).filter(|a| a.starts_with('(')).map(|a| parse_flags_token(a)).unwrap_or_default();
            let Some(litspec) = literal else {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "APPEND requires a message literal")));
            };
            if litspec.size > config.max_literal_size {
                if litspec.non_synchronizing {
                    conn.discard_bytes(litspec.size).await?;
                    conn.skip_crlf().await?;
                }
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, catalog.format("imap.literal_too_large", &[]))));
            }
            let append_outcome = match &session.handler {
                CurrentHandler::Authenticated(h) => h.append(&mailbox, flags, litspec.size, metadata).await,
                CurrentHandler::Selected(h, _) => h.append(&mailbox, flags, litspec.size, metadata).await,
                _ => unreachable!("gated above"),
            };
            match append_outcome {
                AppendOutcome::Reject { message, handler } => {
                    // A synchronizing literal ({N}) never reaches the wire until the
                    // server sends `+`; since none was sent here, the client holds the
                    // bytes back and there is nothing to drain. A non-synchronizing
                    // literal ({N+}) is already in flight regardless of the reply.
                    if litspec.non_synchronizing {
                        conn.discard_bytes(litspec.size).await?;
                        conn.skip_crlf().await?;
                    }
                    keep_or_replace_authenticated(session, handler);
                    Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::No, message)))
                }
                AppendOutcome::AcceptLiteral { data_handler } => {
                    conn.write_reply(&ImapReply::Continuation("Ready for literal data".to_string())).await?;
                    let mut remaining = litspec.size;
                    let mut buf = [0u8; 8192];
                    while remaining > 0 {
                        let take = remaining.min(buf.len() as u32) as usize;
                        conn.read_exact_into(&mut buf[..take]).await?;
                        data_handler.append_data(&mailbox, &buf[..take]).await;
                        remaining -= take as u32;
                    }
                    conn.skip_crlf().await?;
                    match data_handler.append_complete(&mailbox).await {
                        AppendCompleteOutcome::Appended { uid_validity, uid, handler } => {
                            keep_or_replace_authenticated(session, handler);
                            Ok(Outcome::Reply(ImapReply::tagged_with_code(tag, ResponseStatus::Ok, format!("APPENDUID {uid_validity} {uid}"), "APPEND completed")))
                        }
                        AppendCompleteOutcome::Failed { message, handler } => {
                            keep_or_replace_authenticated(session, handler);
                            Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::No, message)))
                        }
                    }
                }
            }
        }

        "GETQUOTA" | "GETQUOTAROOT" | "SETQUOTA" => {
            if session.state() == ImapState::NotAuthenticated {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            }
            if !session.enabled_extensions.quota {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::No, "QUOTA not enabled")));
            }
            match parsed.verb.as_str() {
                "GETQUOTA" => {
                    let Some(root_raw) = parsed.args.first() else {
                        return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "GETQUOTA requires a root")));
                    };
                    let root = unquote(root_raw);
                    let outcome = match &session.handler {
                        CurrentHandler::Authenticated(h) => h.get_quota(root, metadata).await,
                        CurrentHandler::Selected(h, _) => h.get_quota(root, metadata).await,
                        _ => unreachable!("gated above"),
                    };
                    keep_or_replace_authenticated(session, outcome.handler);
                    match outcome.usage {
                        Some(usage) => Ok(Outcome::Reply(ImapReply::untagged_then_ok(vec![quota_line(&usage)], tag, "GETQUOTA completed"))),
                        None => Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::No, "quota root does not exist"))),
                    }
                }
                "GETQUOTAROOT" => {
                    let Some(mailbox_raw) = parsed.args.first() else {
                        return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "GETQUOTAROOT requires a mailbox")));
                    };
                    let mailbox = unquote(mailbox_raw);
                    let outcome = match &session.handler {
                        CurrentHandler::Authenticated(h) => h.get_quota_root(mailbox, metadata).await,
                        CurrentHandler::Selected(h, _) => h.get_quota_root(mailbox, metadata).await,
                        _ => unreachable!("gated above"),
                    };
                    keep_or_replace_authenticated(session, outcome.handler);
                    let mut untagged = vec![format!("QUOTAROOT {mailbox} {}", outcome.roots.join(" "))];
                    untagged.extend(outcome.usages.iter().map(quota_line));
                    Ok(Outcome::Reply(ImapReply::untagged_then_ok(untagged, tag, "GETQUOTAROOT completed")))
                }
                _ => {
                    let (Some(root_raw), Some(limits_raw)) = (parsed.args.first(), parsed.args.get(1)) else {
                        return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "SETQUOTA requires a root and limits")));
                    };
                    let root = unquote(root_raw);
                    let tokens: Vec<&str> = limits_raw.trim_start_matches('(').trim_end_matches(')').split_whitespace().collect();
                    let limits: Vec<(String, u64)> = tokens.chunks(2).filter_map(|pair| match pair {
                        [name, value] => value.parse::<u64>().ok().map(|v| (name.to_string(), v)),
                        _ => None,
                    }).collect();
                    let outcome = match &session.handler {
                        CurrentHandler::Authenticated(h) => h.set_quota(root, &limits, metadata).await,
                        CurrentHandler::Selected(h, _) => h.set_quota(root, &limits, metadata).await,
                        _ => unreachable!("gated above"),
                    };
                    keep_or_replace_authenticated(session, outcome.handler);
                    match outcome.usage {
                        Some(usage) => Ok(Outcome::Reply(ImapReply::untagged_then_ok(vec![quota_line(&usage)], tag, "SETQUOTA completed"))),
                        None => Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::No, "quota root does not exist"))),
                    }
                }
            }
        }

        "CLOSE" | "UNSELECT" => {
            let Some((h, _mailbox)) = selected(session) else {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            };
            let outcome = if parsed.verb == "CLOSE" { h.close(metadata).await } else { h.unselect(metadata).await };
            session.handler = CurrentHandler::Authenticated(outcome.handler);
            Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Ok, format!("{} completed", parsed.verb))))
        }

        "EXPUNGE" => {
            let Some((h, mailbox)) = selected(session) else {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            };
            let outcome = if parsed.uid_prefixed {
                h.uid_expunge(parsed.args.first().map(String::as_str).unwrap_or(""), metadata).await
            } else {
                h.expunge(metadata).await
            };
            session.handler = CurrentHandler::Selected(outcome.handler, mailbox);
            let untagged = outcome.expunged_seqs.iter().map(|seq| format!("{seq} EXPUNGE")).collect();
            Ok(Outcome::Reply(ImapReply::untagged_then_ok(untagged, tag, "EXPUNGE completed")))
        }

        "STORE" => {
            let Some((h, mailbox)) = selected(session) else {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            };
            let (Some(seq_set), Some(mode_token), Some(flags_token)) = (parsed.args.first(), parsed.args.get(1), parsed.args.get(2)) else {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "STORE requires a sequence set, mode, and flags")));
            };
            let upper = mode_token.to_uppercase();
            let silent = upper.ends_with(".SILENT");
            let base = upper.trim_end_matches(".SILENT");
            let mode = match base {
                "FLAGS" => StoreMode::Set,
                "+FLAGS" => StoreMode::Add,
                "-FLAGS" => StoreMode::Remove,
                _ => return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "invalid STORE mode"))),
            };
            let flags = parse_flags_token(flags_token);
            let outcome = if parsed.uid_prefixed {
                h.uid_store(seq_set, &flags, mode, silent, metadata).await
            } else {
                h.store(seq_set, &flags, mode, silent, metadata).await
            };
            session.handler = CurrentHandler::Selected(outcome.handler, mailbox);
            let untagged = if silent {
                Vec::new()
            } else {
                outcome.updated.iter().map(|(seq, flags)| format!("{seq} FETCH (FLAGS ({}))", flags.join(" "))).collect()
            };
            Ok(Outcome::Reply(ImapReply::untagged_then_ok(untagged, tag, "STORE completed")))
        }

        "COPY" => {
            let Some((h, mailbox)) = selected(session) else {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            };
            let (Some(seq_set), Some(dest_raw)) = (parsed.args.first(), parsed.args.get(1)) else {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "COPY requires a sequence set and destination")));
            };
            let dest = unquote(dest_raw);
            let outcome = if parsed.uid_prefixed { h.uid_copy(seq_set, dest, metadata).await } else { h.copy(seq_set, dest, metadata).await };
            session.handler = CurrentHandler::Selected(outcome.handler, mailbox);
            let text = if outcome.message.is_empty() { "COPY completed".to_string() } else { outcome.message };
            Ok(Outcome::Reply(ImapReply::tagged(tag, status_for(outcome.result), text)))
        }

        "MOVE" => {
            if !session.enabled_extensions.r#move {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::No, "MOVE not enabled")));
            }
            let Some((h, mailbox)) = selected(session) else {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            };
            let (Some(seq_set), Some(dest_raw)) = (parsed.args.first(), parsed.args.get(1)) else {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "MOVE requires a sequence set and destination")));
            };
            let dest = unquote(dest_raw);
            let outcome = if parsed.uid_prefixed { h.uid_move(seq_set, dest, metadata).await } else { h.mv(seq_set, dest, metadata).await };
            session.handler = CurrentHandler::Selected(outcome.handler, mailbox);
            let text = if outcome.message.is_empty() { "MOVE completed".to_string() } else { outcome.message };
            Ok(Outcome::Reply(ImapReply::tagged(tag, status_for(outcome.result), text)))
        }

        "FETCH" => {
            let Some((h, mailbox)) = selected(session) else {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            };
            let Some(seq_set) = parsed.args.first() else {
                return Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, "FETCH requires a sequence set")));
            };
            let items = parsed.args[1..].join(" ");
            let outcome = if parsed.uid_prefixed { h.uid_fetch(seq_set, &items, metadata).await } else { h.fetch(seq_set, &items, metadata).await };
            session.handler = CurrentHandler::Selected(outcome.handler, mailbox);
            let untagged = outcome.messages.iter().map(|m| format!("{} FETCH ({})", m.seq, m.data_items)).collect();
            Ok(Outcome::Reply(ImapReply::untagged_then_ok(untagged, tag, "FETCH completed")))
        }

        "SEARCH" => {
            let Some((h, mailbox)) = selected(session) else {
                return Ok(Outcome::Reply(bad_state_reply(tag, catalog)));
            };
            let criteria = parsed.raw_args.clone();
            let outcome = if parsed.uid_prefixed { h.uid_search(&criteria, metadata).await } else { h.search(&criteria, metadata).await };
            session.handler = CurrentHandler::Selected(outcome.handler, mailbox);
            let line = format!("SEARCH{}", outcome.matches.iter().map(|n| format!(" {n}")).collect::<String>());
            Ok(Outcome::Reply(ImapReply::untagged_then_ok(vec![line], tag, "SEARCH completed")))
        }

        _ => Ok(Outcome::Reply(ImapReply::tagged(tag, ResponseStatus::Bad, format!("command unrecognized: {}", parsed.verb)))),
    }
}
