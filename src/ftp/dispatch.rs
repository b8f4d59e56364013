//! The FTP control-connection command dispatcher and per-connection driver
//! loop. Ties together the line framer, the authorization gate, the TLS
//! upgrade state machine, the data-connection coordinator and the
//! application handler into one session.

use crate::error::CoreError;
use crate::ftp::command::{parse_command, FILE_AND_NAV_COMMANDS};
use crate::ftp::config::FtpServerConfig;
use crate::ftp::data::{parse_eprt_arg, parse_port_arg, FtpDataConnectionCoordinator, PendingTransfer, TransferKind};
use crate::ftp::handler::FtpHandler;
use crate::ftp::metadata::FtpConnectionMetadata;
use crate::ftp::quota;
use crate::ftp::reply::{Reply, ReplyCode};
use crate::ftp::session::{AuthResult, FtpSession, OpResult, Operation, TransferMode, TransferType};
use crate::ftp::tls as ftp_tls;
use crate::line_codec::LineCodec;
use crate::messages::MessageCatalog;
use crate::telemetry;
use crate::Transport;
use bytes::BytesMut;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::Decoder;
use tracing::Span;

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

    async fn write_reply(&mut self, reply: &Reply) -> Result<(), CoreError> {
        if reply.is_none() {
            return Ok(());
        }
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

fn reply_for_error(error: &CoreError, catalog: &MessageCatalog) -> Reply {
    match error {
        CoreError::LineTooLong(_) => Reply::new(ReplyCode::CommandSyntaxError, catalog.format("ftp.line_too_long", &[])),
        CoreError::IllegalCharacters => Reply::new(ReplyCode::CommandSyntaxError, catalog.format("ftp.illegal_characters", &[])),
        _ => Reply::new(ReplyCode::ServiceNotAvailable, "connection error"),
    }
}

fn map_auth_result(result: AuthResult) -> Reply {
    match result {
        AuthResult::Success => Reply::new(ReplyCode::UserLoggedIn, "User logged in, proceed"),
        AuthResult::NeedPassword => Reply::new(ReplyCode::NeedPassword, "Password required"),
        AuthResult::NeedAccount => Reply::new(ReplyCode::NeedAccount, "Account required"),
        AuthResult::InvalidUser | AuthResult::InvalidPassword | AuthResult::InvalidAccount | AuthResult::AccountDisabled | AuthResult::AnonymousNotAllowed => {
            Reply::new(ReplyCode::NotLoggedIn, "Login incorrect")
        }
        AuthResult::TooManyAttempts | AuthResult::UserLimitExceeded => Reply::new(ReplyCode::ServiceNotAvailable, "Too many login attempts"),
    }
}

/// Fixed file-op result -> reply code table.
fn map_op_result(result: OpResult, success_code: ReplyCode, success_msg: &str) -> Reply {
    match result {
        OpResult::Success => Reply::new(success_code, success_msg),
        OpResult::TransferStarting => Reply::new(ReplyCode::FileStatusOkay, "Transfer starting"),
        OpResult::NotFound
        | OpResult::AccessDenied
        | OpResult::AlreadyExists
        | OpResult::DirectoryNotEmpty
        | OpResult::FileSystemError
        | OpResult::FileLocked
        | OpResult::IsDirectory
        | OpResult::IsFile => Reply::new(ReplyCode::FileError, "Requested action not taken"),
        OpResult::InsufficientSpace | OpResult::QuotaExceeded => Reply::new(ReplyCode::ExceededStorageAllocation, "Insufficient storage space"),
        OpResult::InvalidName => Reply::new(ReplyCode::BadFileName, "Invalid file name"),
        OpResult::NotSupported => Reply::new(ReplyCode::CommandNotImplemented, "Not supported"),
        OpResult::RenamePending => Reply::new(ReplyCode::FileActionPending, "Rename pending, send RNTO"),
    }
}

fn feat_reply(tls_configured: bool, secure: bool) -> Reply {
    let mut lines: Vec<&str> = vec![" EPRT", " EPSV", " UTF8", " SIZE", " MDTM", " REST STREAM", " TVFS"];
    if tls_configured && !secure {
        lines.push(" AUTH TLS");
        lines.push(" AUTH SSL");
    }
    if secure {
        lines.push(" PBSZ");
        lines.push(" PROT");
    }
    lines.sort();
    let mut body: Vec<String> = vec!["Extensions supported:".to_string()];
    body.extend(lines.into_iter().map(str::to_string));
    body.push("End".to_string());
    Reply::multiline(ReplyCode::SystemStatus, body)
}

/// Drives one FTP control connection end to end: greeting, command loop,
/// teardown. Cancel-safe with respect to data transfers (`ABOR`).
pub async fn run_session(
    transport: Transport,
    handler: Arc<dyn FtpHandler>,
    tls_acceptor: Option<tokio_rustls::TlsAcceptor>,
    config: &FtpServerConfig,
    catalog: Arc<MessageCatalog>,
    client_addr: SocketAddr,
    server_addr: SocketAddr,
) -> Result<(), CoreError> {
    let span = telemetry::session_span("ftp", client_addr);
    let _enter = span.enter();

    let mut session = FtpSession::new();
    let mut coordinator = FtpDataConnectionCoordinator::new();
    let mut metadata = FtpConnectionMetadata::new(client_addr, server_addr);
    metadata.secure = transport.is_secure();
    metadata.tls = transport.tls_snapshot();

    let mut conn = Connection::new(transport, config.max_line_length);

    let greeting = handler.connected(&metadata).await.unwrap_or_else(|| "Service ready".to_string());
    conn.write_reply(&Reply::new(ReplyCode::ServiceReady, greeting)).await?;

    'session: loop {
        let line = match conn.read_line().await? {
            None => break 'session,
            Some(Err(e)) => {
                telemetry::emit_error_event!(e.category(), "ftp line framing error");
                conn.write_reply(&reply_for_error(&e, &catalog)).await?;
                continue;
            }
            Some(Ok(line)) => line,
        };

        let parsed = parse_command(&line);

        if !session.authenticated && !FtpSession::allowed_before_auth(&parsed.verb) {
            conn.write_reply(&Reply::new(ReplyCode::NotLoggedIn, catalog.format("ftp.not_authenticated", &[]))).await?;
            continue;
        }

        if FILE_AND_NAV_COMMANDS.contains(&parsed.verb.as_str()) {
            let op = operation_for(&parsed.verb);
            if !handler.is_authorized(op, parsed.arg.as_deref().unwrap_or(""), &metadata).await {
                conn.write_reply(&Reply::new(ReplyCode::FileError, catalog.format("ftp.permission_denied", &[]))).await?;
                continue;
            }
        }

        let outcome = dispatch_one(
            &parsed.verb,
            parsed.arg.as_deref(),
            &mut session,
            &mut coordinator,
            &handler,
            &mut metadata,
            tls_acceptor.as_ref(),
            &catalog,
            config,
            &span,
        )
        .await;

        match outcome {
            Outcome::Reply(reply) => {
                conn.write_reply(&reply).await?;
            }
            Outcome::StartTls(reply) => {
                conn.write_reply(&reply).await?;
                if let Some(acceptor) = tls_acceptor.as_ref() {
                    conn.upgrade_tls(acceptor).await?;
                    metadata.secure = true;
                    metadata.tls = conn.transport_mut().tls_snapshot();
                    telemetry::record_secure(&span, true);
                }
            }
            Outcome::Quit(reply) => {
                conn.write_reply(&reply).await?;
                break 'session;
            }
            Outcome::Transfer(reply, handle) => {
                conn.write_reply(&reply).await?;
                let mut handle = handle;
                let mut abort_requested = false;
                let final_reply = loop {
                    tokio::select! {
                        result = &mut handle.done => {
                            let outcome = result.unwrap_or(crate::ftp::data::TransferOutcome { bytes: 0, success: false });
                            break if abort_requested {
                                Reply::new(ReplyCode::DataConnectionOpen, "ABOR command successful")
                            } else if outcome.success {
                                Reply::new(ReplyCode::ClosingDataConnection, "Transfer complete")
                            } else {
                                Reply::new(ReplyCode::FileError, "Transfer failed")
                            };
                        }
                        next_line = conn.read_line() => {
                            match next_line {
                                Ok(Some(Ok(line))) => {
                                    let parsed = parse_command(&line);
                                    if parsed.verb == "ABOR" {
                                        abort_requested = true;
                                        handle.request_abort();
                                    } else {
                                        conn.write_reply(&Reply::new(ReplyCode::BadCommandSequence, "Command not allowed during transfer")).await?;
                                    }
                                }
                                Ok(Some(Err(_))) | Ok(None) => {
                                    abort_requested = true;
                                    handle.request_abort();
                                }
                                Err(_) => {
                                    abort_requested = true;
                                    handle.request_abort();
                                }
                            }
                        }
                    }
                };
                coordinator.cleanup().await;
                conn.write_reply(&final_reply).await?;
            }
        }
    }

    // Teardown order: telemetry -> coordinator -> handler -> transport.
    drop(_enter);
    coordinator.cleanup().await;
    handler.disconnected(&metadata).await;
    Ok(())
}

fn operation_for(verb: &str) -> Operation {
    match verb {
        "RETR" | "LIST" | "NLST" | "STAT" => Operation::Read,
        "STOR" | "STOU" | "APPE" | "ALLO" | "REST" => Operation::Write,
        "DELE" => Operation::Delete,
        "RMD" => Operation::DeleteDir,
        "MKD" => Operation::CreateDir,
        "RNFR" | "RNTO" => Operation::Rename,
        "CWD" | "CDUP" | "PWD" => Operation::Navigate,
        "SITE" => Operation::SiteCommand,
        _ => Operation::Navigate,
    }
}

enum Outcome {
    Reply(Reply),
    StartTls(Reply),
    Quit(Reply),
    Transfer(Reply, crate::ftp::data::TransferHandle),
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_one(
    verb: &str,
    arg: Option<&str>,
    session: &mut FtpSession,
    coordinator: &mut FtpDataConnectionCoordinator,
    handler: &Arc<dyn FtpHandler>,
    metadata: &mut FtpConnectionMetadata,
    tls_acceptor: Option<&tokio_rustls::TlsAcceptor>,
    catalog: &MessageCatalog,
    config: &FtpServerConfig,
    span: &Span,
) -> Outcome {
    match verb {
        "USER" => {
            let Some(user) = arg else {
                return Outcome::Reply(Reply::new(ReplyCode::ParameterSyntaxError, "USER requires a username"));
            };
            session.user = Some(user.to_string());
            session.password = None;
            session.account = None;
            session.authenticated = false;
            let result = handler.authenticate(user, None, None, metadata).await;
            if result == AuthResult::Success {
                session.authenticated = true;
                metadata.user = Some(user.to_string());
                telemetry::record_authenticated(span, user);
            }
            Outcome::Reply(map_auth_result(result))
        }
        "PASS" => {
            let Some(user) = session.user.clone() else {
                return Outcome::Reply(Reply::new(ReplyCode::BadCommandSequence, "Login with USER first"));
            };
            session.password = arg.map(str::to_string);
            let result = handler.authenticate(&user, arg, None, metadata).await;
            if result == AuthResult::Success {
                session.authenticated = true;
                metadata.user = Some(user.clone());
                telemetry::record_authenticated(span, &user);
            }
            Outcome::Reply(map_auth_result(result))
        }
        "ACCT" => {
            let Some(user) = session.user.clone() else {
                return Outcome::Reply(Reply::new(ReplyCode::BadCommandSequence, "Login with USER first"));
            };
            session.account = arg.map(str::to_string);
            let result = handler.authenticate(&user, session.password.as_deref(), arg, metadata).await;
            if result == AuthResult::Success {
                session.authenticated = true;
                metadata.user = Some(user.clone());
                telemetry::record_authenticated(span, &user);
            }
            Outcome::Reply(map_auth_result(result))
        }
        "QUIT" => Outcome::Quit(Reply::new(ReplyCode::ClosingControlConnection, "Goodbye")),
        "NOOP" => Outcome::Reply(Reply::new(ReplyCode::CommandOkay, "NOOP ok")),
        "HELP" => Outcome::Reply(Reply::new(ReplyCode::HelpMessage, "Help not available")),
        "SYST" => Outcome::Reply(Reply::new(ReplyCode::SystemType, "UNIX Type: L8")),
        "FEAT" => Outcome::Reply(feat_reply(tls_acceptor.is_some(), metadata.secure)),

        "PWD" => {
            let fs = handler.get_file_system(metadata).await;
            let path = fs.pwd().await;
            Outcome::Reply(Reply::new(ReplyCode::DirCreated, format!("\"{path}\" is the current directory")))
        }
        "CWD" => {
            let Some(path) = arg else {
                return Outcome::Reply(Reply::new(ReplyCode::ParameterSyntaxError, "CWD requires a path"));
            };
            let fs = handler.get_file_system(metadata).await;
            let result = fs.cwd(path).await;
            if result == OpResult::Success {
                session.current_directory = path.to_string();
                metadata.current_directory = path.to_string();
            }
            Outcome::Reply(map_op_result(result, ReplyCode::FileActionOkay, "Directory changed"))
        }
        "CDUP" => {
            let fs = handler.get_file_system(metadata).await;
            let result = fs.cwd("..").await;
            Outcome::Reply(map_op_result(result, ReplyCode::FileActionOkay, "Directory changed"))
        }
        "MKD" => {
            let Some(path) = arg else {
                return Outcome::Reply(Reply::new(ReplyCode::ParameterSyntaxError, "MKD requires a path"));
            };
            let fs = handler.get_file_system(metadata).await;
            let result = fs.mkd(path).await;
            Outcome::Reply(map_op_result(result, ReplyCode::DirCreated, &format!("\"{path}\" created")))
        }
        "RMD" => {
            let Some(path) = arg else {
                return Outcome::Reply(Reply::new(ReplyCode::ParameterSyntaxError, "RMD requires a path"));
            };
            let fs = handler.get_file_system(metadata).await;
            let result = fs.rmd(path).await;
            Outcome::Reply(map_op_result(result, ReplyCode::FileActionOkay, "Directory removed"))
        }
        "DELE" => {
            let Some(path) = arg else {
                return Outcome::Reply(Reply::new(ReplyCode::ParameterSyntaxError, "DELE requires a path"));
            };
            let fs = handler.get_file_system(metadata).await;
            let result = fs.dele(path).await;
            Outcome::Reply(map_op_result(result, ReplyCode::FileActionOkay, "File deleted"))
        }
        "RNFR" => {
            let Some(path) = arg else {
                return Outcome::Reply(Reply::new(ReplyCode::ParameterSyntaxError, "RNFR requires a path"));
            };
            session.rename_from = Some(path.to_string());
            Outcome::Reply(Reply::new(ReplyCode::FileActionPending, "Ready for RNTO"))
        }
        "RNTO" => {
            let Some(from) = session.rename_from.take() else {
                return Outcome::Reply(Reply::new(ReplyCode::BadCommandSequence, catalog.format("ftp.rename_from_required", &[])));
            };
            let Some(to) = arg else {
                return Outcome::Reply(Reply::new(ReplyCode::ParameterSyntaxError, "RNTO requires a path"));
            };
            let fs = handler.get_file_system(metadata).await;
            let result = fs.rename(&from, to).await;
            Outcome::Reply(map_op_result(result, ReplyCode::FileActionOkay, "Renamed"))
        }

        "TYPE" => {
            let arg = arg.unwrap_or("").trim().to_uppercase();
            let mut parts = arg.split_whitespace();
            match parts.next() {
                Some("A") => {
                    session.transfer_type = TransferType::Ascii;
                    metadata.transfer_type = TransferType::Ascii;
                    Outcome::Reply(Reply::new(ReplyCode::CommandOkay, "Type set to A"))
                }
                Some("I") => {
                    session.transfer_type = TransferType::Binary;
                    metadata.transfer_type = TransferType::Binary;
                    Outcome::Reply(Reply::new(ReplyCode::CommandOkay, "Type set to I"))
                }
                Some("E") => {
                    session.transfer_type = TransferType::Ebcdic;
                    metadata.transfer_type = TransferType::Ebcdic;
                    Outcome::Reply(Reply::new(ReplyCode::CommandOkay, "Type set to E"))
                }
                Some("L") => {
                    session.transfer_type = TransferType::Local;
                    metadata.transfer_type = TransferType::Local;
                    Outcome::Reply(Reply::new(ReplyCode::CommandOkay, "Type set to L"))
                }
                _ => Outcome::Reply(Reply::new(ReplyCode::ParameterSyntaxError, "unsupported TYPE parameter")),
            }
        }
        "STRU" => match arg.unwrap_or("").trim().to_uppercase().as_str() {
            "F" => Outcome::Reply(Reply::new(ReplyCode::CommandOkay, "Structure set to F")),
            _ => Outcome::Reply(Reply::new(ReplyCode::CommandNotImplementedForParameter, "only file structure is supported")),
        },
        "MODE" => match arg.unwrap_or("").trim().to_uppercase().as_str() {
            "S" => {
                session.transfer_mode = TransferMode::Stream;
                metadata.transfer_mode = TransferMode::Stream;
                Outcome::Reply(Reply::new(ReplyCode::CommandOkay, "Mode set to S"))
            }
            _ => Outcome::Reply(Reply::new(ReplyCode::CommandNotImplementedForParameter, "only stream mode is supported")),
        },
        "ALLO" => Outcome::Reply(Reply::new(ReplyCode::CommandOkay, "ALLO ok")),
        "REST" => match arg.unwrap_or("").trim().parse::<u64>() {
            Ok(offset) => {
                session.restart_offset = offset;
                Outcome::Reply(Reply::new(ReplyCode::FileActionPending, format!("Restarting at {offset}")))
            }
            Err(_) => Outcome::Reply(Reply::new(ReplyCode::ParameterSyntaxError, "REST requires a numeric offset")),
        },

        "PORT" => {
            if session.epsv_all_mode {
                return Outcome::Reply(Reply::new(ReplyCode::ProtocolNotSupported, catalog.format("ftp.epsv_all_latched", &[])));
            }
            let Some((host, port)) = arg.and_then(parse_port_arg) else {
                return Outcome::Reply(Reply::new(ReplyCode::ParameterSyntaxError, "invalid PORT argument"));
            };
            coordinator.enter_active(host, port).await;
            Outcome::Reply(Reply::new(ReplyCode::CommandOkay, "PORT command successful"))
        }
        "EPRT" => {
            if session.epsv_all_mode {
                return Outcome::Reply(Reply::new(ReplyCode::ProtocolNotSupported, catalog.format("ftp.epsv_all_latched", &[])));
            }
            let Some((host, port)) = arg.and_then(parse_eprt_arg) else {
                return Outcome::Reply(Reply::new(ReplyCode::ParameterSyntaxError, "invalid EPRT argument"));
            };
            coordinator.enter_active(host, port).await;
            Outcome::Reply(Reply::new(ReplyCode::CommandOkay, "EPRT command successful"))
        }
        "PASV" => {
            if session.epsv_all_mode {
                return Outcome::Reply(Reply::new(ReplyCode::ProtocolNotSupported, catalog.format("ftp.epsv_all_latched", &[])));
            }
            let bind_ip = metadata.server_addr.ip();
            match coordinator.enter_passive_in_range(bind_ip, config.passive_ports.clone()).await {
                Ok(_) => {
                    let IpAddr::V4(ipv4) = bind_ip else {
                        return Outcome::Reply(Reply::new(ReplyCode::ServiceNotAvailable, "PASV requires an IPv4 control connection"));
                    };
                    let body = coordinator.generate_passive_response(ipv4).expect("just entered passive mode");
                    Outcome::Reply(Reply::new(ReplyCode::EnteringPassiveMode, format!("Entering Passive Mode ({body})")))
                }
                Err(_) => Outcome::Reply(Reply::new(ReplyCode::FileError, "could not open passive listener")),
            }
        }
        "EPSV" => {
            if arg.map(|a| a.eq_ignore_ascii_case("ALL")).unwrap_or(false) {
                session.epsv_all_mode = true;
                return Outcome::Reply(Reply::new(ReplyCode::CommandOkay, "EPSV ALL ok"));
            }
            let bind_ip = metadata.server_addr.ip();
            match coordinator.enter_passive_in_range(bind_ip, config.passive_ports.clone()).await {
                Ok(_) => {
                    let body = coordinator.generate_epsv_response().expect("just entered passive mode");
                    Outcome::Reply(Reply::new(ReplyCode::EnteringExtendedPassiveMode, format!("Entering Extended Passive Mode {body}")))
                }
                Err(_) => Outcome::Reply(Reply::new(ReplyCode::FileError, "could not open passive listener")),
            }
        }

        "RETR" => begin_transfer(TransferKind::Download, arg, session, coordinator, handler, metadata, tls_acceptor, catalog).await,
        "STOR" => begin_upload(TransferKind::Upload, false, arg, session, coordinator, handler, metadata, tls_acceptor, catalog).await,
        "APPE" => begin_upload(TransferKind::Upload, true, arg, session, coordinator, handler, metadata, tls_acceptor, catalog).await,
        "STOU" => begin_upload(TransferKind::StoreUnique, false, arg, session, coordinator, handler, metadata, tls_acceptor, catalog).await,
        "LIST" => begin_transfer(TransferKind::Listing, arg, session, coordinator, handler, metadata, tls_acceptor, catalog).await,
        "NLST" => begin_transfer(TransferKind::Listing, arg, session, coordinator, handler, metadata, tls_acceptor, catalog).await,

        "ABOR" => Outcome::Reply(Reply::new(ReplyCode::DataConnectionOpen, "ABOR command successful, no transfer in progress")),

        "AUTH" => {
            let outcome = ftp_tls::handle_auth(session, arg, metadata.secure, tls_acceptor.is_some(), catalog);
            if outcome.start_tls {
                Outcome::StartTls(outcome.reply)
            } else {
                Outcome::Reply(outcome.reply)
            }
        }
        "PBSZ" => Outcome::Reply(ftp_tls::handle_pbsz(session, arg, metadata.secure, catalog)),
        "PROT" => Outcome::Reply(ftp_tls::handle_prot(session, arg, metadata.secure, catalog)),
        "CCC" => Outcome::Reply(ftp_tls::handle_ccc(catalog)),

        "SITE" => dispatch_site(arg, handler, metadata).await,
        "STAT" => {
            let fs = handler.get_file_system(metadata).await;
            let pwd = fs.pwd().await;
            Outcome::Reply(Reply::multiline(ReplyCode::SystemStatus, ["FTP server status:".to_string(), format!(" Logged in, cwd={pwd}"), "End of status".to_string()]))
        }
        "SMNT" | "REIN" => Outcome::Reply(Reply::new(ReplyCode::CommandNotImplemented, "command not implemented")),

        _ => Outcome::Reply(Reply::new(ReplyCode::CommandSyntaxError, catalog.format("ftp.command_unrecognized", &[verb]))),
    }
}

async fn dispatch_site(arg: Option<&str>, handler: &Arc<dyn FtpHandler>, metadata: &mut FtpConnectionMetadata) -> Outcome {
    let arg = arg.unwrap_or("");
    let mut parts = arg.splitn(2, ' ');
    let sub = parts.next().unwrap_or("").to_uppercase();
    let rest = parts.next().unwrap_or("").trim();
    match sub.as_str() {
        "QUOTA" => {
            let Some(quota_manager) = handler.quota_manager() else {
                return Outcome::Reply(Reply::new(ReplyCode::CommandNotImplemented, "quota management not configured"));
            };
            let is_admin = handler.is_admin(metadata).await;
            let target = if is_admin && !rest.is_empty() {
                rest.to_string()
            } else {
                metadata.user.clone().unwrap_or_default()
            };
            Outcome::Reply(quota::site_quota(&target, quota_manager.as_ref()).await)
        }
        "SETQUOTA" => {
            let Some(quota_manager) = handler.quota_manager() else {
                return Outcome::Reply(Reply::new(ReplyCode::CommandNotImplemented, "quota management not configured"));
            };
            if !handler.is_admin(metadata).await {
                return Outcome::Reply(Reply::new(ReplyCode::FileError, "permission denied"));
            }
            Outcome::Reply(quota::site_setquota(rest, quota_manager.as_ref()).await)
        }
        _ => {
            let result = handler.handle_site_command(arg, metadata).await;
            let reply = match result {
                OpResult::Success => Reply::new(ReplyCode::CommandOkay, metadata.site_response.take().unwrap_or_else(|| "SITE command successful".to_string())),
                other => map_op_result(other, ReplyCode::CommandOkay, "SITE command successful"),
            };
            Outcome::Reply(reply)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn begin_transfer(
    kind: TransferKind,
    arg: Option<&str>,
    session: &mut FtpSession,
    coordinator: &mut FtpDataConnectionCoordinator,
    handler: &Arc<dyn FtpHandler>,
    metadata: &mut FtpConnectionMetadata,
    tls_acceptor: Option<&tokio_rustls::TlsAcceptor>,
    _catalog: &MessageCatalog,
) -> Outcome {
    if !coordinator.has_mode() {
        return Outcome::Reply(Reply::new(ReplyCode::BadCommandSequence, "use PORT/PASV/EPRT/EPSV first"));
    }
    let path = arg.unwrap_or(&session.current_directory).to_string();
    let restart_offset = session.take_restart_offset();
    let pending = PendingTransfer {
        kind,
        path,
        append: false,
        restart_offset,
    };
    if let Err(e) = coordinator.set_pending(pending) {
        return Outcome::Reply(Reply::new(ReplyCode::BadCommandSequence, e.to_string()));
    }
    let fs = handler.get_file_system(metadata).await;
    match coordinator.start_transfer(handler.clone(), fs, metadata.clone(), session.transfer_type, tls_acceptor.cloned(), session.data_protection) {
        Ok(handle) => Outcome::Transfer(Reply::new(ReplyCode::FileStatusOkay, "Opening data connection"), handle),
        Err(e) => Outcome::Reply(Reply::new(ReplyCode::FileError, e.to_string())),
    }
}

#[allow(clippy::too_many_arguments)]
async fn begin_upload(
    kind: TransferKind,
    append: bool,
    arg: Option<&str>,
    session: &mut FtpSession,
    coordinator: &mut FtpDataConnectionCoordinator,
    handler: &Arc<dyn FtpHandler>,
    metadata: &mut FtpConnectionMetadata,
    tls_acceptor: Option<&tokio_rustls::TlsAcceptor>,
    catalog: &MessageCatalog,
) -> Outcome {
    if !coordinator.has_mode() {
        return Outcome::Reply(Reply::new(ReplyCode::BadCommandSequence, "use PORT/PASV/EPRT/EPSV first"));
    }
    let user = metadata.user.clone().unwrap_or_default();
    if let Some(reply) = quota::check_upload_quota(&user, 0, handler.quota_manager().as_deref()).await {
        return Outcome::Reply(reply);
    }
    let _ = catalog;
    let path = arg.unwrap_or("").to_string();
    let restart_offset = session.take_restart_offset();
    let pending = PendingTransfer {
        kind,
        path,
        append,
        restart_offset,
    };
    if let Err(e) = coordinator.set_pending(pending) {
        return Outcome::Reply(Reply::new(ReplyCode::BadCommandSequence, e.to_string()));
    }
    let fs = handler.get_file_system(metadata).await;
    match coordinator.start_transfer(handler.clone(), fs, metadata.clone(), session.transfer_type, tls_acceptor.cloned(), session.data_protection) {
        Ok(handle) => Outcome::Transfer(Reply::new(ReplyCode::FileStatusOkay, "Ready to receive data"), handle),
        Err(e) => Outcome::Reply(Reply::new(ReplyCode::FileError, e.to_string())),
    }
}
