//! Shared test fixtures: a line-oriented control-connection client, fake
//! `FtpHandler`/`FileSystem`/`QuotaManager` implementations, and fake staged
//! IMAP handlers, all driving the real session cores over loopback TCP.
//!
//! `Transport` only wraps `TcpStream`/`TlsStream<TcpStream>` (it isn't
//! generic over arbitrary `AsyncRead`/`AsyncWrite` pairs), so every test
//! here dials real `127.0.0.1` sockets for both the control channel and,
//! where relevant, the FTP data channel.

#![allow(dead_code)]

use async_trait::async_trait;
use protocol_server_core::ftp::{
    AuthResult, FileSystem, FtpConnectionMetadata, FtpFileInfo, FtpHandler, FtpServerConfig, OpResult, QuotaManager, QuotaSource, QuotaUsage,
};
use protocol_server_core::imap::{
    AppendCompleteOutcome, AppendDataHandler, AppendOutcome, AuthenticateOutcome, AuthenticatedHandler, CloseOutcome, ConnectedHandler, ConnectedOutcome,
    CopyOutcome, ExpungeOutcome, FetchOutcome, FetchedMessage, FlagSet, ImapConnectionMetadata, ImapServerConfig, ListOutcome, MailboxListEntry,
    MailboxOpOutcome, MailboxOpResult, MoveOutcome, QuotaOutcome, QuotaRootOutcome, QuotaUsage as ImapQuotaUsage, Realm, SearchOutcome, SelectOutcome,
    SelectedHandler, StatusItem, StatusOutcome, StoreMode, StoreOutcome,
};
use protocol_server_core::{MessageCatalog, Transport};
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Join, ReadBuf, ReadHalf, WriteHalf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::client::TlsStream as ClientTlsStream;

// ---------------------------------------------------------------------
// Control-connection client
// ---------------------------------------------------------------------

pub struct ControlClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl ControlClient {
    pub fn new(stream: TcpStream) -> Self {
        let (r, w) = stream.into_split();
        ControlClient {
            reader: BufReader::new(r),
            writer: w,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    pub async fn recv_line(&mut self) -> String {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await.unwrap();
        assert!(n > 0, "connection closed while a reply was expected");
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    /// Reads a multi-line reply sharing one numeric code: every line but the
    /// last uses `CODE-`, the last uses `CODE ` (FTP FEAT/STAT, IMAP
    /// untagged-then-tagged groups with a matching prefix are read with
    /// [`ControlClient::recv_until_tagged`] instead).
    pub async fn recv_multiline(&mut self, code: &str) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.recv_line().await;
            let is_final = line.starts_with(&format!("{code} "));
            let is_continuation = line.starts_with(&format!("{code}-"));
            assert!(is_final || is_continuation, "unexpected multiline reply line: {line}");
            lines.push(line);
            if is_final {
                break;
            }
        }
        lines
    }

    /// Reads IMAP untagged `*` lines until the tagged completion line for
    /// `tag` arrives, returning `(untagged_lines, tagged_line)`.
    pub async fn recv_until_tagged(&mut self, tag: &str) -> (Vec<String>, String) {
        let mut untagged = Vec::new();
        loop {
            let line = self.recv_line().await;
            if line.starts_with(&format!("{tag} ")) {
                return (untagged, line);
            }
            untagged.push(line);
        }
    }

    fn into_parts(self) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
        (self.reader, self.writer)
    }
}

/// A plain control connection is two independently-split halves, which
/// [`tokio_rustls::TlsConnector::connect`] can't take directly (it wants a
/// single `AsyncRead + AsyncWrite` stream); `tokio::io::join` glues them
/// back into one before the handshake.
type JoinedPlain = Join<BufReader<OwnedReadHalf>, OwnedWriteHalf>;

/// Drives commands over a client-side TLS connection established mid-session
/// (FTP `AUTH TLS`, IMAP `STARTTLS`). Same line-oriented protocol as
/// [`ControlClient`], just layered on the upgraded stream.
pub struct TlsControlClient {
    reader: BufReader<ReadHalf<ClientTlsStream<JoinedPlain>>>,
    writer: WriteHalf<ClientTlsStream<JoinedPlain>>,
}

impl TlsControlClient {
    pub async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
    }

    pub async fn recv_line(&mut self) -> String {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await.unwrap();
        assert!(n > 0, "connection closed while a reply was expected");
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    pub async fn recv_multiline(&mut self, code: &str) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.recv_line().await;
            let is_final = line.starts_with(&format!("{code} "));
            let is_continuation = line.starts_with(&format!("{code}-"));
            assert!(is_final || is_continuation, "unexpected multiline reply line: {line}");
            lines.push(line);
            if is_final {
                break;
            }
        }
        lines
    }

    pub async fn recv_until_tagged(&mut self, tag: &str) -> (Vec<String>, String) {
        let mut untagged = Vec::new();
        loop {
            let line = self.recv_line().await;
            if line.starts_with(&format!("{tag} ")) {
                return (untagged, line);
            }
            untagged.push(line);
        }
    }
}

/// Upgrades a plain [`ControlClient`] to TLS using the client half of a
/// [`build_test_tls`] pair, consuming it the way the real client-side of
/// `AUTH TLS`/`STARTTLS` does once the server's reply clears it to proceed.
pub async fn upgrade_client_tls(client: ControlClient, client_config: Arc<rustls::ClientConfig>) -> TlsControlClient {
    let (reader, writer) = client.into_parts();
    let joined = tokio::io::join(reader, writer);
    let connector = tokio_rustls::TlsConnector::from(client_config);
    let domain = rustls::pki_types::ServerName::try_from("127.0.0.1").unwrap();
    let tls_stream = connector.connect(domain, joined).await.expect("client TLS handshake");
    let (r, w) = tokio::io::split(tls_stream);
    TlsControlClient {
        reader: BufReader::new(r),
        writer: w,
    }
}

// ---------------------------------------------------------------------
// Session spawning helpers
// ---------------------------------------------------------------------

async fn loopback_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (accepted, connected) = tokio::join!(listener.accept(), TcpStream::connect(addr));
    (accepted.unwrap().0, connected.unwrap())
}

pub async fn spawn_ftp(handler: Arc<dyn FtpHandler>) -> ControlClient {
    spawn_ftp_with_config(handler, FtpServerConfig::default()).await
}

pub async fn spawn_ftp_with_config(handler: Arc<dyn FtpHandler>, config: FtpServerConfig) -> ControlClient {
    let (server_stream, client_stream) = loopback_pair().await;
    let server_addr = server_stream.local_addr().unwrap();
    let peer_addr = server_stream.peer_addr().unwrap();
    tokio::spawn(async move {
        let catalog = Arc::new(MessageCatalog::default());
        let _ = protocol_server_core::ftp::run_session(Transport::Plain(server_stream), handler, None, &config, catalog, peer_addr, server_addr).await;
    });
    ControlClient::new(client_stream)
}

pub async fn spawn_ftp_with_tls(handler: Arc<dyn FtpHandler>, acceptor: tokio_rustls::TlsAcceptor) -> ControlClient {
    let config = FtpServerConfig::default();
    let (server_stream, client_stream) = loopback_pair().await;
    let server_addr = server_stream.local_addr().unwrap();
    let peer_addr = server_stream.peer_addr().unwrap();
    tokio::spawn(async move {
        let catalog = Arc::new(MessageCatalog::default());
        let _ = protocol_server_core::ftp::run_session(Transport::Plain(server_stream), handler, Some(acceptor), &config, catalog, peer_addr, server_addr).await;
    });
    ControlClient::new(client_stream)
}

pub async fn spawn_imap(connected: Arc<dyn ConnectedHandler>, realm: Arc<dyn Realm>) -> ControlClient {
    let mut config = ImapServerConfig::default();
    config.allow_plaintext_login = true;
    spawn_imap_with(connected, realm, config, None).await
}

pub async fn spawn_imap_with(
    connected: Arc<dyn ConnectedHandler>,
    realm: Arc<dyn Realm>,
    config: ImapServerConfig,
    acceptor: Option<tokio_rustls::TlsAcceptor>,
) -> ControlClient {
    let (server_stream, client_stream) = loopback_pair().await;
    let server_addr = server_stream.local_addr().unwrap();
    let peer_addr = server_stream.peer_addr().unwrap();
    tokio::spawn(async move {
        let catalog = Arc::new(MessageCatalog::default());
        let _ = protocol_server_core::imap::run_session(Transport::Plain(server_stream), connected, realm, acceptor, &config, catalog, peer_addr, server_addr).await;
    });
    ControlClient::new(client_stream)
}

/// A self-signed-cert `TlsAcceptor` for `127.0.0.1`, plus a matching
/// rustls client config with certificate verification disabled (test-only:
/// there is no CA, so the client must be told to trust the one cert it
/// expects instead).
pub fn build_test_tls() -> (tokio_rustls::TlsAcceptor, Arc<rustls::ClientConfig>) {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cert = rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string()]).expect("generate self-signed cert");
    let cert_der = cert.cert.der().clone();
    let key_der = rustls::pki_types::PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der.clone()], key_der.into())
        .expect("build server TLS config");
    let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(server_config));

    let mut roots = rustls::RootCertStore::empty();
    roots.add(cert_der).expect("add self-signed cert to trust root");
    let client_config = rustls::ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();

    (acceptor, Arc::new(client_config))
}

// ---------------------------------------------------------------------
// In-memory async byte sink, backing `FileSystem::open_write`
// ---------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct CapturingWriter(pub Arc<Mutex<Vec<u8>>>);

impl AsyncWrite for CapturingWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }
    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

// tokio has no blanket `AsyncRead` for `std::io::Cursor`, so a minimal
// wrapper stands in for a file opened for reading.
pub struct CursorReader(pub io::Cursor<Vec<u8>>);

impl AsyncRead for CursorReader {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let n = io::Read::read(&mut self.0, buf.initialize_unfilled()).unwrap_or(0);
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

// ---------------------------------------------------------------------
// FTP fakes
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct FakeFileSystem {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub cwd: Mutex<String>,
    pub listing: Mutex<Vec<FtpFileInfo>>,
    pub uploads: Mutex<HashMap<String, Arc<Mutex<Vec<u8>>>>>,
    pub renames: Mutex<Vec<(String, String)>>,
    pub last_read_offset: Mutex<Option<u64>>,
    pub unique_name: Mutex<String>,
}

impl FakeFileSystem {
    pub fn new() -> Self {
        let fs = FakeFileSystem::default();
        *fs.cwd.lock().unwrap() = "/".to_string();
        *fs.unique_name.lock().unwrap() = "unique-1.bin".to_string();
        fs
    }

    pub fn put(&self, path: &str, bytes: &[u8]) {
        self.files.lock().unwrap().insert(path.to_string(), bytes.to_vec());
    }

    pub fn uploaded(&self, path: &str) -> Option<Vec<u8>> {
        self.uploads.lock().unwrap().get(path).map(|buf| buf.lock().unwrap().clone())
    }
}

#[async_trait]
impl FileSystem for FakeFileSystem {
    async fn open_read(&self, path: &str, offset: u64) -> io::Result<Box<dyn AsyncRead + Unpin + Send>> {
        *self.last_read_offset.lock().unwrap() = Some(offset);
        let files = self.files.lock().unwrap();
        let Some(bytes) = files.get(path) else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        };
        let start = (offset as usize).min(bytes.len());
        Ok(Box::new(CursorReader(io::Cursor::new(bytes[start..].to_vec()))))
    }

    async fn open_write(&self, path: &str, append: bool) -> io::Result<Box<dyn AsyncWrite + Unpin + Send>> {
        let existing = if append { self.files.lock().unwrap().get(path).cloned().unwrap_or_default() } else { Vec::new() };
        let buf = Arc::new(Mutex::new(existing));
        self.uploads.lock().unwrap().insert(path.to_string(), buf.clone());
        Ok(Box::new(CapturingWriter(buf)))
    }

    async fn generate_unique_name(&self, directory: &str) -> io::Result<String> {
        Ok(format!("{directory}/{}", self.unique_name.lock().unwrap()))
    }

    async fn list(&self, _path: &str) -> io::Result<Vec<FtpFileInfo>> {
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn cwd(&self, path: &str) -> OpResult {
        *self.cwd.lock().unwrap() = path.to_string();
        OpResult::Success
    }

    async fn pwd(&self) -> String {
        self.cwd.lock().unwrap().clone()
    }

    async fn mkd(&self, _path: &str) -> OpResult {
        OpResult::Success
    }

    async fn rmd(&self, _path: &str) -> OpResult {
        OpResult::Success
    }

    async fn dele(&self, _path: &str) -> OpResult {
        OpResult::Success
    }

    async fn rename(&self, from: &str, to: &str) -> OpResult {
        self.renames.lock().unwrap().push((from.to_string(), to.to_string()));
        OpResult::Success
    }
}

pub struct FakeQuotaManager {
    pub allow: bool,
    pub usage: QuotaUsage,
}

impl FakeQuotaManager {
    pub fn unlimited() -> Self {
        FakeQuotaManager {
            allow: true,
            usage: QuotaUsage {
                used: 0,
                limit: None,
                source: QuotaSource::User,
            },
        }
    }

    pub fn exhausted(used: u64, limit: u64) -> Self {
        FakeQuotaManager {
            allow: false,
            usage: QuotaUsage {
                used,
                limit: Some(limit),
                source: QuotaSource::User,
            },
        }
    }
}

#[async_trait]
impl QuotaManager for FakeQuotaManager {
    async fn can_store(&self, _user: &str, _additional: u64) -> bool {
        self.allow
    }
    async fn usage(&self, _user: &str) -> QuotaUsage {
        self.usage.clone()
    }
    async fn set_user_quota(&self, _user: &str, _limit: Option<u64>) -> Result<(), String> {
        Ok(())
    }
}

pub struct FakeFtpHandler {
    pub fs: Arc<FakeFileSystem>,
    pub valid_password: Option<String>,
    pub quota: Option<Arc<dyn QuotaManager>>,
    pub authorized: bool,
    pub events: Mutex<Vec<String>>,
}

impl FakeFtpHandler {
    pub fn new(fs: Arc<FakeFileSystem>, valid_password: &str) -> Self {
        FakeFtpHandler {
            fs,
            valid_password: Some(valid_password.to_string()),
            quota: None,
            authorized: true,
            events: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FtpHandler for FakeFtpHandler {
    async fn authenticate(&self, _user: &str, password: Option<&str>, _account: Option<&str>, _metadata: &FtpConnectionMetadata) -> AuthResult {
        match password {
            None => AuthResult::NeedPassword,
            Some(p) if Some(p.to_string()) == self.valid_password => AuthResult::Success,
            Some(_) => AuthResult::InvalidPassword,
        }
    }

    async fn get_file_system(&self, _metadata: &FtpConnectionMetadata) -> Arc<dyn FileSystem> {
        self.fs.clone()
    }

    async fn transfer_starting(&self, path: &str, is_upload: bool, restart_offset: i64, _metadata: &FtpConnectionMetadata) {
        self.events.lock().unwrap().push(format!("starting:{path}:{is_upload}:{restart_offset}"));
    }

    async fn transfer_completed(&self, path: &str, is_upload: bool, bytes: u64, success: bool, _metadata: &FtpConnectionMetadata) {
        self.events.lock().unwrap().push(format!("completed:{path}:{is_upload}:{bytes}:{success}"));
    }

    async fn is_authorized(&self, _op: protocol_server_core::ftp::Operation, _path: &str, _metadata: &FtpConnectionMetadata) -> bool {
        self.authorized
    }

    fn quota_manager(&self) -> Option<Arc<dyn QuotaManager>> {
        self.quota.clone()
    }
}

// ---------------------------------------------------------------------
// IMAP fakes
// ---------------------------------------------------------------------

pub struct FakeRealm {
    pub users: HashMap<String, String>,
}

impl FakeRealm {
    pub fn single(user: &str, password: &str) -> Self {
        let mut users = HashMap::new();
        users.insert(user.to_string(), password.to_string());
        FakeRealm { users }
    }
}

#[async_trait]
impl Realm for FakeRealm {
    async fn verify_password(&self, user: &str, password: &str) -> Option<String> {
        if self.users.get(user).map(String::as_str) == Some(password) {
            Some(user.to_string())
        } else {
            None
        }
    }

    async fn verify_sasl_plain(&self, _authzid: &str, authcid: &str, password: &str) -> Option<String> {
        if self.users.get(authcid).map(String::as_str) == Some(password) {
            Some(authcid.to_string())
        } else {
            None
        }
    }
}

pub struct FakeConnectedHandler {
    pub not_authenticated: Arc<FakeNotAuthHandler>,
}

impl FakeConnectedHandler {
    pub fn new() -> Self {
        FakeConnectedHandler {
            not_authenticated: Arc::new(FakeNotAuthHandler),
        }
    }
}

#[async_trait]
impl ConnectedHandler for FakeConnectedHandler {
    async fn connected(&self, _metadata: &ImapConnectionMetadata) -> ConnectedOutcome {
        ConnectedOutcome::Accept {
            greeting: "test server ready".to_string(),
            handler: self.not_authenticated.clone(),
        }
    }
}

pub struct FakeNotAuthHandler;

#[async_trait]
impl protocol_server_core::imap::NotAuthenticatedHandler for FakeNotAuthHandler {
    async fn authenticate(&self, principal: &str, _metadata: &ImapConnectionMetadata) -> AuthenticateOutcome {
        AuthenticateOutcome::Accept {
            message: None,
            handler: Arc::new(FakeAuthHandler::new(principal)),
        }
    }
}

#[derive(Clone)]
pub struct AppendedMessage {
    pub mailbox: String,
    pub flags: FlagSet,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct MailboxState {
    pub appended: Vec<AppendedMessage>,
}

#[derive(Clone)]
pub struct FakeAuthHandler {
    pub principal: String,
    pub state: Arc<Mutex<MailboxState>>,
}

impl FakeAuthHandler {
    pub fn new(principal: &str) -> Self {
        FakeAuthHandler {
            principal: principal.to_string(),
            state: Arc::new(Mutex::new(MailboxState::default())),
        }
    }

    fn arc(&self) -> Arc<dyn AuthenticatedHandler> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl AuthenticatedHandler for FakeAuthHandler {
    async fn select(&self, mailbox: &str, read_only: bool, _metadata: &ImapConnectionMetadata) -> SelectOutcome {
        SelectOutcome::Ok {
            read_write: !read_only,
            exists: self.state.lock().unwrap().appended.len() as u32,
            recent: 0,
            uid_validity: 1,
            uid_next: 1 + self.state.lock().unwrap().appended.len() as u32,
            unseen: None,
            flags: vec!["\\Seen".to_string(), "\\Answered".to_string(), "\\Flagged".to_string(), "\\Deleted".to_string(), "\\Draft".to_string()],
            permanent_flags: vec!["\\Seen".to_string(), "\\Answered".to_string(), "\\Flagged".to_string(), "\\Deleted".to_string(), "\\*".to_string()],
            handler: Arc::new(FakeSelectedHandler {
                auth: self.clone(),
                mailbox: mailbox.to_string(),
            }),
        }
    }

    async fn create(&self, _mailbox: &str, _metadata: &ImapConnectionMetadata) -> MailboxOpOutcome {
        MailboxOpOutcome {
            result: MailboxOpResult::Ok,
            message: "CREATE completed".to_string(),
            handler: self.arc(),
        }
    }

    async fn delete(&self, _mailbox: &str, _metadata: &ImapConnectionMetadata) -> MailboxOpOutcome {
        MailboxOpOutcome {
            result: MailboxOpResult::Ok,
            message: "DELETE completed".to_string(),
            handler: self.arc(),
        }
    }

    async fn rename(&self, _from: &str, _to: &str, _metadata: &ImapConnectionMetadata) -> MailboxOpOutcome {
        MailboxOpOutcome {
            result: MailboxOpResult::Ok,
            message: "RENAME completed".to_string(),
            handler: self.arc(),
        }
    }

    async fn subscribe(&self, _mailbox: &str, _metadata: &ImapConnectionMetadata) -> MailboxOpOutcome {
        MailboxOpOutcome {
            result: MailboxOpResult::Ok,
            message: "SUBSCRIBE completed".to_string(),
            handler: self.arc(),
        }
    }

    async fn unsubscribe(&self, _mailbox: &str, _metadata: &ImapConnectionMetadata) -> MailboxOpOutcome {
        MailboxOpOutcome {
            result: MailboxOpResult::Ok,
            message: "UNSUBSCRIBE completed".to_string(),
            handler: self.arc(),
        }
    }

    async fn list(&self, _reference: &str, _pattern: &str, _metadata: &ImapConnectionMetadata) -> ListOutcome {
        ListOutcome {
            entries: vec![MailboxListEntry {
                name: "INBOX".to_string(),
                delimiter: '/',
                flags: vec![],
            }],
            handler: self.arc(),
        }
    }

    async fn lsub(&self, reference: &str, pattern: &str, metadata: &ImapConnectionMetadata) -> ListOutcome {
        self.list(reference, pattern, metadata).await
    }

    async fn status(&self, _mailbox: &str, items: &[StatusItem], _metadata: &ImapConnectionMetadata) -> StatusOutcome {
        let count = self.state.lock().unwrap().appended.len() as u64;
        let values = items
            .iter()
            .map(|item| {
                let value = match item {
                    StatusItem::Messages => count,
                    _ => 0,
                };
                (*item, value)
            })
            .collect();
        StatusOutcome {
            result: MailboxOpResult::Ok,
            message: "STATUS completed".to_string(),
            items: values,
            handler: self.arc(),
        }
    }

    async fn append(&self, mailbox: &str, flags: FlagSet, literal_size: u32, _metadata: &ImapConnectionMetadata) -> AppendOutcome {
        AppendOutcome::AcceptLiteral {
            data_handler: Arc::new(FakeAppendDataHandler {
                auth: self.clone(),
                mailbox: mailbox.to_string(),
                flags,
                buffer: Mutex::new(Vec::with_capacity(literal_size as usize)),
            }),
        }
    }

    async fn get_quota(&self, root: &str, _metadata: &ImapConnectionMetadata) -> QuotaOutcome {
        QuotaOutcome {
            usage: Some(ImapQuotaUsage {
                root: root.to_string(),
                resources: vec![("STORAGE".to_string(), 0, 1000)],
            }),
            handler: self.arc(),
        }
    }

    async fn get_quota_root(&self, _mailbox: &str, _metadata: &ImapConnectionMetadata) -> QuotaRootOutcome {
        QuotaRootOutcome {
            roots: vec!["".to_string()],
            usages: vec![ImapQuotaUsage {
                root: String::new(),
                resources: vec![("STORAGE".to_string(), 0, 1000)],
            }],
            handler: self.arc(),
        }
    }

    async fn set_quota(&self, root: &str, limits: &[(String, u64)], _metadata: &ImapConnectionMetadata) -> QuotaOutcome {
        QuotaOutcome {
            usage: Some(ImapQuotaUsage {
                root: root.to_string(),
                resources: limits.iter().map(|(name, limit)| (name.clone(), 0, *limit)).collect(),
            }),
            handler: self.arc(),
        }
    }
}

pub struct FakeAppendDataHandler {
    auth: FakeAuthHandler,
    mailbox: String,
    flags: FlagSet,
    buffer: Mutex<Vec<u8>>,
}

#[async_trait]
impl AppendDataHandler for FakeAppendDataHandler {
    async fn append_data(&self, _mailbox: &str, chunk: &[u8]) {
        self.buffer.lock().unwrap().extend_from_slice(chunk);
    }

    async fn append_complete(&self, _mailbox: &str) -> AppendCompleteOutcome {
        let bytes = self.buffer.lock().unwrap().clone();
        let mut state = self.auth.state.lock().unwrap();
        state.appended.push(AppendedMessage {
            mailbox: self.mailbox.clone(),
            flags: self.flags.clone(),
            bytes,
        });
        let uid = state.appended.len() as u32;
        drop(state);
        AppendCompleteOutcome::Appended {
            uid_validity: 1,
            uid,
            handler: self.auth.arc(),
        }
    }
}

#[derive(Clone)]
pub struct FakeSelectedHandler {
    auth: FakeAuthHandler,
    mailbox: String,
}

impl FakeSelectedHandler {
    fn arc(&self) -> Arc<dyn SelectedHandler> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl AuthenticatedHandler for FakeSelectedHandler {
    async fn select(&self, mailbox: &str, read_only: bool, metadata: &ImapConnectionMetadata) -> SelectOutcome {
        self.auth.select(mailbox, read_only, metadata).await
    }
    async fn create(&self, mailbox: &str, metadata: &ImapConnectionMetadata) -> MailboxOpOutcome {
        self.auth.create(mailbox, metadata).await
    }
    async fn delete(&self, mailbox: &str, metadata: &ImapConnectionMetadata) -> MailboxOpOutcome {
        self.auth.delete(mailbox, metadata).await
    }
    async fn rename(&self, from: &str, to: &str, metadata: &ImapConnectionMetadata) -> MailboxOpOutcome {
        self.auth.rename(from, to, metadata).await
    }
    async fn subscribe(&self, mailbox: &str, metadata: &ImapConnectionMetadata) -> MailboxOpOutcome {
        self.auth.subscribe(mailbox, metadata).await
    }
    async fn unsubscribe(&self, mailbox: &str, metadata: &ImapConnectionMetadata) -> MailboxOpOutcome {
        self.auth.unsubscribe(mailbox, metadata).await
    }
    async fn list(&self, reference: &str, pattern: &str, metadata: &ImapConnectionMetadata) -> ListOutcome {
        self.auth.list(reference, pattern, metadata).await
    }
    async fn lsub(&self, reference: &str, pattern: &str, metadata: &ImapConnectionMetadata) -> ListOutcome {
        self.auth.lsub(reference, pattern, metadata).await
    }
    async fn status(&self, mailbox: &str, items: &[StatusItem], metadata: &ImapConnectionMetadata) -> StatusOutcome {
        self.auth.status(mailbox, items, metadata).await
    }
    async fn append(&self, mailbox: &str, flags: FlagSet, literal_size: u32, metadata: &ImapConnectionMetadata) -> AppendOutcome {
        self.auth.append(mailbox, flags, literal_size, metadata).await
    }
    async fn get_quota(&self, root: &str, metadata: &ImapConnectionMetadata) -> QuotaOutcome {
        self.auth.get_quota(root, metadata).await
    }
    async fn get_quota_root(&self, mailbox: &str, metadata: &ImapConnectionMetadata) -> QuotaRootOutcome {
        self.auth.get_quota_root(mailbox, metadata).await
    }
    async fn set_quota(&self, root: &str, limits: &[(String, u64)], metadata: &ImapConnectionMetadata) -> QuotaOutcome {
        self.auth.set_quota(root, limits, metadata).await
    }
}

#[async_trait]
impl SelectedHandler for FakeSelectedHandler {
    async fn close(&self, _metadata: &ImapConnectionMetadata) -> CloseOutcome {
        CloseOutcome { handler: self.auth.arc() }
    }
    async fn unselect(&self, _metadata: &ImapConnectionMetadata) -> CloseOutcome {
        CloseOutcome { handler: self.auth.arc() }
    }
    async fn expunge(&self, _metadata: &ImapConnectionMetadata) -> ExpungeOutcome {
        ExpungeOutcome {
            expunged_seqs: vec![],
            handler: self.arc(),
        }
    }
    async fn uid_expunge(&self, _uid_set: &str, _metadata: &ImapConnectionMetadata) -> ExpungeOutcome {
        ExpungeOutcome {
            expunged_seqs: vec![],
            handler: self.arc(),
        }
    }
    async fn store(&self, _seq_set: &str, flags: &FlagSet, _mode: StoreMode, _silent: bool, _metadata: &ImapConnectionMetadata) -> StoreOutcome {
        StoreOutcome {
            updated: vec![(1, flags.clone())],
            handler: self.arc(),
        }
    }
    async fn uid_store(&self, uid_set: &str, flags: &FlagSet, mode: StoreMode, silent: bool, metadata: &ImapConnectionMetadata) -> StoreOutcome {
        self.store(uid_set, flags, mode, silent, metadata).await
    }
    async fn copy(&self, _seq_set: &str, _destination: &str, _metadata: &ImapConnectionMetadata) -> CopyOutcome {
        CopyOutcome {
            result: MailboxOpResult::Ok,
            message: "COPY completed".to_string(),
            handler: self.arc(),
        }
    }
    async fn uid_copy(&self, seq_set: &str, destination: &str, metadata: &ImapConnectionMetadata) -> CopyOutcome {
        self.copy(seq_set, destination, metadata).await
    }
    async fn mv(&self, _seq_set: &str, _destination: &str, _metadata: &ImapConnectionMetadata) -> MoveOutcome {
        MoveOutcome {
            result: MailboxOpResult::Ok,
            message: "MOVE completed".to_string(),
            handler: self.arc(),
        }
    }
    async fn uid_move(&self, seq_set: &str, destination: &str, metadata: &ImapConnectionMetadata) -> MoveOutcome {
        self.mv(seq_set, destination, metadata).await
    }
    async fn fetch(&self, _seq_set: &str, _items: &str, _metadata: &ImapConnectionMetadata) -> FetchOutcome {
        let state = self.auth.state.lock().unwrap();
        let messages = state
            .appended
            .iter()
            .enumerate()
            .map(|(i, m)| FetchedMessage {
                seq: (i + 1) as u32,
                uid: (i + 1) as u32,
                data_items: format!("FLAGS ({}) UID {}", m.flags.join(" "), i + 1),
            })
            .collect();
        FetchOutcome { messages, handler: self.arc() }
    }
    async fn uid_fetch(&self, seq_set: &str, items: &str, metadata: &ImapConnectionMetadata) -> FetchOutcome {
        self.fetch(seq_set, items, metadata).await
    }
    async fn search(&self, _criteria: &str, _metadata: &ImapConnectionMetadata) -> SearchOutcome {
        let count = self.auth.state.lock().unwrap().appended.len() as u32;
        SearchOutcome {
            matches: (1..=count).collect(),
            handler: self.arc(),
        }
    }
    async fn uid_search(&self, criteria: &str, metadata: &ImapConnectionMetadata) -> SearchOutcome {
        self.search(criteria, metadata).await
    }
}
