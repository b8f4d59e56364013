//! `FTPDataConnectionCoordinator`: passive/active data-channel setup, the
//! RFC 2428 extended-address parsers, and the upload/download/listing
//! streaming pipeline.

use crate::ftp::handler::{FileSystem, FtpFileInfo, FtpHandler};
use crate::ftp::metadata::FtpConnectionMetadata;
use crate::ftp::session::TransferType;
use crate::Transport;
use chrono::{DateTime, Datelike, Utc};
use std::fmt::Write as _;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Notify};

/// Passive accept queue depth: bounded FIFO, length >= 1.
const PASSIVE_QUEUE_DEPTH: usize = 4;
/// Passive accept-wait has a 30s bound.
const PASSIVE_ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);
/// Notify progress every 64 KiB transferred.
const PROGRESS_NOTIFY_INTERVAL: u64 = 64 * 1024;
const COPY_BUFFER_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Download,
    Upload,
    /// STOU: the file system assigns the name; kept distinct from `Upload`
    /// per Design Note "Open question — STOU path".
    StoreUnique,
    Listing,
}

#[derive(Debug, Clone)]
pub struct PendingTransfer {
    pub kind: TransferKind,
    pub path: String,
    pub append: bool,
    pub restart_offset: u64,
}

struct PassiveState {
    port: u16,
    rx: mpsc::Receiver<TcpStream>,
    accept_task: tokio::task::JoinHandle<()>,
}

struct ActiveState {
    host: IpAddr,
    port: u16,
}

enum CoordinatorMode {
    None,
    Passive(PassiveState),
    Active(ActiveState),
}

pub struct TransferOutcome {
    pub bytes: u64,
    pub success: bool,
}

/// Returned by [`FtpDataConnectionCoordinator::start_transfer`]: the control
/// loop awaits `done` while remaining able to act on `ABOR` via `abort`.
pub struct TransferHandle {
    pub abort: Arc<Notify>,
    pub done: oneshot::Receiver<TransferOutcome>,
}

impl TransferHandle {
    pub fn request_abort(&self) {
        self.abort.notify_one();
    }
}

/// Owned exclusively by one `FTPSession`; mutated only by it.
pub struct FtpDataConnectionCoordinator {
    mode: CoordinatorMode,
    pending: Option<PendingTransfer>,
}

impl Default for FtpDataConnectionCoordinator {
    fn default() -> Self {
        FtpDataConnectionCoordinator {
            mode: CoordinatorMode::None,
            pending: None,
        }
    }
}

impl FtpDataConnectionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_mode(&self) -> bool {
        !matches!(self.mode, CoordinatorMode::None)
    }

    pub fn has_pending_transfer(&self) -> bool {
        self.pending.is_some()
    }

    /// Enter passive mode, binding a listener on `requested_port` (0 = OS
    /// assigned) at `bind_addr`. Replaces any prior mode, releasing it
    /// first (D3).
    pub async fn enter_passive(&mut self, bind_addr: IpAddr, requested_port: u16) -> std::io::Result<u16> {
        self.cleanup().await;
        let listener = TcpListener::bind(SocketAddr::new(bind_addr, requested_port)).await?;
        self.install_passive_listener(listener)
    }

    /// Enter passive mode, binding the first free port in `port_range`
    /// (falling back to OS-assigned if the range is empty), as `libunftp`'s
    /// `PassiveHost`/port-range configuration does.
    pub async fn enter_passive_in_range(&mut self, bind_addr: IpAddr, port_range: std::ops::Range<u16>) -> std::io::Result<u16> {
        self.cleanup().await;
        if port_range.is_empty() {
            let listener = TcpListener::bind(SocketAddr::new(bind_addr, 0)).await?;
            return self.install_passive_listener(listener);
        }
        let mut last_err = None;
        for port in port_range {
            match TcpListener::bind(SocketAddr::new(bind_addr, port)).await {
                Ok(listener) => return self.install_passive_listener(listener),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no free port in configured passive range")))
    }

    fn install_passive_listener(&mut self, listener: TcpListener) -> std::io::Result<u16> {
        let actual_port = listener.local_addr()?.port();
        let (tx, rx) = mpsc::channel(PASSIVE_QUEUE_DEPTH);
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _peer)) => {
                        if tx.send(stream).await.is_err() {
                            return;
                        }
                    }
                    Err(_) => return,
                }
            }
        });
        self.mode = CoordinatorMode::Passive(PassiveState {
            port: actual_port,
            rx,
            accept_task,
        });
        Ok(actual_port)
    }

    /// Enter active mode, recording `(host, port)` to dial at `start_transfer`
    /// time. Replaces any prior mode.
    pub async fn enter_active(&mut self, host: IpAddr, port: u16) {
        self.cleanup().await;
        self.mode = CoordinatorMode::Active(ActiveState { host, port });
    }

    /// `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` body, requires D4
    /// (PASSIVE + bound port).
    pub fn generate_passive_response(&self, server_ipv4: Ipv4Addr) -> Option<String> {
        match &self.mode {
            CoordinatorMode::Passive(state) => {
                let [o1, o2, o3, o4] = server_ipv4.octets();
                let p1 = (state.port >> 8) as u8;
                let p2 = (state.port & 0xFF) as u8;
                Some(format!("{o1},{o2},{o3},{o4},{p1},{p2}"))
            }
            _ => None,
        }
    }

    /// `229 Entering Extended Passive Mode (|||port|)` body.
    pub fn generate_epsv_response(&self) -> Option<String> {
        match &self.mode {
            CoordinatorMode::Passive(state) => Some(format!("(|||{}|)", state.port)),
            _ => None,
        }
    }

    /// D1/D2: requires a mode and at most one in-flight transfer.
    pub fn set_pending(&mut self, pending: PendingTransfer) -> Result<(), DataCoordinatorError> {
        if matches!(self.mode, CoordinatorMode::None) {
            return Err(DataCoordinatorError::NoMode);
        }
        if self.pending.is_some() {
            return Err(DataCoordinatorError::TransferInFlight);
        }
        self.pending = Some(pending);
        Ok(())
    }

    /// Tear down sockets/listener and return to `NONE`, dropping any
    /// pending transfer. Idempotent and safe to call unconditionally on any
    /// connection-release path.
    pub async fn cleanup(&mut self) {
        if let CoordinatorMode::Passive(state) = std::mem::replace(&mut self.mode, CoordinatorMode::None) {
            state.accept_task.abort();
        }
        self.pending = None;
    }

    /// Takes ownership of the current pending transfer and mode, spawns the
    /// transfer as a background task, and returns a handle the control loop
    /// can await (or cancel via `ABOR`) while staying responsive to the next
    /// command line, per Design Notes "Coroutines / blocking".
    #[allow(clippy::too_many_arguments)]
    pub fn start_transfer(
        &mut self,
        handler: Arc<dyn FtpHandler>,
        fs: Arc<dyn FileSystem>,
        metadata: FtpConnectionMetadata,
        transfer_type: TransferType,
        tls_acceptor: Option<tokio_rustls::TlsAcceptor>,
        data_protection: bool,
    ) -> Result<TransferHandle, DataCoordinatorError> {
        let pending = self.pending.take().ok_or(DataCoordinatorError::NoPendingTransfer)?;
        let mode = std::mem::replace(&mut self.mode, CoordinatorMode::None);
        if matches!(mode, CoordinatorMode::None) {
            return Err(DataCoordinatorError::NoMode);
        }
        let abort = Arc::new(Notify::new());
        let abort_for_task = abort.clone();
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = run_transfer(
                mode,
                pending,
                handler,
                fs,
                metadata,
                transfer_type,
                tls_acceptor,
                data_protection,
                &abort_for_task,
            )
            .await;
            let _ = done_tx.send(outcome);
        });
        Ok(TransferHandle { abort, done: done_rx })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DataCoordinatorError {
    #[error("startTransfer requires an active data-connection mode (D1)")]
    NoMode,
    #[error("coordinator already owns an in-flight transfer (D2)")]
    TransferInFlight,
    #[error("no pending transfer was configured")]
    NoPendingTransfer,
}

async fn obtain_data_stream(mode: CoordinatorMode) -> std::io::Result<TcpStream> {
    match mode {
        CoordinatorMode::Passive(mut state) => {
            tokio::time::timeout(PASSIVE_ACCEPT_TIMEOUT, state.rx.recv())
                .await
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "passive accept timed out"))?
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "passive accept queue closed"))
        }
        CoordinatorMode::Active(state) => TcpStream::connect((state.host, state.port)).await,
        CoordinatorMode::None => Err(std::io::Error::new(std::io::ErrorKind::Other, "no data connection mode")),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_transfer(
    mode: CoordinatorMode,
    pending: PendingTransfer,
    handler: Arc<dyn FtpHandler>,
    fs: Arc<dyn FileSystem>,
    metadata: FtpConnectionMetadata,
    transfer_type: TransferType,
    tls_acceptor: Option<tokio_rustls::TlsAcceptor>,
    data_protection: bool,
    abort: &Notify,
) -> TransferOutcome {
    let is_upload = matches!(pending.kind, TransferKind::Upload | TransferKind::StoreUnique);

    let raw = match obtain_data_stream(mode).await {
        Ok(s) => s,
        Err(_) => return TransferOutcome { bytes: 0, success: false },
    };

    let mut transport = Transport::Plain(raw);
    if data_protection {
        if let Some(acceptor) = &tls_acceptor {
            transport = match transport.upgrade_server(acceptor).await {
                Ok(t) => t,
                Err(_) => return TransferOutcome { bytes: 0, success: false },
            };
        }
    }

    // -1 is the "size unknown" sentinel; the restart offset itself reaches
    // the file system through `open_read`'s `offset`/`open_write`'s `append`.
    handler.transfer_starting(&pending.path, is_upload, -1, &metadata).await;

    let ascii = transfer_type == TransferType::Ascii;
    let handler_for_progress = handler.clone();
    let path_for_progress = pending.path.clone();
    let metadata_for_progress = metadata.clone();
    let notify_progress = move |total: u64| {
        let handler = handler_for_progress.clone();
        let path = path_for_progress.clone();
        let metadata = metadata_for_progress.clone();
        tokio::spawn(async move {
            handler.transfer_progress(&path, is_upload, total, &metadata).await;
        });
    };

    let result = match pending.kind {
        TransferKind::Download => {
            match fs.open_read(&pending.path, pending.restart_offset).await {
                Ok(mut src) => copy_stream(&mut src, &mut transport, ascii, true, abort, notify_progress).await,
                Err(e) => Err(e),
            }
        }
        TransferKind::Upload => match fs.open_write(&pending.path, pending.append).await {
            Ok(mut sink) => copy_stream(&mut transport, &mut sink, ascii, false, abort, notify_progress).await,
            Err(e) => Err(e),
        },
        TransferKind::StoreUnique => match fs.generate_unique_name(&pending.path).await {
            Ok(unique_name) => match fs.open_write(&unique_name, false).await {
                Ok(mut sink) => copy_stream(&mut transport, &mut sink, ascii, false, abort, notify_progress).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        },
        TransferKind::Listing => match fs.list(&pending.path).await {
            Ok(entries) => {
                let text = render_listing(&entries);
                let bytes = text.into_bytes();
                match transport.write_all(&bytes).await {
                    Ok(()) => Ok((bytes.len() as u64, false)),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        },
    };

    let _ = transport.flush().await;
    let _ = transport.shutdown().await;

    let (bytes, aborted, success) = match result {
        Ok((bytes, aborted)) => (bytes, aborted, !aborted),
        Err(_) => (0, false, false),
    };

    handler.transfer_completed(&pending.path, is_upload, bytes, success, &metadata).await;

    TransferOutcome { bytes, success }
}

/// Tracks the straddling-byte state of ASCII<->CRLF conversion across reads.
struct AsciiConverter {
    pending_cr: bool,
}

impl AsciiConverter {
    fn new() -> Self {
        AsciiConverter { pending_cr: false }
    }

    /// Local LF (not already preceded by CR) -> CRLF, for data written onto
    /// the wire (downloads, listings).
    fn to_wire(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &b in input {
            if b == b'\n' && !self.pending_cr {
                out.push(b'\r');
            }
            out.push(b);
            self.pending_cr = b == b'\r';
        }
    }

    /// Wire CRLF -> local LF, for data read from the wire (uploads).
    fn from_wire(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &b in input {
            if self.pending_cr {
                self.pending_cr = false;
                if b == b'\n' {
                    out.push(b'\n');
                    continue;
                }
                out.push(b'\r');
            }
            if b == b'\r' {
                self.pending_cr = true;
            } else {
                out.push(b);
            }
        }
    }

    fn flush_from_wire(&mut self, out: &mut Vec<u8>) {
        if self.pending_cr {
            out.push(b'\r');
            self.pending_cr = false;
        }
    }
}

/// 32 KiB buffered copy with optional ASCII<->CRLF conversion, 64 KiB
/// progress notification boundaries, and cooperative `ABOR` cancellation.
/// Returns `(bytes_written, was_aborted)`.
async fn copy_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    ascii: bool,
    to_wire: bool,
    abort: &Notify,
    mut on_progress: impl FnMut(u64),
) -> std::io::Result<(u64, bool)>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut converter = AsciiConverter::new();
    let mut total: u64 = 0;
    let mut since_notify: u64 = 0;

    loop {
        let n = tokio::select! {
            biased;
            _ = abort.notified() => {
                return Ok((total, true));
            }
            res = reader.read(&mut buf) => res?,
        };
        if n == 0 {
            break;
        }
        if ascii {
            let mut out = Vec::with_capacity(n + n / 64 + 2);
            if to_wire {
                converter.to_wire(&buf[..n], &mut out);
            } else {
                converter.from_wire(&buf[..n], &mut out);
            }
            writer.write_all(&out).await?;
            total += out.len() as u64;
            since_notify += out.len() as u64;
        } else {
            writer.write_all(&buf[..n]).await?;
            total += n as u64;
            since_notify += n as u64;
        }
        if since_notify >= PROGRESS_NOTIFY_INTERVAL {
            since_notify = 0;
            on_progress(total);
        }
    }

    if ascii && !to_wire {
        let mut tail = Vec::new();
        converter.flush_from_wire(&mut tail);
        if !tail.is_empty() {
            writer.write_all(&tail).await?;
            total += tail.len() as u64;
        }
    }
    writer.flush().await?;
    Ok((total, false))
}

/// Unix `ls -l`-style listing, as `libunftp`'s `Fileinfo::fmt` renders it.
fn render_listing(entries: &[FtpFileInfo]) -> String {
    let now = Utc::now();
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format_listing_line(entry, &now));
        out.push_str("\r\n");
    }
    out
}

pub fn format_listing_line(entry: &FtpFileInfo, now: &DateTime<Utc>) -> String {
    let modified: DateTime<Utc> = entry.modified.into();
    let date = if modified.year() == now.year() {
        modified.format("%b %d %H:%M").to_string()
    } else {
        modified.format("%b %d  %Y").to_string()
    };
    let filetype = if entry.is_dir { 'd' } else { '-' };
    let mut line = String::new();
    let _ = write!(
        line,
        "{filetype}{perms} {links:>3} {owner:<8} {group:<8} {size:>13} {date} {name}",
        perms = entry.permissions,
        links = 1,
        owner = entry.owner,
        group = entry.group,
        size = entry.size,
        date = date,
        name = entry.name,
    );
    line
}

/// Parses a `PORT` argument: exactly 6 comma-separated decimal octets
/// (`h1,h2,h3,h4,p1,p2`), each validated 0-255.
pub fn parse_port_arg(arg: &str) -> Option<(IpAddr, u16)> {
    let parts: Vec<&str> = arg.split(',').collect();
    if parts.len() != 6 {
        return None;
    }
    let mut nums = [0u16; 6];
    for (i, p) in parts.iter().enumerate() {
        let v: u16 = p.trim().parse().ok()?;
        if v > 255 {
            return None;
        }
        nums[i] = v;
    }
    let ip = Ipv4Addr::new(nums[0] as u8, nums[1] as u8, nums[2] as u8, nums[3] as u8);
    let port = (nums[4] << 8) | nums[5];
    Some((IpAddr::V4(ip), port))
}

/// Parses an `EPRT` argument: `|proto|addr|port|` with an arbitrary
/// single-char delimiter. `proto` 1 = IPv4, 2 = IPv6; the address family of
/// `addr` must match `proto`.
pub fn parse_eprt_arg(arg: &str) -> Option<(IpAddr, u16)> {
    let mut chars = arg.chars();
    let delim = chars.next()?;
    let rest = &arg[delim.len_utf8()..];
    let fields: Vec<&str> = rest.split(delim).collect();
    // Trailing empty field from the closing delimiter plus 3 content fields.
    if fields.len() != 4 || !fields[3].is_empty() {
        return None;
    }
    let proto: u8 = fields[0].parse().ok()?;
    let port: u16 = fields[2].parse().ok()?;
    if port == 0 {
        return None;
    }
    match proto {
        1 => {
            let ip: Ipv4Addr = fields[1].parse().ok()?;
            Some((IpAddr::V4(ip), port))
        }
        2 => {
            let ip: Ipv6Addr = fields[1].parse().ok()?;
            Some((IpAddr::V6(ip), port))
        }
        _ => None,
    }
}
