//! TCP tunnel
//!
//! Relays one intercepted TCP connection between its virtual endpoint and a
//! connection to the upstream proxy.
//!
//! Two tasks pump bytes, one per direction. Either of them may decide the
//! tunnel is finished; [`TcpTunnel::close`] runs its teardown exactly once
//! no matter how many callers race into it.
//!
//! # Termination
//!
//! - Local half-close (`ClosedForSend`/`ClosedForReceive`) ends only the
//!   local to remote direction.
//! - Remote EOF, reset or idle timeout closes the tunnel cleanly.
//! - Unexpected errors on either side close the tunnel with that error as
//!   the reason, which is logged once and returned from [`TcpTunnel::run`].

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::endpoint::{EndpointError, Interest, VirtualEndpoint};
use super::status::{StatusCell, TunnelStatus};
use crate::config::TcpConfig;
use crate::error::TunnelError;
use crate::fakedns::HijackTable;
use crate::outbound::{Dialer, RemoteConn};

/// Result of a finished relay
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Bytes relayed from the virtual endpoint to the proxy
    pub local_to_remote: u64,
    /// Bytes relayed from the proxy to the virtual endpoint
    pub remote_to_local: u64,
    /// Why the tunnel was torn down, if it was not a clean close
    pub close_reason: Option<TunnelError>,
}

/// Outcome of writing one chunk to the virtual endpoint
enum LocalWrite {
    Done,
    Cancelled,
    Failed(EndpointError),
}

/// One relayed TCP connection
pub struct TcpTunnel {
    local: Arc<dyn VirtualEndpoint>,
    remote_reader: tokio::sync::Mutex<Option<ReadHalf<RemoteConn>>>,
    remote_writer: tokio::sync::Mutex<Option<WriteHalf<RemoteConn>>>,
    target: String,
    local_addr: Option<SocketAddr>,
    remote_local_addr: Option<SocketAddr>,
    remote_peer_addr: Option<SocketAddr>,
    local_status: StatusCell,
    remote_status: StatusCell,
    cancel: CancellationToken,
    closed: AtomicBool,
    /// Fired once the first `close` has finished tearing down
    torn_down: CancellationToken,
    close_reason: Mutex<Option<TunnelError>>,
    idle_timeout: Duration,
    buffer_size: usize,
}

impl TcpTunnel {
    /// Resolve the destination, dial it and build the tunnel
    ///
    /// A destination found in the hijack table is dialed by hostname with
    /// the record's routing tag; anything else is dialed by address with the
    /// default tag. Nothing is torn down on failure: the endpoint stays
    /// with the caller.
    ///
    /// # Errors
    ///
    /// Returns `TunnelError::Blocked` for domains routed to the reject tag
    /// (without dialing) and `TunnelError::Dial` if dialing fails.
    pub async fn connect(
        local: Arc<dyn VirtualEndpoint>,
        dst_ip: IpAddr,
        dst_port: u16,
        table: Option<&HijackTable>,
        dialer: &dyn Dialer,
        config: &TcpConfig,
    ) -> Result<Arc<Self>, TunnelError> {
        let record = match (table, dst_ip) {
            (Some(table), IpAddr::V4(ip)) => table.get_by_ip(ip),
            _ => None,
        };

        let (target, proxy) = match record {
            Some(record) if record.is_blocked() => {
                return Err(TunnelError::blocked(record.hostname));
            }
            Some(record) => (format!("{}:{}", record.hostname, dst_port), record.proxy),
            None => (SocketAddr::new(dst_ip, dst_port).to_string(), String::new()),
        };

        let remote = match dialer.dial(&proxy, &target).await {
            Ok(remote) => remote,
            Err(source) => {
                warn!(%target, proxy = %proxy, "dial failed: {}", source);
                return Err(TunnelError::Dial {
                    target,
                    proxy,
                    source,
                });
            }
        };

        if let Err(e) = remote.set_keepalive(true) {
            debug!(%target, "failed to enable keep-alive: {}", e);
        }

        Ok(Self::new(local, remote, target, config))
    }

    /// Build a tunnel over an already established remote connection
    pub fn new(
        local: Arc<dyn VirtualEndpoint>,
        remote: RemoteConn,
        target: impl Into<String>,
        config: &TcpConfig,
    ) -> Arc<Self> {
        let local_addr = local.local_addr().ok();
        let remote_local_addr = remote.local_addr().ok();
        let remote_peer_addr = remote.peer_addr().ok();
        let (reader, writer) = tokio::io::split(remote);

        Arc::new(Self {
            local,
            remote_reader: tokio::sync::Mutex::new(Some(reader)),
            remote_writer: tokio::sync::Mutex::new(Some(writer)),
            target: target.into(),
            local_addr,
            remote_local_addr,
            remote_peer_addr,
            local_status: StatusCell::new(),
            remote_status: StatusCell::new(),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            torn_down: CancellationToken::new(),
            close_reason: Mutex::new(None),
            idle_timeout: config.idle_timeout(),
            buffer_size: config.buffer_size.max(1),
        })
    }

    /// `host:port` the tunnel dialed
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Status of the virtual endpoint side
    #[must_use]
    pub fn local_status(&self) -> TunnelStatus {
        self.local_status.get()
    }

    /// Status of the proxy side
    #[must_use]
    pub fn remote_status(&self) -> TunnelStatus {
        self.remote_status.get()
    }

    /// Check if teardown has run
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Relay until both directions finish, then close
    pub async fn run(self: Arc<Self>) -> RelayStats {
        self.local_status.set(TunnelStatus::Proxying);
        self.remote_status.set(TunnelStatus::Proxying);

        let upload = tokio::spawn(Arc::clone(&self).relay_local_to_remote());
        let download = tokio::spawn(Arc::clone(&self).relay_remote_to_local());
        let (upload, download) = tokio::join!(upload, download);

        self.close(None).await;

        let local_to_remote = upload.unwrap_or_else(|e| {
            warn!(target = %self.target, "local relay task failed: {}", e);
            0
        });
        let remote_to_local = download.unwrap_or_else(|e| {
            warn!(target = %self.target, "remote relay task failed: {}", e);
            0
        });

        RelayStats {
            local_to_remote,
            remote_to_local,
            close_reason: self.close_reason.lock().take(),
        }
    }

    /// Tear the tunnel down
    ///
    /// Only the first call tears down: it records the reason, marks both
    /// sides closed, cancels the relay tasks, closes the virtual endpoint and
    /// shuts the proxy connection down, in that order. Later calls wait until
    /// that teardown has finished.
    pub async fn close(&self, reason: Option<TunnelError>) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.torn_down.cancelled().await;
            return;
        }

        match reason {
            Some(reason) => {
                warn!(
                    target = %self.target,
                    local = ?self.local_addr,
                    remote_local = ?self.remote_local_addr,
                    remote_peer = ?self.remote_peer_addr,
                    "tcp tunnel closed: {}",
                    reason
                );
                *self.close_reason.lock() = Some(reason);
            }
            None => {
                debug!(target = %self.target, "tcp tunnel closed");
            }
        }

        self.local_status.set(TunnelStatus::Closed);
        self.remote_status.set(TunnelStatus::Closed);
        self.cancel.cancel();
        self.local.close();

        // The remote relay task owns the reader while it runs
        if let Ok(mut reader) = self.remote_reader.try_lock() {
            reader.take();
        }
        let writer = self.remote_writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!(target = %self.target, "remote shutdown failed: {}", e);
            }
        }

        self.torn_down.cancel();
    }

    async fn relay_local_to_remote(self: Arc<Self>) -> u64 {
        let readable = self.local.readiness(Interest::Readable);
        let mut total = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let data = match self.local.read() {
                Ok(data) if !data.is_empty() => data,
                Ok(_) | Err(EndpointError::WouldBlock) => {
                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = readable.notified() => continue,
                    }
                }
                Err(e) if e.is_half_closed() => break,
                Err(e) if e.is_closed() => {
                    self.close(None).await;
                    break;
                }
                Err(e) => {
                    warn!(target = %self.target, "read from local failed: {}", e);
                    self.close(Some(TunnelError::local("read", e))).await;
                    break;
                }
            };

            if self.local_status.is_closed() {
                break;
            }

            match self.write_remote(&data).await {
                None => break,
                Some(Ok(())) => total += data.len() as u64,
                Some(Err(e)) if is_clean_write_error(&e) => {
                    self.close(None).await;
                    break;
                }
                Some(Err(e)) => {
                    warn!(target = %self.target, "write to remote failed: {}", e);
                    self.close(Some(TunnelError::remote("write", e))).await;
                    break;
                }
            }
        }

        trace!(target = %self.target, bytes = total, "local to remote relay finished");
        total
    }

    /// Write a whole chunk to the proxy; `None` means the tunnel was cancelled
    async fn write_remote(&self, data: &[u8]) -> Option<io::Result<()>> {
        let mut guard = tokio::select! {
            () = self.cancel.cancelled() => return None,
            guard = self.remote_writer.lock() => guard,
        };
        let Some(writer) = guard.as_mut() else {
            return Some(Err(io::ErrorKind::BrokenPipe.into()));
        };

        tokio::select! {
            () = self.cancel.cancelled() => None,
            res = writer.write_all(data) => Some(res),
        }
    }

    async fn relay_remote_to_local(self: Arc<Self>) -> u64 {
        let Some(mut reader) = self.remote_reader.lock().await.take() else {
            return 0;
        };
        let writable = self.local.readiness(Interest::Writable);
        let mut buf = vec![0u8; self.buffer_size];
        let mut total = 0u64;

        loop {
            let read = tokio::select! {
                () = self.cancel.cancelled() => break,
                read = tokio::time::timeout(self.idle_timeout, reader.read(&mut buf)) => read,
            };

            let n = match read {
                Err(_) => {
                    debug!(target = %self.target, "remote idle for {:?}", self.idle_timeout);
                    self.close(None).await;
                    break;
                }
                Ok(Ok(0)) => {
                    self.close(None).await;
                    break;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) if is_clean_read_error(&e) => {
                    self.close(None).await;
                    break;
                }
                Ok(Err(e)) => {
                    warn!(target = %self.target, "read from remote failed: {}", e);
                    self.close(Some(TunnelError::remote("read", e))).await;
                    break;
                }
            };

            if self.remote_status.is_closed() {
                break;
            }

            match self.write_local(&buf[..n], &writable).await {
                LocalWrite::Done => total += n as u64,
                LocalWrite::Cancelled => break,
                LocalWrite::Failed(e) if e.is_half_closed() => break,
                LocalWrite::Failed(e) if e.is_closed() => {
                    self.close(None).await;
                    break;
                }
                LocalWrite::Failed(e) => {
                    warn!(target = %self.target, "write to local failed: {}", e);
                    self.close(Some(TunnelError::local("write", e))).await;
                    break;
                }
            }
        }

        trace!(target = %self.target, bytes = total, "remote to local relay finished");
        total
    }

    /// Write a whole chunk to the virtual endpoint, waiting out backpressure
    async fn write_local(&self, mut chunk: &[u8], writable: &Notify) -> LocalWrite {
        while !chunk.is_empty() {
            match self.local.write(chunk) {
                Ok(n) if n > 0 => chunk = &chunk[n.min(chunk.len())..],
                Ok(_) | Err(EndpointError::WouldBlock) => {
                    tokio::select! {
                        () = self.cancel.cancelled() => return LocalWrite::Cancelled,
                        () = writable.notified() => {}
                    }
                }
                Err(e) => return LocalWrite::Failed(e),
            }
        }
        LocalWrite::Done
    }
}

impl std::fmt::Debug for TcpTunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTunnel")
            .field("target", &self.target)
            .field("local_addr", &self.local_addr)
            .field("remote_peer_addr", &self.remote_peer_addr)
            .field("local_status", &self.local_status.get())
            .field("remote_status", &self.remote_status.get())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Remote read errors that end the tunnel without a reason
fn is_clean_read_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::ConnectionReset | io::ErrorKind::UnexpectedEof
    )
}

/// Remote write errors that end the tunnel without a reason
fn is_clean_write_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero
    )
}
