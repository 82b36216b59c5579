//! Test doubles shared by the integration tests
//!
//! - `MockEndpoint`: scripted virtual endpoint
//! - `MockRemote`: duplex-backed remote connection that counts shutdowns
//! - `MockDialer`: dialer handing out prepared remotes and recording calls

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{duplex, AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::Notify;

use tunrelay::error::DialError;
use tunrelay::outbound::{Dialer, RemoteConn, RemoteStream};
use tunrelay::tunnel::{EndpointError, Interest, VirtualEndpoint};

// ============================================================================
// Virtual endpoint
// ============================================================================

/// Virtual endpoint whose reads are scripted by the test
pub struct MockEndpoint {
    addr: SocketAddr,
    inbound: Mutex<VecDeque<Result<Bytes, EndpointError>>>,
    written: Mutex<Vec<u8>>,
    closes: AtomicUsize,
    readable: Arc<Notify>,
    writable: Arc<Notify>,
}

impl MockEndpoint {
    pub fn new(addr: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            addr,
            inbound: Mutex::new(VecDeque::new()),
            written: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            readable: Arc::new(Notify::new()),
            writable: Arc::new(Notify::new()),
        })
    }

    /// Queue data the relay will read
    pub fn push_data(&self, data: &'static [u8]) {
        self.push(Ok(Bytes::from_static(data)));
    }

    /// Queue an error the relay will read
    pub fn push_error(&self, err: EndpointError) {
        self.push(Err(err));
    }

    fn push(&self, item: Result<Bytes, EndpointError>) {
        self.inbound.lock().push_back(item);
        self.readable.notify_one();
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn as_endpoint(self: &Arc<Self>) -> Arc<dyn VirtualEndpoint> {
        Arc::clone(self) as Arc<dyn VirtualEndpoint>
    }
}

impl VirtualEndpoint for MockEndpoint {
    fn read(&self) -> Result<Bytes, EndpointError> {
        if self.closes() > 0 {
            return Err(EndpointError::Closed);
        }
        self.inbound
            .lock()
            .pop_front()
            .unwrap_or(Err(EndpointError::WouldBlock))
    }

    fn write(&self, buf: &[u8]) -> Result<usize, EndpointError> {
        if self.closes() > 0 {
            return Err(EndpointError::Closed);
        }
        self.written.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.readable.notify_one();
        self.writable.notify_one();
    }

    fn local_addr(&self) -> Result<SocketAddr, EndpointError> {
        Ok(self.addr)
    }

    fn readiness(&self, interest: Interest) -> Arc<Notify> {
        match interest {
            Interest::Readable => Arc::clone(&self.readable),
            Interest::Writable => Arc::clone(&self.writable),
        }
    }
}

// ============================================================================
// Remote connection
// ============================================================================

/// Remote connection backed by an in-memory duplex pipe
pub struct MockRemote {
    io: DuplexStream,
    shutdowns: Arc<AtomicUsize>,
    keepalive: Arc<Mutex<Option<bool>>>,
}

/// Test-side handles for a `MockRemote`
pub struct RemotePeer {
    /// The other end of the pipe, standing in for the proxy
    pub io: DuplexStream,
    pub shutdowns: Arc<AtomicUsize>,
    pub keepalive: Arc<Mutex<Option<bool>>>,
}

impl MockRemote {
    pub fn pair() -> (RemoteConn, RemotePeer) {
        let (io, peer) = duplex(64 * 1024);
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let keepalive = Arc::new(Mutex::new(None));
        let remote = Self {
            io,
            shutdowns: Arc::clone(&shutdowns),
            keepalive: Arc::clone(&keepalive),
        };
        (
            Box::new(remote),
            RemotePeer {
                io: peer,
                shutdowns,
                keepalive,
            },
        )
    }
}

impl AsyncRead for MockRemote {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockRemote {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

impl RemoteStream for MockRemote {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok("127.0.0.1:40000".parse().unwrap())
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Ok("127.0.0.1:1080".parse().unwrap())
    }

    fn set_keepalive(&self, enabled: bool) -> io::Result<()> {
        *self.keepalive.lock() = Some(enabled);
        Ok(())
    }
}

// ============================================================================
// Dialer
// ============================================================================

/// Dialer that hands out prepared remotes in order
#[derive(Default)]
pub struct MockDialer {
    remotes: Mutex<VecDeque<RemoteConn>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockDialer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Prepare a remote and return the test's end of it
    pub fn prepare(&self) -> RemotePeer {
        let (remote, peer) = MockRemote::pair();
        self.remotes.lock().push_back(remote);
        peer
    }

    /// Every `(proxy, target)` pair dialed so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial(&self, proxy: &str, target: &str) -> Result<RemoteConn, DialError> {
        self.calls.lock().push((proxy.to_string(), target.to_string()));
        self.remotes
            .lock()
            .pop_front()
            .ok_or_else(|| DialError::connection_failed(target, "connection refused"))
    }
}
