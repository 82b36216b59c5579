//! SOCKS5 outbound integration tests
//!
//! A hijacked connection is relayed through `ProxyDialer` and
//! `Socks5Outbound` to a mock SOCKS5 server on loopback, verifying that the
//! hostname (not the synthetic address) reaches the proxy.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use tunrelay::config::TcpConfig;
use tunrelay::error::{DialError, TunnelError};
use tunrelay::fakedns::{FakeDnsConfig, HijackTable};
use tunrelay::outbound::{Dialer, ProxyDialer, Socks5Config, Socks5Outbound};
use tunrelay::tunnel::TcpHandler;

use super::mocks::MockEndpoint;

// ============================================================================
// SOCKS5 Protocol Constants
// ============================================================================

const SOCKS5_VERSION: u8 = 0x05;
const AUTH_METHOD_NONE: u8 = 0x00;
const AUTH_METHOD_PASSWORD: u8 = 0x02;
const AUTH_PASSWORD_VERSION: u8 = 0x01;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const REPLY_SUCCEEDED: u8 = 0x00;
const REPLY_HOST_UNREACHABLE: u8 = 0x04;

// ============================================================================
// Mock SOCKS5 Server
// ============================================================================

/// What the mock server saw in the CONNECT request
#[derive(Debug, PartialEq, Eq)]
struct ConnectRequest {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
}

/// Serve one SOCKS5 client, echoing everything after CONNECT
async fn serve_one(
    listener: TcpListener,
    require_auth: bool,
    reply_code: u8,
    seen: oneshot::Sender<ConnectRequest>,
) {
    let (mut socket, _) = listener.accept().await.unwrap();

    // VER | NMETHODS | METHODS
    let mut header = [0u8; 2];
    socket.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0], SOCKS5_VERSION);
    let mut methods = vec![0u8; header[1] as usize];
    socket.read_exact(&mut methods).await.unwrap();

    let credentials = if require_auth {
        assert!(methods.contains(&AUTH_METHOD_PASSWORD));
        socket
            .write_all(&[SOCKS5_VERSION, AUTH_METHOD_PASSWORD])
            .await
            .unwrap();

        let mut ver_ulen = [0u8; 2];
        socket.read_exact(&mut ver_ulen).await.unwrap();
        assert_eq!(ver_ulen[0], AUTH_PASSWORD_VERSION);
        let mut username = vec![0u8; ver_ulen[1] as usize];
        socket.read_exact(&mut username).await.unwrap();
        let mut plen = [0u8; 1];
        socket.read_exact(&mut plen).await.unwrap();
        let mut password = vec![0u8; plen[0] as usize];
        socket.read_exact(&mut password).await.unwrap();

        socket.write_all(&[AUTH_PASSWORD_VERSION, 0x00]).await.unwrap();
        Some((
            String::from_utf8(username).unwrap(),
            String::from_utf8(password).unwrap(),
        ))
    } else {
        socket
            .write_all(&[SOCKS5_VERSION, AUTH_METHOD_NONE])
            .await
            .unwrap();
        None
    };

    // VER | CMD | RSV | ATYP
    let mut request = [0u8; 4];
    socket.read_exact(&mut request).await.unwrap();
    assert_eq!(request[1], CMD_CONNECT);
    assert_eq!(request[3], ATYP_DOMAIN);

    let mut len = [0u8; 1];
    socket.read_exact(&mut len).await.unwrap();
    let mut host = vec![0u8; len[0] as usize];
    socket.read_exact(&mut host).await.unwrap();
    let mut port = [0u8; 2];
    socket.read_exact(&mut port).await.unwrap();

    seen.send(ConnectRequest {
        host: String::from_utf8(host).unwrap(),
        port: u16::from_be_bytes(port),
        credentials,
    })
    .unwrap();

    // VER | REP | RSV | ATYP | BND.ADDR | BND.PORT
    socket
        .write_all(&[SOCKS5_VERSION, reply_code, 0x00, ATYP_IPV4, 127, 0, 0, 1, 0x1F, 0x90])
        .await
        .unwrap();
    if reply_code != REPLY_SUCCEEDED {
        return;
    }

    let mut buf = [0u8; 1024];
    loop {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                if socket.write_all(&buf[..n]).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn start_server(
    require_auth: bool,
    reply_code: u8,
) -> (SocketAddr, oneshot::Receiver<ConnectRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(serve_one(listener, require_auth, reply_code, tx));
    (addr, rx)
}

fn dialer_with(config: Socks5Config) -> Arc<ProxyDialer> {
    let dialer = ProxyDialer::default();
    dialer.add(Arc::new(Socks5Outbound::new(config)));
    Arc::new(dialer)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_hijacked_connection_relayed_through_socks5() {
    let (server, seen) = start_server(false, REPLY_SUCCEEDED).await;

    let table = Arc::new(HijackTable::from_config(&FakeDnsConfig::default()));
    let record = table.set("video.example.com", "socks").unwrap();

    let dialer = dialer_with(Socks5Config::new("socks", server));
    let handler = TcpHandler::new(
        Some(Arc::clone(&table)),
        dialer as Arc<dyn Dialer>,
        TcpConfig::default(),
    );

    let endpoint = MockEndpoint::new("10.0.0.2:50000".parse().unwrap());
    endpoint.push_data(b"GET / HTTP/1.1\r\n\r\n");
    let task = handler
        .handle(
            endpoint.as_endpoint(),
            SocketAddr::new(IpAddr::V4(record.ip), 443),
        )
        .await
        .unwrap();

    let request = tokio::time::timeout(Duration::from_secs(2), seen)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        request,
        ConnectRequest {
            host: "video.example.com".to_string(),
            port: 443,
            credentials: None,
        }
    );

    // The server echoes the request back to the endpoint
    tokio::time::timeout(Duration::from_secs(2), async {
        while endpoint.written() != b"GET / HTTP/1.1\r\n\r\n" {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // Local close tears the tunnel down
    endpoint.push_error(tunrelay::tunnel::EndpointError::Closed);
    let stats = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.local_to_remote, 18);
    assert_eq!(stats.remote_to_local, 18);
    assert!(stats.close_reason.is_none());
    assert_eq!(endpoint.closes(), 1);
}

#[tokio::test]
async fn test_socks5_credentials_sent() {
    let (server, seen) = start_server(true, REPLY_SUCCEEDED).await;
    let dialer = dialer_with(Socks5Config::new("auth", server).with_auth("user", "secret"));

    let conn = dialer.dial("auth", "example.org:8443").await.unwrap();

    let request = seen.await.unwrap();
    assert_eq!(request.host, "example.org");
    assert_eq!(request.port, 8443);
    assert_eq!(
        request.credentials,
        Some(("user".to_string(), "secret".to_string()))
    );
    drop(conn);
}

#[tokio::test]
async fn test_socks5_reply_failure_surfaces_as_dial_error() {
    let (server, _seen) = start_server(false, REPLY_HOST_UNREACHABLE).await;

    let table = Arc::new(HijackTable::from_config(&FakeDnsConfig::default()));
    let record = table.set("gone.example.com", "socks").unwrap();

    let handler = TcpHandler::new(
        Some(table),
        dialer_with(Socks5Config::new("socks", server)) as Arc<dyn Dialer>,
        TcpConfig::default(),
    );

    let endpoint = MockEndpoint::new("10.0.0.2:50001".parse().unwrap());
    let err = handler
        .handle(
            endpoint.as_endpoint(),
            SocketAddr::new(IpAddr::V4(record.ip), 80),
        )
        .await
        .unwrap_err();

    match err {
        TunnelError::Dial { source, .. } => assert!(matches!(source, DialError::Socks5(_))),
        other => panic!("expected Dial, got {other:?}"),
    }
    assert_eq!(endpoint.closes(), 1);
}

#[tokio::test]
async fn test_unknown_proxy_tag() {
    let dialer = ProxyDialer::default();
    let err = dialer.dial("missing", "example.com:80").await.err().unwrap();
    assert!(matches!(err, DialError::ProxyNotFound { .. }));
}

#[tokio::test]
async fn test_unknown_address_uses_default_direct_outbound() {
    // An echo server reached directly, by address
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 64];
        let n = socket.read(&mut buf).await.unwrap();
        socket.write_all(&buf[..n]).await.unwrap();
    });

    let table = Arc::new(HijackTable::from_config(&FakeDnsConfig::default()));
    let handler = TcpHandler::new(
        Some(table),
        Arc::new(ProxyDialer::default()) as Arc<dyn Dialer>,
        TcpConfig::default(),
    );

    let endpoint = MockEndpoint::new("10.0.0.2:50002".parse().unwrap());
    endpoint.push_data(b"hi");
    let task = handler
        .handle(endpoint.as_endpoint(), addr)
        .await
        .unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(endpoint.written(), b"hi");
    assert_eq!(stats.remote_to_local, 2);
}
