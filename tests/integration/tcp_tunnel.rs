//! TCP tunnel integration tests
//!
//! Accept events go through `TcpHandler` with a real hijack table and a
//! recording dialer, so the dial target, the block policy and the teardown
//! can all be observed from outside.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use ipnet::Ipv4Net;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use tunrelay::config::TcpConfig;
use tunrelay::error::{DialError, TunnelError};
use tunrelay::fakedns::{HijackTable, BLOCK_PROXY};
use tunrelay::outbound::Dialer;
use tunrelay::tunnel::TcpHandler;

use super::mocks::{MockDialer, MockEndpoint};

const CLIENT: &str = "10.0.0.2:51000";

fn table() -> Arc<HijackTable> {
    Arc::new(HijackTable::new(
        Ipv4Addr::new(198, 18, 0, 1),
        Ipv4Net::from_str("198.18.0.0/24").unwrap(),
        Duration::from_secs(600),
    ))
}

fn handler(table: &Arc<HijackTable>, dialer: &Arc<MockDialer>) -> TcpHandler {
    TcpHandler::new(
        Some(Arc::clone(table)),
        Arc::clone(dialer) as Arc<dyn Dialer>,
        TcpConfig::default(),
    )
}

fn dst(ip: Ipv4Addr, port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(ip), port)
}

async fn wait_written(endpoint: &MockEndpoint, expected: &[u8]) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while endpoint.written() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("endpoint never received the expected bytes");
}

#[tokio::test]
async fn test_hijacked_address_dialed_by_hostname() {
    let table = table();
    let record = table.set("api.example.com", "proxy-a").unwrap();

    let dialer = MockDialer::new();
    let peer = dialer.prepare();
    let handler = handler(&table, &dialer);

    let endpoint = MockEndpoint::new(CLIENT.parse().unwrap());
    let task = handler
        .handle(endpoint.as_endpoint(), dst(record.ip, 443))
        .await
        .unwrap();

    assert_eq!(
        dialer.calls(),
        vec![("proxy-a".to_string(), "api.example.com:443".to_string())]
    );
    assert_eq!(*peer.keepalive.lock(), Some(true));
    // Dialing through the table counts as a hit
    assert_eq!(table.get("api.example.com").unwrap().hits, 3);

    drop(peer);
    let stats = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert!(stats.close_reason.is_none());
}

#[tokio::test]
async fn test_unknown_address_dialed_by_ip() {
    let table = table();
    let dialer = MockDialer::new();
    let peer = dialer.prepare();
    let handler = handler(&table, &dialer);

    let endpoint = MockEndpoint::new(CLIENT.parse().unwrap());
    let task = handler
        .handle(endpoint.as_endpoint(), dst(Ipv4Addr::new(93, 184, 216, 34), 80))
        .await
        .unwrap();

    assert_eq!(
        dialer.calls(),
        vec![(String::new(), "93.184.216.34:80".to_string())]
    );

    drop(peer);
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(endpoint.closes(), 1);
}

#[tokio::test]
async fn test_without_table_everything_dialed_by_ip() {
    let dialer = MockDialer::new();
    let peer = dialer.prepare();
    let handler = TcpHandler::new(
        None,
        Arc::clone(&dialer) as Arc<dyn Dialer>,
        TcpConfig::default(),
    );

    let endpoint = MockEndpoint::new(CLIENT.parse().unwrap());
    let task = handler
        .handle(endpoint.as_endpoint(), dst(Ipv4Addr::new(198, 18, 0, 7), 8080))
        .await
        .unwrap();

    assert_eq!(dialer.calls()[0].1, "198.18.0.7:8080");

    drop(peer);
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_blocked_domain_never_dialed() {
    let table = table();
    let record = table.set("ads.example.net", BLOCK_PROXY).unwrap();

    let dialer = MockDialer::new();
    let handler = handler(&table, &dialer);

    let endpoint = MockEndpoint::new(CLIENT.parse().unwrap());
    let err = handler
        .handle(endpoint.as_endpoint(), dst(record.ip, 443))
        .await
        .unwrap_err();

    match err {
        TunnelError::Blocked { domain } => assert_eq!(domain, "ads.example.net"),
        other => panic!("expected Blocked, got {other:?}"),
    }
    assert!(dialer.calls().is_empty());
    assert_eq!(endpoint.closes(), 1);

    let stats = handler.stats().snapshot();
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.blocked, 1);
    assert_eq!(stats.active, 0);
}

#[tokio::test]
async fn test_dial_failure_reported() {
    let table = table();
    let record = table.set("down.example.com", "proxy-b").unwrap();

    // Nothing prepared: the dialer refuses
    let dialer = MockDialer::new();
    let handler = handler(&table, &dialer);

    let endpoint = MockEndpoint::new(CLIENT.parse().unwrap());
    let err = handler
        .handle(endpoint.as_endpoint(), dst(record.ip, 22))
        .await
        .unwrap_err();

    match err {
        TunnelError::Dial {
            target,
            proxy,
            source,
        } => {
            assert_eq!(target, "down.example.com:22");
            assert_eq!(proxy, "proxy-b");
            assert!(matches!(source, DialError::ConnectionFailed { .. }));
        }
        other => panic!("expected Dial, got {other:?}"),
    }
    assert_eq!(endpoint.closes(), 1);
    assert_eq!(handler.stats().snapshot().failed, 1);
}

#[tokio::test]
async fn test_relay_both_directions_then_teardown() {
    let table = table();
    let record = table.set("echo.example.com", "").unwrap();

    let dialer = MockDialer::new();
    let mut peer = dialer.prepare();
    let handler = handler(&table, &dialer);

    let endpoint = MockEndpoint::new(CLIENT.parse().unwrap());
    endpoint.push_data(b"ping");
    let task = handler
        .handle(endpoint.as_endpoint(), dst(record.ip, 7))
        .await
        .unwrap();

    let mut buf = [0u8; 4];
    peer.io.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    peer.io.write_all(b"pong").await.unwrap();
    wait_written(&endpoint, b"pong").await;
    assert_eq!(handler.stats().active(), 1);

    // Remote EOF ends the tunnel
    let shutdowns = Arc::clone(&peer.shutdowns);
    drop(peer);

    let stats = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.local_to_remote, 4);
    assert_eq!(stats.remote_to_local, 4);
    assert!(stats.close_reason.is_none());

    assert_eq!(endpoint.closes(), 1);
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);

    let snapshot = handler.stats().snapshot();
    assert_eq!(snapshot.active, 0);
    assert_eq!(snapshot.completed, 1);
    assert_eq!(snapshot.total_bytes(), 8);
}

#[tokio::test]
async fn test_many_tunnels_share_one_record() {
    let table = table();
    let record = table.set("busy.example.com", "p").unwrap();

    let dialer = MockDialer::new();
    let handler = handler(&table, &dialer);

    let mut peers = Vec::new();
    let mut tasks = Vec::new();
    for port in 1000..1010 {
        peers.push(dialer.prepare());
        let endpoint = MockEndpoint::new(CLIENT.parse().unwrap());
        tasks.push(
            handler
                .handle(endpoint.as_endpoint(), dst(record.ip, port))
                .await
                .unwrap(),
        );
    }

    assert_eq!(handler.stats().active(), 10);
    assert_eq!(dialer.calls().len(), 10);
    assert!(dialer
        .calls()
        .iter()
        .all(|(proxy, target)| proxy == "p" && target.starts_with("busy.example.com:")));

    drop(peers);
    for task in tasks {
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
    assert_eq!(handler.stats().snapshot().completed, 10);
}
