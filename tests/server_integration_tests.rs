//! Integration Tests for the Connection Servers
//!
//! Binds each server mode on an ephemeral port and speaks the cache
//! protocol over real TCP.

use std::net::SocketAddr;
use std::time::Duration;

use doppio::cache::{Cache, CacheConfig};
use doppio::config::ServeMode;
use doppio::server::{self, ServerContext};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// == Helper Functions ==

struct TestServer {
    addr: SocketAddr,
    ctx: ServerContext,
    handle: JoinHandle<doppio::Result<()>>,
}

async fn start_server(mode: ServeMode, capacity: u64) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cache = Cache::with_config(CacheConfig {
        counters: 4096,
        signal_buffer: 4096,
        shards: 8,
        ..CacheConfig::new(capacity)
    });
    let ctx = ServerContext::new(cache);
    let handle = tokio::spawn(server::serve(listener, mode, ctx.clone()));
    TestServer { addr, ctx, handle }
}

async fn send(stream: &mut TcpStream, request: &[u8]) {
    stream.write_all(request).await.unwrap();
}

async fn expect(stream: &mut TcpStream, reply: &[u8]) {
    let mut buf = vec![0u8; reply.len()];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for reply")
        .unwrap();
    assert_eq!(
        String::from_utf8_lossy(&buf),
        String::from_utf8_lossy(reply)
    );
}

async fn expect_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("timed out waiting for close")
        .unwrap();
    assert_eq!(n, 0, "connection should be closed");
}

fn modes() -> [ServeMode; 2] {
    [
        ServeMode::Pooled { workers: 2 },
        ServeMode::EventLoop { loops: 2 },
    ]
}

// == Protocol Tests ==

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ping_and_echo() {
    for mode in modes() {
        let server = start_server(mode, 1024).await;
        let mut conn = TcpStream::connect(server.addr).await.unwrap();

        send(&mut conn, b"*1\r\n$4\r\nPING\r\n").await;
        expect(&mut conn, b"+PONG\r\n").await;

        send(&mut conn, b"PING hello\r\n").await;
        expect(&mut conn, b"$5\r\nhello\r\n").await;

        send(&mut conn, b"*2\r\n$4\r\nECHO\r\n$3\r\na b\r\n").await;
        expect(&mut conn, b"$3\r\na b\r\n").await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_set_get_del() {
    for mode in modes() {
        let server = start_server(mode, 1024).await;
        let mut conn = TcpStream::connect(server.addr).await.unwrap();

        send(&mut conn, b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n").await;
        expect(&mut conn, b"+OK\r\n").await;

        send(&mut conn, b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n").await;
        expect(&mut conn, b"$5\r\nvalue\r\n").await;

        send(&mut conn, b"DEL key other\r\n").await;
        expect(&mut conn, b":1\r\n").await;

        send(&mut conn, b"GET key\r\n").await;
        expect(&mut conn, b"$-1\r\n").await;

        send(&mut conn, b"DEL\r\n").await;
        expect(&mut conn, b"-ERR invalid number of arguments\r\n").await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_writes_visible_across_connections() {
    for mode in modes() {
        let server = start_server(mode, 1024).await;
        let mut writer = TcpStream::connect(server.addr).await.unwrap();
        let mut reader = TcpStream::connect(server.addr).await.unwrap();

        send(&mut writer, b"SET shared 42\r\n").await;
        expect(&mut writer, b"+OK\r\n").await;

        send(&mut reader, b"GET shared\r\n").await;
        expect(&mut reader, b"$2\r\n42\r\n").await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_command_keeps_connection_open() {
    for mode in modes() {
        let server = start_server(mode, 1024).await;
        let mut conn = TcpStream::connect(server.addr).await.unwrap();

        send(&mut conn, b"FOOBAR 1 2\r\n").await;
        expect(&mut conn, b"-ERR unknown command 'FOOBAR'\r\n").await;

        send(&mut conn, b"PING\r\n").await;
        expect(&mut conn, b"+PONG\r\n").await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipelined_requests_answered_in_order() {
    for mode in modes() {
        let server = start_server(mode, 1024).await;
        let mut conn = TcpStream::connect(server.addr).await.unwrap();

        send(&mut conn, b"SET a 1\r\nSET b 2\r\nGET a\r\nGET b\r\nDEL a b\r\n").await;
        expect(&mut conn, b"+OK\r\n+OK\r\n$1\r\n1\r\n$1\r\n2\r\n:2\r\n").await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_split_across_writes() {
    for mode in modes() {
        let server = start_server(mode, 1024).await;
        let mut conn = TcpStream::connect(server.addr).await.unwrap();

        send(&mut conn, b"*2\r\n$4\r\nECHO\r\n$11\r\nhello").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        send(&mut conn, b" world\r\n").await;
        expect(&mut conn, b"$11\r\nhello world\r\n").await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_quit_closes_connection() {
    for mode in modes() {
        let server = start_server(mode, 1024).await;
        let mut conn = TcpStream::connect(server.addr).await.unwrap();

        send(&mut conn, b"QUIT\r\n").await;
        expect(&mut conn, b"+OK\r\n").await;
        expect_closed(&mut conn).await;

        // The server itself keeps running.
        let mut other = TcpStream::connect(server.addr).await.unwrap();
        send(&mut other, b"PING\r\n").await;
        expect(&mut other, b"+PONG\r\n").await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_protocol_error_closes_connection() {
    for mode in modes() {
        let server = start_server(mode, 1024).await;
        let mut conn = TcpStream::connect(server.addr).await.unwrap();

        send(&mut conn, b"*1\r\n$abc\r\n").await;
        expect(&mut conn, b"-ERR Protocol error: invalid bulk length\r\n").await;
        expect_closed(&mut conn).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_capacity_scenario() {
    for mode in modes() {
        let server = start_server(mode, 100).await;
        let mut conn = TcpStream::connect(server.addr).await.unwrap();
        let a = "a".repeat(60);
        let b = "b".repeat(60);

        send(&mut conn, format!("SET a {}\r\n", a).as_bytes()).await;
        expect(&mut conn, b"+OK\r\n").await;
        send(&mut conn, b"GET a\r\n").await;
        expect(&mut conn, format!("$60\r\n{}\r\n", a).as_bytes()).await;

        send(&mut conn, format!("SET b {}\r\n", b).as_bytes()).await;
        expect(&mut conn, b"+OK\r\n").await;
        send(&mut conn, b"GET b\r\n").await;
        expect(&mut conn, format!("$60\r\n{}\r\n", b).as_bytes()).await;

        assert!(server.ctx.cache.used_cost() <= 100);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oversized_set_is_acknowledged_but_not_stored() {
    for mode in modes() {
        let server = start_server(mode, 16).await;
        let mut conn = TcpStream::connect(server.addr).await.unwrap();

        send(&mut conn, format!("SET big {}\r\n", "x".repeat(17)).as_bytes()).await;
        expect(&mut conn, b"+OK\r\n").await;
        send(&mut conn, b"GET big\r\n").await;
        expect(&mut conn, b"$-1\r\n").await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_stops_server() {
    for mode in modes() {
        let server = start_server(mode, 1024).await;
        let mut conn = TcpStream::connect(server.addr).await.unwrap();

        send(&mut conn, b"SHUTDOWN\r\n").await;
        expect(&mut conn, b"+OK\r\n").await;

        let result = tokio::time::timeout(Duration::from_secs(5), server.handle)
            .await
            .expect("server should stop after SHUTDOWN")
            .unwrap();
        assert!(result.is_ok());
        assert!(server.ctx.shutdown.is_triggered());
    }
}
