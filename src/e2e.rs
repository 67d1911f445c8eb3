//! End-to-end tests over real TCP connections.

use crate::demo::{foo_service, Args};
use futures::future::join_all;
use minirpc_client::{Call, Client, ClientError, ConnectionConfig};
use minirpc_protocol::{read_options, CodecType, MessageReader};
use minirpc_server::{Server, ServerConfig};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const DEADLINE: Duration = Duration::from_secs(5);

struct TestServer {
    server: Arc<Server>,
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

async fn start_server() -> TestServer {
    let server = Arc::new(Server::new(ServerConfig::default()));
    server.register(foo_service()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let accepting = server.clone();
    let handle = tokio::spawn(async move {
        accepting.accept(listener).await.unwrap();
    });

    TestServer {
        server,
        addr,
        handle,
    }
}

async fn dial(addr: SocketAddr, codec: CodecType) -> Client {
    Client::dial(addr, ConnectionConfig::new().with_codec(codec))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_sum_round_trip_with_each_codec() {
    let ts = start_server().await;

    for codec in CodecType::ALL {
        let client = dial(ts.addr, codec).await;
        let sum: i64 = client
            .call("Foo.Sum", &Args { num1: 3, num2: 4 })
            .await
            .unwrap();
        assert_eq!(sum, 7);
        client.close().await.unwrap();
    }

    let method = ts.server.resolve("Foo.Sum").unwrap();
    assert_eq!(method.num_calls(), 2);
}

#[tokio::test]
async fn test_concurrent_calls_complete_exactly_once() {
    let ts = start_server().await;
    let client = dial(ts.addr, CodecType::Postcard).await;

    let calls = (0..100i64).map(|i| {
        let client = &client;
        async move {
            let sum: Result<i64, ClientError> = client
                .call("Foo.Sum", &Args { num1: i, num2: i * i })
                .await;
            (i, sum)
        }
    });

    let results = tokio::time::timeout(DEADLINE, join_all(calls)).await.unwrap();
    assert_eq!(results.len(), 100);
    for (i, sum) in results {
        assert_eq!(sum.unwrap(), i + i * i);
    }
    assert_eq!(client.pending_count(), 0);
    assert_eq!(
        ts.server.stats().requests_total.load(Ordering::Relaxed),
        100
    );
}

#[tokio::test]
async fn test_unknown_method_keeps_connection_usable() {
    let ts = start_server().await;
    let client = dial(ts.addr, CodecType::Json).await;

    let err = client
        .call::<_, i64>("Foo.Missing", &Args { num1: 1, num2: 2 })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ServerError(_)));
    assert!(err.to_string().contains("not found"));

    let err = client
        .call::<_, i64>("Bar.Sum", &Args { num1: 1, num2: 2 })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));

    let err = client
        .call::<_, i64>("Foo.Sum", &"not args")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("read argument failed"));

    let sum: i64 = client
        .call("Foo.Sum", &Args { num1: 20, num2: 22 })
        .await
        .unwrap();
    assert_eq!(sum, 42);
    assert!(client.is_available());
}

#[tokio::test]
async fn test_wrong_magic_number_is_rejected() {
    let ts = start_server().await;
    let mut stream = TcpStream::connect(ts.addr).await.unwrap();

    stream
        .write_all(b"{\"MagicNumber\":42,\"CodecType\":\"application/json\"}\n")
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(DEADLINE, stream.read(&mut buf))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
    assert_eq!(ts.server.stats().requests_total.load(Ordering::Relaxed), 0);

    // The server keeps accepting other connections.
    let client = dial(ts.addr, CodecType::Json).await;
    let sum: i64 = client
        .call("Foo.Sum", &Args { num1: 1, num2: 1 })
        .await
        .unwrap();
    assert_eq!(sum, 2);
}

#[tokio::test]
async fn test_unsupported_codec_is_rejected() {
    let ts = start_server().await;
    let mut stream = TcpStream::connect(ts.addr).await.unwrap();

    stream
        .write_all(b"{\"MagicNumber\":3927900,\"CodecType\":\"application/gob\"}\n")
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(DEADLINE, stream.read(&mut buf))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_slow_call_matched_to_its_own_sequence() {
    let ts = start_server().await;
    let client = dial(ts.addr, CodecType::Json).await;

    let slow: Call<i64> = client.go("Foo.Sleep", &Args { num1: 300, num2: 1 }).await;
    let fast: Call<i64> = client.go("Foo.Sleep", &Args { num1: 10, num2: 2 }).await;
    assert!(slow.seq() < fast.seq());

    let fast_sum = tokio::time::timeout(DEADLINE, fast.done())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fast_sum, 12);
    assert_eq!(client.pending_count(), 1);

    let slow_sum = tokio::time::timeout(DEADLINE, slow.done())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(slow_sum, 301);
}

#[tokio::test]
async fn test_pending_calls_fail_when_connection_drops() {
    // A server that negotiates, reads the calls, then drops the socket.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let dropping = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut read_half, _write_half) = stream.into_split();
        let (options, leftover) = read_options(&mut read_half).await.unwrap();
        let mut reader = MessageReader::with_buffered(read_half, options.codec_type, leftover);
        for _ in 0..5 {
            reader.read_header().await.unwrap();
        }
    });

    let client = dial(addr, CodecType::Postcard).await;
    let mut calls = Vec::new();
    for i in 0..5 {
        let call: Call<i64> = client.go("Foo.Sum", &Args { num1: i, num2: i }).await;
        calls.push(call);
    }
    dropping.await.unwrap();

    for call in calls {
        let result = tokio::time::timeout(DEADLINE, call.done()).await.unwrap();
        assert!(result.is_err());
    }
    assert_eq!(client.pending_count(), 0);
    assert!(!client.is_available());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let ts = start_server().await;
    let client = dial(ts.addr, CodecType::Postcard).await;

    client.close().await.unwrap();
    assert!(matches!(
        client.close().await,
        Err(ClientError::AlreadyShutdown)
    ));

    let err = client
        .call::<_, i64>("Foo.Sum", &Args { num1: 1, num2: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Shutdown));
}

#[tokio::test]
async fn test_dial_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = Client::dial(addr, ConnectionConfig::new()).await;
    assert!(matches!(result, Err(ClientError::Io(_))));
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let ts = start_server().await;
    let client = dial(ts.addr, CodecType::Json).await;
    let _: i64 = client
        .call("Foo.Sum", &Args { num1: 1, num2: 1 })
        .await
        .unwrap();
    assert!(ts.server.is_running());

    ts.server.shutdown();
    tokio::time::timeout(DEADLINE, ts.handle)
        .await
        .unwrap()
        .unwrap();
    assert!(!ts.server.is_running());
    assert_eq!(
        ts.server.stats().connections_total.load(Ordering::Relaxed),
        1
    );
}
