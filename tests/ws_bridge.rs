//! End-to-end: MemoryQueue → pipeline → axum server → WebSocket clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use queuecast::server::{self, AppState, WsTimers};
use queuecast::{
    MemoryQueue, Metrics, Pipeline, PipelineConfig, QueueClient, ReceiveParams, RunningPipeline,
    RuntimeError,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Bridge {
    queue: MemoryQueue,
    pipeline: RunningPipeline,
    addr: SocketAddr,
    http: JoinHandle<Result<(), RuntimeError>>,
}

async fn start_bridge(timers: WsTimers) -> Bridge {
    let queue = MemoryQueue::new();
    let clients: Vec<Arc<dyn QueueClient>> = vec![Arc::new(queue.clone())];
    let metrics = Arc::new(Metrics::new());
    let cfg = PipelineConfig {
        receive: ReceiveParams {
            wait: Duration::from_millis(50),
            ..ReceiveParams::default()
        },
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(cfg, clients, metrics.clone()).unwrap().start();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(pipeline.hub().clone(), metrics, timers);
    let router = server::router("/stream", state);
    let http = tokio::spawn(server::serve(listener, router, pipeline.shutdown_token()));

    Bridge {
        queue,
        pipeline,
        addr,
        http,
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/stream")).await.unwrap();
    ws
}

async fn next_frame(client: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("frame within 5s")
        .expect("stream open")
        .expect("valid frame")
}

async fn wait_for_subscribers(pipeline: &RunningPipeline, n: usize) {
    for _ in 0..500 {
        if pipeline.hub().subscriber_count().await.unwrap() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("subscriber count never reached {n}");
}

/// Minimal HTTP/1.1 GET; returns the response body.
async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_owned())
        .unwrap_or_default()
}

#[tokio::test]
async fn websocket_clients_receive_broadcast_and_close_on_shutdown() {
    let bridge = start_bridge(WsTimers::default()).await;
    let mut a = connect(bridge.addr).await;
    let mut b = connect(bridge.addr).await;
    wait_for_subscribers(&bridge.pipeline, 2).await;

    bridge.queue.push_all([
        Bytes::from_static(b"hello"),
        Bytes::from_static(&[0xff, 0x00]),
    ]);

    for client in [&mut a, &mut b] {
        match next_frame(client).await {
            Message::Text(text) => assert_eq!(text.as_str(), "hello"),
            other => panic!("expected text frame, got {other:?}"),
        }
        match next_frame(client).await {
            Message::Binary(data) => assert_eq!(&data[..], &[0xffu8, 0x00][..]),
            other => panic!("expected binary frame, got {other:?}"),
        }
    }

    let metrics = http_get(bridge.addr, "/metrics").await;
    assert!(metrics.contains("queuecast_message_counter 2\n"), "{metrics}");

    let health: serde_json::Value =
        serde_json::from_str(&http_get(bridge.addr, "/health").await).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["subscribers"], 2);

    a.close(None).await.unwrap();
    wait_for_subscribers(&bridge.pipeline, 1).await;

    for _ in 0..500 {
        if bridge.queue.in_flight_len() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(bridge.queue.deleted().len(), 2);

    bridge
        .pipeline
        .shutdown(Duration::from_secs(5))
        .await
        .unwrap();
    assert!(matches!(next_frame(&mut b).await, Message::Close(_)));

    tokio::time::timeout(Duration::from_secs(5), bridge.http)
        .await
        .expect("server stops after shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn upgrade_is_refused_once_hub_has_stopped() {
    let bridge = start_bridge(WsTimers::default()).await;
    let hub = bridge.pipeline.hub().clone();
    let pipeline = bridge.pipeline;

    let state = AppState::new(hub, Arc::new(Metrics::new()), WsTimers::default());
    let router = server::router("/stream", state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let late_addr = listener.local_addr().unwrap();
    let token = tokio_util::sync::CancellationToken::new();
    let late = tokio::spawn(server::serve(listener, router, token.clone()));

    pipeline.shutdown(Duration::from_secs(5)).await.unwrap();
    assert!(connect_async(format!("ws://{late_addr}/stream")).await.is_err());

    token.cancel();
    late.await.unwrap().unwrap();
}

#[tokio::test]
async fn silent_client_is_dropped_after_pong_timeout() {
    let timers = WsTimers {
        write_timeout: Duration::from_millis(100),
        pong_timeout: Duration::from_millis(150),
        ping_interval: Duration::from_millis(50),
    };
    let bridge = start_bridge(timers).await;
    let mut live = connect(bridge.addr).await;
    // Never polled, so it never answers a ping.
    let silent = connect(bridge.addr).await;
    wait_for_subscribers(&bridge.pipeline, 2).await;

    // Reading answers pings; six of them span twice the pong timeout.
    let reader = tokio::spawn(async move {
        let mut pings = 0;
        while pings < 6 {
            match next_frame(&mut live).await {
                Message::Ping(_) => pings += 1,
                other => panic!("expected ping, got {other:?}"),
            }
        }
        live
    });

    wait_for_subscribers(&bridge.pipeline, 1).await;
    let _live = reader.await.unwrap();
    assert_eq!(bridge.pipeline.hub().subscriber_count().await.unwrap(), 1);
    drop(silent);

    bridge
        .pipeline
        .shutdown(Duration::from_secs(5))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), bridge.http)
        .await
        .expect("server stops after shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn abandoned_upgrade_leaves_no_subscriber() {
    let bridge = start_bridge(WsTimers::default()).await;

    let mut stream = TcpStream::connect(bridge.addr).await.unwrap();
    stream
        .write_all(
            b"GET /stream HTTP/1.1\r\n\
              Host: localhost\r\n\
              Connection: Upgrade\r\n\
              Upgrade: websocket\r\n\
              Sec-WebSocket-Version: 13\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        )
        .await
        .unwrap();
    drop(stream);

    tokio::time::sleep(Duration::from_millis(100)).await;
    wait_for_subscribers(&bridge.pipeline, 0).await;

    bridge
        .pipeline
        .shutdown(Duration::from_secs(5))
        .await
        .unwrap();
}
