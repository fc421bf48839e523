//! Full stack: TCP accept, HTTP upgrade, workers, dispatch, shutdown.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, Uri};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use wsdock_core::protocol::{close_code, OpCode};
use wsdock_core::Result;
use wsdock_gateway::app_state::AppState;
use wsdock_gateway::config::GatewayConfig;
use wsdock_gateway::context::RequestInfo;
use wsdock_gateway::dispatch::{trace_actions, Dispatcher};
use wsdock_gateway::realtime::{ConnEvent, ConnEventKind, ConnEventListener, ConnRegistry};
use wsdock_gateway::transport::ws::run_connection;
use wsdock_gateway::{services, Server};

use common::{connect, http_request, try_upgrade, TestClient};

struct Running {
    addr: SocketAddr,
    registry: Arc<ConnRegistry>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<()>>,
}

fn config() -> GatewayConfig {
    let mut cfg = GatewayConfig::default();
    cfg.gateway.read_timeout_ms = 5_000;
    cfg.gateway.write_timeout_ms = 5_000;
    cfg.gateway.shutdown_timeout_ms = 200;
    cfg
}

async fn start(cfg: GatewayConfig) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut server = Server::new(cfg);
    server.use_middleware(trace_actions());
    services::register_builtin(&mut server).unwrap();
    let registry = server.registry();

    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.serve(listener, async move {
        let _ = stopped.await;
    }));
    Running {
        addr,
        registry,
        stop,
        task,
    }
}

struct Offline(mpsc::UnboundedSender<String>);

#[async_trait]
impl ConnEventListener for Offline {
    async fn on_conn_event(&self, event: ConnEvent) {
        if event.kind == ConnEventKind::Offline {
            let _ = self.0.send(event.close_reason.unwrap_or_default());
        }
    }
}

async fn offline_reasons(registry: &ConnRegistry) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    registry.event_bus().subscribe("offline", Arc::new(Offline(tx))).unwrap();
    rx
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out")
        .expect("closed")
}

#[tokio::test]
async fn echo_round_trip() {
    let srv = start(config()).await;
    let mut client = connect(srv.addr, "/ws").await;

    client
        .send_json(json!({"action": "echo", "request_id": "r1", "data": {"x": 1}}))
        .await;
    assert_eq!(
        client.read_json().await,
        json!({"code": 200, "msg": "success", "data": {"x": 1}, "request_id": "r1"})
    );
}

#[tokio::test]
async fn bad_message_keeps_connection_open() {
    let srv = start(config()).await;
    let mut client = connect(srv.addr, "/ws").await;

    client.send_text("not json").await;
    let reply = client.read_json().await;
    assert_eq!(reply["code"], 400);
    assert_eq!(reply["msg"], "bad message");

    client.send(true, OpCode::Binary, &[0xde, 0xad]).await;
    assert_eq!(client.read_json().await["code"], 400);

    client.send_json(json!({"action": "echo", "data": "still here"})).await;
    assert_eq!(client.read_json().await["data"], "still here");
}

#[tokio::test]
async fn unknown_action_is_404() {
    let srv = start(config()).await;
    let mut client = connect(srv.addr, "/ws").await;

    client.send_json(json!({"action": "nope", "request_id": "x"})).await;
    let reply = client.read_json().await;
    assert_eq!(reply["code"], 404);
    assert_eq!(reply["msg"], "unknown action");
    assert_eq!(reply["request_id"], "x");
}

#[tokio::test]
async fn fragmented_request_with_ping() {
    let srv = start(config()).await;
    let mut client = connect(srv.addr, "/ws").await;

    let body = json!({"action": "echo", "data": [1, 2, 3]}).to_string();
    let (a, b) = body.as_bytes().split_at(10);
    client.send(false, OpCode::Text, a).await;
    client.send(true, OpCode::Ping, b"hb").await;
    client.send(true, OpCode::Continuation, b).await;

    let pong = client.read_frame().await.unwrap();
    assert_eq!(pong.opcode, OpCode::Pong);
    assert_eq!(&pong.payload[..], b"hb");
    assert_eq!(client.read_json().await["data"], json!([1, 2, 3]));
}

#[tokio::test]
async fn too_many_connections_gets_503() {
    let mut cfg = config();
    cfg.gateway.max_connections = 1;
    let srv = start(cfg).await;

    let mut first = connect(srv.addr, "/ws").await;
    let res = try_upgrade(srv.addr, "/ws", &[]).await;
    assert_eq!(res.status, 503);
    assert_eq!(res.body, "too many connections");

    first.send_json(json!({"action": "echo"})).await;
    assert_eq!(first.read_json().await["code"], 200);
}

#[tokio::test]
async fn slot_is_released_after_disconnect() {
    let mut cfg = config();
    cfg.gateway.max_connections = 1;
    let srv = start(cfg).await;
    let mut reasons = offline_reasons(&srv.registry).await;

    let mut first = connect(srv.addr, "/ws").await;
    first.send(true, OpCode::Close, &1000u16.to_be_bytes()).await;
    assert_eq!(first.read_close().await, Some(close_code::NORMAL));
    assert_eq!(recv(&mut reasons).await, "normal closure");

    // the slot is dropped right after the offline event
    let mut second = None;
    for _ in 0..50 {
        let res = try_upgrade(srv.addr, "/ws", &[]).await;
        if res.status == 101 {
            second = Some(res);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(second.is_some(), "slot never released");
}

#[tokio::test]
async fn origin_mismatch_is_403() {
    let mut cfg = config();
    cfg.gateway.origin = "https://app.example".into();
    let srv = start(cfg).await;

    let res = try_upgrade(srv.addr, "/ws", &[("Origin", "https://evil.example")]).await;
    assert_eq!(res.status, 403);
    assert!(res.body.contains("origin"), "{}", res.body);
    assert_eq!(srv.registry.conn_count(), 0);
}

#[tokio::test]
async fn malformed_handshake_is_400() {
    let srv = start(config()).await;
    let raw = "GET /ws HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
               Sec-WebSocket-Version: 8\r\nSec-WebSocket-Key: abc\r\n\r\n";
    let res = http_request(srv.addr, raw).await;
    assert_eq!(res.status, 400);
    assert!(res.body.starts_with("handshake failed:"), "{}", res.body);
}

#[tokio::test]
async fn slow_request_head_gets_504() {
    let mut cfg = config();
    cfg.gateway.handshake_timeout_ms = 200;
    cfg.gateway.max_connections = 1;
    let srv = start(cfg).await;

    let started = tokio::time::Instant::now();
    let partial = "GET /ws HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\n";
    let res = http_request(srv.addr, partial).await;
    assert_eq!(res.status, 504);
    assert_eq!(res.body, "handshake timeout");
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(srv.registry.conn_count(), 0);

    let mut client = connect(srv.addr, "/ws").await;
    client.send_json(json!({"action": "echo", "data": 1})).await;
    assert_eq!(client.read_json().await["data"], 1);
}

#[tokio::test]
async fn ops_endpoints() {
    let srv = start(config()).await;
    let res = http_request(srv.addr, "GET /healthz HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert_eq!((res.status, res.body.as_str()), (200, "ok"));
    let res = http_request(srv.addr, "GET /readyz HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert_eq!((res.status, res.body.as_str()), (200, "ready"));
}

#[tokio::test]
async fn oversize_message_closes_1009() {
    let mut cfg = config();
    cfg.gateway.max_message_size = 64;
    let srv = start(cfg).await;
    let mut reasons = offline_reasons(&srv.registry).await;

    let mut client = connect(srv.addr, "/ws").await;
    client.send_text(&"z".repeat(200)).await;

    assert_eq!(client.read_close().await, Some(close_code::MESSAGE_TOO_BIG));
    assert_eq!(recv(&mut reasons).await, "size exceeded");
}

#[tokio::test]
async fn chat_broadcast_reaches_all_peers() {
    let srv = start(config()).await;
    let mut a = connect(srv.addr, "/ws").await;
    let mut b = connect(srv.addr, "/ws").await;

    for _ in 0..50 {
        if srv.registry.conn_count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    a.send_json(json!({"action": "chat.send", "request_id": "c1", "data": {"msg": "hi"}}))
        .await;

    let on_b = b.read_json().await;
    assert_eq!(on_b["action"], "chat.msg");
    assert_eq!(on_b["data"]["msg"], "hi");

    let mut saw_msg = false;
    let mut saw_reply = false;
    for _ in 0..2 {
        let v = a.read_json().await;
        if v["action"] == "chat.msg" {
            saw_msg = true;
        } else {
            assert_eq!(v["code"], 200);
            assert_eq!(v["data"]["delivered"], 2);
            assert_eq!(v["request_id"], "c1");
            saw_reply = true;
        }
    }
    assert!(saw_msg && saw_reply);
}

#[tokio::test]
async fn conn_info_reports_the_caller() {
    let srv = start(config()).await;
    let mut client = connect(srv.addr, "/ws").await;

    client.send_json(json!({"action": "conn.info"})).await;
    let reply = client.read_json().await;
    assert_eq!(reply["code"], 200);
    assert_eq!(reply["data"]["client_ip"], "127.0.0.1");
    let id = reply["data"]["conn_id"].as_str().unwrap();
    assert!(srv.registry.get_conn_info(id).is_some());
}

#[tokio::test]
async fn shutdown_closes_lingering_connections() {
    let srv = start(config()).await;
    let mut reasons = offline_reasons(&srv.registry).await;
    let mut client = connect(srv.addr, "/ws").await;

    client.send_json(json!({"action": "echo"})).await;
    assert_eq!(client.read_json().await["code"], 200);

    srv.stop.send(()).unwrap();
    assert_eq!(client.read_close().await, Some(close_code::GOING_AWAY));
    assert_eq!(recv(&mut reasons).await, "server shutdown");

    let res = tokio::time::timeout(Duration::from_secs(5), srv.task)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(res.is_ok());
    assert_eq!(srv.registry.conn_count(), 0);
}

#[tokio::test]
async fn bind_failure_aborts_startup() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut cfg = config();
    cfg.gateway.listen = taken.local_addr().unwrap().to_string();

    let res = Server::new(cfg).run_with_shutdown(async {}).await;
    assert!(res.is_err());
}

#[tokio::test]
async fn missing_tls_material_aborts_startup() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut cfg = config();
    cfg.gateway.tls = Some(wsdock_gateway::config::TlsSection {
        cert_file: "/nonexistent/cert.pem".into(),
        key_file: "/nonexistent/key.pem".into(),
    });

    let err = Server::new(cfg).serve(listener, async {}).await.unwrap_err();
    assert!(matches!(err, wsdock_core::WsDockError::Tls(_)));
}

#[tokio::test]
async fn upgrade_finishing_during_drain_is_closed() {
    let registry = Arc::new(ConnRegistry::new());
    let mut reasons = offline_reasons(&registry).await;
    let app = AppState::new(config(), Dispatcher::new(), Arc::clone(&registry));
    let slot = app.try_admit().unwrap();
    app.set_draining(true);

    let (server_io, client_io) = tokio::io::duplex(4096);
    let uri: Uri = "/ws".parse().unwrap();
    let request = Arc::new(RequestInfo::from_parts(&Method::GET, &uri, &HeaderMap::new(), None));
    run_connection(app.clone(), server_io, request, slot).await;

    let mut client = TestClient::new(client_io);
    assert_eq!(client.read_close().await, Some(close_code::GOING_AWAY));
    assert_eq!(recv(&mut reasons).await, "server shutdown");
    assert_eq!(registry.conn_count(), 0);
    assert_eq!(app.active_connections(), 0);
}
