//! Minimal WebSocket client for driving the gateway in tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;
use tokio::time::timeout;

use wsdock_core::protocol::frame::{encode_frame, encode_masked_frame, parse_close_payload};
use wsdock_core::protocol::{Frame, FrameDecoder, OpCode};
use wsdock_gateway::transport::{Connection, ConnectionOptions};

pub const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];
pub const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
const IO_WAIT: Duration = Duration::from_secs(5);

pub struct TestClient<S> {
    io: S,
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl<S: AsyncRead + AsyncWrite + Unpin> TestClient<S> {
    pub fn new(io: S) -> Self {
        Self::with_buffer(io, BytesMut::new())
    }

    fn with_buffer(io: S, buf: BytesMut) -> Self {
        Self {
            io,
            buf,
            decoder: FrameDecoder::new(16 << 20),
        }
    }

    pub async fn send(&mut self, fin: bool, opcode: OpCode, payload: &[u8]) {
        let mut out = BytesMut::new();
        encode_masked_frame(fin, opcode, payload, MASK, &mut out);
        self.io.write_all(&out).await.unwrap();
    }

    pub async fn send_unmasked(&mut self, fin: bool, opcode: OpCode, payload: &[u8]) {
        let mut out = BytesMut::new();
        encode_frame(fin, opcode, payload, &mut out);
        self.io.write_all(&out).await.unwrap();
    }

    pub async fn send_text(&mut self, text: &str) {
        self.send(true, OpCode::Text, text.as_bytes()).await;
    }

    pub async fn send_json(&mut self, v: Value) {
        self.send_text(&v.to_string()).await;
    }

    /// Next frame from the server, or `None` once the stream ends.
    pub async fn read_frame(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.buf).unwrap() {
                return Some(frame);
            }
            let n = timeout(IO_WAIT, self.io.read_buf(&mut self.buf))
                .await
                .expect("timed out waiting for a frame")
                .unwrap_or(0);
            if n == 0 {
                return None;
            }
        }
    }

    pub async fn read_text(&mut self) -> String {
        let frame = self.read_frame().await.expect("stream ended");
        assert_eq!(frame.opcode, OpCode::Text, "unexpected frame {frame:?}");
        assert!(!frame.is_masked(), "server frames are never masked");
        String::from_utf8(frame.payload.to_vec()).unwrap()
    }

    pub async fn read_json(&mut self) -> Value {
        serde_json::from_str(&self.read_text().await).unwrap()
    }

    /// Read until a close frame and return its status code.
    pub async fn read_close(&mut self) -> Option<u16> {
        loop {
            let frame = self.read_frame().await.expect("stream ended before close");
            if frame.opcode == OpCode::Close {
                return parse_close_payload(&frame.payload).unwrap().map(|(code, _)| code);
            }
        }
    }
}

/// In-memory connection with the peer end wrapped in a client.
pub fn duplex_conn(opts: ConnectionOptions) -> (Arc<Connection>, TestClient<DuplexStream>) {
    let (server, client) = tokio::io::duplex(256 * 1024);
    let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
    let conn = Arc::new(Connection::new(server, Some(addr), opts));
    (conn, TestClient::new(client))
}

pub fn small_opts(max_message_size: usize) -> ConnectionOptions {
    ConnectionOptions {
        read_timeout: Duration::from_secs(5),
        write_timeout: Duration::from_secs(5),
        max_message_size,
        require_mask: true,
    }
}

pub struct HttpResponse {
    pub status: u16,
    pub head: String,
    pub body: String,
}

async fn read_head(stream: &mut TcpStream, buf: &mut BytesMut) -> String {
    loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = buf.split_to(pos + 4);
            return String::from_utf8(head.to_vec()).unwrap();
        }
        let n = timeout(IO_WAIT, stream.read_buf(buf)).await.unwrap().unwrap();
        assert!(n > 0, "connection closed before response head");
    }
}

fn status_of(head: &str) -> u16 {
    head.split_whitespace().nth(1).unwrap().parse().unwrap()
}

fn header_of<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

fn upgrade_request(path: &str, extra_headers: &[(&str, &str)]) -> String {
    let mut req = format!(
        "GET {path} HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: {SAMPLE_KEY}\r\n"
    );
    for (k, v) in extra_headers {
        req.push_str(&format!("{k}: {v}\r\n"));
    }
    req.push_str("\r\n");
    req
}

/// Send a raw request and read one complete (non-upgrade) response.
pub async fn http_request(addr: SocketAddr, raw: &str) -> HttpResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut buf = BytesMut::new();
    let head = read_head(&mut stream, &mut buf).await;
    let len: usize = header_of(&head, "content-length")
        .map(|v| v.parse().unwrap())
        .unwrap_or(0);
    while buf.len() < len {
        let n = timeout(IO_WAIT, stream.read_buf(&mut buf)).await.unwrap().unwrap();
        assert!(n > 0, "connection closed before response body");
    }
    HttpResponse {
        status: status_of(&head),
        head,
        body: String::from_utf8(buf.split_to(len).to_vec()).unwrap(),
    }
}

pub async fn try_upgrade(addr: SocketAddr, path: &str, extra_headers: &[(&str, &str)]) -> HttpResponse {
    http_request(addr, &upgrade_request(path, extra_headers)).await
}

/// Perform the opening handshake and return a client on the upgraded stream.
pub async fn connect(addr: SocketAddr, path: &str) -> TestClient<TcpStream> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(upgrade_request(path, &[]).as_bytes())
        .await
        .unwrap();
    let mut buf = BytesMut::new();
    let head = read_head(&mut stream, &mut buf).await;
    assert_eq!(status_of(&head), 101, "{head}");
    assert_eq!(
        header_of(&head, "sec-websocket-accept"),
        Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
    );
    TestClient::with_buffer(stream, buf)
}
