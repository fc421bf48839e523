//! One upgraded WebSocket stream.
//!
//! Reads and writes are serialized independently: a single reader drives the
//! frame decoder, a single writer lock keeps frames whole on the wire. Closing
//! is idempotent and wakes a reader blocked on the socket.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::debug;

use wsdock_core::error::{Result, WsDockError};
use wsdock_core::protocol::frame::{close_payload, encode_frame, parse_close_payload};
use wsdock_core::protocol::{close_code, Frame, FrameDecoder, Message, MessageAssembler, OpCode};

use crate::config::GatewaySection;

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

const READ_BUF_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_message_size: usize,
    /// Client frames must carry a mask key (RFC6455 §5.1).
    pub require_mask: bool,
}

impl ConnectionOptions {
    pub fn from_config(gw: &GatewaySection) -> Self {
        Self {
            read_timeout: gw.read_timeout(),
            write_timeout: gw.write_timeout(),
            max_message_size: gw.max_message_size,
            require_mask: true,
        }
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::from_config(&GatewaySection::default())
    }
}

struct ReadState {
    io: BoxReader,
    buf: BytesMut,
    decoder: FrameDecoder,
    assembler: MessageAssembler,
}

pub struct Connection {
    reader: Mutex<ReadState>,
    writer: Mutex<BoxWriter>,
    remote_addr: Option<SocketAddr>,
    opts: ConnectionOptions,
    close_sent: AtomicBool,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new<S>(stream: S, remote_addr: Option<SocketAddr>, opts: ConnectionOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (rd, wr) = tokio::io::split(stream);
        let (closed_tx, _) = watch::channel(false);
        Self {
            reader: Mutex::new(ReadState {
                io: Box::new(rd),
                buf: BytesMut::with_capacity(READ_BUF_CAPACITY),
                decoder: FrameDecoder::new(opts.max_message_size),
                assembler: MessageAssembler::new(opts.max_message_size),
            }),
            writer: Mutex::new(Box::new(wr)),
            remote_addr,
            opts,
            close_sent: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            closed_tx,
        }
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Read the next complete data message.
    ///
    /// Pings are answered and pongs dropped on the way. A peer close frame is
    /// echoed and reported as `ClientClosed`. Protocol and size violations
    /// send the matching close code before the error is returned.
    pub async fn read_message(&self) -> Result<Message> {
        if self.is_closed() {
            return Err(WsDockError::ConnectionClosed);
        }
        let mut closed_rx = self.closed_tx.subscribe();
        let mut state = self.reader.lock().await;

        tokio::select! {
            res = timeout(self.opts.read_timeout, self.read_loop(&mut state)) => match res {
                Ok(r) => r,
                Err(_) => Err(WsDockError::Timeout("read")),
            },
            _ = closed_rx.wait_for(|closed| *closed) => Err(WsDockError::ConnectionClosed),
        }
    }

    async fn read_loop(&self, st: &mut ReadState) -> Result<Message> {
        loop {
            let frame = self.next_frame(st).await?;

            if self.opts.require_mask && !frame.is_masked() {
                return Err(self
                    .fail(WsDockError::Protocol("client frame is not masked".into()))
                    .await);
            }

            match frame.opcode {
                OpCode::Ping => {
                    self.write_frame(OpCode::Pong, &frame.payload).await?;
                    continue;
                }
                OpCode::Pong => continue,
                OpCode::Close => {
                    match parse_close_payload(&frame.payload) {
                        Ok(status) => debug!(?status, "close frame received"),
                        Err(e) => debug!(error = %e, "malformed close frame received"),
                    }
                    if let Err(e) = self.send_close(close_code::NORMAL, "").await {
                        debug!(error = %e, "close echo not delivered");
                    }
                    return Err(WsDockError::ClientClosed);
                }
                _ => {}
            }

            match st.assembler.push(frame) {
                Ok(Some(msg)) => return Ok(msg),
                Ok(None) => continue,
                Err(e) => return Err(self.fail(e).await),
            }
        }
    }

    async fn next_frame(&self, st: &mut ReadState) -> Result<Frame> {
        loop {
            match st.decoder.decode(&mut st.buf) {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => {}
                Err(e) => return Err(self.fail(e).await),
            }

            let n = st.io.read_buf(&mut st.buf).await?;
            if n == 0 {
                return Err(if st.buf.is_empty() && !st.assembler.in_progress() {
                    WsDockError::UnexpectedEof("peer closed the stream")
                } else {
                    WsDockError::UnexpectedEof("stream closed mid-frame")
                });
            }
        }
    }

    /// Tell the peer why we are giving up, then hand the error back.
    async fn fail(&self, err: WsDockError) -> WsDockError {
        let code = match &err {
            WsDockError::PayloadTooLarge => close_code::MESSAGE_TOO_BIG,
            WsDockError::Protocol(_) => close_code::PROTOCOL_ERROR,
            _ => close_code::INTERNAL_ERROR,
        };
        if let Err(e) = self.send_close(code, &err.to_string()).await {
            debug!(error = %e, code, "close frame not delivered");
        }
        err
    }

    async fn write_frame(&self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        let mut buf = BytesMut::with_capacity(payload.len() + 14);
        encode_frame(true, opcode, payload, &mut buf);

        let mut w = self.writer.lock().await;
        let write = async {
            w.write_all(&buf).await?;
            w.flush().await?;
            Ok::<(), std::io::Error>(())
        };
        match timeout(self.opts.write_timeout, write).await {
            Ok(res) => res.map_err(WsDockError::from),
            Err(_) => Err(WsDockError::Timeout("write")),
        }
    }

    /// Send one text message as a single frame.
    pub async fn write_message(&self, text: &str) -> Result<()> {
        if self.close_sent.load(Ordering::Acquire) {
            return Err(WsDockError::ConnectionClosed);
        }
        self.write_frame(OpCode::Text, text.as_bytes()).await
    }

    pub async fn write_binary(&self, data: &[u8]) -> Result<()> {
        if self.close_sent.load(Ordering::Acquire) {
            return Err(WsDockError::ConnectionClosed);
        }
        self.write_frame(OpCode::Binary, data).await
    }

    /// Send a close frame. Only the first call writes anything.
    pub async fn send_close(&self, code: u16, reason: &str) -> Result<()> {
        if self.close_sent.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.write_frame(OpCode::Close, &close_payload(code, reason)).await
    }

    /// Close the connection. Safe to call any number of times.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.closed_tx.send_replace(true);

        if let Err(e) = self.send_close(close_code::NORMAL, "normal closure").await {
            debug!(error = %e, "close frame not delivered");
        }
        let mut w = self.writer.lock().await;
        if let Ok(Err(e)) = timeout(self.opts.write_timeout, w.shutdown()).await {
            debug!(error = %e, "stream shutdown failed");
        }
    }
}
