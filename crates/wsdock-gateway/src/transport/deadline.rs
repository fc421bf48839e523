//! Handshake deadline for the HTTP request head.
//!
//! hyper's own header timer closes the socket silently. This wrapper sits
//! under hyper instead: if the head has not reached the service by the
//! deadline, it writes a 504 "handshake timeout" and then reports EOF.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep_until, Instant, Sleep};

pub(crate) const TIMEOUT_RESPONSE: &[u8] = b"HTTP/1.1 504 Gateway Timeout\r\n\
content-type: text/plain; charset=utf-8\r\n\
content-length: 17\r\n\
connection: close\r\n\
\r\n\
handshake timeout";

/// Set by the HTTP service once a request head has been parsed.
#[derive(Clone, Default)]
pub(crate) struct HeadSeen(Arc<AtomicBool>);

impl HeadSeen {
    pub(crate) fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

enum Phase {
    Armed,
    Passed,
    Replying(usize),
    Expired,
}

pub(crate) struct HeadDeadline<S> {
    inner: S,
    timer: Pin<Box<Sleep>>,
    seen: HeadSeen,
    phase: Phase,
}

impl<S> HeadDeadline<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(inner: S, deadline: Instant, seen: HeadSeen) -> Self {
        Self {
            inner,
            timer: Box::pin(sleep_until(deadline)),
            seen,
            phase: Phase::Armed,
        }
    }

    fn poll_reply(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while let Phase::Replying(sent) = self.phase {
            if sent == TIMEOUT_RESPONSE.len() {
                ready!(Pin::new(&mut self.inner).poll_flush(cx))?;
                self.phase = Phase::Expired;
            } else {
                let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &TIMEOUT_RESPONSE[sent..]))?;
                if n == 0 {
                    return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
                }
                self.phase = Phase::Replying(sent + n);
            }
        }
        Poll::Ready(Ok(()))
    }
}

impl<S> AsyncRead for HeadDeadline<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if let Phase::Armed = this.phase {
            if this.seen.is_set() {
                this.phase = Phase::Passed;
            } else if this.timer.as_mut().poll(cx).is_ready() {
                this.phase = Phase::Replying(0);
            }
        }

        match this.phase {
            Phase::Replying(_) => {
                let res = ready!(this.poll_reply(cx));
                this.phase = Phase::Expired;
                // EOF with no bytes; hyper drops the half-read head.
                Poll::Ready(res)
            }
            Phase::Expired => Poll::Ready(Ok(())),
            Phase::Armed | Phase::Passed => Pin::new(&mut this.inner).poll_read(cx, buf),
        }
    }
}

impl<S> AsyncWrite for HeadDeadline<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
