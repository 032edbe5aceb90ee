use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// In-memory byte stream.
///
/// Reads consume from a cursor at the front of the buffer, writes append to
/// its end, so a protocol can write a message and read it back from the same
/// buffer. Shutting down closes the buffer for further I/O.
#[derive(Debug, Default, Clone)]
pub struct MemoryBuffer {
    buf: Vec<u8>,
    pos: usize,
    closed: bool,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer pre-filled with `value`, ready to be read.
    pub fn with_value(value: impl Into<Vec<u8>>) -> Self {
        Self {
            buf: value.into(),
            pos: 0,
            closed: false,
        }
    }

    /// Everything written so far, including bytes already read.
    pub fn value(&self) -> &[u8] {
        &self.buf
    }

    /// Replaces the contents and rewinds the read cursor.
    pub fn set_value(&mut self, value: impl Into<Vec<u8>>) {
        self.buf = value.into();
        self.pos = 0;
    }

    /// Bytes not yet consumed by reads.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "memory buffer closed"));
        }
        Ok(())
    }
}

impl AsyncRead for MemoryBuffer {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.check_open()?;

        let available = &this.buf[this.pos..];
        let n = available.len().min(out.remaining());
        out.put_slice(&available[..n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MemoryBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.check_open()?;
        this.buf.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().close();
        Poll::Ready(Ok(()))
    }
}
