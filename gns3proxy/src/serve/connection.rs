/*
 * Copyright 2025 gns3proxy and/or its affiliates.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::io;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const CLOSE_LINGER: Duration = Duration::from_secs(1);

/// One endpoint of a session: a split stream plus a pending-write
/// buffer. Writes are queued and pushed out by the session loop;
/// read errors are swallowed and surfaced as end-of-stream, the same
/// way the peer vanishing is.
pub(crate) struct BufferedStream<R, W> {
    reader: R,
    writer: W,
    buffer: BytesMut,
    recvbuf_size: usize,
    what: &'static str,
    closed: bool,
    rd_bytes: u64,
    wr_bytes: u64,
}

impl<R, W> BufferedStream<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub(crate) fn new(reader: R, writer: W, recvbuf_size: usize, what: &'static str) -> Self {
        BufferedStream {
            reader,
            writer,
            buffer: BytesMut::new(),
            recvbuf_size,
            what,
            closed: false,
            rd_bytes: 0,
            wr_bytes: 0,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn rd_bytes(&self) -> u64 {
        self.rd_bytes
    }

    pub(crate) fn wr_bytes(&self) -> u64 {
        self.wr_bytes
    }

    pub(crate) async fn recv(&mut self) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; self.recvbuf_size];
        match self.reader.read(&mut buf).await {
            Ok(0) => {
                debug!("rcvd 0 bytes from {}", self.what);
                None
            }
            Ok(n) => {
                debug!("rcvd {n} bytes from {}", self.what);
                self.rd_bytes += n as u64;
                buf.truncate(n);
                Some(buf)
            }
            Err(e) => {
                warn!("error while receiving from {}: {e:?}", self.what);
                None
            }
        }
    }

    pub(crate) fn queue(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub(crate) fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn has_buffer(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub(crate) async fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.writer.write_all(&self.buffer).await?;
        let sent = self.buffer.len();
        self.wr_bytes += sent as u64;
        self.buffer.advance(sent);
        debug!("flushed {sent} bytes to {}", self.what);
        Ok(())
    }

    /// Half-close the write direction so any final response reaches
    /// the peer, drain its remaining bytes briefly, then drop the
    /// socket.
    pub(crate) async fn close(mut self) {
        let _ = self.writer.shutdown().await;
        let mut sink = [0u8; 4096];
        let _ = tokio::time::timeout(CLOSE_LINGER, async {
            while matches!(self.reader.read(&mut sink).await, Ok(n) if n > 0) {}
        })
        .await;
        self.closed = true;
    }

    /// Mark an endpoint whose read side hit end-of-stream: shut the
    /// write direction down and keep the handle around so counters and
    /// parser state stay addressable for the rest of the session.
    pub(crate) async fn mark_closed(&mut self) {
        let _ = self.writer.shutdown().await;
        self.buffer.clear();
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_and_buffer_accounting() {
        let (client, _server) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(client);
        let mut stream = BufferedStream::new(r, w, 64, "client");

        assert!(!stream.has_buffer());
        stream.queue(b"hello");
        stream.queue(b" world");
        assert_eq!(stream.buffer_size(), 11);
        assert!(stream.has_buffer());
    }

    #[tokio::test]
    async fn flush_drains_the_buffer() {
        let (near, far) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(near);
        let mut stream = BufferedStream::new(r, w, 64, "client");
        let (mut far_r, _far_w) = tokio::io::split(far);

        stream.queue(b"hello");
        stream.flush().await.unwrap();
        assert!(!stream.has_buffer());
        assert_eq!(stream.wr_bytes(), 5);

        let mut buf = [0u8; 5];
        far_r.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn recv_reports_eof_as_none() {
        let (near, far) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(near);
        let mut stream = BufferedStream::new(r, w, 64, "server");
        drop(far);

        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_counts_bytes() {
        let (near, far) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(near);
        let mut stream = BufferedStream::new(r, w, 64, "server");
        let (_far_r, mut far_w) = tokio::io::split(far);

        far_w.write_all(b"abc").await.unwrap();
        let data = stream.recv().await.unwrap();
        assert_eq!(data, b"abc");
        assert_eq!(stream.rd_bytes(), 3);
    }

    #[tokio::test]
    async fn close_lets_the_peer_read_the_tail() {
        let (near, far) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(near);
        let mut stream = BufferedStream::new(r, w, 64, "client");
        let (mut far_r, _far_w) = tokio::io::split(far);

        stream.queue(b"bye");
        stream.flush().await.unwrap();
        stream.close().await;

        let mut out = Vec::new();
        far_r.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"bye");
    }
}
