//! Per-connection MJPEG streaming
//!
//! Writes the response header once, then loops reading the latest frame and
//! writing it as a multipart part until the client goes away or the listener
//! clears this connection's running flag.
//!
//! The loop does not wait for a new frame: a fast client may receive the same
//! frame several times. Backpressure comes only from the socket itself, and
//! every part is bounded by the write timeout so a frozen peer cannot pin the
//! task forever.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::frames::FrameSource;
use crate::protocol::mjpeg;
use crate::server::config::ServerConfig;
use crate::stats::ServerMetrics;

/// One streaming client
pub struct Connection<S> {
    session_id: u64,
    stream: S,
    peer_addr: SocketAddr,
    source: Arc<dyn FrameSource>,
    running: Arc<AtomicBool>,
    metrics: Arc<ServerMetrics>,
    write_timeout: Duration,
    header: Bytes,
    trailer: Bytes,
}

impl<S> Connection<S>
where
    S: AsyncWrite + Unpin,
{
    /// Create a connection over an accepted stream
    pub fn new(
        session_id: u64,
        stream: S,
        peer_addr: SocketAddr,
        config: &ServerConfig,
        source: Arc<dyn FrameSource>,
        running: Arc<AtomicBool>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            session_id,
            stream,
            peer_addr,
            source,
            running,
            metrics,
            write_timeout: config.write_timeout,
            header: mjpeg::stream_header(&config.boundary),
            trailer: mjpeg::part_trailer(&config.boundary),
        }
    }

    /// Session identifier
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Stream frames until the peer disconnects or the running flag is cleared
    ///
    /// Consumes the connection so the socket is closed on every exit path.
    /// A peer going away, including one that stops reading until the write
    /// timeout expires, ends the stream normally; only other I/O failures
    /// are returned.
    pub async fn run(mut self) -> Result<()> {
        tracing::debug!(
            session_id = self.session_id,
            peer = %self.peer_addr,
            "Streaming started"
        );
        self.metrics.connection_opened();

        let result = match self.stream_frames().await {
            Err(e) if e.is_disconnect() => {
                tracing::debug!(
                    session_id = self.session_id,
                    reason = %e,
                    "Client disconnected"
                );
                Ok(())
            }
            other => other,
        };

        self.metrics.connection_closed();
        result
    }

    async fn stream_frames(&mut self) -> Result<()> {
        let header = self.header.clone();
        let written = self.write_chunks(&[&header[..]]).await?;
        self.metrics.record_sent(written, false);

        let mut parts = 0u64;
        while self.running.load(Ordering::Acquire) {
            let frame = self.source.read_frame();
            let part_header = mjpeg::part_header(frame.len());
            let trailer = self.trailer.clone();

            let written = self
                .write_chunks(&[&part_header[..], &frame.data[..], &trailer[..]])
                .await?;
            self.metrics.record_sent(written, true);
            parts += 1;
        }

        tracing::debug!(
            session_id = self.session_id,
            parts = parts,
            "Stop requested"
        );
        Ok(())
    }

    /// Write and flush `chunks` within the write timeout
    async fn write_chunks(&mut self, chunks: &[&[u8]]) -> Result<u64> {
        let stream = &mut self.stream;
        let write = async move {
            let mut written = 0u64;
            for chunk in chunks {
                stream.write_all(chunk).await?;
                written += chunk.len() as u64;
            }
            stream.flush().await?;
            Ok::<_, std::io::Error>(written)
        };

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::WriteTimeout(self.write_timeout)),
        }
    }
}
