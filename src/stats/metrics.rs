//! Statistics and metrics for the MJPEG server

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters shared by the accept loop and every connection
#[derive(Debug)]
pub struct ServerMetrics {
    created_at: Instant,
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    rejected_connections: AtomicU64,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            created_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// Record an admitted connection that starts streaming
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the end of a streaming connection
    pub fn connection_closed(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Record a connection closed by origin policy or connection limit
    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record bytes written to a client; `frame` is set once per completed part
    pub fn record_sent(&self, bytes: u64, frame: bool) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        if frame {
            self.frames_sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take a point-in-time snapshot
    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            uptime: self.created_at.elapsed(),
        }
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Connections admitted since creation
    pub total_connections: u64,
    /// Connections currently streaming
    pub active_connections: u64,
    /// Connections closed without being served
    pub rejected_connections: u64,
    /// Parts fully written across all connections
    pub frames_sent: u64,
    /// Bytes written across all connections, headers included
    pub bytes_sent: u64,
    /// Time since the server was created
    pub uptime: Duration,
}

impl ServerStats {
    /// Average outgoing bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes_sent * 8) / secs
        } else {
            0
        }
    }
}
