//! Frame store implementation

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;

use super::frame::Frame;

/// Read side of the frame store, the only capability connections get
pub trait FrameSource: Send + Sync + 'static {
    /// Return a snapshot of the current frame
    fn read_frame(&self) -> Frame;
}

/// Holds the single latest frame
///
/// Thread-safe via `RwLock`: readers share the lock, the producer takes it
/// exclusively for one assignment. Usable from plain threads as well as from
/// async tasks since neither side holds the lock across an await point.
#[derive(Debug, Default)]
pub struct FrameStore {
    current: RwLock<Frame>,
}

impl FrameStore {
    /// Create a store holding the empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame
    ///
    /// Owned buffers (`Vec<u8>`, `Bytes`) are moved in without copying.
    /// Returns the sequence number assigned to the new frame.
    pub fn publish(&self, data: impl Into<Bytes>) -> u64 {
        let data = data.into();
        let mut current = self.write();
        let sequence = current.sequence + 1;
        *current = Frame::new(sequence, data);

        tracing::trace!(sequence = sequence, len = current.len(), "Frame published");
        sequence
    }

    /// Replace the current frame with a copy of a borrowed buffer
    ///
    /// For producers whose buffer is recycled after the callback returns.
    pub fn publish_copy(&self, data: &[u8]) -> u64 {
        self.publish(Bytes::copy_from_slice(data))
    }

    /// Sequence number of the current frame
    pub fn sequence(&self) -> u64 {
        self.read().sequence
    }

    fn read(&self) -> RwLockReadGuard<'_, Frame> {
        // A panic while holding the lock cannot leave a half-written frame:
        // the only mutation is a whole-value assignment.
        self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Frame> {
        self.current.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl FrameSource for FrameStore {
    fn read_frame(&self) -> Frame {
        self.read().clone()
    }
}
