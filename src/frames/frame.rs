//! Frame type

use bytes::Bytes;

/// One complete encoded JPEG image
///
/// Cheap to clone: the payload is reference counted and immutable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Publish counter; 0 is the empty frame a store starts with
    pub sequence: u64,
    /// Encoded image bytes
    pub data: Bytes,
}

impl Frame {
    /// Create a frame
    pub fn new(sequence: u64, data: Bytes) -> Self {
        Self { sequence, data }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
