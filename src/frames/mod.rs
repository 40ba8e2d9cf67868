//! Latest-frame storage
//!
//! A single producer (typically a camera callback thread) overwrites the
//! current frame at its own pace while any number of connections read the
//! freshest frame at theirs.
//!
//! # Architecture
//!
//! ```text
//!     [Camera thread]                     Arc<FrameStore>
//!     publish(bytes) ──write lock──► ┌────────────────────┐
//!                                    │ current: Frame {   │
//!                                    │   sequence,        │
//!                                    │   data: Bytes,     │
//!                                    │ }                  │
//!                                    └─────────┬──────────┘
//!                    read lock (shared)        │
//!          ┌───────────────────────────────────┼─────────────────┐
//!          ▼                                   ▼                 ▼
//!    [Connection]                        [Connection]      [Connection]
//!    read_frame() ──► socket             read_frame()      read_frame()
//! ```
//!
//! Publishing is a single assignment under the write lock. Readers clone the
//! current `Frame`, which only bumps the `Bytes` reference count, so a reader
//! always holds a complete frame that no later publish can modify.

pub mod frame;
pub mod store;

pub use frame::Frame;
pub use store::{FrameSource, FrameStore};
