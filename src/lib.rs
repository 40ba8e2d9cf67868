//! MJPEG streaming server
//!
//! Serves the most recent JPEG frame to any number of HTTP clients using
//! `multipart/x-mixed-replace`, while a producer (typically a camera
//! pipeline) keeps overwriting that frame at its own pace.
//!
//! # Example
//!
//! ```no_run
//! use mjpeg_serve::{MjpegServer, ServerConfig};
//!
//! # async fn example() -> mjpeg_serve::Result<()> {
//! let server = MjpegServer::new(ServerConfig::with_port(8080));
//! server.start().await?;
//!
//! // From the capture thread, whenever a new JPEG is ready
//! let store = server.frame_store().clone();
//! std::thread::spawn(move || {
//!     let jpeg: Vec<u8> = Vec::new();
//!     store.publish(jpeg);
//! });
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod frames;
pub mod protocol;
pub mod server;
pub mod stats;

pub use error::{Error, Result};
pub use frames::{Frame, FrameSource, FrameStore};
pub use server::{ListenerHealth, MjpegServer, OriginPolicy, ServerConfig, ServerState};
pub use stats::ServerStats;
