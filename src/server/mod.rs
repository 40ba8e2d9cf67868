//! MJPEG server
//!
//! - `config`: server options
//! - `policy`: which peers may be served
//! - `connection`: per-client multipart streaming
//! - `listener`: accept loop, origin filtering and runtime rebinding
//! - `controller`: start/pause/resume/stop lifecycle

pub mod config;
pub mod connection;
pub mod controller;
pub mod listener;
pub mod policy;

pub use config::ServerConfig;
pub use connection::Connection;
pub use controller::{MjpegServer, ServerState};
pub use listener::ListenerHealth;
pub use policy::OriginPolicy;
