//! MJPEG wire protocol
//!
//! This module provides:
//! - Protocol constants (defaults, boundary token, server name)
//! - Encoders for the stream header and the per-frame part framing

pub mod constants;
pub mod mjpeg;

pub use mjpeg::{part_header, part_trailer, stream_header};
