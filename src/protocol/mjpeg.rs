//! MJPEG multipart framing
//!
//! A stream is a single HTTP/1.0 response header followed by an unbounded
//! sequence of parts:
//!
//! ```text
//! HTTP/1.0 200 OK\r\n
//! ...headers...
//! Content-Type: multipart/x-mixed-replace; boundary=<B>\r\n
//! \n--<B>\r\n
//! Content-type: image/jpeg\r\n        ┐
//! Content-Length: <N>\r\n\r\n         │ repeated
//! <N bytes>\r\n                       │ per frame
//! --<B>\r\n                           ┘
//! ```
//!
//! No request is read; the header is written as soon as a connection is
//! admitted.

use bytes::{BufMut, Bytes, BytesMut};

use super::constants::{PART_CONTENT_TYPE, SERVER_NAME};

/// Encode the response header sent once per connection
pub fn stream_header(boundary: &str) -> Bytes {
    let header = format!(
        "HTTP/1.0 200 OK\r\n\
         Server: {server}\r\n\
         Connection: close\r\n\
         Max-Age: 0\r\n\
         Expires: 0\r\n\
         Cache-Control: no-store, no-cache, must-revalidate, pre-check=0, post-check=0, max-age=0\r\n\
         Pragma: no-cache\r\n\
         Content-Type: multipart/x-mixed-replace; boundary={boundary}\r\n\
         \n--{boundary}\r\n",
        server = SERVER_NAME,
        boundary = boundary,
    );
    Bytes::from(header)
}

/// Encode the headers that precede a frame of `len` bytes
pub fn part_header(len: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_slice(b"Content-type: ");
    buf.put_slice(PART_CONTENT_TYPE.as_bytes());
    buf.put_slice(b"\r\nContent-Length: ");
    buf.put_slice(len.to_string().as_bytes());
    buf.put_slice(b"\r\n\r\n");
    buf.freeze()
}

/// Encode the delimiter written after every frame body
pub fn part_trailer(boundary: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(boundary.len() + 6);
    buf.put_slice(b"\r\n--");
    buf.put_slice(boundary.as_bytes());
    buf.put_slice(b"\r\n");
    buf.freeze()
}
