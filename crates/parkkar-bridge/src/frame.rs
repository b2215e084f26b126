//! MJPEG framing convention shared with the detectors.
//!
//! Detectors write `--frame\r\n`, MIME headers, a blank line, the JPEG and
//! a trailing `\r\n` per frame. The bridge never parses that; it only has
//! to produce one record of the same shape when there is no detector.

use bytes::Bytes;

/// Multipart boundary used by every detector.
pub const BOUNDARY: &str = "frame";

/// `Content-Type` of a stream response.
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// A single text/plain frame record carrying `message`.
pub fn diagnostic_frame(message: &str) -> Bytes {
    let body = message.as_bytes();
    let head = format!(
        "--{BOUNDARY}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {len}\r\n\
         \r\n",
        len = body.len()
    );

    let mut record = Vec::with_capacity(head.len() + body.len() + 2);
    record.extend_from_slice(head.as_bytes());
    record.extend_from_slice(body);
    record.extend_from_slice(b"\r\n");
    Bytes::from(record)
}
