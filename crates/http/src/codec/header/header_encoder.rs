//! Response head serialization.
//!
//! Writes the status line and header block, fixing up the framing headers from
//! the payload size the exchange committed: an explicit length becomes
//! Content-Length, an unknown length becomes Transfer-Encoding: chunked, and a
//! bodyless response gets Content-Length: 0.

use crate::protocol::{PayloadSize, ResponseHead, SendError};

use bytes::{BufMut, BytesMut};

use http::{HeaderValue, Version, header};
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

/// Reserved up front for a typical head.
const INIT_HEADER_SIZE: usize = 4 * 1024;

#[derive(Debug, Default)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        match head.version() {
            Version::HTTP_11 | Version::HTTP_10 => {
                write!(
                    FastWrite(dst),
                    "HTTP/1.1 {} {}\r\n",
                    head.status().as_str(),
                    head.status().canonical_reason().unwrap_or("Unknown")
                )?;
            }
            v => {
                error!(http_version = ?v, "unsupported http version in response head");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        }

        match payload_size {
            PayloadSize::Length(n) => {
                head.headers_mut().insert(header::CONTENT_LENGTH, n.into());
            }
            PayloadSize::Chunked => {
                head.headers_mut().insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
            PayloadSize::Empty => {
                head.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
            }
        }

        for (name, value) in head.headers().iter() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Writes into the already reserved buffer without going through io buffering.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Response, StatusCode};

    fn encode(head: ResponseHead, size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn fixed_length_head_gets_content_length() {
        let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
        let wire = encode(head, PayloadSize::Length(5));

        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("content-length: 5\r\n"));
        assert!(wire.ends_with("\r\n\r\n"));
    }

    #[test]
    fn unknown_length_head_gets_chunked_encoding() {
        let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
        let wire = encode(head, PayloadSize::Chunked);

        assert!(wire.contains("transfer-encoding: chunked\r\n"));
        assert!(!wire.contains("content-length"));
    }

    #[test]
    fn empty_head_gets_zero_content_length() {
        let head = Response::builder().status(StatusCode::NO_CONTENT).body(()).unwrap();
        let wire = encode(head, PayloadSize::Empty);

        assert!(wire.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(wire.contains("content-length: 0\r\n"));
    }

    #[test]
    fn explicit_headers_survive_encoding() {
        let head = Response::builder()
            .status(StatusCode::OK)
            .header("x-request-id", "abc123")
            .body(())
            .unwrap();
        let wire = encode(head, PayloadSize::Empty);

        assert!(wire.contains("x-request-id: abc123\r\n"));
    }
}
