//! Streaming response encoding over one connection.
//!
//! Mirror image of the request decoder: a head frame installs the payload
//! encoder matching its framing, payload frames are encoded until `Eof`, and
//! the encoder flips back to expecting the next head.

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, PayloadSize, ResponseHead, SendError};
use bytes::{Buf, BytesMut};
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

#[derive(Debug)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None }
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead, PayloadSize), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("response head while the previous body is still open");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                self.payload_encoder = Some(PayloadEncoder::new(payload_size));
                self.header_encoder.encode((head, payload_size), dst)
            }

            Message::Payload(item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("response payload without a head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                // the body is open until its Eof, even when a fixed length
                // is already fully written
                let is_eof = item.is_eof();
                let result = payload_encoder.encode(item, dst);
                if is_eof {
                    self.payload_encoder.take();
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadItem;
    use bytes::Bytes;
    use http::{Response, StatusCode};

    fn head(status: StatusCode) -> ResponseHead {
        Response::builder().status(status).body(()).unwrap()
    }

    #[test]
    fn fixed_length_response_on_the_wire() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((head(StatusCode::OK), PayloadSize::Length(5))), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"hello"))), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Eof), &mut dst).unwrap();

        let wire = String::from_utf8(dst.to_vec()).unwrap();
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("content-length: 5\r\n"));
        assert!(wire.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn chunked_response_on_the_wire() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((head(StatusCode::OK), PayloadSize::Chunked)), &mut dst).unwrap();
        encoder.encode(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"hi"))), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Eof), &mut dst).unwrap();

        let wire = String::from_utf8(dst.to_vec()).unwrap();
        assert!(wire.contains("transfer-encoding: chunked\r\n"));
        assert!(wire.ends_with("\r\n\r\n2\r\nhi\r\n0\r\n\r\n"));
    }

    #[test]
    fn payload_without_head_is_rejected() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        let result =
            encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Chunk(Bytes::from_static(b"x"))), &mut dst);
        assert!(result.is_err());
    }

    #[test]
    fn back_to_back_responses_reuse_the_encoder() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((head(StatusCode::OK), PayloadSize::Empty)), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Eof), &mut dst).unwrap();

        encoder.encode(Message::<_, Bytes>::Header((head(StatusCode::NOT_FOUND), PayloadSize::Empty)), &mut dst).unwrap();

        let wire = String::from_utf8(dst.to_vec()).unwrap();
        assert!(wire.contains("HTTP/1.1 404 Not Found\r\n"));
    }
}
