//! Streaming request decoding over one connection.
//!
//! The decoder is a two-phase state machine: while no body is in flight it
//! parses request heads; once a head declares a body it switches to the
//! matching payload decoder until that body's `Eof`, then flips back. Parser
//! state therefore survives across request boundaries, which is what keeps a
//! keep-alive connection aligned even when reads split messages arbitrarily.

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::config::ConnectionConfig;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
    config: ConnectionConfig,
}

impl RequestDecoder {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { header_decoder: HeaderDecoder::new(config), payload_decoder: None, config }
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHeader, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    // body finished, next bytes belong to the next head
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };
            return Ok(message);
        }

        match self.header_decoder.decode(src)? {
            Some((header, payload_size)) => {
                self.payload_decoder = Some(PayloadDecoder::new(payload_size, self.config.max_body_bytes()));
                Ok(Some(Message::Header((header, payload_size))))
            }
            None => Ok(None),
        }
    }
}
