//! Message body framing: Content-Length, chunked transfer, or no body.
//!
//! Decoders deliver [`PayloadItem`](crate::protocol::PayloadItem) chunks in
//! arrival order and exactly one `Eof`; encoders accept the same items and put
//! the matching framing on the wire.

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
