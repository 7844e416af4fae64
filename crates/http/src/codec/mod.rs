//! HTTP/1.1 wire codec.
//!
//! Everything here implements the tokio-util [`Decoder`]/[`Encoder`] traits so
//! the connection can drive parsing and serialization through `FramedRead` /
//! `FramedWrite` without ever blocking on a partial message:
//!
//! - [`RequestDecoder`]: request heads and body payloads off the transport
//! - [`ResponseEncoder`]: response heads and body payloads onto the transport
//! - [`header`], [`body`]: the per-phase pieces the two compose
//!
//! [`Decoder`]: tokio_util::codec::Decoder
//! [`Encoder`]: tokio_util::codec::Encoder

pub mod body;
pub mod header;
mod request_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
