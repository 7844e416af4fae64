//! Streaming request body plumbing.
//!
//! The body of a request is never buffered whole. The connection side owns a
//! [`ReqBodySender`] that pulls framed payload items off the transport on
//! demand, and the handler side owns a [`ReqBody`] implementing
//! `http_body::Body`. The two halves talk over a signal channel carrying
//! one-shot reply slots, which gives natural backpressure: the transport is
//! only read when the consumer asks for the next chunk.
//!
//! A body is a finite, single-pass sequence. When the transport dies before
//! the framing says the body is complete, the consumer observes a terminal
//! [`ParseError::ConnectionClosed`](crate::protocol::ParseError) instead of a
//! silent stop.

mod req_body;

pub use req_body::ReqBody;
pub use req_body::ReqBodySender;
