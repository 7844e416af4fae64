//! HTTP response head type.
//!
//! The head of an outgoing response is an `http::Response` with an empty body
//! placeholder; the body is streamed separately through the exchange layer.

use http::Response;

/// The status line and header block of a response, without its body.
pub type ResponseHead = Response<()>;
