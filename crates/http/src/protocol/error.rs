use std::io;
use thiserror::Error;

/// Top-level error for a connection: either the request side failed to parse
/// or the response side failed to send.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

/// Errors raised while parsing a request off the transport.
///
/// Everything except `BodyTooLarge` with a declared length is fatal for the
/// connection: once the parser loses sync no further request can be trusted.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header block too large, current: {current_size} exceeds the limit {max_size}")]
    HeaderTooLarge { current_size: usize, max_size: usize },

    #[error("header count exceeds the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("malformed header: {reason}")]
    InvalidHeader { reason: String },

    #[error("unsupported http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("malformed request line: invalid method")]
    InvalidMethod,

    #[error("malformed request line: invalid target")]
    InvalidUri,

    #[error("conflicting body framing: {reason}")]
    FramingConflict { reason: String },

    #[error("body exceeds the configured limit of {limit} bytes")]
    BodyTooLarge { limit: u64 },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("connection closed before the message completed")]
    ConnectionClosed,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn header_too_large(current_size: usize, max_size: usize) -> Self {
        Self::HeaderTooLarge { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(reason: S) -> Self {
        Self::InvalidHeader { reason: reason.to_string() }
    }

    pub fn framing_conflict<S: ToString>(reason: S) -> Self {
        Self::FramingConflict { reason: reason.to_string() }
    }

    pub fn body_too_large(limit: u64) -> Self {
        Self::BodyTooLarge { limit }
    }

    pub fn invalid_body<S: ToString>(reason: S) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }

    /// True when the connection must be torn down rather than reused.
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(self, Self::BodyTooLarge { .. })
    }
}

/// Errors raised while writing a response to the transport, including misuse
/// of the [`ResponseWriter`](crate::exchange::ResponseWriter) by a handler.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("response head already flushed, status and headers are frozen")]
    ResponseAlreadyStarted,

    #[error("content-length mismatch: declared {declared}, written {written}")]
    ContentLengthMismatch { declared: u64, written: u64 },

    #[error("connection closed before the response completed")]
    ConnectionClosed,

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn content_length_mismatch(declared: u64, written: u64) -> Self {
        Self::ContentLengthMismatch { declared, written }
    }

    pub fn invalid_body<S: ToString>(reason: S) -> Self {
        Self::InvalidBody { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
