//! Chunked transfer decoding (RFC 9112 §7.1).
//!
//! Each chunk is a hex size line (optionally carrying extensions), the chunk
//! data, and a CRLF. The zero-size chunk ends the body; trailer fields after
//! it are read and discarded. The decoder is a byte-at-a-time state machine,
//! so input split at any boundary resumes cleanly.

use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use State::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Accumulating hex digits of the chunk size.
    Size,
    /// Whitespace after the size; no further digits allowed.
    SizeWs,
    /// Chunk extension, ignored up to the CR.
    Extension,
    /// LF closing the size line.
    SizeLf,
    /// Inside chunk data, `remaining` bytes left.
    Data,
    /// CR after chunk data.
    DataCr,
    /// LF after chunk data.
    DataLf,
    /// First byte of a line after the last chunk: CR ends the body, anything
    /// else starts a trailer field.
    TrailerStart,
    /// Inside a trailer field, discarded up to the CR.
    Trailer,
    /// LF closing a trailer field.
    TrailerLf,
    /// LF closing the body.
    EndLf,
    /// Terminator seen; the body is complete.
    Done,
}

/// Decoder for one chunked message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
    remaining: u64,
    delivered: u64,
    limit: u64,
}

impl ChunkedDecoder {
    /// `limit` caps the total decoded body size; crossing it fails the
    /// message with [`ParseError::BodyTooLarge`].
    pub fn new(limit: u64) -> Self {
        Self { state: Size, remaining: 0, delivered: 0, limit }
    }

    fn step(&mut self, byte: u8) -> Result<State, ParseError> {
        match self.state {
            Size => match byte {
                b'0'..=b'9' => self.push_digit(u64::from(byte - b'0')),
                b'a'..=b'f' => self.push_digit(u64::from(byte - b'a' + 10)),
                b'A'..=b'F' => self.push_digit(u64::from(byte - b'A' + 10)),
                b' ' | b'\t' => Ok(SizeWs),
                b';' => Ok(Extension),
                b'\r' => Ok(SizeLf),
                _ => Err(ParseError::invalid_body("invalid chunk size character")),
            },
            SizeWs => match byte {
                b' ' | b'\t' => Ok(SizeWs),
                b';' => Ok(Extension),
                b'\r' => Ok(SizeLf),
                _ => Err(ParseError::invalid_body("invalid chunk size whitespace")),
            },
            Extension => match byte {
                b'\r' => Ok(SizeLf),
                // a bare LF in an extension hides the real line boundary
                b'\n' => Err(ParseError::invalid_body("bare LF inside chunk extension")),
                _ => Ok(Extension),
            },
            SizeLf => match byte {
                b'\n' if self.remaining == 0 => Ok(TrailerStart),
                b'\n' => Ok(Data),
                _ => Err(ParseError::invalid_body("missing LF after chunk size")),
            },
            DataCr => match byte {
                b'\r' => Ok(DataLf),
                _ => Err(ParseError::invalid_body("missing CR after chunk data")),
            },
            DataLf => match byte {
                b'\n' => Ok(Size),
                _ => Err(ParseError::invalid_body("missing LF after chunk data")),
            },
            TrailerStart => match byte {
                b'\r' => Ok(EndLf),
                _ => Ok(Trailer),
            },
            Trailer => match byte {
                b'\r' => Ok(TrailerLf),
                _ => Ok(Trailer),
            },
            TrailerLf => match byte {
                b'\n' => Ok(TrailerStart),
                _ => Err(ParseError::invalid_body("missing LF after trailer field")),
            },
            EndLf => match byte {
                b'\n' => Ok(Done),
                _ => Err(ParseError::invalid_body("missing LF after body terminator")),
            },
            Data | Done => unreachable!("data and done states are handled without a byte"),
        }
    }

    fn push_digit(&mut self, digit: u64) -> Result<State, ParseError> {
        self.remaining = self
            .remaining
            .checked_mul(16)
            .and_then(|size| size.checked_add(digit))
            .ok_or_else(|| ParseError::invalid_body("chunk size overflows u64"))?;
        Ok(Size)
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                Done => {
                    trace!(delivered = self.delivered, "chunked body complete");
                    return Ok(Some(PayloadItem::Eof));
                }

                Data => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    let len = std::cmp::min(self.remaining, src.len() as u64) as usize;
                    let bytes = src.split_to(len).freeze();
                    self.remaining -= len as u64;
                    if self.remaining == 0 {
                        self.state = DataCr;
                    }

                    self.delivered += len as u64;
                    if self.delivered > self.limit {
                        return Err(ParseError::body_too_large(self.limit));
                    }

                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                _ => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let byte = src.get_u8();
                    self.state = self.step(byte)?;
                }
            }
        }
    }
}
