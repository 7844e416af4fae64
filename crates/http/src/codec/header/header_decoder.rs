//! Incremental request head parsing.
//!
//! The decoder buffers transport bytes until a complete start-line and header
//! block (terminated by the empty line) is present, then yields the structured
//! head in one step. Partial input, however finely split across reads, simply
//! returns `Ok(None)` until the terminator arrives.
//!
//! `httparse` does the scanning against an uninitialized header table; the
//! decoder then records name/value byte ranges so both the normalized
//! `HeaderMap` and the case/order-preserving raw pair list are built from one
//! frozen copy of the header block, without re-copying values.

use std::mem::MaybeUninit;

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Request};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::config::ConnectionConfig;
use crate::ensure;
use crate::protocol::{ParseError, PayloadSize, RawHeader, RawHeaders, RequestHeader};

/// Capacity of the stack-allocated header table; the configured field-count
/// cap is clamped to it.
const HEADER_TABLE_SIZE: usize = 128;

/// Decodes a request head into a [`RequestHeader`] plus the body framing the
/// head declares.
#[derive(Debug)]
pub struct HeaderDecoder {
    config: ConnectionConfig,
}

impl HeaderDecoder {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }
}

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // shortest complete head is "GET / HTTP/1.1\r\n\r\n"
        if src.len() < 18 {
            ensure!(src.len() <= self.config.max_header_bytes(), ParseError::header_too_large(src.len(), self.config.max_header_bytes()));
            return Ok(None);
        }

        let max_headers = self.config.max_header_count().min(HEADER_TABLE_SIZE);
        let mut parsed = httparse::Request::new(&mut []);
        let mut header_table: [MaybeUninit<httparse::Header>; HEADER_TABLE_SIZE] = [const { MaybeUninit::uninit() }; HEADER_TABLE_SIZE];

        let status = parsed.parse_with_uninit_headers(src, &mut header_table).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(max_headers),
            Error::Version => ParseError::InvalidVersion(None),
            Error::Token => ParseError::InvalidMethod,
            e => ParseError::invalid_header(e.to_string()),
        })?;

        let body_offset = match status {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                ensure!(src.len() <= self.config.max_header_bytes(), ParseError::header_too_large(src.len(), self.config.max_header_bytes()));
                return Ok(None);
            }
        };

        trace!(head_size = body_offset, "parsed request head");
        ensure!(body_offset <= self.config.max_header_bytes(), ParseError::header_too_large(body_offset, self.config.max_header_bytes()));

        let header_count = parsed.headers.len();
        ensure!(header_count <= max_headers, ParseError::too_many_headers(header_count));

        // byte ranges of every name/value inside src, recorded before the split
        let mut index_table = [EMPTY_HEADER_INDEX; HEADER_TABLE_SIZE];
        HeaderIndex::record(src, parsed.headers, &mut index_table);

        let version = match parsed.version {
            Some(0) => http::Version::HTTP_10,
            Some(1) => http::Version::HTTP_11,
            v => return Err(ParseError::InvalidVersion(v)),
        };

        let mut builder = Request::builder()
            .method(parsed.method.ok_or(ParseError::InvalidMethod)?)
            .uri(parsed.path.ok_or(ParseError::InvalidUri)?)
            .version(version);

        let head_bytes = src.split_to(body_offset).freeze();

        let headers = builder.headers_mut().ok_or(ParseError::InvalidUri)?;
        headers.reserve(header_count);

        let mut raw = Vec::with_capacity(header_count);
        for index in &index_table[..header_count] {
            let name_bytes = &head_bytes[index.name.0..index.name.1];
            let value_bytes = head_bytes.slice(index.value.0..index.value.1);

            let name = HeaderName::from_bytes(name_bytes).map_err(ParseError::invalid_header)?;
            // httparse already rejected non-visible-ASCII header values
            let value = HeaderValue::from_maybe_shared(value_bytes.clone()).map_err(ParseError::invalid_header)?;

            raw.push(RawHeader::new(String::from_utf8_lossy(name_bytes).into_owned(), value_bytes));
            headers.append(name, value);
        }

        let inner = builder.body(()).map_err(ParseError::invalid_header)?;
        let header = RequestHeader::new(inner, RawHeaders::new(raw));
        let payload_size = declared_framing(&header)?;

        Ok(Some((header, payload_size)))
    }
}

/// Byte ranges of one header's name and value inside the original buffer.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

const EMPTY_HEADER_INDEX: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

impl HeaderIndex {
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let base = bytes.as_ptr() as usize;
        for (header, index) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - base;
            index.name = (name_start, name_start + header.name.len());
            let value_start = header.value.as_ptr() as usize - base;
            index.value = (value_start, value_start + header.value.len());
        }
    }
}

/// Determines body framing from the head, per RFC 9112 §6.
///
/// Content-Length and chunked Transfer-Encoding together, or repeated
/// Content-Length fields that disagree, are a [`ParseError::FramingConflict`]
/// and kill the connection.
fn declared_framing(header: &RequestHeader) -> Result<PayloadSize, ParseError> {
    let te_header = header.headers().get(http::header::TRANSFER_ENCODING);
    let mut cl_values = header.headers().get_all(http::header::CONTENT_LENGTH).iter();
    let cl_header = cl_values.next();

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::Empty),

        (te_value @ Some(_), None) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::Chunked)
            } else {
                Ok(PayloadSize::Empty)
            }
        }

        (None, Some(cl_value)) => {
            // repeated content-length is tolerated only when every copy agrees
            if cl_values.any(|other| other != cl_value) {
                return Err(ParseError::framing_conflict("repeated content-length headers disagree"));
            }

            let cl_str = cl_value.to_str().map_err(|_| ParseError::framing_conflict("content-length is not a string"))?;
            let length = cl_str
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::framing_conflict(format!("content-length value {cl_str} is not a u64")))?;

            if length == 0 { Ok(PayloadSize::Empty) } else { Ok(PayloadSize::Length(length)) }
        }

        (Some(_), Some(_)) => Err(ParseError::framing_conflict("both transfer-encoding and content-length present")),
    }
}

/// Chunked framing applies only when `chunked` is the final transfer coding.
fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    if let Some(value) = header_value
        && let Some(last) = value.as_bytes().rsplit(|b| *b == b',').next()
    {
        return last.trim_ascii() == b"chunked";
    }
    false
}
