use bytes::{Buf, Bytes};

/// A frame exchanged between the codec layer and the connection.
///
/// A decoded request or an encoded response is seen by the connection as one
/// `Header` frame followed by zero or more `Payload` frames. The generic `T` is
/// the head type (request or response side), `D` the payload data type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<T, D: Buf = Bytes> {
    Header(T),
    Payload(PayloadItem<D>),
}

/// One item of a message body: a chunk of data or the end-of-body marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<D: Buf = Bytes> {
    Chunk(D),
    /// End of the body. Produced exactly once per message.
    Eof,
}

/// How a message body is framed on the wire.
///
/// Determined from the Content-Length / Transfer-Encoding headers on the way in,
/// and from the response writer's declared length on the way out.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Body of exactly this many bytes.
    Length(u64),
    /// Chunked transfer encoding, length unknown ahead of time.
    Chunked,
    /// No body at all.
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// Declared length, if the framing carries one.
    pub fn length(&self) -> Option<u64> {
        match self {
            PayloadSize::Length(n) => Some(*n),
            PayloadSize::Chunked => None,
            PayloadSize::Empty => Some(0),
        }
    }
}

impl<T> Message<T> {
    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    /// Chunk bytes, or `None` for the `Eof` marker.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}
