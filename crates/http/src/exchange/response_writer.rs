use bytes::Bytes;
use futures::SinkExt;
use futures::channel::mpsc;
use http::{HeaderName, HeaderValue, Response, StatusCode};

use crate::protocol::{PayloadSize, ResponseHead, SendError};

/// Writer-to-connection messages for one response.
#[derive(Debug)]
pub(crate) enum ResponseMessage {
    /// The committed head and its body framing. Sent exactly once, before any
    /// chunk.
    Head(ResponseHead, PayloadSize),
    Chunk(Bytes),
    End,
}

/// Bound of the writer channel; a full channel suspends `write` until the
/// connection drains it to the transport.
const RESPONSE_CHANNEL_BOUND: usize = 8;

pub(crate) fn response_channel() -> (ResponseWriter, mpsc::Receiver<ResponseMessage>) {
    let (tx, rx) = mpsc::channel(RESPONSE_CHANNEL_BOUND);
    (ResponseWriter::new(tx), rx)
}

/// The response side of an exchange, handed to the application handler.
///
/// Status and headers stay mutable until the first body byte is flushed
/// toward the transport; the first `write` (or `end`) commits them, with
/// status defaulting to 200. After the commit, [`set_status`] and
/// [`insert_header`] fail with [`SendError::ResponseAlreadyStarted`].
///
/// Outgoing framing follows the committed head: an explicit Content-Length
/// header makes the writer enforce that exactly that many bytes are written
/// before [`end`]; without one the body is chunked automatically, and a
/// response ended before any write goes out with Content-Length: 0.
///
/// [`set_status`]: ResponseWriter::set_status
/// [`insert_header`]: ResponseWriter::insert_header
/// [`end`]: ResponseWriter::end
#[derive(Debug)]
pub struct ResponseWriter {
    tx: mpsc::Sender<ResponseMessage>,
    head: Option<ResponseHead>,
    declared: Option<u64>,
    written: u64,
    ended: bool,
}

impl ResponseWriter {
    fn new(tx: mpsc::Sender<ResponseMessage>) -> Self {
        Self { tx, head: Some(Response::new(())), declared: None, written: 0, ended: false }
    }

    /// Sets the status code. Fails once the head is committed.
    pub fn set_status(&mut self, status: StatusCode) -> Result<(), SendError> {
        match &mut self.head {
            Some(head) => {
                *head.status_mut() = status;
                Ok(())
            }
            None => Err(SendError::ResponseAlreadyStarted),
        }
    }

    /// Sets a header, replacing any previous value under the same name.
    /// Fails once the head is committed.
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), SendError> {
        match &mut self.head {
            Some(head) => {
                head.headers_mut().insert(name, value);
                Ok(())
            }
            None => Err(SendError::ResponseAlreadyStarted),
        }
    }

    /// Appends a body chunk, committing the head first if this is the first
    /// write. Suspends while the connection's outgoing buffer is full; bytes
    /// reach the transport in call order.
    pub async fn write(&mut self, data: Bytes) -> Result<(), SendError> {
        if self.ended {
            return Err(SendError::invalid_body("write after end"));
        }

        self.commit().await?;

        if data.is_empty() {
            return Ok(());
        }

        let written = self.written + data.len() as u64;
        if let Some(declared) = self.declared
            && written > declared
        {
            return Err(SendError::content_length_mismatch(declared, written));
        }

        self.send(ResponseMessage::Chunk(data)).await?;
        self.written = written;
        Ok(())
    }

    /// Finishes the response.
    ///
    /// Commits the head if nothing was written yet (an explicit
    /// Content-Length of more than the bytes written is a
    /// [`SendError::ContentLengthMismatch`]). Calling `end` again after a
    /// successful `end` is a no-op returning `Ok(())`: nothing further is
    /// emitted and no error is reported.
    pub async fn end(&mut self) -> Result<(), SendError> {
        if self.ended {
            return Ok(());
        }

        if let Some(head) = &self.head {
            // nothing written: empty body unless a length was declared.
            // validate before consuming the head, so a bad Content-Length
            // leaves the writer in a retryable state
            let declared = declared_length(head)?;
            let framing = match declared {
                Some(n) if n > 0 => PayloadSize::Length(n),
                _ => PayloadSize::Empty,
            };
            self.declared = declared;
            if let Some(head) = self.head.take() {
                self.send(ResponseMessage::Head(head, framing)).await?;
            }
        }

        if let Some(declared) = self.declared
            && self.written != declared
        {
            return Err(SendError::content_length_mismatch(declared, self.written));
        }

        self.send(ResponseMessage::End).await?;
        self.ended = true;
        Ok(())
    }

    /// Whether `end` already completed successfully.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    async fn commit(&mut self) -> Result<(), SendError> {
        let Some(head) = &self.head else { return Ok(()) };

        // a bad Content-Length must not consume the head
        let declared = declared_length(head)?;
        let framing = match declared {
            Some(n) => PayloadSize::Length(n),
            None => PayloadSize::Chunked,
        };
        self.declared = declared;
        match self.head.take() {
            Some(head) => self.send(ResponseMessage::Head(head, framing)).await,
            None => Ok(()),
        }
    }

    async fn send(&mut self, message: ResponseMessage) -> Result<(), SendError> {
        self.tx.send(message).await.map_err(|_| SendError::ConnectionClosed)
    }
}

fn declared_length(head: &ResponseHead) -> Result<Option<u64>, SendError> {
    let Some(value) = head.headers().get(http::header::CONTENT_LENGTH) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Some)
        .ok_or_else(|| SendError::invalid_body("content-length header is not a u64"))
}

/// Connection-side record of how far a response got, used to complete or
/// reject a response the handler abandoned without `end`.
#[derive(Debug, Default)]
pub(crate) struct ResponseProgress {
    committed: Option<PayloadSize>,
    written: u64,
    ended: bool,
}

impl ResponseProgress {
    pub(crate) fn record(&mut self, message: &ResponseMessage) {
        match message {
            ResponseMessage::Head(_, framing) => self.committed = Some(*framing),
            ResponseMessage::Chunk(bytes) => self.written += bytes.len() as u64,
            ResponseMessage::End => self.ended = true,
        }
    }

    pub(crate) fn committed(&self) -> Option<PayloadSize> {
        self.committed
    }

    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.ended
    }
}
