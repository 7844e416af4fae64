use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;

use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, Stream, StreamExt};

use http_body::{Body, Frame, SizeHint};
use tracing::{debug, error};

use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};

type ChunkResult = Result<PayloadItem, ParseError>;

/// Consumer half of a request body, handed to the application handler.
///
/// Implements `http_body::Body`, pulling chunks from the connection on demand.
/// The sequence is single-pass and non-restartable; it ends with either a
/// normal end-of-body or a terminal error.
pub struct ReqBody {
    signal: mpsc::Sender<oneshot::Sender<ChunkResult>>,
    receiving: Option<oneshot::Receiver<ChunkResult>>,
    size: PayloadSize,
}

impl ReqBody {
    fn new(signal: mpsc::Sender<oneshot::Sender<ChunkResult>>, size: PayloadSize) -> Self {
        Self { signal, receiving: None, size }
    }

    /// Creates the consumer/producer pair for one request body.
    ///
    /// `payload_stream` is the framed transport; the returned sender must be
    /// driven concurrently with the handler so chunk requests make progress.
    pub fn channel<S>(payload_stream: &mut S, size: PayloadSize) -> (ReqBody, ReqBodySender<'_, S>)
    where
        S: Stream + Unpin,
    {
        let (signal, receiver) = mpsc::channel(16);
        (ReqBody::new(signal, size), ReqBodySender { payload_stream, receiver, eof: false })
    }
}

impl fmt::Debug for ReqBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqBody").field("size", &self.size).finish_non_exhaustive()
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        // an empty body never touches the transport; the producer side still
        // consumes the framing `Eof` when it drains
        if self.size.is_empty() {
            return Poll::Ready(None);
        }

        loop {
            if let Some(receiver) = &mut self.receiving {
                let result = ready!(receiver.poll_unpin(cx));
                self.receiving.take();
                return match result {
                    Ok(Ok(PayloadItem::Chunk(bytes))) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
                    Ok(Ok(PayloadItem::Eof)) => Poll::Ready(None),
                    Ok(Err(e)) => Poll::Ready(Some(Err(e))),
                    // producer dropped without answering: the connection is gone
                    Err(_canceled) => Poll::Ready(Some(Err(ParseError::ConnectionClosed))),
                };
            }

            match ready!(self.signal.poll_ready(cx)) {
                Ok(()) => {
                    let (reply, receiving) = oneshot::channel();
                    match self.signal.start_send(reply) {
                        Ok(()) => self.receiving = Some(receiving),
                        Err(_) => return Poll::Ready(Some(Err(ParseError::ConnectionClosed))),
                    }
                }
                Err(_) => return Poll::Ready(Some(Err(ParseError::ConnectionClosed))),
            }
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self.size {
            PayloadSize::Length(n) => SizeHint::with_exact(n),
            PayloadSize::Chunked => SizeHint::new(),
            PayloadSize::Empty => SizeHint::with_exact(0),
        }
    }
}

/// Producer half: answers chunk requests by reading the framed transport.
///
/// Also responsible for draining whatever the handler left unread, so a
/// keep-alive connection starts the next request at a clean boundary.
pub struct ReqBodySender<'conn, S>
where
    S: Stream + Unpin,
{
    payload_stream: &'conn mut S,
    receiver: mpsc::Receiver<oneshot::Sender<ChunkResult>>,
    eof: bool,
}

impl<S> fmt::Debug for ReqBodySender<'_, S>
where
    S: Stream + Unpin,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqBodySender").field("eof", &self.eof).finish_non_exhaustive()
    }
}

impl<S> ReqBodySender<'_, S>
where
    S: Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin,
{
    /// Serves chunk requests until the body ends or the transport fails.
    ///
    /// The error returned here is the connection-side view; the consumer is
    /// handed its own terminal error through the pending reply slot.
    pub async fn send_body(&mut self) -> Result<(), ParseError> {
        while !self.eof {
            let Some(reply) = self.receiver.next().await else {
                // consumer dropped without reading everything; skip_body will drain
                return Ok(());
            };

            match self.next_item().await {
                Ok(item) => {
                    self.eof = item.is_eof();
                    let _ = reply.send(Ok(item));
                }
                Err(e) => {
                    let _ = reply.send(Err(consumer_view(&e)));
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Drains the rest of the body after the handler has returned.
    pub async fn skip_body(&mut self) -> Result<(), ParseError> {
        let mut skipped: usize = 0;
        while !self.eof {
            let item = self.next_item().await?;
            match item {
                PayloadItem::Chunk(bytes) => skipped += bytes.len(),
                PayloadItem::Eof => self.eof = true,
            }
        }
        if skipped > 0 {
            debug!(skipped, "drained unread request body");
        }
        Ok(())
    }

    async fn next_item(&mut self) -> Result<PayloadItem, ParseError> {
        match self.payload_stream.next().await {
            Some(Ok(Message::Payload(item))) => Ok(item),
            Some(Ok(Message::Header(_))) => {
                error!("request head arrived while the previous body was still open");
                Err(ParseError::invalid_body("head received inside a message body"))
            }
            Some(Err(e)) => Err(e),
            None => Err(ParseError::ConnectionClosed),
        }
    }
}

/// The terminal error delivered to the body consumer. `ParseError` is not
/// clonable, so the few variants a handler can act on are rebuilt and the
/// rest collapse into `ConnectionClosed`, which is what they mean for the
/// consumer anyway.
fn consumer_view(e: &ParseError) -> ParseError {
    match e {
        ParseError::BodyTooLarge { limit } => ParseError::body_too_large(*limit),
        _ => ParseError::ConnectionClosed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use http_body_util::BodyExt;

    fn payload_stream(
        items: Vec<Result<Message<(RequestHeader, PayloadSize)>, ParseError>>,
    ) -> impl Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin {
        stream::iter(items)
    }

    #[tokio::test]
    async fn body_chunks_arrive_in_order() {
        let mut stream = payload_stream(vec![
            Ok(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"hello ")))),
            Ok(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"world")))),
            Ok(Message::Payload(PayloadItem::Eof)),
        ]);
        let (body, mut sender) = ReqBody::channel(&mut stream, PayloadSize::Length(11));

        let (collected, sent) = tokio::join!(body.collect(), sender.send_body());
        sent.unwrap();
        assert_eq!(collected.unwrap().to_bytes(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn empty_payload_is_immediately_eof() {
        let mut stream = payload_stream(vec![Ok(Message::Payload(PayloadItem::Eof))]);
        let (body, mut sender) = ReqBody::channel(&mut stream, PayloadSize::Empty);

        let (collected, sent) = tokio::join!(body.collect(), sender.send_body());
        sent.unwrap();
        assert!(collected.unwrap().to_bytes().is_empty());
    }

    #[tokio::test]
    async fn truncated_body_surfaces_connection_closed() {
        // framing declared more data than the transport delivered
        let mut stream = payload_stream(vec![Ok(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"12"))))]);
        let (body, mut sender) = ReqBody::channel(&mut stream, PayloadSize::Length(5));

        let (collected, sent) = tokio::join!(body.collect(), sender.send_body());
        assert!(matches!(sent, Err(ParseError::ConnectionClosed)));
        assert!(matches!(collected, Err(ParseError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn skip_body_drains_to_eof() {
        let mut stream = payload_stream(vec![
            Ok(Message::Payload(PayloadItem::Chunk(Bytes::from_static(b"unread")))),
            Ok(Message::Payload(PayloadItem::Eof)),
        ]);
        let (body, mut sender) = ReqBody::channel(&mut stream, PayloadSize::Length(6));

        drop(body);
        sender.send_body().await.unwrap();
        sender.skip_body().await.unwrap();
    }
}
