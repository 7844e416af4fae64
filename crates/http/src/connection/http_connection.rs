use std::sync::Arc;

use futures::{SinkExt, StreamExt, pin_mut, select};

use futures::FutureExt;
use http::header::EXPECT;
use http::{Response, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{error, info, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::config::ConnectionConfig;
use crate::exchange::{ResponseMessage, ResponseProgress, response_channel};
use crate::handler::{BoxError, Handler};
use crate::protocol::body::ReqBody;
use crate::protocol::events::EventListeners;
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHeader, ResponseHead, SendError};

/// Frame type flowing into the response encoder; pins the generic payload
/// buffer so call sites stay unambiguous.
type OutMessage = Message<(ResponseHead, PayloadSize)>;

/// Payload emitted through the connection's event listeners.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A fatal error terminated the connection; carries the rendered cause.
    /// Dispatched under `"error"`.
    Error(String),
    /// The connection finished, cleanly or not. Dispatched under `"close"`.
    Close,
}

/// An HTTP/1.1 connection, serving requests in arrival order until the peer
/// goes away or a fatal error desynchronizes the stream.
///
/// Each decoded request head invokes the handler exactly once, concurrently
/// with request body streaming and response streaming. Whatever body the
/// handler leaves unread is drained before the next head so keep-alive
/// reuse starts at a clean message boundary.
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
///
pub struct HttpConnection<R, W> {
    framed_read: FramedRead<R, RequestDecoder>,
    framed_write: FramedWrite<W, ResponseEncoder>,
    config: ConnectionConfig,
    events: EventListeners<ConnectionEvent>,
}

impl<R, W> std::fmt::Debug for HttpConnection<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection").field("config", &self.config).field("events", &self.events).finish_non_exhaustive()
    }
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_config(reader, writer, ConnectionConfig::default())
    }

    pub fn with_config(reader: R, writer: W, config: ConnectionConfig) -> Self {
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(config), config.max_header_bytes()),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            config,
            events: EventListeners::new(),
        }
    }

    /// Registers a listener for `"error"` or `"close"` events. Listeners run
    /// synchronously in subscription order when the event fires; an event
    /// nobody subscribed to is dropped silently.
    pub fn on<F>(&mut self, event: &'static str, listener: F)
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.events.on(event, listener);
    }

    /// Serves the connection to completion, consuming it.
    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
    {
        let result = self.serve(&handler).await;

        let _ = self.framed_write.get_mut().shutdown().await;

        if let Err(e) = &result {
            self.events.emit("error", &ConnectionEvent::Error(e.to_string()));
        }
        self.events.emit("close", &ConnectionEvent::Close);

        result
    }

    async fn serve<H>(&mut self, handler: &Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
    {
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Header((header, payload_size)))) => {
                    let keep_alive = header.is_keep_alive();
                    self.serve_exchange(header, payload_size, handler).await?;
                    if !keep_alive {
                        info!("request asked for connection close");
                        return Ok(());
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("payload frame while waiting for a request head");
                    self.send_plain_response(StatusCode::BAD_REQUEST).await?;
                    return Err(ParseError::invalid_body("body frame outside a request").into());
                }

                Some(Err(e)) => {
                    error!("can't read the next request: {e}");
                    // best effort; the stream may already be unwritable
                    let _ = self.send_plain_response(StatusCode::BAD_REQUEST).await;
                    return Err(e.into());
                }

                None => {
                    info!("peer closed the connection");
                    return Ok(());
                }
            }
        }
    }

    async fn serve_exchange<H>(&mut self, header: RequestHeader, payload_size: PayloadSize, handler: &Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
    {
        // a declared length over the limit is refused before the handler runs;
        // the declared extent is still drained so the connection stays aligned
        if let PayloadSize::Length(declared) = payload_size
            && declared > self.config.max_body_bytes()
        {
            warn!(declared, limit = self.config.max_body_bytes(), "request body over limit, refusing");
            self.send_plain_response(StatusCode::PAYLOAD_TOO_LARGE).await?;
            self.drain_refused_body().await?;
            return Ok(());
        }

        if let Some(value) = header.headers().get(EXPECT) {
            let slice = value.as_bytes();
            if slice.len() >= 4 && &slice[0..4] == b"100-" {
                let writer = self.framed_write.get_mut();
                writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await.map_err(SendError::io)?;
                writer.flush().await.map_err(SendError::io)?;
                info!("expect header honored, continue response sent");
            }
        }

        let (req_body, mut body_sender) = ReqBody::channel(&mut self.framed_read, payload_size);
        let (writer, mut response_rx) = response_channel();
        let request = header.body(req_body);

        let mut progress = ResponseProgress::default();
        let mut body_result: Option<Result<(), ParseError>> = None;

        // Three things make progress at once: the handler, the request body
        // producer it pulls from, and the response stream it pushes into. The
        // response stream is the exit condition: it ends when every writer
        // handle is gone, which also proves no further chunk can arrive.
        let handler_result: Result<(), BoxError> = {
            let handler_future = handler.call(request, writer).fuse();
            let body_future = body_sender.send_body().fuse();
            pin_mut!(handler_future, body_future);

            let mut handler_result = None;

            loop {
                select! {
                    message = response_rx.next() => match message {
                        Some(message) => {
                            progress.record(&message);
                            forward_response(&mut self.framed_write, message).await?;
                        }
                        None => break,
                    },
                    result = handler_future => handler_result = Some(result),
                    result = body_future => body_result = Some(result),
                }
            }

            match handler_result {
                Some(result) => result,
                // the handler released its writer early and is still running
                None => loop {
                    select! {
                        result = handler_future => break result,
                        result = body_future => body_result = Some(result),
                    }
                },
            }
        };

        let body_outcome = match body_result {
            Some(Err(e)) => Err(e),
            Some(Ok(())) | None => body_sender.skip_body().await,
        };

        if let Err(e) = body_outcome {
            // a chunked body over the limit still gets its refusal when the
            // head is uncommitted; either way the parser has lost the stream
            if matches!(e, ParseError::BodyTooLarge { .. }) && progress.committed().is_none() {
                let _ = self.send_plain_response(StatusCode::PAYLOAD_TOO_LARGE).await;
            }
            return Err(e.into());
        }

        self.finish_exchange(handler_result, progress).await
    }

    /// Completes an exchange whose handler has returned, repairing a response
    /// it abandoned short of `end`.
    async fn finish_exchange(&mut self, handler_result: Result<(), BoxError>, progress: ResponseProgress) -> Result<(), HttpError> {
        let fallback_status = match handler_result {
            Ok(()) => StatusCode::OK,
            Err(e) => {
                error!("handler failed: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if progress.is_ended() {
            return Ok(());
        }

        match progress.committed() {
            // the response never started, answer for the handler
            None => self.send_plain_response(fallback_status).await,

            Some(PayloadSize::Chunked) => {
                warn!("response left open, terminating the chunked stream");
                self.finish_response_body().await
            }

            Some(PayloadSize::Length(declared)) => {
                let written = progress.written();
                if written == declared {
                    self.finish_response_body().await
                } else {
                    // the peer was promised more bytes than it got; only a
                    // teardown keeps it from misreading the next response
                    error!(declared, written, "response abandoned mid-body");
                    Err(SendError::content_length_mismatch(declared, written).into())
                }
            }

            Some(PayloadSize::Empty) => self.finish_response_body().await,
        }
    }

    async fn send_plain_response(&mut self, status: StatusCode) -> Result<(), HttpError> {
        let mut head = Response::new(());
        *head.status_mut() = status;

        self.framed_write.feed(OutMessage::Header((head, PayloadSize::Empty))).await.map_err(HttpError::from)?;
        self.finish_response_body().await
    }

    async fn finish_response_body(&mut self) -> Result<(), HttpError> {
        self.framed_write.send(OutMessage::Payload(PayloadItem::Eof)).await.map_err(HttpError::from)
    }

    /// Reads out the body of a refused request so the next head starts clean.
    async fn drain_refused_body(&mut self) -> Result<(), ParseError> {
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Payload(item))) => {
                    if item.is_eof() {
                        return Ok(());
                    }
                }
                Some(Ok(Message::Header(_))) => {
                    return Err(ParseError::invalid_body("head received inside a message body"));
                }
                Some(Err(e)) => return Err(e),
                None => return Err(ParseError::ConnectionClosed),
            }
        }
    }
}

async fn forward_response<W>(
    framed_write: &mut FramedWrite<W, ResponseEncoder>,
    message: ResponseMessage,
) -> Result<(), SendError>
where
    W: AsyncWrite + Unpin,
{
    match message {
        ResponseMessage::Head(head, framing) => framed_write.feed(OutMessage::Header((head, framing))).await,
        // send, not feed: handlers stream, so every chunk goes to the wire
        ResponseMessage::Chunk(bytes) => framed_write.send(OutMessage::Payload(PayloadItem::Chunk(bytes))).await,
        ResponseMessage::End => framed_write.send(OutMessage::Payload(PayloadItem::Eof)).await,
    }
}
