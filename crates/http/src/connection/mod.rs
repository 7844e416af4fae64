//! Connection lifecycle: decode requests, run the handler, stream responses.

mod http_connection;

pub use http_connection::ConnectionEvent;
pub use http_connection::HttpConnection;

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use bytes::Bytes;
    use http::header::CONTENT_LENGTH;
    use http::{HeaderValue, Request, StatusCode};
    use http_body_util::BodyExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf, duplex, split};

    use crate::config::ConnectionConfig;
    use crate::handler::{BoxError, Handler, make_handler};
    use crate::protocol::body::ReqBody;
    use crate::protocol::{HttpError, ParseError};

    fn connection(server: DuplexStream) -> HttpConnection<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>> {
        let (reader, writer) = split(server);
        HttpConnection::new(reader, writer)
    }

    async fn roundtrip<H: Handler + 'static>(requests: &str, handler: H) -> (String, Result<(), HttpError>) {
        let (mut client, server) = duplex(16 * 1024);
        let task = tokio::spawn(connection(server).process(Arc::new(handler)));

        client.write_all(requests.replace('\n', "\r\n").as_bytes()).await.unwrap();
        let mut wire = Vec::new();
        client.read_to_end(&mut wire).await.unwrap();

        (String::from_utf8(wire).unwrap(), task.await.unwrap())
    }

    #[tokio::test]
    async fn handler_runs_exactly_once_per_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = {
            let calls = calls.clone();
            make_handler(move |_request, mut response| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    response.write(Bytes::from_static(b"hello")).await?;
                    response.end().await?;
                    Ok(())
                }
            })
        };

        let (wire, result) = roundtrip("GET / HTTP/1.1\nHost: a\nConnection: close\n\n", handler).await;

        result.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("hello"));
    }

    #[tokio::test]
    async fn keep_alive_requests_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let log = log.clone();
            make_handler(move |request: Request<ReqBody>, mut response| {
                let log = log.clone();
                async move {
                    let path = request.uri().path().to_string();
                    log.lock().unwrap().push(format!("start {path}"));
                    if path == "/one" {
                        // give the second request every chance to overtake
                        tokio::time::sleep(Duration::from_millis(20)).await;
                    }
                    response.insert_header(CONTENT_LENGTH, HeaderValue::from_static("2"))?;
                    response.write(Bytes::from_static(b"ok")).await?;
                    response.end().await?;
                    log.lock().unwrap().push(format!("end {path}"));
                    Ok(())
                }
            })
        };

        let (wire, result) =
            roundtrip("GET /one HTTP/1.1\nHost: a\n\nGET /two HTTP/1.1\nHost: a\nConnection: close\n\n", handler).await;

        result.unwrap();
        assert_eq!(wire.matches("HTTP/1.1 200 OK").count(), 2);
        assert_eq!(*log.lock().unwrap(), vec!["start /one", "end /one", "start /two", "end /two"]);
    }

    #[tokio::test]
    async fn request_body_reaches_the_handler() {
        let handler = make_handler(|request: Request<ReqBody>, mut response| async move {
            let body = request.into_body().collect().await?.to_bytes();
            response.write(body).await?;
            response.end().await?;
            Ok(())
        });

        let (wire, result) =
            roundtrip("POST /echo HTTP/1.1\nHost: a\nContent-Length: 7\nConnection: close\n\npayload", handler).await;

        result.unwrap();
        assert!(wire.contains("payload"));
    }

    #[tokio::test]
    async fn expect_continue_is_answered_before_the_response() {
        let handler = make_handler(|request: Request<ReqBody>, mut response| async move {
            let body = request.into_body().collect().await?.to_bytes();
            response.write(body).await?;
            response.end().await?;
            Ok(())
        });

        let (wire, result) = roundtrip(
            "POST /up HTTP/1.1\nHost: a\nExpect: 100-continue\nContent-Length: 2\nConnection: close\n\nhi",
            handler,
        )
        .await;

        result.unwrap();
        assert!(wire.starts_with("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("hi"));
    }

    #[tokio::test]
    async fn truncated_body_is_fatal_and_reaches_the_consumer() {
        let seen = Arc::new(Mutex::new(None));
        let handler = {
            let seen = seen.clone();
            make_handler(move |request: Request<ReqBody>, _response| {
                let seen = seen.clone();
                async move {
                    let err = request.into_body().collect().await.unwrap_err();
                    *seen.lock().unwrap() = Some(err);
                    Ok::<(), BoxError>(())
                }
            })
        };

        let (mut client, server) = duplex(16 * 1024);
        let task = tokio::spawn(connection(server).process(Arc::new(handler)));

        client.write_all(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\n12").await.unwrap();
        drop(client);

        let result = task.await.unwrap();
        assert!(matches!(result, Err(HttpError::RequestError { source: ParseError::ConnectionClosed })));
        assert!(matches!(*seen.lock().unwrap(), Some(ParseError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn oversized_declared_body_gets_413_and_connection_survives() {
        let paths = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let paths = paths.clone();
            make_handler(move |request: Request<ReqBody>, mut response| {
                let paths = paths.clone();
                async move {
                    paths.lock().unwrap().push(request.uri().path().to_string());
                    response.end().await?;
                    Ok(())
                }
            })
        };

        let (mut client, server) = duplex(16 * 1024);
        let (reader, writer) = split(server);
        let config = ConnectionConfig::default().with_max_body_bytes(8);
        let task = tokio::spawn(HttpConnection::with_config(reader, writer, config).process(Arc::new(handler)));

        let requests = "POST /big HTTP/1.1\nHost: a\nContent-Length: 20\n\n\
                        aaaaaaaaaaaaaaaaaaaa\
                        GET /after HTTP/1.1\nHost: a\nConnection: close\n\n";
        client.write_all(requests.replace('\n', "\r\n").as_bytes()).await.unwrap();
        let mut wire = Vec::new();
        client.read_to_end(&mut wire).await.unwrap();
        let wire = String::from_utf8(wire).unwrap();

        task.await.unwrap().unwrap();
        assert!(wire.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        assert!(wire.contains("HTTP/1.1 200 OK\r\n"));
        // the refused request never reached the handler
        assert_eq!(*paths.lock().unwrap(), vec!["/after"]);
    }

    #[tokio::test]
    async fn handler_error_becomes_a_plain_500() {
        let handler = make_handler(|_request, _response| async move { Err::<(), BoxError>("boom".into()) });

        let (wire, result) = roundtrip("GET / HTTP/1.1\nHost: a\nConnection: close\n\n", handler).await;

        result.unwrap();
        assert!(wire.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(wire.contains("content-length: 0\r\n"));
    }

    #[tokio::test]
    async fn handler_forgetting_end_still_completes_the_response() {
        let handler = make_handler(|_request, mut response: crate::exchange::ResponseWriter| async move {
            response.write(Bytes::from_static(b"partial")).await?;
            // no end(): the chunked stream is closed on our behalf
            Ok(())
        });

        let (wire, result) = roundtrip("GET / HTTP/1.1\nHost: a\nConnection: close\n\n", handler).await;

        result.unwrap();
        assert!(wire.contains("partial"));
        // chunked terminator present
        assert!(wire.ends_with("0\r\n\r\n"));
    }

    #[tokio::test]
    async fn listeners_observe_close_and_error() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let handler = make_handler(|request: Request<ReqBody>, _response| async move {
            let _ = request.into_body().collect().await;
            Ok::<(), BoxError>(())
        });

        let (mut client, server) = duplex(16 * 1024);
        let mut conn = connection(server);
        for event in ["error", "close"] {
            let fired = fired.clone();
            conn.on(event, move |_| fired.lock().unwrap().push(event));
        }
        let task = tokio::spawn(conn.process(Arc::new(handler)));

        // truncated request body forces the error path
        client.write_all(b"POST / HTTP/1.1\r\nContent-Length: 9\r\n\r\nxx").await.unwrap();
        drop(client);

        assert!(task.await.unwrap().is_err());
        assert_eq!(*fired.lock().unwrap(), vec!["error", "close"]);
    }

    #[tokio::test]
    async fn unparseable_request_gets_400() {
        let handler = make_handler(|_request, _response| async move { Ok::<(), BoxError>(()) });

        let (wire, result) = roundtrip("GET / HTTP/1.2\nHost: a\n\n", handler).await;

        assert!(result.is_err());
        assert!(wire.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }
}
