//! An asynchronous HTTP/1.1 request-response exchange core
//!
//! This crate implements the connection lifecycle of an HTTP/1.1 server on
//! top of tokio: incremental request parsing, exactly-once handler dispatch,
//! streaming bodies in both directions, and keep-alive reuse with strict
//! message-boundary accounting.
//!
//! # Features
//!
//! - Full HTTP/1.1 protocol support with keep-alive connections
//! - Asynchronous I/O using tokio
//! - Streaming request and response bodies
//! - Chunked transfer encoding, both directions
//! - Imperative response writing with backpressure
//! - Expect-continue mechanism
//! - Configurable header and body limits
//! - Connection lifecycle events
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use http::Request;
//! use http_body_util::BodyExt;
//! use tracing::{info, Level};
//! use tracing_subscriber::FmtSubscriber;
//!
//! use quill_http::handler::{make_handler, BoxError};
//! use quill_http::exchange::ResponseWriter;
//! use quill_http::protocol::body::ReqBody;
//! use quill_http::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber)?;
//!
//!     let handler = Arc::new(make_handler(hello_world));
//!
//!     let server = Server::builder().address("127.0.0.1:8080").build()?;
//!     info!(port = 8080, "start listening");
//!     server.run(handler).await?;
//!     Ok(())
//! }
//!
//! async fn hello_world(request: Request<ReqBody>, mut response: ResponseWriter) -> Result<(), BoxError> {
//!     let path = request.uri().path().to_string();
//!     info!("request path {}", path);
//!
//!     let body = request.into_body().collect().await?.to_bytes();
//!     info!(received = body.len(), "read request body");
//!
//!     response.write(Bytes::from_static(b"Hello World!\r\n")).await?;
//!     response.end().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`server`]: accept loop, per-connection tasks, graceful shutdown
//! - [`connection`]: one connection's request/response lifecycle
//! - [`exchange`]: the [`exchange::ResponseWriter`] handed to handlers
//! - [`codec`]: wire-level encoding and decoding
//! - [`protocol`]: message vocabulary, errors, request types, events
//! - [`handler`]: the application-facing handler trait

pub mod codec;
mod config;
pub mod connection;
pub mod exchange;
pub mod handler;
pub mod protocol;
pub mod server;
mod utils;

pub use config::ConnectionConfig;
