//! Application handler trait.
//!
//! A handler is one callable invoked with the parsed request and the response
//! writer, exactly once per request head. [`make_handler`] adapts a plain
//! async function so applications don't need to implement the trait by hand.

use std::error::Error;
use std::future::Future;

use async_trait::async_trait;

use http::Request;

use crate::exchange::ResponseWriter;
use crate::protocol::body::ReqBody;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Processes one request/response exchange.
///
/// Returning `Err` without having committed the response produces a plain
/// `500`; an error after the head was flushed can only terminate the
/// connection.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, request: Request<ReqBody>, response: ResponseWriter) -> Result<(), BoxError>;
}

/// Adapter implementing [`Handler`] for an async function.
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request<ReqBody>, ResponseWriter) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    async fn call(&self, request: Request<ReqBody>, response: ResponseWriter) -> Result<(), BoxError> {
        (self.f)(request, response).await
    }
}

pub fn make_handler<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<ReqBody>, ResponseWriter) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    HandlerFn { f }
}
