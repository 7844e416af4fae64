use std::sync::Arc;

use bytes::Bytes;
use http::Request;
use http_body_util::BodyExt;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use quill_http::handler::{BoxError, make_handler};
use quill_http::exchange::ResponseWriter;
use quill_http::protocol::body::ReqBody;
use quill_http::server::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let handler = Arc::new(make_handler(echo));

    let server = Server::builder().address("127.0.0.1:8080").build()?;
    info!(port = 8080, "start listening");
    server.run(handler).await?;
    Ok(())
}

async fn echo(request: Request<ReqBody>, mut response: ResponseWriter) -> Result<(), BoxError> {
    info!(path = %request.uri().path(), "incoming request");

    let body = request.into_body().collect().await?.to_bytes();
    if body.is_empty() {
        response.write(Bytes::from_static(b"Hello World!\r\n")).await?;
    } else {
        response.write(body).await?;
    }
    response.end().await?;
    Ok(())
}
