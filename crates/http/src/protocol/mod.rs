//! Core protocol vocabulary shared by the codec, exchange and connection
//! layers.
//!
//! - [`message`]: the `Header`/`Payload` frame types flowing through the codec
//! - [`request`]: parsed request heads, raw header pairs and merge policy
//! - [`response`]: the outgoing head type
//! - [`body`]: streaming request body channel
//! - [`events`]: composed `on`/`emit` listener registry
//! - [`error`]: the `ParseError`/`SendError`/`HttpError` taxonomy
//!
//! Parser internals never cross the connection boundary: application code only
//! ever sees the structured error values defined here.

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RawHeader;
pub use request::RawHeaders;
pub use request::RequestHeader;
pub use request::merged_header_value;

mod response;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
pub mod events;
