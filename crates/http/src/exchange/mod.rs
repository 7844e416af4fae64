//! One request paired with one response on a connection.
//!
//! The handler side holds a [`ResponseWriter`]; the connection side drains the
//! writer's message stream onto the transport. The channel between them is
//! bounded, so a peer that stops reading eventually suspends the handler's
//! `write` calls instead of buffering without limit.

mod response_writer;

pub use response_writer::ResponseWriter;

pub(crate) use response_writer::ResponseMessage;
pub(crate) use response_writer::ResponseProgress;
pub(crate) use response_writer::response_channel;
