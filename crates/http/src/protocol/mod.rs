//! Core HTTP protocol abstractions for the client side.
//!
//! This module provides the message-level building blocks the transport is made
//! of: request and response heads, payload items, cookies and the error types
//! shared by every layer.
//!
//! # Architecture
//!
//! - **Message Handling**: Core message types and payload processing
//!   - [`Message`]: Represents either a head or payload items
//!   - [`PayloadItem`]: A body chunk, the trailer section, or EOF
//!   - [`PayloadSize`]: How the body of a message is framed
//!
//! - **Request Processing**: Outgoing requests
//!   - [`Request`] and [`make_request`]
//!
//! - **Response Processing**: Parsed status line and headers
//!   - [`ResponseHeader`]
//!
//! - **Cookies**: `Set-Cookie` parsing into [`Cookies`] of [`Cookie`]
//!
//! - **Error Handling**:
//!   - [`HttpError`]: Top-level error type
//!   - [`ConnectionError`]: Pool, connect and socket errors
//!   - [`ParseError`]: Response parsing errors
//!   - [`SendError`]: Request serialization errors

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::Request;
pub use request::RequestHead;
pub use request::make_request;

mod response;
pub use response::ResponseHead;
pub use response::ResponseHeader;

mod cookie;
pub use cookie::Cookie;
pub use cookie::Cookies;

mod error;
pub use error::ConnectionError;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
