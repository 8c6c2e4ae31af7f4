//! HTTP codec module for encoding requests and decoding responses
//!
//! This module provides functionality for streaming HTTP message processing
//! on the client side. It uses a state machine pattern to handle both heads
//! and payload data efficiently.
//!
//! # Architecture
//!
//! - Request handling:
//!   - [`RequestEncoder`]: Encodes outgoing HTTP requests
//!   - Head encoding via the `header` module
//!   - Payload encoding via the `body` module
//!
//! - Response handling:
//!   - [`ResponseDecoder`]: Decodes incoming HTTP responses
//!   - Head parsing via the `header` module
//!   - Payload decoding via the `body` module, including chunked trailers
//!
//! # Features
//!
//! - Streaming processing of HTTP messages
//! - Support for chunked transfer encoding and trailers
//! - Content-Length and read-until-close payload handling
//! - Skipping of interim `1xx` responses

mod body;
mod header;
mod request_encoder;
mod response_decoder;

pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;
