//! HTTP body handling module for processing request and response payloads
//!
//! This module provides functionality for encoding request bodies and decoding
//! response bodies using the framing announced in the message head.
//!
//! # Components
//!
//! ## Decoders
//! - `ChunkedDecoder`: Handles chunked transfer encoded payloads and their trailers
//! - `LengthDecoder`: Processes fixed-length payloads
//! - [`PayloadDecoder`]: Main decoder that coordinates different decoding strategies,
//!   including bodies that end when the server closes the connection
//!
//! ## Encoders
//! - `LengthEncoder`: Handles fixed-length payload encoding
//! - [`PayloadEncoder`]: Main encoder for request bodies

mod chunked_decoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
