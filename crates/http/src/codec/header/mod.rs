//! HTTP header processing module for encoding and decoding heads
//!
//! # Components
//!
//! - [`HeaderDecoder`]: Decodes HTTP response heads from raw bytes
//!   - Supports HTTP/1.0 and HTTP/1.1 status lines
//!   - Skips interim 1xx responses
//!   - Manages header size limits
//!   - Selects the body framing of the response
//!
//! - [`HeaderEncoder`]: Encodes HTTP request heads to bytes
//!   - Writes the request line in origin-form
//!   - Manages content-length and transfer-encoding headers

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
