//! Connection pooling.
//!
//! The [`Connector`] hands out [`Connection`](crate::connection::Connection)s
//! by value and keeps per-destination caches of idle ones:
//!
//! - a global limit bounds the connections acquired at the same time
//! - a per-destination limit bounds the connections to one
//!   [`ConnectionKey`](crate::connection::ConnectionKey)
//! - slots are `tokio::sync::Semaphore` permits, so waiting never blocks
//!   other tasks and is bounded by the pool budget of the caller's timeout
//!
//! A connection released after a fully drained exchange goes back to the
//! idle set of its key; any other connection is discarded.

mod cache;
mod connector;

pub use connector::Connector;
pub use connector::ConnectorConfig;

pub(crate) use connector::Lease;
