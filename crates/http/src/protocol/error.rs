use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("connection error: {source}")]
    ConnectionError {
        #[from]
        source: ConnectionError,
    },

    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: SendError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: ParseError,
    },
}

impl HttpError {
    /// Returns the connection-level error, if this error came from the transport.
    pub fn as_connection_error(&self) -> Option<&ConnectionError> {
        match self {
            HttpError::ConnectionError { source } => Some(source),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.as_connection_error().is_some_and(ConnectionError::is_timeout)
    }
}

/// Failures of the connection layer: pool waits, connects, socket reads and writes.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connect to {host}:{port} timed out")]
    ConnectionTimeout { host: String, port: u16 },

    #[error("read timed out")]
    ReadTimeout,

    #[error("write timed out")]
    WriteTimeout,

    #[error("timed out waiting for a free connection slot")]
    PoolTimeout,

    #[error("os error: {source}")]
    ConnectionOs {
        #[from]
        source: io::Error,
    },

    #[error("tls error: {source}")]
    ConnectionTls { source: io::Error },

    #[error("invalid proxy: {reason}")]
    InvalidProxy { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl ConnectionError {
    pub fn connection_timeout<S: ToString>(host: S, port: u16) -> Self {
        Self::ConnectionTimeout { host: host.to_string(), port }
    }

    pub fn os<E: Into<io::Error>>(e: E) -> Self {
        Self::ConnectionOs { source: e.into() }
    }

    pub fn tls<E: Into<io::Error>>(e: E) -> Self {
        Self::ConnectionTls { source: e.into() }
    }

    pub fn invalid_proxy<S: ToString>(str: S) -> Self {
        Self::InvalidProxy { reason: str.to_string() }
    }

    pub fn configuration<S: ToString>(str: S) -> Self {
        Self::Configuration { reason: str.to_string() }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::ReadTimeout | Self::WriteTimeout | Self::PoolTimeout
        )
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid status code: {0:?}")]
    InvalidStatus(Option<u16>),

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("incomplete body: stream ended after {received} bytes")]
    IncompleteBody { received: usize },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn incomplete_body(received: usize) -> Self {
        Self::IncompleteBody { received }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid uri: {reason}")]
    InvalidUri { reason: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_uri<S: ToString>(str: S) -> Self {
        Self::InvalidUri { reason: str.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
