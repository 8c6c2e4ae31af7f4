use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

pin_project! {
    /// The transport under a connection, plain or upgraded to TLS.
    #[project = MaybeTlsStreamProj]
    #[derive(Debug)]
    pub(crate) enum MaybeTlsStream {
        Tcp { #[pin] stream: TcpStream },
        Tls { #[pin] stream: TlsStream<TcpStream> },
    }
}

impl MaybeTlsStream {
    pub(crate) fn is_tls(&self) -> bool {
        matches!(self, MaybeTlsStream::Tls { .. })
    }
}

impl From<TcpStream> for MaybeTlsStream {
    fn from(stream: TcpStream) -> Self {
        MaybeTlsStream::Tcp { stream }
    }
}

impl From<TlsStream<TcpStream>> for MaybeTlsStream {
    fn from(stream: TlsStream<TcpStream>) -> Self {
        MaybeTlsStream::Tls { stream }
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeTlsStreamProj::Tcp { stream } => stream.poll_read(cx, buf),
            MaybeTlsStreamProj::Tls { stream } => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.project() {
            MaybeTlsStreamProj::Tcp { stream } => stream.poll_write(cx, buf),
            MaybeTlsStreamProj::Tls { stream } => stream.poll_write(cx, buf),
        }
    }

    fn poll_write_vectored(self: Pin<&mut Self>, cx: &mut Context<'_>, bufs: &[io::IoSlice<'_>]) -> Poll<io::Result<usize>> {
        match self.project() {
            MaybeTlsStreamProj::Tcp { stream } => stream.poll_write_vectored(cx, bufs),
            MaybeTlsStreamProj::Tls { stream } => stream.poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            MaybeTlsStream::Tcp { stream } => stream.is_write_vectored(),
            MaybeTlsStream::Tls { stream } => stream.is_write_vectored(),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeTlsStreamProj::Tcp { stream } => stream.poll_flush(cx),
            MaybeTlsStreamProj::Tls { stream } => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            MaybeTlsStreamProj::Tcp { stream } => stream.poll_shutdown(cx),
            MaybeTlsStreamProj::Tls { stream } => stream.poll_shutdown(cx),
        }
    }
}
