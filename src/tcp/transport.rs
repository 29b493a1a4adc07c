//! Exact-length byte transfer over one stream connection.
//!
//! The transport owns the socket and a read buffer. Reads accumulate until
//! the requested count is available; anything read past it stays buffered
//! for the next call. Every failure is mapped to a [`ViconError`] variant so
//! callers can tell a clean peer close from a local I/O error or a timeout.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::types::{Result, ViconError};

const INITIAL_READ_CAPACITY: usize = 256;

/// Connection state of a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Buffered byte transport over one connected stream.
pub struct Transport<S = TcpStream> {
    stream: Option<S>,
    read_buf: BytesMut,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl Transport<TcpStream> {
    /// Open a TCP connection to the configured endpoint.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let addr = config.address();

        let connecting = TcpStream::connect((config.host.as_str(), config.port));
        let result = match config.connect_timeout() {
            Some(limit) => match tokio::time::timeout(limit, connecting).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(ViconError::Connect {
                        addr,
                        source: io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("no answer within {:?}", limit),
                        ),
                    })
                }
            },
            None => connecting.await,
        };
        let stream = result.map_err(|source| ViconError::Connect {
            addr: addr.clone(),
            source,
        })?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY on {}: {}", addr, e);
        }
        info!("Connected to {}", addr);

        Ok(Self::from_stream(stream, config))
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream.
    pub fn from_stream(stream: S, config: &ClientConfig) -> Self {
        Self {
            stream: Some(stream),
            read_buf: BytesMut::with_capacity(INITIAL_READ_CAPACITY),
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.stream.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Number of received bytes not yet handed out.
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    /// Write all of `bytes`.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_peer_open()?;

        let limit = self.write_timeout;
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        let write = async {
            stream.write_all(bytes).await?;
            stream.flush().await
        };

        with_limit(limit, "send", write)
            .await?
            .map_err(ViconError::Send)
    }

    /// Read exactly `n` bytes, accumulating partial reads.
    pub async fn receive_exact(&mut self, n: usize) -> Result<Bytes> {
        let limit = self.read_timeout;
        let fill = async {
            while self.read_buf.len() < n {
                let stream = self.stream.as_mut().ok_or(ViconError::ConnectionClosed)?;
                self.read_buf.reserve(n - self.read_buf.len());
                match stream.read_buf(&mut self.read_buf).await {
                    Ok(0) => return Err(ViconError::ConnectionClosed),
                    Ok(_) => {}
                    Err(e) if is_disconnect(&e) => return Err(ViconError::ConnectionClosed),
                    Err(e) => return Err(ViconError::Receive(e)),
                }
            }
            Ok(())
        };
        with_limit(limit, "receive", fill).await??;

        Ok(self.read_buf.split_to(n).freeze())
    }

    /// Close the connection. Safe to call in any state.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Shutdown on disconnect failed: {}", e);
            }
            info!("Disconnected");
        }
        self.read_buf.clear();
    }

    /// Fail fast if the peer has already closed its side.
    ///
    /// Polls one read without waiting. Bytes that happen to be available are
    /// kept in the read buffer.
    fn check_peer_open(&mut self) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        match stream.read_buf(&mut self.read_buf).now_or_never() {
            None => Ok(()),
            Some(Ok(0)) => Err(ViconError::ConnectionClosed),
            Some(Ok(n)) => {
                debug!("{} unread bytes buffered before send", n);
                Ok(())
            }
            Some(Err(e)) if is_disconnect(&e) => Err(ViconError::ConnectionClosed),
            Some(Err(e)) => Err(ViconError::Receive(e)),
        }
    }
}

async fn with_limit<F: Future>(
    limit: Option<Duration>,
    operation: &'static str,
    fut: F,
) -> Result<F::Output> {
    match limit {
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| ViconError::Timeout { operation, after }),
        None => Ok(fut.await),
    }
}

fn not_connected() -> ViconError {
    ViconError::Send(io::Error::new(
        io::ErrorKind::NotConnected,
        "transport is disconnected",
    ))
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}
