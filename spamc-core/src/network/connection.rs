use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::SpamcError;

/// Port spamd listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 783;

/// Timeout applied to a whole call when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens the one connection a call runs over.
#[async_trait]
pub trait Dialer: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn dial(&self) -> Result<Self::Stream, SpamcError>;
}

// ── TcpDialer ────────────────────────────────────────────────────

/// Dials spamd over TCP, one fresh connection per call.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    info: ConnectionInfo,
    timeout: Duration,
}

impl TcpDialer {
    pub fn new(info: ConnectionInfo, timeout: Duration) -> Self {
        Self { info, timeout }
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self) -> Result<TcpStream, SpamcError> {
        let addr = self.info.to_string();
        debug!(%addr, "connecting to spamd");

        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(addr.as_str()))
            .await
            .map_err(|_| SpamcError::Timeout(self.timeout))?
            .map_err(|source| SpamcError::Dial {
                addr: addr.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

// ── StreamDialer ─────────────────────────────────────────────────

/// Hands out a stream the caller already holds. Good for exactly one call.
#[derive(Debug)]
pub struct StreamDialer<S> {
    stream: Mutex<Option<S>>,
}

impl<S> StreamDialer<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }
}

#[async_trait]
impl<S> Dialer for StreamDialer<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    type Stream = S;

    async fn dial(&self) -> Result<S, SpamcError> {
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotConnected, "stream already used").into()
            })
    }
}

// ── ConnectionInfo ───────────────────────────────────────────────

/// Where spamd listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_PORT)
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ConnectionInfo {
    type Err = SpamcError;

    /// `host`, `host:port` or `[v6]:port`; the port defaults to
    /// [`DEFAULT_PORT`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || SpamcError::InvalidAddress(s.to_string());

        let (host, port) = if let Some(inner) = s.strip_prefix('[') {
            match inner.split_once(']') {
                Some((host, "")) => (host, None),
                Some((host, rest)) => (host, Some(rest.strip_prefix(':').ok_or_else(invalid)?)),
                None => return Err(invalid()),
            }
        } else {
            match s.split_once(':') {
                Some((host, port)) if !port.contains(':') => (host, Some(port)),
                Some(_) => (s, None),
                None => (s, None),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }
        let port = match port {
            Some(port) => port.parse().map_err(|_| invalid())?,
            None => DEFAULT_PORT,
        };
        Ok(Self::new(host, port))
    }
}
