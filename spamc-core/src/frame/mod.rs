//! Request and response frames.
//!
//! ```text
//! Request:  <COMMAND> SPAMC/<ver>\r\n          Response: SPAMD/<ver> <code> <text>\r\n
//!           Content-length: <n>\r\n                      [<Header>: <value>\r\n]*
//!           [<Header>: <value>\r\n]*                     \r\n
//!           \r\n                                         <body, shape per command>
//!           <n bytes of message>
//! ```

pub mod reader;
pub mod writer;

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, BufReader, ReadBuf};
use tokio::time::{Instant, timeout_at};

use crate::error::SpamcError;
use crate::header::Headers;
use crate::protocol::{Report, TellResult, Verdict};

pub use reader::{parse_status_line, parse_symbols, read_response};
pub use writer::{PreparedRequest, write_request};

// ── StatusLine ───────────────────────────────────────────────────

/// `SPAMD/<version> <code> <message>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: String,
    pub code: u32,
    pub message: String,
}

impl StatusLine {
    /// Stand-in for `SKIP`, which spamd never answers.
    pub fn skipped() -> Self {
        Self {
            version: String::new(),
            code: crate::error::EX_OK,
            message: "SKIPPED".into(),
        }
    }
}

// ── Response ─────────────────────────────────────────────────────

/// A decoded response. `S` is the transport the body may still be read from.
#[derive(Debug)]
pub struct Response<S> {
    pub status: StatusLine,
    pub headers: Headers,
    pub body: ResponseBody<S>,
}

/// Response body, one variant per [`BodyShape`](crate::BodyShape).
#[derive(Debug)]
pub enum ResponseBody<S> {
    None,
    Verdict(Verdict),
    Symbols(SymbolsResult),
    Report(ReportResult),
    Message(ProcessResult<S>),
    Tell(TellResult),
}

impl<S> ResponseBody<S> {
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseBody::None => "empty",
            ResponseBody::Verdict(_) => "verdict",
            ResponseBody::Symbols(_) => "symbols",
            ResponseBody::Report(_) => "report",
            ResponseBody::Message(_) => "message",
            ResponseBody::Tell(_) => "tell",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolsResult {
    pub verdict: Verdict,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportResult {
    pub verdict: Verdict,
    pub report: Report,
}

#[derive(Debug)]
pub struct ProcessResult<S> {
    pub verdict: Verdict,
    pub body: MessageBody<S>,
}

// ── MessageBody ──────────────────────────────────────────────────

/// The rewritten message of a `PROCESS` or `HEADERS` response.
///
/// This holds the connection open. Read it through [`AsyncRead`] or the
/// helpers below, then hand it back with [`MessageBody::close`].
#[must_use = "the connection stays open until the body is closed"]
#[derive(Debug)]
pub struct MessageBody<S> {
    reader: BufReader<S>,
    content_length: Option<u64>,
    /// Deadline of the call that produced the body, and the timeout it was
    /// derived from.
    deadline: Option<(Instant, Duration)>,
}

impl<S: AsyncRead + Unpin> MessageBody<S> {
    pub(crate) fn new(reader: BufReader<S>, content_length: Option<u64>) -> Self {
        Self {
            reader,
            content_length,
            deadline: None,
        }
    }

    pub(crate) fn with_deadline(mut self, deadline: Instant, timeout: Duration) -> Self {
        self.deadline = Some((deadline, timeout));
        self
    }

    /// The `Content-length` spamd announced for the body, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Read the remaining body, bounded by the call's deadline.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, SpamcError> {
        let mut buf = Vec::new();
        match self.deadline {
            Some((deadline, timeout)) => {
                timeout_at(deadline, self.reader.read_to_end(&mut buf))
                    .await
                    .map_err(|_| SpamcError::Timeout(timeout))??;
            }
            None => {
                self.reader.read_to_end(&mut buf).await?;
            }
        }
        Ok(buf)
    }

    /// [`MessageBody::read_to_end`], decoded lossily as UTF-8.
    pub async fn read_to_string(&mut self) -> Result<String, SpamcError> {
        let bytes = self.read_to_end().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Release the connection.
    pub fn close(self) {
        drop(self.reader);
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for MessageBody<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}
