//! Response frame reader.
//!
//! A response is read in three steps: the status line, the header block up
//! to the first blank line, then a body whose shape is fixed by the command
//! that was sent (see [`Command::body_shape`]).

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, trace, warn};

use super::{
    MessageBody, ProcessResult, ReportResult, Response, ResponseBody, StatusLine, SymbolsResult,
};
use crate::error::{EX_OK, SpamcError};
use crate::header::{CONTENT_LENGTH, Headers};
use crate::message::{BodyShape, CLIENT_PROTOCOL_VERSION, Command, SERVER_PROTOCOL_VERSIONS};
use crate::protocol::{Report, TellResult, Verdict};

/// `SPAMD/1.x 0 X` is the shortest status line that can carry a code.
const MIN_STATUS_LEN: usize = 11;

const STATUS_PREFIX: &str = "SPAMD/";

/// Parse `SPAMD/<version> <code> <text>`.
///
/// `echoes_client_version` selects the version rule: `PING` replies carry
/// the client's version, everything else one of the server versions. A
/// non-zero code is returned as [`SpamcError::Daemon`].
pub fn parse_status_line(
    line: &str,
    echoes_client_version: bool,
) -> Result<StatusLine, SpamcError> {
    let line = line.trim_end_matches(['\r', '\n']);
    trace!(line, "status line");

    if line.len() < MIN_STATUS_LEN {
        return Err(SpamcError::ShortResponse(line.to_string()));
    }
    let rest = match line.get(..STATUS_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(STATUS_PREFIX) => &line[STATUS_PREFIX.len()..],
        _ => return Err(SpamcError::UnrecognisedResponse(line.to_string())),
    };

    let (version, rest) = rest.split_once(' ').unwrap_or((rest, ""));
    let supported = if echoes_client_version {
        version == CLIENT_PROTOCOL_VERSION
    } else {
        SERVER_PROTOCOL_VERSIONS.contains(&version)
    };
    if !supported {
        let expected = if echoes_client_version {
            CLIENT_PROTOCOL_VERSION.to_string()
        } else {
            SERVER_PROTOCOL_VERSIONS.join(" or ")
        };
        return Err(SpamcError::UnsupportedVersion {
            version: version.to_string(),
            expected,
        });
    }

    let rest = rest.trim_start();
    let (code, message) = rest.split_once(' ').unwrap_or((rest, ""));
    let code: u32 = code
        .parse()
        .map_err(|_| SpamcError::InvalidReturnCode(code.to_string()))?;
    let message = message.trim();

    if code != EX_OK {
        warn!(code, message, "spamd returned an error code");
        return Err(SpamcError::daemon(code, message));
    }

    Ok(StatusLine {
        version: version.to_string(),
        code,
        message: message.to_string(),
    })
}

/// Parse the single line of a `SYMBOLS` body.
pub fn parse_symbols(line: &str) -> Vec<String> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }
    line.split(',').map(|s| s.trim().to_string()).collect()
}

/// Read one line, without its terminator. `None` at end of stream.
async fn read_line<R>(reader: &mut R) -> Result<Option<String>, SpamcError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(&buf);
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

pub async fn read_status_line<R>(
    reader: &mut R,
    echoes_client_version: bool,
) -> Result<StatusLine, SpamcError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader)
        .await?
        .ok_or(SpamcError::ConnectionClosed)?;
    parse_status_line(&line, echoes_client_version)
}

/// Read header lines up to a blank line or the end of the stream.
///
/// Lines starting with whitespace continue the previous header.
pub async fn read_headers<R>(reader: &mut R) -> Result<Headers, SpamcError>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = Headers::new();
    let mut last_key: Option<String> = None;

    while let Some(line) = read_line(reader).await? {
        if line.is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some(key) = &last_key {
                headers.extend_last(key, line.trim());
                continue;
            }
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| SpamcError::MalformedHeader(line.clone()))?;
        let key = key.trim();
        headers.append(key, value.trim());
        last_key = Some(key.to_string());
    }

    Ok(headers)
}

/// Read a complete response to `command`.
///
/// `SKIP` reads nothing and yields [`StatusLine::skipped`]. For `PROCESS`
/// and `HEADERS` the reader is handed over to the returned
/// [`MessageBody`], which the caller must close.
pub async fn read_response<S>(
    mut reader: BufReader<S>,
    command: Command,
) -> Result<Response<S>, SpamcError>
where
    S: AsyncRead + Unpin,
{
    if !command.expects_response() {
        return Ok(Response {
            status: StatusLine::skipped(),
            headers: Headers::new(),
            body: ResponseBody::None,
        });
    }

    let status = read_status_line(&mut reader, command.echoes_client_version()).await?;
    if command.body_shape() == BodyShape::None {
        debug!(%command, version = %status.version, "status received");
        return Ok(Response {
            status,
            headers: Headers::new(),
            body: ResponseBody::None,
        });
    }

    let headers = read_headers(&mut reader).await?;
    debug!(
        %command,
        version = %status.version,
        headers = headers.len(),
        "response received"
    );

    let body = match command.body_shape() {
        BodyShape::None => ResponseBody::None,
        BodyShape::Verdict => ResponseBody::Verdict(Verdict::from_headers(&headers)?),
        BodyShape::Symbols => {
            let verdict = Verdict::from_headers(&headers)?;
            let line = read_line(&mut reader).await?.unwrap_or_default();
            ResponseBody::Symbols(SymbolsResult {
                verdict,
                symbols: parse_symbols(&line),
            })
        }
        BodyShape::Report => {
            let verdict = Verdict::from_headers(&headers)?;
            let report = Report::read_from(&mut reader).await?;
            ResponseBody::Report(ReportResult { verdict, report })
        }
        BodyShape::Message => {
            let verdict = Verdict::from_headers(&headers)?;
            let content_length = headers
                .get(CONTENT_LENGTH)
                .and_then(|raw| raw.trim().parse().ok());
            ResponseBody::Message(ProcessResult {
                verdict,
                body: MessageBody::new(reader, content_length),
            })
        }
        BodyShape::Tell => ResponseBody::Tell(TellResult::from_headers(&headers)),
    };

    Ok(Response {
        status,
        headers,
        body,
    })
}
