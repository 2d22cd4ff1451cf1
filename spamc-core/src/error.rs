//! Domain-specific error types for the spamd protocol.
//!
//! All fallible operations return `Result<T, SpamcError>`. The only panic in
//! the crate is [`Headers::set`](crate::Headers::set) on a caller bug; every
//! condition caused by the network or the daemon is typed and recoverable.

use std::time::Duration;
use thiserror::Error;

// ── Return codes ─────────────────────────────────────────────────

/// The daemon's non-zero return codes, borrowed from `sysexits.h`.
///
/// Each entry is `(code, symbolic name, meaning)`.
pub const RETURN_CODES: [(u32, &str, &str); 16] = [
    (64, "EX_USAGE", "Command line usage error"),
    (65, "EX_DATAERR", "Data format error"),
    (66, "EX_NOINPUT", "Cannot open input"),
    (67, "EX_NOUSER", "Addressee unknown"),
    (68, "EX_NOHOST", "Host name unknown"),
    (69, "EX_UNAVAILABLE", "Service unavailable"),
    (70, "EX_SOFTWARE", "Internal software error"),
    (71, "EX_OSERR", "System error"),
    (72, "EX_OSFILE", "Critical OS file missing"),
    (73, "EX_CANTCREAT", "Can't create (user) output file"),
    (74, "EX_IOERR", "Input/output error"),
    (75, "EX_TEMPFAIL", "Temp failure; user is invited to retry"),
    (76, "EX_PROTOCOL", "Remote error in protocol"),
    (77, "EX_NOPERM", "Permission denied"),
    (78, "EX_CONFIG", "Configuration error"),
    (79, "EX_TIMEOUT", "Read timeout"),
];

/// Return code signalling success.
pub const EX_OK: u32 = 0;

/// Return code the daemon uses when `TELL` is disabled.
pub const EX_UNAVAILABLE: u32 = 69;

/// Look up the human-readable meaning of a daemon return code.
pub fn code_meaning(code: u32) -> Option<&'static str> {
    RETURN_CODES
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, _, meaning)| *meaning)
}

// ── SpamcError ───────────────────────────────────────────────────

/// The canonical error type for the spamd client.
#[derive(Debug, Error)]
pub enum SpamcError {
    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// Dialing the daemon failed.
    #[error("could not connect to spamd at {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The call did not finish before its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the call while connecting.
    #[error("call was cancelled")]
    Cancelled,

    // ── Framing Errors ───────────────────────────────────────────
    /// The command name was blank.
    #[error("empty command")]
    EmptyCommand,

    /// The message length was not supplied and cannot be derived.
    #[error("could not determine size of message")]
    UnknownLength,

    /// A caller-supplied `Content-length` header is not a byte count.
    #[error("invalid Content-length header: {0:?}")]
    InvalidContentLength(String),

    // ── Protocol Errors ──────────────────────────────────────────
    /// The daemon closed the connection before sending a status line.
    #[error("connection closed by spamd")]
    ConnectionClosed,

    /// The status line is too short to hold a version and code.
    #[error("short response: {0:?}")]
    ShortResponse(String),

    /// The status line does not start with `SPAMD/`.
    #[error("unrecognised response: {0:?}")]
    UnrecognisedResponse(String),

    /// The daemon spoke a protocol version we do not understand.
    #[error("unknown server protocol version {version}; expected {expected}")]
    UnsupportedVersion { version: String, expected: String },

    /// The return code in the status line is not a number.
    #[error("could not parse return code: {0:?}")]
    InvalidReturnCode(String),

    /// A response header line has no `:` separator.
    #[error("malformed response header line: {0:?}")]
    MalformedHeader(String),

    /// The response body did not have the shape the call expects.
    #[error("unexpected {0} response body")]
    UnexpectedBody(&'static str),

    // ── Daemon Errors ────────────────────────────────────────────
    /// The daemon answered with a non-zero return code.
    #[error("spamd returned code {code}: {}: {text}", .meaning.unwrap_or("unknown"))]
    Daemon {
        code: u32,
        meaning: Option<&'static str>,
        text: String,
    },

    /// `TELL` was refused because the daemon runs without `--allow-tell`.
    #[error("TELL commands are not enabled, set the --allow-tell switch")]
    TrainingDisabled,

    // ── Parse Errors ─────────────────────────────────────────────
    /// The `Spam` verdict header is missing or malformed.
    #[error("spam header: {0}")]
    Verdict(#[from] VerdictError),

    /// A report table line could not be placed.
    #[error("malformed report table line: {0:?}")]
    ReportRow(String),

    // ── Usage Errors ─────────────────────────────────────────────
    /// A command string could not be parsed.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A learn type string could not be parsed.
    #[error("unknown learn type: {0}")]
    UnknownLearnType(String),

    /// An address that is not `host[:port]`.
    #[error("invalid spamd address: {0:?}")]
    InvalidAddress(String),

    /// A value outside the header's closed vocabulary.
    #[error("invalid value {value:?} for header {key}")]
    InvalidHeader { key: String, value: String },
}

impl SpamcError {
    /// The daemon return code carried by this error, if any.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Daemon { code, .. } => Some(*code),
            Self::TrainingDisabled => Some(EX_UNAVAILABLE),
            _ => None,
        }
    }

    /// Build a daemon error, resolving the code against [`RETURN_CODES`].
    pub(crate) fn daemon(code: u32, text: impl Into<String>) -> Self {
        Self::Daemon {
            code,
            meaning: code_meaning(code),
            text: text.into(),
        }
    }
}

// ── VerdictError ─────────────────────────────────────────────────

/// Failures while reading `Spam: <bool> ; <score> / <base>`.
#[derive(Debug, Error, PartialEq)]
pub enum VerdictError {
    #[error("header missing")]
    HeaderMissing,

    #[error("header empty")]
    HeaderEmpty,

    #[error("unexpected data: {0:?}")]
    UnexpectedData(String),

    #[error("unknown spam status: {0:?}")]
    UnknownSpamStatus(String),

    #[error("could not parse score {0:?}")]
    InvalidScore(String),
}
