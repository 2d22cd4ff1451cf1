//! Protocol command definitions.
//!
//! Command names parse with `FromStr`; unknown names are an error, never a panic.

use std::fmt;
use std::str::FromStr;

use crate::error::SpamcError;
use crate::header::{Headers, MESSAGE_CLASS, REMOVE, SET};

/// Version this client announces in `<COMMAND> SPAMC/<ver>`.
pub const CLIENT_PROTOCOL_VERSION: &str = "1.5";

/// Versions spamd uses in its status line for everything except `PING`.
pub const SERVER_PROTOCOL_VERSIONS: [&str; 2] = ["1.0", "1.1"];

// ── BodyShape ────────────────────────────────────────────────────

/// What follows the header block of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyShape {
    /// Nothing past the status line.
    None,
    /// The `Spam` header only.
    Verdict,
    /// `Spam` header plus one comma-separated line of rule names.
    Symbols,
    /// `Spam` header plus a free-text report.
    Report,
    /// `Spam` header plus the rewritten message, streamed.
    Message,
    /// `DidSet` / `DidRemove` headers.
    Tell,
}

// ── Command ──────────────────────────────────────────────────────

/// All commands understood by spamd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Is the message spam? Verdict and score only.
    Check,
    /// Verdict plus the names of the rules that hit.
    Symbols,
    /// Verdict plus the textual report.
    Report,
    /// Verdict plus the report, but only when the message is spam.
    ReportIfSpam,
    /// Verdict plus the message rewritten by spamd.
    Process,
    /// Like `Process`, but only the rewritten headers are returned.
    Headers,
    /// Liveness check.
    Ping,
    /// Train or revoke a message.
    Tell,
    /// Client opened a connection then changed its mind.
    Skip,
}

impl Command {
    pub const ALL: [Command; 9] = [
        Command::Check,
        Command::Symbols,
        Command::Report,
        Command::ReportIfSpam,
        Command::Process,
        Command::Headers,
        Command::Ping,
        Command::Tell,
        Command::Skip,
    ];

    /// Name on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Check => "CHECK",
            Command::Symbols => "SYMBOLS",
            Command::Report => "REPORT",
            Command::ReportIfSpam => "REPORT_IFSPAM",
            Command::Process => "PROCESS",
            Command::Headers => "HEADERS",
            Command::Ping => "PING",
            Command::Tell => "TELL",
            Command::Skip => "SKIP",
        }
    }

    /// Shape of the response body spamd sends for this command.
    pub fn body_shape(&self) -> BodyShape {
        match self {
            Command::Check => BodyShape::Verdict,
            Command::Symbols => BodyShape::Symbols,
            Command::Report | Command::ReportIfSpam => BodyShape::Report,
            Command::Process | Command::Headers => BodyShape::Message,
            Command::Tell => BodyShape::Tell,
            Command::Ping | Command::Skip => BodyShape::None,
        }
    }

    /// Returns `true` if spamd answers this command at all.
    pub fn expects_response(&self) -> bool {
        !matches!(self, Command::Skip)
    }

    /// `PING` replies echo the client's version instead of the server's.
    pub fn echoes_client_version(&self) -> bool {
        matches!(self, Command::Ping)
    }
}

impl FromStr for Command {
    type Err = SpamcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Command::ALL
            .into_iter()
            .find(|cmd| cmd.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| SpamcError::UnknownCommand(s.to_string()))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── LearnType ────────────────────────────────────────────────────

/// Convenience training actions layered over `TELL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LearnType {
    /// Learn the message as spam in the local database.
    Spam,
    /// Learn the message as ham in the local database.
    Ham,
    /// Forget whatever was learnt about the message.
    Forget,
}

impl LearnType {
    /// Headers for the `TELL` request performing this action.
    pub fn headers(&self) -> Headers {
        match self {
            LearnType::Spam => Headers::new().with(MESSAGE_CLASS, "spam").with(SET, "local"),
            LearnType::Ham => Headers::new().with(MESSAGE_CLASS, "ham").with(SET, "local"),
            LearnType::Forget => Headers::new().with(REMOVE, "local"),
        }
    }
}

impl FromStr for LearnType {
    type Err = SpamcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SPAM" => Ok(LearnType::Spam),
            "HAM" | "NOTSPAM" | "NOT_SPAM" => Ok(LearnType::Ham),
            "FORGET" => Ok(LearnType::Forget),
            _ => Err(SpamcError::UnknownLearnType(s.to_string())),
        }
    }
}

impl fmt::Display for LearnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LearnType::Spam => write!(f, "SPAM"),
            LearnType::Ham => write!(f, "HAM"),
            LearnType::Forget => write!(f, "FORGET"),
        }
    }
}
