//! # spamc-core
//!
//! Client-side protocol engine for the spamd content-classification daemon.
//!
//! This crate contains:
//! - **Headers**: `Headers`, a case-normalised, validated header collection
//! - **Commands**: `Command`, `BodyShape`, `LearnType`
//! - **Payloads**: `Verdict`, `Report`, `TellResult` parsed out of responses
//! - **Codec**: `RequestCodec`, the request head encoder for `tokio_util`
//! - **Frames**: request writer with message normalisation, response reader
//!   dispatching on the command's body shape
//! - **Network**: the `Dialer` seam with TCP and pre-opened stream dialers
//! - **Client**: `Client`, one call per operation with a single deadline
//! - **Error**: `SpamcError`, a typed `thiserror`-based error hierarchy

pub mod client;
pub mod codec;
pub mod error;
pub mod frame;
pub mod header;
pub mod message;
pub mod network;
pub mod protocol;
pub mod source;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::Client;
pub use codec::{RequestCodec, RequestHead};
pub use error::{RETURN_CODES, SpamcError, VerdictError, code_meaning};
pub use frame::{
    MessageBody, PreparedRequest, ProcessResult, ReportResult, Response, ResponseBody,
    StatusLine, SymbolsResult,
};
pub use header::Headers;
pub use message::{BodyShape, CLIENT_PROTOCOL_VERSION, Command, LearnType};
pub use network::{ConnectionInfo, Dialer, StreamDialer, TcpDialer};
pub use protocol::{Report, ReportRow, TellResult, Verdict};
pub use source::Message;
