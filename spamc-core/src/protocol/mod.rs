//! Typed payloads carried in spamd responses.
//!
//! Each sub-module parses one response shape out of the headers or body
//! read by [`frame::reader`](crate::frame::reader).

pub mod report;
pub mod tell;
pub mod verdict;

pub use report::{CONTINUATION_INDENT, Report, ReportRow};
pub use tell::TellResult;
pub use verdict::Verdict;
