//! `TELL` results.
//!
//! spamd reports what it did through two response headers:
//!
//! ```text
//! DidSet: local,remote
//! DidRemove: local
//! ```
//!
//! Either may be absent, which means nothing was done for that action.

use crate::header::{DID_REMOVE, DID_SET, Headers};

/// Databases a `TELL` request updated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TellResult {
    pub did_set: Vec<String>,
    pub did_remove: Vec<String>,
}

impl TellResult {
    pub fn from_headers(headers: &Headers) -> Self {
        Self {
            did_set: headers.get_list(DID_SET),
            did_remove: headers.get_list(DID_REMOVE),
        }
    }
}
