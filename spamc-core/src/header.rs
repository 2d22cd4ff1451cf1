//! Request/response header collection.
//!
//! Keys are normalised on every write and lookup. Only the first character
//! is case-folded (`user` and `User` match, `USER` does not), except for
//! `Content-length` and `Message-class`, which match in any case.
//! Iteration is ordered by key, which keeps encoded frames reproducible.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::SpamcError;

// ── Header names ─────────────────────────────────────────────────

pub const CONTENT_LENGTH: &str = "Content-length";
pub const MESSAGE_CLASS: &str = "Message-class";
pub const REMOVE: &str = "Remove";
pub const SET: &str = "Set";
pub const SPAM: &str = "Spam";
pub const USER: &str = "User";
pub const DID_SET: &str = "DidSet";
pub const DID_REMOVE: &str = "DidRemove";

/// Allowed values of `Message-class`.
const MESSAGE_CLASSES: [&str; 3] = ["", "spam", "ham"];

/// Allowed items of the comma-separated `Set` / `Remove` lists.
const DATABASES: [&str; 2] = ["local", "remote"];

/// Canonical spelling of a header key.
///
/// The first character is upper-cased and the rest left alone, except for
/// `Content-length` and `Message-class`, whose second word spamd expects in
/// lower case.
pub fn normalize_key(key: &str) -> String {
    let key = key.trim();
    if key.eq_ignore_ascii_case(CONTENT_LENGTH) {
        return CONTENT_LENGTH.to_string();
    }
    if key.eq_ignore_ascii_case(MESSAGE_CLASS) {
        return MESSAGE_CLASS.to_string();
    }

    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Check `value` against the closed vocabulary of `key`, if it has one.
fn validate(key: &str, value: &str) -> Result<(), SpamcError> {
    let valid = match key {
        MESSAGE_CLASS => MESSAGE_CLASSES.contains(&value),
        SET | REMOVE => value
            .split(',')
            .map(str::trim)
            .all(|item| item.is_empty() || DATABASES.contains(&item)),
        _ => true,
    };
    if valid {
        Ok(())
    } else {
        Err(SpamcError::InvalidHeader {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

// ── Headers ──────────────────────────────────────────────────────

/// Ordered, case-normalised header collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: BTreeMap<String, Vec<String>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing any previous values.
    ///
    /// # Panics
    ///
    /// Panics if `key` is `Message-class`, `Set` or `Remove` and `value` is
    /// outside that header's vocabulary. Passing such a value is a bug in
    /// the caller and is caught before anything is sent; use
    /// [`Headers::try_set`] for values that come from user input.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        if let Err(e) = self.try_set(key, value) {
            panic!("{e}");
        }
        self
    }

    /// Fallible form of [`Headers::set`].
    pub fn try_set(&mut self, key: &str, value: impl Into<String>) -> Result<&mut Self, SpamcError> {
        let key = normalize_key(key);
        let value = value.into();
        validate(&key, &value)?;
        self.entries.insert(key, vec![value]);
        Ok(self)
    }

    /// Builder form of [`Headers::set`].
    ///
    /// # Panics
    ///
    /// Same conditions as [`Headers::set`].
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Append a value without validation; used for headers read off the wire.
    pub(crate) fn append(&mut self, key: &str, value: impl Into<String>) {
        self.entries
            .entry(normalize_key(key))
            .or_default()
            .push(value.into());
    }

    /// Extend the most recently appended value of `key` (folded header line).
    pub(crate) fn extend_last(&mut self, key: &str, more: &str) {
        if let Some(last) = self
            .entries
            .get_mut(&normalize_key(key))
            .and_then(|values| values.last_mut())
        {
            last.push(' ');
            last.push_str(more);
        }
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&normalize_key(key))
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values stored under `key`.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries
            .get(&normalize_key(key))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&normalize_key(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.entries.remove(&normalize_key(key))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of key/value pairs, counting repeated keys once per value.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Key/value pairs in lexicographic key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    /// Comma-separated list stored under `key`, empty when absent.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in self.iter() {
            write!(f, "{k}: {v}\r\n")?;
        }
        Ok(())
    }
}
