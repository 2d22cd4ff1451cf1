//! # spamc-cli
//!
//! Reads a message from a file or stdin, runs one command against spamd and
//! prints the result. Settings come from a TOML file, overridden by flags.

pub mod config;
