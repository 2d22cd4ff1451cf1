//! Transport: how a call reaches spamd.

pub mod connection;

pub use connection::{
    ConnectionInfo, DEFAULT_PORT, DEFAULT_TIMEOUT, Dialer, StreamDialer, TcpDialer,
};
