//! Request head encoding.
//!
//! ```text
//! <COMMAND> SPAMC/<ver>\r\n
//! Content-length: <n>\r\n
//! [<Header>: <value>\r\n]*
//! \r\n
//! ```
//!
//! The message bytes follow the head; they are streamed by
//! [`frame::writer`](crate::frame::writer) rather than buffered here.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::error::SpamcError;
use crate::header::{CONTENT_LENGTH, Headers};
use crate::message::CLIENT_PROTOCOL_VERSION;

/// Everything in a request frame except the message bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub command: String,
    /// Exact number of message bytes that follow the head.
    pub content_length: u64,
    pub headers: Headers,
}

#[derive(Debug, Default)]
pub struct RequestCodec;

impl Encoder<RequestHead> for RequestCodec {
    type Error = SpamcError;

    fn encode(&mut self, item: RequestHead, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let command = item.command.trim();
        if command.is_empty() {
            return Err(SpamcError::EmptyCommand);
        }

        put_line(dst, &format!("{command} SPAMC/{CLIENT_PROTOCOL_VERSION}"));
        put_line(dst, &format!("{CONTENT_LENGTH}: {}", item.content_length));
        for (key, value) in item.headers.iter().filter(|(k, _)| *k != CONTENT_LENGTH) {
            put_line(dst, &format!("{key}: {value}"));
        }
        put_line(dst, "");
        Ok(())
    }
}

fn put_line(dst: &mut BytesMut, line: &str) {
    dst.reserve(line.len() + 2);
    dst.put_slice(line.as_bytes());
    dst.put_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(head: RequestHead) -> Result<String, SpamcError> {
        let mut dst = BytesMut::new();
        RequestCodec.encode(head, &mut dst)?;
        Ok(String::from_utf8(dst.to_vec()).unwrap())
    }

    #[test]
    fn encodes_head_in_key_order() {
        let head = RequestHead {
            command: "TELL".into(),
            content_length: 42,
            headers: Headers::new()
                .with("user", "bob")
                .with("set", "local")
                .with("message-class", "spam"),
        };
        assert_eq!(
            encode(head).unwrap(),
            "TELL SPAMC/1.5\r\n\
             Content-length: 42\r\n\
             Message-class: spam\r\n\
             Set: local\r\n\
             User: bob\r\n\
             \r\n"
        );
    }

    #[test]
    fn content_length_is_emitted_once() {
        let head = RequestHead {
            command: "CHECK".into(),
            content_length: 9,
            headers: Headers::new().with("content-length", "1000"),
        };
        assert_eq!(
            encode(head).unwrap(),
            "CHECK SPAMC/1.5\r\nContent-length: 9\r\n\r\n"
        );
    }

    #[test]
    fn rejects_empty_command() {
        for command in ["", "   "] {
            let head = RequestHead {
                command: command.into(),
                content_length: 0,
                headers: Headers::new(),
            };
            assert!(matches!(encode(head), Err(SpamcError::EmptyCommand)));
        }
    }
}
