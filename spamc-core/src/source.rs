//! Outbound message sources and payload normalisation.
//!
//! Before a message is sent its exact length must be known, because the
//! `Content-length` header precedes the bytes. Two fix-ups are applied on
//! the way out:
//!
//! - when the message opens with a MIME header block that runs straight into
//!   a non-header line, a blank line is inserted to separate the two, ending
//!   in whatever terminator the header lines use;
//! - a non-empty message that does not end in a line terminator gets `\r\n`
//!   appended.
//!
//! Both adjust the declared length so it always matches the bytes written.

use std::fmt;
use std::io::SeekFrom;
use std::path::Path;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::SpamcError;

/// How much of the message is inspected for a header block.
pub const SCAN_WINDOW: usize = 64 * 1024;

const CRLF: &[u8] = b"\r\n";

// ── Message ──────────────────────────────────────────────────────

/// A message to submit to spamd.
pub enum Message {
    /// Fully buffered message.
    Bytes(Bytes),
    /// A seekable file. It is always sent from the start.
    File(tokio::fs::File),
    /// Any other byte stream. Its length has to be supplied through a
    /// `Content-length` request header.
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl Message {
    pub fn empty() -> Self {
        Message::Bytes(Bytes::new())
    }

    /// Open a file as the message source.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SpamcError> {
        Ok(Message::File(tokio::fs::File::open(path).await?))
    }

    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Message::Stream(Box::new(reader))
    }

    /// Resolve the length, scan the header block and decide on the trailing
    /// terminator. `declared` is the caller's `Content-length`, consulted
    /// only for [`Message::Stream`].
    pub(crate) async fn frame(self, declared: Option<u64>) -> Result<FramedMessage, SpamcError> {
        let (prefix, rest, source_len, complete, terminated) = match self {
            Message::Bytes(bytes) => {
                let terminated = bytes.last().is_none_or(|b| *b == b'\n');
                let len = bytes.len() as u64;
                let rest: Box<dyn AsyncRead + Send + Unpin> = Box::new(tokio::io::empty());
                (bytes, rest, len, true, terminated)
            }
            Message::File(mut file) => {
                let len = file.seek(SeekFrom::End(0)).await?;
                let terminated = if len == 0 {
                    true
                } else {
                    file.seek(SeekFrom::End(-1)).await?;
                    file.read_u8().await? == b'\n'
                };
                file.seek(SeekFrom::Start(0)).await?;
                let (prefix, rest) = read_window(file, len).await?;
                (prefix, rest, len, len as usize <= SCAN_WINDOW, terminated)
            }
            Message::Stream(stream) => {
                let len = declared.ok_or(SpamcError::UnknownLength)?;
                let (prefix, rest) = read_window(stream, len).await?;
                let complete = prefix.len() as u64 == len;
                // Past the scan window the last byte cannot be inspected
                // without buffering the whole stream; send it as-is.
                let terminated = !complete || prefix.last().is_none_or(|b| *b == b'\n');
                (prefix, rest, len, complete, terminated)
            }
        };

        let scan = scan_header_block(&prefix, complete);
        debug!(
            header_lines = scan.header_lines,
            separator_at = ?scan.separator_at,
            "scanned message header block"
        );

        let rest_len = source_len - prefix.len() as u64;
        let prefix = match scan.separator_at {
            Some(at) => {
                // Match the terminator of the header line before it.
                let separator: &[u8] = if prefix[..at].ends_with(CRLF) { CRLF } else { b"\n" };
                let mut buf = BytesMut::with_capacity(prefix.len() + separator.len());
                buf.extend_from_slice(&prefix[..at]);
                buf.extend_from_slice(separator);
                buf.extend_from_slice(&prefix[at..]);
                buf.freeze()
            }
            None => prefix,
        };
        let suffix: &'static [u8] = if terminated { b"" } else { CRLF };

        Ok(FramedMessage {
            content_length: prefix.len() as u64 + rest_len + suffix.len() as u64,
            prefix,
            rest,
            rest_len,
            suffix,
        })
    }
}

/// Read the first `min(len, SCAN_WINDOW)` bytes; the remainder is limited to
/// exactly `len` bytes in total.
async fn read_window<R>(
    mut reader: R,
    len: u64,
) -> Result<(Bytes, Box<dyn AsyncRead + Send + Unpin>), SpamcError>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let window = len.min(SCAN_WINDOW as u64) as usize;
    let mut prefix = vec![0u8; window];
    reader.read_exact(&mut prefix).await?;
    let rest = reader.take(len - window as u64);
    Ok((Bytes::from(prefix), Box::new(rest)))
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Message::File(file) => f.debug_tuple("File").field(file).finish(),
            Message::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for Message {
    fn from(b: Bytes) -> Self {
        Message::Bytes(b)
    }
}

impl From<Vec<u8>> for Message {
    fn from(v: Vec<u8>) -> Self {
        Message::Bytes(Bytes::from(v))
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Bytes(Bytes::from(s))
    }
}

impl From<&'static str> for Message {
    fn from(s: &'static str) -> Self {
        Message::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<tokio::fs::File> for Message {
    fn from(file: tokio::fs::File) -> Self {
        Message::File(file)
    }
}

// ── FramedMessage ────────────────────────────────────────────────

/// A message ready to go on the wire: `prefix`, then `rest_len` bytes of
/// `rest`, then `suffix`.
pub(crate) struct FramedMessage {
    pub(crate) content_length: u64,
    prefix: Bytes,
    rest: Box<dyn AsyncRead + Send + Unpin>,
    rest_len: u64,
    suffix: &'static [u8],
}

impl FramedMessage {
    /// Write the payload, returning the number of bytes sent.
    pub(crate) async fn write_to<W>(mut self, writer: &mut W) -> Result<u64, SpamcError>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.prefix).await?;
        let copied = tokio::io::copy(&mut self.rest, writer).await?;
        if copied != self.rest_len {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("message ended after {copied} of {} bytes", self.rest_len),
            )
            .into());
        }
        writer.write_all(self.suffix).await?;
        Ok(self.prefix.len() as u64 + copied + self.suffix.len() as u64)
    }
}

// ── Header block scan ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HeaderScan {
    /// Well-formed header lines found at the top of the message.
    pub(crate) header_lines: usize,
    /// Offset at which a blank separator line must be inserted.
    pub(crate) separator_at: Option<usize>,
}

/// Find where the leading header block ends.
///
/// `complete` says whether `data` holds the whole message; if not, a
/// trailing partial line is left undecided.
pub(crate) fn scan_header_block(data: &[u8], complete: bool) -> HeaderScan {
    let mut header_lines = 0;
    let mut pos = 0;

    while pos < data.len() {
        let (line, next) = match data[pos..].iter().position(|b| *b == b'\n') {
            Some(i) => (&data[pos..pos + i], pos + i + 1),
            None if complete => (&data[pos..], data.len()),
            None => break,
        };
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if line.is_empty() {
            break;
        }
        let folded = header_lines > 0 && matches!(line[0], b' ' | b'\t') && line.is_ascii();
        if folded || is_header_line(line) {
            header_lines += 1;
            pos = next;
            continue;
        }

        return HeaderScan {
            header_lines,
            separator_at: (header_lines > 0).then_some(pos),
        };
    }

    HeaderScan {
        header_lines,
        separator_at: None,
    }
}

/// `Name: value` with a printable ASCII name and an ASCII value.
fn is_header_line(line: &[u8]) -> bool {
    if !line.is_ascii() {
        return false;
    }
    match line.iter().position(|b| *b == b':') {
        Some(colon) if colon > 0 => line[..colon].iter().all(|b| b.is_ascii_graphic()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    async fn framed(message: Message, declared: Option<u64>) -> (u64, Vec<u8>) {
        let framed = message.frame(declared).await.unwrap();
        let length = framed.content_length;
        let mut out = Vec::new();
        let sent = framed.write_to(&mut out).await.unwrap();
        assert_eq!(sent, out.len() as u64);
        (length, out)
    }

    #[test]
    fn scan_terminated_block() {
        let msg = b"Subject: hi\r\nFrom: a@b\r\n\r\nbody\r\n";
        assert_eq!(
            scan_header_block(msg, true),
            HeaderScan {
                header_lines: 2,
                separator_at: None
            }
        );
    }

    #[test]
    fn scan_folded_header() {
        let msg = b"Subject: a long\r\n\tsubject\r\n\r\nbody";
        assert_eq!(scan_header_block(msg, true).header_lines, 2);
        assert_eq!(scan_header_block(msg, true).separator_at, None);
    }

    #[test]
    fn scan_missing_separator() {
        let msg = b"Subject: hi\r\nthis is the body\r\n";
        assert_eq!(
            scan_header_block(msg, true),
            HeaderScan {
                header_lines: 1,
                separator_at: Some(13)
            }
        );
    }

    #[test]
    fn scan_non_ascii_line_is_body() {
        let msg = "Subject: hi\r\nX-Note: caf\u{e9}\r\n\r\n".as_bytes();
        assert_eq!(scan_header_block(msg, true).separator_at, Some(13));
    }

    #[test]
    fn scan_no_headers() {
        assert_eq!(scan_header_block(b"woot", true).header_lines, 0);
        assert_eq!(scan_header_block(b"woot", true).separator_at, None);
        assert_eq!(scan_header_block(b" leading space: x\r\n", true).header_lines, 0);
        assert_eq!(scan_header_block(b"", true).separator_at, None);
    }

    #[test]
    fn scan_partial_window_is_undecided() {
        let msg = b"Subject: hi\r\nFrom: a@b";
        assert_eq!(scan_header_block(msg, false).header_lines, 1);
        assert_eq!(scan_header_block(msg, false).separator_at, None);
    }

    #[tokio::test]
    async fn appends_missing_terminator() {
        let (len, out) = framed(Message::from("Message"), None).await;
        assert_eq!(out, b"Message\r\n");
        assert_eq!(len, 9);
    }

    #[tokio::test]
    async fn keeps_existing_terminator() {
        let (len, out) = framed(Message::from("Subject: x\r\n\r\nbody\r\n"), None).await;
        assert_eq!(out, b"Subject: x\r\n\r\nbody\r\n");
        assert_eq!(len, 20);
    }

    #[tokio::test]
    async fn empty_message_stays_empty() {
        let (len, out) = framed(Message::empty(), None).await;
        assert!(out.is_empty());
        assert_eq!(len, 0);
    }

    #[tokio::test]
    async fn inserts_separator_and_terminator() {
        let (len, out) = framed(Message::from("Subject: woot\r\nwoot"), None).await;
        assert_eq!(out, b"Subject: woot\r\n\r\nwoot\r\n");
        assert_eq!(len, out.len() as u64);
    }

    #[tokio::test]
    async fn separator_follows_lf_headers() {
        let (len, out) = framed(Message::from("Subject: x\nbody\n"), None).await;
        assert_eq!(out, b"Subject: x\n\nbody\n");
        assert_eq!(len, 17);
    }

    #[tokio::test]
    async fn stream_needs_declared_length() {
        let err = Message::from_reader(&b"abc"[..]).frame(None).await;
        assert!(matches!(err, Err(SpamcError::UnknownLength)));

        let (len, out) = framed(Message::from_reader(&b"abc"[..]), Some(3)).await;
        assert_eq!(out, b"abc\r\n");
        assert_eq!(len, 5);
    }

    #[tokio::test]
    async fn stream_shorter_than_declared_fails() {
        let err = Message::from_reader(&b"abc"[..]).frame(Some(10)).await;
        assert!(matches!(err, Err(SpamcError::Connection(_))));
    }

    #[tokio::test]
    async fn long_stream_is_sent_verbatim() {
        let data = vec![b'x'; SCAN_WINDOW + 10];
        let (len, out) = framed(Message::from_reader(std::io::Cursor::new(data.clone())), Some(data.len() as u64)).await;
        assert_eq!(out, data);
        assert_eq!(len, data.len() as u64);
    }

    proptest! {
        #[test]
        fn framing_terminates_once_and_counts_exactly(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let (len, out) = tokio_test::block_on(framed(Message::from(data.clone()), None));
            prop_assert_eq!(len, out.len() as u64);
            match data.last() {
                None => prop_assert!(out.is_empty()),
                Some(b'\n') => prop_assert!(out.ends_with(&data[data.len() - 1..])),
                Some(&last) => {
                    prop_assert!(out.ends_with(CRLF));
                    prop_assert_eq!(out[out.len() - 3], last);
                }
            }
        }
    }

    #[tokio::test]
    async fn file_is_measured_and_terminated() {
        let path = std::env::temp_dir().join(format!("spamc-source-{}.eml", std::process::id()));
        tokio::fs::write(&path, b"Subject: file\r\n\r\nno newline").await.unwrap();

        let (len, out) = framed(Message::open(&path).await.unwrap(), Some(1)).await;
        assert_eq!(out, b"Subject: file\r\n\r\nno newline\r\n");
        assert_eq!(len, out.len() as u64);

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
