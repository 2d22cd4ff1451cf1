//! Request frame writer.
//!
//! Framing is split in two so that every framing error (blank command,
//! unknown message size, bad `Content-length`) surfaces before a connection
//! is even opened: [`PreparedRequest::prepare`] does all the checks and
//! measuring, [`PreparedRequest::write_to`] only moves bytes.

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tracing::debug;

use crate::codec::{RequestCodec, RequestHead};
use crate::error::SpamcError;
use crate::header::{CONTENT_LENGTH, Headers};
use crate::source::{FramedMessage, Message};

/// A fully measured request, ready to be written.
pub struct PreparedRequest {
    command: String,
    head: BytesMut,
    message: FramedMessage,
}

impl PreparedRequest {
    pub async fn prepare(
        command: &str,
        headers: &Headers,
        message: Message,
    ) -> Result<Self, SpamcError> {
        if command.trim().is_empty() {
            return Err(SpamcError::EmptyCommand);
        }

        let declared = headers
            .get(CONTENT_LENGTH)
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map_err(|_| SpamcError::InvalidContentLength(raw.to_string()))
            })
            .transpose()?;

        let message = message.frame(declared).await?;

        let mut head = BytesMut::new();
        RequestCodec.encode(
            RequestHead {
                command: command.to_string(),
                content_length: message.content_length,
                headers: headers.clone(),
            },
            &mut head,
        )?;

        Ok(Self {
            command: command.trim().to_string(),
            head,
            message,
        })
    }

    /// Number of message bytes announced in `Content-length`.
    pub fn content_length(&self) -> u64 {
        self.message.content_length
    }

    /// Write the frame, then shut down the write side so spamd sees the end
    /// of the request while the read side stays open for the response.
    ///
    /// Returns the total number of bytes written.
    pub async fn write_to<W>(self, writer: &mut W) -> Result<u64, SpamcError>
    where
        W: AsyncWrite + Unpin,
    {
        let content_length = self.message.content_length;
        writer.write_all(&self.head).await?;
        let body = self.message.write_to(writer).await?;
        writer.flush().await?;
        writer.shutdown().await?;

        debug!(
            command = %self.command,
            content_length,
            head_bytes = self.head.len(),
            "request sent"
        );
        Ok(self.head.len() as u64 + body)
    }
}

/// Prepare and write a request in one go.
pub async fn write_request<W>(
    writer: &mut W,
    command: &str,
    headers: &Headers,
    message: Message,
) -> Result<u64, SpamcError>
where
    W: AsyncWrite + Unpin,
{
    PreparedRequest::prepare(command, headers, message)
        .await?
        .write_to(writer)
        .await
}
