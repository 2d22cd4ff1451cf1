//! Command dispatcher.
//!
//! [`Client`] turns each high-level operation into one request/response
//! exchange over a fresh connection. Every call arms a single deadline
//! (`now + timeout`) that bounds dialing, writing and reading; a
//! [`CancellationToken`] can additionally abort the dial.

use std::time::Duration;

use tokio::io::BufReader;
use tokio::time::{Instant, error::Elapsed, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{EX_UNAVAILABLE, SpamcError};
use crate::frame::{
    PreparedRequest, ProcessResult, ReportResult, Response, ResponseBody, StatusLine,
    SymbolsResult, read_response,
};
use crate::header::{Headers, MESSAGE_CLASS, SET, USER};
use crate::message::{Command, LearnType};
use crate::network::{ConnectionInfo, DEFAULT_TIMEOUT, Dialer, TcpDialer};
use crate::protocol::{TellResult, Verdict};
use crate::source::Message;

/// A spamd client.
///
/// Cheap to share behind a reference: calls take `&self` and keep no state
/// between them.
#[derive(Debug)]
pub struct Client<D = TcpDialer> {
    dialer: D,
    timeout: Duration,
    default_user: Option<String>,
    cancel: Option<CancellationToken>,
}

impl Client<TcpDialer> {
    /// Client talking TCP to `info`, with `timeout` for both the dial and
    /// the whole call.
    pub fn connect_to(info: ConnectionInfo, timeout: Duration) -> Self {
        Self::new(TcpDialer::new(info, timeout)).with_timeout(timeout)
    }
}

impl<D: Dialer> Client<D> {
    pub fn new(dialer: D) -> Self {
        Self {
            dialer,
            timeout: DEFAULT_TIMEOUT,
            default_user: None,
            cancel: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `User` header sent with every request that does not set its own.
    pub fn with_default_user(mut self, user: impl Into<String>) -> Self {
        self.default_user = Some(user.into());
        self
    }

    /// Abort dialing once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `command` with `message` and decode the response.
    ///
    /// The request is framed before a connection is opened, so framing
    /// errors never touch the network. Framing counts against the same
    /// deadline as the exchange itself. A `TELL` answered with code 69 is
    /// reported as [`SpamcError::TrainingDisabled`].
    pub async fn call(
        &self,
        command: Command,
        message: Message,
        headers: &Headers,
    ) -> Result<Response<D::Stream>, SpamcError> {
        let mut headers = headers.clone();
        if let Some(user) = &self.default_user {
            if !headers.contains(USER) {
                headers.append(USER, user.as_str());
            }
        }
        let timeout = self.timeout;
        let deadline = Instant::now() + timeout;
        let elapsed = move |_: Elapsed| SpamcError::Timeout(timeout);

        let request = timeout_at(deadline, PreparedRequest::prepare(command.as_str(), &headers, message))
            .await
            .map_err(elapsed)??;
        let mut stream = timeout_at(deadline, self.connect()).await.map_err(elapsed)??;
        let sent = timeout_at(deadline, request.write_to(&mut stream))
            .await
            .map_err(elapsed)??;
        debug!(%command, sent, "awaiting response");

        let result = timeout_at(deadline, read_response(BufReader::new(stream), command))
            .await
            .map_err(elapsed)?;
        let response = match result {
            Err(e) if command == Command::Tell && e.code() == Some(EX_UNAVAILABLE) => {
                return Err(SpamcError::TrainingDisabled);
            }
            other => other?,
        };

        let body = match response.body {
            ResponseBody::Message(process) => ResponseBody::Message(ProcessResult {
                verdict: process.verdict,
                body: process.body.with_deadline(deadline, timeout),
            }),
            other => other,
        };
        Ok(Response { body, ..response })
    }

    async fn connect(&self) -> Result<D::Stream, SpamcError> {
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(SpamcError::Cancelled),
                stream = self.dialer.dial() => stream,
            },
            None => self.dialer.dial().await,
        }
    }

    // ── Operations ──────────────────────────────────────────────

    /// Liveness check. Succeeds with spamd's `PONG` status line.
    pub async fn ping(&self) -> Result<StatusLine, SpamcError> {
        let response = self
            .call(Command::Ping, Message::empty(), &Headers::new())
            .await?;
        Ok(response.status)
    }

    /// Verdict and score only.
    pub async fn check(
        &self,
        message: impl Into<Message>,
        headers: &Headers,
    ) -> Result<Verdict, SpamcError> {
        match self.call(Command::Check, message.into(), headers).await?.body {
            ResponseBody::Verdict(verdict) => Ok(verdict),
            other => Err(SpamcError::UnexpectedBody(other.kind())),
        }
    }

    /// Verdict plus the names of the rules that matched.
    pub async fn symbols(
        &self,
        message: impl Into<Message>,
        headers: &Headers,
    ) -> Result<SymbolsResult, SpamcError> {
        match self.call(Command::Symbols, message.into(), headers).await?.body {
            ResponseBody::Symbols(result) => Ok(result),
            other => Err(SpamcError::UnexpectedBody(other.kind())),
        }
    }

    pub async fn report(
        &self,
        message: impl Into<Message>,
        headers: &Headers,
    ) -> Result<ReportResult, SpamcError> {
        self.report_with(Command::Report, message.into(), headers).await
    }

    /// Like [`Client::report`], but spamd leaves the report empty for ham.
    pub async fn report_if_spam(
        &self,
        message: impl Into<Message>,
        headers: &Headers,
    ) -> Result<ReportResult, SpamcError> {
        self.report_with(Command::ReportIfSpam, message.into(), headers)
            .await
    }

    /// [`Client::report`] without the rules that scored zero points.
    pub async fn report_ignore_warning(
        &self,
        message: impl Into<Message>,
        headers: &Headers,
    ) -> Result<ReportResult, SpamcError> {
        let result = self.report_with(Command::Report, message.into(), headers).await?;
        Ok(ReportResult {
            verdict: result.verdict,
            report: result.report.without_zero_points(),
        })
    }

    async fn report_with(
        &self,
        command: Command,
        message: Message,
        headers: &Headers,
    ) -> Result<ReportResult, SpamcError> {
        match self.call(command, message, headers).await?.body {
            ResponseBody::Report(result) => Ok(result),
            other => Err(SpamcError::UnexpectedBody(other.kind())),
        }
    }

    /// Verdict plus the full message as rewritten by spamd.
    ///
    /// The returned body keeps the connection open until it is closed.
    pub async fn process(
        &self,
        message: impl Into<Message>,
        headers: &Headers,
    ) -> Result<ProcessResult<D::Stream>, SpamcError> {
        self.process_with(Command::Process, message.into(), headers)
            .await
    }

    /// Like [`Client::process`], but only the rewritten headers come back.
    pub async fn headers(
        &self,
        message: impl Into<Message>,
        headers: &Headers,
    ) -> Result<ProcessResult<D::Stream>, SpamcError> {
        self.process_with(Command::Headers, message.into(), headers)
            .await
    }

    async fn process_with(
        &self,
        command: Command,
        message: Message,
        headers: &Headers,
    ) -> Result<ProcessResult<D::Stream>, SpamcError> {
        match self.call(command, message, headers).await?.body {
            ResponseBody::Message(result) => Ok(result),
            other => Err(SpamcError::UnexpectedBody(other.kind())),
        }
    }

    /// Train or revoke a message. `headers` carries `Message-class`, `Set`
    /// and `Remove`.
    pub async fn tell(
        &self,
        message: impl Into<Message>,
        headers: &Headers,
    ) -> Result<TellResult, SpamcError> {
        match self.call(Command::Tell, message.into(), headers).await?.body {
            ResponseBody::Tell(result) => Ok(result),
            other => Err(SpamcError::UnexpectedBody(other.kind())),
        }
    }

    /// `TELL` with the headers for `learn`, merged over `headers`.
    pub async fn learn(
        &self,
        learn: LearnType,
        message: impl Into<Message>,
        headers: &Headers,
    ) -> Result<TellResult, SpamcError> {
        let mut merged = headers.clone();
        for (key, value) in learn.headers().iter() {
            merged.try_set(key, value)?;
        }
        self.tell(message, &merged).await
    }

    /// Learn the message as spam in both the local and remote databases.
    pub async fn report_spam(
        &self,
        message: impl Into<Message>,
        headers: &Headers,
    ) -> Result<TellResult, SpamcError> {
        let headers = self.classified(headers, "spam")?;
        self.tell(message, &headers).await
    }

    /// Mark a message as a false positive in both databases.
    pub async fn revoke_spam(
        &self,
        message: impl Into<Message>,
        headers: &Headers,
    ) -> Result<TellResult, SpamcError> {
        let headers = self.classified(headers, "ham")?;
        self.tell(message, &headers).await
    }

    fn classified(&self, headers: &Headers, class: &str) -> Result<Headers, SpamcError> {
        let mut headers = headers.clone();
        headers.try_set(MESSAGE_CLASS, class)?;
        headers.try_set(SET, "local, remote")?;
        Ok(headers)
    }

    /// Send `SKIP`. spamd closes the connection without answering.
    pub async fn skip(&self) -> Result<StatusLine, SpamcError> {
        let response = self
            .call(Command::Skip, Message::empty(), &Headers::new())
            .await?;
        Ok(response.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::StreamDialer;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
    use tokio::task::JoinHandle;
    use tokio_test::{assert_err, assert_ok};

    /// Client over an in-memory pipe whose far end reads the whole request,
    /// then answers with `reply`. The task yields the request it saw.
    fn scripted(reply: &'static str) -> (Client<StreamDialer<DuplexStream>>, JoinHandle<String>) {
        let (near, mut far) = duplex(64 * 1024);
        let server = tokio::spawn(async move {
            let mut request = Vec::new();
            far.read_to_end(&mut request).await.unwrap();
            far.write_all(reply.as_bytes()).await.unwrap();
            far.shutdown().await.unwrap();
            String::from_utf8(request).unwrap()
        });
        (Client::new(StreamDialer::new(near)), server)
    }

    #[tokio::test]
    async fn check_sends_frame_and_reads_verdict() {
        let (client, server) = scripted("SPAMD/1.1 0 EX_OK\r\nSpam: True ; 6.5 / 5.0\r\n\r\n");

        let verdict = assert_ok!(client.check("Subject: hi\r\n\r\nbody", &Headers::new()).await);
        assert!(verdict.is_spam);
        assert_eq!(verdict.score, 6.5);
        assert_eq!(verdict.base_score, 5.0);

        assert_eq!(
            server.await.unwrap(),
            "CHECK SPAMC/1.5\r\nContent-length: 21\r\n\r\nSubject: hi\r\n\r\nbody\r\n"
        );
    }

    #[tokio::test]
    async fn default_user_is_added() {
        let (client, server) = scripted("SPAMD/1.1 0 EX_OK\r\nSpam: False ; 0.1 / 5.0\r\n\r\n");
        let client = client.with_default_user("mail");

        assert_ok!(client.check("x\n", &Headers::new()).await);
        assert!(server.await.unwrap().contains("\r\nUser: mail\r\n"));
    }

    #[tokio::test]
    async fn explicit_user_wins() {
        let (client, server) = scripted("SPAMD/1.1 0 EX_OK\r\nSpam: False ; 0.1 / 5.0\r\n\r\n");
        let client = client.with_default_user("mail");

        assert_ok!(client.check("x\n", &Headers::new().with("User", "alice")).await);
        let request = server.await.unwrap();
        assert!(request.contains("\r\nUser: alice\r\n"));
        assert!(!request.contains("User: mail"));
    }

    #[tokio::test]
    async fn tell_unavailable_means_training_disabled() {
        let (client, _server) = scripted("SPAMD/1.1 69 EX_UNAVAILABLE\r\n\r\n");
        let err = assert_err!(client.learn(LearnType::Spam, "x\n", &Headers::new()).await);
        assert!(matches!(err, SpamcError::TrainingDisabled));
    }

    #[tokio::test]
    async fn other_commands_keep_daemon_error() {
        let (client, _server) = scripted("SPAMD/1.1 69 EX_UNAVAILABLE\r\n\r\n");
        let err = assert_err!(client.check("x\n", &Headers::new()).await);
        assert!(matches!(err, SpamcError::Daemon { code: 69, .. }));
    }

    #[tokio::test]
    async fn learn_sends_tell_headers() {
        let (client, server) = scripted("SPAMD/1.1 0 EX_OK\r\nDidSet: local\r\n\r\n");
        let result = assert_ok!(client.learn(LearnType::Ham, "x\n", &Headers::new()).await);
        assert_eq!(result.did_set, ["local"]);

        let request = server.await.unwrap();
        assert!(request.starts_with("TELL SPAMC/1.5\r\n"));
        assert!(request.contains("\r\nMessage-class: ham\r\n"));
        assert!(request.contains("\r\nSet: local\r\n"));
    }

    #[tokio::test]
    async fn report_spam_sets_both_databases() {
        let (client, server) = scripted("SPAMD/1.1 0 EX_OK\r\nDidSet: local, remote\r\n\r\n");
        let result = assert_ok!(client.report_spam("x\n", &Headers::new()).await);
        assert_eq!(result.did_set, ["local", "remote"]);

        let request = server.await.unwrap();
        assert!(request.contains("\r\nMessage-class: spam\r\n"));
        assert!(request.contains("\r\nSet: local, remote\r\n"));
    }

    #[tokio::test]
    async fn report_ignore_warning_drops_zero_rows() {
        let (client, server) = scripted(
            "SPAMD/1.1 0 EX_OK\r\nSpam: False ; 0.4 / 5.0\r\n\r\n\
             Intro\r\n\r\n\
             \x20pts rule name              description\r\n\
             ---- ---------------------- --------------------------------------------------\r\n\
             \x200.4 INVALID_DATE           Invalid Date: header\r\n\
             -0.0 NO_RELAYS              Informational\r\n",
        );
        let result = assert_ok!(client.report_ignore_warning("x\n", &Headers::new()).await);
        assert_eq!(result.report.table.len(), 1);
        assert_eq!(result.report.table[0].rule, "INVALID_DATE");
        assert!(server.await.unwrap().starts_with("REPORT SPAMC/1.5\r\n"));
    }

    #[tokio::test]
    async fn report_if_spam_on_ham_is_empty() {
        let (client, server) = scripted("SPAMD/1.1 0 EX_OK\r\nSpam: False ; 0.4 / 5.0\r\n\r\n");
        let result = assert_ok!(client.report_if_spam("x\n", &Headers::new()).await);
        assert!(!result.verdict.is_spam);
        assert!(result.report.intro.is_empty());
        assert!(result.report.table.is_empty());
        assert!(server.await.unwrap().starts_with("REPORT_IFSPAM SPAMC/1.5\r\n"));
    }

    #[tokio::test]
    async fn headers_returns_rewritten_headers() {
        let (client, server) = scripted(
            "SPAMD/1.1 0 EX_OK\r\n\
             Spam: True ; 7.0 / 5.0\r\n\
             Content-length: 33\r\n\
             \r\n\
             X-Spam-Flag: YES\r\nSubject: hi\r\n\r\n",
        );
        let mut result = assert_ok!(client.headers("Subject: hi\r\n\r\nbody\r\n", &Headers::new()).await);
        assert!(result.verdict.is_spam);
        assert_eq!(result.body.content_length(), Some(33));
        assert_eq!(
            assert_ok!(result.body.read_to_string().await),
            "X-Spam-Flag: YES\r\nSubject: hi\r\n\r\n"
        );
        result.body.close();
        assert!(server.await.unwrap().starts_with("HEADERS SPAMC/1.5\r\n"));
    }

    #[tokio::test]
    async fn ping_sends_empty_message() {
        let (client, server) = scripted("SPAMD/1.5 0 PONG\r\n");
        let status = assert_ok!(client.ping().await);
        assert_eq!(status.message, "PONG");
        assert_eq!(
            server.await.unwrap(),
            "PING SPAMC/1.5\r\nContent-length: 0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn framing_error_before_dial() {
        let (client, server) = scripted("");
        let message = Message::from_reader(&b"abc"[..]);
        let err = assert_err!(client.call(Command::Check, message, &Headers::new()).await);
        assert!(matches!(err, SpamcError::UnknownLength));

        // The stream was never handed out.
        drop(client);
        assert_eq!(server.await.unwrap(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_framing() {
        let (client, server) = scripted("");
        let client = client.with_timeout(Duration::from_secs(2));
        // The writer half stays open and silent, so the scan window never fills.
        let (source, _writer) = duplex(64);
        let headers = Headers::new().with("Content-length", "10");

        let err = assert_err!(
            client
                .call(Command::Check, Message::from_reader(source), &headers)
                .await
        );
        assert!(matches!(err, SpamcError::Timeout(t) if t == Duration::from_secs(2)));

        drop(client);
        assert_eq!(server.await.unwrap(), "");
    }

    #[tokio::test]
    async fn cancelled_before_dial() {
        struct NeverDials;

        #[async_trait::async_trait]
        impl Dialer for NeverDials {
            type Stream = DuplexStream;

            async fn dial(&self) -> Result<DuplexStream, SpamcError> {
                std::future::pending().await
            }
        }

        let token = CancellationToken::new();
        token.cancel();
        let client = Client::new(NeverDials).with_cancellation(token);
        assert!(matches!(client.ping().await, Err(SpamcError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_the_read() {
        let (near, mut far) = duplex(1024);
        let _server = tokio::spawn(async move {
            let mut request = Vec::new();
            far.read_to_end(&mut request).await.unwrap();
            std::future::pending::<()>().await;
        });
        let client = Client::new(StreamDialer::new(near)).with_timeout(Duration::from_secs(2));

        let err = assert_err!(client.check("x\n", &Headers::new()).await);
        assert!(matches!(err, SpamcError::Timeout(t) if t == Duration::from_secs(2)));
    }
}
