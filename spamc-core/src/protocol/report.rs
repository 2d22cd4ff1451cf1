//! Report bodies returned by `REPORT` and `REPORT_IFSPAM`.
//!
//! ```text
//! Spam detection software, running on the system "mail.example.com",
//! has NOT identified this incoming email as spam.
//!
//! Content analysis details:   (1.6 points, 5.0 required)
//!
//!  pts rule name              description
//! ---- ---------------------- --------------------------------------------------
//!  0.4 INVALID_DATE           Invalid Date: header (not RFC 2822)
//! -0.0 NO_RELAYS              Informational: message was not relayed via SMTP
//!  1.1 URIBL_BLOCKED          ADMINISTRATOR NOTICE: The query to URIBL was
//!                             blocked.
//! ```
//!
//! Everything before the table header is free text. Table rows run until the
//! end of the body; lines that do not start a row continue the previous
//! row's description.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::SpamcError;

/// Column header that switches the parser into table mode.
const TABLE_HEADER: &str = " pts rule name";

/// Full header row and dash rule as spamd prints them.
const TABLE_HEADER_ROW: &str = " pts rule name              description";
const TABLE_RULE: &str =
    "---- ---------------------- --------------------------------------------------";

/// Prefix of description continuation lines: the width of the points and
/// rule-name columns.
pub const CONTINUATION_INDENT: &str = "                            ";

static ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s?(-?\d+(?:\.\d+)?)\s+(\S+)\s*(.*)$").expect("row pattern is valid")
});

/// One triggered rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub points: f64,
    pub rule: String,
    /// Continuation lines are joined with `"\n"` + [`CONTINUATION_INDENT`].
    pub description: String,
}

/// A parsed report: introductory text and the rule table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub intro: String,
    pub table: Vec<ReportRow>,
}

impl Report {
    /// Parse a report from a complete body string.
    pub fn parse(body: &str) -> Result<Self, SpamcError> {
        let mut parser = ReportParser::default();
        for line in body.lines() {
            parser.feed(line)?;
        }
        Ok(parser.finish())
    }

    /// Parse a report from a stream, reading until it is exhausted.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, SpamcError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut parser = ReportParser::default();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            parser.feed(line.trim_end_matches(['\r', '\n']))?;
        }
        Ok(parser.finish())
    }

    /// Drop rows that contributed no points.
    pub fn without_zero_points(mut self) -> Self {
        self.table.retain(|row| row.points != 0.0);
        self
    }
}

#[derive(Default)]
struct ReportParser {
    intro: String,
    table: Vec<ReportRow>,
    in_table: bool,
    expect_rule: bool,
}

impl ReportParser {
    fn feed(&mut self, line: &str) -> Result<(), SpamcError> {
        if !self.in_table {
            if line.starts_with(TABLE_HEADER) {
                self.in_table = true;
                self.expect_rule = true;
            } else {
                self.intro.push_str(line);
                self.intro.push('\n');
            }
            return Ok(());
        }

        if std::mem::take(&mut self.expect_rule)
            && !line.is_empty()
            && line.chars().all(|c| c == '-' || c == ' ')
        {
            return Ok(());
        }

        if line.trim().is_empty() {
            return Ok(());
        }

        if let Some(caps) = ROW.captures(line) {
            let points = caps[1]
                .parse()
                .map_err(|_| SpamcError::ReportRow(line.to_string()))?;
            self.table.push(ReportRow {
                points,
                rule: caps[2].to_string(),
                description: caps[3].trim().to_string(),
            });
            return Ok(());
        }

        let last = self
            .table
            .last_mut()
            .ok_or_else(|| SpamcError::ReportRow(line.to_string()))?;
        last.description.push('\n');
        last.description.push_str(CONTINUATION_INDENT);
        last.description.push_str(line.trim());
        Ok(())
    }

    fn finish(self) -> Report {
        Report {
            intro: self.intro.trim().to_string(),
            table: self.table,
        }
    }
}

impl fmt::Display for ReportRow {
    /// Non-negative, non-zero points get a leading space so they line up
    /// with negative ones; `-0.0` keeps its sign.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.points > 0.0 {
            f.write_str(" ")?;
        }
        write!(f, "{:.1} {:<22} {}", self.points, self.rule, self.description)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.intro)?;
        writeln!(f)?;
        writeln!(f, "{TABLE_HEADER_ROW}")?;
        writeln!(f, "{TABLE_RULE}")?;
        for row in &self.table {
            writeln!(f, "{row}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTRO: &str = "Spam detection software, running on the system \"d311d8df23f8\",
has NOT identified this incoming email as spam.

Content preview:  the body [...]

Content analysis details:   (1.6 points, 5.0 required)";

    fn body(rows: &str) -> String {
        format!("{INTRO}\n\n{TABLE_HEADER_ROW}\n{TABLE_RULE}\n{rows}")
    }

    #[test]
    fn parses_intro_and_rows() {
        let text = body(
            " 0.4 INVALID_DATE           Invalid Date: header (not RFC 2822)
-0.0 NO_RELAYS              Informational: message was not relayed via SMTP
-1.2 MISSING_HEADERS        Missing To: header
",
        );
        let report = Report::parse(&text).unwrap();

        assert_eq!(report.intro, INTRO);
        assert_eq!(report.table.len(), 3);
        assert_eq!(report.table[0].points, 0.4);
        assert_eq!(report.table[0].rule, "INVALID_DATE");
        assert_eq!(report.table[0].description, "Invalid Date: header (not RFC 2822)");
        assert_eq!(report.table[1].points, 0.0);
        assert!(report.table[1].points.is_sign_negative());
        assert_eq!(report.table[2].points, -1.2);
        assert_eq!(report.table[2].rule, "MISSING_HEADERS");

        assert_eq!(report.to_string(), text);
    }

    #[test]
    fn continuation_joins_previous_row() {
        let text = body(
            " 0.4 INVALID_DATE           Invalid Date: header (not RFC 2822)
 1.1 URIBL_BLOCKED          ADMINISTRATOR NOTICE: The query to URIBL was
                            blocked.
-1.2 MISSING_HEADERS        Missing To: header
",
        );
        let report = Report::parse(&text).unwrap();

        assert_eq!(report.table.len(), 3);
        assert_eq!(
            report.table[1].description,
            format!("ADMINISTRATOR NOTICE: The query to URIBL was\n{CONTINUATION_INDENT}blocked.")
        );
        assert_eq!(report.table[2].description, "Missing To: header");
        assert_eq!(report.to_string(), text);
    }

    #[test]
    fn intro_only() {
        let report = Report::parse("\n  Just some text.\n\nMore.\n\n").unwrap();
        assert_eq!(report.intro, "Just some text.\n\nMore.");
        assert!(report.table.is_empty());
    }

    #[test]
    fn empty_body() {
        assert_eq!(Report::parse("").unwrap(), Report::default());
    }

    #[test]
    fn continuation_without_row_is_an_error() {
        let text = format!("{TABLE_HEADER_ROW}\n{TABLE_RULE}\n    orphaned text\n");
        assert!(matches!(
            Report::parse(&text),
            Err(SpamcError::ReportRow(line)) if line.contains("orphaned")
        ));
    }

    #[test]
    fn zero_rows_can_be_dropped() {
        let text = body(
            " 0.4 INVALID_DATE           Invalid Date: header (not RFC 2822)
 0.0 HTML_MESSAGE           BODY: HTML included in message
-0.0 NO_RELAYS              Informational: message was not relayed via SMTP
",
        );
        let report = Report::parse(&text).unwrap().without_zero_points();
        assert_eq!(report.table.len(), 1);
        assert_eq!(report.table[0].rule, "INVALID_DATE");
    }

    #[tokio::test]
    async fn reads_crlf_stream() {
        let text = body(" 2.5 FOO  Foo\n").replace('\n', "\r\n");
        let mut reader = text.as_bytes();
        let report = Report::read_from(&mut reader).await.unwrap();
        assert_eq!(report.intro, INTRO);
        assert_eq!(report.table.len(), 1);
        assert_eq!(report.table[0].rule, "FOO");
        assert_eq!(report.table[0].description, "Foo");
    }
}
