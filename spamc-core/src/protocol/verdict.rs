//! The `Spam` response header.
//!
//! ```text
//! Spam: True ; 15.0 / 5.0
//! Spam: no;0.1/5.0
//! ```
//!
//! The boolean token is matched case-insensitively; the separators may be
//! surrounded by any amount of whitespace.

use std::fmt;

use crate::error::VerdictError;
use crate::header::{Headers, SPAM};

/// Classification result carried by the `Spam` header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub is_spam: bool,
    /// Points the message scored.
    pub score: f64,
    /// Points required to be classified as spam.
    pub base_score: f64,
}

impl Verdict {
    /// Read the verdict out of a response's headers.
    pub fn from_headers(headers: &Headers) -> Result<Self, VerdictError> {
        let value = headers.get(SPAM).ok_or(VerdictError::HeaderMissing)?;
        value.parse()
    }
}

impl std::str::FromStr for Verdict {
    type Err = VerdictError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().is_empty() {
            return Err(VerdictError::HeaderEmpty);
        }

        let (status, scores) = value
            .split_once(';')
            .ok_or_else(|| VerdictError::UnexpectedData(value.to_string()))?;

        let status = status.trim();
        let is_spam = if status.eq_ignore_ascii_case("true") || status.eq_ignore_ascii_case("yes")
        {
            true
        } else if status.eq_ignore_ascii_case("false") || status.eq_ignore_ascii_case("no") {
            false
        } else {
            return Err(VerdictError::UnknownSpamStatus(status.to_string()));
        };

        let (score, base_score) = scores
            .split_once('/')
            .ok_or_else(|| VerdictError::UnexpectedData(value.to_string()))?;

        Ok(Self {
            is_spam,
            score: parse_score(score)?,
            base_score: parse_score(base_score)?,
        })
    }
}

fn parse_score(raw: &str) -> Result<f64, VerdictError> {
    raw.trim()
        .parse()
        .map_err(|_| VerdictError::InvalidScore(raw.to_string()))
}

impl fmt::Display for Verdict {
    /// Renders in the daemon's header format, e.g. `True ; 15 / 5`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_spam { "True" } else { "False" };
        write!(f, "{status} ; {} / {}", self.score, self.base_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spam(value: &str) -> Headers {
        let mut h = Headers::new();
        h.append(SPAM, value);
        h
    }

    #[test]
    fn missing_and_empty() {
        assert_eq!(Verdict::from_headers(&Headers::new()), Err(VerdictError::HeaderMissing));
        assert_eq!(Verdict::from_headers(&spam("")), Err(VerdictError::HeaderEmpty));
        assert_eq!(Verdict::from_headers(&spam("   ")), Err(VerdictError::HeaderEmpty));
    }

    #[test]
    fn malformed_values() {
        assert!(matches!(
            "clearly incorrect".parse::<Verdict>(),
            Err(VerdictError::UnexpectedData(_))
        ));
        assert!(matches!(
            "bacon ; 0 / 0".parse::<Verdict>(),
            Err(VerdictError::UnknownSpamStatus(s)) if s == "bacon"
        ));
        assert!(matches!(
            "no ; 0 ".parse::<Verdict>(),
            Err(VerdictError::UnexpectedData(_))
        ));
        for bad in ["no ; 0 / ", "no ; 0 / asd", "no ; asd / 0"] {
            assert!(
                matches!(bad.parse::<Verdict>(), Err(VerdictError::InvalidScore(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn valid_values() {
        let cases = [
            ("no ; 0.1 / 5.0", false, 0.1, 5.0),
            ("no;0.1 / 5.0", false, 0.1, 5.0),
            ("no;0.1/5.0", false, 0.1, 5.0),
            ("no;-0.1/5.0", false, -0.1, 5.0),
            ("TRUe ; 4 / 7.0", true, 4.0, 7.0),
            ("Yes ; 15.3 / 5.0", true, 15.3, 5.0),
            ("FALSE ; 0 / 0", false, 0.0, 0.0),
        ];
        for (input, is_spam, score, base_score) in cases {
            let v = Verdict::from_headers(&spam(input)).unwrap();
            assert_eq!(
                v,
                Verdict {
                    is_spam,
                    score,
                    base_score
                },
                "{input}"
            );
        }
    }

    #[test]
    fn display_matches_header_format() {
        let v = Verdict {
            is_spam: true,
            score: 15.5,
            base_score: 5.0,
        };
        assert_eq!(v.to_string(), "True ; 15.5 / 5");
    }

    proptest! {
        #[test]
        fn header_roundtrip(
            status in prop::sample::select(vec!["yes", "no", "true", "false", "YES", "No", "True", "fAlSe"]),
            score in -1000.0f64..1000.0,
            base_score in -1000.0f64..1000.0,
        ) {
            let value = format!("{status} ; {score} / {base_score}");
            let v: Verdict = value.parse().unwrap();
            let lower = status.to_ascii_lowercase();
            prop_assert_eq!(v.is_spam, lower == "yes" || lower == "true");
            prop_assert_eq!(v.score, score);
            prop_assert_eq!(v.base_score, base_score);

            let again: Verdict = v.to_string().parse().unwrap();
            prop_assert_eq!(again, v);
        }
    }
}
