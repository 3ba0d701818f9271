//! Single-line classifiers
//!
//! Each classifier is a pure function returning `Some(match)` or `None`.
//! [`classify`] composes them in a fixed priority order.

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::Line;
use crate::time::start_of_day;

/// Literal that ends the quote; it and every later line are ignored
pub const SEPARATOR: &str = "---";

const UNKNOWN_DATE: &str = "unknown";

// ============================================================================
// Dates
// ============================================================================

/// A date token at the start of a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateMatch<'a> {
    /// `None` for the `unknown` token
    pub date: Option<DateTime<Utc>>,
    /// Text after the token and one separator, trimmed
    pub rest: &'a str,
}

/// Match `unknown`, `YYYY-MM` or `YYYY-MM-DD` at offset 0
///
/// The token must be followed by whitespace or the end of the line;
/// `2014-01-01def` is not a date.
pub fn parse_date(line: &str) -> Option<DateMatch<'_>> {
    let (date, token_len) = match match_unknown(line) {
        Some(len) => (None, len),
        None => {
            let (date, len) = match_calendar_date(line)?;
            (Some(date), len)
        }
    };

    let mut after = line[token_len..].chars();
    match after.next() {
        None => Some(DateMatch { date, rest: "" }),
        Some(c) if c.is_whitespace() => Some(DateMatch {
            date,
            rest: after.as_str().trim(),
        }),
        Some(_) => None,
    }
}

fn match_unknown(line: &str) -> Option<usize> {
    line.get(..UNKNOWN_DATE.len())
        .filter(|token| token.eq_ignore_ascii_case(UNKNOWN_DATE))
        .map(str::len)
}

fn all_digits(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_digit)
}

/// Longest syntactic date token, validated against the calendar
fn match_calendar_date(line: &str) -> Option<(DateTime<Utc>, usize)> {
    let b = line.as_bytes();
    if b.len() < 7 || !all_digits(&b[0..4]) || b[4] != b'-' || !all_digits(&b[5..7]) {
        return None;
    }
    let year: i32 = line[0..4].parse().ok()?;
    let month: u32 = line[5..7].parse().ok()?;

    if b.len() >= 10 && b[7] == b'-' && all_digits(&b[8..10]) {
        let day: u32 = line[8..10].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day).map(|d| (start_of_day(d), 10));
    }

    NaiveDate::from_ymd_opt(year, month, 1).map(|d| (start_of_day(d), 7))
}

// ============================================================================
// Spoken lines
// ============================================================================

/// One `speaker: text` segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpokenMatch<'a> {
    pub speaker: &'a str,
    pub text: &'a str,
    /// Unconsumed remainder, left for another pass
    pub rest: Option<&'a str>,
}

impl SpokenMatch<'_> {
    pub fn to_line(&self) -> Line {
        Line::new(self.speaker, self.text)
    }
}

/// Match one `speaker: text` segment
///
/// Quoted text (`greg: "hi" ...`) stops at the closing quote and leaves the
/// rest untrimmed. Unquoted text runs to the last colon of the remainder,
/// which is left (colon included) for the next pass.
pub fn parse_spoken_line(line: &str) -> Option<SpokenMatch<'_>> {
    let colon = line.find(':')?;
    let head = &line[..colon];
    if head.contains('"') {
        return None;
    }
    let speaker = head.trim();
    if speaker.is_empty() {
        return None;
    }

    let remainder = line[colon + 1..].trim_start();

    if let Some(quoted) = remainder.strip_prefix('"') {
        let close = quoted.find('"')?;
        let text = &quoted[..close];
        if text.trim().is_empty() {
            return None;
        }
        let rest = &quoted[close + 1..];
        return Some(SpokenMatch {
            speaker,
            text,
            rest: Some(rest).filter(|r| !r.is_empty()),
        });
    }

    let (text, rest) = match remainder.rfind(':') {
        Some(last) => (remainder[..last].trim(), Some(&remainder[last..])),
        None => (remainder.trim(), None),
    };
    if text.is_empty() {
        return None;
    }
    Some(SpokenMatch { speaker, text, rest })
}

/// Outcome of consuming every speaker segment of a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segments {
    Lines(Vec<Line>),
    /// Starts like a spoken line but leaves text no pass can consume
    Ambiguous,
    NotSpoken,
}

/// Apply [`parse_spoken_line`] repeatedly until the line is consumed
pub fn parse_segments(line: &str) -> Segments {
    let Some(first) = parse_spoken_line(line) else {
        return Segments::NotSpoken;
    };

    let mut lines = vec![first.to_line()];
    let mut rest = first.rest;
    while let Some(remaining) = rest {
        if remaining.trim().is_empty() {
            break;
        }
        match parse_spoken_line(remaining) {
            Some(next) => {
                lines.push(next.to_line());
                rest = next.rest;
            }
            None => return Segments::Ambiguous,
        }
    }
    Segments::Lines(lines)
}

// ============================================================================
// Context and classification
// ============================================================================

pub fn is_separator(line: &str) -> bool {
    line.trim() == SEPARATOR
}

/// A line that is none of blank, separator, spoken or date
pub fn parse_context(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty()
        || is_separator(line)
        || parse_spoken_line(line).is_some()
        || parse_date(line).is_some()
    {
        return None;
    }
    Some(line)
}

/// What a single body line is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    Separator,
    Spoken(Vec<Line>),
    Ambiguous,
    Date {
        date: Option<DateTime<Utc>>,
        rest: &'a str,
    },
    Context(&'a str),
}

/// Classify a line, first match wins
pub fn classify(line: &str) -> LineKind<'_> {
    let line = line.trim();
    if line.is_empty() {
        return LineKind::Blank;
    }
    if is_separator(line) {
        return LineKind::Separator;
    }
    match parse_segments(line) {
        Segments::Lines(lines) => return LineKind::Spoken(lines),
        Segments::Ambiguous => return LineKind::Ambiguous,
        Segments::NotSpoken => {}
    }
    if let Some(m) = parse_date(line) {
        return LineKind::Date {
            date: m.date,
            rest: m.rest,
        };
    }
    LineKind::Context(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_blank_lines_never_match() {
        for s in ["", " ", "\t", "   \t  "] {
            assert!(parse_date(s).is_none(), "date matched {:?}", s);
            assert!(parse_spoken_line(s).is_none(), "spoken matched {:?}", s);
        }
    }

    #[test]
    fn test_parse_full_date() {
        let m = parse_date("2014-01-02").unwrap();
        assert_eq!(m.date, day(2014, 1, 2));
        assert_eq!(m.rest, "");
    }

    #[test]
    fn test_parse_month_date() {
        let m = parse_date("2014-03 at the office").unwrap();
        assert_eq!(m.date, day(2014, 3, 1));
        assert_eq!(m.rest, "at the office");
    }

    #[test]
    fn test_parse_unknown_date() {
        let m = parse_date("UNKNOWN").unwrap();
        assert_eq!(m.date, None);
        let m = parse_date("unknown  greg: hi").unwrap();
        assert_eq!(m.rest, "greg: hi");
    }

    #[test]
    fn test_date_must_be_anchored() {
        assert!(parse_date("x2014-01-01").is_none());
        assert!(parse_date(" 2014-01-01").is_none());
        assert!(parse_date("on 2014-01-01").is_none());
        assert!(parse_date("xunknown").is_none());
    }

    #[test]
    fn test_date_glued_to_text_fails() {
        assert!(parse_date("2014-01-01def").is_none());
        assert!(parse_date("2014-01-1").is_none());
        assert!(parse_date("unknowns").is_none());
    }

    #[test]
    fn test_invalid_calendar_date_fails() {
        assert!(parse_date("2014-13-01").is_none());
        assert!(parse_date("2014-02-30").is_none());
        assert!(parse_date("2014-00").is_none());
    }

    #[test]
    fn test_spoken_line_basic() {
        let m = parse_spoken_line("greg: hello").unwrap();
        assert_eq!(m.speaker, "greg");
        assert_eq!(m.text, "hello");
        assert_eq!(m.rest, None);
    }

    #[test]
    fn test_spoken_line_speaker_with_spaces() {
        let m = parse_spoken_line("  Uncle  Greg :   hello there ").unwrap();
        assert_eq!(m.speaker, "Uncle  Greg");
        assert_eq!(m.text, "hello there");
    }

    #[test]
    fn test_spoken_line_requires_colon() {
        assert!(parse_spoken_line("hello there").is_none());
        assert!(parse_spoken_line(": hello").is_none());
        assert!(parse_spoken_line("greg:").is_none());
    }

    #[test]
    fn test_spoken_line_colon_inside_quote_does_not_count() {
        assert!(parse_spoken_line("\"greg: hello\"").is_none());
    }

    #[test]
    fn test_spoken_line_quoted_leaves_untrimmed_rest() {
        let m = parse_spoken_line("greg: \"hello: there\" malcolm: \"hi\"").unwrap();
        assert_eq!(m.speaker, "greg");
        assert_eq!(m.text, "hello: there");
        assert_eq!(m.rest, Some(" malcolm: \"hi\""));
    }

    #[test]
    fn test_spoken_line_unterminated_quote_fails() {
        assert!(parse_spoken_line("greg: \"hello").is_none());
    }

    #[test]
    fn test_spoken_line_unquoted_splits_at_last_colon() {
        let m = parse_spoken_line("greg: hello malcolm: hi").unwrap();
        assert_eq!(m.text, "hello malcolm");
        assert_eq!(m.rest, Some(": hi"));
    }

    #[test]
    fn test_segments_consume_quoted_speakers() {
        let segments = parse_segments("greg: \"hello\" malcolm: \"hi\"");
        assert_eq!(
            segments,
            Segments::Lines(vec![Line::new("greg", "hello"), Line::new("malcolm", "hi")])
        );
    }

    #[test]
    fn test_segments_unquoted_speakers_are_ambiguous() {
        assert_eq!(parse_segments("greg: hello malcolm: hi"), Segments::Ambiguous);
        assert_eq!(parse_segments("greg: \"hello\" and more"), Segments::Ambiguous);
    }

    #[test]
    fn test_segments_trailing_whitespace_is_consumed() {
        assert_eq!(
            parse_segments("greg: \"hello\"   "),
            Segments::Lines(vec![Line::new("greg", "hello")])
        );
    }

    #[test]
    fn test_context_candidates() {
        assert_eq!(parse_context("  to malcolm "), Some("to malcolm"));
        assert_eq!(parse_context("greg: hi"), None);
        assert_eq!(parse_context("2015-05-05"), None);
        assert_eq!(parse_context("---"), None);
        assert_eq!(parse_context("   "), None);
    }

    #[test]
    fn test_classify_priority() {
        assert_eq!(classify(""), LineKind::Blank);
        assert_eq!(classify(" --- "), LineKind::Separator);
        assert_eq!(
            classify("greg: hi"),
            LineKind::Spoken(vec![Line::new("greg", "hi")])
        );
        assert_eq!(classify("greg: a b: c"), LineKind::Ambiguous);
        assert_eq!(
            classify("2015-05-05 somewhere"),
            LineKind::Date {
                date: day(2015, 5, 5),
                rest: "somewhere"
            }
        );
        assert_eq!(classify("at the pub"), LineKind::Context("at the pub"));
    }
}
