//! Quote grammar
//!
//! Turns a record's title and body into speaker lines, a date and an
//! optional context note. Parsing is pure: no I/O and no state.
//!
//! Two layouts are supported, chosen per collection:
//!
//! - **simple**: the title names the speaker and the body is what they said.
//!   A date on the last body line overrides the creation time.
//! - **multi**: `speaker: text` lines, taken from the title when it is one
//!   and from the body otherwise. The body may also carry one date line and
//!   one context line. A `---` line ends the quote.

pub mod lines;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{distinct_speakers, Line, QuoteType, Record};
use lines::{
    classify, is_separator, parse_date, parse_segments, parse_spoken_line, LineKind, Segments,
};

/// Why a record could not be read as a quote
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("the quote has no text")]
    EmptyBody,

    #[error("no \"speaker: text\" lines were found")]
    NoSpokenLines,

    #[error("several speakers share the line {0:?} without quotes around what each said")]
    AmbiguousSpeakers(String),

    #[error("the line {0:?} is not a spoken line, a date or a context note")]
    UnrecognizedLine(String),
}

/// Structured result of a successful parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuote {
    pub lines: Vec<Line>,
    pub date: Option<DateTime<Utc>>,
    pub context: Option<String>,
}

impl ParsedQuote {
    pub fn speakers(&self) -> Vec<String> {
        distinct_speakers(&self.lines)
    }
}

/// Parse a record's current text
pub fn parse_record(record: &Record, quote_type: QuoteType) -> Result<ParsedQuote, ParseFailure> {
    parse(&record.title, &record.body, record.created_at, quote_type)
}

/// Parse title and body text
///
/// `created_at` is the date used when the text carries none.
pub fn parse(
    title: &str,
    body: &str,
    created_at: DateTime<Utc>,
    quote_type: QuoteType,
) -> Result<ParsedQuote, ParseFailure> {
    match quote_type {
        QuoteType::Simple => parse_simple(title, body, created_at),
        QuoteType::Multi => parse_multi(title, body, created_at),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_simple(
    title: &str,
    body: &str,
    created_at: DateTime<Utc>,
) -> Result<ParsedQuote, ParseFailure> {
    let mut body_lines: Vec<&str> = body.lines().collect();
    while body_lines.last().is_some_and(|l| l.trim().is_empty()) {
        body_lines.pop();
    }

    let mut date = Some(created_at);
    if let Some(m) = body_lines.last().and_then(|last| parse_date(last.trim())) {
        if m.rest.is_empty() {
            date = m.date;
            body_lines.pop();
        }
    }

    let text = collapse_whitespace(&body_lines.join(" "));
    if text.is_empty() {
        return Err(ParseFailure::EmptyBody);
    }

    Ok(ParsedQuote {
        lines: vec![Line::new(title.trim(), text)],
        date,
        context: None,
    })
}

/// Accumulates the pieces of a multi-line quote
#[derive(Default)]
struct MultiQuote {
    lines: Vec<Line>,
    /// Outer `None` until a date token is seen; inner `None` for `unknown`
    date: Option<Option<DateTime<Utc>>>,
    context: Option<String>,
}

impl MultiQuote {
    fn read_body(&mut self, body: &str) -> Result<(), ParseFailure> {
        for raw in body.lines() {
            let line = raw.trim();
            match classify(line) {
                LineKind::Blank => {}
                LineKind::Separator => break,
                LineKind::Spoken(lines) => self.lines.extend(lines),
                LineKind::Ambiguous => {
                    return Err(ParseFailure::AmbiguousSpeakers(line.to_string()))
                }
                LineKind::Date { date, rest } if self.date.is_none() => {
                    self.date = Some(date);
                    if !rest.is_empty() {
                        self.set_context(rest, line)?;
                    }
                }
                LineKind::Context(text) => self.set_context(text, line)?,
                LineKind::Date { .. } => {
                    return Err(ParseFailure::UnrecognizedLine(line.to_string()))
                }
            }
        }
        Ok(())
    }

    fn set_context(&mut self, text: &str, line: &str) -> Result<(), ParseFailure> {
        if self.context.is_some() {
            return Err(ParseFailure::UnrecognizedLine(line.to_string()));
        }
        self.context = Some(text.to_string());
        Ok(())
    }
}

/// Body lines up to the first separator
fn body_lines(body: &str) -> impl Iterator<Item = &str> {
    body.lines().map(str::trim).take_while(|line| !is_separator(line))
}

fn body_has_speakers(body: &str) -> bool {
    body_lines(body).any(|line| !matches!(parse_segments(line), Segments::NotSpoken))
}

fn body_as_context(body: &str) -> Option<String> {
    let text = collapse_whitespace(&body_lines(body).collect::<Vec<_>>().join(" "));
    (!text.is_empty()).then_some(text)
}

fn parse_multi(
    title: &str,
    body: &str,
    created_at: DateTime<Utc>,
) -> Result<ParsedQuote, ParseFailure> {
    let title = title.trim();
    let mut quote = MultiQuote::default();

    // A title may lead with a date: "2015-05-05 greg: hello"
    let (title_date, spoken_title) = match parse_date(title) {
        Some(m) if parse_spoken_line(m.rest).is_some() => (Some(m.date), m.rest),
        _ => (None, title),
    };

    match parse_segments(spoken_title) {
        Segments::Lines(lines) => {
            quote.lines = lines;
            quote.date = title_date;
            // Without speakers of its own, the body is one free-text note
            if body_has_speakers(body) {
                quote.read_body(body)?;
            } else {
                quote.context = body_as_context(body);
            }
        }
        Segments::Ambiguous => return Err(ParseFailure::AmbiguousSpeakers(title.to_string())),
        Segments::NotSpoken => quote.read_body(body)?,
    }

    if quote.lines.is_empty() {
        return Err(ParseFailure::NoSpokenLines);
    }

    Ok(ParsedQuote {
        lines: quote.lines,
        date: quote.date.unwrap_or(Some(created_at)),
        context: quote.context,
    })
}
