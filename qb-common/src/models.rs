//! Record and quote models
//!
//! A [`Record`] is the tracker's view of one submitted quote. The parsed
//! [`Quote`] has no store of its own: it is serialized as JSON into the
//! record's external-data field and read back the next time the record is
//! examined.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::hash::input_hash;
use crate::{Error, Result};

// ============================================================================
// Record
// ============================================================================

/// A task as fetched from the tracker
///
/// Fields the tracker did not return (partial fetches) keep their defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub id: String,
    pub title: String,
    pub body: String,
    /// Current assignee identity
    pub assignee: Option<String>,
    pub followers: Vec<String>,
    /// Opaque external-data blob (serialized [`Quote`])
    pub external_data: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed: bool,
    /// Identity of the person who created the task
    pub created_by: Option<String>,
    /// Parent task identifier; set only for subtasks
    pub parent: Option<String>,
    /// Enum custom fields: field id -> selected option id
    pub custom_fields: HashMap<String, Option<String>>,
}

impl Record {
    /// Digest of the record's current title and body
    pub fn input_hash(&self) -> String {
        input_hash(&self.title, &self.body)
    }

    pub fn is_subtask(&self) -> bool {
        self.parent.is_some()
    }

    /// Selected option of an enum custom field, if any
    pub fn custom_field(&self, field_id: &str) -> Option<&str> {
        self.custom_fields.get(field_id).and_then(|v| v.as_deref())
    }
}

// ============================================================================
// Quote
// ============================================================================

/// Lifecycle state of a quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuoteStatus {
    /// Never examined, or edited since the last verdict
    #[default]
    Modified,
    Invalid,
    Valid,
}

/// How a collection's records are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteType {
    /// Title is the speaker, body is what they said
    Simple,
    /// One or more `speaker: text` lines
    Multi,
}

impl fmt::Display for QuoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteType::Simple => write!(f, "simple"),
            QuoteType::Multi => write!(f, "multi"),
        }
    }
}

impl FromStr for QuoteType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(QuoteType::Simple),
            "multi" => Ok(QuoteType::Multi),
            other => Err(Error::InvalidInput(format!("Unknown quote type: {}", other))),
        }
    }
}

/// One spoken line of a quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub speaker: String,
    pub text: String,
}

impl Line {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }
}

/// Distinct speakers in order of first appearance (case-sensitive)
pub fn distinct_speakers(lines: &[Line]) -> Vec<String> {
    let mut speakers: Vec<String> = Vec::new();
    for line in lines {
        if !speakers.iter().any(|s| s == &line.speaker) {
            speakers.push(line.speaker.clone());
        }
    }
    speakers
}

/// Parsed quote persisted in the record's external-data field
///
/// Key order and names are the persisted layout. Nullable fields serialize
/// as explicit `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub identifier: String,
    /// Identity the record is handed back to when a parse fails
    pub owner: Option<String>,
    pub status: QuoteStatus,
    /// Digest of the title and body last examined
    pub input_hash: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub lines: Vec<Line>,
    /// Whether a verdict has ever been applied
    #[serde(default)]
    pub moderated: bool,
    pub context: Option<String>,
    #[serde(default)]
    pub num_failures: u32,
}

impl Quote {
    /// Fresh, never-examined quote
    pub fn new(identifier: impl Into<String>, owner: Option<String>) -> Self {
        Self {
            identifier: identifier.into(),
            owner,
            status: QuoteStatus::Modified,
            input_hash: None,
            date: None,
            lines: Vec::new(),
            moderated: false,
            context: None,
            num_failures: 0,
        }
    }

    /// Load the quote stored on a record, or start a new one
    ///
    /// A missing, malformed or foreign blob (one naming another record, as
    /// left behind by duplicating a task) yields a fresh quote. The owner of
    /// a fresh quote is the record's creator, falling back to its assignee
    /// unless that is `moderator`.
    pub fn from_record(record: &Record, moderator: &str) -> Self {
        if let Some(data) = record.external_data.as_deref().filter(|d| !d.trim().is_empty()) {
            match Self::from_external_data(data) {
                Ok(quote) if quote.identifier == record.id => return quote,
                Ok(quote) => {
                    tracing::debug!(
                        record_id = %record.id,
                        stored_id = %quote.identifier,
                        "Ignoring quote data copied from another record"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        record_id = %record.id,
                        error = %e,
                        "Discarding unreadable quote data"
                    );
                }
            }
        }

        let owner = record.created_by.clone().or_else(|| {
            record
                .assignee
                .clone()
                .filter(|assignee| assignee != moderator)
        });
        Self::new(record.id.clone(), owner)
    }

    pub fn from_external_data(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn to_external_data(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn speakers(&self) -> Vec<String> {
        distinct_speakers(&self.lines)
    }

    /// Total number of spoken characters across all lines
    pub fn char_count(&self) -> usize {
        self.lines.iter().map(|l| l.text.chars().count()).sum()
    }

    /// Whether `current_hash` differs from the hash last examined
    pub fn is_stale(&self, current_hash: &str) -> bool {
        self.input_hash.as_deref() != Some(current_hash)
    }

    /// Enter the transient state between noticing an edit and reparsing
    pub fn mark_modified(&mut self) {
        self.status = QuoteStatus::Modified;
    }

    /// Record a successful parse of the text hashing to `hash`
    pub fn accept(
        &mut self,
        lines: Vec<Line>,
        date: Option<DateTime<Utc>>,
        context: Option<String>,
        hash: String,
    ) -> Result<()> {
        if lines.is_empty() {
            return Err(Error::Invariant(format!(
                "quote {} accepted without lines",
                self.identifier
            )));
        }
        self.status = QuoteStatus::Valid;
        self.lines = lines;
        self.date = date;
        self.context = context;
        self.input_hash = Some(hash);
        self.num_failures = 0;
        self.moderated = true;
        Ok(())
    }

    /// Record a failed parse of the text hashing to `hash`
    pub fn reject(&mut self, hash: String) {
        self.status = QuoteStatus::Invalid;
        self.lines.clear();
        self.date = None;
        self.context = None;
        self.input_hash = Some(hash);
        self.num_failures += 1;
        self.moderated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str) -> Record {
        Record {
            id: id.to_string(),
            title: "greg".to_string(),
            body: "hello".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_quote_is_modified() {
        let quote = Quote::new("1", None);
        assert_eq!(quote.status, QuoteStatus::Modified);
        assert!(quote.input_hash.is_none());
    }

    #[test]
    fn test_serialization_keeps_nulls() {
        let quote = Quote::new("1", None);
        let json = quote.to_external_data().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "identifier",
            "owner",
            "status",
            "inputHash",
            "date",
            "lines",
            "moderated",
            "context",
            "numFailures",
        ] {
            assert!(obj.contains_key(key), "missing key {}", key);
        }
        assert!(obj["owner"].is_null());
        assert!(obj["date"].is_null());
        assert!(obj["context"].is_null());
        assert_eq!(obj["status"], "Modified");
    }

    #[test]
    fn test_round_trip_valid_quote() {
        let mut quote = Quote::new("42", Some("owner-1".to_string()));
        quote
            .accept(
                vec![Line::new("greg", "hello"), Line::new("malcolm", "hi")],
                Some(Utc.with_ymd_and_hms(2015, 5, 5, 0, 0, 0).unwrap()),
                Some("at the pub".to_string()),
                "abc".to_string(),
            )
            .unwrap();

        let restored = Quote::from_external_data(&quote.to_external_data().unwrap()).unwrap();
        assert_eq!(restored, quote);
    }

    #[test]
    fn test_round_trip_with_null_fields() {
        let mut quote = Quote::new("7", None);
        quote.reject("def".to_string());
        let restored = Quote::from_external_data(&quote.to_external_data().unwrap()).unwrap();
        assert_eq!(restored, quote);
    }

    #[test]
    fn test_accept_resets_failures() {
        let mut quote = Quote::new("1", None);
        quote.reject("h1".to_string());
        quote.reject("h2".to_string());
        assert_eq!(quote.num_failures, 2);

        quote
            .accept(vec![Line::new("greg", "hi")], None, None, "h3".to_string())
            .unwrap();
        assert_eq!(quote.num_failures, 0);
        assert_eq!(quote.status, QuoteStatus::Valid);
        assert!(!quote.is_stale("h3"));
        assert!(quote.is_stale("h4"));
    }

    #[test]
    fn test_accept_without_lines_is_invariant_error() {
        let mut quote = Quote::new("1", None);
        let err = quote.accept(Vec::new(), None, None, "h".to_string()).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
        assert_eq!(quote.status, QuoteStatus::Modified);
    }

    #[test]
    fn test_speakers_in_first_appearance_order() {
        let mut quote = Quote::new("1", None);
        quote.lines = vec![
            Line::new("greg", "hi"),
            Line::new("malcolm", "hi"),
            Line::new("greg", "i just said that"),
            Line::new("Greg", "shouting"),
        ];
        assert_eq!(quote.speakers(), vec!["greg", "malcolm", "Greg"]);
        assert_eq!(quote.char_count(), 2 + 2 + 16 + 8);
    }

    #[test]
    fn test_from_record_without_data_uses_creator() {
        let mut rec = record("9");
        rec.created_by = Some("alice".to_string());
        rec.assignee = Some("bot".to_string());
        let quote = Quote::from_record(&rec, "bot");
        assert_eq!(quote.identifier, "9");
        assert_eq!(quote.owner.as_deref(), Some("alice"));
    }

    #[test]
    fn test_from_record_never_owned_by_moderator() {
        let mut rec = record("9");
        rec.assignee = Some("bot".to_string());
        let quote = Quote::from_record(&rec, "bot");
        assert!(quote.owner.is_none());
    }

    #[test]
    fn test_from_record_reads_stored_quote() {
        let mut stored = Quote::new("9", Some("alice".to_string()));
        stored.reject("hash".to_string());
        let mut rec = record("9");
        rec.external_data = Some(stored.to_external_data().unwrap());

        assert_eq!(Quote::from_record(&rec, "bot"), stored);
    }

    #[test]
    fn test_from_record_ignores_garbage_and_foreign_data() {
        let mut rec = record("9");
        rec.external_data = Some("{not json".to_string());
        assert_eq!(Quote::from_record(&rec, "bot").status, QuoteStatus::Modified);

        let foreign = Quote::new("10", None);
        rec.external_data = Some(foreign.to_external_data().unwrap());
        assert_eq!(Quote::from_record(&rec, "bot").identifier, "9");
    }

    #[test]
    fn test_quote_type_from_str() {
        assert_eq!("Multi".parse::<QuoteType>().unwrap(), QuoteType::Multi);
        assert_eq!("simple".parse::<QuoteType>().unwrap(), QuoteType::Simple);
        assert!("other".parse::<QuoteType>().is_err());
    }
}
