//! Verdict planning
//!
//! Turns a parse outcome into the quote's new state and the writes that
//! publish it: record fields, a comment and possibly a new follower.
//! Planning is pure; the orchestrator performs the writes.

use qb_common::config::CollectionConfig;
use qb_common::parser::{ParseFailure, ParsedQuote};
use qb_common::{Quote, QuoteStatus, Record};

use crate::error::Result;
use crate::feedback;
use crate::tracker::RecordUpdate;

/// Identities and thresholds a verdict depends on
#[derive(Debug, Clone)]
pub struct VerdictPolicy<'a> {
    pub moderator: &'a str,
    pub helper: &'a str,
    pub helper_threshold: u32,
    pub collection: &'a CollectionConfig,
}

/// Writes that publish a verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerdictPlan {
    pub status: QuoteStatus,
    pub update: RecordUpdate,
    pub comment: String,
    /// Identity to add as follower
    pub follower: Option<String>,
}

/// Apply `outcome` to `quote` and plan the resulting writes
///
/// `hash` is the digest of the text that was parsed.
pub fn plan_verdict(
    quote: &mut Quote,
    record: &Record,
    outcome: std::result::Result<ParsedQuote, ParseFailure>,
    hash: String,
    policy: &VerdictPolicy<'_>,
) -> Result<VerdictPlan> {
    match outcome {
        Ok(parsed) => plan_valid(quote, parsed, hash, policy),
        Err(failure) => plan_invalid(quote, record, &failure, hash, policy),
    }
}

fn plan_valid(
    quote: &mut Quote,
    parsed: ParsedQuote,
    hash: String,
    policy: &VerdictPolicy<'_>,
) -> Result<VerdictPlan> {
    quote.accept(parsed.lines, parsed.date, parsed.context, hash)?;

    let mut update = RecordUpdate {
        assignee: Some(None),
        external_data: Some(quote.to_external_data()?),
        ..Default::default()
    };
    match &policy.collection.status_field {
        Some(field) => {
            update
                .custom_fields
                .insert(field.field.clone(), field.accepted.clone());
        }
        None => update.completed = Some(true),
    }

    let comment = if quote.char_count() > policy.collection.max_length {
        feedback::too_long(quote, policy.collection.max_length)
    } else {
        feedback::acknowledgement(quote)
    };

    Ok(VerdictPlan {
        status: quote.status,
        update,
        comment,
        follower: None,
    })
}

fn plan_invalid(
    quote: &mut Quote,
    record: &Record,
    failure: &ParseFailure,
    hash: String,
    policy: &VerdictPolicy<'_>,
) -> Result<VerdictPlan> {
    quote.reject(hash);

    // Hand the record back; never leave it with the moderator
    let assignee = quote
        .owner
        .clone()
        .filter(|owner| owner != policy.moderator);

    let mut update = RecordUpdate {
        assignee: Some(assignee),
        external_data: Some(quote.to_external_data()?),
        ..Default::default()
    };
    match &policy.collection.status_field {
        Some(field) => {
            update
                .custom_fields
                .insert(field.field.clone(), field.needs_editing.clone());
        }
        None if record.completed => update.completed = Some(false),
        None => {}
    }

    let follower = (quote.num_failures >= policy.helper_threshold
        && !record.followers.iter().any(|f| f == policy.helper))
    .then(|| policy.helper.to_string());

    let comment = feedback::rejection(
        failure,
        quote.num_failures,
        policy.collection.quote_type,
        follower.is_some(),
    );

    Ok(VerdictPlan {
        status: quote.status,
        update,
        comment,
        follower,
    })
}
