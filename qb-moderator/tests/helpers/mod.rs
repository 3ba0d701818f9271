//! Test Helper Utilities
//!
//! Shared utilities for testing qb-moderator

#![allow(dead_code)]

pub mod fake_tracker;

pub use fake_tracker::FakeTracker;

use chrono::{TimeZone, Utc};
use qb_common::config::{CollectionConfig, StatusFieldConfig};
use qb_common::{QuoteType, Record};
use qb_moderator::orchestrator::ModeratorSettings;
use std::time::Duration;

pub const MODERATOR: &str = "bot";
pub const HELPER: &str = "helper";
pub const OWNER: &str = "alice";
pub const QUIET_PERIOD: Duration = Duration::from_secs(60);
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub fn settings() -> ModeratorSettings {
    ModeratorSettings {
        moderator: MODERATOR.to_string(),
        helper: HELPER.to_string(),
        helper_threshold: 3,
        quiet_period: QUIET_PERIOD,
        poll_interval: POLL_INTERVAL,
    }
}

pub fn collection() -> CollectionConfig {
    CollectionConfig {
        id: "quotes".to_string(),
        quote_type: QuoteType::Multi,
        max_length: 280,
        status_field: None,
    }
}

pub fn collection_with_status_field() -> CollectionConfig {
    CollectionConfig {
        status_field: Some(StatusFieldConfig {
            field: "status".to_string(),
            needs_review: "review".to_string(),
            needs_editing: "editing".to_string(),
            accepted: "accepted".to_string(),
        }),
        ..collection()
    }
}

/// Top-level record created by [`OWNER`]
pub fn quote_record(id: &str, title: &str, body: &str) -> Record {
    Record {
        id: id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        created_by: Some(OWNER.to_string()),
        ..Default::default()
    }
}
