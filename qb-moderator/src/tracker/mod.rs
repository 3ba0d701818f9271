//! Task tracker interface
//!
//! The moderator only talks to the tracker through [`TaskTracker`]. The
//! HTTP implementation lives in [`http`]; tests substitute an in-memory one.

pub mod http;

use async_trait::async_trait;
use futures::stream::BoxStream;
use qb_common::Record;
use std::collections::HashMap;

use crate::error::Result;

pub use http::HttpTracker;

/// Fields needed to decide what a notification means
pub const PARTIAL_FIELDS: &[&str] = &["assignee", "custom_fields", "parent"];

/// Fields needed to parse and reconcile a record
pub const FULL_FIELDS: &[&str] = &[
    "name",
    "notes",
    "assignee",
    "followers",
    "external",
    "created_at",
    "created_by",
    "completed",
    "parent",
    "custom_fields",
];

/// Partial update of a record; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    /// `Some(None)` clears the assignee
    pub assignee: Option<Option<String>>,
    pub completed: Option<bool>,
    pub external_data: Option<String>,
    /// Enum custom fields to set: field id -> option id
    pub custom_fields: HashMap<String, String>,
}

impl RecordUpdate {
    pub fn is_empty(&self) -> bool {
        self.assignee.is_none()
            && self.completed.is_none()
            && self.external_data.is_none()
            && self.custom_fields.is_empty()
    }
}

/// What happened to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Added,
    Changed,
    Removed,
    Deleted,
    Undeleted,
}

impl EventAction {
    pub fn from_wire(action: &str) -> Option<Self> {
        match action {
            "added" => Some(EventAction::Added),
            "changed" => Some(EventAction::Changed),
            "removed" => Some(EventAction::Removed),
            "deleted" => Some(EventAction::Deleted),
            "undeleted" => Some(EventAction::Undeleted),
            _ => None,
        }
    }
}

/// One change notification from the event feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub resource_id: String,
    /// Tracker resource type, e.g. `task` or `story`
    pub resource_type: String,
    pub action: EventAction,
}

impl ChangeEvent {
    /// Whether the event may have changed a record's text or flags
    pub fn concerns_record(&self) -> bool {
        self.resource_type == "task"
            && matches!(self.action, EventAction::Added | EventAction::Changed)
    }
}

/// Events since the previous poll plus the token for the next one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    pub events: Vec<ChangeEvent>,
    pub sync: String,
}

/// Operations the moderator needs from the tracker
#[async_trait]
pub trait TaskTracker: Send + Sync {
    /// Fetch one record with the given fields
    async fn fetch_record(&self, id: &str, fields: &[&str]) -> Result<Record>;

    /// Every record of a collection, fetched page by page as consumed
    fn list_records<'a>(
        &'a self,
        collection: &'a str,
        fields: &'a [&'a str],
    ) -> BoxStream<'a, Result<Record>>;

    async fn update_record(&self, id: &str, update: &RecordUpdate) -> Result<()>;

    async fn add_comment(&self, id: &str, text: &str) -> Result<()>;

    async fn add_follower(&self, id: &str, identity: &str) -> Result<()>;

    /// Poll the collection's event feed
    ///
    /// Without a token, or with an expired one, the tracker replies with
    /// [`Error::SyncExpired`](crate::Error::SyncExpired) carrying a fresh
    /// token and no events.
    async fn poll_events(&self, collection: &str, sync: Option<&str>) -> Result<EventBatch>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_task_additions_and_changes_concern_records() {
        let event = |resource_type: &str, action| ChangeEvent {
            resource_id: "1".to_string(),
            resource_type: resource_type.to_string(),
            action,
        };
        assert!(event("task", EventAction::Changed).concerns_record());
        assert!(event("task", EventAction::Added).concerns_record());
        assert!(!event("task", EventAction::Deleted).concerns_record());
        assert!(!event("story", EventAction::Added).concerns_record());
    }

    #[test]
    fn test_empty_update() {
        assert!(RecordUpdate::default().is_empty());
        let update = RecordUpdate {
            completed: Some(true),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_event_action_from_wire() {
        assert_eq!(EventAction::from_wire("changed"), Some(EventAction::Changed));
        assert_eq!(EventAction::from_wire("exploded"), None);
    }
}
