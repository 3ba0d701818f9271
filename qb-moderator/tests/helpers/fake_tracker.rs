//! In-memory task tracker
//!
//! Holds records, applies updates the way the real tracker does, and
//! remembers every write so tests can assert on them. Event polls are
//! answered from a scripted queue.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use qb_common::{Quote, Record};
use qb_moderator::tracker::{ChangeEvent, EventAction, EventBatch, RecordUpdate, TaskTracker};
use qb_moderator::{Error, Result};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

enum PollReply {
    Events(Vec<ChangeEvent>),
    Expired,
}

#[derive(Default)]
struct FakeState {
    records: BTreeMap<String, Record>,
    updates: Vec<(String, RecordUpdate)>,
    comments: Vec<(String, String)>,
    followers_added: Vec<(String, String)>,
    full_fetches: usize,
    polls: VecDeque<PollReply>,
    next_sync: u64,
    fail_writes: bool,
}

#[derive(Default)]
pub struct FakeTracker {
    state: Mutex<FakeState>,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let tracker = Self::new();
        for record in records {
            tracker.insert(record);
        }
        tracker
    }

    pub fn insert(&self, record: Record) {
        self.state.lock().unwrap().records.insert(record.id.clone(), record);
    }

    /// Change a record's text as a user would
    pub fn edit(&self, id: &str, title: &str, body: &str) {
        let mut state = self.state.lock().unwrap();
        let record = state.records.get_mut(id).expect("unknown record");
        record.title = title.to_string();
        record.body = body.to_string();
    }

    /// Apply `f` to a record without going through the moderator
    pub fn modify(&self, id: &str, f: impl FnOnce(&mut Record)) {
        let mut state = self.state.lock().unwrap();
        f(state.records.get_mut(id).expect("unknown record"));
    }

    pub fn record(&self, id: &str) -> Record {
        self.state.lock().unwrap().records[id].clone()
    }

    /// Quote stored on the record, if any
    pub fn stored_quote(&self, id: &str) -> Option<Quote> {
        self.record(id)
            .external_data
            .map(|data| Quote::from_external_data(&data).expect("stored quote should decode"))
    }

    pub fn updates(&self, id: &str) -> Vec<RecordUpdate> {
        self.state
            .lock()
            .unwrap()
            .updates
            .iter()
            .filter(|(record_id, _)| record_id == id)
            .map(|(_, update)| update.clone())
            .collect()
    }

    pub fn update_count(&self) -> usize {
        self.state.lock().unwrap().updates.len()
    }

    pub fn comments(&self, id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .comments
            .iter()
            .filter(|(record_id, _)| record_id == id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn followers_added(&self, id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .followers_added
            .iter()
            .filter(|(record_id, _)| record_id == id)
            .map(|(_, identity)| identity.clone())
            .collect()
    }

    pub fn full_fetches(&self) -> usize {
        self.state.lock().unwrap().full_fetches
    }

    /// Queue a poll reply announcing changes to `ids`
    pub fn push_changes(&self, ids: &[&str]) {
        let events = ids
            .iter()
            .map(|id| ChangeEvent {
                resource_id: id.to_string(),
                resource_type: "task".to_string(),
                action: EventAction::Changed,
            })
            .collect();
        self.push_events(events);
    }

    pub fn push_events(&self, events: Vec<ChangeEvent>) {
        self.state.lock().unwrap().polls.push_back(PollReply::Events(events));
    }

    /// Queue a poll reply rejecting the sync token
    pub fn push_sync_expired(&self) {
        self.state.lock().unwrap().polls.push_back(PollReply::Expired);
    }

    /// Make every write fail with a tracker error
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }
}

fn next_sync(state: &mut FakeState) -> String {
    state.next_sync += 1;
    format!("sync-{}", state.next_sync)
}

fn write_failure() -> Error {
    Error::Tracker {
        status: 500,
        message: "injected failure".to_string(),
    }
}

#[async_trait]
impl TaskTracker for FakeTracker {
    async fn fetch_record(&self, id: &str, fields: &[&str]) -> Result<Record> {
        let mut state = self.state.lock().unwrap();
        if fields.contains(&"notes") {
            state.full_fetches += 1;
        }
        state
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn list_records<'a>(
        &'a self,
        _collection: &'a str,
        _fields: &'a [&'a str],
    ) -> BoxStream<'a, Result<Record>> {
        let records: Vec<Record> = self.state.lock().unwrap().records.values().cloned().collect();
        stream::iter(records.into_iter().map(Ok)).boxed()
    }

    async fn update_record(&self, id: &str, update: &RecordUpdate) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(write_failure());
        }
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if let Some(assignee) = &update.assignee {
            record.assignee = assignee.clone();
        }
        if let Some(completed) = update.completed {
            record.completed = completed;
        }
        if let Some(data) = &update.external_data {
            record.external_data = Some(data.clone());
        }
        for (field, value) in &update.custom_fields {
            record.custom_fields.insert(field.clone(), Some(value.clone()));
        }

        state.updates.push((id.to_string(), update.clone()));
        Ok(())
    }

    async fn add_comment(&self, id: &str, text: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(write_failure());
        }
        state.comments.push((id.to_string(), text.to_string()));
        Ok(())
    }

    async fn add_follower(&self, id: &str, identity: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(write_failure());
        }
        if let Some(record) = state.records.get_mut(id) {
            if !record.followers.iter().any(|f| f == identity) {
                record.followers.push(identity.to_string());
            }
        }
        state.followers_added.push((id.to_string(), identity.to_string()));
        Ok(())
    }

    async fn poll_events(&self, _collection: &str, sync: Option<&str>) -> Result<EventBatch> {
        let mut state = self.state.lock().unwrap();
        if sync.is_none() {
            return Err(Error::SyncExpired(next_sync(&mut state)));
        }
        match state.polls.pop_front() {
            Some(PollReply::Expired) => Err(Error::SyncExpired(next_sync(&mut state))),
            Some(PollReply::Events(events)) => Ok(EventBatch {
                events,
                sync: next_sync(&mut state),
            }),
            None => Ok(EventBatch {
                events: Vec::new(),
                sync: next_sync(&mut state),
            }),
        }
    }
}
