//! REST client for the task tracker
//!
//! Every request is rate limited client-side and authenticated with a
//! bearer token. Responses arrive wrapped in `{"data": ...}` envelopes;
//! collection listings are paginated by opaque offsets.

use async_stream::stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use governor::{Quota, RateLimiter};
use qb_common::config::TrackerConfig;
use qb_common::Record;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::num::NonZeroU32;
use std::time::Duration;

use super::{ChangeEvent, EventAction, EventBatch, RecordUpdate, TaskTracker};
use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("quoteboard/", env!("CARGO_PKG_VERSION"));
const PAGE_SIZE: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
    #[serde(default)]
    next_page: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
struct NextPage {
    offset: String,
}

#[derive(Debug, Deserialize)]
struct Compact {
    gid: String,
}

#[derive(Debug, Deserialize)]
struct WireExternal {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCustomField {
    gid: String,
    #[serde(default)]
    enum_value: Option<Compact>,
}

#[derive(Debug, Deserialize)]
struct WireTask {
    gid: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    assignee: Option<Compact>,
    #[serde(default)]
    followers: Vec<Compact>,
    #[serde(default)]
    external: Option<WireExternal>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_by: Option<Compact>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    parent: Option<Compact>,
    #[serde(default)]
    custom_fields: Vec<WireCustomField>,
}

impl WireTask {
    fn into_record(self) -> Record {
        Record {
            id: self.gid,
            title: self.name,
            body: self.notes,
            assignee: self.assignee.map(|a| a.gid),
            followers: self.followers.into_iter().map(|f| f.gid).collect(),
            external_data: self.external.and_then(|e| e.data),
            created_at: self.created_at.unwrap_or_default(),
            completed: self.completed,
            created_by: self.created_by.map(|c| c.gid),
            parent: self.parent.map(|p| p.gid),
            custom_fields: self
                .custom_fields
                .into_iter()
                .map(|f| (f.gid, f.enum_value.map(|v| v.gid)))
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResource {
    gid: String,
    #[serde(default)]
    resource_type: String,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    action: String,
    resource: WireResource,
}

#[derive(Debug, Deserialize)]
struct WireEvents {
    #[serde(default)]
    data: Vec<WireEvent>,
    sync: String,
}

#[derive(Debug, Deserialize)]
struct WireSyncOnly {
    sync: String,
}

fn parse_events(events: WireEvents) -> EventBatch {
    EventBatch {
        events: events
            .data
            .into_iter()
            .filter_map(|e| {
                let action = EventAction::from_wire(&e.action)?;
                Some(ChangeEvent {
                    resource_id: e.resource.gid,
                    resource_type: e.resource.resource_type,
                    action,
                })
            })
            .collect(),
        sync: events.sync,
    }
}

fn update_body(id: &str, update: &RecordUpdate) -> Value {
    let mut data = Map::new();
    if let Some(assignee) = &update.assignee {
        data.insert("assignee".to_string(), json!(assignee));
    }
    if let Some(completed) = update.completed {
        data.insert("completed".to_string(), json!(completed));
    }
    if let Some(external) = &update.external_data {
        data.insert("external".to_string(), json!({ "gid": id, "data": external }));
    }
    if !update.custom_fields.is_empty() {
        data.insert("custom_fields".to_string(), json!(update.custom_fields));
    }
    json!({ "data": data })
}

// ============================================================================
// Client
// ============================================================================

/// Tracker REST client
pub struct HttpTracker {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl HttpTracker {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let access_token = config
            .access_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                qb_common::Error::Config("tracker access token not configured".to_string())
            })?;

        let per_minute = NonZeroU32::new(config.requests_per_minute).ok_or_else(|| {
            qb_common::Error::Config("requests_per_minute must be positive".to_string())
        })?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token,
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Rate limit, authenticate and send
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        self.rate_limiter.until_ready().await;
        let response = request.bearer_auth(&self.access_token).send().await?;
        Ok(response)
    }

    /// Map non-success statuses to errors
    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status.as_u16() {
            404 => Err(Error::NotFound(what.to_string())),
            429 => Err(Error::RateLimited),
            code => {
                let message = response.text().await.unwrap_or_default();
                Err(Error::Tracker {
                    status: code,
                    message,
                })
            }
        }
    }

    async fn fetch_page(
        &self,
        collection: &str,
        fields: &[&str],
        offset: Option<&str>,
    ) -> Result<Page<WireTask>> {
        let mut query = vec![
            ("opt_fields", fields.join(",")),
            ("limit", PAGE_SIZE.to_string()),
        ];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        tracing::debug!(collection = %collection, offset = ?offset, "Fetching record page");
        let request = self
            .client
            .get(self.url(&format!("/projects/{}/tasks", collection)))
            .query(&query);
        let response = Self::check(self.send(request).await?, collection).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TaskTracker for HttpTracker {
    async fn fetch_record(&self, id: &str, fields: &[&str]) -> Result<Record> {
        let request = self
            .client
            .get(self.url(&format!("/tasks/{}", id)))
            .query(&[("opt_fields", fields.join(","))]);
        let response = Self::check(self.send(request).await?, id).await?;
        let envelope: Envelope<WireTask> = response.json().await?;
        Ok(envelope.data.into_record())
    }

    fn list_records<'a>(
        &'a self,
        collection: &'a str,
        fields: &'a [&'a str],
    ) -> BoxStream<'a, Result<Record>> {
        Box::pin(stream! {
            let mut offset: Option<String> = None;
            loop {
                let page = match self.fetch_page(collection, fields, offset.as_deref()).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };
                for task in page.data {
                    yield Ok(task.into_record());
                }
                match page.next_page {
                    Some(next) => offset = Some(next.offset),
                    None => break,
                }
            }
        })
    }

    async fn update_record(&self, id: &str, update: &RecordUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        let request = self
            .client
            .put(self.url(&format!("/tasks/{}", id)))
            .json(&update_body(id, update));
        Self::check(self.send(request).await?, id).await?;
        Ok(())
    }

    async fn add_comment(&self, id: &str, text: &str) -> Result<()> {
        let request = self
            .client
            .post(self.url(&format!("/tasks/{}/stories", id)))
            .json(&json!({ "data": { "text": text } }));
        Self::check(self.send(request).await?, id).await?;
        Ok(())
    }

    async fn add_follower(&self, id: &str, identity: &str) -> Result<()> {
        let request = self
            .client
            .post(self.url(&format!("/tasks/{}/addFollowers", id)))
            .json(&json!({ "data": { "followers": [identity] } }));
        Self::check(self.send(request).await?, id).await?;
        Ok(())
    }

    async fn poll_events(&self, collection: &str, sync: Option<&str>) -> Result<EventBatch> {
        let mut query = vec![("resource", collection.to_string())];
        if let Some(sync) = sync {
            query.push(("sync", sync.to_string()));
        }
        let request = self.client.get(self.url("/events")).query(&query);
        let response = self.send(request).await?;

        // 412: token missing or expired; the body carries a fresh one
        if response.status().as_u16() == 412 {
            let fresh: WireSyncOnly = response.json().await?;
            return Err(Error::SyncExpired(fresh.sync));
        }

        let response = Self::check(response, collection).await?;
        let events: WireEvents = response.json().await?;
        Ok(parse_events(events))
    }
}
