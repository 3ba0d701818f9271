//! Reconciliation orchestrator
//!
//! Brings each record of a collection in line with its quote: decides
//! whether a sighting needs moderation, debounces edits, parses, and writes
//! the verdict back to the tracker.
//!
//! **Flow per notification:**
//! 1. Fetch partial record; subtasks are ignored
//! 2. Flagged records (assigned to the moderator, or status set to review)
//!    are parsed immediately under the exclusion lock
//! 3. Otherwise, under the lock, fetch the full record and compare the
//!    input hash with the one stored in the quote
//! 4. Unchanged records are left alone; changed ones are handed to the
//!    debounce scheduler and the lock is released
//! 5. When the quiet period elapses the record is fetched and compared
//!    again, then parsed and the verdict applied
//!
//! The initial scan skips the debounce and applies verdicts directly.

use futures::StreamExt;
use qb_common::config::{CollectionConfig, TomlConfig};
use qb_common::{parser, Quote, QuoteStatus, Record};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::lock::ExclusionLock;
use crate::scheduler::{self, DebounceScheduler};
use crate::tracker::{ChangeEvent, TaskTracker, FULL_FIELDS, PARTIAL_FIELDS};
use crate::verdict::{self, VerdictPolicy};

// ============================================================================
// Types
// ============================================================================

/// Settings shared by every collection
#[derive(Debug, Clone)]
pub struct ModeratorSettings {
    /// Tracker identity of the moderator
    pub moderator: String,
    /// Human added as follower after repeated failures
    pub helper: String,
    pub helper_threshold: u32,
    pub quiet_period: Duration,
    pub poll_interval: Duration,
}

impl ModeratorSettings {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            moderator: config.moderator.clone(),
            helper: config.helper.clone(),
            helper_threshold: config.helper_threshold,
            quiet_period: config.quiet_period(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// What caused a record to be looked at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Startup or resync scan
    Scan,
    /// Event feed notification
    Notification,
    /// Quiet period elapsed
    Debounced,
}

/// What happened to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Subtask; never moderated
    Ignored,
    /// Another operation holds the record's lock
    Busy,
    /// Text matches the last moderated text
    Unchanged,
    /// Handed to the debounce scheduler
    Debounced,
    /// Parsed and verdict written
    Applied(QuoteStatus),
}

/// Counts from one pass over a collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub seen: usize,
    pub valid: usize,
    pub invalid: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ScanSummary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Applied(QuoteStatus::Valid) => self.valid += 1,
            Outcome::Applied(_) => self.invalid += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Ignored | Outcome::Busy | Outcome::Debounced => self.skipped += 1,
        }
    }
}

/// Point-in-time view of a collection's moderation state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStatus {
    pub collection: String,
    pub locked: usize,
    pub pending: usize,
    pub running: usize,
}

// ============================================================================
// Moderator
// ============================================================================

/// Moderates one collection
pub struct Moderator<T: TaskTracker> {
    tracker: Arc<T>,
    settings: ModeratorSettings,
    collection: CollectionConfig,
    lock: ExclusionLock,
    scheduler: DebounceScheduler,
}

impl<T: TaskTracker + 'static> Moderator<T> {
    pub fn new(
        tracker: Arc<T>,
        settings: ModeratorSettings,
        collection: CollectionConfig,
    ) -> Arc<Self> {
        let scheduler = DebounceScheduler::new(settings.quiet_period);
        Arc::new(Self {
            tracker,
            settings,
            collection,
            lock: ExclusionLock::new(),
            scheduler,
        })
    }

    pub fn collection_id(&self) -> &str {
        &self.collection.id
    }

    pub fn lock(&self) -> &ExclusionLock {
        &self.lock
    }

    pub fn scheduler(&self) -> &DebounceScheduler {
        &self.scheduler
    }

    /// Whether a human explicitly asked for the record to be checked
    fn is_flagged(&self, record: &Record) -> bool {
        if record.assignee.as_deref() == Some(self.settings.moderator.as_str()) {
            return true;
        }
        self.collection
            .status_field
            .as_ref()
            .map_or(false, |field| {
                record.custom_field(&field.field) == Some(field.needs_review.as_str())
            })
    }

    // ------------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------------

    /// React to a change notification for record `id`
    pub async fn handle_notification(self: &Arc<Self>, id: &str) -> Result<Outcome> {
        let partial = self.tracker.fetch_record(id, PARTIAL_FIELDS).await?;
        self.handle_record(partial, Trigger::Notification).await
    }

    /// Decide what `record` needs
    ///
    /// For [`Trigger::Scan`] the record must carry [`FULL_FIELDS`]; for
    /// notifications the partial fields suffice.
    pub async fn handle_record(
        self: &Arc<Self>,
        record: Record,
        trigger: Trigger,
    ) -> Result<Outcome> {
        if record.is_subtask() {
            debug!(record_id = %record.id, "Ignoring subtask");
            return Ok(Outcome::Ignored);
        }

        if trigger == Trigger::Debounced {
            return self.reconcile_debounced(&record.id).await;
        }

        let flagged = self.is_flagged(&record);

        let Some(_guard) = self.lock.acquire(&record.id) else {
            debug!(record_id = %record.id, "Record busy, skipping");
            return Ok(Outcome::Busy);
        };

        let record = match trigger {
            Trigger::Scan => record,
            _ => self.tracker.fetch_record(&record.id, FULL_FIELDS).await?,
        };

        if flagged {
            info!(record_id = %record.id, "Record flagged for review");
            return self.parse_and_apply(&record).await.map(Outcome::Applied);
        }

        let quote = Quote::from_record(&record, &self.settings.moderator);
        if !quote.is_stale(&record.input_hash()) {
            debug!(record_id = %record.id, "Record unchanged");
            return Ok(Outcome::Unchanged);
        }

        match trigger {
            Trigger::Scan => self.parse_and_apply(&record).await.map(Outcome::Applied),
            _ => {
                debug!(record_id = %record.id, "Record changed, debouncing");
                self.schedule(&record.id);
                Ok(Outcome::Debounced)
            }
        }
    }

    /// Queue a debounced reconciliation of `id`
    fn schedule(self: &Arc<Self>, id: &str) {
        let moderator: Weak<Self> = Arc::downgrade(self);
        let key = id.to_string();
        self.scheduler.enqueue(
            id,
            scheduler::job(move || {
                let moderator = moderator.clone();
                let id = key.clone();
                async move {
                    let Some(moderator) = moderator.upgrade() else {
                        return;
                    };
                    match moderator.reconcile_debounced(&id).await {
                        Ok(outcome) => {
                            debug!(record_id = %id, ?outcome, "Debounced reconciliation done")
                        }
                        Err(e) => warn!(
                            record_id = %id,
                            error = %e,
                            transient = e.is_transient(),
                            "Debounced reconciliation failed"
                        ),
                    }
                }
            }),
        );
    }

    /// Quiet period elapsed: fetch again and moderate if still changed
    async fn reconcile_debounced(self: &Arc<Self>, id: &str) -> Result<Outcome> {
        let Some(_guard) = self.lock.acquire(id) else {
            debug!(record_id = %id, "Record busy at debounce, skipping");
            return Ok(Outcome::Busy);
        };

        let record = self.tracker.fetch_record(id, FULL_FIELDS).await?;
        if record.is_subtask() {
            return Ok(Outcome::Ignored);
        }

        let quote = Quote::from_record(&record, &self.settings.moderator);
        if !quote.is_stale(&record.input_hash()) {
            debug!(record_id = %id, "Record settled unchanged");
            return Ok(Outcome::Unchanged);
        }

        self.parse_and_apply(&record).await.map(Outcome::Applied)
    }

    /// Parse `record` and write the verdict; caller holds the lock
    async fn parse_and_apply(&self, record: &Record) -> Result<QuoteStatus> {
        let mut quote = Quote::from_record(record, &self.settings.moderator);
        quote.mark_modified();

        let hash = record.input_hash();
        let outcome = parser::parse_record(record, self.collection.quote_type);
        let policy = VerdictPolicy {
            moderator: &self.settings.moderator,
            helper: &self.settings.helper,
            helper_threshold: self.settings.helper_threshold,
            collection: &self.collection,
        };
        let plan = verdict::plan_verdict(&mut quote, record, outcome, hash, &policy)?;

        self.tracker.update_record(&record.id, &plan.update).await?;
        self.tracker.add_comment(&record.id, &plan.comment).await?;
        if let Some(helper) = &plan.follower {
            self.tracker.add_follower(&record.id, helper).await?;
            info!(record_id = %record.id, helper = %helper, "Added helper");
        }

        info!(
            record_id = %record.id,
            status = ?plan.status,
            lines = quote.lines.len(),
            num_failures = quote.num_failures,
            "Verdict applied"
        );
        Ok(plan.status)
    }

    // ------------------------------------------------------------------------
    // Collection-wide passes
    // ------------------------------------------------------------------------

    /// Moderate every record in the collection
    ///
    /// Failures on single records are logged and counted; a failure to list
    /// the collection aborts the scan.
    pub async fn initial_scan(self: &Arc<Self>) -> Result<ScanSummary> {
        info!(collection = %self.collection.id, "Scanning collection");
        let mut summary = ScanSummary::default();
        let mut records = self.tracker.list_records(&self.collection.id, FULL_FIELDS);

        while let Some(record) = records.next().await {
            let record = record?;
            summary.seen += 1;
            let id = record.id.clone();
            match self.handle_record(record, Trigger::Scan).await {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    warn!(record_id = %id, error = %e, "Scan failed for record");
                    summary.failed += 1;
                }
            }
        }

        info!(
            collection = %self.collection.id,
            seen = summary.seen,
            valid = summary.valid,
            invalid = summary.invalid,
            unchanged = summary.unchanged,
            failed = summary.failed,
            "Scan complete"
        );
        Ok(summary)
    }

    /// Spawn a handler per distinct record in `events`
    pub fn dispatch(self: &Arc<Self>, events: &[ChangeEvent]) -> usize {
        let mut seen = HashSet::new();
        let mut spawned = 0;
        for event in events.iter().filter(|e| e.concerns_record()) {
            if !seen.insert(event.resource_id.as_str()) {
                continue;
            }
            let moderator = Arc::clone(self);
            let id = event.resource_id.clone();
            tokio::spawn(async move {
                match moderator.handle_notification(&id).await {
                    Ok(outcome) => debug!(record_id = %id, ?outcome, "Notification handled"),
                    Err(e) => warn!(
                        record_id = %id,
                        error = %e,
                        transient = e.is_transient(),
                        "Notification failed"
                    ),
                }
            });
            spawned += 1;
        }
        spawned
    }

    /// Obtain a sync token for the event feed
    async fn fresh_sync_token(&self) -> Option<String> {
        match self.tracker.poll_events(&self.collection.id, None).await {
            Err(Error::SyncExpired(token)) => Some(token),
            Ok(batch) => Some(batch.sync),
            Err(e) => {
                warn!(collection = %self.collection.id, error = %e, "Could not obtain sync token");
                None
            }
        }
    }

    /// Scan, then follow the event feed until `shutdown` fires
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        // Token first so edits made during the scan are not missed
        let mut sync = self.fresh_sync_token().await;

        if let Err(e) = self.initial_scan().await {
            warn!(collection = %self.collection.id, error = %e, "Initial scan failed");
        }

        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let Some(token) = sync.clone() else {
                sync = self.fresh_sync_token().await;
                continue;
            };

            match self.tracker.poll_events(&self.collection.id, Some(&token)).await {
                Ok(batch) => {
                    sync = Some(batch.sync);
                    let spawned = self.dispatch(&batch.events);
                    if spawned > 0 {
                        debug!(
                            collection = %self.collection.id,
                            spawned,
                            "Dispatched notifications"
                        );
                    }
                }
                Err(Error::SyncExpired(fresh)) => {
                    warn!(collection = %self.collection.id, "Sync token expired, rescanning");
                    sync = Some(fresh);
                    if let Err(e) = self.initial_scan().await {
                        warn!(collection = %self.collection.id, error = %e, "Rescan failed");
                    }
                }
                Err(e) => {
                    warn!(collection = %self.collection.id, error = %e, "Event poll failed");
                }
            }
        }

        self.scheduler.cancel_pending();
        info!(collection = %self.collection.id, "Moderator stopped");
        Ok(())
    }
}
