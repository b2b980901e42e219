//! The coordinator: owner of the canonical record set and its derived view.
//!
//! RULES:
//!   - Only the coordinator mutates the canonical set, the view, the summary
//!     or the risk result. Lanes reach it through LaneMessages on its inbox.
//!   - The coordinator never waits on a lane to make progress; the host
//!     calls `pump*` to apply whatever has arrived.
//!   - Summary recomputation is debounced. Every view change reschedules it,
//!     so a burst of changes produces one recompute over the final view.
//!   - Analytics completions are accepted only when they are newer than the
//!     last applied result and not older than the current floor.

use crate::{
    analytics_lane::{AnalyticsLane, AnalyticsRequest},
    config::LedgerConfig,
    debounce::Debouncer,
    error::{LedgerError, LedgerResult},
    filter::apply_filters,
    generator::TransactionGenerator,
    insight::SelectionInsight,
    message::{Lane, LaneMessage, LaneSender},
    producer::{BulkGeneration, Producer},
    risk::RiskAnalytics,
    rng::{LaneSlot, RngBank},
    search,
    store::{AddOutcome, StoreLane},
    summary::summarize,
    transaction::{FilterOptions, SortField, SortOrder, Transaction, TransactionSummary},
    types::RequestId,
};
use chrono::Utc;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Whether records reach durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PersistenceStatus {
    /// Backed by SQLite. `path` is `None` for an in-memory database.
    Durable { path: Option<PathBuf> },
    /// The store could not be opened; nothing is persisted.
    MemoryOnly { reason: String },
}

impl PersistenceStatus {
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Durable { .. })
    }
}

/// Read-only snapshot of everything the presentation layer renders.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerView<'a> {
    pub records: &'a [Transaction],
    pub total_count: usize,
    pub summary: &'a TransactionSummary,
    /// Bumped on every summary recompute.
    pub summary_revision: u64,
    pub risk_analytics: Option<&'a RiskAnalytics>,
    pub is_analyzing: bool,
    pub loading: bool,
    pub auto_refresh: Option<Duration>,
    pub persistence: &'a PersistenceStatus,
    pub last_error: Option<&'a str>,
}

pub struct Coordinator {
    config:           LedgerConfig,
    inbox:            Receiver<LaneMessage>,
    outbox:           LaneSender,

    // ── Lanes ──────────────────────────────────────
    store:            Option<StoreLane>,
    persistence:      PersistenceStatus,
    producer:         Producer,
    bulk:             Option<BulkGeneration>,
    analytics:        AnalyticsLane,

    // ── Canonical set and derived state ────────────
    records:          Vec<Transaction>,
    view:             Vec<Transaction>,
    search_term:      String,
    filters:          FilterOptions,
    total_count:      usize,
    summary:          TransactionSummary,
    summary_revision: u64,
    summary_debounce: Debouncer,
    loading:          bool,
    auto_refresh:     Option<Duration>,
    last_error:       Option<String>,

    // ── Analytics sequencing ───────────────────────
    risk:             Option<RiskAnalytics>,
    last_dispatched:  RequestId,
    last_applied:     RequestId,
    analytics_floor:  RequestId,

    // ── Selection ──────────────────────────────────
    selection:        Option<SelectionInsight>,
    selection_count:  u64,
}

impl Coordinator {
    /// Validate the config, start every lane and begin the initial load.
    ///
    /// A store that fails to open is not fatal: the coordinator continues
    /// in memory-only mode and reports it through `PersistenceStatus`.
    pub fn start(config: LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;

        let (outbox, inbox) = mpsc::channel();
        let bank = RngBank::from_config(config.generation.seed);
        log::info!("coordinator starting (seed={})", bank.master_seed());

        let (store, persistence) = match StoreLane::spawn(config.store.clone(), outbox.clone()) {
            Ok(lane) => {
                let path = config.store.path.clone();
                (Some(lane), PersistenceStatus::Durable { path })
            }
            Err(err) => {
                log::error!("store unavailable, running memory-only: {err}");
                (None, PersistenceStatus::MemoryOnly { reason: err.to_string() })
            }
        };

        let producer = Producer::new(
            bank,
            config.preferences.currency.clone(),
            config.refresh.batch_size,
            outbox.clone(),
        );
        let analytics = AnalyticsLane::spawn(outbox.clone())?;

        let mut coordinator = Self {
            summary_debounce: Debouncer::new(config.refresh.summary_debounce()),
            config,
            inbox,
            outbox,
            store,
            persistence,
            producer,
            bulk: None,
            analytics,
            records: Vec::new(),
            view: Vec::new(),
            search_term: String::new(),
            filters: FilterOptions::default(),
            total_count: 0,
            summary: TransactionSummary::default(),
            summary_revision: 0,
            loading: true,
            auto_refresh: None,
            last_error: None,
            risk: None,
            last_dispatched: RequestId(0),
            last_applied: RequestId(0),
            analytics_floor: RequestId(0),
            selection: None,
            selection_count: 0,
        };

        coordinator.initial_load(&bank)?;
        if coordinator.config.refresh.auto_start {
            let interval = coordinator.config.refresh.interval();
            coordinator.producer.start(interval)?;
        }
        Ok(coordinator)
    }

    fn initial_load(&mut self, bank: &RngBank) -> LedgerResult<()> {
        let stored = match &self.store {
            Some(store) => store.count()?,
            None => 0,
        };

        if let (Some(store), true) = (&self.store, stored > 0) {
            let page_size = self.config.generation.initial_page_size;
            self.records = store.page(0, page_size, SortField::Timestamp, SortOrder::Desc)?;
            self.total_count = stored;
            self.loading = false;
            log::info!("adopted {} of {stored} stored records", self.records.len());
            self.rederive(Instant::now());
            return Ok(());
        }

        let total = self.config.generation.initial_count;
        if total == 0 {
            self.loading = false;
            return Ok(());
        }
        let generator = TransactionGenerator::new(
            bank.for_lane(LaneSlot::Bulk, 0),
            self.config.preferences.currency.clone(),
        );
        let chunk_size = self.config.generation.chunk_size;
        self.bulk = Some(BulkGeneration::spawn(generator, total, chunk_size, self.outbox.clone())?);
        log::info!("bulk generation of {total} records started (chunk={chunk_size})");
        Ok(())
    }

    // ── Message pump ─────────────────────────────────────────────────────────

    /// Apply every message already in the inbox and any due summary
    /// recompute. Returns the number of messages handled.
    pub fn pump(&mut self) -> usize {
        self.pump_at(Instant::now())
    }

    pub fn pump_at(&mut self, now: Instant) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox.try_recv() {
            self.handle(message, now);
            handled += 1;
        }
        if self.summary_debounce.fire(now) {
            self.recompute_summary();
        }
        handled
    }

    /// Wait up to `timeout` for a message or the pending summary deadline,
    /// then pump. For hosts without their own event loop.
    pub fn pump_blocking(&mut self, timeout: Duration) -> usize {
        let mut wait_until = Instant::now() + timeout;
        if let Some(deadline) = self.summary_debounce.deadline() {
            wait_until = wait_until.min(deadline);
        }
        let wait = wait_until.saturating_duration_since(Instant::now());

        let mut handled = 0;
        match self.inbox.recv_timeout(wait) {
            Ok(message) => {
                self.handle(message, Instant::now());
                handled += 1;
            }
            // The coordinator holds a sender itself, so only timeouts occur.
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {}
        }
        handled + self.pump()
    }

    fn handle(&mut self, message: LaneMessage, now: Instant) {
        match message {
            LaneMessage::TransactionChunk { index, total, records } => {
                if self.bulk.is_none() {
                    log::debug!("dropping chunk {index} from a cancelled generation");
                    return;
                }
                log::debug!("chunk at {index}/{total} ({} records)", records.len());
                self.persist(&records);
                let room = self.config.generation.working_set_limit.saturating_sub(self.records.len());
                self.records.extend(records.into_iter().take(room));
                if !self.persistence.is_durable() {
                    self.total_count = self.records.len();
                }
                self.loading = false;
                self.rederive(now);
            }
            LaneMessage::GenerationCompleted { total } => {
                log::info!("bulk generation complete ({total} records)");
                self.bulk = None;
                self.loading = false;
            }
            LaneMessage::NewTransactions { records, generated_at } => {
                log::debug!("{} new records generated at {generated_at}", records.len());
                self.persist(&records);
                let mut merged = records;
                merged.append(&mut self.records);
                merged.truncate(self.config.generation.working_set_limit);
                self.records = merged;
                if !self.persistence.is_durable() {
                    self.total_count = self.records.len();
                }
                self.rederive(now);
            }
            LaneMessage::PollingStarted { interval } => {
                self.auto_refresh = Some(interval);
            }
            LaneMessage::PollingStopped => {
                self.auto_refresh = None;
            }
            LaneMessage::BatchStored { batch_id, outcome } => {
                self.apply_stored(batch_id, outcome);
            }
            LaneMessage::AnalyticsCompleted { request_id, analytics } => {
                if request_id < self.analytics_floor || request_id <= self.last_applied {
                    log::debug!("discarding stale analytics {request_id}");
                    return;
                }
                self.last_applied = request_id;
                self.risk = Some(analytics);
            }
            LaneMessage::AnalyticsFailed { request_id, error } => {
                if request_id > self.last_applied {
                    self.last_applied = request_id;
                }
                self.record_failure(Lane::Analytics, error);
            }
            LaneMessage::LaneFailed { lane, error } => {
                self.record_failure(lane, error.clone());
                if lane == Lane::Store {
                    self.fall_back_to_memory(error);
                }
            }
        }
    }

    fn apply_stored(&mut self, batch_id: u64, outcome: AddOutcome) {
        if !self.persistence.is_durable() {
            return;
        }
        if outcome.evicted > 0 {
            log::debug!("batch {batch_id}: evicted {} oldest records", outcome.evicted);
        }
        self.total_count = outcome.count;
    }

    fn record_failure(&mut self, lane: Lane, error: String) {
        log::warn!("{lane} lane failed: {error}");
        self.last_error = Some(format!("{lane}: {error}"));
    }

    /// Hand records to the store lane. A lane that has gone away drops the
    /// coordinator to memory-only mode.
    fn persist(&mut self, records: &[Transaction]) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        if let Err(err) = store.submit(records.to_vec()) {
            self.fall_back_to_memory(err.to_string());
        }
    }

    /// Stop persisting. The working set becomes the whole collection.
    fn fall_back_to_memory(&mut self, reason: String) {
        log::error!("store unusable, switching to memory-only: {reason}");
        if let Some(mut store) = self.store.take() {
            store.shutdown();
        }
        self.persistence = PersistenceStatus::MemoryOnly { reason };
        self.total_count = self.records.len();
    }

    // ── Derivation ───────────────────────────────────────────────────────────

    fn effective_search(&self) -> &str {
        if self.search_term.trim().is_empty() {
            self.filters.search_constraint().unwrap_or("")
        } else {
            &self.search_term
        }
    }

    fn rederive(&mut self, now: Instant) {
        let term = self.effective_search().to_string();
        self.view = if term.is_empty() && !self.filters.is_active() {
            self.records.clone()
        } else {
            apply_filters(&self.records, &self.filters, &term)
        };
        self.summary_debounce.schedule(now);
    }

    fn recompute_summary(&mut self) {
        self.summary = summarize(&self.view);
        self.summary_revision += 1;
        log::debug!(
            "summary r{}: {} records, total={:.2}",
            self.summary_revision,
            self.summary.total_transactions,
            self.summary.total_amount
        );
        self.dispatch_analytics();
    }

    fn dispatch_analytics(&mut self) {
        if self.view.len() <= self.config.analytics.threshold {
            if self.risk.is_some() || self.is_analyzing() {
                log::debug!("view below analytics threshold, clearing risk");
            }
            self.risk = None;
            self.analytics_floor = self.last_dispatched.next();
            return;
        }

        let request_id = self.last_dispatched.next();
        let records = self
            .view
            .iter()
            .take(self.config.analytics.max_analyzed)
            .cloned()
            .collect();
        if self.analytics.dispatch(AnalyticsRequest { request_id, records }) {
            self.last_dispatched = request_id;
        } else {
            self.record_failure(Lane::Analytics, "lane is not running".to_string());
        }
    }

    fn is_analyzing(&self) -> bool {
        self.last_dispatched > self.last_applied && self.last_dispatched >= self.analytics_floor
    }

    // ── Presentation API ─────────────────────────────────────────────────────

    pub fn view(&self) -> LedgerView<'_> {
        LedgerView {
            records: &self.view,
            total_count: self.total_count,
            summary: &self.summary,
            summary_revision: self.summary_revision,
            risk_analytics: self.risk.as_ref(),
            is_analyzing: self.is_analyzing(),
            loading: self.loading,
            auto_refresh: self.auto_refresh,
            persistence: &self.persistence,
            last_error: self.last_error.as_deref(),
        }
    }

    pub fn records(&self) -> &[Transaction] {
        &self.records
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn filters(&self) -> &FilterOptions {
        &self.filters
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
        self.rederive(Instant::now());
    }

    pub fn set_filters(&mut self, filters: FilterOptions) {
        self.filters = filters;
        self.rederive(Instant::now());
    }

    /// Ranked completions for a partially typed search term.
    pub fn suggestions(&self, term: &str) -> Vec<&'static str> {
        search::suggest(term)
    }

    pub fn refresh_now(&mut self) -> LedgerResult<()> {
        self.producer.generate_now()?;
        Ok(())
    }

    pub fn start_auto_refresh(&mut self, interval_ms: u64) -> LedgerResult<()> {
        if interval_ms < 100 {
            return Err(LedgerError::InvalidConfig {
                field: "refresh.interval_ms",
                reason: format!("{interval_ms} must be >= 100"),
            });
        }
        self.producer.start(Duration::from_millis(interval_ms))?;
        Ok(())
    }

    pub fn stop_auto_refresh(&mut self) {
        self.producer.stop();
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.producer.is_running()
    }

    /// Record a selection and count its neighbours in the canonical set.
    pub fn on_record_selected(&mut self, record: &Transaction) -> &SelectionInsight {
        self.selection_count += 1;
        log::debug!("selected {} (#{})", record.id, self.selection_count);
        let insight = SelectionInsight::compute(record, &self.records, self.selection_count, Utc::now());
        self.selection.insert(insight)
    }

    pub fn selection(&self) -> Option<&SelectionInsight> {
        self.selection.as_ref()
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// A sender onto the coordinator inbox, for hosts that feed batches in.
    pub fn sender(&self) -> LaneSender {
        self.outbox.clone()
    }

    // ── Paging & lookup ──────────────────────────────────────────────────────

    /// Read one page of stored records. In memory-only mode the page is
    /// cut from the sorted canonical set instead.
    pub fn fetch_page(
        &self,
        offset: usize,
        limit: usize,
        field: SortField,
        order: SortOrder,
    ) -> LedgerResult<Vec<Transaction>> {
        if let Some(store) = &self.store {
            return store.page(offset, limit, field, order);
        }
        let mut sorted = self.records.clone();
        sorted.sort_by(|a, b| {
            let primary = match field {
                SortField::Timestamp => a.timestamp.cmp(&b.timestamp),
                SortField::Amount => a.amount.partial_cmp(&b.amount).unwrap_or(Ordering::Equal),
            };
            let ordering = primary.then_with(|| a.id.cmp(&b.id));
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        Ok(sorted.into_iter().skip(offset).take(limit).collect())
    }

    /// Page `page_index` (zero-based) using the configured page size and order.
    pub fn fetch_default_page(&self, page_index: usize) -> LedgerResult<Vec<Transaction>> {
        let per_page = self.config.preferences.items_per_page;
        let offset = page_index
            .checked_mul(per_page)
            .ok_or(LedgerError::PageOutOfRange { page: page_index })?;
        self.fetch_page(
            offset,
            per_page,
            SortField::Timestamp,
            self.config.preferences.sort_order,
        )
    }

    /// Text search across every stored record, not just the working set.
    pub fn search_stored(&self, query: &str) -> LedgerResult<Vec<Transaction>> {
        if let Some(store) = &self.store {
            return store.search(query, None);
        }
        let mut hits = search::search(&self.records, query);
        hits.truncate(self.config.store.search_limit());
        Ok(hits)
    }

    // ── Teardown ─────────────────────────────────────────────────────────────

    /// Stop every lane. Queued store writes are flushed before the
    /// connection closes.
    pub fn shutdown(self) {
        drop(self);
    }

    fn teardown(&mut self) {
        self.producer.stop();
        if let Some(mut bulk) = self.bulk.take() {
            bulk.cancel();
        }
        self.analytics.shutdown();
        if let Some(mut store) = self.store.take() {
            store.shutdown();
        }
        log::info!("coordinator stopped");
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.teardown();
    }
}
