//! The console engine: owns the mounted map view and both data streams.
//!
//! LIFECYCLE:
//!   mount   → surface created, resize observation attached, journal session
//!             opened, one immediate poll per stream, interval timers armed.
//!   unmount → timers cleared, observation detached, surface destroyed,
//!             session closed. Responses already in flight still arrive but
//!             their effect is suppressed.
//!
//! RULES:
//!   - One thread, one task at a time. Timer and delivery callbacks never
//!     interleave.
//!   - A points cycle runs validate → clear → insert → fit without yielding.
//!   - Across cycles the last response to resolve wins, unless
//!     `discard_stale_responses` is set.
//!   - The model-result mapping is written only by the scoring handler.

use crate::{
    config::ConsoleConfig,
    error::{ConsoleError, ConsoleResult},
    event::{ConsoleEvent, EventLogEntry, Notice},
    geo::Size,
    overlay::{GeoPoint, OverlayMarker, OverlayReconciler, ReconcileReport},
    provider::{Providers, ReportQuery},
    resize::ResizeAdapter,
    scheduler::{EventLoop, TimerId},
    scoring::ScoringReply,
    store::ConsoleStore,
    surface::{Container, MapSurface, SurfaceManager, ViewChange, Viewport},
    table::{CategoryFilter, DisplayRow, FetchApplied, ReportRow, TableSync},
    types::{LooseBatch, Millis, ReportId, SessionId, StreamKind},
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use uuid::Uuid;

pub const SCORING_FAILED_NOTICE: &str = "Model API failed. Check backend logs and CORS.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    PollPoints,
    PollRows,
    InvalidateLayout,
    Deliver(u64),
}

/// A response on its way back from a collaborator.
enum InFlight {
    Points { epoch: u64, generation: u64, outcome: ConsoleResult<Vec<GeoPoint>> },
    Rows   { epoch: u64, generation: u64, outcome: ConsoleResult<Vec<ReportRow>> },
    Scores { epoch: u64, outcome: ConsoleResult<ScoringReply> },
}

impl InFlight {
    fn epoch(&self) -> u64 {
        match self {
            Self::Points { epoch, .. } | Self::Rows { epoch, .. } | Self::Scores { epoch, .. } => *epoch,
        }
    }

    fn stream(&self) -> StreamKind {
        match self {
            Self::Points { .. } => StreamKind::Points,
            Self::Rows { .. }   => StreamKind::Rows,
            Self::Scores { .. } => StreamKind::Scoring,
        }
    }
}

struct Mount {
    session_id:   SessionId,
    container:    Container,
    poll_timers:  Vec<TimerId>,
    layout_timer: Option<TimerId>,
    journaled:    usize,
}

/// Rows handed to the department-sharing collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareSelection {
    pub row_ids: Vec<ReportId>,
    pub filter:  CategoryFilter,
}

pub struct ConsoleEngine {
    config:            ConsoleConfig,
    events:            EventLoop<Task>,
    surface:           SurfaceManager,
    reconciler:        OverlayReconciler,
    table:             TableSync,
    resize:            ResizeAdapter,
    providers:         Option<Providers>,
    mount:             Option<Mount>,
    epoch:             u64,
    in_flight:         BTreeMap<u64, InFlight>,
    next_delivery:     u64,
    points_issued:     u64,
    points_applied:    u64,
    scoring_in_flight: bool,
    notices:           Vec<Notice>,
    outbox:            Vec<ConsoleEvent>,
    store:             ConsoleStore,
}

impl ConsoleEngine {
    pub fn new(config: ConsoleConfig, store: ConsoleStore) -> Self {
        Self {
            events:            EventLoop::new(),
            surface:           SurfaceManager::new(config.map.clone()),
            reconciler:        OverlayReconciler::new(),
            table:             TableSync::new(config.polling.discard_stale_responses),
            resize:            ResizeAdapter::new(),
            providers:         None,
            mount:             None,
            epoch:             0,
            in_flight:         BTreeMap::new(),
            next_delivery:     0,
            points_issued:     0,
            points_applied:    0,
            scoring_in_flight: false,
            notices:           Vec::new(),
            outbox:            Vec::new(),
            store,
            config,
        }
    }

    /// Validate `config` and build an engine with a migrated in-memory
    /// journal.
    pub fn build(config: ConsoleConfig) -> ConsoleResult<Self> {
        config.validate()?;
        let store = ConsoleStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(config, store))
    }

    /// Test engine: default test config, no providers.
    pub fn build_test() -> ConsoleResult<Self> {
        Self::build(ConsoleConfig::default_test())
    }

    pub fn with_providers(mut self, providers: Providers) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Attach collaborators. Takes effect for polling on the next mount.
    pub fn attach_providers(&mut self, providers: Providers) {
        self.providers = Some(providers);
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Mount the view on `container`. Mounting again on the same container
    /// is a no-op.
    pub fn mount(&mut self, container: Container) -> ConsoleResult<()> {
        if let Some(mount) = &self.mount {
            if mount.container.id != container.id {
                return Err(ConsoleError::AlreadyMounted(mount.container.id.clone()));
            }
            self.surface.create(&mount.container)?;
            return Ok(());
        }

        let (surface_id, size) = {
            let (surface, _) = self.surface.create(&container)?;
            (surface.id(), surface.measured_size())
        };

        let session_id = Uuid::new_v4().to_string();
        let now = self.events.now();
        if let Err(e) = self.store.open_session(&session_id, &container.id, now) {
            log::warn!("mount on '{}' failed, releasing surface: {e}", container.id);
            self.surface.destroy();
            return Err(e);
        }
        match self.store.prune_closed_sessions(self.config.journal.keep_closed_sessions) {
            Ok(0) => {}
            Ok(pruned) => log::debug!("journal: pruned {pruned} entries from closed sessions"),
            Err(e) => log::warn!("journal: pruning closed sessions failed: {e}"),
        }

        self.epoch += 1;
        self.table = TableSync::new(self.config.polling.discard_stale_responses);
        self.scoring_in_flight = false;
        self.points_issued = 0;
        self.points_applied = 0;
        self.resize.observe(&container);

        let mut poll_timers = Vec::new();
        if self.providers.is_some() {
            let polling = &self.config.polling;
            poll_timers.push(self.events.set_timeout(0, Task::PollPoints));
            poll_timers.push(self.events.set_interval(polling.points_interval_ms, Task::PollPoints));
            poll_timers.push(self.events.set_timeout(0, Task::PollRows));
            poll_timers.push(self.events.set_interval(polling.rows_interval_ms, Task::PollRows));
        } else {
            log::debug!("mounted without providers; waiting for host-pushed batches");
        }

        log::info!("view mounted on '{}' (session {session_id})", container.id);
        let container_id = container.id.clone();
        self.mount = Some(Mount {
            session_id: session_id.clone(),
            container,
            poll_timers,
            layout_timer: None,
            journaled: 0,
        });

        self.emit("engine", ConsoleEvent::ViewMounted { at: now, session_id, container_id })?;
        self.emit(
            "surface",
            ConsoleEvent::SurfaceCreated {
                at: now,
                surface_id: surface_id.to_string(),
                width: size.width,
                height: size.height,
            },
        )
    }

    /// Mount and get a guard that unmounts when dropped.
    pub fn mounted(&mut self, container: Container) -> ConsoleResult<MountGuard<'_>> {
        self.mount(container)?;
        Ok(MountGuard { engine: self })
    }

    /// Tear the view down. Returns false if it was not mounted.
    pub fn unmount(&mut self) -> ConsoleResult<bool> {
        let Some(mount) = self.mount.as_mut() else {
            return Ok(false);
        };
        let session_id = mount.session_id.clone();
        let mut timers = std::mem::take(&mut mount.poll_timers);
        timers.extend(mount.layout_timer.take());

        for timer in timers {
            self.events.clear(timer);
        }
        self.resize.detach();

        let now = self.events.now();
        if let Some(surface_id) = self.surface.destroy() {
            self.emit(
                "surface",
                ConsoleEvent::SurfaceDestroyed { at: now, surface_id: surface_id.to_string() },
            )?;
        }
        self.emit("engine", ConsoleEvent::ViewUnmounted { at: now, session_id: session_id.clone() })?;

        self.mount = None;
        self.store.close_session(&session_id, now)?;
        log::info!(
            "view unmounted (session {session_id}, {} responses still in flight)",
            self.in_flight.len()
        );
        Ok(true)
    }

    // ── Host inputs ────────────────────────────────────────────

    /// "Point batch updated": reconcile the overlay against `batch`.
    /// Ignored while unmounted.
    pub fn points_updated(&mut self, batch: Vec<GeoPoint>) -> ConsoleResult<Option<ReconcileReport>> {
        self.points_decoded(batch.into())
    }

    /// As `points_updated`, for a batch decoded record by record. The
    /// undecodable records count as discarded.
    pub fn points_decoded(
        &mut self,
        batch: LooseBatch<GeoPoint>,
    ) -> ConsoleResult<Option<ReconcileReport>> {
        if self.mount.is_none() {
            log::debug!("points batch of {} ignored; view not mounted", batch.received());
            return Ok(None);
        }
        self.points_issued += 1;
        self.apply_points(self.points_issued, Ok(batch))
    }

    /// "Row batch updated": apply one report fetch outcome.
    /// Ignored while unmounted.
    pub fn rows_updated(
        &mut self,
        outcome: ConsoleResult<Vec<ReportRow>>,
    ) -> ConsoleResult<Option<FetchApplied>> {
        self.rows_decoded(outcome.map(LooseBatch::from))
    }

    /// As `rows_updated`, for rows decoded record by record.
    pub fn rows_decoded(
        &mut self,
        outcome: ConsoleResult<LooseBatch<ReportRow>>,
    ) -> ConsoleResult<Option<FetchApplied>> {
        if self.mount.is_none() {
            log::debug!("rows batch ignored; view not mounted");
            return Ok(None);
        }
        let generation = self.table.begin_fetch();
        self.apply_rows(generation, outcome).map(Some)
    }

    /// "Set category filter": instant, client-side, no fetch.
    pub fn set_filter(&mut self, filter: CategoryFilter) -> ConsoleResult<usize> {
        let visible = self.table.set_filter(filter);
        let at = self.events.now();
        self.emit("table", ConsoleEvent::FilterChanged { at, filter: filter.to_string(), visible })?;
        Ok(visible)
    }

    /// "Run scoring": send the visible rows' payloads to the scoring
    /// collaborator. Returns how many items were sent.
    ///
    /// Rejected locally, with a notice and without calling the
    /// collaborator, when no visible row has anything to score.
    pub fn run_scoring(&mut self) -> ConsoleResult<usize> {
        if self.mount.is_none() {
            return Err(ConsoleError::NotMounted);
        }
        if self.scoring_in_flight {
            return Err(ConsoleError::ScoringInFlight);
        }

        let items = self.table.scoring_items();
        let at = self.events.now();
        if items.is_empty() {
            let rejection = ConsoleError::NoScoringRows;
            log::info!("scoring rejected locally: {rejection}");
            self.notices.push(Notice::warning(rejection.to_string()));
            self.emit("table", ConsoleEvent::ScoringRejected { at, reason: rejection.to_string() })?;
            return Err(rejection);
        }

        let providers = self
            .providers
            .as_mut()
            .ok_or(ConsoleError::NoProvider(StreamKind::Scoring))?;
        let pending = providers.scoring.score_batch(&items);

        self.scoring_in_flight = true;
        self.dispatch(pending.latency, InFlight::Scores { epoch: self.epoch, outcome: pending.outcome });
        self.emit("table", ConsoleEvent::ScoringRequested { at, items: items.len() })?;
        Ok(items.len())
    }

    /// The host layout changed the container's size. Returns whether a
    /// deferred layout check was scheduled.
    pub fn container_resized(&mut self, size: Size) -> ConsoleResult<bool> {
        let Some(mount) = self.mount.as_mut() else {
            return Ok(false);
        };
        mount.container.size = size;
        let container = mount.container.clone();

        let at = self.events.now();
        self.emit("resize", ConsoleEvent::ContainerResized { at, width: size.width, height: size.height })?;
        if self.resize.notify(&container) {
            self.schedule_layout_check();
            return Ok(true);
        }
        Ok(false)
    }

    // ── Event loop ─────────────────────────────────────────────

    /// Run every task due within the next `ms` milliseconds and return the
    /// events they produced (plus any emitted since the last drain).
    pub fn advance(&mut self, ms: Millis) -> ConsoleResult<Vec<ConsoleEvent>> {
        let until = self.events.now() + ms;
        while let Some((_, task)) = self.events.pop_due(until) {
            self.run_task(task)?;
        }
        self.events.settle_at(until);
        Ok(self.take_events())
    }

    /// Run the tasks due right now, such as deferred layout checks.
    pub fn flush(&mut self) -> ConsoleResult<Vec<ConsoleEvent>> {
        self.advance(0)
    }

    fn run_task(&mut self, task: Task) -> ConsoleResult<()> {
        match task {
            Task::PollPoints       => self.poll_points(),
            Task::PollRows         => self.poll_rows(),
            Task::InvalidateLayout => self.run_layout_check(),
            Task::Deliver(id)      => self.deliver(id),
        }
    }

    fn poll_points(&mut self) -> ConsoleResult<()> {
        if self.mount.is_none() {
            return Ok(());
        }
        let Some(providers) = self.providers.as_mut() else {
            return Ok(());
        };
        let pending = providers.points.fetch_points();

        self.points_issued += 1;
        let generation = self.points_issued;
        self.dispatch(
            pending.latency,
            InFlight::Points { epoch: self.epoch, generation, outcome: pending.outcome },
        );
        let at = self.events.now();
        self.emit("poller", ConsoleEvent::PollIssued { at, stream: StreamKind::Points, generation })
    }

    fn poll_rows(&mut self) -> ConsoleResult<()> {
        if self.mount.is_none() {
            return Ok(());
        }
        let query = ReportQuery { category: None, limit: self.config.polling.report_limit };
        let Some(providers) = self.providers.as_mut() else {
            return Ok(());
        };
        let pending = providers.reports.fetch_reports(&query);

        let generation = self.table.begin_fetch();
        self.dispatch(
            pending.latency,
            InFlight::Rows { epoch: self.epoch, generation, outcome: pending.outcome },
        );
        let at = self.events.now();
        self.emit("poller", ConsoleEvent::PollIssued { at, stream: StreamKind::Rows, generation })
    }

    fn dispatch(&mut self, latency: Millis, flight: InFlight) {
        self.next_delivery += 1;
        self.in_flight.insert(self.next_delivery, flight);
        self.events.set_timeout(latency, Task::Deliver(self.next_delivery));
    }

    fn deliver(&mut self, id: u64) -> ConsoleResult<()> {
        let Some(flight) = self.in_flight.remove(&id) else {
            return Ok(());
        };

        if self.mount.is_none() || flight.epoch() != self.epoch {
            let stream = flight.stream();
            log::debug!("{stream} response suppressed; its view is gone");
            let at = self.events.now();
            return self.emit("engine", ConsoleEvent::ResponseSuppressed { at, stream });
        }

        match flight {
            InFlight::Points { generation, outcome, .. } => {
                self.apply_points(generation, outcome.map(LooseBatch::from)).map(|_| ())
            }
            InFlight::Rows { generation, outcome, .. } => {
                self.apply_rows(generation, outcome.map(LooseBatch::from)).map(|_| ())
            }
            InFlight::Scores { outcome, .. }             => self.apply_scores(outcome),
        }
    }

    fn apply_points(
        &mut self,
        generation: u64,
        outcome: ConsoleResult<LooseBatch<GeoPoint>>,
    ) -> ConsoleResult<Option<ReconcileReport>> {
        let at = self.events.now();
        if self.config.polling.discard_stale_responses && generation < self.points_applied {
            log::debug!("points: dropping response {generation}, {} already applied", self.points_applied);
            self.emit(
                "overlay",
                ConsoleEvent::StaleResponseDiscarded { at, stream: StreamKind::Points, generation },
            )?;
            return Ok(None);
        }

        let batch = match outcome {
            Ok(batch) => batch,
            Err(e) => {
                log::warn!("points: fetch {generation} failed, keeping current markers: {e}");
                self.emit(
                    "overlay",
                    ConsoleEvent::FetchFailed {
                        at,
                        stream: StreamKind::Points,
                        generation,
                        reason: e.to_string(),
                    },
                )?;
                return Ok(None);
            }
        };

        let report = self.reconciler.reconcile(&mut self.surface, &batch)?;
        self.points_applied = generation;

        self.emit(
            "overlay",
            ConsoleEvent::OverlayReplaced {
                at,
                cycle: report.cycle,
                received: report.received,
                rendered: report.rendered,
                discarded: report.discarded,
            },
        )?;
        match report.view {
            ViewChange::Fitted { viewport } => self.emit(
                "surface",
                ConsoleEvent::ViewportFitted {
                    at,
                    lat: viewport.center.lat,
                    lon: viewport.center.lon,
                    zoom: viewport.zoom,
                },
            )?,
            ViewChange::Reset { viewport } => self.emit(
                "surface",
                ConsoleEvent::ViewportReset {
                    at,
                    lat: viewport.center.lat,
                    lon: viewport.center.lon,
                    zoom: viewport.zoom,
                },
            )?,
            ViewChange::Kept { .. } => {}
        }

        // The overlay may have landed right after a layout change.
        self.schedule_layout_check();
        Ok(Some(report))
    }

    fn apply_rows(
        &mut self,
        generation: u64,
        outcome: ConsoleResult<LooseBatch<ReportRow>>,
    ) -> ConsoleResult<FetchApplied> {
        let applied = self.table.complete_batch(generation, outcome);
        let at = self.events.now();
        let event = match &applied {
            FetchApplied::Replaced { total, visible, rejected } => ConsoleEvent::RowsReplaced {
                at,
                generation,
                total: *total,
                visible: *visible,
                rejected: *rejected,
            },
            FetchApplied::Stale => ConsoleEvent::StaleResponseDiscarded {
                at,
                stream: StreamKind::Rows,
                generation,
            },
            FetchApplied::Failed { reason } => ConsoleEvent::FetchFailed {
                at,
                stream: StreamKind::Rows,
                generation,
                reason: reason.clone(),
            },
        };
        self.emit("table", event)?;
        Ok(applied)
    }

    fn apply_scores(&mut self, outcome: ConsoleResult<ScoringReply>) -> ConsoleResult<()> {
        self.scoring_in_flight = false;
        let at = self.events.now();

        match outcome {
            Ok(reply) => {
                let stats = self.table.merge_results(reply.results);
                log::debug!(
                    "scoring: merged {} results ({} without id), mapping now {}",
                    stats.merged,
                    stats.skipped,
                    self.table.results().len()
                );
                self.emit(
                    "table",
                    ConsoleEvent::ScoringMerged {
                        at,
                        merged: stats.merged,
                        skipped: stats.skipped,
                        mapping_size: self.table.results().len(),
                    },
                )?;
                if let Some(reason) = reply.failure {
                    log::warn!("scoring: partial failure: {reason}");
                    self.notices.push(Notice::error(SCORING_FAILED_NOTICE));
                    self.emit("table", ConsoleEvent::ScoringFailed { at, reason })?;
                }
                Ok(())
            }
            Err(e) => {
                log::warn!("scoring: request failed: {e}");
                self.notices.push(Notice::error(SCORING_FAILED_NOTICE));
                self.emit("table", ConsoleEvent::ScoringFailed { at, reason: e.to_string() })
            }
        }
    }

    /// Queue one deferred layout check unless one is already pending.
    fn schedule_layout_check(&mut self) {
        let Some(mount) = self.mount.as_mut() else {
            return;
        };
        if mount.layout_timer.is_some() {
            return;
        }
        mount.layout_timer = Some(self.events.set_timeout(0, Task::InvalidateLayout));
    }

    fn run_layout_check(&mut self) -> ConsoleResult<()> {
        self.resize.settled();
        let Some(mount) = self.mount.as_mut() else {
            return Ok(());
        };
        mount.layout_timer = None;
        let container = mount.container.clone();

        let changed = self.surface.invalidate_layout(&container);
        let at = self.events.now();
        self.emit(
            "surface",
            ConsoleEvent::LayoutInvalidated {
                at,
                width: container.size.width,
                height: container.size.height,
                changed,
            },
        )
    }

    /// Journal `event` under the open session, pruning the session's oldest
    /// entries past the cap, then queue it for the host.
    fn emit(&mut self, component: &str, event: ConsoleEvent) -> ConsoleResult<()> {
        if let Some(mount) = self.mount.as_mut() {
            let entry = EventLogEntry {
                id:         None,
                session_id: mount.session_id.clone(),
                at:         self.events.now(),
                component:  component.to_string(),
                event_type: event.type_name().to_string(),
                payload:    serde_json::to_string(&event)?,
            };
            self.store.append_event(&entry)?;
            mount.journaled += 1;

            let cap = self.config.journal.max_events_per_session;
            if mount.journaled > cap {
                let pruned = self.store.prune_session(&mount.session_id, cap)?;
                mount.journaled = mount.journaled.saturating_sub(pruned);
            }
        }
        self.outbox.push(event);
        Ok(())
    }

    // ── Read side ──────────────────────────────────────────────

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn now(&self) -> Millis {
        self.events.now()
    }

    pub fn is_mounted(&self) -> bool {
        self.mount.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.mount.as_ref().map(|m| m.session_id.as_str())
    }

    pub fn surface(&self) -> Option<&MapSurface> {
        self.surface.surface()
    }

    pub fn markers(&self) -> &[OverlayMarker] {
        self.surface.markers()
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.surface.surface().map(MapSurface::viewport)
    }

    pub fn table(&self) -> &TableSync {
        &self.table
    }

    pub fn display_rows(&self) -> Vec<DisplayRow<'_>> {
        self.table.display_rows()
    }

    pub fn resize_adapter(&self) -> &ResizeAdapter {
        &self.resize
    }

    pub fn scoring_in_flight(&self) -> bool {
        self.scoring_in_flight
    }

    /// Responses dispatched but not yet delivered.
    pub fn responses_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn overlay_cycles(&self) -> u64 {
        self.reconciler.cycles()
    }

    pub fn share_selection(&self) -> ShareSelection {
        ShareSelection {
            row_ids: self.table.visible_rows().map(|r| r.id.clone()).collect(),
            filter:  self.table.filter(),
        }
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn take_events(&mut self) -> Vec<ConsoleEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub fn store(&self) -> &ConsoleStore {
        &self.store
    }
}

impl Drop for ConsoleEngine {
    fn drop(&mut self) {
        if let Err(e) = self.unmount() {
            log::warn!("unmount during drop failed: {e}");
        }
    }
}

/// Keeps the view mounted for as long as it lives.
pub struct MountGuard<'a> {
    engine: &'a mut ConsoleEngine,
}

impl Deref for MountGuard<'_> {
    type Target = ConsoleEngine;

    fn deref(&self) -> &ConsoleEngine {
        &*self.engine
    }
}

impl DerefMut for MountGuard<'_> {
    fn deref_mut(&mut self) -> &mut ConsoleEngine {
        &mut *self.engine
    }
}

impl Drop for MountGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.engine.unmount() {
            log::warn!("unmount on guard drop failed: {e}");
        }
    }
}
