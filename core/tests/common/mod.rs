//! Shared fixtures: scripted collaborators and row/point builders.
//!
//! A `Script` answers each request with the next queued `Pending`; once the
//! queue is empty it answers `Ok(fallback)` immediately (empty unless set).
//! Clones share state, so a test keeps one handle while the engine owns the
//! other.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use rakshasutra_core::{
    config::ConsoleConfig,
    console::ConsoleEngine,
    error::ConsoleResult,
    geo::Size,
    overlay::GeoPoint,
    provider::{Pending, PointProvider, Providers, ReportProvider, ReportQuery, ScoringProvider},
    scoring::{ModelResult, ScoringItem, ScoringReply},
    surface::Container,
    table::{ReportPayload, ReportRow},
    types::{Category, Millis, ReportId},
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub const CONTAINER_ID: &str = "map";

struct ScriptState<T> {
    queue:    VecDeque<Pending<T>>,
    fallback: T,
    calls:    usize,
    queries:  Vec<ReportQuery>,
    batches:  Vec<Vec<ScoringItem>>,
}

pub struct Script<T> {
    state: Rc<RefCell<ScriptState<T>>>,
}

impl<T> Clone for Script<T> {
    fn clone(&self) -> Self {
        Self { state: Rc::clone(&self.state) }
    }
}

impl<T: Clone + Default> Script<T> {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(ScriptState {
                queue:    VecDeque::new(),
                fallback: T::default(),
                calls:    0,
                queries:  Vec::new(),
                batches:  Vec::new(),
            })),
        }
    }

    pub fn push(&self, latency: Millis, outcome: ConsoleResult<T>) {
        self.state.borrow_mut().queue.push_back(Pending::after(latency, outcome));
    }

    /// Answer every unscripted request with `value`.
    pub fn set_fallback(&self, value: T) {
        self.state.borrow_mut().fallback = value;
    }

    pub fn calls(&self) -> usize {
        self.state.borrow().calls
    }

    pub fn queries(&self) -> Vec<ReportQuery> {
        self.state.borrow().queries.clone()
    }

    pub fn batches(&self) -> Vec<Vec<ScoringItem>> {
        self.state.borrow().batches.clone()
    }

    fn next(&self) -> Pending<T> {
        let mut state = self.state.borrow_mut();
        state.calls += 1;
        match state.queue.pop_front() {
            Some(pending) => pending,
            None => Pending::ready(Ok(state.fallback.clone())),
        }
    }
}

impl PointProvider for Script<Vec<GeoPoint>> {
    fn fetch_points(&mut self) -> Pending<Vec<GeoPoint>> {
        self.next()
    }
}

impl ReportProvider for Script<Vec<ReportRow>> {
    fn fetch_reports(&mut self, query: &ReportQuery) -> Pending<Vec<ReportRow>> {
        self.state.borrow_mut().queries.push(*query);
        self.next()
    }
}

impl ScoringProvider for Script<ScoringReply> {
    fn score_batch(&mut self, items: &[ScoringItem]) -> Pending<ScoringReply> {
        self.state.borrow_mut().batches.push(items.to_vec());
        self.next()
    }
}

/// Test-side handles on the three collaborators.
pub struct Feed {
    pub points:  Script<Vec<GeoPoint>>,
    pub reports: Script<Vec<ReportRow>>,
    pub scoring: Script<ScoringReply>,
}

impl Feed {
    pub fn new() -> Self {
        Self { points: Script::new(), reports: Script::new(), scoring: Script::new() }
    }

    pub fn providers(&self) -> Providers {
        Providers {
            points:  Box::new(self.points.clone()),
            reports: Box::new(self.reports.clone()),
            scoring: Box::new(self.scoring.clone()),
        }
    }
}

// ── Builders ─────────────────────────────────────────────────────────────────

pub fn container() -> Container {
    Container::new(CONTAINER_ID, Size::new(800.0, 600.0))
}

pub fn engine() -> ConsoleEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    ConsoleEngine::build_test().expect("test engine")
}

/// Engine wired to a fresh scripted feed, not yet mounted.
pub fn engine_with_feed() -> (ConsoleEngine, Feed) {
    let feed = Feed::new();
    let engine = engine().with_providers(feed.providers());
    (engine, feed)
}

/// Engine built from `config` and wired to a fresh scripted feed.
pub fn engine_with_config(config: ConsoleConfig) -> (ConsoleEngine, Feed) {
    let _ = env_logger::builder().is_test(true).try_init();
    let feed = Feed::new();
    let engine = ConsoleEngine::build(config)
        .expect("engine")
        .with_providers(feed.providers());
    (engine, feed)
}

/// Mounted engine whose report feed keeps answering with `rows`.
pub fn mounted_with_rows(rows: Vec<ReportRow>) -> (ConsoleEngine, Feed) {
    let (mut engine, feed) = engine_with_feed();
    feed.reports.set_fallback(rows);
    engine.mount(container()).expect("mount");
    engine.flush().expect("first poll");
    (engine, feed)
}

pub fn point(id: u64, lat: f64, lon: f64, category: Category) -> GeoPoint {
    GeoPoint::new(id, lat, lon, category)
}

/// A report row whose category-specific field holds `value` (None = empty).
pub fn row(id: u64, category: Category, value: Option<&str>) -> ReportRow {
    let value = value.map(str::to_string);
    let payload = match category {
        Category::Sms  => ReportPayload { text: value, ..Default::default() },
        Category::Url  => ReportPayload { url: value, ..Default::default() },
        Category::Voip => ReportPayload { phone: value, ..Default::default() },
    };
    let created_at = DateTime::<Utc>::from_timestamp(1_735_689_600, 0).expect("epoch")
        + Duration::minutes(id as i64);
    ReportRow {
        id: ReportId::from(id),
        category,
        area: "Palasia".to_string(),
        payload,
        created_at,
    }
}

pub fn result(id: u64, label: &str, score: f64) -> ModelResult {
    ModelResult {
        id: Some(ReportId::from(id)),
        predicted_label: label.to_string(),
        score,
        model_name: "SMS".to_string(),
        model_version: "v1".to_string(),
    }
}

pub fn reply(results: Vec<ModelResult>) -> ScoringReply {
    ScoringReply { results, failure: None }
}

pub fn ids(engine: &ConsoleEngine) -> Vec<String> {
    engine.display_rows().iter().map(|d| d.row.id.to_string()).collect()
}
