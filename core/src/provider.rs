//! Collaborator seams: the point feed, the report API and the scoring API.
//!
//! Providers answer immediately with a `Pending` carrying the simulated
//! round-trip latency; the engine delivers the outcome that many
//! milliseconds later on its event loop. Requests therefore overlap and
//! can resolve out of order, exactly like fire-and-forget fetches.

use crate::{
    error::ConsoleResult,
    overlay::GeoPoint,
    scoring::{ScoringItem, ScoringReply},
    table::ReportRow,
    types::{Category, Millis},
};

pub struct Pending<T> {
    pub latency: Millis,
    pub outcome: ConsoleResult<T>,
}

impl<T> Pending<T> {
    pub fn ready(outcome: ConsoleResult<T>) -> Self {
        Self { latency: 0, outcome }
    }

    pub fn after(latency: Millis, outcome: ConsoleResult<T>) -> Self {
        Self { latency, outcome }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportQuery {
    /// The console always asks for the unfiltered superset (`None`).
    pub category: Option<Category>,
    pub limit: usize,
}

pub trait PointProvider {
    fn fetch_points(&mut self) -> Pending<Vec<GeoPoint>>;
}

pub trait ReportProvider {
    fn fetch_reports(&mut self, query: &ReportQuery) -> Pending<Vec<ReportRow>>;
}

pub trait ScoringProvider {
    fn score_batch(&mut self, items: &[ScoringItem]) -> Pending<ScoringReply>;
}

/// The three collaborators a mounted view polls.
pub struct Providers {
    pub points:  Box<dyn PointProvider>,
    pub reports: Box<dyn ReportProvider>,
    pub scoring: Box<dyn ScoringProvider>,
}
