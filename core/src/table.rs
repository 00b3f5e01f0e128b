//! Tabular Synchronizer: the polled report table and its model results.
//!
//! Per polling cycle: Idle → Fetching → Success (replace the row set)
//! or Failure (keep the last good rows, record the error).
//!
//! The filter is applied client-side on every read against the full
//! fetched set, so changing it never needs a round trip and never touches
//! the fetched rows or the model-result mapping.

use crate::{
    error::{ConsoleError, ConsoleResult},
    scoring::{self, MergeStats, ModelResult, ModelResultMap, ScoringItem},
    types::{Category, LooseBatch, ReportId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const NO_RESULT_PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportPayload {
    pub text:  Option<String>,
    pub url:   Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub id: ReportId,
    #[serde(rename = "type")]
    pub category: Category,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub payload: ReportPayload,
    pub created_at: DateTime<Utc>,
}

impl ReportRow {
    /// The category-specific field: message text, link or phone number.
    /// Blank values count as missing.
    pub fn payload_text(&self) -> Option<&str> {
        let field = match self.category {
            Category::Sms  => self.payload.text.as_deref(),
            Category::Url  => self.payload.url.as_deref(),
            Category::Voip => self.payload.phone.as_deref(),
        };
        field.filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(&self, row: &ReportRow) -> bool {
        match self {
            Self::All => true,
            Self::Only(category) => row.category == *category,
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse::<Category>()
            .map(Self::Only)
            .map_err(|_| ConsoleError::UnknownFilter(s.to_string()))
    }
}

impl TryFrom<String> for CategoryFilter {
    type Error = ConsoleError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CategoryFilter> for String {
    fn from(filter: CategoryFilter) -> Self {
        filter.to_string()
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(category) => f.write_str(category.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Fetching { in_flight: usize },
}

/// What a completed fetch did to the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchApplied {
    /// `rejected` counts records in the response that did not decode.
    Replaced { total: usize, visible: usize, rejected: usize },
    /// A newer response was already applied; this one was dropped.
    Stale,
    Failed { reason: String },
}

/// A fetched row joined with its model result, if any.
#[derive(Debug, Clone, Copy)]
pub struct DisplayRow<'a> {
    pub row:    &'a ReportRow,
    pub result: Option<&'a ModelResult>,
}

impl<'a> DisplayRow<'a> {
    pub fn category_label(&self) -> &'static str {
        self.row.category.label()
    }

    pub fn payload_text(&self) -> &'a str {
        self.row.payload_text().unwrap_or("")
    }

    pub fn created_label(&self) -> String {
        self.row.created_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    pub fn prediction_label(&self) -> &'a str {
        self.result
            .map(|r| r.predicted_label.as_str())
            .filter(|label| !label.is_empty())
            .unwrap_or(NO_RESULT_PLACEHOLDER)
    }

    pub fn score_label(&self) -> String {
        match self.result {
            Some(r) if r.score.is_finite() => format!("{:.2}", r.score),
            _ => NO_RESULT_PLACEHOLDER.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct TableSync {
    rows:          Vec<ReportRow>,
    filter:        CategoryFilter,
    results:       ModelResultMap,
    in_flight:     usize,
    issued:        u64,
    applied:       u64,
    discard_stale: bool,
    rejected:      usize,
    last_error:    Option<String>,
}

impl TableSync {
    pub fn new(discard_stale: bool) -> Self {
        Self {
            rows:          Vec::new(),
            filter:        CategoryFilter::All,
            results:       ModelResultMap::new(),
            in_flight:     0,
            issued:        0,
            applied:       0,
            discard_stale,
            rejected:      0,
            last_error:    None,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        if self.in_flight == 0 {
            SyncPhase::Idle
        } else {
            SyncPhase::Fetching { in_flight: self.in_flight }
        }
    }

    /// Mark a request as issued and return its generation token.
    pub fn begin_fetch(&mut self) -> u64 {
        self.issued += 1;
        self.in_flight += 1;
        self.issued
    }

    /// Apply the response for request `generation`. Without stale
    /// discarding, whichever response resolves last wins.
    pub fn complete_fetch(
        &mut self,
        generation: u64,
        outcome: ConsoleResult<Vec<ReportRow>>,
    ) -> FetchApplied {
        self.complete_batch(generation, outcome.map(LooseBatch::from))
    }

    /// As `complete_fetch`, for a response decoded record by record.
    /// A failure older than the rows on display is reported but does not
    /// set `last_error`.
    pub fn complete_batch(
        &mut self,
        generation: u64,
        outcome: ConsoleResult<LooseBatch<ReportRow>>,
    ) -> FetchApplied {
        self.in_flight = self.in_flight.saturating_sub(1);

        if self.discard_stale && generation < self.applied {
            log::debug!("rows: dropping response {generation}, {} already applied", self.applied);
            return FetchApplied::Stale;
        }

        match outcome {
            Ok(batch) => {
                if batch.rejected > 0 {
                    log::warn!("rows: fetch {generation} had {} undecodable rows", batch.rejected);
                }
                self.rows = batch.records;
                self.rejected = batch.rejected;
                self.applied = generation;
                self.last_error = None;
                FetchApplied::Replaced {
                    total:    self.rows.len(),
                    visible:  self.visible_count(),
                    rejected: batch.rejected,
                }
            }
            Err(e) => {
                let reason = e.to_string();
                log::warn!("rows: fetch {generation} failed, keeping {} rows: {reason}", self.rows.len());
                if generation >= self.applied {
                    self.last_error = Some(reason.clone());
                }
                FetchApplied::Failed { reason }
            }
        }
    }

    pub fn filter(&self) -> CategoryFilter {
        self.filter
    }

    /// Switch the filter. Returns how many rows are now visible.
    pub fn set_filter(&mut self, filter: CategoryFilter) -> usize {
        self.filter = filter;
        self.visible_count()
    }

    /// The full unfiltered set from the last successful fetch.
    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn visible_rows(&self) -> impl Iterator<Item = &ReportRow> {
        let filter = self.filter;
        self.rows.iter().filter(move |row| filter.matches(row))
    }

    pub fn visible_count(&self) -> usize {
        self.visible_rows().count()
    }

    /// Visible rows left-joined with the model-result mapping.
    pub fn display_rows(&self) -> Vec<DisplayRow<'_>> {
        self.visible_rows()
            .map(|row| DisplayRow { row, result: self.results.get(&row.id) })
            .collect()
    }

    pub fn scoring_items(&self) -> Vec<ScoringItem> {
        scoring::extract_items(self.visible_rows())
    }

    pub fn merge_results(&mut self, batch: impl IntoIterator<Item = ModelResult>) -> MergeStats {
        self.results.merge(batch)
    }

    pub fn results(&self) -> &ModelResultMap {
        &self.results
    }

    /// Undecodable records dropped from the rows on display.
    pub fn rejected_rows(&self) -> usize {
        self.rejected
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
