//! Synthetic collaborators for the headless runner and for tests.
//!
//! All three streams are deterministic for a given seed. The point feed
//! deliberately mixes in points with junk coordinates, the report feed
//! grows over time and includes rows with nothing to score, and every
//! stream fails occasionally.

use crate::{
    error::ConsoleError,
    geo::LatLng,
    overlay::GeoPoint,
    provider::{Pending, PointProvider, Providers, ReportProvider, ReportQuery, ScoringProvider},
    rng::{FeedBank, FeedRng, StreamSlot},
    scoring::{ModelResult, ScoringItem, ScoringReply},
    table::{ReportPayload, ReportRow},
    types::{Category, ReportId, StreamKind},
};
use chrono::{DateTime, Duration, Utc};

// ── Constants ────────────────────────────────────────────────────────────────

const AREAS: &[&str] = &[
    "Vijay Nagar", "Rajwada", "Palasia", "Bhawarkuan", "Sudama Nagar", "Khajrana",
];
const SMS_TEXTS: &[&str] = &[
    "Your KYC is pending, click to update or account will be blocked",
    "You won Rs 25,00,000 in lucky draw, share OTP to claim",
    "Electricity bill overdue, call this number tonight",
];
const URLS: &[&str] = &[
    "http://sbi-kyc-update.example/login",
    "https://free-recharge.example/claim",
    "http://parcel-track.example/pay",
];

const POINT_SPREAD_DEG: f64 = 0.08;
const JUNK_RATE: f64 = 0.10;
const EMPTY_PAYLOAD_RATE: f64 = 0.10;
const FAILURE_RATE: f64 = 0.05;
const PARTIAL_FAILURE_RATE: f64 = 0.10;
const FEED_EPOCH_SECS: i64 = 1_735_689_600; // 2025-01-01T00:00:00Z

fn feed_failure(stream: StreamKind) -> ConsoleError {
    ConsoleError::Fetch { stream, reason: "synthetic upstream error (503)".into() }
}

// ── Points ───────────────────────────────────────────────────────────────────

pub struct SyntheticPoints {
    rng:     FeedRng,
    center:  LatLng,
    next_id: u64,
}

impl PointProvider for SyntheticPoints {
    fn fetch_points(&mut self) -> Pending<Vec<GeoPoint>> {
        let latency = self.rng.between(40, 400);
        if self.rng.chance(FAILURE_RATE) {
            return Pending::after(latency, Err(feed_failure(StreamKind::Points)));
        }

        let count = self.rng.between(5, 25);
        let mut batch = Vec::with_capacity(count as usize);
        for _ in 0..count {
            self.next_id += 1;
            let mut lat = self.center.lat + self.rng.jitter(POINT_SPREAD_DEG);
            let mut lon = self.center.lon + self.rng.jitter(POINT_SPREAD_DEG);
            if self.rng.chance(JUNK_RATE) {
                if self.rng.chance(0.5) { lat = f64::NAN } else { lon = f64::INFINITY }
            }
            let category = *self.rng.pick(&Category::ALL);
            batch.push(GeoPoint::new(self.next_id, lat, lon, category));
        }
        Pending::after(latency, Ok(batch))
    }
}

// ── Reports ──────────────────────────────────────────────────────────────────

pub struct SyntheticReports {
    rng:     FeedRng,
    reports: Vec<ReportRow>,
    next_id: u64,
}

impl SyntheticReports {
    fn new_report(&mut self) -> ReportRow {
        self.next_id += 1;
        let category = *self.rng.pick(&Category::ALL);
        let mut payload = ReportPayload::default();
        if !self.rng.chance(EMPTY_PAYLOAD_RATE) {
            match category {
                Category::Sms  => payload.text = Some(self.rng.pick(SMS_TEXTS).to_string()),
                Category::Url  => payload.url = Some(self.rng.pick(URLS).to_string()),
                Category::Voip => {
                    payload.phone = Some(format!("+91 9{:09}", self.rng.next_u64_below(1_000_000_000)))
                }
            }
        }
        let created_at = DateTime::<Utc>::from_timestamp(FEED_EPOCH_SECS, 0).unwrap_or_default()
            + Duration::minutes(self.next_id as i64 * 7);

        ReportRow {
            id: ReportId::from(self.next_id),
            category,
            area: self.rng.pick(AREAS).to_string(),
            payload,
            created_at,
        }
    }
}

impl ReportProvider for SyntheticReports {
    fn fetch_reports(&mut self, query: &ReportQuery) -> Pending<Vec<ReportRow>> {
        let latency = self.rng.between(40, 600);
        let arrivals = self.rng.between(0, 3);
        for _ in 0..arrivals {
            let report = self.new_report();
            self.reports.push(report);
        }
        if self.rng.chance(FAILURE_RATE) {
            return Pending::after(latency, Err(feed_failure(StreamKind::Rows)));
        }

        // Newest first, like the report API.
        let page = self
            .reports
            .iter()
            .rev()
            .filter(|r| query.category.map_or(true, |c| r.category == c))
            .take(query.limit)
            .cloned()
            .collect();
        Pending::after(latency, Ok(page))
    }
}

// ── Scoring ──────────────────────────────────────────────────────────────────

pub struct SyntheticScorer {
    rng: FeedRng,
}

impl SyntheticScorer {
    fn labels(category: Category) -> (&'static str, &'static str) {
        match category {
            Category::Sms  => ("spam", "ham"),
            Category::Url  => ("phishing", "benign"),
            Category::Voip => ("fraud", "legit"),
        }
    }
}

impl ScoringProvider for SyntheticScorer {
    fn score_batch(&mut self, items: &[ScoringItem]) -> Pending<ScoringReply> {
        let latency = self.rng.between(150, 900);
        if self.rng.chance(FAILURE_RATE) {
            return Pending::after(latency, Err(ConsoleError::Scoring("synthetic model outage".into())));
        }

        let mut results: Vec<ModelResult> = items
            .iter()
            .map(|item| {
                let p_bad = self.rng.next_f64();
                let (bad, good) = Self::labels(item.category);
                let (label, score) = if p_bad >= 0.5 { (bad, p_bad) } else { (good, 1.0 - p_bad) };
                ModelResult {
                    id: Some(item.id.clone()),
                    predicted_label: label.to_string(),
                    score,
                    model_name: item.category.label().to_string(),
                    model_version: "v1".to_string(),
                }
            })
            .collect();

        let mut failure = None;
        if results.len() > 1 && self.rng.chance(PARTIAL_FAILURE_RATE) {
            results.truncate(results.len() / 2);
            failure = Some("model worker timed out on part of the batch".to_string());
        }
        Pending::after(latency, Ok(ScoringReply { results, failure }))
    }
}

/// Wire all three synthetic streams from one seed.
pub fn synthetic_providers(seed: u64, center: LatLng) -> Providers {
    let bank = FeedBank::new(seed);
    Providers {
        points: Box::new(SyntheticPoints {
            rng: bank.for_stream(StreamSlot::Points),
            center,
            next_id: 0,
        }),
        reports: Box::new(SyntheticReports {
            rng: bank.for_stream(StreamSlot::Reports),
            reports: Vec::new(),
            next_id: 0,
        }),
        scoring: Box::new(SyntheticScorer { rng: bank.for_stream(StreamSlot::Scoring) }),
    }
}
