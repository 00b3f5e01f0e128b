//! Overlay Reconciler: turns each fresh point batch into the marker layer.
//!
//! Every cycle, strictly in this order:
//!   1. Validate coordinates; non-finite points are dropped silently, as
//!      are records that never decoded.
//!   2. Clear the whole overlay layer.
//!   3. Add one category-coloured marker per valid point.
//!   4. Accumulate bounds from the placed markers.
//!   5. Fit the view to those bounds, or fall back to the default view.
//!
//! Full replace, no identity diffing across cycles.

use crate::{
    config::MarkerConfig,
    error::ConsoleResult,
    geo::LatLng,
    surface::{SurfaceManager, ViewChange},
    types::{Category, LooseBatch, ReportId},
};
use serde::{Deserialize, Deserializer, Serialize};

/// One record from the point stream. Coordinates arrive loosely typed and
/// decode to NaN when they are not numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub id: ReportId,
    #[serde(default = "nan", deserialize_with = "loose_coordinate")]
    pub lat: f64,
    #[serde(default = "nan", deserialize_with = "loose_coordinate")]
    pub lon: f64,
    #[serde(rename = "type")]
    pub category: Category,
}

impl GeoPoint {
    pub fn new(id: impl Into<ReportId>, lat: f64, lon: f64, category: Category) -> Self {
        Self { id: id.into(), lat, lon, category }
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lon)
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

fn nan() -> f64 {
    f64::NAN
}

/// Numbers pass through, numeric strings are parsed, anything else is NaN.
fn loose_coordinate<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(match raw {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerStyle {
    pub color:        String,
    pub radius:       f64,
    pub weight:       f64,
    pub fill_opacity: f64,
}

/// A circle marker owned by the surface's overlay layer for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayMarker {
    pub report_id: ReportId,
    pub position:  LatLng,
    pub category:  Category,
    pub style:     MarkerStyle,
    pub popup:     String,
}

impl OverlayMarker {
    pub fn for_point(point: &GeoPoint, marker: &MarkerConfig) -> Self {
        Self {
            report_id: point.id.clone(),
            position:  point.position(),
            category:  point.category,
            style: MarkerStyle {
                color:        marker.colors.for_category(point.category).to_string(),
                radius:       marker.radius,
                weight:       marker.weight,
                fill_opacity: marker.fill_opacity,
            },
            popup: popup_label(point),
        }
    }
}

pub fn popup_label(point: &GeoPoint) -> String {
    format!("{} #{}", point.category.label(), point.id)
}

/// Split a batch into renderable points and the count of discarded ones.
pub fn validate(batch: &[GeoPoint]) -> (Vec<GeoPoint>, usize) {
    let valid: Vec<GeoPoint> = batch.iter().filter(|p| p.is_valid()).cloned().collect();
    let discarded = batch.len() - valid.len();
    (valid, discarded)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub cycle:     u64,
    pub received:  usize,
    pub rendered:  usize,
    pub discarded: usize,
    pub view:      ViewChange,
}

#[derive(Debug, Default)]
pub struct OverlayReconciler {
    cycle: u64,
}

impl OverlayReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cycles completed so far.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Rebuild the overlay from `batch` and refit the view.
    /// Fails only with `NotMounted`; bad records are never an error.
    pub fn reconcile(
        &mut self,
        surface: &mut SurfaceManager,
        batch: &LooseBatch<GeoPoint>,
    ) -> ConsoleResult<ReconcileReport> {
        let (valid, invalid) = validate(&batch.records);
        let discarded = invalid + batch.rejected;
        if discarded > 0 {
            log::debug!(
                "overlay: dropped {discarded} of {} points ({} undecodable)",
                batch.received(),
                batch.rejected
            );
        }

        let placed = surface.replace_overlay(&valid)?;
        let view = surface.fit_bounds(&placed)?;

        self.cycle += 1;
        let report = ReconcileReport {
            cycle: self.cycle,
            received: batch.received(),
            rendered: surface.markers().len(),
            discarded,
            view,
        };
        log::debug!(
            "overlay cycle={} rendered={} discarded={} view={:?}",
            report.cycle,
            report.rendered,
            report.discarded,
            report.view
        );
        Ok(report)
    }
}
