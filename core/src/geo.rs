//! Geographic primitives and spherical Web-Mercator math.
//!
//! Pixel space follows the slippy-map convention: at zoom `z` the world is
//! `256 * 2^z` pixels wide, x grows east and y grows south.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const TILE_SIZE: f64 = 256.0;

/// Latitude beyond which Web-Mercator diverges.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lon: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Container dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width:  f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pixel {
    pub x: f64,
    pub y: f64,
}

/// Axis-aligned geographic bounds. Starts empty; `extend` grows it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLngBounds {
    corners: Option<(LatLng, LatLng)>,
}

impl LatLngBounds {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_corners(south_west: LatLng, north_east: LatLng) -> Self {
        let mut bounds = Self::empty();
        bounds.extend(south_west);
        bounds.extend(north_east);
        bounds
    }

    /// Grow to include `p`. Non-finite coordinates are ignored.
    pub fn extend(&mut self, p: LatLng) {
        if !p.is_finite() {
            return;
        }
        self.corners = Some(match self.corners {
            None => (p, p),
            Some((sw, ne)) => (
                LatLng::new(sw.lat.min(p.lat), sw.lon.min(p.lon)),
                LatLng::new(ne.lat.max(p.lat), ne.lon.max(p.lon)),
            ),
        });
    }

    pub fn is_valid(&self) -> bool {
        self.corners.is_some()
    }

    pub fn south_west(&self) -> Option<LatLng> {
        self.corners.map(|(sw, _)| sw)
    }

    pub fn north_east(&self) -> Option<LatLng> {
        self.corners.map(|(_, ne)| ne)
    }

    /// Inclusive containment. Empty bounds contain nothing.
    pub fn contains(&self, p: LatLng) -> bool {
        match self.corners {
            None => false,
            Some((sw, ne)) => {
                p.lat >= sw.lat && p.lat <= ne.lat && p.lon >= sw.lon && p.lon <= ne.lon
            }
        }
    }
}

impl FromIterator<LatLng> for LatLngBounds {
    fn from_iter<I: IntoIterator<Item = LatLng>>(iter: I) -> Self {
        let mut bounds = Self::empty();
        for p in iter {
            bounds.extend(p);
        }
        bounds
    }
}

/// World size in pixels at `zoom`.
pub fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * zoom.exp2()
}

pub fn project(p: LatLng, zoom: f64) -> Pixel {
    let scale = world_size(zoom);
    let lat = p.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (p.lon + 180.0) / 360.0 * scale;
    let y = (0.5 - ((1.0 + lat.sin()) / (1.0 - lat.sin())).ln() / (4.0 * PI)) * scale;
    Pixel { x, y }
}

pub fn unproject(px: Pixel, zoom: f64) -> LatLng {
    let scale = world_size(zoom);
    let lon = px.x / scale * 360.0 - 180.0;
    let n = PI * (1.0 - 2.0 * px.y / scale);
    let lat = n.sinh().atan().to_degrees();
    LatLng::new(lat, lon)
}

/// Largest integral zoom at which `bounds` fits inside `size` shrunk by
/// `padding` on every side, clamped to `[min_zoom, max_zoom]`.
///
/// A degenerate (single point) bounds fits at any zoom and yields
/// `max_zoom`. A container with no room left after padding yields
/// `min_zoom`.
pub fn bounds_zoom(
    bounds: &LatLngBounds,
    size: Size,
    padding: f64,
    min_zoom: f64,
    max_zoom: f64,
) -> Option<f64> {
    let (sw, ne) = bounds.corners?;
    let nw = project(LatLng::new(ne.lat, sw.lon), 0.0);
    let se = project(LatLng::new(sw.lat, ne.lon), 0.0);
    let span_x = (se.x - nw.x).abs();
    let span_y = (se.y - nw.y).abs();

    let avail_w = size.width - 2.0 * padding;
    let avail_h = size.height - 2.0 * padding;
    if avail_w <= 0.0 || avail_h <= 0.0 {
        return Some(min_zoom);
    }

    let scale_x = if span_x > 0.0 { avail_w / span_x } else { f64::INFINITY };
    let scale_y = if span_y > 0.0 { avail_h / span_y } else { f64::INFINITY };
    let scale = scale_x.min(scale_y);

    let zoom = if scale.is_infinite() { max_zoom } else { scale.log2().floor() };
    Some(zoom.clamp(min_zoom, max_zoom))
}

/// Centre of `bounds` in projected space, so it matches what a padded fit
/// actually puts in the middle of the screen.
pub fn projected_center(bounds: &LatLngBounds) -> Option<LatLng> {
    let (sw, ne) = bounds.corners?;
    let a = project(sw, 0.0);
    let b = project(ne, 0.0);
    Some(unproject(Pixel { x: (a.x + b.x) / 2.0, y: (a.y + b.y) / 2.0 }, 0.0))
}

/// Geographic region visible in a `size` container centred on `center`.
pub fn view_bounds(center: LatLng, zoom: f64, size: Size) -> LatLngBounds {
    let c = project(center, zoom);
    let half_w = size.width / 2.0;
    let half_h = size.height / 2.0;
    let sw = unproject(Pixel { x: c.x - half_w, y: c.y + half_h }, zoom);
    let ne = unproject(Pixel { x: c.x + half_w, y: c.y - half_h }, zoom);
    LatLngBounds::from_corners(sw, ne)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_round_trips_within_tolerance() {
        let p = LatLng::new(22.7196, 75.8577);
        let back = unproject(project(p, 12.0), 12.0);
        assert!((back.lat - p.lat).abs() < 1e-9, "lat drifted: {}", back.lat);
        assert!((back.lon - p.lon).abs() < 1e-9, "lon drifted: {}", back.lon);
    }

    #[test]
    fn single_point_fits_at_max_zoom() {
        let bounds: LatLngBounds = [LatLng::new(22.72, 75.86)].into_iter().collect();
        let zoom = bounds_zoom(&bounds, Size::new(800.0, 600.0), 20.0, 0.0, 14.0);
        assert_eq!(zoom, Some(14.0));
    }

    #[test]
    fn empty_bounds_have_no_zoom() {
        let zoom = bounds_zoom(&LatLngBounds::empty(), Size::new(800.0, 600.0), 20.0, 0.0, 14.0);
        assert_eq!(zoom, None);
    }

    #[test]
    fn non_finite_points_do_not_extend_bounds() {
        let mut bounds = LatLngBounds::empty();
        bounds.extend(LatLng::new(f64::NAN, 75.0));
        bounds.extend(LatLng::new(22.0, f64::INFINITY));
        assert!(!bounds.is_valid());
    }

    #[test]
    fn wide_spread_zooms_out() {
        let bounds: LatLngBounds =
            [LatLng::new(8.0, 68.0), LatLng::new(35.0, 97.0)].into_iter().collect();
        let zoom = bounds_zoom(&bounds, Size::new(800.0, 600.0), 20.0, 0.0, 14.0)
            .expect("valid bounds");
        assert!(zoom < 6.0, "country-wide spread should zoom out, got {zoom}");
    }

    #[test]
    fn cramped_container_falls_back_to_min_zoom() {
        let bounds: LatLngBounds =
            [LatLng::new(22.0, 75.0), LatLng::new(23.0, 76.0)].into_iter().collect();
        let zoom = bounds_zoom(&bounds, Size::new(30.0, 30.0), 20.0, 3.0, 14.0);
        assert_eq!(zoom, Some(3.0));
    }
}
