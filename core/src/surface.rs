//! Surface Manager: the long-lived map surface behind the console view.
//!
//! One `MapSurface` per container lifetime: `create` builds it (tile
//! backdrop, empty overlay layer, default view) and is a no-op when the
//! same container already has one; `destroy` releases it and is
//! idempotent. Everything else operates on the live surface and fails with
//! `NotMounted` when there is none.

use crate::{
    config::{MapConfig, TileConfig},
    error::{ConsoleError, ConsoleResult},
    geo::{self, LatLng, LatLngBounds, Size},
    overlay::{GeoPoint, OverlayMarker},
    types::ContainerId,
};
use serde::Serialize;
use uuid::Uuid;

/// The host element the map lives in, as last measured by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub id:   ContainerId,
    pub size: Size,
}

impl Container {
    pub fn new(id: impl Into<ContainerId>, size: Size) -> Self {
        Self { id: id.into(), size }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub center: LatLng,
    pub zoom:   f64,
}

impl Viewport {
    /// Region visible through a container of `size`.
    pub fn visible_bounds(&self, size: Size) -> LatLngBounds {
        geo::view_bounds(self.center, self.zoom, size)
    }
}

/// Outcome of a fit request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewChange {
    Fitted { viewport: Viewport },
    Reset { viewport: Viewport },
    /// Nothing to fit and resetting is disabled.
    Kept { viewport: Viewport },
}

impl ViewChange {
    pub fn viewport(&self) -> Viewport {
        match *self {
            Self::Fitted { viewport } | Self::Reset { viewport } | Self::Kept { viewport } => viewport,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

/// Raster tile backdrop.
#[derive(Debug, Clone)]
pub struct TileLayer {
    url_template: String,
    subdomains:   Vec<String>,
    max_zoom:     u8,
    attribution:  String,
}

impl TileLayer {
    pub fn from_config(config: &TileConfig) -> Self {
        Self {
            url_template: config.url_template.clone(),
            subdomains:   config.subdomains.clone(),
            max_zoom:     config.max_zoom,
            attribution:  config.attribution.clone(),
        }
    }

    pub fn attribution(&self) -> &str {
        &self.attribution
    }

    pub fn tile_url(&self, coord: TileCoord) -> String {
        let subdomain = if self.subdomains.is_empty() {
            ""
        } else {
            let idx = (coord.x as usize + coord.y as usize) % self.subdomains.len();
            self.subdomains[idx].as_str()
        };
        self.url_template
            .replace("{s}", subdomain)
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
    }

    /// Tiles covering the view, at the view's zoom capped to `max_zoom`.
    pub fn visible_tiles(&self, viewport: &Viewport, size: Size) -> Vec<TileCoord> {
        let z = (viewport.zoom.floor().max(0.0) as u8).min(self.max_zoom).min(30);
        let zf = f64::from(z);
        let tiles_per_side = 1u32 << z;
        let max_index = f64::from(tiles_per_side - 1);

        let c = geo::project(viewport.center, zf);
        let to_index = |v: f64| (v / geo::TILE_SIZE).floor().clamp(0.0, max_index) as u32;
        let x0 = to_index(c.x - size.width / 2.0);
        let x1 = to_index(c.x + size.width / 2.0);
        let y0 = to_index(c.y - size.height / 2.0);
        let y1 = to_index(c.y + size.height / 2.0);

        let mut tiles = Vec::new();
        for y in y0..=y1 {
            for x in x0..=x1 {
                tiles.push(TileCoord { z, x, y });
            }
        }
        tiles
    }
}

#[derive(Debug, Default)]
pub struct OverlayLayer {
    markers: Vec<OverlayMarker>,
}

impl OverlayLayer {
    pub fn clear(&mut self) {
        self.markers.clear();
    }

    pub fn add(&mut self, marker: OverlayMarker) {
        self.markers.push(marker);
    }

    pub fn markers(&self) -> &[OverlayMarker] {
        &self.markers
    }
}

#[derive(Debug)]
pub struct MapSurface {
    id:        Uuid,
    container: ContainerId,
    measured:  Size,
    viewport:  Viewport,
    tiles:     TileLayer,
    overlay:   OverlayLayer,
}

impl MapSurface {
    pub fn id(&self) -> Uuid { self.id }
    pub fn container_id(&self) -> &str { &self.container }
    pub fn measured_size(&self) -> Size { self.measured }
    pub fn viewport(&self) -> Viewport { self.viewport }
    pub fn tiles(&self) -> &TileLayer { &self.tiles }
    pub fn markers(&self) -> &[OverlayMarker] { self.overlay.markers() }

    pub fn visible_bounds(&self) -> LatLngBounds {
        self.viewport.visible_bounds(self.measured)
    }
}

pub struct SurfaceManager {
    config:  MapConfig,
    surface: Option<MapSurface>,
}

impl SurfaceManager {
    pub fn new(config: MapConfig) -> Self {
        Self { config, surface: None }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn default_view(&self) -> Viewport {
        Viewport { center: self.config.default_center, zoom: self.config.default_zoom }
    }

    /// Build the surface for `container`. Returns `(surface, created)`;
    /// `created` is false when this container already had one.
    pub fn create(&mut self, container: &Container) -> ConsoleResult<(&MapSurface, bool)> {
        let created = match &self.surface {
            Some(existing) if existing.container != container.id => {
                return Err(ConsoleError::AlreadyMounted(existing.container.clone()));
            }
            Some(existing) => {
                log::debug!("surface {} already live on '{}'", existing.id, container.id);
                false
            }
            None => {
                let surface = MapSurface {
                    id:        Uuid::new_v4(),
                    container: container.id.clone(),
                    measured:  container.size,
                    viewport:  self.default_view(),
                    tiles:     TileLayer::from_config(&self.config.tiles),
                    overlay:   OverlayLayer::default(),
                };
                log::info!(
                    "surface {} created on '{}' ({}x{})",
                    surface.id,
                    container.id,
                    container.size.width,
                    container.size.height
                );
                self.surface = Some(surface);
                true
            }
        };
        let surface = self.surface.as_ref().ok_or(ConsoleError::NotMounted)?;
        Ok((surface, created))
    }

    /// Release the surface and every marker on it. Returns the released
    /// surface id, or None if there was nothing to release.
    pub fn destroy(&mut self) -> Option<Uuid> {
        let surface = self.surface.take()?;
        log::info!(
            "surface {} destroyed ({} markers released)",
            surface.id,
            surface.overlay.markers().len()
        );
        Some(surface.id)
    }

    pub fn is_created(&self) -> bool {
        self.surface.is_some()
    }

    pub fn surface(&self) -> Option<&MapSurface> {
        self.surface.as_ref()
    }

    pub fn markers(&self) -> &[OverlayMarker] {
        self.surface.as_ref().map(MapSurface::markers).unwrap_or(&[])
    }

    /// Clear the overlay and add one marker per valid point. Returns the
    /// bounds of the markers actually placed.
    pub fn replace_overlay(&mut self, points: &[GeoPoint]) -> ConsoleResult<LatLngBounds> {
        let marker_config = &self.config.marker;
        let surface = self.surface.as_mut().ok_or(ConsoleError::NotMounted)?;

        surface.overlay.clear();
        let mut placed = LatLngBounds::empty();
        for point in points.iter().filter(|p| p.is_valid()) {
            let marker = OverlayMarker::for_point(point, marker_config);
            placed.extend(marker.position);
            surface.overlay.add(marker);
        }
        Ok(placed)
    }

    /// Fit the view to the valid points in `points`.
    pub fn fit_to(&mut self, points: &[GeoPoint]) -> ConsoleResult<ViewChange> {
        let bounds: LatLngBounds = points
            .iter()
            .filter(|p| p.is_valid())
            .map(GeoPoint::position)
            .collect();
        self.fit_bounds(&bounds)
    }

    /// Fit the view to `bounds` with padding and the zoom ceiling. Empty
    /// bounds fall back to the default view (or keep the current one when
    /// `reset_view_on_empty` is off).
    pub fn fit_bounds(&mut self, bounds: &LatLngBounds) -> ConsoleResult<ViewChange> {
        let default_view = self.default_view();
        let config = &self.config;
        let surface = self.surface.as_mut().ok_or(ConsoleError::NotMounted)?;

        let fitted = geo::bounds_zoom(
            bounds,
            surface.measured,
            config.fit_padding_px,
            config.min_zoom,
            config.fit_max_zoom,
        )
        .zip(geo::projected_center(bounds));

        let change = match fitted {
            Some((zoom, center)) => {
                surface.viewport = Viewport { center, zoom };
                ViewChange::Fitted { viewport: surface.viewport }
            }
            None if config.reset_view_on_empty => {
                surface.viewport = default_view;
                ViewChange::Reset { viewport: default_view }
            }
            None => ViewChange::Kept { viewport: surface.viewport },
        };
        Ok(change)
    }

    /// Re-measure the container. Safe to call any number of times, and a
    /// no-op once the surface is gone. Returns whether the size changed.
    pub fn invalidate_layout(&mut self, container: &Container) -> bool {
        let Some(surface) = self.surface.as_mut() else {
            return false;
        };
        if surface.container != container.id {
            log::warn!(
                "layout check for '{}' ignored; surface lives on '{}'",
                container.id,
                surface.container
            );
            return false;
        }
        let changed = surface.measured != container.size;
        surface.measured = container.size;
        changed
    }
}

impl Drop for SurfaceManager {
    fn drop(&mut self) {
        self.destroy();
    }
}
