use crate::{
    geo::LatLng,
    types::{Category, Millis},
};
use serde::{Deserialize, Serialize};

// ── Map surface ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// View used on first mount and whenever a cycle has nothing to fit.
    pub default_center: LatLng,
    pub default_zoom: f64,
    pub min_zoom: f64,
    /// Margin kept clear on every side when fitting to a point set.
    pub fit_padding_px: f64,
    /// Fitting never zooms in past this, even for one point.
    pub fit_max_zoom: f64,
    /// When false, an empty cycle leaves the operator's view alone.
    pub reset_view_on_empty: bool,
    pub tiles: TileConfig,
    pub marker: MarkerConfig,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            default_center: LatLng::new(22.7196, 75.8577), // Indore
            default_zoom: 12.0,
            min_zoom: 0.0,
            fit_padding_px: 20.0,
            fit_max_zoom: 14.0,
            reset_view_on_empty: true,
            tiles: TileConfig::default(),
            marker: MarkerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    pub url_template: String,
    pub subdomains: Vec<String>,
    pub max_zoom: u8,
    pub attribution: String,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            url_template: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".into(),
            subdomains: vec!["a".into(), "b".into(), "c".into()],
            max_zoom: 19,
            attribution: "© OpenStreetMap contributors".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub radius: f64,
    pub weight: f64,
    pub fill_opacity: f64,
    pub colors: CategoryColors,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            radius: 8.0,
            weight: 2.0,
            fill_opacity: 0.25,
            colors: CategoryColors::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryColors {
    pub sms:  String,
    pub url:  String,
    pub voip: String,
}

impl CategoryColors {
    pub fn for_category(&self, category: Category) -> &str {
        match category {
            Category::Sms  => &self.sms,
            Category::Url  => &self.url,
            Category::Voip => &self.voip,
        }
    }
}

impl Default for CategoryColors {
    fn default() -> Self {
        Self {
            sms:  "#e07b3a".into(),
            url:  "#6b46c1".into(),
            voip: "#d32f2f".into(),
        }
    }
}

// ── Polling ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub points_interval_ms: Millis,
    pub rows_interval_ms: Millis,
    /// Page size requested from the report provider.
    pub report_limit: usize,
    /// Drop responses older than one already applied on the same stream.
    pub discard_stale_responses: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            points_interval_ms: 5_000,
            rows_interval_ms: 5_000,
            report_limit: 200,
            discard_stale_responses: false,
        }
    }
}

// ── Session journal ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Oldest entries of the open session are pruned past this many.
    pub max_events_per_session: usize,
    /// Closed sessions whose entries survive the next mount.
    pub keep_closed_sessions: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            max_events_per_session: 5_000,
            keep_closed_sessions: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub map: MapConfig,
    pub polling: PollingConfig,
    pub journal: JournalConfig,
}

impl ConsoleConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    /// In tests, use ConsoleConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: ConsoleConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with a fixed tile template so tests never depend on the
    /// production tile host.
    pub fn default_test() -> Self {
        let mut config = Self::default();
        config.map.tiles.url_template = "https://{s}.tiles.test/{z}/{x}/{y}.png".into();
        config
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let map = &self.map;
        if !map.default_center.is_finite() {
            anyhow::bail!("map.default_center must be finite");
        }
        if map.min_zoom > map.fit_max_zoom {
            anyhow::bail!(
                "map.min_zoom ({}) exceeds map.fit_max_zoom ({})",
                map.min_zoom,
                map.fit_max_zoom
            );
        }
        if map.fit_padding_px < 0.0 {
            anyhow::bail!("map.fit_padding_px must be non-negative");
        }
        if self.polling.points_interval_ms == 0 || self.polling.rows_interval_ms == 0 {
            anyhow::bail!("polling intervals must be non-zero");
        }
        if self.journal.max_events_per_session == 0 {
            anyhow::bail!("journal.max_events_per_session must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ConsoleConfig =
            serde_json::from_str(r#"{ "polling": { "report_limit": 50 } }"#).unwrap();
        assert_eq!(config.polling.report_limit, 50);
        assert_eq!(config.polling.rows_interval_ms, 5_000);
        assert_eq!(config.map.fit_max_zoom, 14.0);
        assert_eq!(config.map.marker.colors.for_category(Category::Url), "#6b46c1");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = ConsoleConfig::default();
        config.polling.points_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_journal_cap_is_rejected() {
        let mut config = ConsoleConfig::default();
        config.journal.max_events_per_session = 0;
        assert!(config.validate().is_err());
        assert!(ConsoleConfig::default().validate().is_ok());
    }
}
