//! Console events: the record of everything the core did.
//!
//! Every state change the engine makes is emitted as a `ConsoleEvent`,
//! returned to the host and appended to the session journal.

use crate::types::{Millis, SessionId, StreamKind};
use serde::{Deserialize, Serialize};

/// Variants are appended over time, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsoleEvent {
    // ── Lifecycle ──────────────────────────────────
    ViewMounted {
        at: Millis,
        session_id: SessionId,
        container_id: String,
    },
    ViewUnmounted {
        at: Millis,
        session_id: SessionId,
    },
    SurfaceCreated {
        at: Millis,
        surface_id: String,
        width: f64,
        height: f64,
    },
    SurfaceDestroyed {
        at: Millis,
        surface_id: String,
    },

    // ── Overlay ────────────────────────────────────
    OverlayReplaced {
        at: Millis,
        cycle: u64,
        received: usize,
        rendered: usize,
        discarded: usize,
    },
    ViewportFitted {
        at: Millis,
        lat: f64,
        lon: f64,
        zoom: f64,
    },
    ViewportReset {
        at: Millis,
        lat: f64,
        lon: f64,
        zoom: f64,
    },

    // ── Layout ─────────────────────────────────────
    ContainerResized {
        at: Millis,
        width: f64,
        height: f64,
    },
    LayoutInvalidated {
        at: Millis,
        width: f64,
        height: f64,
        changed: bool,
    },

    // ── Polling ────────────────────────────────────
    PollIssued {
        at: Millis,
        stream: StreamKind,
        generation: u64,
    },
    RowsReplaced {
        at: Millis,
        generation: u64,
        total: usize,
        visible: usize,
        rejected: usize,
    },
    FetchFailed {
        at: Millis,
        stream: StreamKind,
        generation: u64,
        reason: String,
    },
    StaleResponseDiscarded {
        at: Millis,
        stream: StreamKind,
        generation: u64,
    },
    ResponseSuppressed {
        at: Millis,
        stream: StreamKind,
    },
    FilterChanged {
        at: Millis,
        filter: String,
        visible: usize,
    },

    // ── Scoring ────────────────────────────────────
    ScoringRequested {
        at: Millis,
        items: usize,
    },
    ScoringRejected {
        at: Millis,
        reason: String,
    },
    ScoringMerged {
        at: Millis,
        merged: usize,
        skipped: usize,
        mapping_size: usize,
    },
    ScoringFailed {
        at: Millis,
        reason: String,
    },
}

impl ConsoleEvent {
    /// Stable name used for the event_type journal column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ViewMounted { .. }            => "view_mounted",
            Self::ViewUnmounted { .. }          => "view_unmounted",
            Self::SurfaceCreated { .. }         => "surface_created",
            Self::SurfaceDestroyed { .. }       => "surface_destroyed",
            Self::OverlayReplaced { .. }        => "overlay_replaced",
            Self::ViewportFitted { .. }         => "viewport_fitted",
            Self::ViewportReset { .. }          => "viewport_reset",
            Self::ContainerResized { .. }       => "container_resized",
            Self::LayoutInvalidated { .. }      => "layout_invalidated",
            Self::PollIssued { .. }             => "poll_issued",
            Self::RowsReplaced { .. }           => "rows_replaced",
            Self::FetchFailed { .. }            => "fetch_failed",
            Self::StaleResponseDiscarded { .. } => "stale_response_discarded",
            Self::ResponseSuppressed { .. }     => "response_suppressed",
            Self::FilterChanged { .. }          => "filter_changed",
            Self::ScoringRequested { .. }       => "scoring_requested",
            Self::ScoringRejected { .. }        => "scoring_rejected",
            Self::ScoringMerged { .. }          => "scoring_merged",
            Self::ScoringFailed { .. }          => "scoring_failed",
        }
    }
}

/// The journal entry as stored in SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub session_id: SessionId,
    pub at: Millis,
    pub component: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized ConsoleEvent
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A non-blocking message for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}
