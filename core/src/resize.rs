//! Resize Adapter: watches the map container for size changes caused by
//! the surrounding layout (a sibling panel opening or closing).
//!
//! The adapter only decides *whether* a layout check is needed; the engine
//! schedules it one loop turn later so the host's layout pass settles
//! first. At most one check is pending at a time.

use crate::{geo::Size, surface::Container, types::ContainerId};

#[derive(Debug, Default)]
pub struct ResizeAdapter {
    target:    Option<ContainerId>,
    last_size: Option<Size>,
    scheduled: bool,
    detached:  bool,
    observed:  u64,
}

impl ResizeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, container: &Container) {
        self.target = Some(container.id.clone());
        self.last_size = Some(container.size);
        self.scheduled = false;
        self.detached = false;
    }

    pub fn is_observing(&self) -> bool {
        self.target.is_some()
    }

    /// Size changes seen since observation started.
    pub fn observed_changes(&self) -> u64 {
        self.observed
    }

    /// Feed a size report. Returns true when the caller should schedule a
    /// deferred layout check.
    pub fn notify(&mut self, container: &Container) -> bool {
        if self.target.as_deref() != Some(container.id.as_str()) {
            return false;
        }
        if self.last_size == Some(container.size) {
            return false;
        }
        self.last_size = Some(container.size);
        self.observed += 1;

        if self.scheduled {
            return false;
        }
        self.scheduled = true;
        true
    }

    /// The scheduled layout check ran.
    pub fn settled(&mut self) {
        self.scheduled = false;
    }

    /// Stop observing. Returns true only for the call that actually
    /// detached; later calls are no-ops.
    pub fn detach(&mut self) -> bool {
        if self.detached || self.target.is_none() {
            return false;
        }
        log::debug!(
            "resize observer detached from '{}' after {} changes",
            self.target.as_deref().unwrap_or_default(),
            self.observed
        );
        self.target = None;
        self.scheduled = false;
        self.detached = true;
        true
    }
}
