//! Console clock: owns virtual time.

use crate::types::Millis;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConsoleClock {
    pub now: Millis,
}

impl ConsoleClock {
    pub fn new() -> Self {
        Self { now: 0 }
    }

    /// Move time forward to `at`. Time never runs backwards; an earlier
    /// `at` leaves the clock where it is.
    pub fn advance_to(&mut self, at: Millis) -> Millis {
        self.now = self.now.max(at);
        self.now
    }
}
